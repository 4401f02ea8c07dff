//! Macros for pipeline error handling.
//!
//! Provides convenience macros for creating and returning
//! [`crate::error::AlertError`] instances with reduced boilerplate.

/// Creates an [`crate::error::AlertError`] from error kind and description.
///
/// An optional third argument adds dynamic detail, and `source:` attaches an
/// underlying error.
#[macro_export]
macro_rules! alert_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::AlertError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::AlertError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::AlertError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::AlertError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Creates and returns an [`crate::error::AlertError`] from the current function.
///
/// Supports the same optional detail and source arguments as [`alert_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::alert_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::alert_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::alert_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::alert_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
