//! Postgres implementations of the alertflow pipeline traits.
//!
//! Provides the staging sink (bulk loads plus a merge procedure), the
//! LISTEN/NOTIFY notification source, the per-subscription alert fetcher and
//! the startup loaders for conditions and subscriptions.

pub mod fetch;
pub mod loaders;
pub mod pool;
pub mod sink;
pub mod source;
