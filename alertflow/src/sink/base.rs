use std::future::Future;

use crate::error::AlertResult;
use crate::types::ObservationRow;

/// Trait for systems that can receive bulk-loaded observation rows.
///
/// [`StagingSink`] implementations define how the batching engine writes
/// staged rows and folds them into canonical alert state. Staging and merging
/// are split on purpose: capacity-driven flushes stage data without merging,
/// so that the comparatively expensive merge is amortized over the timer and
/// end-of-cycle paths.
///
/// The batching engine treats the sink as at-most-once: a batch whose
/// [`StagingSink::stage_rows`] call fails is logged and discarded, never
/// redelivered. Implementations that need stronger guarantees must provide
/// their own replay mechanism.
pub trait StagingSink {
    /// Returns the name of the sink, used in logs.
    fn name() -> &'static str;

    /// Appends a batch of observation rows to the staging area in one atomic
    /// call.
    ///
    /// Failure is a single error for the whole batch; partial-row reporting
    /// is not assumed. Implementations must not observe a partially applied
    /// batch on error.
    fn stage_rows(
        &self,
        rows: Vec<ObservationRow>,
    ) -> impl Future<Output = AlertResult<()>> + Send;

    /// Folds previously staged rows into canonical alert state.
    ///
    /// Must be idempotent and order-independent across rows, and must be
    /// safe to call when nothing is staged (no-op).
    fn merge_staged(&self) -> impl Future<Output = AlertResult<()>> + Send;
}
