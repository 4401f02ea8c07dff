use std::future::Future;

use crate::error::AlertResult;
use crate::types::SubscriptionId;

/// Trait for fetching the current alert state to report downstream.
///
/// [`AlertFetcher`] is the recompute side of the notification path: given one
/// key, it returns the current canonical state as rendered JSON. The
/// debouncer calls [`AlertFetcher::fetch_alerts`] once per dirty key during a
/// fan-out cycle; the immediate condition-change path calls
/// [`AlertFetcher::fetch_condition_alerts`] once per event.
///
/// Calls for different keys run concurrently, so implementations must be
/// safe to invoke from many tasks at once.
pub trait AlertFetcher {
    /// Returns the name of the fetcher, used in logs.
    fn name() -> &'static str;

    /// Fetches the rendered alerts for one subscription.
    ///
    /// Returns `None` when the subscription currently has no alerts to
    /// report.
    fn fetch_alerts(
        &self,
        id: SubscriptionId,
    ) -> impl Future<Output = AlertResult<Option<String>>> + Send;

    /// Fetches the active alerts affected by a change to one subscription
    /// condition.
    ///
    /// When `is_on` is `false`, the rendered alerts must report `is_on:
    /// false` even for alerts that are active, since the condition they
    /// belong to was just switched off.
    fn fetch_condition_alerts(
        &self,
        condition_id: i64,
        is_on: bool,
    ) -> impl Future<Output = AlertResult<Option<String>>> + Send;
}
