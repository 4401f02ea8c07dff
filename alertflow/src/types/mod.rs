//! Core data types shared across the pipeline.

use std::{fmt, str};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert_error;
use crate::error::{AlertError, ErrorKind};

/// Identifier of a user subscription, the unit of recomputation on the
/// notification path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub i64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubscriptionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The kind of entity an observation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A flight.
    Flight,
    /// The airport a flight departs from.
    SourceAirport,
    /// The airport a flight arrives at.
    DestinationAirport,
}

impl TargetKind {
    /// Returns the wire representation used in the backing store.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Flight => "flight",
            TargetKind::SourceAirport => "source_airport",
            TargetKind::DestinationAirport => "destination_airport",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl str::FromStr for TargetKind {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flight" => Ok(TargetKind::Flight),
            "source_airport" => Ok(TargetKind::SourceAirport),
            "destination_airport" => Ok(TargetKind::DestinationAirport),
            other => Err(alert_error!(
                ErrorKind::DeserializationError,
                "Unknown target kind",
                other
            )),
        }
    }
}

/// One reported alert-condition observation tied to a condition and a target.
///
/// Rows are immutable once created: they are produced by condition
/// evaluators, enqueued into the batching engine, and consumed exactly once
/// by a bulk load into the staging table.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    /// Identifier of the evaluated condition.
    pub condition_id: i64,
    /// Identifier of the flight or airport the observation concerns.
    pub target_id: i64,
    /// Kind of the target.
    pub target_kind: TargetKind,
    /// Whether the condition is currently triggered for the target.
    pub is_on: bool,
    /// Opaque JSON payload attached by the evaluator.
    pub payload: serde_json::Value,
    /// When the observation was produced.
    pub received_at: DateTime<Utc>,
}

/// A reusable alert-condition rule definition instantiated per target.
///
/// Templates are loaded once at startup and shared read-only by all workers;
/// if they are invalidated the process must restart, there is no hot reload.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionTemplate {
    /// Identifier of the concrete condition row.
    pub id: i64,
    /// Kind of target this condition applies to.
    pub target_kind: TargetKind,
    /// Numeric threshold that decides whether the condition triggers.
    pub threshold: i64,
    /// Human-readable condition name, e.g. `fog` or `low_fuel`.
    pub name: String,
}

/// One flight of a subscription view, with the airports it connects.
///
/// Condition evaluation expands each flight into three targets: the flight
/// itself, its source airport and its destination airport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlightTarget {
    pub flight_id: i64,
    pub source_airport_id: i64,
    pub destination_airport_id: i64,
}

impl FlightTarget {
    /// Returns the (target id, target kind) pairs this flight expands into.
    pub fn targets(&self) -> [(i64, TargetKind); 3] {
        [
            (self.flight_id, TargetKind::Flight),
            (self.source_airport_id, TargetKind::SourceAirport),
            (self.destination_airport_id, TargetKind::DestinationAirport),
        ]
    }
}

/// A user subscription and the database view listing its targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Identifier of the subscription.
    pub id: SubscriptionId,
    /// Display name.
    pub name: String,
    /// Name of the view that enumerates the subscription's flights.
    pub view_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kind_wire_strings() {
        assert_eq!(TargetKind::Flight.as_str(), "flight");
        assert_eq!(TargetKind::SourceAirport.as_str(), "source_airport");
        assert_eq!(
            TargetKind::DestinationAirport.as_str(),
            "destination_airport"
        );
    }

    #[test]
    fn target_kind_parses_from_wire_strings() {
        assert_eq!("flight".parse::<TargetKind>().unwrap(), TargetKind::Flight);
        assert_eq!(
            "destination_airport".parse::<TargetKind>().unwrap(),
            TargetKind::DestinationAirport
        );
        assert!("spaceport".parse::<TargetKind>().is_err());
    }

    #[test]
    fn subscription_id_is_transparent_in_json() {
        let ids: Vec<SubscriptionId> = serde_json::from_str("[5, 7]").unwrap();
        assert_eq!(ids, vec![SubscriptionId(5), SubscriptionId(7)]);
    }
}
