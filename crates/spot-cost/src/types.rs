//! Domain types for instance lifetimes and spot prices

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instance state as reported by DescribeInstances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    /// Instance is pending
    Pending,
    /// Instance is running
    Running,
    /// Instance is shutting down
    ShuttingDown,
    /// Instance is stopping
    Stopping,
    /// Instance is stopped
    Stopped,
    /// Instance is terminated
    Terminated,
    /// Any state this crate does not know about
    Other,
}

impl InstanceState {
    /// Stopped and terminated instances carry their stop time in the state reason
    pub fn has_ended(&self) -> bool {
        matches!(self, Self::Stopped | Self::Terminated)
    }
}

/// One instance inside a reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Instance ID
    pub instance_id: String,

    /// Launch time
    pub launch_time: DateTime<Utc>,

    /// Current state
    pub state: InstanceState,

    /// Free-text state transition reason (empty when AWS sends none)
    pub state_reason: String,
}

/// Grouping of instance records returned by DescribeInstances
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID, when the API reports one
    pub reservation_id: Option<String>,

    /// Instances launched in this reservation
    pub instances: Vec<InstanceRecord>,
}

/// Everything DescribeInstances returned for one instance id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// The id that was looked up
    pub instance_id: String,

    /// Matching reservations
    pub reservations: Vec<Reservation>,
}

impl InstanceDescriptor {
    /// All instance records across all reservations
    pub fn records(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.reservations.iter().flat_map(|r| r.instances.iter())
    }
}

/// Start and end of a priced window, both `YYYY-MM-DDTHH:MM:SS.000Z`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start
    pub start: String,

    /// Window end
    pub end: String,
}

impl TimeWindow {
    /// Create a new window
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// A single spot price observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Price (USD per hour)
    pub price: f64,

    /// When the price took effect, if the API said
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceSample {
    /// Create a new sample
    pub fn new(price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            timestamp: Some(timestamp),
        }
    }

    /// A sample with no effective time
    pub fn untimed(price: f64) -> Self {
        Self {
            price,
            timestamp: None,
        }
    }
}

/// Spot price history lookup parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SpotPriceQuery {
    /// Instance type (e.g., "c3.8xlarge")
    pub instance_type: String,

    /// Availability zone (e.g., "us-west-2a")
    pub availability_zone: String,

    /// Window start
    pub start: DateTime<Utc>,

    /// Window end
    pub end: DateTime<Utc>,
}
