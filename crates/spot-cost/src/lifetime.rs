//! Instance lifetime resolution
//!
//! Turns an instance id into the window it was alive:
//!
//! - **start**: launch time
//! - **end**: the timestamp in the state reason for stopped/terminated
//!   instances, otherwise the current UTC time
//!
//! Exactly one instance record must match the id. No records is
//! [`SpotCostError::InstanceNotFound`]; several is
//! [`SpotCostError::AmbiguousInstance`].

use crate::error::{Result, SpotCostError};
use crate::provider::ComputeApi;
use crate::timestamp::{format_timestamp, parse_reason_timestamp};
use crate::types::{InstanceDescriptor, InstanceRecord, TimeWindow};
use chrono::{DateTime, Utc};
use tracing::{Instrument, Span, debug, info, info_span};

/// Resolves the lifetime window of a single instance
pub struct LifetimeResolver<'a> {
    api: &'a dyn ComputeApi,
    span: Span,
}

impl<'a> LifetimeResolver<'a> {
    /// Create a resolver logging under a `lifetime` span
    pub fn new(api: &'a dyn ComputeApi) -> Self {
        let span = info_span!("lifetime", region = api.region());
        Self::with_span(api, span)
    }

    /// Create a resolver logging under the given span
    pub fn with_span(api: &'a dyn ComputeApi, span: Span) -> Self {
        Self { api, span }
    }

    /// Look the instance up and derive its window
    pub async fn resolve(&self, instance_id: &str) -> Result<TimeWindow> {
        async {
            info!(instance_id, "Acquiring start and stop time of instance");

            let descriptor = InstanceDescriptor {
                instance_id: instance_id.to_string(),
                reservations: self.api.describe_instances(instance_id).await?,
            };

            debug!(
                reservations = descriptor.reservations.len(),
                "Instance description received"
            );

            window_from_descriptor(&descriptor, Utc::now())
        }
        .instrument(self.span.clone())
        .await
    }
}

/// Derive the window from a description, using `now` as the end of live instances
pub fn window_from_descriptor(
    descriptor: &InstanceDescriptor,
    now: DateTime<Utc>,
) -> Result<TimeWindow> {
    let record = single_record(descriptor)?;
    let start = format_timestamp(record.launch_time);

    let end = if record.state.has_ended() {
        let parsed = parse_reason_timestamp(&record.state_reason).ok_or_else(|| {
            SpotCostError::MalformedStateReason {
                id: descriptor.instance_id.clone(),
                reason: record.state_reason.clone(),
            }
        })?;
        debug!(state = ?record.state, zone = ?parsed.zone, "Stop time read from state reason");
        parsed.timestamp
    } else {
        info!(
            state = ?record.state,
            "Instance not stopped or terminated yet, using current UTC time"
        );
        format_timestamp(now)
    };

    Ok(TimeWindow { start, end })
}

/// The one record matching the id, or the reason there isn't exactly one
fn single_record(descriptor: &InstanceDescriptor) -> Result<&InstanceRecord> {
    let mut records = descriptor.records();

    let first = records
        .next()
        .ok_or_else(|| SpotCostError::InstanceNotFound(descriptor.instance_id.clone()))?;

    let extra = records.count();
    if extra > 0 {
        return Err(SpotCostError::AmbiguousInstance {
            id: descriptor.instance_id.clone(),
            count: extra + 1,
        });
    }

    Ok(first)
}
