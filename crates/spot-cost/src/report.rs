//! Cost report rendering (console text and JSON)

use crate::cost::{CostEstimate, CostQuery, CostResult};
use serde::Serialize;
use std::fmt;

/// Pricing failure as it appears in the JSON report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingFailure {
    /// Machine-readable kind (e.g., "empty_price_series")
    pub kind: &'static str,

    /// Human-readable cause
    pub message: String,
}

/// Everything printed at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    /// Instance type that was priced
    pub instance_type: String,

    /// Availability zone that was priced
    pub availability_zone: String,

    /// Instance whose lifetime set the window, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Window start
    pub start_time: String,

    /// Window end
    pub end_time: String,

    /// Total cost (0 when pricing failed)
    pub total_cost: f64,

    /// Average hourly cost (0 when pricing failed)
    pub avg_hourly_cost: f64,

    /// Full figures, when pricing succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CostResult>,

    /// Why pricing failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_error: Option<PricingFailure>,
}

impl CostReport {
    /// Build the report for a query and its estimate
    pub fn new(query: &CostQuery, estimate: &CostEstimate) -> Self {
        let (total_cost, avg_hourly_cost) = estimate.outcome.totals();

        Self {
            instance_type: query.instance_type.clone(),
            availability_zone: query.availability_zone.clone(),
            instance_id: query.instance_id.clone(),
            start_time: estimate.window.start.clone(),
            end_time: estimate.window.end.clone(),
            total_cost,
            avg_hourly_cost,
            details: estimate.outcome.result().cloned(),
            pricing_error: estimate.outcome.error().map(|err| PricingFailure {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for CostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "For one: {} in Zone: {}",
            self.instance_type, self.availability_zone
        )?;
        writeln!(f, "From: {} to {}", self.start_time, self.end_time)?;
        writeln!(f, "\tTotal cost = ${}", self.total_cost)?;
        write!(f, "\tAvg hourly cost = ${}", self.avg_hourly_cost)?;

        if let Some(details) = &self.details {
            write!(f, "\n\tMax hourly cost = ${}", details.max_hourly_cost)?;
            write!(
                f,
                "\n\tTime-weighted cost = ${} ({} samples)",
                details.time_weighted_cost, details.sample_count
            )?;
            if let Some(hourly) = details.time_weighted_hourly {
                write!(f, "\n\tTime-weighted hourly cost = ${hourly}")?;
            }
        }

        if let Some(failure) = &self.pricing_error {
            write!(f, "\n\tPricing unavailable: {}", failure.message)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostOutcome;
    use crate::error::PricingError;
    use crate::types::TimeWindow;

    fn query() -> CostQuery {
        CostQuery::default().with_instance_id("i-b3a1cd6a")
    }

    fn window() -> TimeWindow {
        TimeWindow::new("2015-12-01T08:30:00.000Z", "2015-12-01T10:30:00.000Z")
    }

    #[test]
    fn test_priced_report_text() {
        let estimate = CostEstimate {
            window: window(),
            outcome: CostOutcome::Priced(CostResult {
                total_cost: 0.5,
                avg_hourly_cost: 0.25,
                max_hourly_cost: 0.3,
                time_weighted_cost: 0.45,
                time_weighted_hourly: Some(0.15),
                hours: 2.0,
                sample_count: 4,
            }),
        };

        let text = CostReport::new(&query(), &estimate).to_string();

        assert_eq!(
            text,
            "For one: c3.8xlarge in Zone: us-west-2a\n\
             From: 2015-12-01T08:30:00.000Z to 2015-12-01T10:30:00.000Z\n\
             \tTotal cost = $0.5\n\
             \tAvg hourly cost = $0.25\n\
             \tMax hourly cost = $0.3\n\
             \tTime-weighted cost = $0.45 (4 samples)\n\
             \tTime-weighted hourly cost = $0.15"
        );
    }

    #[test]
    fn test_degraded_report_text() {
        let estimate = CostEstimate {
            window: window(),
            outcome: CostOutcome::Degraded(PricingError::Api("timed out".into())),
        };

        let text = CostReport::new(&query(), &estimate).to_string();

        assert!(text.contains("Total cost = $0\n"));
        assert!(text.contains("Pricing unavailable: spot price request failed: timed out"));
        assert!(!text.contains("Max hourly cost"));
    }

    #[test]
    fn test_degraded_report_json() {
        let estimate = CostEstimate {
            window: window(),
            outcome: CostOutcome::Degraded(PricingError::EmptyPriceSeries {
                start: window().start,
                end: window().end,
            }),
        };

        let json = CostReport::new(&query(), &estimate).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["instance_id"], "i-b3a1cd6a");
        assert_eq!(value["total_cost"], 0.0);
        assert_eq!(value["pricing_error"]["kind"], "empty_price_series");
        assert!(value.get("details").is_none());
    }
}
