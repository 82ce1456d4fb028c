//! Spot cost aggregation
//!
//! Prices a window for one instance type in one availability zone:
//!
//! ```text
//! avg_hourly = Σ price / n
//! total      = hours(end - start) × avg_hourly
//! ```
//!
//! Time-weighted figures are computed next to it from the timestamped
//! samples, charging each price until the next sample takes effect:
//!
//! ```text
//! weighted        = Σ price_i × (t_{i+1} - t_i) / 3600
//! weighted_hourly = weighted × 3600 / (t_last - t_first)
//! ```
//!
//! ## Failure policy
//!
//! Missing window bounds without an instance id, and every lifetime lookup
//! failure, abort with [`SpotCostError`]. Anything that goes wrong while
//! pricing (bad bounds, API failure, empty series) is logged and reported as
//! [`CostOutcome::Degraded`] instead.

use crate::error::{PricingError, Result, SpotCostError};
use crate::lifetime::LifetimeResolver;
use crate::provider::ComputeApi;
use crate::timestamp::{format_timestamp, hours_between, parse_timestamp};
use crate::types::{PriceSample, SpotPriceQuery, TimeWindow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument, Span, info, info_span, warn};

/// Default instance type
pub const DEFAULT_INSTANCE_TYPE: &str = "c3.8xlarge";

/// Default availability zone
pub const DEFAULT_AVAILABILITY_ZONE: &str = "us-west-2a";

/// What to price
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    /// Instance type (e.g., "c3.8xlarge")
    pub instance_type: String,

    /// Availability zone (e.g., "us-west-2a")
    pub availability_zone: String,

    /// Instance whose lifetime is the window, when bounds are not given
    pub instance_id: Option<String>,

    /// Window start (`YYYY-MM-DDTHH:MM:SS.000Z`)
    pub start_time: Option<String>,

    /// Window end (`YYYY-MM-DDTHH:MM:SS.000Z`)
    pub end_time: Option<String>,
}

impl CostQuery {
    /// Create a query with no instance and no window
    pub fn new(instance_type: impl Into<String>, availability_zone: impl Into<String>) -> Self {
        Self {
            instance_type: instance_type.into(),
            availability_zone: availability_zone.into(),
            instance_id: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Price the lifetime of this instance
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Price an explicit window
    pub fn with_window(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_time = Some(start.into());
        self.end_time = Some(end.into());
        self
    }
}

impl Default for CostQuery {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE_TYPE, DEFAULT_AVAILABILITY_ZONE)
    }
}

/// Figures for a successfully priced window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostResult {
    /// `hours × avg_hourly_cost`
    pub total_cost: f64,

    /// Mean of the sample prices
    pub avg_hourly_cost: f64,

    /// Highest sample price
    pub max_hourly_cost: f64,

    /// Each price charged until the next sample
    pub time_weighted_cost: f64,

    /// `time_weighted_cost` spread over the span of the samples; `None`
    /// when fewer than two timestamped samples cover a non-zero span
    pub time_weighted_hourly: Option<f64>,

    /// Window length in hours
    pub hours: f64,

    /// Number of price samples
    pub sample_count: usize,
}

/// Result of the pricing step
#[derive(Debug, Clone, PartialEq)]
pub enum CostOutcome {
    /// Prices were fetched and reduced
    Priced(CostResult),
    /// Pricing failed; the run continues with zero figures
    Degraded(PricingError),
}

impl CostOutcome {
    /// `(total_cost, avg_hourly_cost)`, `(0.0, 0.0)` when degraded
    pub fn totals(&self) -> (f64, f64) {
        match self {
            Self::Priced(result) => (result.total_cost, result.avg_hourly_cost),
            Self::Degraded(_) => (0.0, 0.0),
        }
    }

    /// [`totals`](Self::totals) as strings
    pub fn as_strings(&self) -> (String, String) {
        let (total, avg) = self.totals();
        (total.to_string(), avg.to_string())
    }

    /// Whether pricing failed
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// The figures, if priced
    pub fn result(&self) -> Option<&CostResult> {
        match self {
            Self::Priced(result) => Some(result),
            Self::Degraded(_) => None,
        }
    }

    /// The pricing failure, if degraded
    pub fn error(&self) -> Option<&PricingError> {
        match self {
            Self::Priced(_) => None,
            Self::Degraded(err) => Some(err),
        }
    }
}

/// A priced (or failed) window
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    /// The window that was priced
    pub window: TimeWindow,

    /// Pricing outcome
    pub outcome: CostOutcome,
}

/// Reduce price samples over a window
///
/// An empty series is [`PricingError::EmptyPriceSeries`], never a zero cost.
pub fn summarize(
    samples: &[PriceSample],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> std::result::Result<CostResult, PricingError> {
    let (total, n) = samples
        .iter()
        .fold((0.0_f64, 0_usize), |(total, n), s| (total + s.price, n + 1));

    if n == 0 {
        return Err(PricingError::EmptyPriceSeries {
            start: format_timestamp(start),
            end: format_timestamp(end),
        });
    }

    let avg_hourly_cost = total / n as f64;
    let hours = hours_between(start, end);
    let weighted = TimeWeighted::from_samples(samples);

    Ok(CostResult {
        total_cost: hours * avg_hourly_cost,
        avg_hourly_cost,
        max_hourly_cost: samples.iter().map(|s| s.price).fold(f64::MIN, f64::max),
        time_weighted_cost: weighted.cost,
        time_weighted_hourly: weighted.hourly(),
        hours,
        sample_count: n,
    })
}

/// Price integrated over the timestamped samples
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeWeighted {
    /// Each price charged from its timestamp until the next sample's
    cost: f64,
    /// Seconds between the first and last timestamped sample
    span_secs: i64,
}

impl TimeWeighted {
    /// Untimed samples are skipped
    fn from_samples(samples: &[PriceSample]) -> Self {
        let mut timed: Vec<(DateTime<Utc>, f64)> = samples
            .iter()
            .filter_map(|s| s.timestamp.map(|t| (t, s.price)))
            .collect();
        timed.sort_by_key(|(t, _)| *t);

        let cost = timed
            .windows(2)
            .map(|pair| {
                let seconds = (pair[1].0 - pair[0].0).num_seconds();
                pair[0].1 * seconds as f64 / 3600.0
            })
            .sum();

        let span_secs = match (timed.first(), timed.last()) {
            (Some((first, _)), Some((last, _))) => (*last - *first).num_seconds(),
            _ => 0,
        };

        Self { cost, span_secs }
    }

    /// Average hourly rate over the sampled span
    fn hourly(&self) -> Option<f64> {
        (self.span_secs > 0).then(|| self.cost * 3600.0 / self.span_secs as f64)
    }
}

/// Prices instance windows against spot price history
pub struct CostAggregator<'a> {
    api: &'a dyn ComputeApi,
    span: Span,
}

impl<'a> CostAggregator<'a> {
    /// Create an aggregator logging under a `cost` span
    pub fn new(api: &'a dyn ComputeApi) -> Self {
        let span = info_span!("cost", region = api.region());
        Self::with_span(api, span)
    }

    /// Create an aggregator logging under the given span
    pub fn with_span(api: &'a dyn ComputeApi, span: Span) -> Self {
        Self { api, span }
    }

    /// Resolve the window if needed, then price it
    ///
    /// # Errors
    /// - [`SpotCostError::MissingInstanceId`] when a bound is missing and no
    ///   instance id was given
    /// - any [`LifetimeResolver::resolve`] error
    pub async fn compute_cost(&self, query: &CostQuery) -> Result<CostEstimate> {
        async {
            let window = self.window_for(query).await?;

            info!(
                instance_type = %query.instance_type,
                availability_zone = %query.availability_zone,
                "Calculating costs"
            );

            let outcome = match self.price_window(query, &window).await {
                Ok(result) => {
                    info!(
                        total_cost = result.total_cost,
                        avg_hourly_cost = result.avg_hourly_cost,
                        samples = result.sample_count,
                        "Window priced"
                    );
                    CostOutcome::Priced(result)
                }
                Err(err) => {
                    warn!(
                        start = %window.start,
                        end = %window.end,
                        error = %err,
                        "Failed to fetch prices; check window bounds"
                    );
                    CostOutcome::Degraded(err)
                }
            };

            Ok::<_, SpotCostError>(CostEstimate { window, outcome })
        }
        .instrument(self.span.clone())
        .await
    }

    async fn window_for(&self, query: &CostQuery) -> Result<TimeWindow> {
        if let (Some(start), Some(end)) = (&query.start_time, &query.end_time) {
            return Ok(TimeWindow::new(start.clone(), end.clone()));
        }

        let instance_id = query
            .instance_id
            .as_deref()
            .ok_or(SpotCostError::MissingInstanceId)?;

        LifetimeResolver::with_span(self.api, self.span.clone())
            .resolve(instance_id)
            .await
    }

    async fn price_window(
        &self,
        query: &CostQuery,
        window: &TimeWindow,
    ) -> std::result::Result<CostResult, PricingError> {
        let start = parse_timestamp(&window.start)?;
        let end = parse_timestamp(&window.end)?;

        let samples = self
            .api
            .spot_price_history(&SpotPriceQuery {
                instance_type: query.instance_type.clone(),
                availability_zone: query.availability_zone.clone(),
                start,
                end,
            })
            .await?;

        summarize(&samples, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticCompute;
    use crate::types::{InstanceRecord, InstanceState};
    use chrono::{Duration, TimeZone};

    const START: &str = "2015-12-01T08:30:00.000Z";
    const END: &str = "2015-12-01T10:30:00.000Z";

    fn hourly_prices(prices: &[f64]) -> Vec<PriceSample> {
        let t0 = Utc.with_ymd_and_hms(2015, 12, 1, 8, 30, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PriceSample::new(*p, t0 + Duration::hours(i as i64)))
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[tokio::test]
    async fn test_two_hour_window_cost() {
        let api = StaticCompute::new().with_prices(hourly_prices(&[0.10, 0.20, 0.30]));
        let query = CostQuery::default().with_window(START, END);

        let estimate = CostAggregator::new(&api).compute_cost(&query).await.unwrap();
        let (total, avg) = estimate.outcome.totals();

        assert!(approx(total, 0.40));
        assert!(approx(avg, 0.20));
        assert_eq!(api.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_window_and_instance_id() {
        let api = StaticCompute::new();

        let err = CostAggregator::new(&api)
            .compute_cost(&CostQuery::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SpotCostError::MissingInstanceId));
        assert_eq!(api.price_calls(), 0);
    }

    #[tokio::test]
    async fn test_half_window_needs_instance_id() {
        let api = StaticCompute::new();
        let mut query = CostQuery::default();
        query.start_time = Some(START.to_string());

        let err = CostAggregator::new(&api).compute_cost(&query).await.unwrap_err();
        assert!(matches!(err, SpotCostError::MissingInstanceId));
    }

    #[tokio::test]
    async fn test_empty_series_degrades_to_zero() {
        let api = StaticCompute::new();
        let query = CostQuery::default().with_window(START, END);

        let estimate = CostAggregator::new(&api).compute_cost(&query).await.unwrap();

        assert_eq!(estimate.outcome.totals(), (0.0, 0.0));
        assert!(matches!(
            estimate.outcome,
            CostOutcome::Degraded(PricingError::EmptyPriceSeries { .. })
        ));
    }

    #[tokio::test]
    async fn test_api_failure_is_distinguished_from_empty_series() {
        let api = StaticCompute::new().failing_prices("connection reset");
        let query = CostQuery::default().with_window(START, END);

        let estimate = CostAggregator::new(&api).compute_cost(&query).await.unwrap();

        assert_eq!(estimate.outcome.totals(), (0.0, 0.0));
        assert!(matches!(
            estimate.outcome.error(),
            Some(PricingError::Api(msg)) if msg.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn test_malformed_window_degrades() {
        let api = StaticCompute::new().with_prices(hourly_prices(&[0.10]));
        let query = CostQuery::default().with_window("yesterday", END);

        let estimate = CostAggregator::new(&api).compute_cost(&query).await.unwrap();

        assert!(matches!(
            estimate.outcome,
            CostOutcome::Degraded(PricingError::Timestamp(_))
        ));
        assert_eq!(api.price_calls(), 0);
    }

    #[tokio::test]
    async fn test_window_resolved_from_instance() {
        let api = StaticCompute::new()
            .with_instance(InstanceRecord {
                instance_id: "i-b3a1cd6a".to_string(),
                launch_time: Utc.with_ymd_and_hms(2015, 12, 1, 8, 30, 0).unwrap(),
                state: InstanceState::Terminated,
                state_reason: "User initiated (2015-12-01 10:30:00 GMT)".to_string(),
            })
            .with_prices(hourly_prices(&[0.10, 0.20, 0.30]));
        let query = CostQuery::default().with_instance_id("i-b3a1cd6a");

        let estimate = CostAggregator::new(&api).compute_cost(&query).await.unwrap();

        assert_eq!(estimate.window, TimeWindow::new(START, END));
        assert!(approx(estimate.outcome.totals().0, 0.40));
    }

    #[tokio::test]
    async fn test_lifetime_errors_are_fatal() {
        let api = StaticCompute::new();
        let query = CostQuery::default().with_instance_id("i-missing");

        let err = CostAggregator::new(&api).compute_cost(&query).await.unwrap_err();
        assert!(matches!(err, SpotCostError::InstanceNotFound(_)));
    }

    #[test]
    fn test_summarize_supplementary_figures() {
        let samples = hourly_prices(&[0.10, 0.20, 0.30]);
        let start = Utc.with_ymd_and_hms(2015, 12, 1, 8, 30, 0).unwrap();
        let end = start + Duration::hours(2);

        let result = summarize(&samples, start, end).unwrap();

        assert_eq!(result.sample_count, 3);
        assert_eq!(result.hours, 2.0);
        assert_eq!(result.max_hourly_cost, 0.30);
        // 0.10 for the first hour, 0.20 for the second
        assert!(approx(result.time_weighted_cost, 0.30));
        assert!(approx(result.time_weighted_hourly.unwrap(), 0.15));
    }

    #[test]
    fn test_time_weighted_ignores_input_order() {
        let mut samples = hourly_prices(&[0.10, 0.20, 0.30]);
        samples.reverse();

        let weighted = TimeWeighted::from_samples(&samples);
        assert!(approx(weighted.cost, 0.30));
        assert_eq!(weighted.span_secs, 2 * 3600);
    }

    #[test]
    fn test_time_weighted_hourly_needs_a_span() {
        let single = TimeWeighted::from_samples(&hourly_prices(&[0.30]));
        assert_eq!(single.cost, 0.0);
        assert_eq!(single.hourly(), None);

        let untimed = TimeWeighted::from_samples(&[PriceSample::untimed(0.5)]);
        assert_eq!(untimed.hourly(), None);
    }

    #[test]
    fn test_untimed_sample_still_counts_toward_mean() {
        let mut samples = hourly_prices(&[0.10, 0.20]);
        samples.push(PriceSample::untimed(0.30));
        let start = Utc.with_ymd_and_hms(2015, 12, 1, 8, 30, 0).unwrap();

        let result = summarize(&samples, start, start + Duration::hours(2)).unwrap();

        assert_eq!(result.sample_count, 3);
        assert!(approx(result.avg_hourly_cost, 0.20));
        assert!(approx(result.total_cost, 0.40));
        assert!(approx(result.time_weighted_cost, 0.10));
        assert!(approx(result.time_weighted_hourly.unwrap(), 0.10));
    }

    #[tokio::test]
    async fn test_untimed_sample_does_not_degrade_estimate() {
        let mut prices = hourly_prices(&[0.10, 0.20]);
        prices.push(PriceSample::untimed(0.30));
        let api = StaticCompute::new().with_prices(prices);
        let query = CostQuery::default().with_window(START, END);

        let estimate = CostAggregator::new(&api).compute_cost(&query).await.unwrap();

        assert!(!estimate.outcome.is_degraded());
        assert!(approx(estimate.outcome.totals().1, 0.20));
    }

    #[test]
    fn test_outcome_strings() {
        let degraded = CostOutcome::Degraded(PricingError::Api("down".into()));
        assert_eq!(degraded.as_strings(), ("0".to_string(), "0".to_string()));
        assert!(degraded.is_degraded());
        assert!(degraded.result().is_none());
    }
}
