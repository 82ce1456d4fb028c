//! Cloud compute API seam
//!
//! The resolver and aggregator only ever talk to [`ComputeApi`]. The
//! production implementation, [`Ec2Compute`], wraps the EC2 SDK client;
//! tests use [`StaticCompute`], which serves canned responses.

use crate::error::{Result, SpotCostError};
use crate::types::{InstanceRecord, InstanceState, PriceSample, Reservation, SpotPriceQuery};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::{
    error::ProvideErrorMetadata,
    primitives::DateTime as AwsDateTime,
    types::{Instance, InstanceStateName, InstanceType, SpotPrice},
    Client,
};
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, warn};

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-west-2";

/// EC2 error codes that mean the id does not exist
const NOT_FOUND_CODES: &[&str] = &["InvalidInstanceID.NotFound", "InvalidInstanceID.Malformed"];

/// The two EC2 operations a cost estimate needs
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Region the client is bound to
    fn region(&self) -> &str;

    /// All reservations containing `instance_id`
    async fn describe_instances(&self, instance_id: &str) -> Result<Vec<Reservation>>;

    /// Spot price samples for a type and zone inside a window
    async fn spot_price_history(&self, query: &SpotPriceQuery) -> Result<Vec<PriceSample>>;
}

/// Create EC2 client from environment
pub async fn create_ec2_client(region: Option<String>) -> Client {
    let region_str = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
    debug!("Creating EC2 client for region: {}", region_str);

    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region_str))
        .load()
        .await;

    Client::new(&config)
}

/// [`ComputeApi`] backed by the EC2 SDK
pub struct Ec2Compute {
    client: Client,
    region: String,
}

impl Ec2Compute {
    /// Wrap an existing client
    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    /// Build a client for `region` (default `us-west-2`) from the ambient AWS config
    pub async fn connect(region: Option<String>) -> Self {
        let region = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        let client = create_ec2_client(Some(region.clone())).await;
        Self::new(client, region)
    }
}

#[async_trait]
impl ComputeApi for Ec2Compute {
    fn region(&self) -> &str {
        &self.region
    }

    async fn describe_instances(&self, instance_id: &str) -> Result<Vec<Reservation>> {
        debug!(instance_id, region = %self.region, "Describing instance");

        let response = match self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                if is_not_found_code(err.as_service_error().and_then(|e| e.code())) {
                    return Err(SpotCostError::InstanceNotFound(instance_id.to_string()));
                }
                return Err(SpotCostError::from_ec2(err));
            }
        };

        response
            .reservations()
            .iter()
            .map(|reservation| {
                Ok::<_, SpotCostError>(Reservation {
                    reservation_id: reservation.reservation_id().map(str::to_string),
                    instances: reservation
                        .instances()
                        .iter()
                        .map(record_from_aws_instance)
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect()
    }

    async fn spot_price_history(&self, query: &SpotPriceQuery) -> Result<Vec<PriceSample>> {
        debug!(
            instance_type = %query.instance_type,
            availability_zone = %query.availability_zone,
            "Fetching spot price history"
        );

        let samples = collect_pages(|next_token| async move {
            let response = self
                .client
                .describe_spot_price_history()
                .instance_types(InstanceType::from(query.instance_type.as_str()))
                .availability_zone(&query.availability_zone)
                .start_time(to_aws_datetime(query.start))
                .end_time(to_aws_datetime(query.end))
                .set_next_token(next_token)
                .send()
                .await
                .map_err(SpotCostError::from_ec2)?;

            let page = response
                .spot_price_history()
                .iter()
                .map(sample_from_aws_price)
                .collect::<Result<Vec<_>>>()?;

            Ok::<_, SpotCostError>((page, response.next_token().map(str::to_string)))
        })
        .await?;

        debug!(count = samples.len(), "Spot price history fetched");
        Ok(samples)
    }
}

/// Whether an EC2 error code means the instance id does not exist
fn is_not_found_code(code: Option<&str>) -> bool {
    code.is_some_and(|c| NOT_FOUND_CODES.contains(&c))
}

/// Drive a `next_token` paginated request until the token runs out
///
/// `fetch` gets the token for the page to request (`None` for the first) and
/// returns that page's items with the token of the next one. An empty token
/// ends the listing the same way a missing one does.
async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>)>>,
{
    let mut items = Vec::new();
    let mut next_token = None;

    loop {
        let (page, token) = fetch(next_token.take()).await?;
        items.extend(page);

        match token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(items)
}

/// Convert an SDK instance into a domain record
fn record_from_aws_instance(instance: &Instance) -> Result<InstanceRecord> {
    let state = match instance.state().and_then(|s| s.name()) {
        Some(InstanceStateName::Pending) => InstanceState::Pending,
        Some(InstanceStateName::Running) => InstanceState::Running,
        Some(InstanceStateName::ShuttingDown) => InstanceState::ShuttingDown,
        Some(InstanceStateName::Stopping) => InstanceState::Stopping,
        Some(InstanceStateName::Stopped) => InstanceState::Stopped,
        Some(InstanceStateName::Terminated) => InstanceState::Terminated,
        _ => InstanceState::Other,
    };

    let instance_id = instance.instance_id().unwrap_or("unknown").to_string();

    let launch_time = instance
        .launch_time()
        .ok_or_else(|| {
            SpotCostError::timestamp(format!("instance {instance_id} has no launch time"))
        })
        .and_then(from_aws_datetime)?;

    Ok(InstanceRecord {
        instance_id,
        launch_time,
        state,
        state_reason: instance
            .state_transition_reason()
            .unwrap_or_default()
            .to_string(),
    })
}

/// Convert an SDK spot price into a sample
///
/// Only the price is required. A missing or out-of-range timestamp leaves the
/// sample untimed, so it still counts toward the mean price.
fn sample_from_aws_price(price: &SpotPrice) -> Result<PriceSample> {
    let raw = price.spot_price().unwrap_or_default();
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| SpotCostError::MalformedPrice(raw.to_string()))?;

    let timestamp = match price.timestamp().map(from_aws_datetime) {
        Some(Ok(t)) => Some(t),
        Some(Err(err)) => {
            warn!(error = %err, "Ignoring spot price timestamp");
            None
        }
        None => {
            debug!(price = value, "Spot price sample has no timestamp");
            None
        }
    };

    Ok(PriceSample {
        price: value,
        timestamp,
    })
}

fn to_aws_datetime(t: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_secs(t.timestamp())
}

fn from_aws_datetime(dt: &AwsDateTime) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
        .ok_or_else(|| SpotCostError::timestamp(format!("timestamp out of range: {}", dt.secs())))
}

/// In-memory [`ComputeApi`] serving fixed responses
///
/// Records how many calls were made so callers can check that a lookup was
/// (or was not) performed.
#[derive(Debug, Default)]
pub struct StaticCompute {
    reservations: Vec<Reservation>,
    prices: Vec<PriceSample>,
    price_failure: Option<String>,
    describe_calls: std::sync::atomic::AtomicUsize,
    price_calls: std::sync::atomic::AtomicUsize,
}

impl StaticCompute {
    /// Empty API: no instances, no prices
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reservation to the describe response
    pub fn with_reservation(mut self, reservation: Reservation) -> Self {
        self.reservations.push(reservation);
        self
    }

    /// Serve a single-instance reservation
    pub fn with_instance(self, record: InstanceRecord) -> Self {
        self.with_reservation(Reservation {
            reservation_id: None,
            instances: vec![record],
        })
    }

    /// Set the price history response
    pub fn with_prices(mut self, prices: Vec<PriceSample>) -> Self {
        self.prices = prices;
        self
    }

    /// Make every price history request fail with `message`
    pub fn failing_prices(mut self, message: impl Into<String>) -> Self {
        self.price_failure = Some(message.into());
        self
    }

    /// Number of describe_instances calls so far
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of spot_price_history calls so far
    pub fn price_calls(&self) -> usize {
        self.price_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeApi for StaticCompute {
    fn region(&self) -> &str {
        DEFAULT_REGION
    }

    async fn describe_instances(&self, instance_id: &str) -> Result<Vec<Reservation>> {
        self.describe_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        Ok(self
            .reservations
            .iter()
            .map(|r| Reservation {
                reservation_id: r.reservation_id.clone(),
                instances: r
                    .instances
                    .iter()
                    .filter(|i| i.instance_id == instance_id)
                    .cloned()
                    .collect(),
            })
            .filter(|r| !r.instances.is_empty())
            .collect())
    }

    async fn spot_price_history(&self, query: &SpotPriceQuery) -> Result<Vec<PriceSample>> {
        self.price_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if let Some(message) = &self.price_failure {
            return Err(SpotCostError::AwsService(message.clone()));
        }

        debug!(instance_type = %query.instance_type, "Serving canned spot prices");
        Ok(self.prices.clone())
    }
}
