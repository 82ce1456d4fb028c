//! Error types for spot cost estimation

use thiserror::Error;

/// Spot cost result type
pub type Result<T> = std::result::Result<T, SpotCostError>;

/// Errors that abort a cost estimate
#[derive(Error, Debug)]
pub enum SpotCostError {
    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(#[from] aws_sdk_ec2::Error),

    /// No reservation or instance record matched the id
    #[error("Spot Instance {0} not found")]
    InstanceNotFound(String),

    /// More than one instance record matched the id
    #[error("Spot Instance {id} matched {count} instance records")]
    AmbiguousInstance {
        /// Instance ID that was looked up
        id: String,
        /// Number of matching records
        count: usize,
    },

    /// Cost requested without a complete window and without an instance id
    #[error("an instance id is required when the start or end time is omitted")]
    MissingInstanceId,

    /// Stopped/terminated instance whose state reason carries no timestamp
    #[error("cannot read stop time of {id} from state reason {reason:?}")]
    MalformedStateReason {
        /// Instance ID
        id: String,
        /// State reason as reported
        reason: String,
    },

    /// Timestamp could not be parsed or converted
    #[error("Timestamp error: {0}")]
    Timestamp(String),

    /// Spot price string that is not a number
    #[error("malformed spot price {0:?}")]
    MalformedPrice(String),

    /// Generic AWS service error
    #[error("AWS service error: {0}")]
    AwsService(String),
}

impl SpotCostError {
    /// Create a timestamp error
    pub fn timestamp(msg: impl Into<String>) -> Self {
        Self::Timestamp(msg.into())
    }

    /// Convert from EC2 SDK error
    pub fn from_ec2<E>(err: E) -> Self
    where
        aws_sdk_ec2::Error: From<E>,
    {
        Self::Aws(aws_sdk_ec2::Error::from(err))
    }
}

/// Reasons a price lookup produced no usable figures.
///
/// These never abort the run; the aggregator reports them as a degraded outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    /// The API returned no samples for the window
    #[error("no spot price samples between {start} and {end}")]
    EmptyPriceSeries {
        /// Window start
        start: String,
        /// Window end
        end: String,
    },

    /// The price history request itself failed
    #[error("spot price request failed: {0}")]
    Api(String),

    /// A window bound is not in `YYYY-MM-DDTHH:MM:SS.000Z` form
    #[error("bad window timestamp: {0}")]
    Timestamp(String),

    /// A sample carried a price that is not a number
    #[error("malformed spot price {0:?}")]
    MalformedPrice(String),
}

impl PricingError {
    /// Short machine-readable label, used in the JSON report
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPriceSeries { .. } => "empty_price_series",
            Self::Api(_) => "api",
            Self::Timestamp(_) => "timestamp",
            Self::MalformedPrice(_) => "malformed_price",
        }
    }
}

impl From<SpotCostError> for PricingError {
    fn from(err: SpotCostError) -> Self {
        match err {
            SpotCostError::Timestamp(msg) => Self::Timestamp(msg),
            SpotCostError::MalformedPrice(price) => Self::MalformedPrice(price),
            other => Self::Api(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_instance() {
        let err = SpotCostError::InstanceNotFound("i-b3a1cd6a".to_string());
        assert!(err.to_string().contains("i-b3a1cd6a"));
    }

    #[test]
    fn test_pricing_error_from_spot_cost_error() {
        let api: PricingError = SpotCostError::AwsService("throttled".into()).into();
        assert!(matches!(api, PricingError::Api(ref m) if m.contains("throttled")));

        let ts: PricingError = SpotCostError::timestamp("bad").into();
        assert_eq!(ts, PricingError::Timestamp("bad".to_string()));
    }

    #[test]
    fn test_pricing_error_kind() {
        let empty = PricingError::EmptyPriceSeries {
            start: "a".into(),
            end: "b".into(),
        };
        assert_eq!(empty.kind(), "empty_price_series");
        assert_eq!(PricingError::Api("x".into()).kind(), "api");
    }
}
