//! # Spot Cost
//!
//! Historical cost of a single EC2 spot instance.
//!
//! ## Flow
//!
//! ```text
//! instance id ──► LifetimeResolver ──► TimeWindow ──┐
//!                  (DescribeInstances)               ├──► CostAggregator ──► CostReport
//! explicit start/end ───────────────────────────────┘  (DescribeSpotPriceHistory)
//! ```
//!
//! Both components reach EC2 only through [`ComputeApi`], so they can be
//! driven by [`StaticCompute`] without AWS credentials.
//!
//! Window bounds use the fixed `YYYY-MM-DDTHH:MM:SS.000Z` format (see
//! [`timestamp`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cost;
pub mod error;
pub mod lifetime;
pub mod provider;
pub mod report;
pub mod timestamp;
pub mod types;

// Error handling
pub use error::{PricingError, Result, SpotCostError};

// Cost aggregation
pub use cost::{
    CostAggregator, CostEstimate, CostOutcome, CostQuery, CostResult, DEFAULT_AVAILABILITY_ZONE,
    DEFAULT_INSTANCE_TYPE,
};

// Lifetime resolution
pub use lifetime::LifetimeResolver;

// Cloud API
pub use provider::{ComputeApi, DEFAULT_REGION, Ec2Compute, StaticCompute, create_ec2_client};

// Reporting
pub use report::CostReport;

// Domain types
pub use types::{
    InstanceDescriptor, InstanceRecord, InstanceState, PriceSample, Reservation, SpotPriceQuery,
    TimeWindow,
};
