//! spot-cost - historical cost of one EC2 spot instance
//!
//! ## Usage
//!
//! ```bash
//! # Price the lifetime of a terminated instance
//! spot-cost -t c3.8xlarge -i i-b3a1cd6a -a us-west-2a
//!
//! # Same, as JSON
//! spot-cost -i i-b3a1cd6a --json
//! ```
//!
//! Credentials come from the usual AWS configuration (environment,
//! `~/.aws/credentials`, instance profile). Log verbosity follows `RUST_LOG`.

use clap::Parser;
use spot_cost::{
    CostAggregator, CostQuery, CostReport, DEFAULT_AVAILABILITY_ZONE, DEFAULT_INSTANCE_TYPE,
    Ec2Compute,
};
use tracing::{debug, info_span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Computes the spot market cost of a stopped, terminated or running instance
#[derive(Parser)]
#[command(name = "spot-cost")]
#[command(about = "Historical cost of a single EC2 spot instance", long_about = None)]
struct Cli {
    /// Instance type, e.g. m4.large or c3.8xlarge
    #[arg(short = 't', long = "instance_type", default_value = DEFAULT_INSTANCE_TYPE)]
    instance_type: String,

    /// Instance ID (second column in the EC2 console)
    #[arg(short = 'i', long = "instance_id")]
    instance_id: String,

    /// Availability zone from the instance description
    #[arg(short = 'a', long = "avail_zone", default_value = DEFAULT_AVAILABILITY_ZONE)]
    avail_zone: String,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spot_cost=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    debug!(version = env!("CARGO_PKG_VERSION"), "spot-cost starting");

    let api = Ec2Compute::connect(None).await;

    let query = CostQuery::new(cli.instance_type, cli.avail_zone).with_instance_id(cli.instance_id);
    let span = info_span!("spot_cost", instance_id = query.instance_id.as_deref());
    let estimate = CostAggregator::with_span(&api, span)
        .compute_cost(&query)
        .await?;

    let report = CostReport::new(&query, &estimate);
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }

    Ok(())
}
