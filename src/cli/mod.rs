//! # POOLCTL CLI
//!
//! Command-line interface for the connection pooling stack.
//!
//! ## Usage
//!
//! ```bash
//! # Render the CloudFormation template
//! poolctl synth --out template.json
//!
//! # Show the apply order, or run it against the in-memory platform
//! poolctl plan
//! poolctl plan --simulate
//!
//! # Check the topology properties
//! poolctl validate
//!
//! # Deploy, read outputs, call the endpoint, tear down
//! poolctl deploy --asset-bucket my-assets
//! poolctl outputs
//! poolctl ping --count 3
//! poolctl destroy --yes --allow-data-loss
//!
//! # JSON schema of the config file
//! poolctl schema
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use connection_pooling::observability::logging::{init_tracing_with_env_file, LogFormat};
use std::path::PathBuf;

/// Connection pooling stack CLI
#[derive(Debug, Parser)]
#[command(name = "poolctl")]
#[command(
    about = "Build, validate and deploy the connection pooling stack",
    long_about = None,
    after_help = "\
Examples:
  poolctl synth --out template.json
  poolctl plan --simulate
  poolctl deploy --asset-bucket my-assets
  poolctl ping --count 3
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Stack configuration file (YAML); defaults apply when omitted
    #[arg(short, long, global = true, env = "POOLCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the stack name
    #[arg(long, global = true)]
    stack_name: Option<String>,

    /// Override the AWS region
    #[arg(short, long, global = true)]
    region: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render the CloudFormation template
    Synth {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Default value of the AssetBucket parameter
        #[arg(long)]
        asset_bucket: Option<String>,
    },
    /// Show the resources in apply order
    Plan {
        /// Apply against the in-memory platform and print the result
        #[arg(long)]
        simulate: bool,
    },
    /// Run the topology checks; exits non-zero when one fails
    Validate,
    /// Upload the function package and create or update the stack
    Deploy {
        /// Bucket the function package is uploaded to
        #[arg(long, env = "ASSET_BUCKET")]
        asset_bucket: Option<String>,
    },
    /// Delete the stack
    Destroy {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,

        /// Also delete resources kept by a snapshot removal policy (the database)
        #[arg(long)]
        allow_data_loss: bool,

        /// Apply then destroy against the in-memory platform
        #[arg(long)]
        simulate: bool,
    },
    /// Print the outputs of the deployed stack
    Outputs,
    /// Print the JSON schema of the configuration file
    Schema,
    /// Call the deployed endpoint
    Ping {
        /// Endpoint URL; read from the ApiEndpoint output when omitted
        #[arg(long)]
        url: Option<String>,

        /// Number of sequential requests
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls needs a process-wide provider before any TLS client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    init_tracing_with_env_file(LogFormat::Text, None);

    let cli = Cli::parse();
    let overrides = commands::Overrides {
        config: cli.config,
        stack_name: cli.stack_name,
        region: cli.region,
    };

    match cli.command {
        Commands::Synth { out, asset_bucket } => {
            commands::synth_command(&overrides, out, asset_bucket)
        }
        Commands::Plan { simulate } => commands::plan_command(&overrides, simulate).await,
        Commands::Validate => commands::validate_command(&overrides),
        Commands::Deploy { asset_bucket } => {
            commands::deploy_command(&overrides, asset_bucket).await
        }
        Commands::Destroy {
            yes,
            allow_data_loss,
            simulate,
        } => commands::destroy_command(&overrides, yes, allow_data_loss, simulate).await,
        Commands::Outputs => commands::outputs_command(&overrides).await,
        Commands::Schema => commands::schema_command(),
        Commands::Ping { url, count } => commands::ping_command(&overrides, url, count).await,
    }
}
