//! Subcommand implementations.

use anyhow::{Context, Result};
use connection_pooling::asset::CodeAsset;
use connection_pooling::config::StackConfig;
use connection_pooling::provision::{
    CloudFormationDeployer, DeployerOptions, DestroyOptions, InMemoryProvisioner, Provisioner,
    ProvisionerOptions,
};
use connection_pooling::runtime::PingResponse;
use connection_pooling::stack::{ConnectionPoolingStack, Stack};
use connection_pooling::synth::{synthesize, SynthContext};
use connection_pooling::topology::RemovalPolicy;
use connection_pooling::validation::validate_stack;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

const API_ENDPOINT_OUTPUT: &str = "ApiEndpoint";

/// Global flags that adjust the loaded configuration
#[derive(Debug)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub stack_name: Option<String>,
    pub region: Option<String>,
}

fn load_config(overrides: &Overrides) -> Result<StackConfig> {
    let mut config = StackConfig::load(overrides.config.as_deref())
        .context("Failed to load stack configuration")?;
    if let Some(name) = &overrides.stack_name {
        config.stack_name.clone_from(name);
    }
    if let Some(region) = &overrides.region {
        config.region = Some(region.clone());
    }
    config.validate().context("Invalid stack configuration")?;
    Ok(config)
}

fn build_stack(config: &StackConfig) -> Result<Stack> {
    let code = CodeAsset::resolve(&config.function.code_path)
        .context("Failed to read function package")?;
    let stack = ConnectionPoolingStack::new(config, code)
        .build()
        .context("Failed to build stack topology")?;
    Ok(stack)
}

fn description(config: &StackConfig) -> String {
    format!(
        "{}: VPC, MySQL {} behind a connection proxy, database-ping function and REST API",
        config.stack_name, config.database.engine_version
    )
}

pub fn synth_command(
    overrides: &Overrides,
    out: Option<PathBuf>,
    asset_bucket: Option<String>,
) -> Result<()> {
    let config = load_config(overrides)?;
    let stack = build_stack(&config)?;
    let context = SynthContext {
        description: Some(description(&config)),
        asset_bucket: asset_bucket.or_else(|| config.provisioning.asset_bucket.clone()),
    };
    let template = synthesize(&stack, &context).context("Failed to synthesize template")?;
    let json = template.to_json_pretty()?;

    match out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                path = %path.display(),
                resources = template.resources.len(),
                "Template written"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn plan_command(overrides: &Overrides, simulate: bool) -> Result<()> {
    let config = load_config(overrides)?;
    let stack = build_stack(&config)?;

    if !simulate {
        println!("Stack {} ({} resources), apply order:", stack.name(), stack.len());
        for (i, resource) in stack.apply_order().into_iter().enumerate() {
            let deps: Vec<String> = resource.dependencies().iter().map(ToString::to_string).collect();
            println!(
                "{:>3}. {:<48} {:<20} {}",
                i + 1,
                resource.id.to_string(),
                resource.kind_name(),
                deps.join(", ")
            );
        }
        return Ok(());
    }

    let provisioner = simulator(&config, &stack);
    let deployment = provisioner
        .apply(&stack)
        .await
        .context("Simulated apply failed")?;
    println!("{}", serde_json::to_string_pretty(&deployment)?);
    Ok(())
}

pub fn validate_command(overrides: &Overrides) -> Result<()> {
    let config = load_config(overrides)?;
    let stack = build_stack(&config)?;
    let report = validate_stack(&stack);
    print!("{report}");
    if !report.is_ok() {
        let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
        anyhow::bail!("{} check(s) failed: {}", failed.len(), failed.join(", "));
    }
    println!("All {} checks passed", report.checks.len());
    Ok(())
}

pub async fn deploy_command(overrides: &Overrides, asset_bucket: Option<String>) -> Result<()> {
    let config = load_config(overrides)?;
    let stack = build_stack(&config)?;

    let report = validate_stack(&stack);
    if !report.is_ok() {
        eprint!("{report}");
        anyhow::bail!("Refusing to deploy a stack that fails topology checks");
    }

    let bucket = asset_bucket
        .or_else(|| config.provisioning.asset_bucket.clone())
        .context("No asset bucket: pass --asset-bucket or set provisioning.assetBucket")?;
    let code = stack
        .code_asset()
        .context("Stack has no function package")?;
    code.ensure_available()
        .context("Build the function package before deploying")?;

    let template = synthesize(
        &stack,
        &SynthContext {
            description: Some(description(&config)),
            asset_bucket: Some(bucket.clone()),
        },
    )?;

    let deployer = CloudFormationDeployer::new(
        config.region.clone(),
        DeployerOptions::from_config(&config, bucket),
    )
    .await;
    deployer.upload_asset(code).await?;
    let outputs = deployer.deploy(stack.name(), &template).await?;

    println!("Stack {} deployed in {}", stack.name(), deployer.region());
    for (key, value) in &outputs {
        println!("{key} = {value}");
    }
    Ok(())
}

pub async fn destroy_command(
    overrides: &Overrides,
    yes: bool,
    allow_data_loss: bool,
    simulate: bool,
) -> Result<()> {
    let config = load_config(overrides)?;
    let stack = build_stack(&config)?;

    if simulate {
        let provisioner = simulator(&config, &stack);
        let deployment = provisioner.apply(&stack).await.context("Simulated apply failed")?;
        let report = provisioner
            .destroy(&stack, &deployment, DestroyOptions { allow_data_loss })
            .await
            .context("Simulated destroy failed")?;
        println!("Deleted {} resource(s)", report.deleted.len());
        for id in &report.retained {
            println!("Retained {id}");
        }
        return Ok(());
    }

    if !yes {
        anyhow::bail!("Destroying stack {} requires --yes", stack.name());
    }
    let kept: Vec<String> = stack
        .resources()
        .iter()
        .filter(|r| r.removal_policy == RemovalPolicy::Snapshot)
        .map(|r| r.id.to_string())
        .collect();
    if !kept.is_empty() && !allow_data_loss {
        anyhow::bail!(
            "Stack {} holds data ({}); pass --allow-data-loss to delete it after a final snapshot",
            stack.name(),
            kept.join(", ")
        );
    }

    let bucket = config.provisioning.asset_bucket.clone().unwrap_or_default();
    let deployer =
        CloudFormationDeployer::new(config.region.clone(), DeployerOptions::from_config(&config, bucket))
            .await;
    deployer.delete(stack.name()).await?;
    println!("Stack {} deleted", stack.name());
    Ok(())
}

pub async fn outputs_command(overrides: &Overrides) -> Result<()> {
    let config = load_config(overrides)?;
    let outputs = fetch_outputs(&config).await?;
    for (key, value) in &outputs {
        println!("{key} = {value}");
    }
    Ok(())
}

pub fn schema_command() -> Result<()> {
    println!("{}", StackConfig::schema_json()?);
    Ok(())
}

pub async fn ping_command(overrides: &Overrides, url: Option<String>, count: u32) -> Result<()> {
    let url = match url {
        Some(url) => url,
        None => {
            let config = load_config(overrides)?;
            fetch_outputs(&config)
                .await?
                .remove(API_ENDPOINT_OUTPUT)
                .with_context(|| format!("Stack has no {API_ENDPOINT_OUTPUT} output"))?
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(90))
        .build()
        .context("Failed to build HTTP client")?;

    for attempt in 1..=count.max(1) {
        let start = Instant::now();
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;
        let status = response.status();
        let body: PingResponse = response
            .json()
            .await
            .context("Endpoint returned an unexpected body")?;
        println!(
            "#{attempt} {} {:?} {} ({} ms round trip)",
            status.as_u16(),
            body.state,
            body.message,
            start.elapsed().as_millis()
        );
        if let Some(error) = &body.error {
            println!("   error: {error}");
        }
    }
    Ok(())
}

async fn fetch_outputs(config: &StackConfig) -> Result<std::collections::BTreeMap<String, String>> {
    let bucket = config.provisioning.asset_bucket.clone().unwrap_or_default();
    let deployer =
        CloudFormationDeployer::new(config.region.clone(), DeployerOptions::from_config(config, bucket))
            .await;
    deployer
        .outputs(&config.stack_name)
        .await
        .with_context(|| format!("Failed to read outputs of stack {}", config.stack_name))
}

fn simulator(config: &StackConfig, stack: &Stack) -> Provisioner<InMemoryProvisioner> {
    let mut options = ProvisionerOptions::from_config(config);
    options.backoff_start = Duration::from_millis(1);
    options.backoff_max = Duration::from_millis(1);
    let region = options.region.clone();
    info!(stack = %stack.name(), region = %region, "Simulating against the in-memory platform");
    Provisioner::new(InMemoryProvisioner::new(stack.name(), region), options)
}
