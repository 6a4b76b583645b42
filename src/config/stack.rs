//! # Stack Configuration
//!
//! The deployment description: every tunable of the topology with the
//! defaults the stack has always shipped with. All fields are optional in the
//! YAML file; `STACK_NAME` and `AWS_REGION` override the file.

use super::{non_empty, process_env, ConfigError};
use crate::constants::*;
use crate::topology::{Ipv4Cidr, RemovalPolicy, SubnetTier, SubnetType};
use crate::validation::names;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct StackConfig {
    /// CloudFormation stack name
    pub stack_name: String,
    /// AWS region; the SDK default chain applies when unset
    pub region: Option<String>,
    pub network: NetworkConfig,
    pub database: DatabaseConfig,
    pub proxy: ProxyConfig,
    pub function: ComputeConfig,
    pub gateway: GatewayConfig,
    pub provisioning: ProvisioningConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            region: None,
            network: NetworkConfig::default(),
            database: DatabaseConfig::default(),
            proxy: ProxyConfig::default(),
            function: ComputeConfig::default(),
            gateway: GatewayConfig::default(),
            provisioning: ProvisioningConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// VPC address space
    pub cidr: String,
    pub max_azs: u8,
    /// NAT gateways, placed in the first public subnets
    pub nat_gateways: u8,
    /// Subnet tiers, allocated in this order
    pub subnets: Vec<SubnetTier>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let tier = |name: &str, subnet_type| SubnetTier {
            name: name.to_string(),
            subnet_type,
            cidr_mask: DEFAULT_SUBNET_CIDR_MASK,
        };
        Self {
            cidr: DEFAULT_VPC_CIDR.to_string(),
            max_azs: DEFAULT_MAX_AZS,
            nat_gateways: DEFAULT_NAT_GATEWAYS,
            subnets: vec![
                tier("nat", SubnetType::Public),
                tier("app", SubnetType::Private),
                tier("database", SubnetType::Isolated),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    /// MySQL engine version
    pub engine_version: String,
    /// Instance class (`t3`)
    pub instance_class: String,
    /// Instance size (`small`)
    pub instance_size: String,
    pub port: u16,
    pub allocated_storage_gib: u32,
    /// Master username stored in the generated secret
    pub username: String,
    /// Physical name of the generated secret; derived from the stack when unset
    pub secret_name: Option<String>,
    pub subnet_group_description: String,
    pub removal_policy: RemovalPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine_version: DEFAULT_MYSQL_VERSION.to_string(),
            instance_class: "t3".to_string(),
            instance_size: "small".to_string(),
            port: DEFAULT_DATABASE_PORT,
            allocated_storage_gib: DEFAULT_ALLOCATED_STORAGE_GIB,
            username: DEFAULT_DATABASE_USERNAME.to_string(),
            secret_name: None,
            subnet_group_description: "vpc subnet group for connection pooling demo".to_string(),
            removal_policy: RemovalPolicy::Snapshot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// Idle client connections are closed after this many seconds
    pub idle_client_timeout_secs: u64,
    pub require_tls: bool,
    pub debug_logging: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            idle_client_timeout_secs: DEFAULT_PROXY_IDLE_CLIENT_TIMEOUT_SECS,
            require_tls: true,
            debug_logging: false,
        }
    }
}

impl ProxyConfig {
    pub fn idle_client_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_client_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeConfig {
    /// Built function package
    pub code_path: PathBuf,
    pub runtime: String,
    pub handler: String,
    pub memory_mib: u32,
    pub timeout_secs: u64,
    pub alias_name: String,
    pub log_retention_days: u32,
    /// Narrow application egress to the proxy port and HTTPS
    pub restrict_application_egress: bool,
    /// Layer ARNs; `${AWS::Region}` is substituted at deploy time
    pub layers: Vec<String>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            code_path: PathBuf::from("target/lambda/database-ping/bootstrap.zip"),
            runtime: "provided.al2023".to_string(),
            handler: "bootstrap".to_string(),
            memory_mib: DEFAULT_FUNCTION_MEMORY_MIB,
            timeout_secs: DEFAULT_FUNCTION_TIMEOUT_SECS,
            alias_name: DEFAULT_ALIAS_NAME.to_string(),
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            restrict_application_egress: false,
            layers: vec![WEB_ADAPTER_LAYER_ARN.to_string()],
        }
    }
}

impl ComputeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// REST API name; the stack name when unset
    pub api_name: Option<String>,
    pub stage_name: String,
    pub data_trace_enabled: bool,
    /// Set the account's API Gateway logging role; stage logging needs one
    pub cloud_watch_role: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_name: None,
            stage_name: DEFAULT_STAGE_NAME.to_string(),
            data_trace_enabled: true,
            cloud_watch_role: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisioningConfig {
    pub backoff_start_ms: u64,
    pub backoff_max_ms: u64,
    /// Attempts per resource for transient failures
    pub max_attempts: u32,
    pub stack_wait_timeout_secs: u64,
    /// Bucket the function package is uploaded to
    pub asset_bucket: Option<String>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            max_attempts: DEFAULT_MAX_PROVISION_ATTEMPTS,
            stack_wait_timeout_secs: DEFAULT_STACK_WAIT_TIMEOUT_SECS,
            asset_bucket: None,
        }
    }
}

impl ProvisioningConfig {
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn stack_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.stack_wait_timeout_secs)
    }
}

impl StackConfig {
    /// JSON schema of the config file, pretty-printed
    pub fn schema_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(StackConfig))
    }

    /// Load from `path` (or defaults), apply env overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(process_env);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded stack config file");
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `STACK_NAME` and `AWS_REGION` win over the file
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = non_empty(&lookup, "STACK_NAME") {
            self.stack_name = name;
        }
        if let Some(region) = non_empty(&lookup, "AWS_REGION") {
            self.region = Some(region);
        }
    }

    pub fn api_name(&self) -> &str {
        self.gateway.api_name.as_deref().unwrap_or(&self.stack_name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        names::validate_stack_name(&self.stack_name)?;
        if let Some(region) = &self.region {
            names::validate_aws_region(region)?;
        }

        let cidr: Ipv4Cidr = self
            .network
            .cidr
            .parse()
            .map_err(|e| ConfigError::invalid("network.cidr", format!("{e}")))?;
        if !(16..=28).contains(&cidr.prefix()) {
            return Err(ConfigError::invalid(
                "network.cidr",
                format!("VPC prefix /{} must be between /16 and /28", cidr.prefix()),
            ));
        }
        if self.network.max_azs == 0 {
            return Err(ConfigError::invalid("network.maxAzs", "must be at least 1"));
        }
        if self.network.nat_gateways > self.network.max_azs {
            return Err(ConfigError::invalid(
                "network.natGateways",
                format!(
                    "{} exceeds the availability zone count {}",
                    self.network.nat_gateways, self.network.max_azs
                ),
            ));
        }
        if self.network.subnets.is_empty() {
            return Err(ConfigError::invalid(
                "network.subnets",
                "at least one subnet tier is required",
            ));
        }
        for tier in &self.network.subnets {
            names::validate_tier_name(&tier.name)?;
        }

        if self.database.port == 0 {
            return Err(ConfigError::invalid("database.port", "must be non-zero"));
        }
        names::validate_database_username(&self.database.username)?;
        if let Some(name) = &self.database.secret_name {
            names::validate_secret_name(name)?;
        }
        if !(20..=65_536).contains(&self.database.allocated_storage_gib) {
            return Err(ConfigError::invalid(
                "database.allocatedStorageGib",
                "must be between 20 and 65536",
            ));
        }

        if !(1..=MAX_PROXY_IDLE_CLIENT_TIMEOUT_SECS).contains(&self.proxy.idle_client_timeout_secs)
        {
            return Err(ConfigError::invalid(
                "proxy.idleClientTimeoutSecs",
                format!("must be between 1 and {MAX_PROXY_IDLE_CLIENT_TIMEOUT_SECS}"),
            ));
        }

        if !(1..=MAX_FUNCTION_TIMEOUT_SECS).contains(&self.function.timeout_secs) {
            return Err(ConfigError::invalid(
                "function.timeoutSecs",
                format!("must be between 1 and {MAX_FUNCTION_TIMEOUT_SECS}"),
            ));
        }
        if !(128..=10_240).contains(&self.function.memory_mib) {
            return Err(ConfigError::invalid(
                "function.memoryMib",
                "must be between 128 and 10240",
            ));
        }
        if !ALLOWED_LOG_RETENTION_DAYS.contains(&self.function.log_retention_days) {
            return Err(ConfigError::invalid(
                "function.logRetentionDays",
                format!(
                    "{} is not a CloudWatch Logs retention value",
                    self.function.log_retention_days
                ),
            ));
        }
        names::validate_alias_name(&self.function.alias_name)?;
        names::validate_stage_name(&self.gateway.stage_name)?;

        if self.provisioning.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "provisioning.maxAttempts",
                "must be at least 1",
            ));
        }
        if self.provisioning.backoff_start_ms > self.provisioning.backoff_max_ms {
            return Err(ConfigError::invalid(
                "provisioning.backoffStartMs",
                "must not exceed backoffMaxMs",
            ));
        }
        if let Some(bucket) = &self.provisioning.asset_bucket {
            names::validate_bucket_name(bucket)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_schema_covers_nested_settings() {
        let schema: serde_json::Value =
            serde_json::from_str(&StackConfig::schema_json().unwrap()).unwrap();
        let text = schema.to_string();
        for field in ["stackName", "idleClientTimeoutSecs", "dataTraceEnabled", "cloudWatchRole"] {
            assert!(text.contains(field), "schema lacks {field}");
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = StackConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stack_name, "AwsLambdaConnectionPoolingStack");
        assert_eq!(config.proxy.idle_client_timeout(), Duration::from_secs(60));
        assert_eq!(config.function.timeout(), Duration::from_secs(60));
        assert_eq!(config.function.log_retention_days, 7);
        assert_eq!(config.api_name(), "AwsLambdaConnectionPoolingStack");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: StackConfig = serde_yaml::from_str(
            r#"
stackName: PoolingDemo
proxy:
  idleClientTimeoutSecs: 120
network:
  maxAzs: 3
"#,
        )
        .unwrap();
        assert_eq!(config.stack_name, "PoolingDemo");
        assert_eq!(config.proxy.idle_client_timeout_secs, 120);
        assert!(config.proxy.require_tls);
        assert_eq!(config.network.max_azs, 3);
        assert_eq!(config.network.subnets.len(), 3);
        assert_eq!(config.database.port, 3306);
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> =
            HashMap::from([("STACK_NAME", "FromEnv"), ("AWS_REGION", "eu-west-1")]);
        let mut config = StackConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.stack_name, "FromEnv");
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        std::fs::write(&path, "function:\n  logRetentionDays: 14\n").unwrap();
        let config = StackConfig::from_file(&path).unwrap();
        assert_eq!(config.function.log_retention_days, 14);

        std::fs::write(&path, "function: [not, a, map]\n").unwrap();
        assert!(matches!(
            StackConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut config = StackConfig::default();
        config.proxy.idle_client_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "proxy.idleClientTimeoutSecs"
        ));

        let mut config = StackConfig::default();
        config.function.log_retention_days = 8;
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.function.timeout_secs = 901;
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.network.nat_gateways = 3;
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.network.cidr = "10.0.0.0/33".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_names() {
        let mut config = StackConfig::default();
        config.stack_name = "1-starts-with-digit".into();
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.region = Some("mars-central".into());
        assert!(config.validate().is_err());
    }
}
