//! # Constants
//!
//! Shared constants used throughout the stack and the function runtime.
//!
//! These values represent the deployment defaults. Most can be overridden via
//! the stack configuration file; the concurrency policy cannot.

/// Default stack name used when neither the config file nor `STACK_NAME` sets one
pub const DEFAULT_STACK_NAME: &str = "AwsLambdaConnectionPoolingStack";

/// Default VPC address space
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Default number of availability zones the subnet tiers are replicated across
pub const DEFAULT_MAX_AZS: u8 = 2;

/// Default number of NAT gateways (placed in the first public subnets)
pub const DEFAULT_NAT_GATEWAYS: u8 = 1;

/// Default subnet mask width for every tier
pub const DEFAULT_SUBNET_CIDR_MASK: u8 = 24;

/// MySQL listener port, shared by the instance and the proxy
pub const DEFAULT_DATABASE_PORT: u16 = 3306;

/// Default MySQL engine version
pub const DEFAULT_MYSQL_VERSION: &str = "5.7.33";

/// Default allocated storage for the instance (GiB)
pub const DEFAULT_ALLOCATED_STORAGE_GIB: u32 = 100;

/// Master username written into the generated secret template
pub const DEFAULT_DATABASE_USERNAME: &str = "admin";

/// Length of the generated master password
pub const GENERATED_PASSWORD_LENGTH: u32 = 30;

/// Characters excluded from the generated password (not accepted by MySQL/RDS)
pub const GENERATED_PASSWORD_EXCLUDED_CHARS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

/// Default proxy idle client timeout (seconds)
pub const DEFAULT_PROXY_IDLE_CLIENT_TIMEOUT_SECS: u64 = 60;

/// RDS Proxy accepts idle client timeouts up to 8 hours
pub const MAX_PROXY_IDLE_CLIENT_TIMEOUT_SECS: u64 = 28_800;

/// Default function timeout (seconds)
pub const DEFAULT_FUNCTION_TIMEOUT_SECS: u64 = 60;

/// Lambda hard limit on function timeout (seconds)
pub const MAX_FUNCTION_TIMEOUT_SECS: u64 = 900;

/// Default function memory (MiB)
pub const DEFAULT_FUNCTION_MEMORY_MIB: u32 = 128;

/// Reserved concurrency for the function: a hard ceiling, excess requests are throttled
pub const RESERVED_CONCURRENCY: u32 = 1;

/// Provisioned (warm) concurrency kept on the alias
pub const PROVISIONED_CONCURRENCY: u32 = 1;

/// Default alias name the gateway targets
pub const DEFAULT_ALIAS_NAME: &str = "live";

/// Default log retention for the function log group (days)
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

/// Retention values accepted by CloudWatch Logs
pub const ALLOWED_LOG_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// Default REST API stage name
pub const DEFAULT_STAGE_NAME: &str = "prod";

/// Environment variable carrying the secret name to the function
pub const ENV_DB_USER_SECRET_NAME: &str = "DB_USER_SECRET_NAME";

/// Environment variable carrying the proxy endpoint to the function
pub const ENV_DB_HOST: &str = "DB_HOST";

/// Default HTTP port for the function server (Lambda Web Adapter default)
pub const DEFAULT_FUNCTION_PORT: u16 = 8080;

/// Default database connect timeout used by the function (seconds)
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Query executed by the ping handler
pub const PING_QUERY: &str = "SELECT 5";

/// Service name reported in logs
pub const SERVICE_NAME: &str = "lambda-connection-pooling-demo";

/// Default Fibonacci backoff starting value for provisioning retries (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default backoff ceiling for provisioning retries and stack polling (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default number of attempts for a transient provisioning failure
pub const DEFAULT_MAX_PROVISION_ATTEMPTS: u32 = 3;

/// Default time to wait for a CloudFormation stack to settle (seconds)
pub const DEFAULT_STACK_WAIT_TIMEOUT_SECS: u64 = 3600;

/// Lambda Web Adapter layer; lets the function binary serve plain HTTP
pub const WEB_ADAPTER_LAYER_ARN: &str =
    "arn:aws:lambda:${AWS::Region}:753240598075:layer:LambdaAdapterLayerX86:25";

/// Log stream name reported when not running inside Lambda
pub const LOCAL_LOG_STREAM_NAME: &str = "local";
