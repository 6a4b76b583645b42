//! # Topology
//!
//! Typed resource descriptors for the connection pooling deployment.
//!
//! Every descriptor carries the [`ResourceId`]s of the resources it references,
//! so the dependency graph is derived from the descriptors themselves rather
//! than from construction order.
//!
//! ## Module Structure
//!
//! - `cidr.rs` - IPv4 CIDR parsing and allocation
//! - `network.rs` - VPC, subnet tiers, gateways and routes
//! - `security.rs` - Security groups and their directional rules
//! - `database.rs` - Generated credential, subnet group and instance
//! - `proxy.rs` - Connection proxy
//! - `iam.rs` - Roles and policy statements
//! - `function.rs` - Compute function, version, alias, log group
//! - `gateway.rs` - REST API, method, stage and invoke permission

pub mod cidr;
pub mod database;
pub mod function;
pub mod gateway;
pub mod iam;
pub mod network;
pub mod proxy;
pub mod security;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

pub use cidr::{CidrAllocator, Ipv4Cidr};
pub use database::{
    Credentials, DatabaseEngine, DatabaseInstance, DatabaseInstanceBuilder, DatabaseResources,
    DatabaseSecret, DbSubnetGroup, InstanceType,
};
pub use function::{
    CodeAsset, EnvValue, Function, FunctionAlias, FunctionEnvironment,
    FunctionEnvironmentBuilder, FunctionVersion, LogGroup, TracingMode,
};
pub use gateway::{
    GatewayMethod, GatewayStage, HttpMethod, Integration, InvokePermission, RestApi, StackOutput,
};
pub use iam::{IamRole, PolicyResource, PolicyStatement};
pub use network::{
    plan_network, InternetGateway, NatGateway, NetworkPlan, Route, RouteTarget, Subnet,
    SubnetTier, SubnetType, Vpc,
};
pub use proxy::DatabaseProxy;
pub use security::{Direction, Peer, Port, Protocol, SecurityGroup, SecurityGroupRule, SecurityRule};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("invalid CIDR block '{0}'")]
    InvalidCidr(String),

    #[error("subnet mask /{mask} must be between the VPC mask /{vpc_mask} and /28")]
    InvalidSubnetMask { mask: u8, vpc_mask: u8 },

    #[error(
        "address space {cidr} cannot accommodate {tiers} subnet tiers across {zones} availability zones"
    )]
    InsufficientAddressSpace { cidr: String, tiers: usize, zones: u8 },

    #[error("invalid NAT gateway count {count}: {reason}")]
    InvalidNatGatewayCount { count: u8, reason: String },

    #[error("availability zone count must be at least 1")]
    NoAvailabilityZones,

    #[error("network has no {0} subnets")]
    NoSubnets(SubnetType),

    #[error("duplicate subnet tier name '{0}'")]
    DuplicateTierName(String),

    #[error("invalid resource id '{0}': must be 1-255 alphanumeric characters")]
    InvalidResourceId(String),
}

static RESOURCE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{1,255}$").expect("resource id pattern is a valid regex")
});

/// Logical identifier of a resource within the stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Build an id, enforcing the CloudFormation logical id rules
    pub fn new(id: impl Into<String>) -> Result<Self, TopologyError> {
        let id = id.into();
        if RESOURCE_ID_RE.is_match(&id) {
            Ok(Self(id))
        } else {
            Err(TopologyError::InvalidResourceId(id))
        }
    }

    /// Build an id from a name known to be valid at compile time
    pub(crate) fn fixed(id: &'static str) -> Self {
        debug_assert!(RESOURCE_ID_RE.is_match(id), "invalid fixed id {id}");
        Self(id.to_string())
    }

    /// Derive a child id by appending an alphanumeric suffix
    pub fn child(&self, suffix: &str) -> Result<Self, TopologyError> {
        Self::new(format!("{}{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A runtime attribute of a resource, known only once it exists
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase", tag = "attribute", content = "key")]
pub enum Attribute {
    /// Physical id (what `Ref` returns)
    Ref,
    Arn,
    Name,
    Endpoint,
    Version,
    RootResourceId,
    /// A field of a secret's value. Resolving this embeds the secret itself.
    SecretValue(String),
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Ref => f.write_str("Ref"),
            Attribute::Arn => f.write_str("Arn"),
            Attribute::Name => f.write_str("Name"),
            Attribute::Endpoint => f.write_str("Endpoint"),
            Attribute::Version => f.write_str("Version"),
            Attribute::RootResourceId => f.write_str("RootResourceId"),
            Attribute::SecretValue(key) => write!(f, "SecretValue:{key}"),
        }
    }
}

/// What happens to a resource when it leaves the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RemovalPolicy {
    /// Deleted with the stack
    #[default]
    Destroy,
    /// Left in place, orphaned from the stack
    Retain,
    /// Deleted after a final snapshot; only with explicit data-loss opt-in
    Snapshot,
}

/// One declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    Vpc(Vpc),
    Subnet(Subnet),
    InternetGateway(InternetGateway),
    NatGateway(NatGateway),
    Secret(DatabaseSecret),
    DbSubnetGroup(DbSubnetGroup),
    DatabaseInstance(DatabaseInstance),
    SecurityGroup(SecurityGroup),
    SecurityGroupRule(SecurityGroupRule),
    IamRole(IamRole),
    DatabaseProxy(DatabaseProxy),
    Function(Function),
    FunctionVersion(FunctionVersion),
    FunctionAlias(FunctionAlias),
    LogGroup(LogGroup),
    RestApi(RestApi),
    GatewayMethod(GatewayMethod),
    GatewayStage(GatewayStage),
    InvokePermission(InvokePermission),
}

impl Resource {
    /// New resource with the default removal policy for its kind
    pub fn new(id: ResourceId, kind: ResourceKind) -> Self {
        let removal_policy = match kind {
            ResourceKind::DatabaseInstance(_) => RemovalPolicy::Snapshot,
            _ => RemovalPolicy::Destroy,
        };
        Self {
            id,
            kind,
            removal_policy,
        }
    }

    #[must_use]
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    /// Ids of every resource this one references, sorted and deduplicated
    pub fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = match &self.kind {
            ResourceKind::Vpc(_) | ResourceKind::Secret(_) | ResourceKind::RestApi(_) => vec![],
            ResourceKind::Subnet(subnet) => subnet.dependencies(),
            ResourceKind::InternetGateway(igw) => vec![igw.vpc.clone()],
            ResourceKind::NatGateway(nat) => {
                vec![nat.subnet.clone(), nat.internet_gateway.clone()]
            }
            ResourceKind::DbSubnetGroup(group) => group.subnets.clone(),
            ResourceKind::DatabaseInstance(db) => db.dependencies(),
            ResourceKind::SecurityGroup(sg) => vec![sg.vpc.clone()],
            ResourceKind::SecurityGroupRule(rule) => rule.dependencies(),
            ResourceKind::IamRole(role) => role.dependencies(),
            ResourceKind::DatabaseProxy(proxy) => proxy.dependencies(),
            ResourceKind::Function(function) => function.dependencies(),
            ResourceKind::FunctionVersion(version) => vec![version.function.clone()],
            ResourceKind::FunctionAlias(alias) => {
                vec![alias.function.clone(), alias.version.clone()]
            }
            ResourceKind::LogGroup(group) => vec![group.function.clone()],
            ResourceKind::GatewayMethod(method) => method.dependencies(),
            ResourceKind::GatewayStage(stage) => stage.dependencies(),
            ResourceKind::InvokePermission(permission) => {
                vec![permission.function.clone(), permission.api.clone()]
            }
        };
        deps.sort();
        deps.dedup();
        deps
    }

    /// Short kind name used in logs, plans and metrics labels
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ResourceKind::Vpc(_) => "vpc",
            ResourceKind::Subnet(_) => "subnet",
            ResourceKind::InternetGateway(_) => "internet_gateway",
            ResourceKind::NatGateway(_) => "nat_gateway",
            ResourceKind::Secret(_) => "secret",
            ResourceKind::DbSubnetGroup(_) => "db_subnet_group",
            ResourceKind::DatabaseInstance(_) => "database_instance",
            ResourceKind::SecurityGroup(_) => "security_group",
            ResourceKind::SecurityGroupRule(_) => "security_group_rule",
            ResourceKind::IamRole(_) => "iam_role",
            ResourceKind::DatabaseProxy(_) => "database_proxy",
            ResourceKind::Function(_) => "function",
            ResourceKind::FunctionVersion(_) => "function_version",
            ResourceKind::FunctionAlias(_) => "function_alias",
            ResourceKind::LogGroup(_) => "log_group",
            ResourceKind::RestApi(_) => "rest_api",
            ResourceKind::GatewayMethod(_) => "gateway_method",
            ResourceKind::GatewayStage(_) => "gateway_stage",
            ResourceKind::InvokePermission(_) => "invoke_permission",
        }
    }
}
