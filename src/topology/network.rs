//! # Network Topology
//!
//! Plans a VPC partitioned into subnet tiers replicated per availability zone.
//!
//! - **Public** tier: default route to the internet gateway, hosts NAT gateways
//! - **Private** tier: default route to a NAT gateway (outbound only)
//! - **Isolated** tier: no default route at all
//!
//! Blocks are allocated sequentially from the start of the VPC range, tier by
//! tier in configuration order, zone by zone within a tier.

use super::{CidrAllocator, Ipv4Cidr, Resource, ResourceId, ResourceKind, TopologyError};
use crate::config::NetworkConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Routing policy of a subnet tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SubnetType {
    Public,
    Private,
    Isolated,
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetType::Public => f.write_str("public"),
            SubnetType::Private => f.write_str("private"),
            SubnetType::Isolated => f.write_str("isolated"),
        }
    }
}

/// One subnet tier as configured (replicated once per availability zone)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetTier {
    /// Tier name, used in logical ids (`nat`, `app`, `database`)
    pub name: String,
    pub subnet_type: SubnetType,
    /// Prefix length of each subnet in this tier
    pub cidr_mask: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vpc {
    pub cidr: Ipv4Cidr,
    pub max_azs: u8,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
}

impl Vpc {
    pub fn new(cidr: Ipv4Cidr, max_azs: u8) -> Self {
        Self {
            cidr,
            max_azs,
            enable_dns_hostnames: true,
            enable_dns_support: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    InternetGateway(ResourceId),
    NatGateway(ResourceId),
}

impl RouteTarget {
    pub fn resource(&self) -> &ResourceId {
        match self {
            RouteTarget::InternetGateway(id) | RouteTarget::NatGateway(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: Ipv4Cidr,
    pub target: RouteTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub vpc: ResourceId,
    pub tier_name: String,
    pub subnet_type: SubnetType,
    pub cidr: Ipv4Cidr,
    /// Zero-based availability zone index
    pub az_index: u8,
    pub map_public_ip_on_launch: bool,
    pub routes: Vec<Route>,
}

impl Subnet {
    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        std::iter::once(self.vpc.clone())
            .chain(self.routes.iter().map(|r| r.target.resource().clone()))
            .collect()
    }

    /// Routes sending traffic to the internet gateway
    pub fn internet_gateway_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes
            .iter()
            .filter(|r| matches!(r.target, RouteTarget::InternetGateway(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternetGateway {
    pub vpc: ResourceId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NatGateway {
    /// Public subnet hosting the gateway
    pub subnet: ResourceId,
    /// The gateway needs the internet gateway attached before it can route
    pub internet_gateway: ResourceId,
}

/// Output of [`plan_network`]: every network resource plus tier lookups
#[derive(Debug, Clone)]
pub struct NetworkPlan {
    pub vpc: Resource,
    pub internet_gateway: Option<Resource>,
    pub nat_gateways: Vec<Resource>,
    pub subnets: Vec<Resource>,
}

impl NetworkPlan {
    pub fn vpc_id(&self) -> &ResourceId {
        &self.vpc.id
    }

    /// Ids of the subnets of one tier type, in zone order
    pub fn subnet_ids(&self, subnet_type: SubnetType) -> Vec<ResourceId> {
        self.subnets
            .iter()
            .filter(|r| matches!(&r.kind, ResourceKind::Subnet(s) if s.subnet_type == subnet_type))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Like [`Self::subnet_ids`] but fails when the tier is absent
    pub fn require_subnets(
        &self,
        subnet_type: SubnetType,
    ) -> Result<Vec<ResourceId>, TopologyError> {
        let ids = self.subnet_ids(subnet_type);
        if ids.is_empty() {
            return Err(TopologyError::NoSubnets(subnet_type));
        }
        Ok(ids)
    }

    pub fn into_resources(self) -> Vec<Resource> {
        let mut resources = vec![self.vpc];
        resources.extend(self.internet_gateway);
        resources.extend(self.subnets);
        resources.extend(self.nat_gateways);
        resources
    }
}

pub(crate) fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Plan the VPC, gateways and per-zone subnets for `config`
pub fn plan_network(config: &NetworkConfig) -> Result<NetworkPlan, TopologyError> {
    let cidr: Ipv4Cidr = config.cidr.parse()?;
    let zones = config.max_azs;
    if zones == 0 {
        return Err(TopologyError::NoAvailabilityZones);
    }

    let mut seen = HashSet::new();
    for tier in &config.subnets {
        if !seen.insert(tier.name.as_str()) {
            return Err(TopologyError::DuplicateTierName(tier.name.clone()));
        }
        if tier.cidr_mask < cidr.prefix() || tier.cidr_mask > 28 {
            return Err(TopologyError::InvalidSubnetMask {
                mask: tier.cidr_mask,
                vpc_mask: cidr.prefix(),
            });
        }
    }

    let has_public = config
        .subnets
        .iter()
        .any(|t| t.subnet_type == SubnetType::Public);
    let has_private = config
        .subnets
        .iter()
        .any(|t| t.subnet_type == SubnetType::Private);
    let nat_count = if has_public { config.nat_gateways } else { 0 };

    if has_private && nat_count == 0 {
        return Err(TopologyError::InvalidNatGatewayCount {
            count: config.nat_gateways,
            reason: "private subnets need at least one NAT gateway in a public subnet".into(),
        });
    }
    if nat_count > zones {
        return Err(TopologyError::InvalidNatGatewayCount {
            count: nat_count,
            reason: format!("cannot exceed the availability zone count {zones}"),
        });
    }

    let vpc_id = ResourceId::fixed("Vpc");
    let vpc = Resource::new(vpc_id.clone(), ResourceKind::Vpc(Vpc::new(cidr, zones)));

    let internet_gateway = has_public.then(|| {
        Resource::new(
            ResourceId::fixed("VpcIGW"),
            ResourceKind::InternetGateway(InternetGateway {
                vpc: vpc_id.clone(),
            }),
        )
    });

    // Blocks first so a too-small range fails before any descriptor is built
    let mut allocator = CidrAllocator::new(cidr);
    let mut blocks = Vec::with_capacity(config.subnets.len());
    for tier in &config.subnets {
        let mut tier_blocks = Vec::with_capacity(usize::from(zones));
        for _ in 0..zones {
            let block = allocator.allocate(tier.cidr_mask).ok_or_else(|| {
                TopologyError::InsufficientAddressSpace {
                    cidr: cidr.to_string(),
                    tiers: config.subnets.len(),
                    zones,
                }
            })?;
            tier_blocks.push(block);
        }
        blocks.push(tier_blocks);
    }

    let subnet_id = |tier: &SubnetTier, az: u8| {
        ResourceId::new(format!("Vpc{}Subnet{}", pascal_case(&tier.name), az + 1))
    };

    let mut nat_gateways = Vec::new();
    let mut nat_ids = Vec::new();
    if let (Some(igw), Some(public_tier)) = (
        &internet_gateway,
        config
            .subnets
            .iter()
            .find(|t| t.subnet_type == SubnetType::Public),
    ) {
        for az in 0..nat_count {
            let host = subnet_id(public_tier, az)?;
            let id = host.child("NatGateway")?;
            nat_gateways.push(Resource::new(
                id.clone(),
                ResourceKind::NatGateway(NatGateway {
                    subnet: host,
                    internet_gateway: igw.id.clone(),
                }),
            ));
            nat_ids.push(id);
        }
    }

    let mut subnets = Vec::new();
    for (tier, tier_blocks) in config.subnets.iter().zip(blocks) {
        for (az, block) in (0u8..).zip(tier_blocks) {
            let routes = match tier.subnet_type {
                SubnetType::Public => internet_gateway
                    .iter()
                    .map(|igw| Route {
                        destination: Ipv4Cidr::ANY,
                        target: RouteTarget::InternetGateway(igw.id.clone()),
                    })
                    .collect(),
                SubnetType::Private => vec![Route {
                    destination: Ipv4Cidr::ANY,
                    target: RouteTarget::NatGateway(
                        nat_ids[usize::from(az) % nat_ids.len()].clone(),
                    ),
                }],
                SubnetType::Isolated => vec![],
            };
            let id = subnet_id(tier, az)?;
            debug!(subnet = %id, cidr = %block, tier = %tier.subnet_type, "planned subnet");
            subnets.push(Resource::new(
                id,
                ResourceKind::Subnet(Subnet {
                    vpc: vpc_id.clone(),
                    tier_name: tier.name.clone(),
                    subnet_type: tier.subnet_type,
                    cidr: block,
                    az_index: az,
                    map_public_ip_on_launch: tier.subnet_type == SubnetType::Public,
                    routes,
                }),
            ));
        }
    }

    Ok(NetworkPlan {
        vpc,
        internet_gateway,
        nat_gateways,
        subnets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(name: &str, subnet_type: SubnetType) -> SubnetTier {
        SubnetTier {
            name: name.to_string(),
            subnet_type,
            cidr_mask: 24,
        }
    }

    fn subnet(plan: &NetworkPlan, id: &str) -> Subnet {
        plan.subnets
            .iter()
            .find_map(|r| match &r.kind {
                ResourceKind::Subnet(s) if r.id.as_str() == id => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("subnet {id} not planned"))
    }

    #[test]
    fn test_default_network_layout() {
        let plan = plan_network(&NetworkConfig::default()).unwrap();
        assert_eq!(plan.subnets.len(), 6);
        assert_eq!(plan.nat_gateways.len(), 1);
        assert!(plan.internet_gateway.is_some());

        assert_eq!(subnet(&plan, "VpcNatSubnet1").cidr.to_string(), "10.0.0.0/24");
        assert_eq!(subnet(&plan, "VpcNatSubnet2").cidr.to_string(), "10.0.1.0/24");
        assert_eq!(subnet(&plan, "VpcAppSubnet1").cidr.to_string(), "10.0.2.0/24");
        assert_eq!(subnet(&plan, "VpcDatabaseSubnet2").cidr.to_string(), "10.0.5.0/24");
    }

    #[test]
    fn test_routes_per_tier() {
        let plan = plan_network(&NetworkConfig::default()).unwrap();
        let public = subnet(&plan, "VpcNatSubnet2");
        assert_eq!(public.internet_gateway_routes().count(), 1);

        let private = subnet(&plan, "VpcAppSubnet2");
        assert_eq!(
            private.routes,
            vec![Route {
                destination: Ipv4Cidr::ANY,
                target: RouteTarget::NatGateway(ResourceId::fixed("VpcNatSubnet1NatGateway")),
            }]
        );

        let isolated = subnet(&plan, "VpcDatabaseSubnet1");
        assert!(isolated.routes.is_empty());
    }

    #[test]
    fn test_insufficient_address_space() {
        let config = NetworkConfig {
            cidr: "10.0.0.0/22".to_string(),
            ..NetworkConfig::default()
        };
        let err = plan_network(&config).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::InsufficientAddressSpace { tiers: 3, zones: 2, .. }
        ));
    }

    #[test]
    fn test_private_tier_requires_nat() {
        let config = NetworkConfig {
            nat_gateways: 0,
            ..NetworkConfig::default()
        };
        assert!(matches!(
            plan_network(&config),
            Err(TopologyError::InvalidNatGatewayCount { .. })
        ));
    }

    #[test]
    fn test_nat_count_bounded_by_zones() {
        let config = NetworkConfig {
            nat_gateways: 3,
            ..NetworkConfig::default()
        };
        assert!(plan_network(&config).is_err());
    }

    #[test]
    fn test_isolated_only_network_has_no_gateways() {
        let config = NetworkConfig {
            nat_gateways: 0,
            subnets: vec![tier("database", SubnetType::Isolated)],
            ..NetworkConfig::default()
        };
        let plan = plan_network(&config).unwrap();
        assert!(plan.internet_gateway.is_none());
        assert!(plan.nat_gateways.is_empty());
        assert!(plan.require_subnets(SubnetType::Private).is_err());
    }

    #[test]
    fn test_duplicate_tier_names_rejected() {
        let config = NetworkConfig {
            subnets: vec![
                tier("nat", SubnetType::Public),
                tier("nat", SubnetType::Private),
            ],
            ..NetworkConfig::default()
        };
        assert_eq!(
            plan_network(&config).unwrap_err(),
            TopologyError::DuplicateTierName("nat".into())
        );
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("app"), "App");
        assert_eq!(pascal_case("db-tier_2"), "DbTier2");
    }
}
