//! # Access Control
//!
//! Security groups are allow-lists: a group with no rules admits nothing.
//! Rules are separate resources so two groups can reference each other without
//! creating a dependency cycle between the groups themselves.

use super::{Ipv4Cidr, ResourceId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    All,
}

impl Protocol {
    /// IP protocol identifier as used by EC2 (`-1` for all)
    pub fn ip_protocol(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::All => "-1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub protocol: Protocol,
    pub from: u16,
    pub to: u16,
}

impl Port {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from: port,
            to: port,
        }
    }

    pub fn all_traffic() -> Self {
        Self {
            protocol: Protocol::All,
            from: 0,
            to: u16::MAX,
        }
    }

    /// Whether this is a single TCP port equal to `port`
    pub fn is_tcp(&self, port: u16) -> bool {
        self.protocol == Protocol::Tcp && self.from == port && self.to == port
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::All => f.write_str("all traffic"),
            _ if self.from == self.to => write!(f, "{} {}", self.protocol.ip_protocol(), self.from),
            _ => write!(f, "{} {}-{}", self.protocol.ip_protocol(), self.from, self.to),
        }
    }
}

/// The other side of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    SecurityGroup(ResourceId),
    Cidr(Ipv4Cidr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRule {
    pub peer: Peer,
    pub port: Port,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroup {
    pub vpc: ResourceId,
    pub description: String,
    /// When false, only the explicit egress rules apply
    pub allow_all_outbound: bool,
}

impl SecurityGroup {
    pub fn new(vpc: ResourceId, description: impl Into<String>) -> Self {
        Self {
            vpc,
            description: description.into(),
            allow_all_outbound: true,
        }
    }
}

/// A single directional rule attached to `group`
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroupRule {
    pub group: ResourceId,
    pub direction: Direction,
    pub rule: SecurityRule,
}

impl SecurityGroupRule {
    pub fn ingress(group: ResourceId, peer: Peer, port: Port, description: &str) -> Self {
        Self {
            group,
            direction: Direction::Ingress,
            rule: SecurityRule {
                peer,
                port,
                description: description.to_string(),
            },
        }
    }

    pub fn egress(group: ResourceId, peer: Peer, port: Port, description: &str) -> Self {
        Self {
            group,
            direction: Direction::Egress,
            rule: SecurityRule {
                peer,
                port,
                description: description.to_string(),
            },
        }
    }

    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = vec![self.group.clone()];
        if let Peer::SecurityGroup(peer) = &self.rule.peer {
            deps.push(peer.clone());
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_display() {
        assert_eq!(Port::tcp(3306).to_string(), "tcp 3306");
        assert_eq!(Port::all_traffic().to_string(), "all traffic");
        assert!(Port::tcp(3306).is_tcp(3306));
        assert!(!Port::all_traffic().is_tcp(3306));
    }

    #[test]
    fn test_rule_depends_on_both_groups() {
        let rule = SecurityGroupRule::ingress(
            ResourceId::fixed("ProxySecurityGroup"),
            Peer::SecurityGroup(ResourceId::fixed("AppSecurityGroup")),
            Port::tcp(3306),
            "app to proxy",
        );
        assert_eq!(
            rule.dependencies(),
            vec![
                ResourceId::fixed("ProxySecurityGroup"),
                ResourceId::fixed("AppSecurityGroup")
            ]
        );
    }
}
