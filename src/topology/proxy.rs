//! # Connection Proxy
//!
//! Presents one stable endpoint to the application tier and multiplexes client
//! connections onto a bounded pool of backend connections to the instance.
//! Backend authentication uses the referenced secrets, fetched by the proxy at
//! connection time.

use super::ResourceId;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseProxy {
    /// Physical proxy name (also the endpoint's DNS prefix)
    pub name: String,
    pub engine_family: String,
    /// Target instance
    pub target: ResourceId,
    pub secrets: Vec<ResourceId>,
    /// Role the proxy assumes to read the secrets
    pub role: ResourceId,
    pub subnets: Vec<ResourceId>,
    pub security_groups: Vec<ResourceId>,
    /// Idle client connections are closed after this long
    pub idle_client_timeout: Duration,
    pub require_tls: bool,
    pub debug_logging: bool,
}

impl DatabaseProxy {
    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = vec![self.target.clone(), self.role.clone()];
        deps.extend(self.secrets.iter().cloned());
        deps.extend(self.subnets.iter().cloned());
        deps.extend(self.security_groups.iter().cloned());
        deps
    }
}
