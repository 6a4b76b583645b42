//! # IAM Roles
//!
//! Execution roles for the proxy and the function, with least-privilege
//! statements scoped to resources in the stack.

use super::{Attribute, ResourceId};

/// What a statement applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResource {
    /// An attribute (normally the ARN) of a stack resource
    Attribute(ResourceId, Attribute),
    /// `rds-db:connect` target for any user of a proxy
    ProxyDbUser { proxy: ResourceId, user: String },
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<PolicyResource>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<PolicyResource>) -> Self {
        Self {
            actions: actions.iter().map(|a| (*a).to_string()).collect(),
            resources,
        }
    }

    /// Read access to a secret's value
    pub fn read_secret(secret: &ResourceId) -> Self {
        Self::allow(
            &[
                "secretsmanager:GetSecretValue",
                "secretsmanager:DescribeSecret",
            ],
            vec![PolicyResource::Attribute(secret.clone(), Attribute::Arn)],
        )
    }

    /// Permission to open connections through a proxy
    pub fn connect_proxy(proxy: &ResourceId) -> Self {
        Self::allow(
            &["rds-db:connect"],
            vec![PolicyResource::ProxyDbUser {
                proxy: proxy.clone(),
                user: "*".to_string(),
            }],
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IamRole {
    /// Service principal allowed to assume the role
    pub assumed_by: String,
    pub managed_policies: Vec<String>,
    pub statements: Vec<PolicyStatement>,
}

impl IamRole {
    pub fn for_service(principal: &str) -> Self {
        Self {
            assumed_by: principal.to_string(),
            managed_policies: Vec::new(),
            statements: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_managed_policy(mut self, policy: &str) -> Self {
        self.managed_policies.push(policy.to_string());
        self
    }

    #[must_use]
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        self.statements
            .iter()
            .flat_map(|s| s.resources.iter())
            .filter_map(|r| match r {
                PolicyResource::Attribute(id, _) => Some(id.clone()),
                PolicyResource::ProxyDbUser { proxy, .. } => Some(proxy.clone()),
                PolicyResource::Literal(_) => None,
            })
            .collect()
    }
}
