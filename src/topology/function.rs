//! # Compute Function
//!
//! The database-ping function, its published version, the stable alias the
//! gateway targets, and its log group.
//!
//! The function's environment is an explicit [`FunctionEnvironment`] whose
//! values are either literals or attribute references resolved by the
//! provisioning engine after the referenced resource exists. Credentials only
//! ever travel by name.

use super::{Attribute, ResourceId};
use crate::constants::{ENV_DB_HOST, ENV_DB_USER_SECRET_NAME};
use std::collections::BTreeMap;
use std::time::Duration;

pub use crate::asset::CodeAsset;

/// A single environment value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Literal(String),
    Attribute {
        resource: ResourceId,
        attribute: Attribute,
    },
}

/// Environment mapping injected at deploy time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionEnvironment {
    vars: BTreeMap<String, EnvValue>,
}

impl FunctionEnvironment {
    pub fn builder() -> FunctionEnvironmentBuilder {
        FunctionEnvironmentBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.vars.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EnvValue)> {
        self.vars.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn referenced_resources(&self) -> impl Iterator<Item = &ResourceId> {
        self.vars.values().filter_map(|v| match v {
            EnvValue::Attribute { resource, .. } => Some(resource),
            EnvValue::Literal(_) => None,
        })
    }
}

#[derive(Debug, Default)]
pub struct FunctionEnvironmentBuilder {
    vars: BTreeMap<String, EnvValue>,
}

impl FunctionEnvironmentBuilder {
    /// `DB_USER_SECRET_NAME`: the secret's name, never its value
    #[must_use]
    pub fn secret_name(mut self, secret: &ResourceId) -> Self {
        self.vars.insert(
            ENV_DB_USER_SECRET_NAME.to_string(),
            EnvValue::Attribute {
                resource: secret.clone(),
                attribute: Attribute::Name,
            },
        );
        self
    }

    /// `DB_HOST`: the proxy endpoint
    #[must_use]
    pub fn proxy_endpoint(mut self, proxy: &ResourceId) -> Self {
        self.vars.insert(
            ENV_DB_HOST.to_string(),
            EnvValue::Attribute {
                resource: proxy.clone(),
                attribute: Attribute::Endpoint,
            },
        );
        self
    }

    #[must_use]
    pub fn literal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), EnvValue::Literal(value.into()));
        self
    }

    #[must_use]
    pub fn attribute(
        mut self,
        key: impl Into<String>,
        resource: &ResourceId,
        attribute: Attribute,
    ) -> Self {
        self.vars.insert(
            key.into(),
            EnvValue::Attribute {
                resource: resource.clone(),
                attribute,
            },
        );
        self
    }

    pub fn build(self) -> FunctionEnvironment {
        FunctionEnvironment { vars: self.vars }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingMode {
    Active,
    PassThrough,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub code: CodeAsset,
    pub runtime: String,
    pub handler: String,
    pub memory_mib: u32,
    pub timeout: Duration,
    pub role: ResourceId,
    pub subnets: Vec<ResourceId>,
    pub security_groups: Vec<ResourceId>,
    pub environment: FunctionEnvironment,
    /// Hard ceiling on concurrent executions; excess invocations are throttled
    pub reserved_concurrency: Option<u32>,
    pub tracing: TracingMode,
    /// Lambda layers (the web adapter for HTTP-serving runtimes)
    pub layers: Vec<String>,
}

impl Function {
    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = vec![self.role.clone()];
        deps.extend(self.subnets.iter().cloned());
        deps.extend(self.security_groups.iter().cloned());
        deps.extend(self.environment.referenced_resources().cloned());
        deps
    }
}

/// An immutable published version of the function's current code
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionVersion {
    pub function: ResourceId,
    pub description: Option<String>,
}

/// Stable named pointer at one version
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionAlias {
    pub function: ResourceId,
    pub version: ResourceId,
    pub name: String,
    /// Instances kept initialised behind the alias
    pub provisioned_concurrency: Option<u32>,
}

/// `/aws/lambda/<function name>`, owned by the function
#[derive(Debug, Clone, PartialEq)]
pub struct LogGroup {
    pub function: ResourceId,
    pub retention_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_builder_uses_references() {
        let env = FunctionEnvironment::builder()
            .secret_name(&ResourceId::fixed("DatabaseSecret"))
            .proxy_endpoint(&ResourceId::fixed("DatabaseProxy"))
            .build();

        assert_eq!(
            env.get("DB_USER_SECRET_NAME"),
            Some(&EnvValue::Attribute {
                resource: ResourceId::fixed("DatabaseSecret"),
                attribute: Attribute::Name,
            })
        );
        assert_eq!(
            env.referenced_resources().cloned().collect::<Vec<_>>(),
            vec![
                ResourceId::fixed("DatabaseProxy"),
                ResourceId::fixed("DatabaseSecret")
            ]
        );
    }

    #[test]
    fn test_literals_carry_no_dependency() {
        let env = FunctionEnvironment::builder()
            .literal("POWERTOOLS_SERVICE_NAME", "demo")
            .build();
        assert_eq!(env.referenced_resources().count(), 0);
        assert!(!env.is_empty());
    }
}
