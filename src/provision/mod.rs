//! # Provisioning
//!
//! Applies a [`Stack`](crate::stack::Stack) to a platform and tears it down again.
//!
//! ## Module Structure
//!
//! - `backoff.rs` - Fibonacci backoff for retries and polling
//! - `engine.rs` - [`Provisioner`]: ordered apply with retries and rollback, policy-aware destroy
//! - `memory.rs` - [`InMemoryProvisioner`]: deterministic fake platform with failure injection
//! - `cloudformation.rs` - [`CloudFormationDeployer`]: whole-stack deploy through CloudFormation
//!
//! The engine drives a [`ResourceProvisioner`] one resource at a time in
//! dependency order. The CloudFormation deployer hands the synthesized
//! template to CloudFormation, which does its own ordering.

pub mod backoff;
mod cloudformation;
mod engine;
mod memory;

use crate::asset::AssetError;
use crate::synth::SynthError;
use crate::topology::{Attribute, Resource, ResourceId};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub use cloudformation::{CloudFormationDeployer, DeployerOptions};
pub use engine::{DestroyOptions, DestroyReport, Provisioner, ProvisionerOptions};
pub use memory::{FailureMode, InMemoryProvisioner, Operation};

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Worth retrying (throttling, eventual consistency)
    #[error("transient failure on '{resource}': {message}")]
    Transient { resource: ResourceId, message: String },

    #[error("failed to provision '{resource}': {message}")]
    Permanent { resource: ResourceId, message: String },

    #[error("'{resource}' references {attribute} of '{dependency}', which is not available")]
    UnresolvedAttribute {
        resource: ResourceId,
        dependency: ResourceId,
        attribute: Attribute,
    },

    #[error("'{resource}' would embed a secret value in environment variable {key}")]
    SecretValueReference { resource: ResourceId, key: String },

    #[error("database '{0}' was created without a credential secret reference")]
    MissingCredential(ResourceId),

    #[error("apply failed at '{resource}'; rolled back {rolled_back} resource(s), {rollback_failures} rollback failure(s)")]
    ApplyFailed {
        resource: ResourceId,
        rolled_back: usize,
        rollback_failures: usize,
        #[source]
        cause: Box<ProvisionError>,
    },

    #[error("stack '{stack}' ended in {status}: {reason}")]
    StackFailed {
        stack: String,
        status: String,
        reason: String,
    },

    #[error("timed out after {waited_secs}s waiting for stack '{stack}'")]
    Timeout { stack: String, waited_secs: u64 },

    #[error("stack '{0}' does not exist")]
    StackNotFound(String),

    #[error("AWS API call {operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error("failed to serialize template: {0}")]
    Template(#[from] serde_json::Error),
}

impl ProvisionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::Transient { .. })
    }

    /// The error that started an apply failure, skipping the rollback wrapper
    pub fn root_cause(&self) -> &ProvisionError {
        match self {
            ProvisionError::ApplyFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// A resource that exists on the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedResource {
    pub id: ResourceId,
    pub kind: &'static str,
    pub physical_id: String,
    /// Attribute name (as displayed by [`Attribute`]) to value; `Ref` is always present
    pub attributes: BTreeMap<String, String>,
    /// Resolved environment for functions
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl ProvisionedResource {
    pub fn new(id: ResourceId, kind: &'static str, physical_id: impl Into<String>) -> Self {
        let physical_id = physical_id.into();
        let attributes = BTreeMap::from([(Attribute::Ref.to_string(), physical_id.clone())]);
        Self {
            id,
            kind,
            physical_id,
            attributes,
            environment: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute, value: impl Into<String>) -> Self {
        self.attributes.insert(attribute.to_string(), value.into());
        self
    }

    pub fn attribute(&self, attribute: &Attribute) -> Option<&str> {
        self.attributes.get(&attribute.to_string()).map(String::as_str)
    }
}

/// Resources created so far, in creation order, plus resolved outputs
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub stack_name: String,
    resources: Vec<ProvisionedResource>,
    pub outputs: BTreeMap<String, String>,
}

impl Deployment {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, resource: ProvisionedResource) {
        self.resources.retain(|r| r.id != resource.id);
        self.resources.push(resource);
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ProvisionedResource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.get(id).is_some()
    }

    pub fn attribute(&self, id: &ResourceId, attribute: &Attribute) -> Option<&str> {
        self.get(id).and_then(|r| r.attribute(attribute))
    }

    /// Resources in creation order
    pub fn resources(&self) -> &[ProvisionedResource] {
        &self.resources
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Everything a backend needs to create one resource
#[derive(Debug)]
pub struct CreateRequest<'a> {
    pub resource: &'a Resource,
    /// Resources already created; every dependency of `resource` is present
    pub deployed: &'a Deployment,
    /// Resolved environment when `resource` is a function
    pub environment: BTreeMap<String, String>,
}

/// Backend that creates and deletes individual resources
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    async fn create(&self, request: &CreateRequest<'_>) -> Result<ProvisionedResource, ProvisionError>;

    async fn delete(
        &self,
        resource: &Resource,
        provisioned: &ProvisionedResource,
    ) -> Result<(), ProvisionError>;
}
