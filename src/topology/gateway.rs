//! # HTTP Gateway
//!
//! A REST API with a single method on the root path, integrated synchronously
//! with the function alias, deployed to one stage with data tracing.

use super::ResourceId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Any,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Any => "ANY",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestApi {
    pub name: String,
    pub description: Option<String>,
    /// Create the account-wide role API Gateway pushes execution logs with
    pub cloud_watch_role: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integration {
    /// Synchronous proxy integration: the function's response is returned verbatim
    LambdaProxy { target: ResourceId },
}

impl Integration {
    pub fn target(&self) -> &ResourceId {
        match self {
            Integration::LambdaProxy { target } => target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayMethod {
    pub api: ResourceId,
    pub http_method: HttpMethod,
    /// Only the root path is modelled
    pub path: String,
    pub integration: Integration,
    /// No authorizer is attached when true
    pub unauthenticated: bool,
}

impl GatewayMethod {
    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        vec![self.api.clone(), self.integration.target().clone()]
    }
}

/// Deployment plus stage; depends on every method so the deployment includes them
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStage {
    pub api: ResourceId,
    pub stage_name: String,
    pub methods: Vec<ResourceId>,
    /// Full request/response logging at the stage
    pub data_trace_enabled: bool,
}

impl GatewayStage {
    pub(super) fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = vec![self.api.clone()];
        deps.extend(self.methods.iter().cloned());
        deps
    }
}

/// Lets the API invoke the function alias for one method and path
#[derive(Debug, Clone, PartialEq)]
pub struct InvokePermission {
    pub function: ResourceId,
    pub api: ResourceId,
    pub http_method: HttpMethod,
    pub path: String,
}

/// Provisioning-time output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOutput {
    /// Base URL of a deployed stage
    StageUrl {
        name: String,
        api: ResourceId,
        stage: ResourceId,
        stage_name: String,
    },
}

impl StackOutput {
    pub fn name(&self) -> &str {
        match self {
            StackOutput::StageUrl { name, .. } => name,
        }
    }
}
