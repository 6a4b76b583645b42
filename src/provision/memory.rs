//! In-memory platform used by `poolctl plan --simulate` and the tests.
//!
//! Physical ids, ARNs and endpoints are derived from a hash of the stack and
//! logical id, so repeated runs produce the same values.

use super::{CreateRequest, ProvisionError, ProvisionedResource, ResourceProvisioner};
use crate::topology::{Attribute, Resource, ResourceId, ResourceKind};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

const ACCOUNT_ID: &str = "123456789012";

/// Injected behaviour for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureMode {
    /// Fail the first `n` create attempts with a transient error
    TransientOnCreate(u32),
    PermanentOnCreate,
    PermanentOnDelete,
    /// Create succeeds but the attribute is missing from the result
    OmitAttribute(Attribute),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Delete,
}

#[derive(Debug, Default)]
struct State {
    live: HashMap<ResourceId, ProvisionedResource>,
    events: Vec<(Operation, ResourceId)>,
    failures: HashMap<ResourceId, FailureMode>,
    attempts: HashMap<ResourceId, u32>,
    versions: HashMap<ResourceId, u32>,
}

#[derive(Debug)]
pub struct InMemoryProvisioner {
    stack_name: String,
    region: String,
    state: Mutex<State>,
}

impl InMemoryProvisioner {
    pub fn new(stack_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: region.into(),
            state: Mutex::new(State::default()),
        }
    }

    #[must_use]
    pub fn with_failure(self, id: &ResourceId, mode: FailureMode) -> Self {
        self.lock().failures.insert(id.clone(), mode);
        self
    }

    /// Successful creates and deletes, in order
    pub fn events(&self) -> Vec<(Operation, ResourceId)> {
        self.lock().events.clone()
    }

    pub fn is_live(&self, id: &ResourceId) -> bool {
        self.lock().live.contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Create attempts made for `id`, including failed ones
    pub fn attempts(&self, id: &ResourceId) -> u32 {
        self.lock().attempts.get(id).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self, id: &ResourceId, len: usize) -> String {
        let digest = Sha256::digest(format!("{}/{}", self.stack_name, id).as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..len.min(hex.len())].to_string()
    }

    /// `<stack>-<logical id>-<token>`, the shape CloudFormation gives generated names
    fn generated_name(&self, id: &ResourceId) -> String {
        let mut prefix = format!("{}-{}", self.stack_name, id);
        prefix.truncate(50);
        format!("{prefix}-{}", self.token(id, 12).to_uppercase())
    }

    fn materialize(
        &self,
        request: &CreateRequest<'_>,
        version: u32,
    ) -> Result<ProvisionedResource, ProvisionError> {
        let resource = request.resource;
        let id = resource.id.clone();
        let kind = resource.kind_name();
        let region = &self.region;
        let token = self.token(&id, 17);

        let provisioned = match &resource.kind {
            ResourceKind::Vpc(_) => ProvisionedResource::new(id, kind, format!("vpc-{token}")),
            ResourceKind::Subnet(_) => ProvisionedResource::new(id, kind, format!("subnet-{token}")),
            ResourceKind::InternetGateway(_) => {
                ProvisionedResource::new(id, kind, format!("igw-{token}"))
            }
            ResourceKind::NatGateway(_) => ProvisionedResource::new(id, kind, format!("nat-{token}")),
            ResourceKind::SecurityGroup(_) => ProvisionedResource::new(id, kind, format!("sg-{token}")),
            ResourceKind::SecurityGroupRule(_) => {
                ProvisionedResource::new(id, kind, format!("sgr-{token}"))
            }
            ResourceKind::Secret(secret) => {
                let arn = format!(
                    "arn:aws:secretsmanager:{region}:{ACCOUNT_ID}:secret:{}-{}",
                    secret.name,
                    self.token(&resource.id, 6)
                );
                ProvisionedResource::new(id, kind, arn.clone())
                    .with_attribute(Attribute::Arn, arn)
                    .with_attribute(Attribute::Name, secret.name.clone())
            }
            ResourceKind::DbSubnetGroup(_) => {
                ProvisionedResource::new(id, kind, self.generated_name(&resource.id).to_lowercase())
            }
            ResourceKind::DatabaseInstance(_) => {
                let name = self.generated_name(&resource.id).to_lowercase();
                let endpoint = format!("{name}.{}.{region}.rds.amazonaws.com", self.token(&resource.id, 12));
                ProvisionedResource::new(id, kind, name).with_attribute(Attribute::Endpoint, endpoint)
            }
            ResourceKind::IamRole(_) => {
                let name = self.generated_name(&resource.id);
                let arn = format!("arn:aws:iam::{ACCOUNT_ID}:role/{name}");
                ProvisionedResource::new(id, kind, name).with_attribute(Attribute::Arn, arn)
            }
            ResourceKind::DatabaseProxy(proxy) => {
                let arn = format!("arn:aws:rds:{region}:{ACCOUNT_ID}:db-proxy:prx-{token}");
                let endpoint = format!(
                    "{}.proxy-{}.{region}.rds.amazonaws.com",
                    proxy.name,
                    self.token(&resource.id, 12)
                );
                ProvisionedResource::new(id, kind, proxy.name.clone())
                    .with_attribute(Attribute::Arn, arn)
                    .with_attribute(Attribute::Endpoint, endpoint)
            }
            ResourceKind::Function(_) => {
                let name = self.generated_name(&resource.id);
                let arn = format!("arn:aws:lambda:{region}:{ACCOUNT_ID}:function:{name}");
                let mut provisioned =
                    ProvisionedResource::new(id, kind, name).with_attribute(Attribute::Arn, arn);
                provisioned.environment = request.environment.clone();
                provisioned
            }
            ResourceKind::FunctionVersion(v) => {
                let function_arn = self.dependency(request, &v.function, &Attribute::Arn)?;
                let arn = format!("{function_arn}:{version}");
                ProvisionedResource::new(id, kind, arn.clone())
                    .with_attribute(Attribute::Arn, arn)
                    .with_attribute(Attribute::Version, version.to_string())
            }
            ResourceKind::FunctionAlias(alias) => {
                let function_arn = self.dependency(request, &alias.function, &Attribute::Arn)?;
                let arn = format!("{function_arn}:{}", alias.name);
                ProvisionedResource::new(id, kind, arn.clone()).with_attribute(Attribute::Arn, arn)
            }
            ResourceKind::LogGroup(group) => {
                let function = self.dependency(request, &group.function, &Attribute::Ref)?;
                let name = format!("/aws/lambda/{function}");
                let arn = format!("arn:aws:logs:{region}:{ACCOUNT_ID}:log-group:{name}:*");
                ProvisionedResource::new(id, kind, name).with_attribute(Attribute::Arn, arn)
            }
            ResourceKind::RestApi(_) => {
                let api_id = self.token(&resource.id, 10);
                let root = format!("{}root", api_id);
                ProvisionedResource::new(id, kind, api_id)
                    .with_attribute(Attribute::RootResourceId, root)
            }
            ResourceKind::GatewayMethod(method) => {
                let api = self.dependency(request, &method.api, &Attribute::Ref)?;
                ProvisionedResource::new(
                    id,
                    kind,
                    format!("{api}|{}|{}", method.http_method, method.path),
                )
            }
            ResourceKind::GatewayStage(stage) => {
                ProvisionedResource::new(id, kind, stage.stage_name.clone())
            }
            ResourceKind::InvokePermission(_) => {
                ProvisionedResource::new(id, kind, format!("perm-{token}"))
            }
        };
        Ok(provisioned)
    }

    fn dependency(
        &self,
        request: &CreateRequest<'_>,
        dependency: &ResourceId,
        attribute: &Attribute,
    ) -> Result<String, ProvisionError> {
        request
            .deployed
            .attribute(dependency, attribute)
            .map(ToString::to_string)
            .ok_or_else(|| ProvisionError::UnresolvedAttribute {
                resource: request.resource.id.clone(),
                dependency: dependency.clone(),
                attribute: attribute.clone(),
            })
    }
}

#[async_trait]
impl ResourceProvisioner for InMemoryProvisioner {
    async fn create(&self, request: &CreateRequest<'_>) -> Result<ProvisionedResource, ProvisionError> {
        let id = &request.resource.id;

        let (failure, attempt, version) = {
            let mut state = self.lock();
            let attempt = {
                let entry = state.attempts.entry(id.clone()).or_insert(0);
                *entry += 1;
                *entry
            };
            let version = match &request.resource.kind {
                ResourceKind::FunctionVersion(v) => {
                    let entry = state.versions.entry(v.function.clone()).or_insert(0);
                    *entry += 1;
                    *entry
                }
                _ => 0,
            };
            (state.failures.get(id).cloned(), attempt, version)
        };

        match &failure {
            Some(FailureMode::TransientOnCreate(n)) if attempt <= *n => {
                return Err(ProvisionError::Transient {
                    resource: id.clone(),
                    message: format!("Rate exceeded (attempt {attempt})"),
                });
            }
            Some(FailureMode::PermanentOnCreate) => {
                return Err(ProvisionError::Permanent {
                    resource: id.clone(),
                    message: "injected create failure".to_string(),
                });
            }
            _ => {}
        }

        let mut provisioned = self.materialize(request, version)?;
        if let Some(FailureMode::OmitAttribute(attribute)) = &failure {
            provisioned.attributes.remove(&attribute.to_string());
        }

        debug!(resource = %id, physical_id = %provisioned.physical_id, "Simulated create");
        let mut state = self.lock();
        state.live.insert(id.clone(), provisioned.clone());
        state.events.push((Operation::Create, id.clone()));
        Ok(provisioned)
    }

    async fn delete(
        &self,
        resource: &Resource,
        _provisioned: &ProvisionedResource,
    ) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        if state.failures.get(&resource.id) == Some(&FailureMode::PermanentOnDelete) {
            return Err(ProvisionError::Permanent {
                resource: resource.id.clone(),
                message: "injected delete failure".to_string(),
            });
        }
        if state.live.remove(&resource.id).is_some() {
            state.events.push((Operation::Delete, resource.id.clone()));
        }
        debug!(resource = %resource.id, "Simulated delete");
        Ok(())
    }
}
