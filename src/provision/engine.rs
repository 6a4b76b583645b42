//! # Provisioning Engine
//!
//! Walks the dependency graph in topological order and creates each resource
//! through a [`ResourceProvisioner`], resolving attribute references from the
//! resources created before it.
//!
//! - Transient failures are retried with Fibonacci backoff up to `max_attempts`.
//! - A permanent failure stops the run; everything created so far is deleted
//!   again in reverse creation order (resources with a `Retain` policy stay).
//! - A database created without a credential secret reference aborts the run.
//!
//! Destroy walks the reverse order. Resources whose removal policy keeps them,
//! and everything they transitively depend on, are left in place.

use super::backoff::FibonacciBackoff;
use super::{CreateRequest, Deployment, ProvisionError, ResourceProvisioner};
use crate::config::StackConfig;
use crate::constants::{DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_MAX_PROVISION_ATTEMPTS};
use crate::observability::metrics;
use crate::stack::Stack;
use crate::topology::{
    Attribute, EnvValue, PolicyResource, RemovalPolicy, Resource, ResourceId, ResourceKind,
    StackOutput,
};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct ProvisionerOptions {
    pub max_attempts: u32,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
    /// Region used when rendering output URLs
    pub region: String,
}

impl Default for ProvisionerOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_PROVISION_ATTEMPTS,
            backoff_start: Duration::from_millis(DEFAULT_BACKOFF_START_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            region: "us-east-1".to_string(),
        }
    }
}

impl ProvisionerOptions {
    pub fn from_config(config: &StackConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: config.provisioning.max_attempts,
            backoff_start: config.provisioning.backoff_start_duration(),
            backoff_max: config.provisioning.backoff_max_duration(),
            region: config.region.clone().unwrap_or(defaults.region),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DestroyOptions {
    /// Also delete resources whose removal policy is `Snapshot`
    pub allow_data_loss: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    /// Deleted, in deletion order
    pub deleted: Vec<ResourceId>,
    /// Left in place by removal policy or because a retained resource needs them
    pub retained: Vec<ResourceId>,
}

pub struct Provisioner<P> {
    backend: P,
    options: ProvisionerOptions,
}

impl<P: ResourceProvisioner> Provisioner<P> {
    pub fn new(backend: P, options: ProvisionerOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    /// Create every resource of `stack` in dependency order
    pub async fn apply(&self, stack: &Stack) -> Result<Deployment, ProvisionError> {
        let span = info_span!("provision.apply", stack = %stack.name(), resources = stack.len());
        let start = Instant::now();

        async move {
            let mut deployment = Deployment::new(stack.name());
            for resource in stack.apply_order() {
                if let Err(e) = self.apply_one(resource, &mut deployment).await {
                    error!(resource = %resource.id, error = %e, "Apply failed, rolling back");
                    let (rolled_back, rollback_failures) = self.rollback(stack, &deployment).await;
                    metrics::set_resources_managed(deployment.len().saturating_sub(rolled_back));
                    metrics::observe_provision_duration("apply", start.elapsed().as_secs_f64());
                    return Err(ProvisionError::ApplyFailed {
                        resource: resource.id.clone(),
                        rolled_back,
                        rollback_failures,
                        cause: Box::new(e),
                    });
                }
            }

            deployment.outputs = self.resolve_outputs(stack, &deployment)?;
            metrics::set_resources_managed(deployment.len());
            metrics::observe_provision_duration("apply", start.elapsed().as_secs_f64());
            info!(
                created = deployment.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Stack applied"
            );
            Ok(deployment)
        }
        .instrument(span)
        .await
    }

    async fn apply_one(
        &self,
        resource: &Resource,
        deployment: &mut Deployment,
    ) -> Result<(), ProvisionError> {
        check_references(resource, deployment)?;
        let request = CreateRequest {
            resource,
            deployed: deployment,
            environment: resolve_environment(resource, deployment)?,
        };

        let provisioned = self
            .with_retry(resource, "create", || self.backend.create(&request))
            .await?;
        debug!(resource = %resource.id, physical_id = %provisioned.physical_id, "Created");
        deployment.insert(provisioned);

        if let ResourceKind::DatabaseInstance(db) = &resource.kind {
            let has_secret = db
                .secret
                .as_ref()
                .is_some_and(|secret| deployment.attribute(secret, &Attribute::Arn).is_some());
            if !has_secret {
                return Err(ProvisionError::MissingCredential(resource.id.clone()));
            }
        }
        Ok(())
    }

    /// Delete what was created, newest first, keeping `Retain` resources and
    /// what they depend on. Returns (deleted, failures).
    async fn rollback(&self, stack: &Stack, deployment: &Deployment) -> (usize, usize) {
        let retained = retained_set(
            stack,
            deployment,
            DestroyOptions {
                allow_data_loss: true,
            },
        );
        let mut deleted = 0;
        let mut failures = 0;
        for provisioned in deployment.resources().iter().rev() {
            let Some(resource) = stack.resource(&provisioned.id) else {
                continue;
            };
            if retained.contains(&resource.id) {
                info!(resource = %resource.id, "Retaining resource during rollback");
                continue;
            }
            match self
                .with_retry(resource, "rollback", || self.backend.delete(resource, provisioned))
                .await
            {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(resource = %resource.id, error = %e, "Rollback delete failed");
                    failures += 1;
                }
            }
        }
        (deleted, failures)
    }

    /// Delete `deployment` in reverse dependency order, honouring removal policies
    pub async fn destroy(
        &self,
        stack: &Stack,
        deployment: &Deployment,
        options: DestroyOptions,
    ) -> Result<DestroyReport, ProvisionError> {
        let span = info_span!(
            "provision.destroy",
            stack = %stack.name(),
            allow_data_loss = options.allow_data_loss
        );
        let start = Instant::now();

        async move {
            let retained = retained_set(stack, deployment, options);
            let mut report = DestroyReport::default();

            for resource in stack.destroy_order() {
                let Some(provisioned) = deployment.get(&resource.id) else {
                    continue;
                };
                if retained.contains(&resource.id) {
                    info!(
                        resource = %resource.id,
                        policy = ?resource.removal_policy,
                        "Retaining resource"
                    );
                    report.retained.push(resource.id.clone());
                    continue;
                }
                self.with_retry(resource, "delete", || self.backend.delete(resource, provisioned))
                    .await?;
                report.deleted.push(resource.id.clone());
            }

            metrics::set_resources_managed(report.retained.len());
            metrics::observe_provision_duration("destroy", start.elapsed().as_secs_f64());
            info!(
                deleted = report.deleted.len(),
                retained = report.retained.len(),
                "Stack destroyed"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        resource: &Resource,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, ProvisionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProvisionError>>,
    {
        let kind = resource.kind_name();
        let mut backoff = FibonacciBackoff::new(self.options.backoff_start, self.options.backoff_max);
        let mut attempt = 1;
        loop {
            metrics::record_provision_operation(kind, operation);
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.options.max_attempts => {
                    let delay = backoff.next_backoff();
                    warn!(
                        resource = %resource.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    metrics::increment_provision_retries();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    metrics::record_provision_error(kind, operation);
                    return Err(e);
                }
            }
        }
    }

    fn resolve_outputs(
        &self,
        stack: &Stack,
        deployment: &Deployment,
    ) -> Result<BTreeMap<String, String>, ProvisionError> {
        let mut outputs = BTreeMap::new();
        for output in stack.outputs() {
            let StackOutput::StageUrl {
                name,
                api,
                stage,
                stage_name,
            } = output;
            let api_id = deployment.attribute(api, &Attribute::Ref).ok_or_else(|| {
                ProvisionError::UnresolvedAttribute {
                    resource: stage.clone(),
                    dependency: api.clone(),
                    attribute: Attribute::Ref,
                }
            })?;
            outputs.insert(
                name.clone(),
                format!(
                    "https://{api_id}.execute-api.{}.amazonaws.com/{stage_name}/",
                    self.options.region
                ),
            );
        }
        Ok(outputs)
    }
}

/// Every explicit attribute reference must already be resolvable
fn check_references(resource: &Resource, deployment: &Deployment) -> Result<(), ProvisionError> {
    let mut wanted: Vec<(ResourceId, Attribute)> = resource
        .dependencies()
        .into_iter()
        .map(|id| (id, Attribute::Ref))
        .collect();
    if let ResourceKind::IamRole(role) = &resource.kind {
        for statement in &role.statements {
            for target in &statement.resources {
                match target {
                    PolicyResource::Attribute(id, attribute) => {
                        wanted.push((id.clone(), attribute.clone()));
                    }
                    PolicyResource::ProxyDbUser { proxy, .. } => {
                        wanted.push((proxy.clone(), Attribute::Arn));
                    }
                    PolicyResource::Literal(_) => {}
                }
            }
        }
    }

    for (dependency, attribute) in wanted {
        if deployment.attribute(&dependency, &attribute).is_none() {
            return Err(ProvisionError::UnresolvedAttribute {
                resource: resource.id.clone(),
                dependency,
                attribute,
            });
        }
    }
    Ok(())
}

fn resolve_environment(
    resource: &Resource,
    deployment: &Deployment,
) -> Result<BTreeMap<String, String>, ProvisionError> {
    let ResourceKind::Function(function) = &resource.kind else {
        return Ok(BTreeMap::new());
    };

    let mut resolved = BTreeMap::new();
    for (key, value) in function.environment.iter() {
        let value = match value {
            EnvValue::Literal(v) => v.clone(),
            EnvValue::Attribute {
                attribute: Attribute::SecretValue(_),
                ..
            } => {
                return Err(ProvisionError::SecretValueReference {
                    resource: resource.id.clone(),
                    key: key.clone(),
                });
            }
            EnvValue::Attribute {
                resource: dependency,
                attribute,
            } => deployment
                .attribute(dependency, attribute)
                .ok_or_else(|| ProvisionError::UnresolvedAttribute {
                    resource: resource.id.clone(),
                    dependency: dependency.clone(),
                    attribute: attribute.clone(),
                })?
                .to_string(),
        };
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}

/// Resources kept by policy plus everything they depend on
fn retained_set(stack: &Stack, deployment: &Deployment, options: DestroyOptions) -> HashSet<ResourceId> {
    let mut retained = HashSet::new();
    for resource in stack.resources() {
        if !deployment.contains(&resource.id) {
            continue;
        }
        let keep = match resource.removal_policy {
            RemovalPolicy::Destroy => false,
            RemovalPolicy::Retain => true,
            RemovalPolicy::Snapshot => !options.allow_data_loss,
        };
        if keep {
            retained.insert(resource.id.clone());
            retained.extend(stack.graph().transitive_dependencies(&resource.id));
        }
    }
    retained
}

