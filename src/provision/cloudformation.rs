//! # CloudFormation Deployer
//!
//! Deploys a synthesized [`Template`] as one CloudFormation stack:
//!
//! 1. upload the function package to the asset bucket (skipped when the key exists)
//! 2. create the stack, or update it when it already exists
//! 3. poll `DescribeStacks` with Fibonacci backoff until a terminal status
//! 4. return the stack outputs
//!
//! Templates larger than the inline limit are uploaded next to the asset and
//! passed by URL.

use super::backoff::FibonacciBackoff;
use super::ProvisionError;
use crate::asset::{AssetError, CodeAsset};
use crate::config::StackConfig;
use crate::synth::{Template, ASSET_BUCKET_PARAMETER};
use aws_sdk_cloudformation::types::{Capability, Parameter};
use aws_sdk_cloudformation::Client as CloudFormationClient;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// CloudFormation rejects inline template bodies above this size
const MAX_INLINE_TEMPLATE_BYTES: usize = 51_200;

#[derive(Debug, Clone)]
pub struct DeployerOptions {
    pub asset_bucket: String,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
    pub wait_timeout: Duration,
}

impl DeployerOptions {
    /// `asset_bucket` must be set in the config or passed explicitly
    pub fn from_config(config: &StackConfig, asset_bucket: String) -> Self {
        Self {
            asset_bucket,
            backoff_start: config.provisioning.backoff_start_duration(),
            backoff_max: config.provisioning.backoff_max_duration(),
            wait_timeout: config.provisioning.stack_wait_timeout(),
        }
    }
}

/// Terminal outcome of waiting on a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Succeeded,
    Gone,
}

pub struct CloudFormationDeployer {
    cloudformation: CloudFormationClient,
    s3: S3Client,
    region: String,
    options: DeployerOptions,
}

impl std::fmt::Debug for CloudFormationDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFormationDeployer")
            .field("region", &self.region)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CloudFormationDeployer {
    /// Build clients from the default credential chain
    pub async fn new(region: Option<String>, options: DeployerOptions) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;
        let region = sdk_config
            .region()
            .map_or_else(|| "us-east-1".to_string(), ToString::to_string);

        Self {
            cloudformation: CloudFormationClient::new(&sdk_config),
            s3: S3Client::new(&sdk_config),
            region,
            options,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Upload the function package unless an object with its key already exists
    pub async fn upload_asset(&self, asset: &CodeAsset) -> Result<(), ProvisionError> {
        asset.ensure_available()?;
        let bucket = &self.options.asset_bucket;
        let key = asset.s3_key();

        let exists = self
            .s3
            .head_object()
            .bucket(bucket)
            .key(&key)
            .send()
            .await
            .is_ok();
        if exists {
            debug!(bucket = %bucket, key = %key, "Asset already uploaded");
            return Ok(());
        }

        let bytes = std::fs::read(&asset.path).map_err(|source| AssetError::Read {
            path: asset.path.clone(),
            source,
        })?;
        info!(bucket = %bucket, key = %key, size = bytes.len(), "Uploading function package");
        self.s3
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| api_error("s3:PutObject", &e))?;
        Ok(())
    }

    /// Create or update `stack_name` from `template` and wait for it to settle
    pub async fn deploy(
        &self,
        stack_name: &str,
        template: &Template,
    ) -> Result<BTreeMap<String, String>, ProvisionError> {
        let span = info_span!("cloudformation.deploy", stack = stack_name, region = %self.region);

        async move {
            let body = template.to_json_pretty()?;
            let template_url = if body.len() > MAX_INLINE_TEMPLATE_BYTES {
                Some(self.upload_template(stack_name, &body).await?)
            } else {
                None
            };
            let parameter = Parameter::builder()
                .parameter_key(ASSET_BUCKET_PARAMETER)
                .parameter_value(&self.options.asset_bucket)
                .build();

            let exists = self.stack_status(stack_name).await?.is_some();
            if exists {
                info!("Updating stack");
                let mut request = self
                    .cloudformation
                    .update_stack()
                    .stack_name(stack_name)
                    .parameters(parameter)
                    .capabilities(Capability::CapabilityIam)
                    .capabilities(Capability::CapabilityNamedIam);
                request = match &template_url {
                    Some(url) => request.template_url(url),
                    None => request.template_body(&body),
                };
                if let Err(e) = request.send().await {
                    let message = error_message(&e);
                    if message.contains("No updates are to be performed") {
                        info!("Stack is already up to date");
                        return self.outputs(stack_name).await;
                    }
                    return Err(ProvisionError::Api {
                        operation: "cloudformation:UpdateStack",
                        message,
                    });
                }
            } else {
                info!("Creating stack");
                let mut request = self
                    .cloudformation
                    .create_stack()
                    .stack_name(stack_name)
                    .parameters(parameter)
                    .capabilities(Capability::CapabilityIam)
                    .capabilities(Capability::CapabilityNamedIam);
                request = match &template_url {
                    Some(url) => request.template_url(url),
                    None => request.template_body(&body),
                };
                request
                    .send()
                    .await
                    .map_err(|e| api_error("cloudformation:CreateStack", &e))?;
            }

            match self.wait(stack_name).await? {
                Settled::Succeeded => self.outputs(stack_name).await,
                Settled::Gone => Err(ProvisionError::StackNotFound(stack_name.to_string())),
            }
        }
        .instrument(span)
        .await
    }

    /// Outputs of a settled stack
    pub async fn outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>, ProvisionError> {
        let response = self
            .cloudformation
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| {
                let message = error_message(&e);
                if message.contains("does not exist") {
                    ProvisionError::StackNotFound(stack_name.to_string())
                } else {
                    ProvisionError::Api {
                        operation: "cloudformation:DescribeStacks",
                        message,
                    }
                }
            })?;

        let outputs = response
            .stacks()
            .first()
            .map(|stack| {
                stack
                    .outputs()
                    .iter()
                    .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Ok(outputs)
    }

    /// Delete the stack and wait until it is gone
    pub async fn delete(&self, stack_name: &str) -> Result<(), ProvisionError> {
        let span = info_span!("cloudformation.delete", stack = stack_name, region = %self.region);

        async move {
            if self.stack_status(stack_name).await?.is_none() {
                warn!("Stack does not exist, nothing to delete");
                return Ok(());
            }
            info!("Deleting stack");
            self.cloudformation
                .delete_stack()
                .stack_name(stack_name)
                .send()
                .await
                .map_err(|e| api_error("cloudformation:DeleteStack", &e))?;
            self.wait(stack_name).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn upload_template(&self, stack_name: &str, body: &str) -> Result<String, ProvisionError> {
        let bucket = &self.options.asset_bucket;
        let digest: String = Sha256::digest(body.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        let key = format!("templates/{stack_name}-{}.json", &digest[..16]);
        debug!(bucket = %bucket, key = %key, "Uploading template");
        self.s3
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .send()
            .await
            .map_err(|e| api_error("s3:PutObject", &e))?;
        Ok(format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.region))
    }

    /// Current status and reason, `None` when the stack does not exist
    async fn stack_status(&self, stack_name: &str) -> Result<Option<(String, String)>, ProvisionError> {
        match self
            .cloudformation
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(response) => Ok(response.stacks().first().and_then(|stack| {
                let status = stack.stack_status()?.as_str().to_string();
                let reason = stack.stack_status_reason().unwrap_or_default().to_string();
                Some((status, reason))
            })),
            Err(e) => {
                let message = error_message(&e);
                if message.contains("does not exist") {
                    Ok(None)
                } else {
                    Err(ProvisionError::Api {
                        operation: "cloudformation:DescribeStacks",
                        message,
                    })
                }
            }
        }
    }

    async fn wait(&self, stack_name: &str) -> Result<Settled, ProvisionError> {
        let start = Instant::now();
        let mut backoff = FibonacciBackoff::new(self.options.backoff_start, self.options.backoff_max);
        loop {
            let Some((status, reason)) = self.stack_status(stack_name).await? else {
                return Ok(Settled::Gone);
            };
            match classify(&status) {
                StatusClass::InProgress => {
                    if start.elapsed() >= self.options.wait_timeout {
                        return Err(ProvisionError::Timeout {
                            stack: stack_name.to_string(),
                            waited_secs: start.elapsed().as_secs(),
                        });
                    }
                    let delay = backoff.next_backoff();
                    debug!(status = %status, delay_ms = delay.as_millis() as u64, "Stack in progress");
                    tokio::time::sleep(delay).await;
                }
                StatusClass::Succeeded => {
                    info!(status = %status, elapsed_secs = start.elapsed().as_secs(), "Stack settled");
                    return Ok(if status == "DELETE_COMPLETE" {
                        Settled::Gone
                    } else {
                        Settled::Succeeded
                    });
                }
                StatusClass::Failed => {
                    return Err(ProvisionError::StackFailed {
                        stack: stack_name.to_string(),
                        status,
                        reason,
                    });
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    InProgress,
    Succeeded,
    Failed,
}

fn classify(status: &str) -> StatusClass {
    if status.ends_with("_IN_PROGRESS") {
        StatusClass::InProgress
    } else if status.contains("ROLLBACK") || status.ends_with("_FAILED") {
        StatusClass::Failed
    } else {
        StatusClass::Succeeded
    }
}

fn error_message<E: std::error::Error>(error: &E) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn api_error<E: std::error::Error>(operation: &'static str, error: &E) -> ProvisionError {
    ProvisionError::Api {
        operation,
        message: error_message(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify("CREATE_IN_PROGRESS"), StatusClass::InProgress);
        assert_eq!(classify("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"), StatusClass::InProgress);
        assert_eq!(classify("CREATE_COMPLETE"), StatusClass::Succeeded);
        assert_eq!(classify("UPDATE_COMPLETE"), StatusClass::Succeeded);
        assert_eq!(classify("DELETE_COMPLETE"), StatusClass::Succeeded);
        assert_eq!(classify("ROLLBACK_COMPLETE"), StatusClass::Failed);
        assert_eq!(classify("UPDATE_ROLLBACK_COMPLETE"), StatusClass::Failed);
        assert_eq!(classify("CREATE_FAILED"), StatusClass::Failed);
        assert_eq!(classify("DELETE_FAILED"), StatusClass::Failed);
    }

    #[test]
    fn test_error_message_walks_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "Stack with id X does not exist");
        let outer = AssetError::Read {
            path: "a.zip".into(),
            source: inner,
        };
        assert!(error_message(&outer).contains("does not exist"));
    }
}
