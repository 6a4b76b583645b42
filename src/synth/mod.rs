//! # CloudFormation Synthesis
//!
//! Renders a [`Stack`] into a CloudFormation template. Each descriptor maps to
//! one primary resource under its own logical id, plus any helper resources
//! (route tables, EIPs, secret attachment, proxy target group, deployment)
//! under ids derived from it.
//!
//! Graph edges already expressed through `Ref`/`Fn::GetAtt` are left to
//! CloudFormation; the rest become `DependsOn`. Maps are sorted, so the same
//! stack always renders to the same bytes.

mod intrinsics;
mod resources;

use crate::stack::Stack;
use crate::topology::{Attribute, RemovalPolicy, ResourceId, StackOutput};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info_span};

pub use intrinsics::referenced_ids;

/// Parameter holding the bucket the function package was uploaded to
pub const ASSET_BUCKET_PARAMETER: &str = "AssetBucket";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthError {
    #[error("resource '{0}' is referenced but not declared")]
    UnknownResource(ResourceId),

    #[error("resource '{resource}' ({kind}) has no attribute {attribute}")]
    UnsupportedAttribute {
        resource: ResourceId,
        kind: &'static str,
        attribute: Attribute,
    },

    #[error("gateway method path '{0}' is not supported; only the root path is")]
    UnsupportedPath(String),
}

/// Inputs that are not part of the topology itself
#[derive(Debug, Clone, Default)]
pub struct SynthContext {
    pub description: Option<String>,
    /// Default value of the `AssetBucket` parameter
    pub asset_bucket: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<&'static str>,
}

impl CfnResource {
    pub(crate) fn new(resource_type: &str, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    #[must_use]
    pub(crate) fn depends_on(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.depends_on.extend(ids);
        self.depends_on.sort();
        self.depends_on.dedup();
        self
    }

    fn apply_removal_policy(&mut self, policy: RemovalPolicy) {
        let value = match policy {
            RemovalPolicy::Destroy => None,
            RemovalPolicy::Retain => Some("Retain"),
            RemovalPolicy::Snapshot => Some("Snapshot"),
        };
        self.deletion_policy = value;
        self.update_replace_policy = value;
    }

    /// Logical ids this resource refers to through intrinsics
    pub fn references(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for value in self.properties.values() {
            referenced_ids(value, &mut ids);
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: BTreeMap<String, Value>,
    pub resources: BTreeMap<String, CfnResource>,
    pub outputs: BTreeMap<String, Value>,
}

impl Template {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources.get(logical_id)
    }

    /// Logical ids of every resource of `resource_type`
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
            .map(|(id, _)| id.as_str())
    }
}

/// Render `stack` into a template
pub fn synthesize(stack: &Stack, context: &SynthContext) -> Result<Template, SynthError> {
    let span = info_span!("synth", stack = %stack.name());
    let _guard = span.enter();

    let mut bucket = json!({
        "Type": "String",
        "Description": "S3 bucket holding the function code package",
    });
    if let Some(default) = &context.asset_bucket {
        bucket["Default"] = Value::from(default.clone());
    }
    let mut parameters = BTreeMap::from([(ASSET_BUCKET_PARAMETER.to_string(), bucket)]);
    let mut rendered = BTreeMap::new();

    let renderer = resources::Renderer::new(stack);
    for resource in stack.apply_order() {
        let output = renderer.render(resource)?;
        parameters.extend(output.parameters);

        let mut primary = output.primary;
        primary.apply_removal_policy(resource.removal_policy);
        let referenced = primary.references();
        let implicit: Vec<String> = resource
            .dependencies()
            .into_iter()
            .map(|id| id.to_string())
            .filter(|id| !referenced.contains(id))
            .collect();
        let primary = primary.depends_on(implicit);

        debug!(
            resource = %resource.id,
            cfn_type = %primary.resource_type,
            helpers = output.helpers.len(),
            "Rendered resource"
        );
        rendered.insert(resource.id.to_string(), primary);
        rendered.extend(output.helpers);
    }

    let mut outputs = BTreeMap::new();
    for output in stack.outputs() {
        let StackOutput::StageUrl { name, api, stage, .. } = output;
        outputs.insert(
            name.clone(),
            json!({
                "Description": "Base URL of the deployed REST API stage",
                "Value": intrinsics::join("", vec![
                    Value::from("https://"),
                    intrinsics::reference(api.as_str()),
                    Value::from(".execute-api."),
                    intrinsics::region(),
                    Value::from("."),
                    intrinsics::url_suffix(),
                    Value::from("/"),
                    intrinsics::reference(stage.as_str()),
                    Value::from("/"),
                ]),
            }),
        );
    }

    Ok(Template {
        format_version: "2010-09-09",
        description: context.description.clone(),
        parameters,
        resources: rendered,
        outputs,
    })
}
