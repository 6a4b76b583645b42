//! # Connection Pooling Stack
//!
//! Composes the whole topology from a [`StackConfig`]:
//!
//! 1. VPC with public (`nat`), private (`app`) and isolated (`database`) tiers
//! 2. MySQL instance in the isolated tier with a generated credential secret
//! 3. Application and proxy security groups, paired by one ingress rule
//! 4. Connection proxy in the private tier, authenticating with the secret
//! 5. Database-ping function with single-instance concurrency, its published
//!    version, the `live` alias and a one-week log group
//! 6. REST API with `GET /` on the alias and the `ApiEndpoint` output
//!
//! The result is a [`Stack`]: the resources, their dependency graph and the
//! outputs. Building never touches the cloud.

use crate::asset::CodeAsset;
use crate::config::StackConfig;
use crate::constants::{PROVISIONED_CONCURRENCY, RESERVED_CONCURRENCY};
use crate::graph::{DependencyGraph, GraphError};
use crate::topology::network::pascal_case;
use crate::topology::{
    plan_network, Credentials, DatabaseEngine, DatabaseInstance, DatabaseProxy, Function,
    FunctionAlias, FunctionEnvironment, FunctionVersion, GatewayMethod, GatewayStage, HttpMethod,
    IamRole, InstanceType, Integration, InvokePermission, Ipv4Cidr, LogGroup, Peer,
    PolicyStatement, Port, Resource, ResourceId, ResourceKind, RestApi, SecurityGroup,
    SecurityGroupRule, StackOutput, SubnetType, TopologyError, TracingMode,
};
use thiserror::Error;
use tracing::{debug, info, info_span};

#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(
        "database '{0}' has no credential secret; the proxy and the function cannot authenticate without one"
    )]
    MissingDatabaseSecret(ResourceId),

    #[error("output '{output}' references unknown resource '{resource}'")]
    DanglingOutput { output: String, resource: ResourceId },
}

/// A validated, acyclic set of resources plus outputs
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    resources: Vec<Resource>,
    graph: DependencyGraph,
    outputs: Vec<StackOutput>,
}

impl Stack {
    pub fn new(
        name: impl Into<String>,
        resources: Vec<Resource>,
        outputs: Vec<StackOutput>,
    ) -> Result<Self, StackError> {
        let graph = DependencyGraph::from_resources(&resources)?;
        for output in &outputs {
            let StackOutput::StageUrl { api, stage, .. } = output;
            for referenced in [api, stage] {
                if !graph.contains(referenced) {
                    return Err(StackError::DanglingOutput {
                        output: output.name().to_string(),
                        resource: referenced.clone(),
                    });
                }
            }
        }
        Ok(Self {
            name: name.into(),
            resources,
            graph,
            outputs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn outputs(&self) -> &[StackOutput] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in creation order
    pub fn apply_order(&self) -> Vec<&Resource> {
        self.ordered(self.graph.apply_order())
    }

    /// Resources in teardown order
    pub fn destroy_order(&self) -> Vec<&Resource> {
        self.ordered(self.graph.destroy_order())
    }

    fn ordered(&self, ids: Vec<ResourceId>) -> Vec<&Resource> {
        ids.iter().filter_map(|id| self.resource(id)).collect()
    }

    /// The function package, when the stack has a function
    pub fn code_asset(&self) -> Option<&CodeAsset> {
        self.resources.iter().find_map(|r| match &r.kind {
            ResourceKind::Function(f) => Some(&f.code),
            _ => None,
        })
    }
}

/// Builder for the connection pooling topology
#[derive(Debug)]
pub struct ConnectionPoolingStack<'a> {
    config: &'a StackConfig,
    code: CodeAsset,
    credentials: Credentials,
}

impl<'a> ConnectionPoolingStack<'a> {
    pub fn new(config: &'a StackConfig, code: CodeAsset) -> Self {
        Self {
            config,
            code,
            credentials: Credentials::Generated {
                username: config.database.username.clone(),
            },
        }
    }

    /// Replace the generated credential with an explicit source
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn build(self) -> Result<Stack, StackError> {
        let config = self.config;
        let span = info_span!("stack.build", stack = %config.stack_name);
        let _guard = span.enter();

        let network = plan_network(&config.network)?;
        let vpc = network.vpc_id().clone();
        let isolated = network.require_subnets(SubnetType::Isolated)?;
        let private = network.require_subnets(SubnetType::Private)?;

        // Database and credential
        let database = DatabaseInstance::builder(ResourceId::fixed("Database"))
            .engine(DatabaseEngine::mysql(&config.database.engine_version))
            .instance_type(InstanceType::of(
                &config.database.instance_class,
                &config.database.instance_size,
            ))
            .port(config.database.port)
            .allocated_storage(config.database.allocated_storage_gib)
            .subnets(
                vpc.clone(),
                isolated,
                &config.database.subnet_group_description,
            )
            .credentials(self.credentials)
            .secret_name(
                config
                    .database
                    .secret_name
                    .clone()
                    .unwrap_or_else(|| format!("{}/database/credentials", config.stack_name)),
            )
            .removal_policy(config.database.removal_policy)
            .build()?;

        let database_id = database.instance.id.clone();
        let secret = database
            .secret()
            .cloned()
            .ok_or_else(|| StackError::MissingDatabaseSecret(database_id.clone()))?;
        let db_port = database.port();
        let db_security_group = database.security_group.id.clone();

        let mut resources = network.into_resources();
        resources.extend(database.into_resources());

        // Access control
        let app_sg = ResourceId::fixed("AppSecurityGroup");
        let proxy_sg = ResourceId::fixed("ProxySecurityGroup");
        let mut app_group = SecurityGroup::new(vpc.clone(), "Database-ping function");
        app_group.allow_all_outbound = !config.function.restrict_application_egress;
        resources.push(Resource::new(
            app_sg.clone(),
            ResourceKind::SecurityGroup(app_group),
        ));
        resources.push(Resource::new(
            proxy_sg.clone(),
            ResourceKind::SecurityGroup(SecurityGroup::new(vpc.clone(), "Database proxy")),
        ));
        resources.push(Resource::new(
            ResourceId::fixed("ProxySecurityGroupIngressFromApp"),
            ResourceKind::SecurityGroupRule(SecurityGroupRule::ingress(
                proxy_sg.clone(),
                Peer::SecurityGroup(app_sg.clone()),
                Port::tcp(db_port),
                "Allows the app to access to the database",
            )),
        ));
        resources.push(Resource::new(
            ResourceId::fixed("DatabaseSecurityGroupIngressFromProxy"),
            ResourceKind::SecurityGroupRule(SecurityGroupRule::ingress(
                db_security_group,
                Peer::SecurityGroup(proxy_sg.clone()),
                Port::tcp(db_port),
                "Allows the proxy to reach the database",
            )),
        ));
        if config.function.restrict_application_egress {
            resources.push(Resource::new(
                ResourceId::fixed("AppSecurityGroupEgressToProxy"),
                ResourceKind::SecurityGroupRule(SecurityGroupRule::egress(
                    app_sg.clone(),
                    Peer::SecurityGroup(proxy_sg.clone()),
                    Port::tcp(db_port),
                    "Database traffic to the proxy",
                )),
            ));
            resources.push(Resource::new(
                ResourceId::fixed("AppSecurityGroupEgressHttps"),
                ResourceKind::SecurityGroupRule(SecurityGroupRule::egress(
                    app_sg.clone(),
                    Peer::Cidr(Ipv4Cidr::ANY),
                    Port::tcp(443),
                    "Secrets Manager API",
                )),
            ));
        }

        // Proxy
        let proxy_role = ResourceId::fixed("DatabaseProxyRole");
        resources.push(Resource::new(
            proxy_role.clone(),
            ResourceKind::IamRole(
                IamRole::for_service("rds.amazonaws.com")
                    .with_statement(PolicyStatement::read_secret(&secret)),
            ),
        ));
        let proxy = ResourceId::fixed("DatabaseProxy");
        resources.push(Resource::new(
            proxy.clone(),
            ResourceKind::DatabaseProxy(DatabaseProxy {
                name: proxy_name(&config.stack_name),
                engine_family: DatabaseEngine::mysql(&config.database.engine_version)
                    .proxy_family()
                    .to_string(),
                target: database_id,
                secrets: vec![secret.clone()],
                role: proxy_role,
                subnets: private.clone(),
                security_groups: vec![proxy_sg],
                idle_client_timeout: config.proxy.idle_client_timeout(),
                require_tls: config.proxy.require_tls,
                debug_logging: config.proxy.debug_logging,
            }),
        ));

        // Function
        let function_role = ResourceId::fixed("AppFunctionServiceRole");
        resources.push(Resource::new(
            function_role.clone(),
            ResourceKind::IamRole(
                IamRole::for_service("lambda.amazonaws.com")
                    .with_managed_policy("service-role/AWSLambdaVPCAccessExecutionRole")
                    .with_managed_policy("AWSXRayDaemonWriteAccess")
                    .with_statement(PolicyStatement::read_secret(&secret))
                    .with_statement(PolicyStatement::connect_proxy(&proxy)),
            ),
        ));

        let environment = FunctionEnvironment::builder()
            .secret_name(&secret)
            .proxy_endpoint(&proxy)
            .literal("AWS_LWA_PORT", crate::constants::DEFAULT_FUNCTION_PORT.to_string())
            .literal("AWS_LWA_READINESS_CHECK_PATH", "/healthz")
            .literal("RUST_LOG", "connection_pooling=info")
            .build();

        let function = ResourceId::fixed("AppFunction");
        let version = ResourceId::new(format!("AppFunctionCurrentVersion{}", self.code.short_hash()))?;
        let alias = ResourceId::new(format!(
            "AppFunctionAlias{}",
            pascal_case(&config.function.alias_name)
        ))?;
        let code_hash = self.code.sha256.clone();
        resources.push(Resource::new(
            function.clone(),
            ResourceKind::Function(Function {
                code: self.code,
                runtime: config.function.runtime.clone(),
                handler: config.function.handler.clone(),
                memory_mib: config.function.memory_mib,
                timeout: config.function.timeout(),
                role: function_role,
                subnets: private,
                security_groups: vec![app_sg],
                environment,
                reserved_concurrency: Some(RESERVED_CONCURRENCY),
                tracing: TracingMode::Active,
                layers: config.function.layers.clone(),
            }),
        ));
        resources.push(Resource::new(
            version.clone(),
            ResourceKind::FunctionVersion(FunctionVersion {
                function: function.clone(),
                description: Some(format!("code sha256 {code_hash}")),
            }),
        ));
        resources.push(Resource::new(
            alias.clone(),
            ResourceKind::FunctionAlias(FunctionAlias {
                function: function.clone(),
                version,
                name: config.function.alias_name.clone(),
                provisioned_concurrency: Some(PROVISIONED_CONCURRENCY),
            }),
        ));
        resources.push(Resource::new(
            ResourceId::fixed("HandlerLogGroup"),
            ResourceKind::LogGroup(LogGroup {
                function,
                retention_days: config.function.log_retention_days,
            }),
        ));

        // Gateway
        let api = ResourceId::fixed("AppRestApi");
        let method = ResourceId::fixed("AppRestApiGet");
        let stage = ResourceId::new(format!(
            "AppRestApiDeploymentStage{}",
            pascal_case(&config.gateway.stage_name)
        ))?;
        resources.push(Resource::new(
            api.clone(),
            ResourceKind::RestApi(RestApi {
                name: config.api_name().to_string(),
                description: Some("Database ping through the connection proxy".to_string()),
                cloud_watch_role: config.gateway.cloud_watch_role,
            }),
        ));
        resources.push(Resource::new(
            method.clone(),
            ResourceKind::GatewayMethod(GatewayMethod {
                api: api.clone(),
                http_method: HttpMethod::Get,
                path: "/".to_string(),
                integration: Integration::LambdaProxy {
                    target: alias.clone(),
                },
                unauthenticated: true,
            }),
        ));
        resources.push(Resource::new(
            ResourceId::fixed("AppRestApiGetPermission"),
            ResourceKind::InvokePermission(InvokePermission {
                function: alias,
                api: api.clone(),
                http_method: HttpMethod::Get,
                path: "/".to_string(),
            }),
        ));
        resources.push(Resource::new(
            stage.clone(),
            ResourceKind::GatewayStage(GatewayStage {
                api: api.clone(),
                stage_name: config.gateway.stage_name.clone(),
                methods: vec![method],
                data_trace_enabled: config.gateway.data_trace_enabled,
            }),
        ));

        let outputs = vec![StackOutput::StageUrl {
            name: "ApiEndpoint".to_string(),
            api,
            stage,
            stage_name: config.gateway.stage_name.clone(),
        }];

        for resource in &resources {
            debug!(resource = %resource.id, kind = resource.kind_name(), "declared resource");
        }
        let stack = Stack::new(config.stack_name.clone(), resources, outputs)?;
        info!(resources = stack.len(), "Stack built");
        Ok(stack)
    }
}

/// Proxy names: lowercase letters, digits and single hyphens, at most 63 chars
fn proxy_name(stack_name: &str) -> String {
    let mut base = String::with_capacity(stack_name.len());
    for c in stack_name.chars() {
        let c = if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if !(c == '-' && (base.is_empty() || base.ends_with('-'))) {
            base.push(c);
        }
    }
    base.truncate(57);
    let base = base.trim_end_matches('-');
    if base.is_empty() {
        "proxy".to_string()
    } else {
        format!("{base}-proxy")
    }
}
