//! Per-descriptor rendering.

use super::intrinsics::{
    account_id, get_att, join, partition, reference, region, resolve_secret_field, sub,
};
use super::{CfnResource, SynthError, ASSET_BUCKET_PARAMETER};
use crate::stack::Stack;
use crate::topology::{
    Attribute, DatabaseInstance, DatabaseProxy, DatabaseSecret, Direction, EnvValue,
    Function, GatewayMethod, GatewayStage, IamRole, Integration, InvokePermission, Peer,
    PolicyResource, Protocol, Resource, ResourceId, ResourceKind, RestApi, RouteTarget,
    SecurityGroup, SecurityGroupRule, Subnet, TracingMode,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub(super) struct Rendered {
    pub primary: CfnResource,
    pub helpers: Vec<(String, CfnResource)>,
    pub parameters: Vec<(String, Value)>,
}

impl Rendered {
    fn single(primary: CfnResource) -> Self {
        Self {
            primary,
            helpers: Vec::new(),
            parameters: Vec::new(),
        }
    }
}

fn helper_id(id: &ResourceId, suffix: &str) -> String {
    format!("{id}{suffix}")
}

pub(super) struct Renderer<'a> {
    stack: &'a Stack,
    /// secret -> database instance it is attached to
    attachments: HashMap<&'a ResourceId, &'a ResourceId>,
}

impl<'a> Renderer<'a> {
    pub fn new(stack: &'a Stack) -> Self {
        let attachments = stack
            .resources()
            .iter()
            .filter_map(|r| match &r.kind {
                ResourceKind::DatabaseInstance(db) => db.secret.as_ref().map(|s| (s, &r.id)),
                _ => None,
            })
            .collect();
        Self { stack, attachments }
    }

    fn lookup(&self, id: &ResourceId) -> Result<&'a Resource, SynthError> {
        self.stack
            .resource(id)
            .ok_or_else(|| SynthError::UnknownResource(id.clone()))
    }

    /// Logical id to reference for a secret's ARN: the attachment once the
    /// secret is bound to an instance, so host and port are filled in
    fn secret_ref(&self, secret: &ResourceId) -> String {
        if self.attachments.contains_key(secret) {
            helper_id(secret, "Attachment")
        } else {
            secret.to_string()
        }
    }

    /// Value of `attribute` of resource `id`
    pub fn attribute(&self, id: &ResourceId, attribute: &Attribute) -> Result<Value, SynthError> {
        let resource = self.lookup(id)?;
        let logical = id.as_str();
        let unsupported = || SynthError::UnsupportedAttribute {
            resource: id.clone(),
            kind: resource.kind_name(),
            attribute: attribute.clone(),
        };
        let value = match (&resource.kind, attribute) {
            (ResourceKind::Secret(secret), Attribute::Name) => Value::from(secret.name.clone()),
            (ResourceKind::Secret(_), Attribute::Arn | Attribute::Ref) => {
                reference(&self.secret_ref(id))
            }
            (ResourceKind::Secret(_), Attribute::SecretValue(key)) => {
                resolve_secret_field(&self.secret_ref(id), key)
            }
            (ResourceKind::DatabaseProxy(_), Attribute::Endpoint) => get_att(logical, "Endpoint"),
            (ResourceKind::DatabaseProxy(_), Attribute::Arn) => get_att(logical, "DBProxyArn"),
            (ResourceKind::DatabaseProxy(_), Attribute::Name | Attribute::Ref) => reference(logical),
            (ResourceKind::DatabaseInstance(_), Attribute::Endpoint) => {
                get_att(logical, "Endpoint.Address")
            }
            (ResourceKind::Function(_), Attribute::Arn) => get_att(logical, "Arn"),
            (ResourceKind::Function(_), Attribute::Name | Attribute::Ref) => reference(logical),
            (ResourceKind::FunctionVersion(_), Attribute::Version) => get_att(logical, "Version"),
            (ResourceKind::FunctionAlias(_), Attribute::Arn | Attribute::Ref) => reference(logical),
            (ResourceKind::IamRole(_), Attribute::Arn) => get_att(logical, "Arn"),
            (ResourceKind::RestApi(_), Attribute::RootResourceId) => {
                get_att(logical, "RootResourceId")
            }
            (ResourceKind::SecurityGroup(_), Attribute::Ref) => get_att(logical, "GroupId"),
            (ResourceKind::LogGroup(_), Attribute::Arn) => get_att(logical, "Arn"),
            (_, Attribute::Ref) => reference(logical),
            _ => return Err(unsupported()),
        };
        Ok(value)
    }

    fn refs(&self, ids: &[ResourceId]) -> Value {
        Value::Array(ids.iter().map(|id| reference(id.as_str())).collect())
    }

    fn group_ids(&self, ids: &[ResourceId]) -> Value {
        Value::Array(ids.iter().map(|id| get_att(id.as_str(), "GroupId")).collect())
    }

    pub fn render(&self, resource: &Resource) -> Result<Rendered, SynthError> {
        let id = &resource.id;
        let rendered = match &resource.kind {
            ResourceKind::Vpc(vpc) => Rendered::single(CfnResource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": vpc.cidr.to_string(),
                    "EnableDnsHostnames": vpc.enable_dns_hostnames,
                    "EnableDnsSupport": vpc.enable_dns_support,
                    "InstanceTenancy": "default",
                    "Tags": [{ "Key": "Name", "Value": format!("{}/{id}", self.stack.name()) }],
                }),
            )),
            ResourceKind::InternetGateway(igw) => Rendered {
                primary: CfnResource::new("AWS::EC2::InternetGateway", json!({})),
                helpers: vec![(
                    helper_id(id, "Attachment"),
                    CfnResource::new(
                        "AWS::EC2::VPCGatewayAttachment",
                        json!({
                            "VpcId": reference(igw.vpc.as_str()),
                            "InternetGatewayId": reference(id.as_str()),
                        }),
                    ),
                )],
                parameters: Vec::new(),
            },
            ResourceKind::Subnet(subnet) => self.subnet(id, subnet),
            ResourceKind::NatGateway(nat) => {
                let eip = helper_id(id, "Eip");
                Rendered {
                    primary: CfnResource::new(
                        "AWS::EC2::NatGateway",
                        json!({
                            "SubnetId": reference(nat.subnet.as_str()),
                            "AllocationId": get_att(&eip, "AllocationId"),
                        }),
                    )
                    .depends_on([helper_id(&nat.internet_gateway, "Attachment")]),
                    helpers: vec![(eip, CfnResource::new("AWS::EC2::EIP", json!({ "Domain": "vpc" })))],
                    parameters: Vec::new(),
                }
            }
            ResourceKind::Secret(secret) => self.secret(id, secret),
            ResourceKind::DbSubnetGroup(group) => Rendered::single(CfnResource::new(
                "AWS::RDS::DBSubnetGroup",
                json!({
                    "DBSubnetGroupDescription": group.description,
                    "SubnetIds": self.refs(&group.subnets),
                }),
            )),
            ResourceKind::DatabaseInstance(db) => self.database(id, db),
            ResourceKind::SecurityGroup(group) => self.security_group(id, group),
            ResourceKind::SecurityGroupRule(rule) => self.security_group_rule(rule),
            ResourceKind::IamRole(role) => self.role(id, role)?,
            ResourceKind::DatabaseProxy(proxy) => self.proxy(id, proxy),
            ResourceKind::Function(function) => self.function(function)?,
            ResourceKind::FunctionVersion(version) => {
                let mut properties = json!({ "FunctionName": reference(version.function.as_str()) });
                if let Some(description) = &version.description {
                    properties["Description"] = Value::from(description.clone());
                }
                Rendered::single(CfnResource::new("AWS::Lambda::Version", properties))
            }
            ResourceKind::FunctionAlias(alias) => {
                let mut properties = json!({
                    "FunctionName": reference(alias.function.as_str()),
                    "FunctionVersion": self.attribute(&alias.version, &Attribute::Version)?,
                    "Name": alias.name,
                });
                if let Some(provisioned) = alias.provisioned_concurrency {
                    properties["ProvisionedConcurrencyConfig"] =
                        json!({ "ProvisionedConcurrentExecutions": provisioned });
                }
                Rendered::single(CfnResource::new("AWS::Lambda::Alias", properties))
            }
            ResourceKind::LogGroup(group) => Rendered::single(CfnResource::new(
                "AWS::Logs::LogGroup",
                json!({
                    "LogGroupName": join("", vec![
                        Value::from("/aws/lambda/"),
                        reference(group.function.as_str()),
                    ]),
                    "RetentionInDays": group.retention_days,
                }),
            )),
            ResourceKind::RestApi(api) => self.rest_api(id, api),
            ResourceKind::GatewayMethod(method) => self.method(method)?,
            ResourceKind::GatewayStage(stage) => self.stage(id, stage)?,
            ResourceKind::InvokePermission(permission) => self.permission(permission)?,
        };
        Ok(rendered)
    }

    fn subnet(&self, id: &ResourceId, subnet: &Subnet) -> Rendered {
        let route_table = helper_id(id, "RouteTable");
        let mut helpers = vec![
            (
                route_table.clone(),
                CfnResource::new(
                    "AWS::EC2::RouteTable",
                    json!({ "VpcId": reference(subnet.vpc.as_str()) }),
                ),
            ),
            (
                helper_id(id, "RouteTableAssociation"),
                CfnResource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "RouteTableId": reference(&route_table),
                        "SubnetId": reference(id.as_str()),
                    }),
                ),
            ),
        ];
        for (n, route) in subnet.routes.iter().enumerate() {
            let mut properties = json!({
                "RouteTableId": reference(&route_table),
                "DestinationCidrBlock": route.destination.to_string(),
            });
            let route_resource = match &route.target {
                RouteTarget::InternetGateway(igw) => {
                    properties["GatewayId"] = reference(igw.as_str());
                    CfnResource::new("AWS::EC2::Route", properties)
                        .depends_on([helper_id(igw, "Attachment")])
                }
                RouteTarget::NatGateway(nat) => {
                    properties["NatGatewayId"] = reference(nat.as_str());
                    CfnResource::new("AWS::EC2::Route", properties)
                }
            };
            let suffix = if n == 0 {
                "DefaultRoute".to_string()
            } else {
                format!("Route{n}")
            };
            helpers.push((helper_id(id, &suffix), route_resource));
        }

        Rendered {
            primary: CfnResource::new(
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": reference(subnet.vpc.as_str()),
                    "CidrBlock": subnet.cidr.to_string(),
                    "AvailabilityZone": {
                        "Fn::Select": [subnet.az_index, { "Fn::GetAZs": "" }]
                    },
                    "MapPublicIpOnLaunch": subnet.map_public_ip_on_launch,
                    "Tags": [
                        { "Key": "Name", "Value": format!("{}/{id}", self.stack.name()) },
                        { "Key": "subnet-tier", "Value": subnet.tier_name },
                        { "Key": "subnet-type", "Value": subnet_type_tag(subnet) },
                    ],
                }),
            ),
            helpers,
            parameters: Vec::new(),
        }
    }

    fn secret(&self, id: &ResourceId, secret: &DatabaseSecret) -> Rendered {
        let template = json!({ "username": secret.username }).to_string();
        let primary = CfnResource::new(
            "AWS::SecretsManager::Secret",
            json!({
                "Name": secret.name,
                "Description": secret.description,
                "GenerateSecretString": {
                    "SecretStringTemplate": template,
                    "GenerateStringKey": "password",
                    "PasswordLength": secret.password_length,
                    "ExcludeCharacters": secret.exclude_characters,
                },
            }),
        );
        let helpers = match self.attachments.get(id) {
            Some(instance) => vec![(
                helper_id(id, "Attachment"),
                CfnResource::new(
                    "AWS::SecretsManager::SecretTargetAttachment",
                    json!({
                        "SecretId": reference(id.as_str()),
                        "TargetId": reference(instance.as_str()),
                        "TargetType": "AWS::RDS::DBInstance",
                    }),
                ),
            )],
            None => Vec::new(),
        };
        Rendered {
            primary,
            helpers,
            parameters: Vec::new(),
        }
    }

    fn database(&self, id: &ResourceId, db: &DatabaseInstance) -> Rendered {
        let mut parameters = Vec::new();
        let (username, password) = match &db.secret {
            Some(secret) => (
                resolve_secret_field(secret.as_str(), "username"),
                resolve_secret_field(secret.as_str(), "password"),
            ),
            None => {
                let parameter = helper_id(id, "MasterPassword");
                parameters.push((
                    parameter.clone(),
                    json!({
                        "Type": "String",
                        "NoEcho": true,
                        "Description": format!("Master password for {id}"),
                    }),
                ));
                (Value::from(db.master_username.clone()), reference(&parameter))
            }
        };
        Rendered {
            primary: CfnResource::new(
                "AWS::RDS::DBInstance",
                json!({
                    "Engine": db.engine.engine_name(),
                    "EngineVersion": db.engine.version(),
                    "DBInstanceClass": db.instance_type.db_instance_class(),
                    "AllocatedStorage": db.allocated_storage_gib.to_string(),
                    "Port": db.port.to_string(),
                    "DBSubnetGroupName": reference(db.subnet_group.as_str()),
                    "VPCSecurityGroups": self.group_ids(&db.security_groups),
                    "MasterUsername": username,
                    "MasterUserPassword": password,
                    "MultiAZ": db.multi_az,
                    "StorageEncrypted": db.storage_encrypted,
                    "StorageType": "gp2",
                    "PubliclyAccessible": false,
                    "CopyTagsToSnapshot": true,
                }),
            ),
            helpers: Vec::new(),
            parameters,
        }
    }

    fn security_group(&self, id: &ResourceId, group: &SecurityGroup) -> Rendered {
        let egress = if group.allow_all_outbound {
            json!([{
                "CidrIp": "0.0.0.0/0",
                "IpProtocol": "-1",
                "Description": "Allow all outbound traffic by default",
            }])
        } else {
            // Placeholder rule that matches nothing, so the default allow-all is removed
            json!([{
                "CidrIp": "255.255.255.255/32",
                "IpProtocol": "icmp",
                "FromPort": 252,
                "ToPort": 86,
                "Description": "Disallow all traffic",
            }])
        };
        Rendered::single(CfnResource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("{}/{id}: {}", self.stack.name(), group.description),
                "VpcId": reference(group.vpc.as_str()),
                "SecurityGroupEgress": egress,
            }),
        ))
    }

    fn security_group_rule(&self, rule: &SecurityGroupRule) -> Rendered {
        let mut properties = Map::new();
        properties.insert("GroupId".into(), get_att(rule.group.as_str(), "GroupId"));
        properties.insert("IpProtocol".into(), Value::from(rule.rule.port.protocol.ip_protocol()));
        if rule.rule.port.protocol != Protocol::All {
            properties.insert("FromPort".into(), Value::from(rule.rule.port.from));
            properties.insert("ToPort".into(), Value::from(rule.rule.port.to));
        }
        properties.insert("Description".into(), Value::from(rule.rule.description.clone()));
        let (resource_type, peer_key) = match rule.direction {
            Direction::Ingress => ("AWS::EC2::SecurityGroupIngress", "SourceSecurityGroupId"),
            Direction::Egress => ("AWS::EC2::SecurityGroupEgress", "DestinationSecurityGroupId"),
        };
        match &rule.rule.peer {
            Peer::SecurityGroup(peer) => {
                properties.insert(peer_key.into(), get_att(peer.as_str(), "GroupId"));
            }
            Peer::Cidr(cidr) => {
                properties.insert("CidrIp".into(), Value::from(cidr.to_string()));
            }
        }
        Rendered::single(CfnResource::new(resource_type, Value::Object(properties)))
    }

    fn policy_resource(&self, resource: &PolicyResource) -> Result<Value, SynthError> {
        Ok(match resource {
            PolicyResource::Attribute(id, attribute) => self.attribute(id, attribute)?,
            PolicyResource::ProxyDbUser { proxy, user } => join(
                "",
                vec![
                    Value::from("arn:"),
                    partition(),
                    Value::from(":rds-db:"),
                    region(),
                    Value::from(":"),
                    account_id(),
                    Value::from(":dbuser:"),
                    json!({ "Fn::Select": [6, { "Fn::Split": [
                        ":",
                        self.attribute(proxy, &Attribute::Arn)?,
                    ]}]}),
                    Value::from(format!("/{user}")),
                ],
            ),
            PolicyResource::Literal(arn) => Value::from(arn.clone()),
        })
    }

    fn role(&self, id: &ResourceId, role: &IamRole) -> Result<Rendered, SynthError> {
        let mut properties = json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": role.assumed_by },
                    "Action": "sts:AssumeRole",
                }],
            },
        });
        if !role.managed_policies.is_empty() {
            properties["ManagedPolicyArns"] = Value::Array(
                role.managed_policies
                    .iter()
                    .map(|p| {
                        join(
                            "",
                            vec![
                                Value::from("arn:"),
                                partition(),
                                Value::from(format!(":iam::aws:policy/{p}")),
                            ],
                        )
                    })
                    .collect(),
            );
        }
        if !role.statements.is_empty() {
            let statements = role
                .statements
                .iter()
                .map(|s| {
                    let resources = s
                        .resources
                        .iter()
                        .map(|r| self.policy_resource(r))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(json!({
                        "Effect": "Allow",
                        "Action": s.actions,
                        "Resource": resources,
                    }))
                })
                .collect::<Result<Vec<_>, SynthError>>()?;
            properties["Policies"] = json!([{
                "PolicyName": format!("{id}DefaultPolicy"),
                "PolicyDocument": { "Version": "2012-10-17", "Statement": statements },
            }]);
        }
        Ok(Rendered::single(CfnResource::new("AWS::IAM::Role", properties)))
    }

    fn proxy(&self, id: &ResourceId, proxy: &DatabaseProxy) -> Rendered {
        let auth: Vec<Value> = proxy
            .secrets
            .iter()
            .map(|secret| {
                json!({
                    "AuthScheme": "SECRETS",
                    "IAMAuth": "DISABLED",
                    "SecretArn": reference(&self.secret_ref(secret)),
                })
            })
            .collect();
        Rendered {
            primary: CfnResource::new(
                "AWS::RDS::DBProxy",
                json!({
                    "DBProxyName": proxy.name,
                    "EngineFamily": proxy.engine_family,
                    "Auth": auth,
                    "RoleArn": get_att(proxy.role.as_str(), "Arn"),
                    "VpcSubnetIds": self.refs(&proxy.subnets),
                    "VpcSecurityGroupIds": self.group_ids(&proxy.security_groups),
                    "IdleClientTimeout": proxy.idle_client_timeout.as_secs(),
                    "RequireTLS": proxy.require_tls,
                    "DebugLogging": proxy.debug_logging,
                }),
            ),
            helpers: vec![(
                helper_id(id, "ProxyTargetGroup"),
                CfnResource::new(
                    "AWS::RDS::DBProxyTargetGroup",
                    json!({
                        "DBProxyName": reference(id.as_str()),
                        "TargetGroupName": "default",
                        "DBInstanceIdentifiers": [reference(proxy.target.as_str())],
                        "ConnectionPoolConfigurationInfo": {},
                    }),
                ),
            )],
            parameters: Vec::new(),
        }
    }

    fn function(&self, function: &Function) -> Result<Rendered, SynthError> {
        let mut variables = Map::new();
        for (key, value) in function.environment.iter() {
            let value = match value {
                EnvValue::Literal(v) => Value::from(v.clone()),
                EnvValue::Attribute {
                    resource,
                    attribute,
                } => self.attribute(resource, attribute)?,
            };
            variables.insert(key.clone(), value);
        }
        let mut properties = json!({
            "Code": {
                "S3Bucket": reference(ASSET_BUCKET_PARAMETER),
                "S3Key": function.code.s3_key(),
            },
            "Role": get_att(function.role.as_str(), "Arn"),
            "Runtime": function.runtime,
            "Handler": function.handler,
            "MemorySize": function.memory_mib,
            "Timeout": function.timeout.as_secs(),
            "VpcConfig": {
                "SubnetIds": self.refs(&function.subnets),
                "SecurityGroupIds": self.group_ids(&function.security_groups),
            },
            "TracingConfig": {
                "Mode": match function.tracing {
                    TracingMode::Active => "Active",
                    TracingMode::PassThrough => "PassThrough",
                },
            },
        });
        if !variables.is_empty() {
            properties["Environment"] = json!({ "Variables": variables });
        }
        if let Some(reserved) = function.reserved_concurrency {
            properties["ReservedConcurrentExecutions"] = Value::from(reserved);
        }
        if !function.layers.is_empty() {
            properties["Layers"] = Value::Array(function.layers.iter().map(String::as_str).map(sub).collect());
        }
        Ok(Rendered::single(CfnResource::new(
            "AWS::Lambda::Function",
            properties,
        )))
    }

    fn invocation_uri(&self, target: &ResourceId) -> Result<Value, SynthError> {
        Ok(join(
            "",
            vec![
                Value::from("arn:"),
                partition(),
                Value::from(":apigateway:"),
                region(),
                Value::from(":lambda:path/2015-03-31/functions/"),
                self.attribute(target, &Attribute::Arn)?,
                Value::from("/invocations"),
            ],
        ))
    }

    fn rest_api(&self, id: &ResourceId, api: &RestApi) -> Rendered {
        let mut properties = json!({ "Name": api.name });
        if let Some(description) = &api.description {
            properties["Description"] = Value::from(description.clone());
        }
        let mut rendered =
            Rendered::single(CfnResource::new("AWS::ApiGateway::RestApi", properties));
        if !api.cloud_watch_role {
            return rendered;
        }

        let role = helper_id(id, "CloudWatchRole");
        let mut role_resource = CfnResource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": "apigateway.amazonaws.com" },
                        "Action": "sts:AssumeRole",
                    }],
                },
                "ManagedPolicyArns": [join("", vec![
                    Value::from("arn:"),
                    partition(),
                    Value::from(":iam::aws:policy/service-role/AmazonAPIGatewayPushToCloudWatchLogs"),
                ])],
            }),
        );
        // Account-wide setting, kept when the stack is deleted
        role_resource.deletion_policy = Some("Retain");
        role_resource.update_replace_policy = Some("Retain");

        let mut account = CfnResource::new(
            "AWS::ApiGateway::Account",
            json!({ "CloudWatchRoleArn": get_att(&role, "Arn") }),
        )
        .depends_on([id.to_string()]);
        account.deletion_policy = Some("Retain");
        account.update_replace_policy = Some("Retain");

        rendered.helpers.push((role, role_resource));
        rendered.helpers.push((helper_id(id, "Account"), account));
        rendered
    }

    fn method(&self, method: &GatewayMethod) -> Result<Rendered, SynthError> {
        if method.path != "/" {
            return Err(SynthError::UnsupportedPath(method.path.clone()));
        }
        let Integration::LambdaProxy { target } = &method.integration;
        Ok(Rendered::single(CfnResource::new(
            "AWS::ApiGateway::Method",
            json!({
                "RestApiId": reference(method.api.as_str()),
                "ResourceId": self.attribute(&method.api, &Attribute::RootResourceId)?,
                "HttpMethod": method.http_method.to_string(),
                "AuthorizationType": if method.unauthenticated { "NONE" } else { "AWS_IAM" },
                "Integration": {
                    "Type": "AWS_PROXY",
                    "IntegrationHttpMethod": "POST",
                    "Uri": self.invocation_uri(target)?,
                },
            }),
        )))
    }

    fn stage(&self, id: &ResourceId, stage: &GatewayStage) -> Result<Rendered, SynthError> {
        let deployment = helper_id(id, "Deployment");
        let account = match &self.lookup(&stage.api)?.kind {
            ResourceKind::RestApi(api) if api.cloud_watch_role => {
                Some(helper_id(&stage.api, "Account"))
            }
            _ => None,
        };
        Ok(Rendered {
            primary: CfnResource::new(
                "AWS::ApiGateway::Stage",
                json!({
                    "RestApiId": reference(stage.api.as_str()),
                    "DeploymentId": reference(&deployment),
                    "StageName": stage.stage_name,
                    "TracingEnabled": false,
                    "MethodSettings": [{
                        "ResourcePath": "/*",
                        "HttpMethod": "*",
                        "DataTraceEnabled": stage.data_trace_enabled,
                        "LoggingLevel": if stage.data_trace_enabled { "INFO" } else { "OFF" },
                    }],
                }),
            )
            .depends_on(account),
            helpers: vec![(
                deployment,
                CfnResource::new(
                    "AWS::ApiGateway::Deployment",
                    json!({
                        "RestApiId": reference(stage.api.as_str()),
                        "Description": "Automatically created by the RestApi construct",
                    }),
                )
                .depends_on(stage.methods.iter().map(ToString::to_string)),
            )],
            parameters: Vec::new(),
        })
    }

    fn permission(&self, permission: &InvokePermission) -> Result<Rendered, SynthError> {
        let path = permission.path.trim_start_matches('/');
        Ok(Rendered::single(CfnResource::new(
            "AWS::Lambda::Permission",
            json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": self.attribute(&permission.function, &Attribute::Arn)?,
                "Principal": "apigateway.amazonaws.com",
                "SourceArn": join("", vec![
                    Value::from("arn:"),
                    partition(),
                    Value::from(":execute-api:"),
                    region(),
                    Value::from(":"),
                    account_id(),
                    Value::from(":"),
                    reference(permission.api.as_str()),
                    Value::from(format!("/*/{}/{path}", permission.http_method)),
                ]),
            }),
        )))
    }
}

fn subnet_type_tag(subnet: &Subnet) -> &'static str {
    match subnet.subnet_type {
        crate::topology::SubnetType::Public => "Public",
        crate::topology::SubnetType::Private => "Private",
        crate::topology::SubnetType::Isolated => "Isolated",
    }
}
