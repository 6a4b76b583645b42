//! # Topology Validation
//!
//! Checks a built [`Stack`] against the properties the deployment relies on.
//! Every check runs; the report lists each one with its outcome so a caller
//! can print the full picture rather than stopping at the first failure.

use crate::constants::{
    ALLOWED_LOG_RETENTION_DAYS, PROVISIONED_CONCURRENCY, RESERVED_CONCURRENCY,
};
use crate::stack::Stack;
use crate::topology::{
    Attribute, DatabaseProxy, Direction, EnvValue, Function, Peer, RemovalPolicy, Resource,
    ResourceId, ResourceKind, RouteTarget, SubnetType,
};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    fn record(&mut self, name: &'static str, outcome: Result<String, String>) {
        let (passed, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(detail) => {
                warn!(check = name, detail = %detail, "Topology check failed");
                (false, detail)
            }
        };
        self.checks.push(CheckResult {
            name,
            passed,
            detail,
        });
    }

    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let mark = if check.passed { "ok" } else { "FAIL" };
            writeln!(f, "[{mark:>4}] {}: {}", check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Run every topology check against `stack`
pub fn validate_stack(stack: &Stack) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.record("non-empty", non_empty(stack));
    report.record("subnet-routing", subnet_routing(stack));
    report.record("proxy-ingress", proxy_ingress(stack));
    report.record("credentials-by-reference", credentials_by_reference(stack));
    report.record("concurrency-limits", concurrency_limits(stack));
    report.record("gateway-targets-alias", gateway_targets_alias(stack));
    report.record("database-isolated", database_isolated(stack));
    report.record("proxy-private", proxy_private(stack));
    report.record("log-retention", log_retention(stack));
    report
}

type Outcome = Result<String, String>;

fn functions(stack: &Stack) -> impl Iterator<Item = (&Resource, &Function)> {
    stack.resources().iter().filter_map(|r| match &r.kind {
        ResourceKind::Function(f) => Some((r, f)),
        _ => None,
    })
}

fn proxies(stack: &Stack) -> impl Iterator<Item = (&Resource, &DatabaseProxy)> {
    stack.resources().iter().filter_map(|r| match &r.kind {
        ResourceKind::DatabaseProxy(p) => Some((r, p)),
        _ => None,
    })
}

fn subnet_type(stack: &Stack, id: &ResourceId) -> Option<SubnetType> {
    match stack.resource(id).map(|r| &r.kind) {
        Some(ResourceKind::Subnet(s)) => Some(s.subnet_type),
        _ => None,
    }
}

fn non_empty(stack: &Stack) -> Outcome {
    if stack.is_empty() {
        Err("stack declares no resources".to_string())
    } else {
        Ok(format!("{} resources", stack.len()))
    }
}

/// Only public subnets reach the internet gateway, private subnets egress through
/// a NAT gateway and isolated subnets route nowhere
fn subnet_routing(stack: &Stack) -> Outcome {
    let mut checked = 0;
    for resource in stack.resources() {
        let ResourceKind::Subnet(subnet) = &resource.kind else {
            continue;
        };
        checked += 1;
        let igw_routes = subnet.internet_gateway_routes().count();
        match subnet.subnet_type {
            SubnetType::Isolated if !subnet.routes.is_empty() => {
                return Err(format!(
                    "isolated subnet {} has {} route(s)",
                    resource.id,
                    subnet.routes.len()
                ));
            }
            SubnetType::Private if igw_routes > 0 => {
                return Err(format!(
                    "private subnet {} routes to the internet gateway",
                    resource.id
                ));
            }
            SubnetType::Private
                if !subnet
                    .routes
                    .iter()
                    .any(|r| matches!(r.target, RouteTarget::NatGateway(_))) =>
            {
                return Err(format!(
                    "private subnet {} has no route through a NAT gateway",
                    resource.id
                ));
            }
            _ => {}
        }
    }
    Ok(format!("{checked} subnets checked"))
}

/// Each proxy admits exactly one ingress: the database port from the application group
fn proxy_ingress(stack: &Stack) -> Outcome {
    let app_groups: HashSet<&ResourceId> = functions(stack)
        .flat_map(|(_, f)| f.security_groups.iter())
        .collect();

    let mut admitted = Vec::new();
    for (proxy_resource, proxy) in proxies(stack) {
        let port = match stack.resource(&proxy.target).map(|r| &r.kind) {
            Some(ResourceKind::DatabaseInstance(db)) => db.port,
            _ => {
                return Err(format!(
                    "proxy {} does not target a database instance",
                    proxy_resource.id
                ))
            }
        };

        let ingress: Vec<_> = stack
            .resources()
            .iter()
            .filter_map(|r| match &r.kind {
                ResourceKind::SecurityGroupRule(rule)
                    if rule.direction == Direction::Ingress
                        && proxy.security_groups.contains(&rule.group) =>
                {
                    Some(rule)
                }
                _ => None,
            })
            .collect();

        let [rule] = ingress.as_slice() else {
            return Err(format!(
                "proxy {} security groups have {} ingress rules, expected exactly 1",
                proxy_resource.id,
                ingress.len()
            ));
        };
        let Peer::SecurityGroup(source) = &rule.rule.peer else {
            return Err(format!(
                "proxy {} ingress is sourced from a CIDR, not the application group",
                proxy_resource.id
            ));
        };
        if !app_groups.contains(source) {
            return Err(format!(
                "proxy {} ingress source {source} is not the application security group",
                proxy_resource.id
            ));
        }
        if !rule.rule.port.is_tcp(port) {
            return Err(format!(
                "proxy {} ingress allows {}, expected tcp {port}",
                proxy_resource.id, rule.rule.port
            ));
        }
        admitted.push(format!("{}: tcp {port} from {source}", proxy_resource.id));
    }

    if admitted.is_empty() {
        return Err("stack has no database proxy".to_string());
    }
    Ok(admitted.join(", "))
}

/// The function sees names and endpoints, never credential values
fn credentials_by_reference(stack: &Stack) -> Outcome {
    for (resource, function) in functions(stack) {
        for (key, value) in function.environment.iter() {
            match value {
                EnvValue::Literal(_) => {
                    let upper = key.to_uppercase();
                    if upper.contains("PASSWORD") || upper.contains("SECRET") {
                        return Err(format!(
                            "{}: {key} is a literal credential value",
                            resource.id
                        ));
                    }
                }
                EnvValue::Attribute {
                    resource: target,
                    attribute,
                } => {
                    let is_secret = matches!(
                        stack.resource(target).map(|r| &r.kind),
                        Some(ResourceKind::Secret(_))
                    );
                    let allowed = matches!(attribute, Attribute::Name | Attribute::Arn);
                    if matches!(attribute, Attribute::SecretValue(_)) || (is_secret && !allowed) {
                        return Err(format!(
                            "{}: {key} embeds {target}.{attribute}",
                            resource.id
                        ));
                    }
                }
            }
        }
    }
    Ok("environment carries references only".to_string())
}

fn concurrency_limits(stack: &Stack) -> Outcome {
    let mut functions_seen = 0;
    for (resource, function) in functions(stack) {
        functions_seen += 1;
        if function.reserved_concurrency != Some(RESERVED_CONCURRENCY) {
            return Err(format!(
                "{} reserved concurrency is {:?}, expected {RESERVED_CONCURRENCY}",
                resource.id, function.reserved_concurrency
            ));
        }
    }
    let mut aliases_seen = 0;
    for resource in stack.resources() {
        if let ResourceKind::FunctionAlias(alias) = &resource.kind {
            aliases_seen += 1;
            if alias.provisioned_concurrency != Some(PROVISIONED_CONCURRENCY) {
                return Err(format!(
                    "{} provisioned concurrency is {:?}, expected {PROVISIONED_CONCURRENCY}",
                    resource.id, alias.provisioned_concurrency
                ));
            }
        }
    }
    if functions_seen == 0 || aliases_seen == 0 {
        return Err("stack has no function alias".to_string());
    }
    Ok(format!(
        "reserved {RESERVED_CONCURRENCY}, provisioned {PROVISIONED_CONCURRENCY}"
    ))
}

/// Methods and permissions must point at the alias, never the unqualified function
fn gateway_targets_alias(stack: &Stack) -> Outcome {
    let is_alias = |id: &ResourceId| {
        matches!(
            stack.resource(id).map(|r| &r.kind),
            Some(ResourceKind::FunctionAlias(_))
        )
    };
    let mut methods = 0;
    for resource in stack.resources() {
        match &resource.kind {
            ResourceKind::GatewayMethod(method) => {
                methods += 1;
                let target = method.integration.target();
                if !is_alias(target) {
                    return Err(format!(
                        "{} {} {} integrates with {target}, not an alias",
                        resource.id, method.http_method, method.path
                    ));
                }
            }
            ResourceKind::InvokePermission(permission) if !is_alias(&permission.function) => {
                return Err(format!(
                    "{} grants invoke on {}, not an alias",
                    resource.id, permission.function
                ));
            }
            _ => {}
        }
    }
    if methods == 0 {
        return Err("gateway has no methods".to_string());
    }
    Ok(format!("{methods} method(s) on the alias"))
}

fn database_isolated(stack: &Stack) -> Outcome {
    for resource in stack.resources() {
        if let ResourceKind::DbSubnetGroup(group) = &resource.kind {
            if let Some(subnet) = group
                .subnets
                .iter()
                .find(|s| subnet_type(stack, s) != Some(SubnetType::Isolated))
            {
                return Err(format!(
                    "{} includes non-isolated subnet {subnet}",
                    resource.id
                ));
            }
        }
    }
    Ok("database subnets are isolated".to_string())
}

fn proxy_private(stack: &Stack) -> Outcome {
    for (resource, proxy) in proxies(stack) {
        if let Some(subnet) = proxy
            .subnets
            .iter()
            .find(|s| subnet_type(stack, s) != Some(SubnetType::Private))
        {
            return Err(format!("{} is placed in {subnet}", resource.id));
        }
    }
    Ok("proxy subnets are private".to_string())
}

fn log_retention(stack: &Stack) -> Outcome {
    for resource in stack.resources() {
        if let ResourceKind::LogGroup(group) = &resource.kind {
            if !ALLOWED_LOG_RETENTION_DAYS.contains(&group.retention_days) {
                return Err(format!(
                    "{} retention {} days is not supported",
                    resource.id, group.retention_days
                ));
            }
            if resource.removal_policy != RemovalPolicy::Destroy {
                return Err(format!(
                    "{} must be destroyed with the function",
                    resource.id
                ));
            }
        }
    }
    Ok("log groups expire and are destroyed with the stack".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::CodeAsset;
    use crate::config::StackConfig;
    use crate::stack::ConnectionPoolingStack;
    use crate::topology::{Port, SecurityGroupRule};

    fn default_stack() -> Stack {
        let config = StackConfig::default();
        ConnectionPoolingStack::new(&config, CodeAsset::from_bytes("bootstrap.zip", b"code"))
            .build()
            .unwrap()
    }

    fn rebuild(stack: &Stack, edit: impl Fn(&mut Resource)) -> Stack {
        let mut resources = stack.resources().to_vec();
        resources.iter_mut().for_each(edit);
        Stack::new(stack.name(), resources, stack.outputs().to_vec()).unwrap()
    }

    fn with_extra(stack: &Stack, extra: Resource) -> Stack {
        let mut resources = stack.resources().to_vec();
        resources.push(extra);
        Stack::new(stack.name(), resources, stack.outputs().to_vec()).unwrap()
    }

    fn edit_proxy_ingress(stack: &Stack, edit: impl Fn(&mut SecurityGroupRule)) -> Stack {
        rebuild(stack, |r| {
            if r.id.as_str() == "ProxySecurityGroupIngressFromApp" {
                if let ResourceKind::SecurityGroupRule(rule) = &mut r.kind {
                    edit(rule);
                }
            }
        })
    }

    fn failed(report: &ValidationReport, check: &str) -> String {
        let result = report.check(check).unwrap();
        assert!(!result.passed, "{check} should fail:\n{report}");
        assert_eq!(report.failures().count(), 1, "only {check} should fail:\n{report}");
        result.detail.clone()
    }

    #[test]
    fn test_default_stack_passes_every_check() {
        let report = validate_stack(&default_stack());
        assert!(report.is_ok(), "{report}");
        assert_eq!(report.checks.len(), 9);
    }

    #[test]
    fn test_empty_stack_fails() {
        let report = validate_stack(&Stack::new("Empty", vec![], vec![]).unwrap());
        assert!(!report.check("non-empty").unwrap().passed);
    }

    #[test]
    fn test_isolated_subnet_with_nat_route_detected() {
        let stack = default_stack();
        let nat_route = match &stack.resource(&ResourceId::fixed("VpcAppSubnet1")).unwrap().kind {
            ResourceKind::Subnet(subnet) => subnet.routes[0].clone(),
            other => panic!("expected a subnet, got {other:?}"),
        };
        assert!(matches!(nat_route.target, RouteTarget::NatGateway(_)));

        let stack = rebuild(&stack, |r| {
            if r.id.as_str() == "VpcDatabaseSubnet1" {
                if let ResourceKind::Subnet(subnet) = &mut r.kind {
                    subnet.routes.push(nat_route.clone());
                }
            }
        });
        let detail = failed(&validate_stack(&stack), "subnet-routing");
        assert!(detail.contains("VpcDatabaseSubnet1"), "{detail}");
    }

    #[test]
    fn test_private_subnet_without_nat_route_detected() {
        let stack = rebuild(&default_stack(), |r| {
            if r.id.as_str() == "VpcAppSubnet2" {
                if let ResourceKind::Subnet(subnet) = &mut r.kind {
                    subnet.routes.clear();
                }
            }
        });
        let detail = failed(&validate_stack(&stack), "subnet-routing");
        assert!(detail.contains("VpcAppSubnet2"), "{detail}");
    }

    #[test]
    fn test_second_proxy_ingress_rule_detected() {
        let extra = Resource::new(
            ResourceId::fixed("ProxySecurityGroupIngressHttps"),
            ResourceKind::SecurityGroupRule(SecurityGroupRule::ingress(
                ResourceId::fixed("ProxySecurityGroup"),
                Peer::SecurityGroup(ResourceId::fixed("AppSecurityGroup")),
                Port::tcp(443),
                "https from the function",
            )),
        );
        let stack = with_extra(&default_stack(), extra);
        let detail = failed(&validate_stack(&stack), "proxy-ingress");
        assert!(detail.contains("2 ingress rules"), "{detail}");
    }

    #[test]
    fn test_proxy_ingress_on_wrong_port_detected() {
        let stack = edit_proxy_ingress(&default_stack(), |rule| rule.rule.port = Port::tcp(5432));
        let detail = failed(&validate_stack(&stack), "proxy-ingress");
        assert!(detail.contains("tcp 5432"), "{detail}");
    }

    #[test]
    fn test_proxy_ingress_from_wrong_group_detected() {
        let stack = edit_proxy_ingress(&default_stack(), |rule| {
            rule.rule.peer = Peer::SecurityGroup(ResourceId::fixed("DatabaseSecurityGroup"));
        });
        let detail = failed(&validate_stack(&stack), "proxy-ingress");
        assert!(detail.contains("DatabaseSecurityGroup"), "{detail}");
    }

    #[test]
    fn test_every_proxy_is_checked() {
        let stack = default_stack();
        let proxy = stack.resource(&ResourceId::fixed("DatabaseProxy")).unwrap();
        let ResourceKind::DatabaseProxy(mut second) = proxy.kind.clone() else {
            panic!("expected a proxy");
        };
        second.security_groups = vec![ResourceId::fixed("AppSecurityGroup")];
        let extra = Resource::new(
            ResourceId::fixed("ReportingProxy"),
            ResourceKind::DatabaseProxy(second),
        );

        let stack = with_extra(&stack, extra);
        let detail = failed(&validate_stack(&stack), "proxy-ingress");
        assert!(detail.contains("ReportingProxy"), "{detail}");
    }

    #[test]
    fn test_reserved_concurrency_drift_detected() {
        let stack = rebuild(&default_stack(), |r| {
            if let ResourceKind::Function(f) = &mut r.kind {
                f.reserved_concurrency = Some(10);
            }
        });
        let report = validate_stack(&stack);
        assert!(!report.check("concurrency-limits").unwrap().passed);
    }

    #[test]
    fn test_literal_password_detected() {
        let stack = rebuild(&default_stack(), |r| {
            if let ResourceKind::Function(f) = &mut r.kind {
                f.environment = crate::topology::FunctionEnvironment::builder()
                    .literal("DB_PASSWORD", "hunter2")
                    .build();
            }
        });
        let report = validate_stack(&stack);
        assert!(!report.check("credentials-by-reference").unwrap().passed);
    }

    #[test]
    fn test_method_on_function_detected() {
        let stack = rebuild(&default_stack(), |r| {
            if let ResourceKind::GatewayMethod(m) = &mut r.kind {
                m.integration = crate::topology::Integration::LambdaProxy {
                    target: ResourceId::fixed("AppFunction"),
                };
            }
        });
        let report = validate_stack(&stack);
        assert!(!report.check("gateway-targets-alias").unwrap().passed);
    }
}
