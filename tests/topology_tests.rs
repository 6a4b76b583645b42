//! Topology tests
//!
//! Builds the default stack and checks the structural properties the
//! deployment depends on: subnet routing, the single proxy ingress, secrets
//! passed by reference, the concurrency policy and the gateway target.

mod common;

use common::{default_stack, id, stack_from};
use connection_pooling::config::StackConfig;
use connection_pooling::prelude::*;
use connection_pooling::topology::{
    Attribute, Direction, EnvValue, Function, FunctionEnvironment, Integration, Peer,
    RemovalPolicy, StackOutput, SubnetType, TracingMode,
};
use std::time::Duration;

fn function(stack: &Stack) -> &Function {
    stack
        .resources()
        .iter()
        .find_map(|r| match &r.kind {
            ResourceKind::Function(f) => Some(f),
            _ => None,
        })
        .expect("stack declares a function")
}

fn position(order: &[&Resource], name: &str) -> usize {
    order
        .iter()
        .position(|r| r.id.as_str() == name)
        .unwrap_or_else(|| panic!("{name} missing from apply order"))
}

#[test]
fn test_default_stack_passes_every_check() {
    let stack = default_stack();
    let report = validate_stack(&stack);
    assert!(report.is_ok(), "default stack should be valid:\n{report}");
    assert!(!stack.is_empty(), "default stack should declare resources");
    for name in [
        "non-empty",
        "subnet-routing",
        "proxy-ingress",
        "credentials-by-reference",
        "concurrency-limits",
        "gateway-targets-alias",
        "log-retention",
    ] {
        assert!(report.check(name).is_some(), "check {name} should run");
    }
}

#[test]
fn test_three_tiers_in_every_zone() {
    let stack = default_stack();
    let subnets: Vec<_> = stack
        .resources()
        .iter()
        .filter_map(|r| match &r.kind {
            ResourceKind::Subnet(s) => Some(s),
            _ => None,
        })
        .collect();

    assert_eq!(subnets.len(), 6, "three tiers across two zones");
    for subnet_type in [SubnetType::Public, SubnetType::Private, SubnetType::Isolated] {
        let zones: Vec<u8> = subnets
            .iter()
            .filter(|s| s.subnet_type == subnet_type)
            .map(|s| s.az_index)
            .collect();
        assert_eq!(zones, vec![0, 1], "{subnet_type:?} tier should cover both zones");
    }

    for subnet in &subnets {
        let igw_routes = subnet.internet_gateway_routes().count();
        match subnet.subnet_type {
            SubnetType::Public => assert_eq!(igw_routes, 1),
            SubnetType::Private => {
                assert_eq!(igw_routes, 0);
                assert_eq!(subnet.routes.len(), 1, "private subnets egress via NAT");
            }
            SubnetType::Isolated => assert!(subnet.routes.is_empty()),
        }
    }

    for (i, a) in subnets.iter().enumerate() {
        for b in &subnets[i + 1..] {
            assert!(!a.cidr.overlaps(&b.cidr), "{} overlaps {}", a.cidr, b.cidr);
        }
    }
}

#[test]
fn test_proxy_admits_only_the_application_group() {
    let stack = default_stack();
    let proxy_sg = id("ProxySecurityGroup");
    let ingress: Vec<_> = stack
        .resources()
        .iter()
        .filter_map(|r| match &r.kind {
            ResourceKind::SecurityGroupRule(rule)
                if rule.group == proxy_sg && rule.direction == Direction::Ingress =>
            {
                Some(rule)
            }
            _ => None,
        })
        .collect();

    assert_eq!(ingress.len(), 1);
    assert_eq!(ingress[0].rule.peer, Peer::SecurityGroup(id("AppSecurityGroup")));
    assert!(ingress[0].rule.port.is_tcp(3306));
}

#[test]
fn test_function_environment_holds_references_only() {
    let stack = default_stack();
    let env = &function(&stack).environment;

    assert_eq!(
        env.get("DB_USER_SECRET_NAME"),
        Some(&EnvValue::Attribute {
            resource: id("DatabaseSecret"),
            attribute: Attribute::Name,
        })
    );
    assert_eq!(
        env.get("DB_HOST"),
        Some(&EnvValue::Attribute {
            resource: id("DatabaseProxy"),
            attribute: Attribute::Endpoint,
        })
    );
    assert!(
        env.iter().all(|(_, v)| !matches!(
            v,
            EnvValue::Attribute {
                attribute: Attribute::SecretValue(_),
                ..
            }
        )),
        "no secret value may reach the environment"
    );
}

#[test]
fn test_secret_value_in_environment_fails_validation() {
    let stack = default_stack();
    let secret = id("DatabaseSecret");
    let resources: Vec<Resource> = stack
        .resources()
        .iter()
        .cloned()
        .map(|mut r| {
            if let ResourceKind::Function(f) = &mut r.kind {
                f.environment = FunctionEnvironment::builder()
                    .secret_name(&secret)
                    .proxy_endpoint(&id("DatabaseProxy"))
                    .attribute("DB_PASSWORD", &secret, Attribute::SecretValue("password".into()))
                    .build();
            }
            r
        })
        .collect();
    let tampered = Stack::new(stack.name(), resources, stack.outputs().to_vec())
        .expect("tampered stack is still a valid graph");

    let report = validate_stack(&tampered);
    assert!(!report.is_ok());
    let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
    assert_eq!(failed, vec!["credentials-by-reference"]);
}

#[test]
fn test_function_runtime_policy() {
    let stack = default_stack();
    let f = function(&stack);
    assert_eq!(f.reserved_concurrency, Some(1));
    assert_eq!(f.timeout, Duration::from_secs(60));
    assert_eq!(f.tracing, TracingMode::Active);

    let alias = stack
        .resources()
        .iter()
        .find_map(|r| match &r.kind {
            ResourceKind::FunctionAlias(a) => Some(a),
            _ => None,
        })
        .expect("stack declares an alias");
    assert_eq!(alias.name, "live");
    assert_eq!(alias.provisioned_concurrency, Some(1));

    let log_group = stack
        .resources()
        .iter()
        .find_map(|r| match &r.kind {
            ResourceKind::LogGroup(g) => Some(g),
            _ => None,
        })
        .expect("stack declares a log group");
    assert_eq!(log_group.retention_days, 7);
}

#[test]
fn test_gateway_invokes_the_alias() {
    let stack = default_stack();
    let method = stack
        .resources()
        .iter()
        .find_map(|r| match &r.kind {
            ResourceKind::GatewayMethod(m) => Some(m),
            _ => None,
        })
        .expect("stack declares a method");

    let Integration::LambdaProxy { target } = &method.integration;
    let target = stack.resource(target).expect("integration target exists");
    assert!(matches!(target.kind, ResourceKind::FunctionAlias(_)));
    assert_eq!(method.path, "/");

    let [StackOutput::StageUrl { name, stage_name, .. }] = stack.outputs() else {
        panic!("expected exactly one output");
    };
    assert_eq!(name, "ApiEndpoint");
    assert_eq!(stage_name, "prod");
}

#[test]
fn test_proxy_idle_timeout_and_placement() {
    let stack = default_stack();
    let proxy = stack
        .resources()
        .iter()
        .find_map(|r| match &r.kind {
            ResourceKind::DatabaseProxy(p) => Some(p),
            _ => None,
        })
        .expect("stack declares a proxy");

    assert_eq!(proxy.idle_client_timeout, Duration::from_secs(60));
    assert!(proxy.require_tls);
    assert_eq!(proxy.secrets, vec![id("DatabaseSecret")]);
    for subnet in &proxy.subnets {
        match stack.resource(subnet).map(|r| &r.kind) {
            Some(ResourceKind::Subnet(s)) => assert_eq!(s.subnet_type, SubnetType::Private),
            other => panic!("proxy subnet {subnet} is {other:?}"),
        }
    }
}

#[test]
fn test_apply_order_respects_dependencies() {
    let stack = default_stack();
    let order = stack.apply_order();
    assert_eq!(order.len(), stack.len());

    for (i, resource) in order.iter().enumerate() {
        for dep in resource.dependencies() {
            let j = position(&order, dep.as_str());
            assert!(j < i, "{} applied before its dependency {dep}", resource.id);
        }
    }

    assert!(position(&order, "DatabaseSecret") < position(&order, "Database"));
    assert!(position(&order, "Database") < position(&order, "DatabaseProxy"));
    assert!(position(&order, "DatabaseProxy") < position(&order, "AppFunction"));
    assert!(position(&order, "AppRestApiGet") > position(&order, "AppFunction"));

    let destroy: Vec<_> = stack.destroy_order().iter().map(|r| r.id.clone()).collect();
    let mut reversed: Vec<_> = order.iter().map(|r| r.id.clone()).collect();
    reversed.reverse();
    assert_eq!(destroy, reversed);
}

#[test]
fn test_database_snapshot_policy_follows_config() {
    let stack = default_stack();
    let database = stack.resource(&id("Database")).expect("database exists");
    assert_eq!(database.removal_policy, RemovalPolicy::Snapshot);

    let mut config = StackConfig::default();
    config.database.removal_policy = RemovalPolicy::Retain;
    let stack = stack_from(&config);
    let database = stack.resource(&id("Database")).expect("database exists");
    assert_eq!(database.removal_policy, RemovalPolicy::Retain);
}

#[test]
fn test_restricted_egress_adds_explicit_rules() {
    let mut config = StackConfig::default();
    config.function.restrict_application_egress = true;
    let stack = stack_from(&config);

    let egress = stack
        .resources()
        .iter()
        .filter(|r| {
            matches!(
                &r.kind,
                ResourceKind::SecurityGroupRule(rule) if rule.direction == Direction::Egress
            )
        })
        .count();
    assert_eq!(egress, 2);
    assert!(validate_stack(&stack).is_ok());
}

#[test]
fn test_unmanaged_credentials_are_rejected() {
    let config = StackConfig::default();
    let err = ConnectionPoolingStack::new(&config, common::code())
        .with_credentials(connection_pooling::topology::Credentials::Unmanaged {
            username: "admin".into(),
        })
        .build()
        .unwrap_err();
    assert!(
        matches!(err, StackError::MissingDatabaseSecret(_)),
        "unexpected error: {err}"
    );
}
