//! Template synthesis tests
//!
//! Renders the default stack and checks the CloudFormation the deployer
//! would submit.

mod common;

use common::{code, default_stack, stack_from};
use connection_pooling::config::StackConfig;
use connection_pooling::prelude::*;
use connection_pooling::synth::ASSET_BUCKET_PARAMETER;
use serde_json::{json, Value};

fn template() -> Template {
    synthesize(
        &default_stack(),
        &SynthContext {
            description: Some("test".into()),
            asset_bucket: Some("assets-bucket".into()),
        },
    )
    .expect("default stack synthesizes")
}

fn property<'a>(template: &'a Template, logical_id: &str, key: &str) -> &'a Value {
    template
        .resource(logical_id)
        .unwrap_or_else(|| panic!("{logical_id} missing from template"))
        .properties
        .get(key)
        .unwrap_or_else(|| panic!("{logical_id} has no {key}"))
}

#[test]
fn test_every_resource_is_rendered() {
    let stack = default_stack();
    let template = template();
    for resource in stack.resources() {
        assert!(
            template.resource(resource.id.as_str()).is_some(),
            "{} should be rendered",
            resource.id
        );
    }
    assert_eq!(template.format_version, "2010-09-09");
    assert_eq!(
        template.parameters[ASSET_BUCKET_PARAMETER]["Default"],
        json!("assets-bucket")
    );
}

#[test]
fn test_proxy_properties() {
    let template = template();
    let proxy = template.resource("DatabaseProxy").expect("proxy rendered");
    assert_eq!(proxy.resource_type, "AWS::RDS::DBProxy");
    assert_eq!(proxy.properties["IdleClientTimeout"], json!(60));
    assert_eq!(proxy.properties["EngineFamily"], json!("MYSQL"));
    assert_eq!(proxy.properties["RequireTLS"], json!(true));
    assert_eq!(
        proxy.properties["Auth"][0]["SecretArn"],
        json!({ "Ref": "DatabaseSecretAttachment" })
    );

    let targets: Vec<&str> = template
        .resources_of_type("AWS::RDS::DBProxyTargetGroup")
        .collect();
    assert_eq!(targets, vec!["DatabaseProxyProxyTargetGroup"]);
}

#[test]
fn test_function_properties() {
    let template = template();
    assert_eq!(property(&template, "AppFunction", "ReservedConcurrentExecutions"), &json!(1));
    assert_eq!(property(&template, "AppFunction", "Timeout"), &json!(60));
    assert_eq!(
        property(&template, "AppFunction", "TracingConfig"),
        &json!({ "Mode": "Active" })
    );

    let variables = &property(&template, "AppFunction", "Environment")["Variables"];
    assert_eq!(
        variables["DB_HOST"],
        json!({ "Fn::GetAtt": ["DatabaseProxy", "Endpoint"] })
    );
    assert_eq!(
        variables["DB_USER_SECRET_NAME"],
        json!("AwsLambdaConnectionPoolingStack/database/credentials")
    );
    let rendered = variables.to_string();
    assert!(
        !rendered.contains("resolve:secretsmanager"),
        "environment must not resolve secret values: {rendered}"
    );
}

#[test]
fn test_alias_and_log_group() {
    let template = template();
    let alias_id = template
        .resources_of_type("AWS::Lambda::Alias")
        .next()
        .expect("alias rendered")
        .to_string();
    assert_eq!(
        property(&template, &alias_id, "ProvisionedConcurrencyConfig"),
        &json!({ "ProvisionedConcurrentExecutions": 1 })
    );
    assert_eq!(property(&template, &alias_id, "Name"), &json!("live"));

    assert_eq!(property(&template, "HandlerLogGroup", "RetentionInDays"), &json!(7));
}

#[test]
fn test_method_integrates_with_alias() {
    let template = template();
    let uri = property(&template, "AppRestApiGet", "Integration")["Uri"].to_string();
    let alias_id = template
        .resources_of_type("AWS::Lambda::Alias")
        .next()
        .expect("alias rendered");
    assert!(uri.contains(alias_id), "integration should target {alias_id}: {uri}");
    assert_eq!(property(&template, "AppRestApiGet", "HttpMethod"), &json!("GET"));
    assert_eq!(
        property(&template, "AppRestApiGet", "AuthorizationType"),
        &json!("NONE")
    );
}

#[test]
fn test_stage_logging_has_an_account_role() {
    let template = template();
    let role = template
        .resource("AppRestApiCloudWatchRole")
        .expect("API Gateway logging role rendered");
    assert_eq!(role.resource_type, "AWS::IAM::Role");
    assert_eq!(
        role.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
        json!("apigateway.amazonaws.com")
    );
    let policies = role.properties["ManagedPolicyArns"].to_string();
    assert!(policies.contains("AmazonAPIGatewayPushToCloudWatchLogs"), "{policies}");

    let account = template.resource("AppRestApiAccount").expect("account rendered");
    assert_eq!(account.resource_type, "AWS::ApiGateway::Account");
    assert_eq!(
        account.properties["CloudWatchRoleArn"],
        json!({ "Fn::GetAtt": ["AppRestApiCloudWatchRole", "Arn"] })
    );

    let stage = template
        .resources_of_type("AWS::ApiGateway::Stage")
        .next()
        .expect("stage rendered");
    let stage = template.resource(stage).expect("stage rendered");
    assert!(
        stage.depends_on.iter().any(|id| id == "AppRestApiAccount"),
        "stage must wait for the account role: {:?}",
        stage.depends_on
    );
}

#[test]
fn test_account_role_can_be_left_to_the_account() {
    let mut config = StackConfig::default();
    config.gateway.cloud_watch_role = false;
    let template = synthesize(&stack_from(&config), &SynthContext::default()).expect("synthesizes");

    assert!(template.resource("AppRestApiCloudWatchRole").is_none());
    assert_eq!(template.resources_of_type("AWS::ApiGateway::Account").count(), 0);
    let stage = template
        .resources_of_type("AWS::ApiGateway::Stage")
        .next()
        .and_then(|id| template.resource(id))
        .expect("stage rendered");
    assert!(!stage.depends_on.iter().any(|id| id == "AppRestApiAccount"));
}

#[test]
fn test_api_endpoint_output() {
    let template = template();
    let output = template.outputs.get("ApiEndpoint").expect("ApiEndpoint output");
    let value = output["Value"].to_string();
    assert!(value.contains("AppRestApi"), "{value}");
    assert!(value.contains(".execute-api."), "{value}");
}

#[test]
fn test_database_retains_snapshot_and_ingress_from_proxy() {
    let template = template();
    let database = template.resource("Database").expect("database rendered");
    assert_eq!(database.deletion_policy, Some("Snapshot"));
    assert_eq!(database.properties["PubliclyAccessible"], json!(false));

    let ingress: Vec<&str> = template
        .resources_of_type("AWS::EC2::SecurityGroupIngress")
        .collect();
    assert_eq!(ingress.len(), 2);
    assert_eq!(
        property(&template, "ProxySecurityGroupIngressFromApp", "FromPort"),
        &json!(3306)
    );
    assert_eq!(
        property(&template, "ProxySecurityGroupIngressFromApp", "SourceSecurityGroupId"),
        &json!({ "Fn::GetAtt": ["AppSecurityGroup", "GroupId"] })
    );
}

#[test]
fn test_isolated_subnets_have_no_default_route() {
    let template = template();
    for logical_id in template.resources_of_type("AWS::EC2::Route") {
        assert!(
            !logical_id.contains("Database"),
            "isolated subnet route {logical_id} should not exist"
        );
    }
}

#[test]
fn test_synthesis_is_deterministic() {
    let first = template().to_json_pretty().expect("serializes");
    let second = template().to_json_pretty().expect("serializes");
    assert_eq!(first, second);
}

#[test]
fn test_code_change_publishes_new_version() {
    let config = StackConfig::default();
    let other = ConnectionPoolingStack::new(
        &config,
        CodeAsset::from_bytes("bootstrap.zip", b"a different build"),
    )
    .build()
    .expect("builds");
    let original = ConnectionPoolingStack::new(&config, code()).build().expect("builds");

    let versions = |stack: &Stack| -> Vec<String> {
        synthesize(stack, &SynthContext::default())
            .expect("synthesizes")
            .resources_of_type("AWS::Lambda::Version")
            .map(ToString::to_string)
            .collect()
    };
    assert_ne!(versions(&original), versions(&other));
}
