//! CloudFormation intrinsic functions and pseudo parameters as JSON values.

use serde_json::{json, Value};
use std::collections::BTreeSet;

pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

pub fn partition() -> Value {
    reference("AWS::Partition")
}

pub fn region() -> Value {
    reference("AWS::Region")
}

pub fn account_id() -> Value {
    reference("AWS::AccountId")
}

pub fn url_suffix() -> Value {
    reference("AWS::URLSuffix")
}

/// `{{resolve:secretsmanager:<secret>:SecretString:<key>::}}`
pub fn resolve_secret_field(secret_logical_id: &str, key: &str) -> Value {
    join(
        "",
        vec![
            Value::from("{{resolve:secretsmanager:"),
            reference(secret_logical_id),
            Value::from(format!(":SecretString:{key}::}}}}")),
        ],
    )
}

/// Logical ids referenced through `Ref` or `Fn::GetAtt` anywhere in `value`
pub fn referenced_ids(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("Ref") {
                if !id.starts_with("AWS::") {
                    out.insert(id.clone());
                }
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(id)) = parts.first() {
                    out.insert(id.clone());
                }
            }
            map.values().for_each(|v| referenced_ids(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| referenced_ids(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_ids_skip_pseudo_parameters() {
        let value = json!({
            "Uri": join("", vec![partition(), reference("AppFunctionAliasLive"), get_att("AppRestApi", "RootResourceId")]),
        });
        let mut ids = BTreeSet::new();
        referenced_ids(&value, &mut ids);
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["AppFunctionAliasLive".to_string(), "AppRestApi".to_string()]
        );
    }

    #[test]
    fn test_resolve_secret_field() {
        let value = resolve_secret_field("DatabaseSecret", "password");
        assert_eq!(
            value,
            json!({ "Fn::Join": ["", [
                "{{resolve:secretsmanager:",
                { "Ref": "DatabaseSecret" },
                ":SecretString:password::}}"
            ]]})
        );
    }
}
