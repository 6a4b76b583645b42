//! # Name Validation
//!
//! Validates user-supplied names against the constraints of the AWS APIs that
//! will eventually receive them, so a bad name fails at load time rather than
//! halfway through a deployment.

use crate::config::ConfigError;
use regex::Regex;

fn check(field: &str, pattern: &str, value: &str, hint: &str) -> Result<(), ConfigError> {
    let re = Regex::new(pattern)
        .map_err(|e| ConfigError::invalid(field, format!("failed to compile regex: {e}")))?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("'{value}' {hint}")))
    }
}

/// CloudFormation stack name constraints:
/// - Length: 1-128 characters
/// - Must start with a letter
/// - Allowed: alphanumeric characters and hyphens
///
/// Reference: https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/cfn-using-console-create-stack-parameters.html
pub fn validate_stack_name(name: &str) -> Result<(), ConfigError> {
    check(
        "stackName",
        r"^[A-Za-z][A-Za-z0-9-]{0,127}$",
        name,
        "must be 1-128 characters, alphanumeric/hyphens, starting with a letter",
    )
}

/// AWS region format patterns:
/// - Standard: us-east-1, eu-west-1
/// - Gov: us-gov-west-1
/// - ISO: us-iso-east-1
/// - China: cn-north-1
/// - `local` for localstack
///
/// Reference: https://docs.aws.amazon.com/general/latest/gr/rande.html
pub fn validate_aws_region(region: &str) -> Result<(), ConfigError> {
    let region = region.trim().to_lowercase();
    if region.is_empty() {
        return Err(ConfigError::invalid("region", "cannot be empty"));
    }
    check(
        "region",
        r"^(?:[a-z]{2}-(?:gov-|iso-)?[a-z]+-\d+|cn-[a-z]+-\d+|local)$",
        &region,
        "must be a valid AWS region code (e.g. us-east-1, us-gov-west-1, cn-north-1)",
    )
}

/// Subnet tier names end up inside logical ids after PascalCasing
pub fn validate_tier_name(name: &str) -> Result<(), ConfigError> {
    check(
        "network.subnets.name",
        r"^[a-z][a-z0-9_-]{0,31}$",
        name,
        "must be 1-32 lowercase characters, starting with a letter",
    )
}

/// MySQL master username constraints on RDS:
/// - Length: 1-16 characters
/// - Must start with a letter
///
/// Reference: https://docs.aws.amazon.com/AmazonRDS/latest/UserGuide/CHAP_Limits.html#RDS_Limits.Constraints
pub fn validate_database_username(name: &str) -> Result<(), ConfigError> {
    check(
        "database.username",
        r"^[A-Za-z][A-Za-z0-9_]{0,15}$",
        name,
        "must be 1-16 alphanumeric characters, starting with a letter",
    )
}

/// Secrets Manager name constraints:
/// - Length: 1-512 characters
/// - Allowed: alphanumeric characters and `/_+=.@-`
///
/// Reference: https://docs.aws.amazon.com/secretsmanager/latest/apireference/API_CreateSecret.html
pub fn validate_secret_name(name: &str) -> Result<(), ConfigError> {
    check(
        "database.secretName",
        r"^[A-Za-z0-9/_+=.@-]{1,512}$",
        name,
        "must be 1-512 characters from [A-Za-z0-9/_+=.@-]",
    )
}

/// Lambda alias names may not be purely numeric (that would read as a version)
///
/// Reference: https://docs.aws.amazon.com/lambda/latest/api/API_CreateAlias.html
pub fn validate_alias_name(name: &str) -> Result<(), ConfigError> {
    check(
        "function.aliasName",
        r"^[A-Za-z0-9_-]{1,128}$",
        name,
        "must be 1-128 characters from [A-Za-z0-9_-]",
    )?;
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::invalid(
            "function.aliasName",
            format!("'{name}' cannot be purely numeric"),
        ));
    }
    Ok(())
}

/// API Gateway stage names: alphanumeric, hyphens and underscores, up to 128
pub fn validate_stage_name(name: &str) -> Result<(), ConfigError> {
    check(
        "gateway.stageName",
        r"^[A-Za-z0-9_-]{1,128}$",
        name,
        "must be 1-128 characters from [A-Za-z0-9_-]",
    )
}

/// S3 bucket naming rules (general purpose buckets):
/// - Length: 3-63 characters
/// - Lowercase letters, numbers, dots and hyphens
/// - Must begin and end with a letter or number
///
/// Reference: https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html
pub fn validate_bucket_name(name: &str) -> Result<(), ConfigError> {
    check(
        "provisioning.assetBucket",
        r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$",
        name,
        "must be a valid S3 bucket name (3-63 lowercase characters, numbers, dots, hyphens)",
    )?;
    if name.contains("..") {
        return Err(ConfigError::invalid(
            "provisioning.assetBucket",
            format!("'{name}' cannot contain consecutive dots"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_names() {
        assert!(validate_stack_name("AwsLambdaConnectionPoolingStack").is_ok());
        assert!(validate_stack_name("pooling-demo-2").is_ok());
        assert!(validate_stack_name("").is_err());
        assert!(validate_stack_name("2fast").is_err());
        assert!(validate_stack_name("has_underscore").is_err());
    }

    #[test]
    fn test_regions() {
        for region in ["us-east-1", "eu-west-2", "us-gov-west-1", "cn-north-1", "local", " US-EAST-1 "] {
            assert!(validate_aws_region(region).is_ok(), "{region} should be valid");
        }
        for region in ["", "useast1", "us-east", "mars"] {
            assert!(validate_aws_region(region).is_err(), "{region} should be invalid");
        }
    }

    #[test]
    fn test_alias_names() {
        assert!(validate_alias_name("live").is_ok());
        assert!(validate_alias_name("42").is_err());
        assert!(validate_alias_name("has space").is_err());
    }

    #[test]
    fn test_bucket_names() {
        assert!(validate_bucket_name("pooling-assets-123").is_ok());
        assert!(validate_bucket_name("Uppercase").is_err());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("ab").is_err());
    }

    #[test]
    fn test_usernames_and_secrets() {
        assert!(validate_database_username("admin").is_ok());
        assert!(validate_database_username("a_very_long_username").is_err());
        assert!(validate_secret_name("pooling/database/credentials").is_ok());
        assert!(validate_secret_name("no spaces").is_err());
    }
}
