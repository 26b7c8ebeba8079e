//! AWS-specific type definitions

use std::sync::LazyLock;

use amiform_core::resource::Value;
use amiform_core::schema::AttributeType;
use regex::Regex;

/// Valid AWS regions (in AWS format with hyphens)
const VALID_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-south-1",
    "ca-central-1",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

static AMI_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ami-[0-9a-f]+$").expect("valid AMI id pattern"));

static KMS_KEY_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws[a-z-]*:kms:[a-z0-9-]+:\d{12}:(key|alias)/.+$")
        .expect("valid KMS key ARN pattern")
});

/// AWS region type with custom validation
/// Accepts "ap-northeast-1" as well as "ap_northeast_1"
pub fn aws_region() -> AttributeType {
    AttributeType::Custom {
        name: "Region".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                if is_valid_region(&normalize_region(s)) {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid region '{}', expected one of: {}",
                        s,
                        VALID_REGIONS.join(", ")
                    ))
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// Normalize region string to AWS format (hyphens)
/// - "ap_northeast_1" -> "ap-northeast-1"
/// - "ap-northeast-1" -> "ap-northeast-1"
pub fn normalize_region(s: &str) -> String {
    s.trim().replace('_', "-")
}

pub fn is_valid_region(region: &str) -> bool {
    VALID_REGIONS.contains(&region)
}

/// AMI identifier, e.g. "ami-0abc123"
pub fn ami_id() -> AttributeType {
    AttributeType::Custom {
        name: "AmiId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if AMI_ID.is_match(s) => Ok(()),
            Value::String(s) => Err(format!("Invalid AMI id '{}', expected ami-<hex>", s)),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// ARN of a KMS key or alias
pub fn kms_key_arn() -> AttributeType {
    AttributeType::Custom {
        name: "KmsKeyArn".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if KMS_KEY_ARN.is_match(s) => Ok(()),
            Value::String(s) => Err(format!("'{}' is not a valid KMS key ARN", s)),
            _ => Err("Expected string".to_string()),
        },
    }
}

pub fn tags_type() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

pub fn architecture() -> AttributeType {
    AttributeType::Enum(vec![
        "i386".to_string(),
        "x86_64".to_string(),
        "arm64".to_string(),
    ])
}

pub fn virtualization_type() -> AttributeType {
    AttributeType::Enum(vec!["hvm".to_string(), "paravirtual".to_string()])
}

pub fn volume_type() -> AttributeType {
    AttributeType::Enum(vec![
        "standard".to_string(),
        "gp2".to_string(),
        "gp3".to_string(),
        "io1".to_string(),
        "io2".to_string(),
        "st1".to_string(),
        "sc1".to_string(),
    ])
}
