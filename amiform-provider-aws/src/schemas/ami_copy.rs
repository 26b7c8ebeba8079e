//! Image copy resource schema

use amiform_core::resource::Value;
use amiform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::block_device::{BlockFields, ebs_block_device, ephemeral_block_device};
use super::{computed_image_attributes, types};

pub const RESOURCE_TYPE: &str = "ec2.ami_copy";

/// Returns the schema for a copied AMI
///
/// The copy is started from an existing image in another region; everything
/// but `description` and `tags` is fixed once the copy exists.
pub fn ami_copy_schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("An AMI copied from another region")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new()
                .with_description("Name of the new image"),
        )
        .attribute(
            AttributeSchema::new("description", AttributeType::String)
                .with_default(Value::String(String::new()))
                .with_description("Description of the new image"),
        )
        .attribute(
            AttributeSchema::new("source_ami_id", types::ami_id())
                .required()
                .force_new()
                .with_description("ID of the image to copy"),
        )
        .attribute(
            AttributeSchema::new("source_ami_region", types::aws_region())
                .required()
                .force_new()
                .with_description("Region the source image lives in"),
        )
        .attribute(
            AttributeSchema::new("encrypted", AttributeType::Bool)
                .force_new()
                .with_default(Value::Bool(false))
                .with_description("Encrypt the snapshots of the copy"),
        )
        .attribute(
            AttributeSchema::new("kms_key_id", types::kms_key_arn())
                .optional_computed()
                .force_new()
                .with_description("ARN of the KMS key used to encrypt the copy"),
        )
        .attribute(
            AttributeSchema::new("tags", types::tags_type())
                .with_description("Tags assigned to the image"),
        )
        .attribute(
            AttributeSchema::new(
                "ebs_block_device",
                AttributeType::KeyedSet(Box::new(ebs_block_device(BlockFields::Computed))),
            )
            .optional_computed(),
        )
        .attribute(
            AttributeSchema::new(
                "ephemeral_block_device",
                AttributeType::KeyedSet(Box::new(ephemeral_block_device(BlockFields::Computed))),
            )
            .optional_computed()
            .force_new(),
        )
        .attribute(AttributeSchema::new("architecture", AttributeType::String).computed())
        .attribute(AttributeSchema::new("ena_support", AttributeType::Bool).computed())
        .attribute(AttributeSchema::new("image_location", AttributeType::String).computed())
        .attribute(AttributeSchema::new("kernel_id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("ramdisk_id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("root_device_name", AttributeType::String).computed())
        .attribute(AttributeSchema::new("sriov_net_support", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("virtualization_type", AttributeType::String).computed(),
        );

    computed_image_attributes(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn only_description_and_tags_update_in_place() {
        let schema = ami_copy_schema();
        assert_eq!(
            schema.force_new_attributes(),
            vec![
                "encrypted",
                "ephemeral_block_device",
                "kms_key_id",
                "manage_ebs_snapshots",
                "name",
                "source_ami_id",
                "source_ami_region",
            ]
        );
        assert!(!schema.get("description").unwrap().is_force_new());
        assert!(!schema.get("tags").unwrap().is_force_new());
    }

    #[test]
    fn minimal_copy_is_valid() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("copy-1"));
        attrs.insert("source_ami_id".to_string(), Value::from("ami-abc123"));
        attrs.insert("source_ami_region".to_string(), Value::from("us-west-2"));
        assert!(ami_copy_schema().validate(&attrs).is_ok());
    }

    #[test]
    fn defaults_fill_encrypted_and_description() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("copy-1"));
        let merged = ami_copy_schema().with_defaults(&attrs);
        assert_eq!(merged.get("encrypted"), Some(&Value::Bool(false)));
        assert_eq!(merged.get("description"), Some(&Value::from("")));
    }

    #[test]
    fn manage_ebs_snapshots_cannot_be_set() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("copy-1"));
        attrs.insert("source_ami_id".to_string(), Value::from("ami-abc123"));
        attrs.insert("source_ami_region".to_string(), Value::from("us-west-2"));
        attrs.insert("manage_ebs_snapshots".to_string(), Value::Bool(false));
        assert!(ami_copy_schema().validate(&attrs).is_err());
    }

    #[test]
    fn rejects_bad_source_and_key() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("copy-1"));
        attrs.insert("source_ami_id".to_string(), Value::from("abc123"));
        attrs.insert("source_ami_region".to_string(), Value::from("us-west-2"));
        attrs.insert("kms_key_id".to_string(), Value::from("my-key"));
        let errors = ami_copy_schema().validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
