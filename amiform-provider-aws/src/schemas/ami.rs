//! Registered image resource schema

use amiform_core::resource::Value;
use amiform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::block_device::{BlockFields, ebs_block_device, ephemeral_block_device};
use super::{computed_image_attributes, types};

pub const RESOURCE_TYPE: &str = "ec2.ami";

/// Returns the schema for an AMI registered from explicit attributes
pub fn ami_schema() -> ResourceSchema {
    let schema = ResourceSchema::new(RESOURCE_TYPE)
        .with_description("An AMI registered from snapshots or an image manifest")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("description", AttributeType::String)
                .with_default(Value::String(String::new())),
        )
        .attribute(
            AttributeSchema::new("architecture", types::architecture())
                .force_new()
                .with_default(Value::String("x86_64".to_string())),
        )
        .attribute(
            AttributeSchema::new("image_location", AttributeType::String)
                .optional_computed()
                .force_new()
                .with_description("S3 location of an instance-store image manifest"),
        )
        .attribute(
            AttributeSchema::new("kernel_id", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("ramdisk_id", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("root_device_name", AttributeType::String)
                .optional_computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("sriov_net_support", AttributeType::String)
                .force_new()
                .with_default(Value::String("simple".to_string())),
        )
        .attribute(
            AttributeSchema::new("virtualization_type", types::virtualization_type())
                .force_new()
                .with_default(Value::String("paravirtual".to_string())),
        )
        .attribute(
            AttributeSchema::new("ena_support", AttributeType::Bool)
                .optional_computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("tags", types::tags_type()))
        .attribute(
            AttributeSchema::new(
                "ebs_block_device",
                AttributeType::KeyedSet(Box::new(ebs_block_device(BlockFields::Input))),
            )
            .optional_computed()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "ephemeral_block_device",
                AttributeType::KeyedSet(Box::new(ephemeral_block_device(BlockFields::Input))),
            )
            .optional_computed()
            .force_new(),
        );

    computed_image_attributes(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn register_attributes_force_new() {
        let schema = ami_schema();
        for name in ["architecture", "ebs_block_device", "root_device_name"] {
            assert!(schema.get(name).unwrap().is_force_new(), "{}", name);
        }
        assert!(!schema.get("description").unwrap().is_force_new());
    }

    #[test]
    fn attributes_aws_fills_in_are_optional_computed() {
        let schema = ami_schema();
        for name in ["kernel_id", "ramdisk_id", "root_device_name", "ena_support"] {
            assert_eq!(
                schema.get(name).unwrap().presence,
                amiform_core::schema::Presence::OptionalComputed,
                "{}",
                name
            );
        }
    }

    #[test]
    fn block_devices_are_validated() {
        let mut device = HashMap::new();
        device.insert("device_name".to_string(), Value::from("/dev/xvda"));
        device.insert("snapshot_id".to_string(), Value::from("snap-1"));
        device.insert("volume_type".to_string(), Value::from("gp9"));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("base"));
        attrs.insert(
            "ebs_block_device".to_string(),
            Value::List(vec![Value::Map(device)]),
        );
        assert!(ami_schema().validate(&attrs).is_err());
    }
}
