//! Block device mapping blocks shared by the image schemas
//!
//! Elements are identified by composite keys rather than hashes:
//! `device_name-snapshot_id` for EBS and `device_name-virtual_name` for
//! instance-store mappings.

use amiform_core::schema::{AttributeSchema, AttributeType, BlockSchema};

use super::types;

/// How the fields of a mapping block may be supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFields {
    /// User supplied, as when registering an image
    Input,
    /// Mirrored from the remote image only
    Computed,
}

fn field(name: &str, attr_type: AttributeType, fields: BlockFields) -> AttributeSchema {
    let schema = AttributeSchema::new(name, attr_type);
    match fields {
        BlockFields::Input => schema,
        BlockFields::Computed => schema.computed(),
    }
}

pub fn ebs_block_device(fields: BlockFields) -> BlockSchema {
    let device_name = match fields {
        BlockFields::Input => AttributeSchema::new("device_name", AttributeType::String).required(),
        BlockFields::Computed => {
            AttributeSchema::new("device_name", AttributeType::String).computed()
        }
    };

    BlockSchema::new("EbsBlockDevice")
        .attribute(device_name.with_description("Device name exposed to the instance"))
        .attribute(field("snapshot_id", AttributeType::String, fields))
        .attribute(field("volume_size", AttributeType::Int, fields))
        .attribute(field("volume_type", types::volume_type(), fields))
        .attribute(field("iops", AttributeType::Int, fields))
        .attribute(field("encrypted", AttributeType::Bool, fields))
        .attribute(field("delete_on_termination", AttributeType::Bool, fields))
        .keyed_by(&["device_name", "snapshot_id"])
}

pub fn ephemeral_block_device(fields: BlockFields) -> BlockSchema {
    BlockSchema::new("EphemeralBlockDevice")
        .attribute(field("device_name", AttributeType::String, fields))
        .attribute(
            field("virtual_name", AttributeType::String, fields)
                .with_description("Instance store volume name, e.g. ephemeral0"),
        )
        .keyed_by(&["device_name", "virtual_name"])
}
