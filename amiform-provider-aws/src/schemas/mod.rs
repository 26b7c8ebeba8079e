//! AWS resource schema definitions

pub mod ami;
pub mod ami_copy;
pub mod block_device;
pub mod types;

use amiform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Returns all AWS schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    vec![ami::ami_schema(), ami_copy::ami_copy_schema()]
}

/// Attributes every image resource reports back after creation
fn computed_image_attributes(schema: ResourceSchema) -> ResourceSchema {
    schema
        .attribute(
            AttributeSchema::new("root_snapshot_id", AttributeType::String)
                .computed()
                .with_description("Snapshot backing the root device"),
        )
        .attribute(
            AttributeSchema::new("manage_ebs_snapshots", AttributeType::Bool)
                .computed()
                .force_new()
                .with_description("Whether deleting the image also deletes its snapshots"),
        )
}
