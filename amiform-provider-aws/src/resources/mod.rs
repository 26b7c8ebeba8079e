//! Image resource types
//!
//! `ec2.ami` and `ec2.ami_copy` differ only in how the image comes to exist.
//! Reading, updating and deleting go through the shared handlers in
//! [`ami`], parameterized by [`AmiVariant`].

pub mod ami;
pub mod ami_copy;

use amiform_core::provider::ResourceType;
use amiform_core::schema::ResourceSchema;

use crate::schemas;

/// Which image resource an operation is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmiVariant {
    /// Registered from explicit attributes; snapshots are managed elsewhere
    Registered,
    /// Copied from another region; the copy's snapshots belong to it
    Copied,
}

impl AmiVariant {
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            schemas::ami::RESOURCE_TYPE => Some(AmiVariant::Registered),
            schemas::ami_copy::RESOURCE_TYPE => Some(AmiVariant::Copied),
            _ => None,
        }
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            AmiVariant::Registered => schemas::ami::RESOURCE_TYPE,
            AmiVariant::Copied => schemas::ami_copy::RESOURCE_TYPE,
        }
    }

    /// Whether deleting the image also deletes the snapshots it references
    pub fn manages_snapshots(&self) -> bool {
        matches!(self, AmiVariant::Copied)
    }
}

/// Registered AMI resource type
pub struct AmiType;

impl ResourceType for AmiType {
    fn name(&self) -> &'static str {
        schemas::ami::RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ami::ami_schema()
    }
}

/// Copied AMI resource type
pub struct AmiCopyType;

impl ResourceType for AmiCopyType {
    fn name(&self) -> &'static str {
        schemas::ami_copy::RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schemas::ami_copy::ami_copy_schema()
    }
}
