//! Image API client
//!
//! The narrow set of EC2 image operations the resources need. `Ec2ImageClient`
//! implements it over the AWS SDK; tests use an in-memory fake.

use std::collections::BTreeMap;

use amiform_core::provider::ProviderError;
use async_trait::async_trait;
use thiserror::Error;

use crate::image::{EbsBlockDevice, EphemeralBlockDevice, Image};

/// Parameters of a cross-region image copy
#[derive(Debug, Clone, PartialEq)]
pub struct CopyImageRequest {
    pub name: String,
    pub description: String,
    pub source_image_id: String,
    pub source_region: String,
    pub encrypted: bool,
    pub kms_key_id: Option<String>,
}

/// Parameters of an image registration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterImageRequest {
    pub name: String,
    pub description: Option<String>,
    pub architecture: Option<String>,
    pub image_location: Option<String>,
    pub kernel_id: Option<String>,
    pub ramdisk_id: Option<String>,
    pub root_device_name: Option<String>,
    pub sriov_net_support: Option<String>,
    pub virtualization_type: Option<String>,
    pub ena_support: Option<bool>,
    pub ebs_block_devices: Vec<EbsBlockDevice>,
    pub ephemeral_block_devices: Vec<EphemeralBlockDevice>,
}

/// Errors returned by an image client
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Error reported by the cloud API
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// The API answered without a field the operation depends on
    #[error("{operation} returned no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

impl ClientError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<ClientError> for ProviderError {
    fn from(err: ClientError) -> Self {
        ProviderError::new(err.to_string()).with_cause(err)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[async_trait]
pub trait ImageClient: Send + Sync {
    /// Start copying an image into this client's region; returns the new image ID
    async fn copy_image(&self, request: &CopyImageRequest) -> ClientResult<String>;

    /// Register a new image; returns its ID
    async fn register_image(&self, request: &RegisterImageRequest) -> ClientResult<String>;

    /// Describe one image. `None` when the image does not exist.
    async fn describe_image(&self, image_id: &str) -> ClientResult<Option<Image>>;

    async fn modify_description(&self, image_id: &str, description: &str) -> ClientResult<()>;

    async fn create_tags(
        &self,
        image_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> ClientResult<()>;

    async fn delete_tags(&self, image_id: &str, keys: &[String]) -> ClientResult<()>;

    async fn deregister_image(&self, image_id: &str) -> ClientResult<()>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> ClientResult<()>;
}
