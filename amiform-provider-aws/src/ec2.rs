//! EC2-backed image client

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::{
    ArchitectureValues, AttributeValue, BlockDeviceMapping, EbsBlockDevice as SdkEbsBlockDevice,
    Tag, VolumeType,
};

use crate::client::{
    ClientError, ClientResult, CopyImageRequest, ImageClient, RegisterImageRequest,
};
use crate::image::{EbsBlockDevice, EphemeralBlockDevice, Image, ImageState};

/// Error codes EC2 uses for images that do not exist (any more)
const NOT_FOUND_CODES: &[&str] = &["InvalidAMIID.NotFound", "InvalidAMIID.Unavailable"];

/// Image client talking to EC2 in a single region
pub struct Ec2ImageClient {
    client: Ec2Client,
}

impl Ec2ImageClient {
    /// Create a client for the given region, optionally using a named profile
    pub async fn new(region: &str, profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        Self {
            client: Ec2Client::new(&config),
        }
    }

    /// Create with a specific SDK client (for testing)
    pub fn with_client(client: Ec2Client) -> Self {
        Self { client }
    }
}

/// Convert an SDK error, keeping the EC2 error code and message as reported
fn api_error<E, R>(err: SdkError<E, R>) -> ClientError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(service_err) => ClientError::api(
            service_err.code().unwrap_or("Unknown"),
            service_err.message().unwrap_or_default(),
        ),
        None => ClientError::api("RequestFailed", DisplayErrorContext(&err).to_string()),
    }
}

fn to_sdk_mappings(request: &RegisterImageRequest) -> Vec<BlockDeviceMapping> {
    let ebs = request.ebs_block_devices.iter().map(|d| {
        let mut ebs = SdkEbsBlockDevice::builder()
            .delete_on_termination(d.delete_on_termination)
            .set_snapshot_id(d.snapshot_id.clone());
        // Encryption is inherited from the snapshot when one is given
        if d.snapshot_id.is_none() {
            ebs = ebs.encrypted(d.encrypted);
        }
        if let Some(size) = d.volume_size {
            ebs = ebs.volume_size(size as i32);
        }
        if let Some(volume_type) = &d.volume_type {
            ebs = ebs.volume_type(VolumeType::from(volume_type.as_str()));
        }
        if let Some(iops) = d.iops {
            ebs = ebs.iops(iops as i32);
        }
        BlockDeviceMapping::builder()
            .device_name(&d.device_name)
            .ebs(ebs.build())
            .build()
    });

    let ephemeral = request.ephemeral_block_devices.iter().map(|d| {
        BlockDeviceMapping::builder()
            .device_name(&d.device_name)
            .virtual_name(&d.virtual_name)
            .build()
    });

    ebs.chain(ephemeral).collect()
}

fn from_sdk_image(image: &aws_sdk_ec2::types::Image) -> ClientResult<Image> {
    let image_id = image.image_id().ok_or(ClientError::MissingField {
        operation: "DescribeImages",
        field: "ImageId",
    })?;
    let state = image
        .state()
        .map(|s| ImageState::parse(s.as_str()))
        .unwrap_or_else(|| ImageState::Unknown(String::new()));

    let mut result = Image::new(image_id, image.name().unwrap_or_default(), state);
    result.description = image.description().map(str::to_string);
    result.state_reason = image
        .state_reason()
        .and_then(|r| r.message())
        .map(str::to_string);
    result.architecture = image.architecture().map(|a| a.as_str().to_string());
    result.image_location = image.image_location().map(str::to_string);
    result.kernel_id = image.kernel_id().map(str::to_string);
    result.ramdisk_id = image.ramdisk_id().map(str::to_string);
    result.root_device_name = image.root_device_name().map(str::to_string);
    result.virtualization_type = image.virtualization_type().map(|v| v.as_str().to_string());
    result.sriov_net_support = image.sriov_net_support().map(str::to_string);
    result.ena_support = image.ena_support().unwrap_or(false);

    for mapping in image.block_device_mappings() {
        let Some(device_name) = mapping.device_name() else {
            continue;
        };
        if let Some(ebs) = mapping.ebs() {
            result.ebs_block_devices.push(EbsBlockDevice {
                device_name: device_name.to_string(),
                snapshot_id: ebs.snapshot_id().map(str::to_string),
                volume_size: ebs.volume_size().map(i64::from),
                volume_type: ebs.volume_type().map(|t| t.as_str().to_string()),
                iops: ebs.iops().map(i64::from),
                encrypted: ebs.encrypted().unwrap_or(false),
                delete_on_termination: ebs.delete_on_termination().unwrap_or(false),
            });
        } else if let Some(virtual_name) = mapping.virtual_name() {
            result.ephemeral_block_devices.push(EphemeralBlockDevice {
                device_name: device_name.to_string(),
                virtual_name: virtual_name.to_string(),
            });
        }
    }

    for tag in image.tags() {
        if let (Some(key), Some(value)) = (tag.key(), tag.value()) {
            result.tags.insert(key.to_string(), value.to_string());
        }
    }

    Ok(result)
}

#[async_trait]
impl ImageClient for Ec2ImageClient {
    async fn copy_image(&self, request: &CopyImageRequest) -> ClientResult<String> {
        let output = self
            .client
            .copy_image()
            .name(&request.name)
            .description(&request.description)
            .source_image_id(&request.source_image_id)
            .source_region(&request.source_region)
            .encrypted(request.encrypted)
            .set_kms_key_id(request.kms_key_id.clone())
            .send()
            .await
            .map_err(api_error)?;

        output
            .image_id()
            .map(str::to_string)
            .ok_or(ClientError::MissingField {
                operation: "CopyImage",
                field: "ImageId",
            })
    }

    async fn register_image(&self, request: &RegisterImageRequest) -> ClientResult<String> {
        let output = self
            .client
            .register_image()
            .name(&request.name)
            .set_description(request.description.clone())
            .set_architecture(
                request
                    .architecture
                    .as_deref()
                    .map(ArchitectureValues::from),
            )
            .set_image_location(request.image_location.clone())
            .set_kernel_id(request.kernel_id.clone())
            .set_ramdisk_id(request.ramdisk_id.clone())
            .set_root_device_name(request.root_device_name.clone())
            .set_sriov_net_support(request.sriov_net_support.clone())
            .set_virtualization_type(request.virtualization_type.clone())
            .set_ena_support(request.ena_support)
            .set_block_device_mappings(Some(to_sdk_mappings(request)))
            .send()
            .await
            .map_err(api_error)?;

        output
            .image_id()
            .map(str::to_string)
            .ok_or(ClientError::MissingField {
                operation: "RegisterImage",
                field: "ImageId",
            })
    }

    async fn describe_image(&self, image_id: &str) -> ClientResult<Option<Image>> {
        let result = self
            .client
            .describe_images()
            .image_ids(image_id)
            .send()
            .await;

        match result {
            Ok(output) => output.images().first().map(from_sdk_image).transpose(),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .and_then(|e| e.code())
                    .is_some_and(|code| NOT_FOUND_CODES.contains(&code));
                if not_found {
                    Ok(None)
                } else {
                    Err(api_error(err))
                }
            }
        }
    }

    async fn modify_description(&self, image_id: &str, description: &str) -> ClientResult<()> {
        self.client
            .modify_image_attribute()
            .image_id(image_id)
            .description(AttributeValue::builder().value(description).build())
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_tags(
        &self,
        image_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> ClientResult<()> {
        let mut request = self.client.create_tags().resources(image_id);
        for (key, value) in tags {
            request = request.tags(Tag::builder().key(key).value(value).build());
        }
        request.send().await.map_err(api_error)?;
        Ok(())
    }

    async fn delete_tags(&self, image_id: &str, keys: &[String]) -> ClientResult<()> {
        let mut request = self.client.delete_tags().resources(image_id);
        for key in keys {
            request = request.tags(Tag::builder().key(key).build());
        }
        request.send().await.map_err(api_error)?;
        Ok(())
    }

    async fn deregister_image(&self, image_id: &str) -> ClientResult<()> {
        self.client
            .deregister_image()
            .image_id(image_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> ClientResult<()> {
        self.client
            .delete_snapshot()
            .snapshot_id(snapshot_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}
