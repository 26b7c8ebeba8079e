//! Shared image handlers
//!
//! Read, update and delete for every image resource, plus creation of a
//! registered `ec2.ami`.

use std::collections::HashMap;

use amiform_core::provider::{ProviderError, ProviderResult};
use amiform_core::resource::{Resource, ResourceId, State, Value};

use super::AmiVariant;
use crate::AwsProvider;
use crate::client::RegisterImageRequest;
use crate::image::{EbsBlockDevice, EphemeralBlockDevice, Image, ImageState};
use crate::tags::{diff_tags, tags_from_attributes, tags_to_value};
use crate::waiter::{wait_for_available, wait_for_destroy};

/// Inputs of a copy that the image itself does not report
const COPY_INPUTS: &[&str] = &[
    "source_ami_id",
    "source_ami_region",
    "encrypted",
    "kms_key_id",
];

/// Map a described image onto resource attributes
///
/// `known` supplies the copy inputs for `ec2.ami_copy`.
pub fn image_attributes(
    image: &Image,
    variant: AmiVariant,
    known: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("name".to_string(), Value::String(image.name.clone()));
    attrs.insert(
        "description".to_string(),
        Value::String(image.description.clone().unwrap_or_default()),
    );

    let optional = [
        ("architecture", &image.architecture),
        ("image_location", &image.image_location),
        ("kernel_id", &image.kernel_id),
        ("ramdisk_id", &image.ramdisk_id),
        ("root_device_name", &image.root_device_name),
        ("sriov_net_support", &image.sriov_net_support),
        ("virtualization_type", &image.virtualization_type),
    ];
    for (key, value) in optional {
        if let Some(v) = value {
            attrs.insert(key.to_string(), Value::String(v.clone()));
        }
    }
    if let Some(snapshot) = image.root_snapshot_id() {
        attrs.insert(
            "root_snapshot_id".to_string(),
            Value::String(snapshot.to_string()),
        );
    }

    attrs.insert("ena_support".to_string(), Value::Bool(image.ena_support));
    attrs.insert(
        "ebs_block_device".to_string(),
        Value::List(
            image
                .ebs_block_devices
                .iter()
                .map(EbsBlockDevice::to_value)
                .collect(),
        ),
    );
    attrs.insert(
        "ephemeral_block_device".to_string(),
        Value::List(
            image
                .ephemeral_block_devices
                .iter()
                .map(EphemeralBlockDevice::to_value)
                .collect(),
        ),
    );
    attrs.insert("tags".to_string(), tags_to_value(&image.tags));
    attrs.insert(
        "manage_ebs_snapshots".to_string(),
        Value::Bool(variant.manages_snapshots()),
    );

    if variant == AmiVariant::Copied {
        for key in COPY_INPUTS {
            if let Some(value) = known.get(*key) {
                attrs.insert(key.to_string(), value.clone());
            }
        }
    }

    attrs
}

fn optional_str(resource: &Resource, key: &str) -> Option<String> {
    resource.get_str(key).map(str::to_string)
}

fn block_list<'a>(resource: &'a Resource, key: &str) -> &'a [Value] {
    resource
        .attributes
        .get(key)
        .and_then(Value::as_list)
        .unwrap_or_default()
}

/// Build a registration request from an `ec2.ami` resource
pub fn register_request(resource: &Resource) -> ProviderResult<RegisterImageRequest> {
    let name = resource
        .get_str("name")
        .ok_or_else(|| ProviderError::new("Missing required attribute 'name'"))?;

    let ebs_block_devices = block_list(resource, "ebs_block_device")
        .iter()
        .enumerate()
        .map(|(i, v)| {
            EbsBlockDevice::from_value(v).ok_or_else(|| {
                ProviderError::new(format!("ebs_block_device[{}] requires device_name", i))
            })
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    let ephemeral_block_devices = block_list(resource, "ephemeral_block_device")
        .iter()
        .enumerate()
        .map(|(i, v)| {
            EphemeralBlockDevice::from_value(v).ok_or_else(|| {
                ProviderError::new(format!(
                    "ephemeral_block_device[{}] requires device_name and virtual_name",
                    i
                ))
            })
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    Ok(RegisterImageRequest {
        name: name.to_string(),
        description: optional_str(resource, "description"),
        architecture: optional_str(resource, "architecture"),
        image_location: optional_str(resource, "image_location"),
        kernel_id: optional_str(resource, "kernel_id"),
        ramdisk_id: optional_str(resource, "ramdisk_id"),
        root_device_name: optional_str(resource, "root_device_name"),
        sriov_net_support: optional_str(resource, "sriov_net_support"),
        virtualization_type: optional_str(resource, "virtualization_type"),
        ena_support: resource.get_bool("ena_support"),
        ebs_block_devices,
        ephemeral_block_devices,
    })
}

impl AwsProvider {
    /// Read an image resource
    ///
    /// A pending image is waited on before it is read; a missing or
    /// deregistered one is reported as not found.
    pub(crate) async fn read_image(
        &self,
        variant: AmiVariant,
        id: &ResourceId,
        image_id: &str,
        known: &HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let described = self
            .client
            .describe_image(image_id)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        let image = match described {
            None => {
                log::info!("{} ({}) no longer exists", id, image_id);
                return Ok(State::not_found(id.clone()));
            }
            Some(image) if image.state == ImageState::Deregistered => {
                log::info!("{} ({}) is deregistered", id, image_id);
                return Ok(State::not_found(id.clone()));
            }
            Some(image) if image.state == ImageState::Pending => {
                wait_for_available(self.client.as_ref(), image_id, self.timeouts.create, self.wait)
                    .await
                    .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?
            }
            Some(image) => image,
        };

        Ok(
            State::existing(id.clone(), image_attributes(&image, variant, known))
                .with_identifier(image_id),
        )
    }

    /// Reconcile description and tags, then read the image back
    pub(crate) async fn update_image(
        &self,
        variant: AmiVariant,
        id: &ResourceId,
        image_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let description = to.get_str("description").unwrap_or_default();
        if from.get_str("description").unwrap_or_default() != description {
            log::info!("Updating description of {} ({})", id, image_id);
            self.client
                .modify_description(image_id, description)
                .await
                .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        }

        let delta = diff_tags(
            &tags_from_attributes(&from.attributes),
            &tags_from_attributes(&to.attributes),
        );
        if !delta.remove.is_empty() {
            log::debug!("Removing tags {:?} from {}", delta.remove, image_id);
            self.client
                .delete_tags(image_id, &delta.remove)
                .await
                .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        }
        if !delta.create.is_empty() {
            log::debug!("Setting tags {:?} on {}", delta.create, image_id);
            self.client
                .create_tags(image_id, &delta.create)
                .await
                .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        }

        self.read_image(variant, id, image_id, &to.attributes).await
    }

    /// Deregister an image, deleting its snapshots when it owns them
    pub(crate) async fn delete_image(
        &self,
        variant: AmiVariant,
        id: &ResourceId,
        image_id: &str,
        from: &State,
    ) -> ProviderResult<()> {
        let described = self
            .client
            .describe_image(image_id)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        let Some(image) = described.filter(|i| i.state != ImageState::Deregistered) else {
            log::warn!("{} ({}) is already gone", id, image_id);
            return Ok(());
        };

        let owns_snapshots = from
            .get_bool("manage_ebs_snapshots")
            .unwrap_or(variant.manages_snapshots());
        let snapshots = if owns_snapshots {
            image.snapshot_ids()
        } else {
            Vec::new()
        };

        log::info!("Deregistering {} ({})", id, image_id);
        self.client
            .deregister_image(image_id)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        // Once deregistered the image no longer lists its snapshots, so every
        // snapshot is attempted and each failure is named in the error.
        let mut failed = Vec::new();
        for snapshot_id in &snapshots {
            log::info!("Deleting snapshot {} of {}", snapshot_id, image_id);
            if let Err(e) = self.client.delete_snapshot(snapshot_id).await {
                log::warn!("Failed to delete snapshot {} of {}: {}", snapshot_id, image_id, e);
                failed.push(format!("{} ({})", snapshot_id, e));
            }
        }

        wait_for_destroy(self.client.as_ref(), image_id, self.timeouts.delete, self.wait)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::new(format!(
                "Deregistered {} but failed to delete snapshots: {}",
                image_id,
                failed.join(", ")
            ))
            .for_resource(id.clone()))
        }
    }

    /// Register an `ec2.ami` and wait for it to become available
    pub(crate) async fn register_ami(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let request = register_request(resource).map_err(|e| e.for_resource(id.clone()))?;

        let image_id = self
            .client
            .register_image(&request)
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;
        log::info!("Registered {} as {}", id, image_id);

        let mut partial = State::existing(id.clone(), HashMap::new()).with_identifier(&image_id);
        partial.set_attribute("name", request.name.clone());
        partial.set_attribute("description", request.description.clone().unwrap_or_default());
        partial.set_attribute("manage_ebs_snapshots", false);

        if let Err(e) =
            wait_for_available(self.client.as_ref(), &image_id, self.timeouts.create, self.wait)
                .await
        {
            return Err(ProviderError::from(e)
                .for_resource(id.clone())
                .with_partial_state(partial));
        }

        match self
            .update_image(AmiVariant::Registered, id, &image_id, &partial, resource)
            .await
        {
            Ok(state) => Ok(state),
            Err(e) => Err(e.with_partial_state(partial)),
        }
    }
}
