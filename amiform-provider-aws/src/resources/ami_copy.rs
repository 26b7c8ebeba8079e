//! Image copy creation
//!
//! Copying is the only operation specific to `ec2.ami_copy`. The new image
//! id is recorded before waiting so that a copy which never becomes
//! available can still be found and cleaned up.

use std::collections::HashMap;

use amiform_core::provider::{ProviderError, ProviderResult};
use amiform_core::resource::{Resource, ResourceId, State};

use super::AmiVariant;
use crate::AwsProvider;
use crate::client::CopyImageRequest;
use crate::schemas::types::normalize_region;
use crate::waiter::wait_for_available;

/// Validated inputs of an image copy
#[derive(Debug, Clone, PartialEq)]
pub struct AmiCopyConfig {
    pub name: String,
    pub description: String,
    pub source_ami_id: String,
    pub source_ami_region: String,
    pub encrypted: bool,
    pub kms_key_id: Option<String>,
}

impl AmiCopyConfig {
    pub fn from_resource(resource: &Resource) -> ProviderResult<Self> {
        let required = |key: &str| {
            resource
                .get_str(key)
                .map(str::to_string)
                .ok_or_else(|| {
                    ProviderError::new(format!("Missing required attribute '{}'", key))
                        .for_resource(resource.id.clone())
                })
        };

        Ok(Self {
            name: required("name")?,
            description: resource
                .get_str("description")
                .unwrap_or_default()
                .to_string(),
            source_ami_id: required("source_ami_id")?,
            source_ami_region: normalize_region(&required("source_ami_region")?),
            encrypted: resource.get_bool("encrypted").unwrap_or(false),
            kms_key_id: resource.get_str("kms_key_id").map(str::to_string),
        })
    }

    pub fn copy_request(&self) -> CopyImageRequest {
        CopyImageRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            source_image_id: self.source_ami_id.clone(),
            source_region: self.source_ami_region.clone(),
            encrypted: self.encrypted,
            kms_key_id: self.kms_key_id.clone(),
        }
    }

    /// State of a copy that has been started but not confirmed available
    ///
    /// Tags are left out so that the follow-up update applies all of them.
    pub fn started_state(&self, id: ResourceId, image_id: &str) -> State {
        let mut state = State::existing(id, HashMap::new()).with_identifier(image_id);
        state.set_attribute("name", self.name.clone());
        state.set_attribute("description", self.description.clone());
        state.set_attribute("source_ami_id", self.source_ami_id.clone());
        state.set_attribute("source_ami_region", self.source_ami_region.clone());
        state.set_attribute("encrypted", self.encrypted);
        if let Some(kms_key_id) = &self.kms_key_id {
            state.set_attribute("kms_key_id", kms_key_id.clone());
        }
        state.set_attribute("manage_ebs_snapshots", true);
        state
    }
}

impl AwsProvider {
    /// Copy an image into this provider's region
    ///
    /// Copy errors are returned as reported, without partial state. Once the
    /// copy exists, any later failure carries the started state, identifier
    /// included.
    pub(crate) async fn create_ami_copy(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let config = AmiCopyConfig::from_resource(resource)?;

        log::info!(
            "Copying {} from {} into {} as {}",
            config.source_ami_id,
            config.source_ami_region,
            self.region,
            config.name
        );
        let image_id = self
            .client
            .copy_image(&config.copy_request())
            .await
            .map_err(|e| ProviderError::from(e).for_resource(id.clone()))?;

        let started = config.started_state(id.clone(), &image_id);
        log::info!("Started copy {} for {}", image_id, id);

        if let Err(e) =
            wait_for_available(self.client.as_ref(), &image_id, self.timeouts.create, self.wait)
                .await
        {
            return Err(ProviderError::from(e)
                .for_resource(id.clone())
                .with_partial_state(started));
        }

        match self
            .update_image(AmiVariant::Copied, id, &image_id, &started, resource)
            .await
        {
            Ok(state) => Ok(state),
            Err(e) => Err(e.with_partial_state(started)),
        }
    }
}
