//! amiform AWS Provider
//!
//! Machine image resources (`ec2.ami`, `ec2.ami_copy`) backed by EC2.

pub mod client;
pub mod config;
pub mod ec2;
pub mod image;
pub mod resources;
pub mod schemas;
pub mod tags;
pub mod waiter;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use amiform_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use amiform_core::resource::{Resource, ResourceId, State};

use crate::client::ImageClient;
use crate::config::{ConfigError, ProviderConfig, Timeouts};
use crate::ec2::Ec2ImageClient;
use crate::resources::{AmiCopyType, AmiType, AmiVariant};
use crate::waiter::WaitConfig;

/// AWS Provider
pub struct AwsProvider {
    client: Arc<dyn ImageClient>,
    region: String,
    timeouts: Timeouts,
    wait: WaitConfig,
}

impl AwsProvider {
    /// Create a new AWS Provider for the configured region
    pub async fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let region = config.region()?;
        let timeouts = config.timeouts()?;
        let client = Ec2ImageClient::new(&region, config.profile.as_deref()).await;
        Ok(Self::with_client(Arc::new(client), region, timeouts))
    }

    /// Create with a specific image client (for testing)
    pub fn with_client(
        client: Arc<dyn ImageClient>,
        region: impl Into<String>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            client,
            region: region.into(),
            timeouts,
            wait: WaitConfig::default(),
        }
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }
}

fn variant_for(id: &ResourceId) -> ProviderResult<AmiVariant> {
    AmiVariant::from_resource_type(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![Box::new(AmiType), Box::new(AmiCopyType)]
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        known: &State,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let known = known.attributes.clone();
        Box::pin(async move {
            let variant = variant_for(&id)?;
            self.read_image(variant, &id, &identifier, &known).await
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match variant_for(&resource.id)? {
                AmiVariant::Registered => self.register_ami(&resource).await,
                AmiVariant::Copied => self.create_ami_copy(&resource).await,
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            let variant = variant_for(&id)?;
            self.update_image(variant, &id, &identifier, &from, &to)
                .await
        })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        Box::pin(async move {
            let variant = variant_for(&id)?;
            self.delete_image(variant, &id, &identifier, &from).await
        })
    }
}
