//! Image state waiters
//!
//! Poll an image until it reaches the state an operation is waiting for,
//! bounded by the operation's timeout.

use std::time::Duration;

use amiform_core::provider::ProviderError;
use thiserror::Error;

use crate::client::{ClientError, ImageClient};
use crate::image::{Image, ImageState};

/// Polling behavior shared by the waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    /// Consecutive polls an image may be missing before giving up
    pub not_found_checks: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            not_found_checks: 20,
        }
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timeout after {timeout:?} waiting for {image_id} to become {target}")]
    Timeout {
        image_id: String,
        target: &'static str,
        timeout: Duration,
    },

    #[error("{image_id} entered state '{state}' while waiting to become available{}", reason_suffix(.reason))]
    UnexpectedState {
        image_id: String,
        state: ImageState,
        reason: Option<String>,
    },

    #[error("{image_id} not found after {checks} checks")]
    NotFound { image_id: String, checks: u32 },

    #[error(transparent)]
    Client(#[from] ClientError),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

impl From<WaitError> for ProviderError {
    fn from(err: WaitError) -> Self {
        ProviderError::new(err.to_string()).with_cause(err)
    }
}

/// Wait until the image is `available`, returning it
pub async fn wait_for_available(
    client: &dyn ImageClient,
    image_id: &str,
    timeout: Duration,
    config: WaitConfig,
) -> Result<Image, WaitError> {
    log::info!("Waiting for {} to become available", image_id);

    tokio::time::timeout(timeout, poll_until_available(client, image_id, config))
        .await
        .unwrap_or_else(|_| {
            Err(WaitError::Timeout {
                image_id: image_id.to_string(),
                target: "available",
                timeout,
            })
        })
}

async fn poll_until_available(
    client: &dyn ImageClient,
    image_id: &str,
    config: WaitConfig,
) -> Result<Image, WaitError> {
    let mut missing = 0;
    loop {
        match client.describe_image(image_id).await? {
            Some(image) if image.state == ImageState::Available => return Ok(image),
            Some(image) if image.state == ImageState::Pending => {
                missing = 0;
                log::debug!("{} is still pending", image_id);
            }
            Some(image) => {
                return Err(WaitError::UnexpectedState {
                    image_id: image_id.to_string(),
                    state: image.state,
                    reason: image.state_reason,
                });
            }
            None => {
                missing += 1;
                if missing >= config.not_found_checks {
                    return Err(WaitError::NotFound {
                        image_id: image_id.to_string(),
                        checks: missing,
                    });
                }
                log::debug!("{} not visible yet ({} checks)", image_id, missing);
            }
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

/// Wait until the image no longer exists or is `deregistered`
pub async fn wait_for_destroy(
    client: &dyn ImageClient,
    image_id: &str,
    timeout: Duration,
    config: WaitConfig,
) -> Result<(), WaitError> {
    tokio::time::timeout(timeout, poll_until_destroyed(client, image_id, config))
        .await
        .unwrap_or_else(|_| {
            Err(WaitError::Timeout {
                image_id: image_id.to_string(),
                target: "deregistered",
                timeout,
            })
        })
}

async fn poll_until_destroyed(
    client: &dyn ImageClient,
    image_id: &str,
    config: WaitConfig,
) -> Result<(), WaitError> {
    loop {
        match client.describe_image(image_id).await? {
            None => return Ok(()),
            Some(image) if image.state == ImageState::Deregistered => return Ok(()),
            Some(image) => log::debug!("{} is {}", image_id, image.state),
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
