//! In-memory image client for tests

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::AwsProvider;
use crate::client::{
    ClientError, ClientResult, CopyImageRequest, ImageClient, RegisterImageRequest,
};
use crate::config::Timeouts;
use crate::image::{EbsBlockDevice, Image, ImageState};
use crate::waiter::WaitConfig;

/// Provider over the fake with millisecond polling and short timeouts
pub fn test_provider(client: &Arc<FakeImageClient>) -> AwsProvider {
    let timeouts = Timeouts {
        create: Duration::from_millis(500),
        delete: Duration::from_millis(500),
    };
    AwsProvider::with_client(client.clone(), "us-east-1", timeouts).with_wait_config(WaitConfig {
        poll_interval: Duration::from_millis(1),
        not_found_checks: 3,
    })
}

/// A call received by the fake, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CopyImage(CopyImageRequest),
    RegisterImage(RegisterImageRequest),
    DescribeImage(String),
    ModifyDescription { image_id: String, description: String },
    CreateTags { image_id: String, tags: BTreeMap<String, String> },
    DeleteTags { image_id: String, keys: Vec<String> },
    DeregisterImage(String),
    DeleteSnapshot(String),
}

/// Pending describes left before an image settles into `state`
struct Transition {
    remaining: u32,
    state: ImageState,
    reason: Option<String>,
}

#[derive(Default)]
struct Inner {
    images: HashMap<String, Image>,
    transitions: HashMap<String, Transition>,
    hidden_polls: HashMap<String, u32>,
    next_image_id: Option<String>,
    counter: u32,
    copy_error: Option<ClientError>,
    copy_outcome: Option<(ImageState, Option<String>)>,
    create_tags_error: Option<ClientError>,
    snapshot_errors: HashMap<String, ClientError>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeImageClient {
    inner: Mutex<Inner>,
}

impl FakeImageClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_image(&self, image: Image) {
        let mut inner = self.inner.lock().unwrap();
        inner.images.insert(image.image_id.clone(), image);
    }

    /// Report `pending` for the next `polls` describes, then `available`
    pub fn set_pending_polls(&self, image_id: &str, polls: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.transitions.insert(
            image_id.to_string(),
            Transition {
                remaining: polls,
                state: ImageState::Available,
                reason: None,
            },
        );
    }

    /// Report the image as missing for the next `polls` describes
    pub fn set_hidden_polls(&self, image_id: &str, polls: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.hidden_polls.insert(image_id.to_string(), polls);
    }

    pub fn set_next_image_id(&self, image_id: &str) {
        self.inner.lock().unwrap().next_image_id = Some(image_id.to_string());
    }

    pub fn fail_copy(&self, err: ClientError) {
        self.inner.lock().unwrap().copy_error = Some(err);
    }

    /// State a copied image settles into after one pending poll
    pub fn settle_copies_as(&self, state: ImageState, reason: Option<&str>) {
        self.inner.lock().unwrap().copy_outcome = Some((state, reason.map(str::to_string)));
    }

    pub fn fail_create_tags(&self, err: ClientError) {
        self.inner.lock().unwrap().create_tags_error = Some(err);
    }

    pub fn fail_delete_snapshot(&self, snapshot_id: &str, err: ClientError) {
        self.inner
            .lock()
            .unwrap()
            .snapshot_errors
            .insert(snapshot_id.to_string(), err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn describe_count(&self, image_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::DescribeImage(id) if id == image_id))
            .count()
    }

    pub fn deleted_snapshots(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteSnapshot(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn image(&self, image_id: &str) -> Option<Image> {
        self.inner.lock().unwrap().images.get(image_id).cloned()
    }

    fn allocate_id(inner: &mut Inner) -> String {
        inner.next_image_id.take().unwrap_or_else(|| {
            inner.counter += 1;
            format!("ami-{:08x}", inner.counter)
        })
    }
}

#[async_trait]
impl ImageClient for FakeImageClient {
    async fn copy_image(&self, request: &CopyImageRequest) -> ClientResult<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::CopyImage(request.clone()));
        if let Some(err) = inner.copy_error.clone() {
            return Err(err);
        }

        let image_id = Self::allocate_id(&mut inner);
        let mut image = Image::new(&image_id, &request.name, ImageState::Pending);
        image.description = Some(request.description.clone());
        image.architecture = Some("x86_64".to_string());
        image.virtualization_type = Some("hvm".to_string());
        image.root_device_name = Some("/dev/xvda".to_string());
        image.ena_support = true;
        image.ebs_block_devices = vec![EbsBlockDevice {
            device_name: "/dev/xvda".to_string(),
            snapshot_id: Some(format!("snap-{}", &image_id[4..])),
            volume_size: Some(8),
            volume_type: Some("gp3".to_string()),
            iops: None,
            encrypted: request.encrypted,
            delete_on_termination: true,
        }];

        let (state, reason) = inner
            .copy_outcome
            .clone()
            .unwrap_or((ImageState::Available, None));
        inner
            .transitions
            .entry(image_id.clone())
            .or_insert(Transition {
                remaining: 1,
                state,
                reason,
            });
        inner.images.insert(image_id.clone(), image);
        Ok(image_id)
    }

    async fn register_image(&self, request: &RegisterImageRequest) -> ClientResult<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::RegisterImage(request.clone()));

        let image_id = Self::allocate_id(&mut inner);
        let mut image = Image::new(&image_id, &request.name, ImageState::Available);
        image.description = request.description.clone();
        image.architecture = request.architecture.clone();
        image.image_location = request.image_location.clone();
        image.kernel_id = request.kernel_id.clone();
        image.ramdisk_id = request.ramdisk_id.clone();
        image.root_device_name = request.root_device_name.clone();
        image.sriov_net_support = request.sriov_net_support.clone();
        image.virtualization_type = request.virtualization_type.clone();
        image.ena_support = request.ena_support.unwrap_or(false);
        image.ebs_block_devices = request.ebs_block_devices.clone();
        image.ephemeral_block_devices = request.ephemeral_block_devices.clone();
        inner.images.insert(image_id.clone(), image);
        Ok(image_id)
    }

    async fn describe_image(&self, image_id: &str) -> ClientResult<Option<Image>> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.calls.push(Call::DescribeImage(image_id.to_string()));

        if let Some(hidden) = inner.hidden_polls.get_mut(image_id)
            && *hidden > 0
        {
            *hidden -= 1;
            return Ok(None);
        }

        if let Some(transition) = inner.transitions.get_mut(image_id) {
            if transition.remaining > 0 {
                transition.remaining -= 1;
                return Ok(inner.images.get(image_id).cloned().map(|mut image| {
                    image.state = ImageState::Pending;
                    image
                }));
            }
            if let Some(transition) = inner.transitions.remove(image_id)
                && let Some(image) = inner.images.get_mut(image_id)
            {
                image.state = transition.state;
                image.state_reason = transition.reason;
            }
        }

        Ok(inner.images.get(image_id).cloned())
    }

    async fn modify_description(&self, image_id: &str, description: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::ModifyDescription {
            image_id: image_id.to_string(),
            description: description.to_string(),
        });
        if let Some(image) = inner.images.get_mut(image_id) {
            image.description = Some(description.to_string());
        }
        Ok(())
    }

    async fn create_tags(
        &self,
        image_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::CreateTags {
            image_id: image_id.to_string(),
            tags: tags.clone(),
        });
        if let Some(err) = inner.create_tags_error.clone() {
            return Err(err);
        }
        if let Some(image) = inner.images.get_mut(image_id) {
            image.tags.extend(tags.clone());
        }
        Ok(())
    }

    async fn delete_tags(&self, image_id: &str, keys: &[String]) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::DeleteTags {
            image_id: image_id.to_string(),
            keys: keys.to_vec(),
        });
        if let Some(image) = inner.images.get_mut(image_id) {
            for key in keys {
                image.tags.remove(key);
            }
        }
        Ok(())
    }

    async fn deregister_image(&self, image_id: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(Call::DeregisterImage(image_id.to_string()));
        match inner.images.remove(image_id) {
            Some(_) => Ok(()),
            None => Err(ClientError::api(
                "InvalidAMIID.NotFound",
                format!("The image id '[{}]' does not exist", image_id),
            )),
        }
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(Call::DeleteSnapshot(snapshot_id.to_string()));
        match inner.snapshot_errors.get(snapshot_id) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
