//! Machine image model
//!
//! Provider-side view of an AMI, independent of the SDK types so that the
//! shared handlers can be exercised against a fake client.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use amiform_core::resource::Value;

/// Lifecycle state reported for an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    Pending,
    Available,
    Invalid,
    Deregistered,
    Transient,
    Failed,
    Error,
    Disabled,
    Unknown(String),
}

impl ImageState {
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => ImageState::Pending,
            "available" => ImageState::Available,
            "invalid" => ImageState::Invalid,
            "deregistered" => ImageState::Deregistered,
            "transient" => ImageState::Transient,
            "failed" => ImageState::Failed,
            "error" => ImageState::Error,
            "disabled" => ImageState::Disabled,
            other => ImageState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ImageState::Pending => "pending",
            ImageState::Available => "available",
            ImageState::Invalid => "invalid",
            ImageState::Deregistered => "deregistered",
            ImageState::Transient => "transient",
            ImageState::Failed => "failed",
            ImageState::Error => "error",
            ImageState::Disabled => "disabled",
            ImageState::Unknown(s) => s,
        }
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EBS volume mapped into an image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EbsBlockDevice {
    pub device_name: String,
    pub snapshot_id: Option<String>,
    pub volume_size: Option<i64>,
    pub volume_type: Option<String>,
    pub iops: Option<i64>,
    pub encrypted: bool,
    pub delete_on_termination: bool,
}

impl EbsBlockDevice {
    pub fn to_value(&self) -> Value {
        let mut m = HashMap::new();
        m.insert(
            "device_name".to_string(),
            Value::String(self.device_name.clone()),
        );
        m.insert(
            "snapshot_id".to_string(),
            Value::String(self.snapshot_id.clone().unwrap_or_default()),
        );
        m.insert("encrypted".to_string(), Value::Bool(self.encrypted));
        m.insert(
            "delete_on_termination".to_string(),
            Value::Bool(self.delete_on_termination),
        );
        if let Some(size) = self.volume_size {
            m.insert("volume_size".to_string(), Value::Int(size));
        }
        if let Some(volume_type) = &self.volume_type {
            m.insert("volume_type".to_string(), Value::String(volume_type.clone()));
        }
        if let Some(iops) = self.iops {
            m.insert("iops".to_string(), Value::Int(iops));
        }
        Value::Map(m)
    }

    /// Build from a manifest block; `None` when `device_name` is missing
    pub fn from_value(value: &Value) -> Option<Self> {
        let m = value.as_map()?;
        let text = |key: &str| m.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            device_name: text("device_name")?,
            snapshot_id: text("snapshot_id").filter(|s| !s.is_empty()),
            volume_size: m.get("volume_size").and_then(Value::as_int),
            volume_type: text("volume_type"),
            iops: m.get("iops").and_then(Value::as_int),
            encrypted: m.get("encrypted").and_then(Value::as_bool).unwrap_or(false),
            delete_on_termination: m
                .get("delete_on_termination")
                .and_then(Value::as_bool)
                .unwrap_or(true),
        })
    }
}

/// Instance-store volume mapped into an image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EphemeralBlockDevice {
    pub device_name: String,
    pub virtual_name: String,
}

impl EphemeralBlockDevice {
    pub fn to_value(&self) -> Value {
        let mut m = HashMap::new();
        m.insert(
            "device_name".to_string(),
            Value::String(self.device_name.clone()),
        );
        m.insert(
            "virtual_name".to_string(),
            Value::String(self.virtual_name.clone()),
        );
        Value::Map(m)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let m = value.as_map()?;
        Some(Self {
            device_name: m.get("device_name")?.as_str()?.to_string(),
            virtual_name: m.get("virtual_name")?.as_str()?.to_string(),
        })
    }
}

/// An AMI as described by the cloud
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub image_id: String,
    pub name: String,
    pub description: Option<String>,
    pub state: ImageState,
    pub state_reason: Option<String>,
    pub architecture: Option<String>,
    pub image_location: Option<String>,
    pub kernel_id: Option<String>,
    pub ramdisk_id: Option<String>,
    pub root_device_name: Option<String>,
    pub virtualization_type: Option<String>,
    pub sriov_net_support: Option<String>,
    pub ena_support: bool,
    pub ebs_block_devices: Vec<EbsBlockDevice>,
    pub ephemeral_block_devices: Vec<EphemeralBlockDevice>,
    pub tags: BTreeMap<String, String>,
}

impl Image {
    pub fn new(image_id: impl Into<String>, name: impl Into<String>, state: ImageState) -> Self {
        Self {
            image_id: image_id.into(),
            name: name.into(),
            description: None,
            state,
            state_reason: None,
            architecture: None,
            image_location: None,
            kernel_id: None,
            ramdisk_id: None,
            root_device_name: None,
            virtualization_type: None,
            sriov_net_support: None,
            ena_support: false,
            ebs_block_devices: Vec::new(),
            ephemeral_block_devices: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Snapshot backing the root device, if the root device is EBS
    pub fn root_snapshot_id(&self) -> Option<&str> {
        let root = self.root_device_name.as_deref()?;
        self.ebs_block_devices
            .iter()
            .find(|d| d.device_name == root)
            .and_then(|d| d.snapshot_id.as_deref())
    }

    /// All EBS snapshots referenced by the image
    pub fn snapshot_ids(&self) -> Vec<String> {
        self.ebs_block_devices
            .iter()
            .filter_map(|d| d.snapshot_id.clone())
            .collect()
    }
}
