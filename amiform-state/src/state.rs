//! State file structures for persisting managed images

use std::collections::HashMap;

use amiform_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The state file persisted by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of amiform that last wrote this state
    pub tool_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Prepare for a write: bump the serial and stamp the tool version
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.tool_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == id.resource_type && r.name == id.name)
    }

    /// Add or replace the entry for a resource, keeping entries sorted
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => {
                self.resources.push(resource);
                self.resources.sort_by(|a, b| {
                    (&a.resource_type, &a.name).cmp(&(&b.resource_type, &b.name))
                });
            }
        }
    }

    pub fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == id.resource_type && r.name == id.name)?;
        Some(self.resources.remove(pos))
    }

    /// Record the outcome of an operation
    ///
    /// A state that no longer exists drops the entry.
    pub fn record(&mut self, state: &State, provider: &str) {
        if state.exists {
            self.upsert_resource(ResourceState::from_state(state, provider));
        } else {
            self.remove_resource(&state.id);
        }
    }

    /// All recorded resources as core states, keyed by id
    pub fn current_states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| {
                let state = r.to_state();
                (state.id.clone(), state)
            })
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "ec2.ami_copy")
    pub resource_type: String,
    pub name: String,
    /// Provider name (e.g., "aws")
    pub provider: String,
    /// Cloud-side identifier (the AMI id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
    /// Creation stopped half-way; the next apply replaces the resource
    #[serde(default)]
    pub tainted: bool,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: HashMap::new(),
            tainted: false,
        }
    }

    pub fn from_state(state: &State, provider: impl Into<String>) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
            tainted: state.tainted,
        }
    }

    /// Convert back into a core state; attributes that cannot be represented
    /// (JSON null or floats) are dropped
    pub fn to_state(&self) -> State {
        let id = ResourceId::new(&self.resource_type, &self.name);
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
            .collect();

        let mut state = State::existing(id, attributes).with_tainted(self.tainted);
        state.identifier = self.identifier.clone();
        state
    }
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

pub fn json_to_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            Some(Value::List(items.iter().filter_map(json_to_value).collect()))
        }
        serde_json::Value::Object(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}
