//! Manifest loading
//!
//! A manifest is a JSON document with a `provider` block, an optional
//! `backend` block and the list of image resources to manage.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use amiform_core::resource::{Resource, ResourceId, Value};
use amiform_core::schema::ResourceSchema;
use amiform_provider_aws::config::ProviderConfig;
use amiform_state::BackendConfig;
use amiform_state::state::json_to_value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub resources: Vec<ResourceBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceBlock {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))
    }

    /// Desired resources in manifest order
    pub fn resources(&self) -> Result<Vec<Resource>, String> {
        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(self.resources.len());

        for block in &self.resources {
            let id = ResourceId::new(&block.resource_type, &block.name);
            if !seen.insert(id.clone()) {
                return Err(format!("Duplicate resource {}", id));
            }

            let mut attributes = HashMap::new();
            for (key, json) in &block.attributes {
                let value = json_to_value(json).ok_or_else(|| {
                    format!("{}: unsupported value for '{}': {}", id, key, json)
                })?;
                attributes.insert(key.clone(), value);
            }
            resources.push(Resource { id, attributes });
        }

        Ok(resources)
    }
}

/// Check provider settings and every resource against its schema
///
/// All problems are collected into one message, one per line.
pub fn validate(
    manifest: &Manifest,
    resources: &[Resource],
    schemas: &HashMap<String, ResourceSchema>,
) -> Result<(), String> {
    let mut all_errors = Vec::new();

    if let Err(e) = manifest.provider.validate() {
        all_errors.push(format!("provider: {}", e));
    }
    if manifest.backend.backend_type != "local" {
        all_errors.push(format!(
            "backend: unsupported type '{}'",
            manifest.backend.backend_type
        ));
    }

    for resource in resources {
        let Some(schema) = schemas.get(&resource.id.resource_type) else {
            all_errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            ));
            continue;
        };

        if let Err(errors) = schema.validate(&resource.attributes) {
            let mut messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            messages.sort();
            for message in messages {
                all_errors.push(format!("{}: {}", resource.id, message));
            }
        }

        // `encrypted` defaults to false
        if resource.attributes.contains_key("kms_key_id")
            && resource.attributes.get("encrypted") != Some(&Value::Bool(true))
        {
            all_errors.push(format!(
                "{}: kms_key_id requires encrypted = true",
                resource.id
            ));
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}
