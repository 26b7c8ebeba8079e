//! Tag maps and tag deltas

use std::collections::{BTreeMap, HashMap};

use amiform_core::resource::Value;

/// Tag changes needed to go from one tag map to another
#[derive(Debug, Default, PartialEq)]
pub struct TagDelta {
    /// Keys to remove: deleted keys and keys whose value changed
    pub remove: Vec<String>,
    /// Tags to create: new keys and keys whose value changed
    pub create: BTreeMap<String, String>,
}

impl TagDelta {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.create.is_empty()
    }
}

pub fn diff_tags(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> TagDelta {
    let remove = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    let create = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    TagDelta { remove, create }
}

/// Read the `tags` attribute; non-string values are skipped
pub fn tags_from_attributes(attributes: &HashMap<String, Value>) -> BTreeMap<String, String> {
    attributes
        .get("tags")
        .and_then(Value::as_map)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub fn tags_to_value(tags: &BTreeMap<String, String>) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
