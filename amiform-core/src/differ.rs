//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state declared in the manifest with the current state
//! fetched from the Provider, and generates the list of required Effects.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeType, BlockSchema, Presence, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with in-place differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists but a force-new attribute changed (or it is tainted)
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
        forced_by: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but not in desired state -> needs deletion
    Delete(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
///
/// With a schema, defaults are applied to the desired attributes, computed
/// attributes are ignored, keyed sets are compared element-by-key, and a
/// change to any force-new attribute turns the update into a replacement.
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    let desired = match schema {
        Some(schema) => Resource {
            id: desired.id.clone(),
            attributes: schema.with_defaults(&desired.attributes),
        },
        None => desired.clone(),
    };

    if !current.exists {
        return Diff::Create(desired);
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if current.tainted {
        return Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired,
            changed_attributes: changed,
            forced_by: Vec::new(),
        };
    }

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let forced_by: Vec<String> = match schema {
        Some(schema) => changed
            .iter()
            .filter(|name| schema.get(name).is_some_and(|a| a.is_force_new()))
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    if forced_by.is_empty() {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired,
            changed_attributes: changed,
        }
    } else {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired,
            changed_attributes: changed,
            forced_by,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        let attr = schema.and_then(|s| s.get(key));
        if attr.is_some_and(|a| !a.is_user_settable()) {
            continue;
        }

        let same = match (current.get(key), attr.map(|a| &a.attr_type)) {
            (Some(Value::List(cur)), Some(AttributeType::KeyedSet(block))) => match desired_value {
                Value::List(want) => keyed_set_matches(block, want, cur),
                _ => false,
            },
            (Some(current_value), _) => current_value == desired_value,
            (None, _) => false,
        };

        if !same {
            changed.push(key.clone());
        }
    }

    // An optional attribute dropped from the manifest is cleared. Attributes
    // the provider may fill in (optional + computed) are left alone.
    if let Some(schema) = schema {
        for (key, current_value) in current {
            if desired.contains_key(key) || key.starts_with('_') || is_empty(current_value) {
                continue;
            }
            let clearable = schema.get(key).is_some_and(|a| {
                matches!(a.presence, Presence::Optional | Presence::Required)
            });
            if clearable {
                changed.push(key.clone());
            }
        }
    }

    changed.sort();
    changed
}

/// Empty maps and lists read back the same as an absent attribute
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Map(m) => m.is_empty(),
        Value::List(items) => items.is_empty(),
        _ => false,
    }
}

/// Same element keys on both sides, and every field the desired element sets
/// matches the current element. Fields only the provider reports are ignored.
fn keyed_set_matches(block: &BlockSchema, want: &[Value], cur: &[Value]) -> bool {
    let want = block.index(want);
    let cur = block.index(cur);
    if want.len() != cur.len() {
        return false;
    }

    want.iter().all(|(key, desired)| {
        let (Some(desired), Some(current)) =
            (desired.as_map(), cur.get(key).and_then(|v| v.as_map()))
        else {
            return false;
        };
        desired
            .iter()
            .all(|(field, value)| current.get(field) == Some(value))
    })
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Resources present in `current_states` but missing from `desired` are
/// scheduled for deletion after all other effects.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));

        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update { id, from, to, .. } => plan.add(Effect::Update { id, from, to }),
            Diff::Replace {
                id,
                from,
                to,
                forced_by,
                ..
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                forced_by,
            }),
            Diff::NoChange(_) => {}
            Diff::Delete(id) => {
                let from = State::not_found(id.clone());
                plan.add(Effect::Delete { id, from })
            }
        }
    }

    let wanted: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !wanted.contains(&s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));

    for state in orphans {
        plan.add(Effect::Delete {
            id: state.id.clone(),
            from: state.clone(),
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSchema, BlockSchema};

    fn copy_schema() -> ResourceSchema {
        let ephemeral = BlockSchema::new("EphemeralBlockDevice")
            .attribute(AttributeSchema::new("device_name", AttributeType::String).computed())
            .attribute(AttributeSchema::new("virtual_name", AttributeType::String).computed())
            .keyed_by(&["device_name", "virtual_name"]);

        ResourceSchema::new("ec2.ami_copy")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("source_ami_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("encrypted", AttributeType::Bool)
                    .force_new()
                    .with_default(Value::Bool(false)),
            )
            .attribute(
                AttributeSchema::new("description", AttributeType::String)
                    .with_default(Value::String(String::new())),
            )
            .attribute(AttributeSchema::new(
                "tags",
                AttributeType::Map(Box::new(AttributeType::String)),
            ))
            .attribute(AttributeSchema::new("architecture", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new(
                    "ephemeral_block_device",
                    AttributeType::KeyedSet(Box::new(ephemeral)),
                )
                .optional_computed()
                .force_new(),
            )
    }

    fn desired() -> Resource {
        Resource::new("ec2.ami_copy", "copy")
            .with_attribute("name", "copy-1")
            .with_attribute("source_ami_id", "ami-abc123")
    }

    fn current(attrs: &[(&str, Value)]) -> State {
        let attributes = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        State::existing(ResourceId::new("ec2.ami_copy", "copy"), attributes)
            .with_identifier("ami-def456")
    }

    fn matching_current() -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::from("copy-1")),
            ("source_ami_id", Value::from("ami-abc123")),
            ("encrypted", Value::Bool(false)),
            ("description", Value::from("")),
            ("architecture", Value::from("x86_64")),
        ]
    }

    fn ephemeral(device: &str, virtual_name: &str) -> Value {
        let mut m = HashMap::new();
        m.insert("device_name".to_string(), Value::from(device));
        m.insert("virtual_name".to_string(), Value::from(virtual_name));
        Value::Map(m)
    }

    #[test]
    fn diff_create_when_not_exists() {
        let current = State::not_found(ResourceId::new("ec2.ami_copy", "copy"));
        let result = diff(&desired(), &current, Some(&copy_schema()));
        match result {
            Diff::Create(r) => assert_eq!(r.attributes.get("encrypted"), Some(&Value::Bool(false))),
            other => panic!("Expected Create, got {:?}", other),
        }
    }

    #[test]
    fn diff_no_change_ignores_computed_attributes() {
        let result = diff(&desired(), &current(&matching_current()), Some(&copy_schema()));
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn diff_update_when_description_changes() {
        let desired = desired().with_attribute("description", "new text");
        let result = diff(&desired, &current(&matching_current()), Some(&copy_schema()));
        match result {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["description".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_update_when_tags_change() {
        let mut tags = HashMap::new();
        tags.insert("Env".to_string(), Value::from("prod"));
        let desired = desired().with_attribute("tags", Value::Map(tags));
        let result = diff(&desired, &current(&matching_current()), Some(&copy_schema()));
        assert!(matches!(result, Diff::Update { .. }));
    }

    #[test]
    fn diff_update_when_tags_removed_from_manifest() {
        let mut tags = HashMap::new();
        tags.insert("Env".to_string(), Value::from("prod"));
        let mut attrs = matching_current();
        attrs.push(("tags", Value::Map(tags)));

        match diff(&desired(), &current(&attrs), Some(&copy_schema())) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["tags".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn empty_tags_absent_from_manifest_is_no_change() {
        let mut attrs = matching_current();
        attrs.push(("tags", Value::Map(HashMap::new())));
        let result = diff(&desired(), &current(&attrs), Some(&copy_schema()));
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn diff_replace_when_force_new_attribute_changes() {
        for (key, value) in [
            ("name", Value::from("copy-2")),
            ("source_ami_id", Value::from("ami-999")),
            ("encrypted", Value::Bool(true)),
        ] {
            let desired = desired().with_attribute(key, value);
            let result = diff(&desired, &current(&matching_current()), Some(&copy_schema()));
            match result {
                Diff::Replace { forced_by, .. } => assert_eq!(forced_by, vec![key.to_string()]),
                other => panic!("Expected Replace for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn diff_replace_when_tainted() {
        let current = current(&matching_current()).with_tainted(true);
        let result = diff(&desired(), &current, Some(&copy_schema()));
        match result {
            Diff::Replace { forced_by, .. } => assert!(forced_by.is_empty()),
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn keyed_sets_compare_without_order() {
        let mut attrs = matching_current();
        attrs.push((
            "ephemeral_block_device",
            Value::List(vec![
                ephemeral("/dev/sdb", "ephemeral0"),
                ephemeral("/dev/sdc", "ephemeral1"),
            ]),
        ));
        let desired = desired().with_attribute(
            "ephemeral_block_device",
            Value::List(vec![
                ephemeral("/dev/sdc", "ephemeral1"),
                ephemeral("/dev/sdb", "ephemeral0"),
            ]),
        );
        let result = diff(&desired, &current(&attrs), Some(&copy_schema()));
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn keyed_set_ignores_fields_only_reported_by_provider() {
        let mut reported = HashMap::new();
        reported.insert("device_name".to_string(), Value::from("/dev/sdb"));
        reported.insert("virtual_name".to_string(), Value::from("ephemeral0"));
        reported.insert("extra".to_string(), Value::Bool(true));

        let mut attrs = matching_current();
        attrs.push(("ephemeral_block_device", Value::List(vec![Value::Map(reported)])));
        let desired = desired().with_attribute(
            "ephemeral_block_device",
            Value::List(vec![ephemeral("/dev/sdb", "ephemeral0")]),
        );
        let result = diff(&desired, &current(&attrs), Some(&copy_schema()));
        assert!(matches!(result, Diff::NoChange(_)));

        let desired = desired.with_attribute(
            "ephemeral_block_device",
            Value::List(vec![ephemeral("/dev/sdc", "ephemeral0")]),
        );
        let result = diff(&desired, &current(&attrs), Some(&copy_schema()));
        assert!(matches!(result, Diff::Replace { .. }));
    }

    #[test]
    fn optional_computed_absent_from_desired_is_ignored() {
        let mut attrs = matching_current();
        attrs.push((
            "ephemeral_block_device",
            Value::List(vec![ephemeral("/dev/sdb", "ephemeral0")]),
        ));
        let result = diff(&desired(), &current(&attrs), Some(&copy_schema()));
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn create_plan_schedules_orphans_for_deletion() {
        let schemas: HashMap<String, ResourceSchema> =
            [("ec2.ami_copy".to_string(), copy_schema())].into_iter().collect();

        let new_resource = Resource::new("ec2.ami_copy", "fresh")
            .with_attribute("name", "fresh")
            .with_attribute("source_ami_id", "ami-1");

        let orphan_id = ResourceId::new("ec2.ami_copy", "old");
        let mut current_states = HashMap::new();
        current_states.insert(
            orphan_id.clone(),
            State::existing(orphan_id.clone(), HashMap::new()).with_identifier("ami-old"),
        );

        let plan = create_plan(&[new_resource], &current_states, &schemas);

        assert_eq!(plan.effects().len(), 2);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(&plan.effects()[1], Effect::Delete { id, .. } if id == &orphan_id));
    }
}
