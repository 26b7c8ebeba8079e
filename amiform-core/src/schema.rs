//! Schema - Define type schemas for resources
//!
//! Providers describe each resource type as a table of attributes. Every
//! entry carries its type, whether the user may set it, whether changing it
//! forces the resource to be replaced, and an optional default.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Set of nested blocks identified by a composite key
    KeyedSet(Box<BlockSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::KeyedSet(block), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    block
                        .validate_element(item)
                        .map_err(|e| TypeError::ListItemError {
                            index: i,
                            inner: Box::new(e),
                        })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name().to_string(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::KeyedSet(block) => format!("Set<{}>", block.name),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// Whether an attribute is supplied by the user, the provider, or either
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    /// Read-only, mirrored from the remote resource
    Computed,
    /// May be set by the user; filled in by the provider otherwise
    OptionalComputed,
}

/// How a change to an attribute is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    InPlace,
    ForceNew,
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub presence: Presence,
    pub mutability: Mutability,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            presence: Presence::Optional,
            mutability: Mutability::InPlace,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    pub fn computed(mut self) -> Self {
        self.presence = Presence::Computed;
        self
    }

    pub fn optional_computed(mut self) -> Self {
        self.presence = Presence::OptionalComputed;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.mutability = Mutability::ForceNew;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    /// True unless the attribute is read-only
    pub fn is_user_settable(&self) -> bool {
        self.presence != Presence::Computed
    }

    pub fn is_computed(&self) -> bool {
        matches!(
            self.presence,
            Presence::Computed | Presence::OptionalComputed
        )
    }

    pub fn is_force_new(&self) -> bool {
        self.mutability == Mutability::ForceNew
    }
}

/// Schema of a nested block stored in a keyed set
///
/// Elements are identified by the values of the `key` fields joined with
/// `-`, e.g. `/dev/sdb-snap-0123` for an EBS mapping.
#[derive(Debug, Clone)]
pub struct BlockSchema {
    pub name: String,
    pub attributes: Vec<AttributeSchema>,
    pub key: Vec<String>,
}

impl BlockSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            key: Vec::new(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.push(schema);
        self
    }

    pub fn keyed_by(mut self, fields: &[&str]) -> Self {
        self.key = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Composite identity of one element of the set
    pub fn element_key(&self, element: &HashMap<String, Value>) -> String {
        self.key
            .iter()
            .map(|field| match element.get(field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Int(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => String::new(),
            })
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Index a set value by composite key
    ///
    /// Non-map items are skipped; the schema validation reports them.
    pub fn index<'a>(&self, items: &'a [Value]) -> std::collections::BTreeMap<String, &'a Value> {
        items
            .iter()
            .filter_map(|item| item.as_map().map(|m| (self.element_key(m), item)))
            .collect()
    }

    fn validate_element(&self, value: &Value) -> Result<(), TypeError> {
        let Value::Map(fields) = value else {
            return Err(TypeError::TypeMismatch {
                expected: self.name.clone(),
                got: value.type_name().to_string(),
            });
        };

        for (name, v) in fields {
            let schema = self
                .attributes
                .iter()
                .find(|a| &a.name == name)
                .ok_or_else(|| TypeError::UnknownAttribute { name: name.clone() })?;
            schema
                .attr_type
                .validate(v)
                .map_err(|e| TypeError::AttributeError {
                    name: name.clone(),
                    inner: Box::new(e),
                })?;
        }
        Ok(())
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Attributes sorted by name, for display
    pub fn sorted_attributes(&self) -> Vec<&AttributeSchema> {
        let mut attrs: Vec<_> = self.attributes.values().collect();
        attrs.sort_by(|a, b| a.name.cmp(&b.name));
        attrs
    }

    /// Names of attributes whose change forces replacement
    pub fn force_new_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .attributes
            .values()
            .filter(|a| a.is_force_new())
            .map(|a| a.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Validate resource attributes supplied by the user
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.is_required() && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            match self.attributes.get(name) {
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
                Some(schema) if !schema.is_user_settable() => {
                    errors.push(TypeError::ComputedAttribute { name: name.clone() })
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::AttributeError {
                            name: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill in defaults for attributes the user left out
    pub fn with_defaults(&self, attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
        let mut merged = attributes.clone();
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                merged
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_block() -> BlockSchema {
        BlockSchema::new("EbsBlockDevice")
            .attribute(AttributeSchema::new("device_name", AttributeType::String).computed())
            .attribute(AttributeSchema::new("snapshot_id", AttributeType::String).computed())
            .attribute(AttributeSchema::new("volume_size", AttributeType::Int).computed())
            .keyed_by(&["device_name", "snapshot_id"])
    }

    fn image_schema() -> ResourceSchema {
        ResourceSchema::new("image")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(
                AttributeSchema::new("encrypted", AttributeType::Bool)
                    .force_new()
                    .with_default(Value::Bool(false)),
            )
            .attribute(AttributeSchema::new("architecture", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new(
                    "ebs_block_device",
                    AttributeType::KeyedSet(Box::new(device_block())),
                )
                .optional_computed(),
            )
    }

    fn device(name: &str, snapshot: &str) -> Value {
        let mut m = HashMap::new();
        m.insert("device_name".to_string(), Value::String(name.to_string()));
        m.insert("snapshot_id".to_string(), Value::String(snapshot.to_string()));
        Value::Map(m)
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["hvm".to_string(), "paravirtual".to_string()]);
        assert!(t.validate(&Value::String("hvm".to_string())).is_ok());
        assert!(t.validate(&Value::String("xen".to_string())).is_err());
    }

    #[test]
    fn custom_type_checks_base_first() {
        let t = AttributeType::Custom {
            name: "Upper".to_string(),
            base: Box::new(AttributeType::String),
            validate: |v| match v {
                Value::String(s) if s.chars().all(|c| c.is_ascii_uppercase()) => Ok(()),
                _ => Err("must be upper case".to_string()),
            },
        };
        assert!(t.validate(&Value::String("ABC".to_string())).is_ok());
        assert!(matches!(
            t.validate(&Value::Int(1)),
            Err(TypeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            t.validate(&Value::String("abc".to_string())),
            Err(TypeError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = image_schema();
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("copy-1".to_string()));
        attrs.insert("description".to_string(), Value::String("a copy".to_string()));
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = image_schema();
        let errors = schema.validate(&HashMap::new()).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, TypeError::MissingRequired { name } if name == "name"))
        );
    }

    #[test]
    fn computed_attribute_cannot_be_set() {
        let schema = image_schema();
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("x".to_string()));
        attrs.insert("architecture".to_string(), Value::String("x86_64".to_string()));
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(&errors[0], TypeError::ComputedAttribute { name } if name == "architecture"));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let schema = image_schema();
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("x".to_string()));
        attrs.insert("nmae".to_string(), Value::String("x".to_string()));
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(&errors[0], TypeError::UnknownAttribute { name } if name == "nmae"));
    }

    #[test]
    fn defaults_fill_missing_attributes_only() {
        let schema = image_schema();
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("x".to_string()));
        let merged = schema.with_defaults(&attrs);
        assert_eq!(merged.get("encrypted"), Some(&Value::Bool(false)));

        attrs.insert("encrypted".to_string(), Value::Bool(true));
        let merged = schema.with_defaults(&attrs);
        assert_eq!(merged.get("encrypted"), Some(&Value::Bool(true)));
    }

    #[test]
    fn force_new_attributes_are_sorted() {
        assert_eq!(image_schema().force_new_attributes(), vec!["encrypted", "name"]);
    }

    #[test]
    fn keyed_set_element_key_joins_key_fields() {
        let block = device_block();
        let Value::Map(m) = device("/dev/sdb", "snap-1") else {
            unreachable!()
        };
        assert_eq!(block.element_key(&m), "/dev/sdb-snap-1");
    }

    #[test]
    fn keyed_set_index_ignores_order() {
        let block = device_block();
        let a = vec![device("/dev/sda1", "snap-1"), device("/dev/sdb", "snap-2")];
        let b = vec![device("/dev/sdb", "snap-2"), device("/dev/sda1", "snap-1")];
        assert_eq!(block.index(&a), block.index(&b));
    }

    #[test]
    fn keyed_set_rejects_unknown_fields() {
        let t = AttributeType::KeyedSet(Box::new(device_block()));
        let mut m = HashMap::new();
        m.insert("device".to_string(), Value::String("/dev/sdb".to_string()));
        assert!(t.validate(&Value::List(vec![Value::Map(m)])).is_err());
        assert!(t.validate(&Value::List(vec![device("/dev/sdb", "snap-1")])).is_ok());
    }
}
