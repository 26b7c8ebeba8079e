//! Effect - A side effect to be performed against a provider
//!
//! Effects are plain values; nothing happens until a plan is applied.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Refresh the current state of a resource
    Read(ResourceId),
    /// Create a new resource
    Create(Resource),
    /// Change attributes of an existing resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    /// Delete the existing resource and create it again
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        /// Attributes that forced the replacement (empty for tainted resources)
        forced_by: Vec<String>,
    },
    /// Delete a resource
    Delete { id: ResourceId, from: State },
}

impl Effect {
    /// Returns whether this Effect changes infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(id) => id,
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }
}
