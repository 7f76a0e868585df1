// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable structural checks for adding and removing entities.

use crate::entity::EntityRef;

/// Hook consulted before entities are added or removed.
///
/// Both checks allow everything by default. The deployment freeze is
/// enforced by the graph model itself and cannot be lifted here.
pub trait StructuralPolicy: Send + Sync {
    /// Whether a new entity of this type may be created
    fn check_add_module(&self, _entity_type: &str) -> bool {
        true
    }

    /// Whether this entity may be removed
    fn check_remove_module(&self, _entity: EntityRef<'_>) -> bool {
        true
    }
}

/// Policy that allows every add and remove
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl StructuralPolicy for AllowAll {}
