// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.
//!
//! Edges are not stored separately: each one lives as a reference on its
//! endpoints (`next`/`prev` between modules, `input`/`output` on blocks).
//! A [`Connection`] is the derived view of such a reference.

use crate::entity::{AnchorClass, EntityId};
use serde::{Deserialize, Serialize};

/// How an edge is stored on its endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Module to module: `source.next` / `target.prev`
    Chain,
    /// Source-side block to module: `block.input`
    BlockInput,
    /// Module to target-side block: `block.output`
    BlockOutput,
}

impl LinkKind {
    /// Anchor class an edge of this kind is drawn between
    pub fn anchor_class(&self) -> AnchorClass {
        match self {
            Self::Chain => AnchorClass::Network,
            Self::BlockInput | Self::BlockOutput => AnchorClass::Learning,
        }
    }
}

/// A directed connection between two entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Source entity
    pub source: EntityId,
    /// Target entity
    pub target: EntityId,
    /// Storage kind
    pub kind: LinkKind,
}

impl Connection {
    /// Create a new connection
    pub fn new(source: EntityId, target: EntityId, kind: LinkKind) -> Self {
        Self {
            source,
            target,
            kind,
        }
    }

    /// Check if this connection involves a specific entity
    pub fn involves(&self, id: &EntityId) -> bool {
        &self.source == id || &self.target == id
    }
}
