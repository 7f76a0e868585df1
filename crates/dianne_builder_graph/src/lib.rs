// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph model of the DIANNE neural network builder.
//!
//! This crate holds the state a builder session edits:
//! - Network modules chained through `next`/`prev`
//! - Auxiliary blocks (datasets, trainers, run-mode inputs and outputs)
//! - The deployment map of modules to runtime targets
//!
//! ## Architecture
//!
//! A single [`GraphModel`] owns both entity maps. Connection editing is
//! governed by a per-mode table ([`ConnectionRules`]); deployed modules
//! are frozen. The model serializes to an order-independent
//! [`GraphSnapshot`] and to the network description exchanged with the
//! deployer.

pub mod catalog;
pub mod connection;
pub mod dataset;
pub mod defaults;
pub mod entity;
pub mod error;
pub mod graph;
pub mod learning;
pub mod mode;
pub mod network;
pub mod policy;
pub mod snapshot;

pub use catalog::{ModuleCatalog, ModuleProperty, ModuleType};
pub use connection::{Connection, LinkKind};
pub use dataset::DatasetSplit;
pub use defaults::{BlockDefaults, DatasetDefaults, TrainerDefaults};
pub use entity::{Block, BlockType, EntityId, EntityKind, EntityRef, FieldValue, Fields, Module};
pub use error::{GraphError, IllegalReason, Result};
pub use graph::GraphModel;
pub use mode::{ConnectionRules, EditRule, Mode};
pub use network::{Layout, LayoutConnection, LayoutNode, NetworkJson, SavedNetwork};
pub use policy::{AllowAll, StructuralPolicy};
pub use snapshot::{EdgeRecord, GraphSnapshot, NodeRecord};
