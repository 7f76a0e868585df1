// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network description and canvas layout, as exchanged with the deployer
//! and the save/load service.
//!
//! The network description is a JSON object of modules keyed by id, each
//! carrying `id`, `type`, `next`/`prev` and its fields. The layout records
//! where nodes sit on the canvas and how edges are anchored; the graph
//! model does not interpret it.

use crate::entity::{EntityId, Module, TRAINABLE_FIELD};
use crate::error::{GraphError, Result};
use crate::graph::GraphModel;
use crate::snapshot::{EdgeRecord, GraphSnapshot, NodeRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Network description: module id -> module record
pub type NetworkJson = Map<String, Value>;

/// Canvas position of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    /// Entity ID
    pub id: EntityId,
    /// Left offset in pixels
    #[serde(rename = "positionX")]
    pub position_x: i64,
    /// Top offset in pixels
    #[serde(rename = "positionY")]
    pub position_y: i64,
}

/// Drawn connection with its endpoint anchors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConnection {
    /// Renderer's connection id
    pub connection_id: String,
    /// Source entity
    pub source_id: EntityId,
    /// Target entity
    pub target_id: EntityId,
    /// Per endpoint: `[x, y, orientation x, orientation y, offset x, offset y]`
    #[serde(default)]
    pub anchors: Vec<[f64; 6]>,
}

/// Canvas layout of a saved network
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layout {
    /// Node positions
    #[serde(default)]
    pub nodes: Vec<LayoutNode>,
    /// Drawn connections
    #[serde(default)]
    pub connections: Vec<LayoutConnection>,
}

impl Layout {
    /// Position of a node
    pub fn position_of(&self, id: &EntityId) -> Option<(i64, i64)> {
        self.nodes
            .iter()
            .find(|n| &n.id == id)
            .map(|n| (n.position_x, n.position_y))
    }

    /// Set or update a node position
    pub fn place(&mut self, id: EntityId, x: i64, y: i64) {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.position_x = x;
                node.position_y = y;
            }
            None => self.nodes.push(LayoutNode {
                id,
                position_x: x,
                position_y: y,
            }),
        }
    }

    /// Drop nodes and connections the model does not know about
    pub fn retain_known(&mut self, model: &GraphModel) {
        self.nodes.retain(|n| model.contains(&n.id));
        let edges = model.connections();
        self.connections.retain(|c| {
            edges
                .iter()
                .any(|e| e.source == c.source_id && e.target == c.target_id)
        });
    }
}

/// What the save/load service stores
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SavedNetwork {
    /// Network description
    pub modules: NetworkJson,
    /// Canvas layout
    #[serde(default)]
    pub layout: Layout,
}

impl SavedNetwork {
    /// Capture the model's modules together with a layout
    pub fn capture(model: &GraphModel, mut layout: Layout) -> Self {
        layout.retain_known(model);
        Self {
            modules: model.to_network_json(),
            layout,
        }
    }

    /// Load the network into the model, then prune the layout to match
    pub fn restore(&mut self, model: &mut GraphModel) -> Result<()> {
        model.from_network_json(&self.modules)?;
        self.layout.retain_known(model);
        Ok(())
    }
}

fn module_json(module: &Module) -> Value {
    let mut record = Map::new();
    record.insert("id".into(), Value::String(module.id.to_string()));
    record.insert("type".into(), Value::String(module.module_type.clone()));
    if let Some(next) = &module.next {
        record.insert("next".into(), Value::String(next.to_string()));
    }
    if let Some(prev) = &module.prev {
        record.insert("prev".into(), Value::String(prev.to_string()));
    }
    if let Some(trainable) = module.trainable {
        record.insert(TRAINABLE_FIELD.into(), Value::Bool(trainable));
    }
    for (name, value) in &module.fields {
        record.insert(name.clone(), value.to_json());
    }
    Value::Object(record)
}

impl GraphModel {
    /// Describe the modules (blocks excluded) as sent to the deployer
    pub fn to_network_json(&self) -> NetworkJson {
        self.modules()
            .map(|m| (m.id.to_string(), module_json(m)))
            .collect()
    }

    /// Record of a single module, as sent when deploying it alone
    pub fn module_json(&self, id: &EntityId) -> Result<Value> {
        self.module(id)
            .map(module_json)
            .ok_or_else(|| GraphError::NotFound(id.clone()))
    }

    /// Replace the whole model with a network description.
    ///
    /// Blocks and deployment are cleared. `next` links become edges; every
    /// `prev` must be mirrored by the matching `next`.
    pub fn from_network_json(&mut self, network: &NetworkJson) -> Result<()> {
        let mut snapshot = GraphSnapshot::default();

        for (key, value) in network {
            let Value::Object(record) = value else {
                return Err(GraphError::MalformedSnapshot(format!("module {key} is not an object")));
            };
            let id = match record.get("id") {
                Some(Value::String(id)) if id != key => {
                    return Err(GraphError::MalformedSnapshot(format!(
                        "module {key} carries id {id}"
                    )));
                }
                _ => EntityId::from(key.as_str()),
            };
            let node_type = record
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if let Some(next) = record.get("next").and_then(Value::as_str) {
                snapshot.edges.push(EdgeRecord {
                    source_id: id.clone(),
                    target_id: next.into(),
                });
            }
            if let Some(prev) = record.get("prev").and_then(Value::as_str) {
                let mirrored = network
                    .get(prev)
                    .and_then(|p| p.get("next"))
                    .and_then(Value::as_str)
                    == Some(key.as_str());
                if !mirrored {
                    return Err(GraphError::MalformedSnapshot(format!(
                        "module {key} has prev {prev} without a matching next"
                    )));
                }
            }

            let fields = record
                .iter()
                .filter(|(name, _)| !matches!(name.as_str(), "id" | "type" | "next" | "prev"))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            snapshot.nodes.push(NodeRecord {
                id,
                node_type,
                fields,
            });
        }

        self.deserialize(&snapshot)
    }
}
