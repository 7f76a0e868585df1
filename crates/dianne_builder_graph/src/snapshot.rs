// SPDX-License-Identifier: MIT OR Apache-2.0
//! Snapshot serialization of the graph model.
//!
//! The JSON shape is
//! `{ "nodes": [{ "id", "type", ...fields }], "edges": [{ "sourceId", "targetId" }], "deployment": { id: target } }`.

use crate::entity::{Block, BlockType, EntityId, FieldValue, Fields, Module, RESERVED_FIELDS, TRAINABLE_FIELD};
use crate::error::{GraphError, Result};
use crate::graph::GraphModel;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One node of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Entity ID
    pub id: EntityId,
    /// Type tag
    #[serde(rename = "type", default)]
    pub node_type: String,
    /// Scalar fields
    #[serde(flatten)]
    pub fields: IndexMap<String, serde_json::Value>,
}

/// One edge of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    /// Source entity
    pub source_id: EntityId,
    /// Target entity
    pub target_id: EntityId,
}

/// Complete, order-independent description of a graph model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes sorted by id
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// Edges sorted by source then target
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    /// Deployment map sorted by module id
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub deployment: IndexMap<EntityId, String>,
}

impl GraphSnapshot {
    /// Parse from JSON text
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Render as pretty JSON text
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl NodeRecord {
    fn from_module(module: &Module) -> Self {
        let mut fields = fields_to_json(&module.fields);
        if let Some(trainable) = module.trainable {
            fields.insert(TRAINABLE_FIELD.to_string(), serde_json::Value::Bool(trainable));
        }
        Self {
            id: module.id.clone(),
            node_type: module.module_type.clone(),
            fields,
        }
    }

    fn from_block(block: &Block) -> Self {
        Self {
            id: block.id.clone(),
            node_type: block.block_type.as_str().to_string(),
            fields: fields_to_json(&block.fields),
        }
    }

    /// Rebuild the unlinked entity and insert it into `staged`
    fn insert_into(&self, staged: &mut GraphModel) -> std::result::Result<(), String> {
        if self.node_type.is_empty() {
            return Err(format!("node {} has no type", self.id));
        }

        let mut trainable = None;
        let mut fields = Fields::new();
        for (name, value) in &self.fields {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                tracing::debug!("Ignoring structural field {name} on node {}", self.id);
                continue;
            }
            let value = FieldValue::from_json(value)
                .ok_or_else(|| format!("field {name} of node {} is not a scalar", self.id))?;
            fields.insert(name.clone(), value);
        }

        let inserted = match BlockType::from_type_name(&self.node_type) {
            Some(block_type) => {
                let mut block = Block::new(self.id.clone(), block_type);
                block.fields = fields;
                staged.insert_block_raw(block)
            }
            None => {
                if let Some(value) = fields.shift_remove(TRAINABLE_FIELD) {
                    trainable = Some(value.as_bool().ok_or_else(|| {
                        format!("trainable flag of node {} is not a boolean", self.id)
                    })?);
                }
                let mut module = Module::new(self.id.clone(), self.node_type.clone());
                module.trainable = trainable;
                module.fields = fields;
                staged.insert_module_raw(module)
            }
        };

        if inserted {
            Ok(())
        } else {
            Err(format!("duplicate node id {}", self.id))
        }
    }
}

fn fields_to_json(fields: &Fields) -> IndexMap<String, serde_json::Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

impl GraphModel {
    /// Snapshot the graph. Nodes, edges and deployment entries are sorted by
    /// id, so the result does not depend on insertion order.
    pub fn serialize(&self) -> GraphSnapshot {
        let mut nodes: Vec<NodeRecord> = self
            .modules()
            .map(NodeRecord::from_module)
            .chain(self.blocks().map(NodeRecord::from_block))
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let edges = self
            .connections()
            .into_iter()
            .map(|c| EdgeRecord {
                source_id: c.source,
                target_id: c.target,
            })
            .collect();

        let mut deployment: Vec<(EntityId, String)> = self
            .deployment()
            .map(|(id, target)| (id.clone(), target.to_string()))
            .collect();
        deployment.sort();

        GraphSnapshot {
            nodes,
            edges,
            deployment: deployment.into_iter().collect(),
        }
    }

    /// Replace modules, blocks and deployment with the snapshot's.
    ///
    /// The snapshot is checked completely before anything is replaced; on
    /// error the model is unchanged.
    pub fn deserialize(&mut self, snapshot: &GraphSnapshot) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &snapshot.nodes {
            if !ids.insert(&node.id) {
                return Err(malformed(format!("duplicate node id {}", node.id)));
            }
        }
        for edge in &snapshot.edges {
            for endpoint in [&edge.source_id, &edge.target_id] {
                if !ids.contains(endpoint) {
                    return Err(malformed(format!(
                        "edge endpoint {endpoint} is not among the nodes"
                    )));
                }
            }
        }

        let mut staged = self.empty_like();
        for node in &snapshot.nodes {
            node.insert_into(&mut staged).map_err(malformed)?;
        }
        for edge in &snapshot.edges {
            staged
                .link_raw(&edge.source_id, &edge.target_id)
                .map_err(malformed)?;
        }
        for (id, target) in &snapshot.deployment {
            if staged.module(id).is_none() {
                return Err(malformed(format!("deployed id {id} is not a module")));
            }
            staged.mark_deployed(id, target.clone())?;
        }

        tracing::debug!(
            "Loaded snapshot: {} modules, {} blocks, {} edges",
            staged.module_count(),
            staged.block_count(),
            snapshot.edges.len()
        );
        self.replace_contents(staged);
        Ok(())
    }
}

fn malformed(reason: String) -> GraphError {
    GraphError::MalformedSnapshot(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use serde_json::json;

    fn sample() -> GraphModel {
        let mut graph = GraphModel::new();
        let input = graph.add_module("Input", Some("in".into())).unwrap();
        let linear = graph.add_module("Linear", Some("lin".into())).unwrap();
        let output = graph.add_module("Output", Some("out".into())).unwrap();
        let dataset = graph.add_module("Dataset", Some("data".into())).unwrap();
        let trainer = graph.add_module("Trainer", Some("train".into())).unwrap();

        graph.connect(&input, &linear).unwrap();
        graph.connect(&linear, &output).unwrap();
        graph.configure(&linear, "inputSize", FieldValue::Int(784)).unwrap();
        graph.set_trainable(&linear, true).unwrap();

        graph.set_mode(Mode::Learn);
        graph.connect(&dataset, &input).unwrap();
        graph.connect(&output, &trainer).unwrap();
        graph.set_mode(Mode::Build);

        graph.mark_deployed(&linear, "node1").unwrap();
        graph
    }

    #[test]
    fn test_round_trip() {
        let graph = sample();
        let snapshot = graph.serialize();

        let mut restored = GraphModel::new();
        restored.deserialize(&snapshot).unwrap();
        assert_eq!(restored.serialize(), snapshot);

        let lin = EntityId::from("lin");
        let module = restored.module(&lin).unwrap();
        assert_eq!(module.trainable, Some(true));
        assert_eq!(module.prev, Some(EntityId::from("in")));
        assert_eq!(module.next, Some(EntityId::from("out")));
        assert_eq!(restored.deployment_of(&lin), Some("node1"));
        assert_eq!(
            restored.block(&EntityId::from("data")).unwrap().input,
            Some(EntityId::from("in"))
        );
    }

    #[test]
    fn test_round_trip_through_json() {
        let snapshot = sample().serialize();
        let text = snapshot.to_json_string().unwrap();
        let parsed = GraphSnapshot::from_json_str(&text).unwrap();
        assert_eq!(parsed, snapshot);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let node = value["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["id"] == "lin")
            .unwrap();
        assert_eq!(node["type"], "Linear");
        assert_eq!(node["inputSize"], 784);
        assert_eq!(value["edges"][0]["sourceId"], "data");
    }

    #[test]
    fn test_serialize_ignores_insertion_order() {
        let mut a = GraphModel::new();
        a.add_module("Linear", Some("x".into()));
        a.add_module("ReLU", Some("y".into()));
        a.connect(&"x".into(), &"y".into()).unwrap();

        let mut b = GraphModel::new();
        b.add_module("ReLU", Some("y".into()));
        b.add_module("Linear", Some("x".into()));
        b.connect(&"x".into(), &"y".into()).unwrap();

        assert_eq!(a.serialize(), b.serialize());
    }

    #[test]
    fn test_missing_edge_endpoint() {
        let snapshot: GraphSnapshot = serde_json::from_value(json!({
            "nodes": [{"id": "A"}],
            "edges": [{"sourceId": "A", "targetId": "B"}]
        }))
        .unwrap();

        let mut graph = sample();
        let before = graph.serialize();
        let err = graph.deserialize(&snapshot).unwrap_err();
        match err {
            GraphError::MalformedSnapshot(reason) => assert!(reason.contains('B')),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(graph.serialize(), before);
    }

    #[test]
    fn test_rejects_inconsistent_snapshots() {
        let cases = [
            json!({"nodes": [{"id": "A", "type": "Linear"}, {"id": "A", "type": "ReLU"}], "edges": []}),
            json!({"nodes": [{"id": "A", "type": "Linear"}, {"id": "B", "type": "ReLU"}, {"id": "C", "type": "Tanh"}],
                   "edges": [{"sourceId": "A", "targetId": "B"}, {"sourceId": "A", "targetId": "C"}]}),
            json!({"nodes": [{"id": "D", "type": "Dataset"}, {"id": "T", "type": "Trainer"}],
                   "edges": [{"sourceId": "D", "targetId": "T"}]}),
            json!({"nodes": [{"id": "T", "type": "Trainer"}], "edges": [], "deployment": {"T": "node1"}}),
            json!({"nodes": [{"id": "A", "type": "Linear", "weights": {"w": 1}}], "edges": []}),
        ];

        for case in cases {
            let snapshot: GraphSnapshot = serde_json::from_value(case).unwrap();
            let mut graph = GraphModel::new();
            assert!(matches!(
                graph.deserialize(&snapshot),
                Err(GraphError::MalformedSnapshot(_))
            ));
            assert!(graph.is_empty());
        }
    }
}
