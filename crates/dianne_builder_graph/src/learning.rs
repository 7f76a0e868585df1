// SPDX-License-Identifier: MIT OR Apache-2.0
//! Payloads of learn and evaluate jobs, and merging of their results.

use crate::catalog::{INPUT_OUTPUT_CATEGORY, PREPROCESSING_CATEGORY};
use crate::entity::{Block, EntityId, FieldValue};
use crate::graph::GraphModel;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Module field holding the labels of a trained output
pub const LABELS_FIELD: &str = "labels";

fn block_json(block: &Block) -> Value {
    let mut record = Map::new();
    record.insert("id".into(), Value::String(block.id.to_string()));
    record.insert("type".into(), Value::String(block.block_type.as_str().to_string()));
    if let Some(input) = &block.input {
        record.insert("input".into(), Value::String(input.to_string()));
    }
    if let Some(output) = &block.output {
        record.insert("output".into(), Value::String(output.to_string()));
    }
    for (name, value) in &block.fields {
        record.insert(name.clone(), value.to_json());
    }
    Value::Object(record)
}

impl GraphModel {
    /// Modules a learn job operates on: input/output and preprocessing
    /// modules, plus every module flagged trainable.
    pub fn learn_modules(&self) -> Vec<EntityId> {
        self.modules()
            .filter(|m| {
                matches!(m.category(), Some(INPUT_OUTPUT_CATEGORY | PREPROCESSING_CATEGORY))
                    || m.trainable == Some(true)
            })
            .map(|m| m.id.clone())
            .collect()
    }

    /// Learning configuration: every block with its fields and links
    pub fn learning_config(&self) -> Map<String, Value> {
        self.blocks()
            .map(|b| (b.id.to_string(), block_json(b)))
            .collect()
    }

    /// Write labels returned by a finished learn job onto their modules.
    ///
    /// Deployed modules are updated too. Returns how many modules were updated.
    pub fn merge_labels(&mut self, labels: &IndexMap<EntityId, Vec<String>>) -> usize {
        let mut merged = 0;
        for (id, values) in labels {
            if self.merge_field(id, LABELS_FIELD, FieldValue::List(values.clone())) {
                merged += 1;
            } else {
                tracing::warn!("Dropping labels for unknown module {id}");
            }
        }
        merged
    }
}
