// SPDX-License-Identifier: MIT OR Apache-2.0
//! Default fields applied to new blocks.

use crate::dataset::DatasetSplit;
use crate::entity::{BlockType, FieldValue, Fields};
use serde::{Deserialize, Serialize};

/// Dataset block defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetDefaults {
    /// Dataset name
    pub dataset: String,
    /// Total number of samples
    pub total: i64,
    /// Samples used for training
    pub train: i64,
    /// Samples used for testing
    pub test: i64,
    /// Samples used for validation
    pub validation: i64,
}

impl Default for DatasetDefaults {
    fn default() -> Self {
        Self {
            dataset: "MNIST".to_string(),
            total: 70000,
            train: 60000,
            test: 10000,
            validation: 0,
        }
    }
}

/// Trainer block defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerDefaults {
    /// Batch size
    pub batch: i64,
    /// Number of epochs
    pub epochs: i64,
    /// Loss function
    pub loss: String,
    /// Learning rate
    pub learning_rate: f64,
    /// Learning rate decay
    pub learning_rate_decay: f64,
}

impl Default for TrainerDefaults {
    fn default() -> Self {
        Self {
            batch: 10,
            epochs: 1,
            loss: "MSE".to_string(),
            learning_rate: 0.01,
            learning_rate_decay: 0.0,
        }
    }
}

/// Defaults for every block type that has any
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDefaults {
    /// Dataset defaults
    pub dataset: DatasetDefaults,
    /// Trainer defaults
    pub trainer: TrainerDefaults,
}

impl BlockDefaults {
    /// Initial fields for a new block of this type
    pub fn fields_for(&self, block_type: BlockType) -> Fields {
        let mut fields = Fields::new();
        match block_type {
            BlockType::Dataset => {
                let d = &self.dataset;
                fields.insert("dataset".into(), FieldValue::Text(d.dataset.clone()));
                let mut split = DatasetSplit::new(d.total);
                split.slide(d.validation, d.validation.saturating_add(d.test));
                split.write_to(&mut fields);
            }
            BlockType::Trainer => {
                let t = &self.trainer;
                fields.insert("batch".into(), FieldValue::Int(t.batch));
                fields.insert("epochs".into(), FieldValue::Int(t.epochs));
                fields.insert("loss".into(), FieldValue::Text(t.loss.clone()));
                fields.insert("learningRate".into(), FieldValue::Float(t.learning_rate));
                fields.insert(
                    "learningRateDecay".into(),
                    FieldValue::Float(t.learning_rate_decay),
                );
            }
            _ => {}
        }
        fields
    }
}
