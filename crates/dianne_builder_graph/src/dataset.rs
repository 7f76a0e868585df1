// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataset train/test/validation split driven by a two-handle range slider.

use crate::entity::{FieldValue, Fields};
use serde::{Deserialize, Serialize};

/// Split of a dataset's samples.
///
/// Always satisfies `validation + test + train == total` with all parts
/// non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplit {
    /// Total number of samples
    pub total: i64,
    /// Training samples
    pub train: i64,
    /// Test samples
    pub test: i64,
    /// Validation samples
    pub validation: i64,
}

impl DatasetSplit {
    /// Everything in training
    pub fn new(total: i64) -> Self {
        let total = total.max(0);
        Self {
            total,
            train: total,
            test: 0,
            validation: 0,
        }
    }

    /// Read a split from dataset block fields. Returns `None` when `total`
    /// is missing; inconsistent parts are normalized through the slider.
    pub fn from_fields(fields: &Fields) -> Option<Self> {
        let total = fields.get("total").and_then(FieldValue::as_int)?;
        let validation = fields
            .get("validation")
            .and_then(FieldValue::as_int)
            .unwrap_or(0);
        let test = fields.get("test").and_then(FieldValue::as_int).unwrap_or(0);

        let mut split = Self::new(total);
        split.slide(validation, validation.saturating_add(test));
        Some(split)
    }

    /// Write the split back into dataset block fields
    pub fn write_to(&self, fields: &mut Fields) {
        fields.insert("total".into(), FieldValue::Int(self.total));
        fields.insert("train".into(), FieldValue::Int(self.train));
        fields.insert("test".into(), FieldValue::Int(self.test));
        fields.insert("validation".into(), FieldValue::Int(self.validation));
    }

    /// Change one part of the split. The other parts are rebalanced through
    /// the slider: `validation` and `total` keep the test share, `test`
    /// keeps validation, and `train` keeps validation and takes from test.
    /// Returns `false` for a name that is not part of the split.
    pub fn set(&mut self, part: &str, value: i64) -> bool {
        match part {
            "total" => {
                let (h1, h2) = self.handles();
                self.total = value.max(0);
                self.slide(h1, h2);
            }
            "validation" => self.slide(value, value.saturating_add(self.test)),
            "test" => self.slide(self.validation, self.validation.saturating_add(value)),
            "train" => self.slide(self.validation, self.total.saturating_sub(value)),
            _ => return false,
        }
        true
    }

    /// Slider handle positions `(validation, validation + test)`
    pub fn handles(&self) -> (i64, i64) {
        (self.validation, self.validation + self.test)
    }

    /// Move the slider handles. Both are clamped into `[0, total]` and the
    /// lower handle never passes the upper one.
    pub fn slide(&mut self, handle1: i64, handle2: i64) {
        let h2 = handle2.clamp(0, self.total);
        let h1 = handle1.clamp(0, self.total).min(h2);

        self.validation = h1;
        self.test = h2 - h1;
        self.train = self.total - h2;
    }

    /// Whether the parts add up and are in range
    pub fn is_consistent(&self) -> bool {
        self.validation >= 0
            && self.test >= 0
            && self.train >= 0
            && self.validation + self.test + self.train == self.total
    }
}
