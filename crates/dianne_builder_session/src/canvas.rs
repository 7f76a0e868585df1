// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input samples, and conversion of hand drawings into network input.

use serde::{Deserialize, Serialize};

/// Side of the drawing canvas in pixels
pub const CANVAS_SIZE: usize = 224;

/// Side of the sample fed to the network
pub const SAMPLE_SIZE: usize = 28;

/// Pixels skipped between collected samples
pub const SAMPLE_STRIDE: usize = CANVAS_SIZE / SAMPLE_SIZE;

/// Dense input tensor as exchanged with the run service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Width in elements
    pub width: usize,
    /// Height in elements
    pub height: usize,
    /// Number of channels
    pub channels: usize,
    /// Row-major values
    pub data: Vec<f32>,
}

impl Sample {
    /// Whether `data` matches the declared shape
    pub fn is_well_formed(&self) -> bool {
        self.width * self.height * self.channels == self.data.len()
    }
}

/// Error converting a drawing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanvasError {
    /// Buffer is not a 224x224 RGBA image
    #[error("Expected {expected} bytes of RGBA data, got {actual}")]
    BadSize {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },
}

/// Downsample a 224x224 RGBA drawing to a 28x28 single-channel sample.
///
/// Only the alpha channel is read, at every 8th pixel in both directions,
/// scaled into `[0, 1]`.
pub fn canvas_sample(rgba: &[u8]) -> Result<Sample, CanvasError> {
    let expected = CANVAS_SIZE * CANVAS_SIZE * 4;
    if rgba.len() != expected {
        return Err(CanvasError::BadSize {
            expected,
            actual: rgba.len(),
        });
    }

    let data = (0..CANVAS_SIZE)
        .step_by(SAMPLE_STRIDE)
        .flat_map(|y| {
            (0..CANVAS_SIZE)
                .step_by(SAMPLE_STRIDE)
                .map(move |x| rgba[(y * CANVAS_SIZE + x) * 4 + 3] as f32 / 255.0)
        })
        .collect();

    Ok(Sample {
        width: SAMPLE_SIZE,
        height: SAMPLE_SIZE,
        channels: 1,
        data,
    })
}
