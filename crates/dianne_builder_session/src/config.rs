// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builder configuration, stored as RON.

use crate::subscription::BackoffPolicy;
use dianne_builder_graph::{BlockDefaults, ModuleProperty, ModuleType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "builder.ron";

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Per-call JSON-RPC timeout in milliseconds
    pub rpc_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 15_000,
        }
    }
}

impl ServerConfig {
    /// JSON-RPC call timeout
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Builder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Backend location
    pub server: ServerConfig,
    /// Telemetry reconnect policy
    pub backoff: BackoffPolicy,
    /// Initial fields of new blocks
    pub defaults: BlockDefaults,
    /// Granularity of the dataset split slider
    pub slider_step: i64,
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
    /// Directory the offline backend stores networks in
    pub store_dir: PathBuf,
    /// Module types offered when running offline
    pub catalog: Vec<ModuleType>,
    /// Deployment targets offered when running offline
    pub targets: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        let catalog = [
            ("Input", "Input-Output"),
            ("Output", "Input-Output"),
            ("Normalization", "Preprocessing"),
            ("Frame", "Preprocessing"),
            ("Linear", "Layer"),
            ("Convolution", "Layer"),
            ("MaxPooling", "Layer"),
            ("Sigmoid", "Activation"),
            ("Tanh", "Activation"),
            ("ReLU", "Activation"),
            ("Softmax", "Activation"),
            ("Duplicate", "Fork"),
            ("Accumulate", "Join"),
        ]
        .into_iter()
        .map(|(name, category)| {
            let mut module_type = ModuleType::new(name, category);
            module_type.properties = default_properties(name);
            module_type
        })
        .collect();

        Self {
            server: ServerConfig::default(),
            backoff: BackoffPolicy::default(),
            defaults: BlockDefaults::default(),
            slider_step: 1000,
            log_filter: "dianne_builder=debug".to_string(),
            store_dir: PathBuf::from(".dianne"),
            catalog,
            targets: vec!["local".to_string()],
        }
    }
}

fn default_properties(module_type: &str) -> Vec<ModuleProperty> {
    let properties: &[(&str, &str)] = match module_type {
        "Linear" => &[("Input size", "inputSize"), ("Output size", "outputSize")],
        "Convolution" => &[
            ("Input planes", "noInputPlanes"),
            ("Output planes", "noOutputPlanes"),
            ("Kernel width", "kernelWidth"),
            ("Kernel height", "kernelHeight"),
            ("Stride X", "strideX"),
            ("Stride Y", "strideY"),
        ],
        "MaxPooling" => &[
            ("Width", "width"),
            ("Height", "height"),
            ("Stride X", "strideX"),
            ("Stride Y", "strideY"),
        ],
        "Frame" => &[("Width", "width"), ("Height", "height"), ("Channels", "channels")],
        _ => &[],
    };
    properties
        .iter()
        .map(|(name, id)| ModuleProperty::new(*name, *id))
        .collect()
}

impl BuilderConfig {
    /// Load configuration from a RON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        ron::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> std::io::Result<Self> {
        match Self::load(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save configuration to a RON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(path, content)
    }

    /// Round a slider handle to the configured step
    pub fn snap(&self, value: i64) -> i64 {
        if self.slider_step <= 1 {
            return value;
        }
        let half = self.slider_step / 2;
        value
            .saturating_add(half)
            .div_euclid(self.slider_step)
            .saturating_mul(self.slider_step)
    }
}
