// SPDX-License-Identifier: MIT OR Apache-2.0
//! UI modes and the per-mode connection editing table.

use crate::entity::AnchorClass;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The editing context the builder is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Assemble the network
    #[default]
    Build,
    /// Place modules on execution targets
    Deploy,
    /// Wire datasets, trainers and evaluators
    Learn,
    /// Feed inputs and observe outputs
    Run,
}

impl Mode {
    /// All modes
    pub fn all() -> &'static [Mode] {
        &[Mode::Build, Mode::Deploy, Mode::Learn, Mode::Run]
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Build => "build",
            Mode::Deploy => "deploy",
            Mode::Learn => "learn",
            Mode::Run => "run",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing a mode name
#[derive(Debug, thiserror::Error)]
#[error("Unknown mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::all()
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// What connection edits a mode allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditRule {
    /// Edges may be added/removed between anchors of this class
    Anchors(AnchorClass),
    /// Connection editing does not apply in this mode
    Disabled,
}

/// Mode -> edit rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRules {
    rules: IndexMap<Mode, EditRule>,
}

impl ConnectionRules {
    /// A table where every mode is disabled
    pub fn empty() -> Self {
        Self {
            rules: IndexMap::new(),
        }
    }

    /// Set the rule for a mode
    pub fn with_rule(mut self, mode: Mode, rule: EditRule) -> Self {
        self.rules.insert(mode, rule);
        self
    }

    /// Rule for a mode; modes without a row are disabled
    pub fn rule(&self, mode: Mode) -> EditRule {
        self.rules.get(&mode).copied().unwrap_or(EditRule::Disabled)
    }
}

impl Default for ConnectionRules {
    fn default() -> Self {
        Self::empty()
            .with_rule(Mode::Build, EditRule::Anchors(AnchorClass::Network))
            .with_rule(Mode::Learn, EditRule::Anchors(AnchorClass::Learning))
            .with_rule(Mode::Deploy, EditRule::Disabled)
            .with_rule(Mode::Run, EditRule::Disabled)
    }
}
