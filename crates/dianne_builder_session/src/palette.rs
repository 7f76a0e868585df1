// SPDX-License-Identifier: MIT OR Apache-2.0
//! Colours marking which target a module is deployed to.

use indexmap::IndexMap;

/// Colours handed out to targets in order, then reused
pub const DEPLOYMENT_COLORS: &[&str] = &[
    "#FF6CDA", "#81F781", "#81BEF7", "#F7BE81", "#BE81F7", "#F78181", "#81F7F3", "#F3F781",
];

/// Stable target -> colour assignment
#[derive(Debug, Clone, Default)]
pub struct DeploymentPalette {
    assigned: IndexMap<String, &'static str>,
}

impl DeploymentPalette {
    /// Create an empty palette
    pub fn new() -> Self {
        Self::default()
    }

    /// Colour of a target, assigning the next free one on first use
    pub fn color_for(&mut self, target: &str) -> &'static str {
        if let Some(color) = self.get(target) {
            return color;
        }
        let color = DEPLOYMENT_COLORS[self.assigned.len() % DEPLOYMENT_COLORS.len()];
        self.assigned.insert(target.to_string(), color);
        color
    }

    /// Colour already assigned to a target
    pub fn get(&self, target: &str) -> Option<&'static str> {
        self.assigned.get(target).copied()
    }

    /// Forget all assignments
    pub fn clear(&mut self) {
        self.assigned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_are_stable_per_target() {
        let mut palette = DeploymentPalette::new();
        let a = palette.color_for("node-a");
        let b = palette.color_for("node-b");
        assert_ne!(a, b);
        assert_eq!(palette.color_for("node-a"), a);
        assert_eq!(palette.get("node-b"), Some(b));
        assert_eq!(palette.get("node-c"), None);
    }

    #[test]
    fn test_colors_wrap_around() {
        let mut palette = DeploymentPalette::new();
        for i in 0..DEPLOYMENT_COLORS.len() {
            palette.color_for(&format!("t{i}"));
        }
        assert_eq!(palette.color_for("overflow"), DEPLOYMENT_COLORS[0]);
    }
}
