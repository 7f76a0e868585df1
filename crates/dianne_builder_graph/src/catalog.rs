// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of module types the backend can instantiate.

use crate::entity::{FieldValue, Module};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Category of the network's input and output modules
pub const INPUT_OUTPUT_CATEGORY: &str = "Input-Output";

/// Category of preprocessing modules
pub const PREPROCESSING_CATEGORY: &str = "Preprocessing";

/// One configurable property of a module type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProperty {
    /// Human readable label
    pub name: String,
    /// Field name on the module
    pub id: String,
    /// Current value, filled in by [`ModuleCatalog::property_form`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ModuleProperty {
    /// Create an unfilled property
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            value: None,
        }
    }
}

/// A module type offered in the toolbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleType {
    /// Type tag, e.g. "Linear"
    #[serde(rename = "type")]
    pub name: String,
    /// Toolbox category, e.g. "Layer"
    pub category: String,
    /// Configurable properties, when already fetched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ModuleProperty>,
}

impl ModuleType {
    /// Create a type without properties
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            properties: Vec::new(),
        }
    }
}

/// Registry of available module types
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    types: IndexMap<String, ModuleType>,
}

impl ModuleCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module type, replacing one with the same name
    pub fn register(&mut self, module_type: ModuleType) {
        self.types.insert(module_type.name.clone(), module_type);
    }

    /// Get a module type by name
    pub fn get(&self, name: &str) -> Option<&ModuleType> {
        self.types.get(name)
    }

    /// All registered types in registration order
    pub fn types(&self) -> impl Iterator<Item = &ModuleType> {
        self.types.values()
    }

    /// Types of one category
    pub fn types_in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ModuleType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Distinct categories in registration order
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for t in self.types.values() {
            if !categories.contains(&t.category.as_str()) {
                categories.push(&t.category);
            }
        }
        categories
    }

    /// Category of a type name
    pub fn category_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|t| t.category.as_str())
    }

    /// Store the properties fetched for a type. Returns false for unknown types.
    pub fn set_properties(&mut self, name: &str, properties: Vec<ModuleProperty>) -> bool {
        match self.types.get_mut(name) {
            Some(t) => {
                t.properties = properties;
                true
            }
            None => false,
        }
    }

    /// Properties of the module's type with values taken from the module
    pub fn property_form(&self, module: &Module) -> Vec<ModuleProperty> {
        let Some(module_type) = self.get(&module.module_type) else {
            return Vec::new();
        };
        module_type
            .properties
            .iter()
            .map(|p| ModuleProperty {
                value: module.fields.get(&p.id).map(FieldValue::to_string),
                ..p.clone()
            })
            .collect()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;

    fn catalog() -> ModuleCatalog {
        let mut catalog = ModuleCatalog::new();
        catalog.register(ModuleType::new("Input", INPUT_OUTPUT_CATEGORY));
        catalog.register(ModuleType::new("Output", INPUT_OUTPUT_CATEGORY));
        catalog.register(ModuleType::new("Linear", "Layer"));
        catalog.register(ModuleType::new("Sigmoid", "Activation"));
        catalog
    }

    #[test]
    fn test_categories() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.categories(), vec![INPUT_OUTPUT_CATEGORY, "Layer", "Activation"]);
        assert_eq!(catalog.types_in_category(INPUT_OUTPUT_CATEGORY).count(), 2);
        assert_eq!(catalog.category_of("Linear"), Some("Layer"));
        assert_eq!(catalog.category_of("Conv"), None);
    }

    #[test]
    fn test_property_form() {
        let mut catalog = catalog();
        assert!(catalog.set_properties(
            "Linear",
            vec![
                ModuleProperty::new("Input size", "inputSize"),
                ModuleProperty::new("Output size", "outputSize"),
            ],
        ));
        assert!(!catalog.set_properties("Conv", Vec::new()));

        let mut module = Module::new(EntityId::from("lin"), "Linear");
        module.fields.insert("outputSize".into(), FieldValue::Int(10));

        let form = catalog.property_form(&module);
        assert_eq!(form.len(), 2);
        assert_eq!(form[0].value, None);
        assert_eq!(form[1].value.as_deref(), Some("10"));

        let sigmoid = Module::new(EntityId::from("s"), "Sigmoid");
        assert!(catalog.property_form(&sigmoid).is_empty());
    }

    #[test]
    fn test_parse_service_listing() {
        let types: Vec<ModuleType> =
            serde_json::from_str(r#"[{"type": "Linear", "category": "Layer"}]"#).unwrap();
        assert_eq!(types[0], ModuleType::new("Linear", "Layer"));
    }
}
