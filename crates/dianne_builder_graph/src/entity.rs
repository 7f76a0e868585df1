// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entity definitions: network modules and auxiliary blocks.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a module or block.
///
/// Fresh ids are random v4 UUIDs rendered as strings. Ids coming from
/// persisted state are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new random entity ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the raw string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which map an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Neural network module
    Module,
    /// Auxiliary block (dataset, trainer, run-mode I/O, ...)
    Block,
}

/// On which side of a connection a block sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSide {
    /// Feeds a module; stores the consumer in `input`
    Source,
    /// Observes a module; stores the module in `output`
    Target,
}

/// The fixed set of auxiliary block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    /// Dataset feeding the network during learning
    Dataset,
    /// Trainer attached to the network output
    Trainer,
    /// Evaluator attached to the network output
    Evaluator,
    /// Hand-drawn canvas input
    CanvasInput,
    /// Samples from a dataset as run input
    DatasetInput,
    /// Output probability display
    ProbabilityOutput,
    /// Camera frames as run input
    Camera,
    /// Image fetched from a URL as run input
    #[serde(rename = "URLInput")]
    UrlInput,
}

impl BlockType {
    /// Parse the type tag used on the canvas and in persisted state
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == name)
    }

    /// Type tag as used on the canvas and in persisted state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "Dataset",
            Self::Trainer => "Trainer",
            Self::Evaluator => "Evaluator",
            Self::CanvasInput => "CanvasInput",
            Self::DatasetInput => "DatasetInput",
            Self::ProbabilityOutput => "ProbabilityOutput",
            Self::Camera => "Camera",
            Self::UrlInput => "URLInput",
        }
    }

    /// All block types
    pub fn all() -> &'static [BlockType] {
        &[
            Self::Dataset,
            Self::Trainer,
            Self::Evaluator,
            Self::CanvasInput,
            Self::DatasetInput,
            Self::ProbabilityOutput,
            Self::Camera,
            Self::UrlInput,
        ]
    }

    /// Connection side of this block type
    pub fn side(&self) -> BlockSide {
        match self {
            Self::Trainer | Self::Evaluator | Self::ProbabilityOutput => BlockSide::Target,
            Self::Dataset
            | Self::CanvasInput
            | Self::DatasetInput
            | Self::Camera
            | Self::UrlInput => BlockSide::Source,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a module or block property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Free text
    Text(String),
    /// List of labels
    List(Vec<String>),
}

impl FieldValue {
    /// Parse raw form input: booleans, integers and floats are recognized,
    /// everything else stays text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        Self::Text(raw.to_string())
    }

    /// Integer view, accepting integral floats and numeric text
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view, accepting "true"/"false" text
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text view
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::from(items.clone()),
        }
    }

    /// Convert from a JSON value. Objects, nulls and non-string arrays are
    /// not representable.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Property map of an entity, in insertion order
pub type Fields = IndexMap<String, FieldValue>;

/// Field names that carry structure and cannot be set as properties
pub const RESERVED_FIELDS: &[&str] = &["id", "type", "next", "prev", "input", "output"];

/// Name of the trainable flag
pub const TRAINABLE_FIELD: &str = "trainable";

/// A neural network module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Unique instance ID
    pub id: EntityId,
    /// Module type tag ("Input", "Output", "Linear", ...)
    pub module_type: String,
    /// Downstream module
    pub next: Option<EntityId>,
    /// Upstream module
    pub prev: Option<EntityId>,
    /// Present only for modules capable of learning
    pub trainable: Option<bool>,
    /// Module-specific configuration
    pub fields: Fields,
}

impl Module {
    /// Create an unconnected module
    pub fn new(id: EntityId, module_type: impl Into<String>) -> Self {
        Self {
            id,
            module_type: module_type.into(),
            next: None,
            prev: None,
            trainable: None,
            fields: Fields::new(),
        }
    }

    /// Catalog category, when known
    pub fn category(&self) -> Option<&str> {
        self.fields.get("category").and_then(FieldValue::as_text)
    }

    /// Connection anchors exposed by this module
    pub fn anchors(&self) -> Anchors {
        Anchors::for_module(&self.module_type)
    }
}

/// An auxiliary block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unique instance ID
    pub id: EntityId,
    /// Block type
    pub block_type: BlockType,
    /// Consuming module (source-side blocks)
    pub input: Option<EntityId>,
    /// Targeted module (target-side blocks)
    pub output: Option<EntityId>,
    /// Kind-specific fields
    pub fields: Fields,
}

impl Block {
    /// Create an unconnected block
    pub fn new(id: EntityId, block_type: BlockType) -> Self {
        Self {
            id,
            block_type,
            input: None,
            output: None,
            fields: Fields::new(),
        }
    }

    /// The module this block is wired to, whichever side it is on
    pub fn linked_module(&self) -> Option<&EntityId> {
        match self.block_type.side() {
            BlockSide::Source => self.input.as_ref(),
            BlockSide::Target => self.output.as_ref(),
        }
    }

    /// Connection anchors exposed by this block
    pub fn anchors(&self) -> Anchors {
        Anchors::for_block(self.block_type)
    }
}

/// Borrowed view of either entity kind
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    /// A module
    Module(&'a Module),
    /// A block
    Block(&'a Block),
}

impl<'a> EntityRef<'a> {
    /// Entity ID
    pub fn id(&self) -> &'a EntityId {
        match self {
            Self::Module(m) => &m.id,
            Self::Block(b) => &b.id,
        }
    }

    /// Type tag
    pub fn type_name(&self) -> &'a str {
        match self {
            Self::Module(m) => &m.module_type,
            Self::Block(b) => b.block_type.as_str(),
        }
    }

    /// Entity kind
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Module(_) => EntityKind::Module,
            Self::Block(_) => EntityKind::Block,
        }
    }

    /// Property map
    pub fn fields(&self) -> &'a Fields {
        match self {
            Self::Module(m) => &m.fields,
            Self::Block(b) => &b.fields,
        }
    }

    /// Connection anchors
    pub fn anchors(&self) -> Anchors {
        match self {
            Self::Module(m) => m.anchors(),
            Self::Block(b) => b.anchors(),
        }
    }
}

/// Class of a connection anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorClass {
    /// Network wiring between modules
    Network,
    /// Learning/run wiring between blocks and modules
    Learning,
}

/// Source and target anchors an entity exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchors {
    /// Outgoing anchor class
    pub source: Option<AnchorClass>,
    /// Incoming anchor class
    pub target: Option<AnchorClass>,
}

impl Anchors {
    /// Anchors of a module type. `Input` takes learning input and `Output`
    /// feeds learning blocks; everything else is plain network wiring.
    pub fn for_module(module_type: &str) -> Self {
        match module_type {
            "Input" => Self {
                source: Some(AnchorClass::Network),
                target: Some(AnchorClass::Learning),
            },
            "Output" => Self {
                source: Some(AnchorClass::Learning),
                target: Some(AnchorClass::Network),
            },
            _ => Self {
                source: Some(AnchorClass::Network),
                target: Some(AnchorClass::Network),
            },
        }
    }

    /// Anchors of a block type
    pub fn for_block(block_type: BlockType) -> Self {
        match block_type.side() {
            BlockSide::Source => Self {
                source: Some(AnchorClass::Learning),
                target: None,
            },
            BlockSide::Target => Self {
                source: None,
                target: Some(AnchorClass::Learning),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_names() {
        for block_type in BlockType::all() {
            assert_eq!(BlockType::from_type_name(block_type.as_str()), Some(*block_type));
        }
        assert_eq!(BlockType::from_type_name("URLInput"), Some(BlockType::UrlInput));
        assert_eq!(BlockType::from_type_name("Linear"), None);
    }

    #[test]
    fn test_field_value_parse() {
        assert_eq!(FieldValue::parse("true"), FieldValue::Bool(true));
        assert_eq!(FieldValue::parse("42"), FieldValue::Int(42));
        assert_eq!(FieldValue::parse("0.5"), FieldValue::Float(0.5));
        assert_eq!(FieldValue::parse("MSE"), FieldValue::Text("MSE".into()));
        assert_eq!(FieldValue::Text("10".into()).as_int(), Some(10));
    }

    #[test]
    fn test_field_value_json() {
        let labels = FieldValue::List(vec!["0".into(), "1".into()]);
        assert_eq!(FieldValue::from_json(&labels.to_json()), Some(labels));
        assert_eq!(FieldValue::from_json(&serde_json::json!(3)), Some(FieldValue::Int(3)));
        assert_eq!(FieldValue::from_json(&serde_json::json!({"a": 1})), None);
        assert_eq!(FieldValue::from_json(&serde_json::json!([1, 2])), None);
    }

    #[test]
    fn test_anchors() {
        let input = Anchors::for_module("Input");
        assert_eq!(input.source, Some(AnchorClass::Network));
        assert_eq!(input.target, Some(AnchorClass::Learning));

        let dataset = Anchors::for_block(BlockType::Dataset);
        assert_eq!(dataset.source, Some(AnchorClass::Learning));
        assert_eq!(dataset.target, None);

        let trainer = Anchors::for_block(BlockType::Trainer);
        assert_eq!(trainer.target, Some(AnchorClass::Learning));
    }
}
