// SPDX-License-Identifier: MIT OR Apache-2.0
//! The graph model: modules, blocks, their connections and the deployment map.

use crate::connection::{Connection, LinkKind};
use crate::dataset::DatasetSplit;
use crate::defaults::BlockDefaults;
use crate::entity::{
    Block, BlockSide, BlockType, EntityId, EntityKind, EntityRef, FieldValue, Module,
    RESERVED_FIELDS, TRAINABLE_FIELD,
};
use crate::error::{GraphError, IllegalReason, Result};
use crate::mode::{ConnectionRules, EditRule, Mode};
use crate::policy::{AllowAll, StructuralPolicy};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Names of the dataset fields kept consistent by [`DatasetSplit`]
const SPLIT_FIELDS: &[&str] = &["total", "train", "test", "validation"];

/// The builder's graph of modules and blocks.
///
/// One instance lives per editing session. Every operation either applies
/// completely or returns an error with the model untouched.
#[derive(Clone)]
pub struct GraphModel {
    modules: IndexMap<EntityId, Module>,
    blocks: IndexMap<EntityId, Block>,
    deployment: IndexMap<EntityId, String>,
    mode: Mode,
    rules: ConnectionRules,
    defaults: BlockDefaults,
    policy: Arc<dyn StructuralPolicy>,
}

impl GraphModel {
    /// Create an empty model in build mode
    pub fn new() -> Self {
        Self::with_defaults(BlockDefaults::default())
    }

    /// Create an empty model with custom block defaults
    pub fn with_defaults(defaults: BlockDefaults) -> Self {
        Self {
            modules: IndexMap::new(),
            blocks: IndexMap::new(),
            deployment: IndexMap::new(),
            mode: Mode::default(),
            rules: ConnectionRules::default(),
            defaults,
            policy: Arc::new(AllowAll),
        }
    }

    /// An empty model sharing this model's mode, rules, defaults and policy
    pub(crate) fn empty_like(&self) -> Self {
        Self {
            modules: IndexMap::new(),
            blocks: IndexMap::new(),
            deployment: IndexMap::new(),
            mode: self.mode,
            rules: self.rules.clone(),
            defaults: self.defaults.clone(),
            policy: Arc::clone(&self.policy),
        }
    }

    /// Replace the structural add/remove policy
    pub fn set_policy(&mut self, policy: impl StructuralPolicy + 'static) {
        self.policy = Arc::new(policy);
    }

    /// Replace the per-mode connection table
    pub fn set_rules(&mut self, rules: ConnectionRules) {
        self.rules = rules;
    }

    /// Current connection table
    pub fn rules(&self) -> &ConnectionRules {
        &self.rules
    }

    /// Block defaults
    pub fn defaults(&self) -> &BlockDefaults {
        &self.defaults
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch mode
    pub fn set_mode(&mut self, mode: Mode) {
        tracing::debug!("switch to {mode}");
        self.mode = mode;
    }

    /// Create a module or block of the given type.
    ///
    /// Types in the block set become blocks with their default fields,
    /// everything else becomes a module. Returns `None` without touching the
    /// model when the policy refuses the type or `id` is already taken.
    pub fn add_module(&mut self, entity_type: &str, id: Option<EntityId>) -> Option<EntityId> {
        if entity_type.is_empty() || !self.policy.check_add_module(entity_type) {
            tracing::debug!("Refused to add module of type {entity_type:?}");
            return None;
        }

        let id = id.unwrap_or_default();
        if self.contains(&id) {
            tracing::warn!("Refused to add module {id}: id already in use");
            return None;
        }

        match BlockType::from_type_name(entity_type) {
            Some(block_type) => {
                let mut block = Block::new(id.clone(), block_type);
                block.fields = self.defaults.fields_for(block_type);
                self.blocks.insert(id.clone(), block);
            }
            None => {
                self.modules
                    .insert(id.clone(), Module::new(id.clone(), entity_type));
            }
        }

        tracing::debug!("Add module {id}");
        Some(id)
    }

    /// Delete a module or block.
    ///
    /// Deleting a module clears the back-references its neighbours and any
    /// wired blocks hold to it. Refused when the entity or a chained
    /// neighbour is deployed, or when the policy says no.
    pub fn remove_entity(&mut self, id: &EntityId) -> Result<EntityKind> {
        let entity = self
            .entity(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;

        if self.is_deployed(id) {
            return Err(GraphError::Deployed(id.clone()));
        }
        if let EntityRef::Module(module) = entity {
            let neighbours = module.next.iter().chain(module.prev.iter());
            if let Some(frozen) = neighbours.into_iter().find(|n| self.is_deployed(n)) {
                return Err(GraphError::Deployed(frozen.clone()));
            }
        }
        if !self.policy.check_remove_module(entity) {
            return Err(GraphError::Rejected(id.clone()));
        }

        let kind = if let Some(module) = self.modules.shift_remove(id) {
            if let Some(next) = module.next.as_ref().and_then(|n| self.modules.get_mut(n)) {
                next.prev = None;
            }
            if let Some(prev) = module.prev.as_ref().and_then(|p| self.modules.get_mut(p)) {
                prev.next = None;
            }
            for block in self.blocks.values_mut() {
                if block.input.as_ref() == Some(id) {
                    block.input = None;
                }
                if block.output.as_ref() == Some(id) {
                    block.output = None;
                }
            }
            EntityKind::Module
        } else {
            self.blocks.shift_remove(id);
            EntityKind::Block
        };

        tracing::debug!("Remove module {id}");
        Ok(kind)
    }

    /// Set a property on a module or block from a configuration dialog.
    ///
    /// `trainable` is routed to the module's trainable flag. Setting one of
    /// the dataset split fields renormalizes the split.
    pub fn configure(&mut self, id: &EntityId, field: &str, value: FieldValue) -> Result<()> {
        if RESERVED_FIELDS.contains(&field) {
            return Err(GraphError::ReservedField(field.to_string()));
        }
        if !self.contains(id) {
            return Err(GraphError::NotFound(id.clone()));
        }
        if self.is_deployed(id) {
            return Err(GraphError::Deployed(id.clone()));
        }

        if let Some(module) = self.modules.get_mut(id) {
            if field == TRAINABLE_FIELD {
                let trainable = value.as_bool().ok_or_else(|| GraphError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                })?;
                module.trainable = Some(trainable);
            } else {
                module.fields.insert(field.to_string(), value);
            }
        } else if let Some(block) = self.blocks.get_mut(id) {
            if block.block_type == BlockType::Dataset && SPLIT_FIELDS.contains(&field) {
                let part = value.as_int().ok_or_else(|| GraphError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                })?;
                let mut split =
                    DatasetSplit::from_fields(&block.fields).unwrap_or_else(|| DatasetSplit::new(0));
                split.set(field, part);
                split.write_to(&mut block.fields);
            } else {
                block.fields.insert(field.to_string(), value);
            }
        }

        tracing::debug!("Configure {id}: {field}");
        Ok(())
    }

    /// Toggle whether a module takes part in training
    pub fn set_trainable(&mut self, id: &EntityId, trainable: bool) -> Result<()> {
        if self.blocks.contains_key(id) {
            return Err(GraphError::InvalidValue {
                field: TRAINABLE_FIELD.to_string(),
                value: trainable.to_string(),
            });
        }
        self.configure(id, TRAINABLE_FIELD, FieldValue::Bool(trainable))
    }

    /// Move the split slider of a dataset block
    pub fn slide_dataset(&mut self, id: &EntityId, handle1: i64, handle2: i64) -> Result<DatasetSplit> {
        if self.modules.contains_key(id) {
            return Err(GraphError::NotADataset(id.clone()));
        }
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        if block.block_type != BlockType::Dataset {
            return Err(GraphError::NotADataset(id.clone()));
        }

        let mut split = DatasetSplit::from_fields(&block.fields).unwrap_or_else(|| DatasetSplit::new(0));
        split.slide(handle1, handle2);
        split.write_to(&mut block.fields);
        Ok(split)
    }

    /// Get any entity by ID
    pub fn entity(&self, id: &EntityId) -> Option<EntityRef<'_>> {
        self.modules
            .get(id)
            .map(EntityRef::Module)
            .or_else(|| self.blocks.get(id).map(EntityRef::Block))
    }

    /// Get a module by ID
    pub fn module(&self, id: &EntityId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Get a block by ID
    pub fn block(&self, id: &EntityId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// All modules in insertion order
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// All blocks in insertion order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Whether an entity with this ID exists
    pub fn contains(&self, id: &EntityId) -> bool {
        self.modules.contains_key(id) || self.blocks.contains_key(id)
    }

    /// Number of modules
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the model holds no entities
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.blocks.is_empty()
    }

    /// Drop every entity and deployment entry
    pub fn reset(&mut self) {
        self.modules.clear();
        self.blocks.clear();
        self.deployment.clear();
        tracing::debug!("Reset canvas");
    }

    /// Connect two entities, subject to the current mode's rule
    pub fn connect(&mut self, source: &EntityId, target: &EntityId) -> Result<()> {
        let kind = self.check_connection(source, target)?;
        self.check_slots(kind, source, target)
            .map_err(|reason| illegal(source, target, reason))?;

        self.link(kind, source, target);
        tracing::debug!("Add connection {source} -> {target}");
        Ok(())
    }

    /// Remove a connection, subject to the same checks as [`Self::connect`]
    pub fn disconnect(&mut self, source: &EntityId, target: &EntityId) -> Result<()> {
        let kind = self.check_connection(source, target)?;
        if !self.is_linked(kind, source, target) {
            return Err(illegal(source, target, IllegalReason::NotConnected));
        }

        self.unlink(kind, source, target);
        tracing::debug!("Remove connection {source} -> {target}");
        Ok(())
    }

    /// All connections, sorted by source then target
    pub fn connections(&self) -> Vec<Connection> {
        let mut connections: Vec<Connection> = self
            .modules
            .values()
            .filter_map(|m| {
                m.next
                    .as_ref()
                    .map(|next| Connection::new(m.id.clone(), next.clone(), LinkKind::Chain))
            })
            .collect();

        for block in self.blocks.values() {
            match block.block_type.side() {
                BlockSide::Source => {
                    if let Some(input) = &block.input {
                        connections.push(Connection::new(
                            block.id.clone(),
                            input.clone(),
                            LinkKind::BlockInput,
                        ));
                    }
                }
                BlockSide::Target => {
                    if let Some(output) = &block.output {
                        connections.push(Connection::new(
                            output.clone(),
                            block.id.clone(),
                            LinkKind::BlockOutput,
                        ));
                    }
                }
            }
        }

        connections.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        connections
    }

    /// Connections involving an entity
    pub fn connections_for(&self, id: &EntityId) -> Vec<Connection> {
        self.connections()
            .into_iter()
            .filter(|c| c.involves(id))
            .collect()
    }

    /// Mode, deployment and anchor checks shared by connect and disconnect
    fn check_connection(&self, source: &EntityId, target: &EntityId) -> Result<LinkKind> {
        let src = self
            .entity(source)
            .ok_or_else(|| GraphError::NotFound(source.clone()))?;
        let tgt = self
            .entity(target)
            .ok_or_else(|| GraphError::NotFound(target.clone()))?;

        let class = match self.rules.rule(self.mode) {
            EditRule::Disabled => {
                return Err(illegal(source, target, IllegalReason::ModeDisabled(self.mode)));
            }
            EditRule::Anchors(class) => class,
        };

        if let Some(frozen) = [source, target].into_iter().find(|id| self.is_deployed(id)) {
            return Err(illegal(source, target, IllegalReason::Deployed(frozen.clone())));
        }

        let kind = link_kind(src, tgt)
            .ok_or_else(|| illegal(source, target, IllegalReason::IncompatibleKinds))?;

        let anchors_match = src.anchors().source == Some(class)
            && tgt.anchors().target == Some(class)
            && kind.anchor_class() == class;
        if !anchors_match {
            return Err(illegal(source, target, IllegalReason::AnchorMismatch(self.mode)));
        }

        Ok(kind)
    }

    /// Single-fan checks: a module has one `next`, one `prev` and at most
    /// one feeding block; a block holds one reference.
    fn check_slots(
        &self,
        kind: LinkKind,
        source: &EntityId,
        target: &EntityId,
    ) -> std::result::Result<(), IllegalReason> {
        match kind {
            LinkKind::Chain => {
                if self.modules.get(source).is_some_and(|m| m.next.is_some()) {
                    return Err(IllegalReason::SlotOccupied(source.clone()));
                }
                if self.modules.get(target).is_some_and(|m| m.prev.is_some()) {
                    return Err(IllegalReason::SlotOccupied(target.clone()));
                }
            }
            LinkKind::BlockInput => {
                if self.blocks.get(source).is_some_and(|b| b.input.is_some()) {
                    return Err(IllegalReason::SlotOccupied(source.clone()));
                }
                if self
                    .blocks
                    .values()
                    .any(|b| b.input.as_ref() == Some(target))
                {
                    return Err(IllegalReason::SlotOccupied(target.clone()));
                }
            }
            LinkKind::BlockOutput => {
                if self.blocks.get(target).is_some_and(|b| b.output.is_some()) {
                    return Err(IllegalReason::SlotOccupied(target.clone()));
                }
            }
        }
        Ok(())
    }

    fn is_linked(&self, kind: LinkKind, source: &EntityId, target: &EntityId) -> bool {
        match kind {
            LinkKind::Chain => self
                .modules
                .get(source)
                .is_some_and(|m| m.next.as_ref() == Some(target)),
            LinkKind::BlockInput => self
                .blocks
                .get(source)
                .is_some_and(|b| b.input.as_ref() == Some(target)),
            LinkKind::BlockOutput => self
                .blocks
                .get(target)
                .is_some_and(|b| b.output.as_ref() == Some(source)),
        }
    }

    fn link(&mut self, kind: LinkKind, source: &EntityId, target: &EntityId) {
        match kind {
            LinkKind::Chain => {
                if let Some(m) = self.modules.get_mut(source) {
                    m.next = Some(target.clone());
                }
                if let Some(m) = self.modules.get_mut(target) {
                    m.prev = Some(source.clone());
                }
            }
            LinkKind::BlockInput => {
                if let Some(b) = self.blocks.get_mut(source) {
                    b.input = Some(target.clone());
                }
            }
            LinkKind::BlockOutput => {
                if let Some(b) = self.blocks.get_mut(target) {
                    b.output = Some(source.clone());
                }
            }
        }
    }

    fn unlink(&mut self, kind: LinkKind, source: &EntityId, target: &EntityId) {
        match kind {
            LinkKind::Chain => {
                if let Some(m) = self.modules.get_mut(source) {
                    m.next = None;
                }
                if let Some(m) = self.modules.get_mut(target) {
                    m.prev = None;
                }
            }
            LinkKind::BlockInput => {
                if let Some(b) = self.blocks.get_mut(source) {
                    b.input = None;
                }
            }
            LinkKind::BlockOutput => {
                if let Some(b) = self.blocks.get_mut(target) {
                    b.output = None;
                }
            }
        }
    }

    /// Insert a module as-is, keeping its id. Links are not touched.
    pub(crate) fn insert_module_raw(&mut self, mut module: Module) -> bool {
        if self.contains(&module.id) {
            return false;
        }
        module.next = None;
        module.prev = None;
        self.modules.insert(module.id.clone(), module);
        true
    }

    /// Insert a block as-is, keeping its id. Links are not touched.
    pub(crate) fn insert_block_raw(&mut self, mut block: Block) -> bool {
        if self.contains(&block.id) {
            return false;
        }
        block.input = None;
        block.output = None;
        self.blocks.insert(block.id.clone(), block);
        true
    }

    /// Link two loaded entities, enforcing kinds and single-fan slots but
    /// not the mode table or the deployment freeze.
    pub(crate) fn link_raw(
        &mut self,
        source: &EntityId,
        target: &EntityId,
    ) -> std::result::Result<(), String> {
        let src = self
            .entity(source)
            .ok_or_else(|| format!("edge source {source} is not a node"))?;
        let tgt = self
            .entity(target)
            .ok_or_else(|| format!("edge target {target} is not a node"))?;
        let kind = link_kind(src, tgt)
            .ok_or_else(|| format!("edge {source} -> {target} joins incompatible nodes"))?;
        self.check_slots(kind, source, target)
            .map_err(|reason| format!("edge {source} -> {target}: {reason}"))?;
        self.link(kind, source, target);
        Ok(())
    }

    /// Take over the entities and deployment of a staged model
    pub(crate) fn replace_contents(&mut self, staged: GraphModel) {
        self.modules = staged.modules;
        self.blocks = staged.blocks;
        self.deployment = staged.deployment;
    }

    /// Record that a module was deployed to a target
    pub fn mark_deployed(&mut self, id: &EntityId, target: impl Into<String>) -> Result<()> {
        if !self.modules.contains_key(id) {
            return Err(GraphError::NotFound(id.clone()));
        }
        let target = target.into();
        tracing::info!("Module {id} deployed to {target}");
        self.deployment.insert(id.clone(), target);
        Ok(())
    }

    /// Record that a module was undeployed; returns the previous target
    pub fn mark_undeployed(&mut self, id: &EntityId) -> Option<String> {
        let previous = self.deployment.shift_remove(id);
        if previous.is_some() {
            tracing::info!("Module {id} undeployed");
        }
        previous
    }

    /// Target a module is deployed to
    pub fn deployment_of(&self, id: &EntityId) -> Option<&str> {
        self.deployment.get(id).map(String::as_str)
    }

    /// Whether a module is deployed
    pub fn is_deployed(&self, id: &EntityId) -> bool {
        self.deployment.contains_key(id)
    }

    /// All deployment entries
    pub fn deployment(&self) -> impl Iterator<Item = (&EntityId, &str)> {
        self.deployment.iter().map(|(id, target)| (id, target.as_str()))
    }

    /// Write learned labels or other result fields onto a module, bypassing
    /// the deployment freeze.
    pub(crate) fn merge_field(&mut self, id: &EntityId, field: &str, value: FieldValue) -> bool {
        match self.modules.get_mut(id) {
            Some(module) => {
                module.fields.insert(field.to_string(), value);
                true
            }
            None => false,
        }
    }
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GraphModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphModel")
            .field("modules", &self.modules)
            .field("blocks", &self.blocks)
            .field("deployment", &self.deployment)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn illegal(source: &EntityId, target: &EntityId, reason: IllegalReason) -> GraphError {
    tracing::debug!("Refused connection {source} -> {target}: {reason}");
    GraphError::IllegalConnection {
        from: source.clone(),
        to: target.clone(),
        reason,
    }
}

/// How an edge between these endpoints would be stored, if at all
fn link_kind(source: EntityRef<'_>, target: EntityRef<'_>) -> Option<LinkKind> {
    match (source, target) {
        (EntityRef::Module(_), EntityRef::Module(_)) => Some(LinkKind::Chain),
        (EntityRef::Block(b), EntityRef::Module(_)) if b.block_type.side() == BlockSide::Source => {
            Some(LinkKind::BlockInput)
        }
        (EntityRef::Module(_), EntityRef::Block(b)) if b.block_type.side() == BlockSide::Target => {
            Some(LinkKind::BlockOutput)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (GraphModel, EntityId, EntityId) {
        let mut graph = GraphModel::new();
        let input = graph.add_module("Input", None).unwrap();
        let linear = graph.add_module("Linear", None).unwrap();
        graph.connect(&input, &linear).unwrap();
        (graph, input, linear)
    }

    fn assert_reciprocal(graph: &GraphModel) {
        for module in graph.modules() {
            if let Some(next) = &module.next {
                assert_eq!(graph.module(next).unwrap().prev.as_ref(), Some(&module.id));
            }
            if let Some(prev) = &module.prev {
                assert_eq!(graph.module(prev).unwrap().next.as_ref(), Some(&module.id));
            }
        }
    }

    #[test]
    fn test_add_classifies_entities() {
        let mut graph = GraphModel::new();
        let linear = graph.add_module("Linear", None).unwrap();
        let dataset = graph.add_module("Dataset", None).unwrap();

        assert!(graph.module(&linear).is_some());
        assert!(graph.block(&dataset).is_some());
        assert!(graph.block(&linear).is_none());
        assert!(graph.module(&dataset).is_none());

        let fields = &graph.block(&dataset).unwrap().fields;
        assert_eq!(fields.get("total"), Some(&FieldValue::Int(70000)));
        assert_eq!(fields.get("train"), Some(&FieldValue::Int(60000)));
        assert_eq!(fields.get("dataset"), Some(&FieldValue::Text("MNIST".into())));
    }

    #[test]
    fn test_add_with_taken_id_is_noop() {
        let mut graph = GraphModel::new();
        let id = EntityId::from("A");
        assert_eq!(graph.add_module("Linear", Some(id.clone())), Some(id.clone()));
        assert_eq!(graph.add_module("Trainer", Some(id.clone())), None);
        assert_eq!(graph.module_count(), 1);
        assert_eq!(graph.block_count(), 0);
    }

    #[test]
    fn test_add_refused_by_policy() {
        struct NoCameras;
        impl StructuralPolicy for NoCameras {
            fn check_add_module(&self, entity_type: &str) -> bool {
                entity_type != "Camera"
            }
        }

        let mut graph = GraphModel::new();
        graph.set_policy(NoCameras);
        assert!(graph.add_module("Camera", None).is_none());
        assert!(graph.add_module("Linear", None).is_some());
        assert_eq!(graph.block_count(), 0);
    }

    #[test]
    fn test_connect_sets_reciprocal_fields() {
        let (graph, input, linear) = chain();
        assert_eq!(graph.module(&input).unwrap().next.as_ref(), Some(&linear));
        assert_eq!(graph.module(&linear).unwrap().prev.as_ref(), Some(&input));
        assert_reciprocal(&graph);
    }

    #[test]
    fn test_connect_disconnect_sequences_stay_consistent() {
        let (mut graph, input, linear) = chain();
        let output = graph.add_module("Output", None).unwrap();

        graph.disconnect(&input, &linear).unwrap();
        assert_reciprocal(&graph);
        assert!(graph.disconnect(&input, &linear).is_err());
        graph.connect(&input, &linear).unwrap();
        assert!(graph.connect(&input, &linear).is_err());
        graph.connect(&linear, &output).unwrap();
        assert_reciprocal(&graph);
        graph.disconnect(&linear, &output).unwrap();
        graph.disconnect(&input, &linear).unwrap();
        assert_reciprocal(&graph);
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_single_fan() {
        let (mut graph, input, linear) = chain();
        let other = graph.add_module("ReLU", None).unwrap();

        let before = graph.serialize();
        let err = graph.connect(&input, &other).unwrap_err();
        assert!(matches!(
            err,
            GraphError::IllegalConnection { reason: IllegalReason::SlotOccupied(_), .. }
        ));
        let err = graph.connect(&other, &linear).unwrap_err();
        assert!(matches!(
            err,
            GraphError::IllegalConnection { reason: IllegalReason::SlotOccupied(_), .. }
        ));
        assert_eq!(graph.serialize(), before);
    }

    #[test]
    fn test_connect_unknown_ids() {
        let (mut graph, input, _) = chain();
        let missing = EntityId::from("missing");
        assert_eq!(graph.connect(&input, &missing), Err(GraphError::NotFound(missing.clone())));
        assert_eq!(graph.disconnect(&missing, &input), Err(GraphError::NotFound(missing)));
    }

    #[test]
    fn test_build_mode_anchor_rules() {
        let mut graph = GraphModel::new();
        let input = graph.add_module("Input", None).unwrap();
        let output = graph.add_module("Output", None).unwrap();
        let linear = graph.add_module("Linear", None).unwrap();
        let dataset = graph.add_module("Dataset", None).unwrap();

        // Output has no network source, Input no network target
        assert!(graph.connect(&output, &linear).is_err());
        assert!(graph.connect(&linear, &input).is_err());
        // Blocks are not wired in build mode
        assert!(graph.connect(&dataset, &input).is_err());
        assert!(graph.connect(&linear, &output).is_ok());
    }

    #[test]
    fn test_learn_mode_wiring() {
        let mut graph = GraphModel::new();
        let input = graph.add_module("Input", None).unwrap();
        let linear = graph.add_module("Linear", None).unwrap();
        let output = graph.add_module("Output", None).unwrap();
        let dataset = graph.add_module("Dataset", None).unwrap();
        let trainer = graph.add_module("Trainer", None).unwrap();
        let evaluator = graph.add_module("Evaluator", None).unwrap();

        graph.set_mode(Mode::Learn);
        graph.connect(&dataset, &input).unwrap();
        graph.connect(&output, &trainer).unwrap();
        graph.connect(&output, &evaluator).unwrap();

        assert_eq!(graph.block(&dataset).unwrap().input.as_ref(), Some(&input));
        assert_eq!(graph.block(&trainer).unwrap().output.as_ref(), Some(&output));
        assert_eq!(graph.block(&evaluator).unwrap().output.as_ref(), Some(&output));

        // Network wiring is not editable here
        assert!(graph.connect(&input, &linear).is_err());
        // Output -> Input is two modules
        assert!(graph.connect(&output, &input).is_err());
        // Block to block
        assert!(graph.connect(&dataset, &trainer).is_err());

        graph.disconnect(&output, &trainer).unwrap();
        assert!(graph.block(&trainer).unwrap().output.is_none());
    }

    #[test]
    fn test_deploy_and_run_modes_reject_edits() {
        let (mut graph, input, linear) = chain();
        let before = graph.serialize();

        for mode in [Mode::Deploy, Mode::Run] {
            graph.set_mode(mode);
            let err = graph.disconnect(&input, &linear).unwrap_err();
            assert!(matches!(
                err,
                GraphError::IllegalConnection { reason: IllegalReason::ModeDisabled(m), .. } if m == mode
            ));
            assert!(graph.connect(&input, &linear).is_err());
            assert_eq!(graph.serialize(), before);
        }
    }

    #[test]
    fn test_custom_rules_enable_run_wiring() {
        let mut graph = GraphModel::new();
        graph.set_rules(
            ConnectionRules::default().with_rule(Mode::Run, EditRule::Anchors(crate::entity::AnchorClass::Learning)),
        );
        let input = graph.add_module("Input", None).unwrap();
        let canvas = graph.add_module("CanvasInput", None).unwrap();
        graph.set_mode(Mode::Run);
        graph.connect(&canvas, &input).unwrap();
        assert_eq!(graph.block(&canvas).unwrap().input.as_ref(), Some(&input));
    }

    #[test]
    fn test_deployed_module_is_frozen() {
        let (mut graph, input, linear) = chain();
        let relu = graph.add_module("ReLU", None).unwrap();
        graph.mark_deployed(&linear, "node1").unwrap();
        let before = graph.serialize();

        assert_eq!(graph.remove_entity(&linear), Err(GraphError::Deployed(linear.clone())));
        assert!(graph.disconnect(&input, &linear).is_err());
        assert!(graph.connect(&linear, &relu).is_err());
        assert!(graph.configure(&linear, "outputSize", FieldValue::Int(10)).is_err());
        // Deleting a neighbour would clear the frozen module's prev
        assert_eq!(graph.remove_entity(&input), Err(GraphError::Deployed(linear.clone())));
        assert_eq!(graph.serialize(), before);

        graph.mark_undeployed(&linear);
        assert_eq!(graph.remove_entity(&linear), Ok(EntityKind::Module));
        assert!(graph.module(&input).unwrap().next.is_none());
    }

    #[test]
    fn test_remove_clears_neighbours() {
        let (mut graph, input, linear) = chain();
        let output = graph.add_module("Output", None).unwrap();
        graph.connect(&linear, &output).unwrap();

        graph.remove_entity(&linear).unwrap();
        assert!(graph.module(&input).unwrap().next.is_none());
        assert!(graph.module(&output).unwrap().prev.is_none());
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_remove_clears_block_references() {
        let mut graph = GraphModel::new();
        let input = graph.add_module("Input", None).unwrap();
        let dataset = graph.add_module("Dataset", None).unwrap();
        graph.set_mode(Mode::Learn);
        graph.connect(&dataset, &input).unwrap();

        graph.remove_entity(&input).unwrap();
        assert!(graph.block(&dataset).unwrap().input.is_none());

        assert_eq!(graph.remove_entity(&dataset), Ok(EntityKind::Block));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_remove_unknown() {
        let mut graph = GraphModel::new();
        let id = EntityId::from("nope");
        assert_eq!(graph.remove_entity(&id), Err(GraphError::NotFound(id)));
    }

    #[test]
    fn test_remove_refused_by_policy() {
        struct KeepInputs;
        impl StructuralPolicy for KeepInputs {
            fn check_remove_module(&self, entity: EntityRef<'_>) -> bool {
                entity.type_name() != "Input"
            }
        }

        let (mut graph, input, _) = chain();
        graph.set_policy(KeepInputs);
        assert_eq!(graph.remove_entity(&input), Err(GraphError::Rejected(input.clone())));
        assert!(graph.module(&input).is_some());
    }

    #[test]
    fn test_configure() {
        let (mut graph, input, linear) = chain();
        graph.configure(&linear, "outputSize", FieldValue::Int(10)).unwrap();
        assert_eq!(graph.module(&linear).unwrap().fields.get("outputSize"), Some(&FieldValue::Int(10)));

        assert_eq!(
            graph.configure(&linear, "next", FieldValue::Text(input.to_string())),
            Err(GraphError::ReservedField("next".into()))
        );

        graph.set_trainable(&linear, true).unwrap();
        assert_eq!(graph.module(&linear).unwrap().trainable, Some(true));
    }

    #[test]
    fn test_configure_dataset_keeps_split() {
        let mut graph = GraphModel::new();
        let dataset = graph.add_module("Dataset", None).unwrap();
        graph.configure(&dataset, "total", FieldValue::Int(50000)).unwrap();

        let split = DatasetSplit::from_fields(&graph.block(&dataset).unwrap().fields).unwrap();
        assert!(split.is_consistent());
        assert_eq!(split.total, 50000);
        assert_eq!(split.test, 10000);
        assert_eq!(split.train, 40000);
    }

    #[test]
    fn test_configure_dataset_train() {
        let mut graph = GraphModel::new();
        let dataset = graph.add_module("Dataset", None).unwrap();
        graph.configure(&dataset, "train", FieldValue::Int(5000)).unwrap();

        let fields = &graph.block(&dataset).unwrap().fields;
        assert_eq!(fields.get("train"), Some(&FieldValue::Int(5000)));
        assert_eq!(fields.get("validation"), Some(&FieldValue::Int(0)));
        assert_eq!(fields.get("test"), Some(&FieldValue::Int(65000)));
        assert!(DatasetSplit::from_fields(fields).unwrap().is_consistent());

        assert!(matches!(
            graph.configure(&dataset, "train", FieldValue::Text("all".into())),
            Err(GraphError::InvalidValue { .. })
        ));
        assert_eq!(
            graph.block(&dataset).unwrap().fields.get("train"),
            Some(&FieldValue::Int(5000))
        );
    }

    #[test]
    fn test_slide_dataset() {
        let mut graph = GraphModel::new();
        let dataset = graph.add_module("Dataset", None).unwrap();
        let trainer = graph.add_module("Trainer", None).unwrap();

        let split = graph.slide_dataset(&dataset, 10000, 20000).unwrap();
        assert_eq!((split.validation, split.test, split.train), (10000, 10000, 50000));

        let fields = &graph.block(&dataset).unwrap().fields;
        assert_eq!(fields.get("validation"), Some(&FieldValue::Int(10000)));
        assert_eq!(fields.get("train"), Some(&FieldValue::Int(50000)));

        assert_eq!(
            graph.slide_dataset(&trainer, 0, 0),
            Err(GraphError::NotADataset(trainer.clone()))
        );
    }

    #[test]
    fn test_mark_deployed_needs_module() {
        let mut graph = GraphModel::new();
        let trainer = graph.add_module("Trainer", None).unwrap();
        assert!(graph.mark_deployed(&trainer, "node1").is_err());
        assert_eq!(graph.deployment().count(), 0);
    }
}
