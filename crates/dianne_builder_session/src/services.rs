// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backend collaborators of an editing session.
//!
//! Every collaborator is an object-safe trait returning boxed futures, so a
//! session can hold them behind `Arc<dyn _>` and tests can swap in fakes.

use crate::canvas::Sample;
use crate::error::ServiceResult;
use crate::subscription::EventSource;
use dianne_builder_graph::{EntityId, ModuleProperty, ModuleType, NetworkJson, SavedNetwork};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Lists module types and their configurable properties
pub trait CatalogService: Send + Sync {
    /// Module types the backend can instantiate
    fn available_modules(&self) -> BoxFuture<'_, ServiceResult<Vec<ModuleType>>>;

    /// Configurable properties of a module type
    fn module_properties<'a>(
        &'a self,
        module_type: &'a str,
    ) -> BoxFuture<'a, ServiceResult<Vec<ModuleProperty>>>;
}

/// What a deploy request covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployScope {
    /// The whole network description
    Modules(NetworkJson),
    /// A single module record
    Module(Value),
}

/// Request to deploy modules onto a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Network instance id from an earlier deploy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Network name
    pub name: String,
    /// What to deploy
    #[serde(flatten)]
    pub scope: DeployScope,
    /// Runtime target
    pub target: String,
}

/// Answer to a deploy request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResponse {
    /// Network instance id
    pub id: String,
    /// Module id -> target for every module now deployed
    #[serde(default)]
    pub deployment: IndexMap<EntityId, String>,
}

/// Places modules on runtime targets
pub trait DeploymentService: Send + Sync {
    /// Targets modules can be deployed to
    fn targets(&self) -> BoxFuture<'_, ServiceResult<Vec<String>>>;

    /// Deploy modules
    fn deploy(&self, request: DeployRequest) -> BoxFuture<'_, ServiceResult<DeployResponse>>;

    /// Undeploy one module of a network instance
    fn undeploy<'a>(&'a self, nn_id: &'a str, module: &'a EntityId) -> BoxFuture<'a, ServiceResult<()>>;
}

/// Learn or evaluate job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnRequest {
    /// Network instance id
    pub id: String,
    /// Learning configuration (all blocks)
    pub config: Map<String, Value>,
    /// Modules taking part
    #[serde(default)]
    pub modules: Vec<EntityId>,
    /// Trainer or evaluator block running the job
    pub target: EntityId,
}

/// Labels learned per output module
pub type Labels = IndexMap<EntityId, Vec<String>>;

/// Outcome of an evaluation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Accuracy in percent
    pub accuracy: f64,
    /// Confusion matrix entries
    #[serde(rename = "confusionMatrix", default)]
    pub confusion_matrix: Vec<Vec<f64>>,
}

/// Runs training and evaluation
pub trait LearnerService: Send + Sync {
    /// Train; resolves when the job finishes
    fn learn(&self, request: LearnRequest) -> BoxFuture<'_, ServiceResult<Labels>>;

    /// Evaluate; resolves when the job finishes
    fn evaluate(&self, request: LearnRequest) -> BoxFuture<'_, ServiceResult<EvaluationResult>>;
}

/// When fork and join modules forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForwardMode {
    /// Forward as soon as any input changes
    ForwardOnChange,
    /// Wait until every input (or gradient) arrived
    WaitForAll,
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ForwardOnChange => "FORWARD_ON_CHANGE",
            Self::WaitForAll => "WAIT_FOR_ALL",
        })
    }
}

/// Feeds inputs into a deployed network
pub trait RunService: Send + Sync {
    /// Forward a sample through an input block
    fn forward<'a>(
        &'a self,
        nn_id: &'a str,
        input: &'a EntityId,
        sample: Sample,
    ) -> BoxFuture<'a, ServiceResult<()>>;

    /// Forward the image behind a URL
    fn forward_url<'a>(
        &'a self,
        nn_id: &'a str,
        input: &'a EntityId,
        url: &'a str,
    ) -> BoxFuture<'a, ServiceResult<()>>;

    /// Forward a random dataset sample and return it
    fn sample<'a>(
        &'a self,
        nn_id: &'a str,
        input: &'a EntityId,
        dataset: &'a str,
    ) -> BoxFuture<'a, ServiceResult<Sample>>;

    /// Change how a fork or join module forwards
    fn set_forward_mode<'a>(
        &'a self,
        nn_id: &'a str,
        module: &'a EntityId,
        mode: ForwardMode,
    ) -> BoxFuture<'a, ServiceResult<()>>;
}

/// Stores networks with their layout
pub trait PersistenceService: Send + Sync {
    /// Store a network
    fn save<'a>(&'a self, network: &'a SavedNetwork) -> BoxFuture<'a, ServiceResult<()>>;

    /// Fetch the stored network
    fn load(&self) -> BoxFuture<'_, ServiceResult<SavedNetwork>>;
}

/// Every collaborator a session talks to
#[derive(Clone)]
pub struct Services {
    /// Module catalog
    pub catalog: Arc<dyn CatalogService>,
    /// Deployer
    pub deployer: Arc<dyn DeploymentService>,
    /// Learner
    pub learner: Arc<dyn LearnerService>,
    /// Run-mode input
    pub runner: Arc<dyn RunService>,
    /// Save/load
    pub store: Arc<dyn PersistenceService>,
    /// Telemetry streams
    pub events: Arc<dyn EventSource>,
}

impl Services {
    /// Use one backend for every collaborator
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: CatalogService
            + DeploymentService
            + LearnerService
            + RunService
            + PersistenceService
            + EventSource
            + 'static,
    {
        Self {
            catalog: backend.clone(),
            deployer: backend.clone(),
            learner: backend.clone(),
            runner: backend.clone(),
            store: backend.clone(),
            events: backend,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deploy_request_shape() {
        let request = DeployRequest {
            id: None,
            name: "mnist".into(),
            scope: DeployScope::Module(json!({"id": "lin", "type": "Linear"})),
            target: "node1".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["module"]["type"], "Linear");
        assert_eq!(value["target"], "node1");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_parse_responses() {
        let deployed: DeployResponse =
            serde_json::from_value(json!({"id": "nn-1", "deployment": {"a": "node1", "b": "node2"}})).unwrap();
        assert_eq!(deployed.deployment.len(), 2);
        assert_eq!(deployed.deployment[&EntityId::from("b")], "node2");

        let evaluation: EvaluationResult =
            serde_json::from_value(json!({"accuracy": 97.5, "confusionMatrix": [[0, 0, 12]]})).unwrap();
        assert_eq!(evaluation.accuracy, 97.5);
        assert_eq!(evaluation.confusion_matrix, vec![vec![0.0, 0.0, 12.0]]);

        assert_eq!(serde_json::to_value(ForwardMode::WaitForAll).unwrap(), json!("WAIT_FOR_ALL"));
    }
}
