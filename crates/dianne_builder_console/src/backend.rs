// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process backend used when no DIANNE runtime is reachable.
//!
//! Implements every collaborator of an editing session. Deployments are
//! only recorded; learning and evaluation are simulated and report their
//! progress on the learner telemetry stream. Networks are stored as JSON
//! under the configured store directory.

use dianne_builder_graph::{EntityId, ModuleProperty, ModuleType, SavedNetwork};
use dianne_builder_session::error::{RpcError, RpcResult, ServiceError, ServiceResult};
use dianne_builder_session::services::{
    CatalogService, DeployRequest, DeployResponse, DeployScope, DeploymentService, EvaluationResult,
    ForwardMode, Labels, LearnRequest, LearnerService, PersistenceService, RunService,
};
use dianne_builder_session::subscription::{EventSource, EventStream, RunOutput};
use dianne_builder_session::{BuilderConfig, Concern, RpcTransport, Sample};
use futures::future::BoxFuture;
use futures::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// File name of the stored network inside the store directory
pub const STORE_FILE_NAME: &str = "network.json";

const TELEMETRY_CAPACITY: usize = 64;
const CLASS_COUNT: usize = 10;

#[derive(Debug, Clone)]
struct DeployedModule {
    module_type: String,
    target: String,
}

#[derive(Debug, Default)]
struct DeployedNetwork {
    name: String,
    modules: IndexMap<EntityId, DeployedModule>,
}

/// Offline stand-in for the builder backend
#[derive(Debug)]
pub struct OfflineBackend {
    catalog: Vec<ModuleType>,
    targets: Vec<String>,
    datasets: Vec<String>,
    store_path: PathBuf,
    step_delay: Duration,
    steps: u64,
    next_nn: AtomicU64,
    networks: Mutex<IndexMap<String, DeployedNetwork>>,
    learner_tx: broadcast::Sender<String>,
    run_tx: broadcast::Sender<String>,
}

impl OfflineBackend {
    /// Create a backend serving the configured catalog and targets
    pub fn new(config: &BuilderConfig) -> Self {
        let (learner_tx, _) = broadcast::channel(TELEMETRY_CAPACITY);
        let (run_tx, _) = broadcast::channel(TELEMETRY_CAPACITY);
        Self {
            catalog: config.catalog.clone(),
            targets: config.targets.clone(),
            datasets: vec![config.defaults.dataset.dataset.clone()],
            store_path: config.store_dir.join(STORE_FILE_NAME),
            step_delay: Duration::from_millis(200),
            steps: 5,
            next_nn: AtomicU64::new(1),
            networks: Mutex::new(IndexMap::new()),
            learner_tx,
            run_tx,
        }
    }

    /// Override the pace of simulated jobs
    pub fn with_pace(mut self, steps: u64, step_delay: Duration) -> Self {
        self.steps = steps.max(1);
        self.step_delay = step_delay;
        self
    }

    /// Ids of deployed network instances
    pub fn network_ids(&self) -> Vec<String> {
        self.networks.lock().keys().cloned().collect()
    }

    fn require_deployed(&self, nn_id: &str, module: &EntityId) -> ServiceResult<DeployedModule> {
        let networks = self.networks.lock();
        let network = networks
            .get(nn_id)
            .ok_or_else(|| ServiceError::NotFound(format!("network {nn_id}")))?;
        network
            .modules
            .get(module)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("module {module} of {nn_id}")))
    }

    fn outputs_of(&self, nn_id: &str) -> ServiceResult<Vec<EntityId>> {
        let networks = self.networks.lock();
        let network = networks
            .get(nn_id)
            .ok_or_else(|| ServiceError::NotFound(format!("network {nn_id}")))?;
        Ok(network
            .modules
            .iter()
            .filter(|(_, m)| m.module_type == "Output")
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn publish_outputs(&self, nn_id: &str, tags: Vec<String>) -> ServiceResult<()> {
        let uniform = 1.0 / CLASS_COUNT as f64;
        for id in self.outputs_of(nn_id)? {
            let output = RunOutput {
                id: id.to_string(),
                output: vec![uniform; CLASS_COUNT],
                labels: digit_labels(),
                tags: tags.clone(),
            };
            let message = serde_json::to_string(&output)
                .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
            // nobody listening is fine
            let _ = self.run_tx.send(message);
        }
        Ok(())
    }
}

fn digit_labels() -> Vec<String> {
    (0..CLASS_COUNT).map(|d| d.to_string()).collect()
}

fn module_type_of(record: &Value) -> String {
    record
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn block_field(config: &Map<String, Value>, block_type: &str, field: &str) -> Option<i64> {
    config
        .values()
        .find(|block| block.get("type").and_then(Value::as_str) == Some(block_type))
        .and_then(|block| block.get(field))
        .and_then(Value::as_i64)
}

fn broadcast_stream(rx: broadcast::Receiver<String>) -> EventStream {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(message) => return Some((Ok(message), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Telemetry reader fell behind, skipped {skipped} messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

impl CatalogService for OfflineBackend {
    fn available_modules(&self) -> BoxFuture<'_, ServiceResult<Vec<ModuleType>>> {
        let types = self.catalog.clone();
        Box::pin(async move { Ok::<_, ServiceError>(types) })
    }

    fn module_properties<'a>(
        &'a self,
        module_type: &'a str,
    ) -> BoxFuture<'a, ServiceResult<Vec<ModuleProperty>>> {
        Box::pin(async move {
            self.catalog
                .iter()
                .find(|t| t.name == module_type)
                .map(|t| t.properties.clone())
                .ok_or_else(|| ServiceError::NotFound(format!("module type {module_type}")))
        })
    }
}

impl DeploymentService for OfflineBackend {
    fn targets(&self) -> BoxFuture<'_, ServiceResult<Vec<String>>> {
        let targets = self.targets.clone();
        Box::pin(async move { Ok::<_, ServiceError>(targets) })
    }

    fn deploy(&self, request: DeployRequest) -> BoxFuture<'_, ServiceResult<DeployResponse>> {
        Box::pin(async move {
            if !self.targets.contains(&request.target) {
                return Err(ServiceError::NotFound(format!("target {}", request.target)));
            }

            let records: Vec<(EntityId, String)> = match &request.scope {
                DeployScope::Modules(modules) => modules
                    .iter()
                    .map(|(id, record)| (EntityId::from(id.as_str()), module_type_of(record)))
                    .collect(),
                DeployScope::Module(record) => {
                    let id = record
                        .get("id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| ServiceError::Failed("module without id".into()))?;
                    vec![(EntityId::from(id), module_type_of(record))]
                }
            };

            let nn_id = request
                .id
                .clone()
                .unwrap_or_else(|| format!("nn-{}", self.next_nn.fetch_add(1, Ordering::Relaxed)));

            let mut networks = self.networks.lock();
            let network = networks.entry(nn_id.clone()).or_default();
            network.name.clone_from(&request.name);
            let mut deployment = IndexMap::new();
            for (id, module_type) in records {
                network.modules.insert(
                    id.clone(),
                    DeployedModule {
                        module_type,
                        target: request.target.clone(),
                    },
                );
                deployment.insert(id, request.target.clone());
            }
            tracing::debug!(
                "Deployed {} modules of {} ({nn_id}) on {}",
                deployment.len(),
                network.name,
                request.target
            );

            Ok(DeployResponse { id: nn_id, deployment })
        })
    }

    fn undeploy<'a>(&'a self, nn_id: &'a str, module: &'a EntityId) -> BoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            let mut networks = self.networks.lock();
            let network = networks
                .get_mut(nn_id)
                .ok_or_else(|| ServiceError::NotFound(format!("network {nn_id}")))?;
            let removed = network
                .modules
                .shift_remove(module)
                .ok_or_else(|| ServiceError::NotFound(format!("module {module} of {nn_id}")))?;
            tracing::debug!("Undeployed {module} from {}", removed.target);
            if network.modules.is_empty() {
                networks.shift_remove(nn_id);
            }
            Ok::<_, ServiceError>(())
        })
    }
}

impl LearnerService for OfflineBackend {
    fn learn(&self, request: LearnRequest) -> BoxFuture<'_, ServiceResult<Labels>> {
        Box::pin(async move {
            let outputs = self.outputs_of(&request.id)?;
            let batch = block_field(&request.config, "Trainer", "batch").unwrap_or(10).max(1) as u64;

            for step in 1..=self.steps {
                tokio::time::sleep(self.step_delay).await;
                let progress = json!({"sample": step * batch, "error": 1.0 / step as f64});
                let _ = self.learner_tx.send(progress.to_string());
            }

            Ok::<_, ServiceError>(outputs
                .into_iter()
                .filter(|id| request.modules.contains(id))
                .map(|id| (id, digit_labels()))
                .collect())
        })
    }

    fn evaluate(&self, request: LearnRequest) -> BoxFuture<'_, ServiceResult<EvaluationResult>> {
        Box::pin(async move {
            if !self.networks.lock().contains_key(&request.id) {
                return Err(ServiceError::NotFound(format!("network {}", request.id)));
            }
            let test = block_field(&request.config, "Dataset", "test").unwrap_or(1000);
            let per_class = (test.max(CLASS_COUNT as i64) / CLASS_COUNT as i64) as f64;

            // every class is confused with its successor one time in ten
            let mut matrix = vec![vec![0.0; CLASS_COUNT]; CLASS_COUNT];
            for step in 1..=self.steps {
                tokio::time::sleep(self.step_delay).await;
                let seen = per_class * step as f64 / self.steps as f64;
                for (class, row) in matrix.iter_mut().enumerate() {
                    row[class] = (seen * 0.9).round();
                    row[(class + 1) % CLASS_COUNT] = (seen * 0.1).round();
                }
                let _ = self.learner_tx.send(json!(matrix).to_string());
            }

            let total: f64 = matrix.iter().flatten().sum();
            let correct: f64 = (0..CLASS_COUNT).map(|c| matrix[c][c]).sum();
            let accuracy = if total > 0.0 { 100.0 * correct / total } else { 0.0 };
            Ok(EvaluationResult {
                accuracy,
                confusion_matrix: matrix,
            })
        })
    }
}

impl RunService for OfflineBackend {
    fn forward<'a>(
        &'a self,
        nn_id: &'a str,
        input: &'a EntityId,
        sample: Sample,
    ) -> BoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            if !sample.is_well_formed() {
                return Err(ServiceError::Failed("sample does not match its shape".into()));
            }
            tracing::debug!(
                "Forward {}x{}x{} sample through {input}",
                sample.width,
                sample.height,
                sample.channels
            );
            self.publish_outputs(nn_id, Vec::new())
        })
    }

    fn forward_url<'a>(
        &'a self,
        nn_id: &'a str,
        input: &'a EntityId,
        url: &'a str,
    ) -> BoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ServiceError::Failed(format!("cannot fetch {url}")));
            }
            tracing::debug!("Forward {url} through {input}");
            self.publish_outputs(nn_id, vec![url.to_string()])
        })
    }

    fn sample<'a>(
        &'a self,
        nn_id: &'a str,
        input: &'a EntityId,
        dataset: &'a str,
    ) -> BoxFuture<'a, ServiceResult<Sample>> {
        Box::pin(async move {
            if !self.datasets.iter().any(|d| d == dataset) {
                return Err(ServiceError::NotFound(format!("dataset {dataset}")));
            }
            tracing::debug!("Sample {dataset} through {input}");
            self.publish_outputs(nn_id, vec![dataset.to_string()])?;
            Ok(Sample {
                width: 28,
                height: 28,
                channels: 1,
                data: vec![0.0; 28 * 28],
            })
        })
    }

    fn set_forward_mode<'a>(
        &'a self,
        nn_id: &'a str,
        module: &'a EntityId,
        mode: ForwardMode,
    ) -> BoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            let deployed = self.require_deployed(nn_id, module)?;
            if !matches!(deployed.module_type.as_str(), "Duplicate" | "Accumulate") {
                return Err(ServiceError::Failed(format!(
                    "{module} is a {}, not a fork or join",
                    deployed.module_type
                )));
            }
            tracing::debug!("{module} now uses {mode}");
            Ok(())
        })
    }
}

impl PersistenceService for OfflineBackend {
    fn save<'a>(&'a self, network: &'a SavedNetwork) -> BoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            let content = serde_json::to_vec_pretty(network)
                .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
            if let Some(dir) = self.store_path.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| ServiceError::Failed(e.to_string()))?;
            }
            tokio::fs::write(&self.store_path, content)
                .await
                .map_err(|e| ServiceError::Failed(e.to_string()))?;
            tracing::debug!("Stored network at {}", self.store_path.display());
            Ok::<_, ServiceError>(())
        })
    }

    fn load(&self) -> BoxFuture<'_, ServiceResult<SavedNetwork>> {
        Box::pin(async move {
            let content = match tokio::fs::read(&self.store_path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ServiceError::NotFound(self.store_path.display().to_string()));
                }
                Err(e) => return Err(ServiceError::Failed(e.to_string())),
            };
            serde_json::from_slice(&content).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
        })
    }
}

impl EventSource for OfflineBackend {
    fn open(&self, concern: Concern) -> BoxFuture<'_, ServiceResult<EventStream>> {
        let stream = match concern {
            Concern::Learner => broadcast_stream(self.learner_tx.subscribe()),
            Concern::RunOutput => broadcast_stream(self.run_tx.subscribe()),
            Concern::Camera => futures::stream::pending().boxed(),
        };
        Box::pin(async move { Ok::<_, ServiceError>(stream) })
    }
}

impl RpcTransport for OfflineBackend {
    fn post(&self, request: Value) -> BoxFuture<'_, RpcResult<Value>> {
        Box::pin(async move {
            let id = request.get("id").cloned().unwrap_or(Value::Null);
            let method = request.get("method").and_then(Value::as_str).unwrap_or_default();

            let result = match method {
                "availableDatasets" => Some(json!(self.datasets)),
                "availableNeuralNetworks" => Some(json!(self.network_ids())),
                "queuedJobs" | "runningJobs" | "finishedJobs" | "notifications" => Some(json!([])),
                "devices" => Some(json!(self
                    .targets
                    .iter()
                    .map(|t| json!({"id": t, "name": t}))
                    .collect::<Vec<_>>())),
                "status" => Some(json!({
                    "queued": 0,
                    "running": 0,
                    "devices": self.targets.len(),
                    "networks": self.networks.lock().len(),
                })),
                _ => None,
            };

            Ok::<_, RpcError>(match result {
                Some(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                None => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": format!("Method not found: {method}")},
                }),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dianne_builder_graph::{GraphModel, Layout};
    use dianne_builder_session::DianneRpc;
    use std::sync::Arc;

    fn backend() -> OfflineBackend {
        let mut config = BuilderConfig::default();
        config.store_dir = std::env::temp_dir().join(format!("dianne-offline-{}", std::process::id()));
        OfflineBackend::new(&config).with_pace(3, Duration::from_millis(10))
    }

    fn deploy_request(scope: DeployScope) -> DeployRequest {
        DeployRequest {
            id: None,
            name: "mnist".into(),
            scope,
            target: "local".into(),
        }
    }

    fn network() -> DeployScope {
        let mut modules = Map::new();
        modules.insert("in".into(), json!({"id": "in", "type": "Input"}));
        modules.insert("fork".into(), json!({"id": "fork", "type": "Duplicate"}));
        modules.insert("out".into(), json!({"id": "out", "type": "Output"}));
        DeployScope::Modules(modules)
    }

    #[tokio::test]
    async fn test_deploy_and_undeploy() {
        let backend = backend();
        let response = backend.deploy(deploy_request(network())).await.unwrap();
        assert_eq!(response.id, "nn-1");
        assert_eq!(response.deployment.len(), 3);

        let mut again = deploy_request(DeployScope::Module(json!({"id": "extra", "type": "Linear"})));
        again.id = Some(response.id.clone());
        assert_eq!(backend.deploy(again).await.unwrap().id, "nn-1");

        backend.undeploy("nn-1", &EntityId::from("extra")).await.unwrap();
        assert!(matches!(
            backend.undeploy("nn-1", &EntityId::from("extra")).await,
            Err(ServiceError::NotFound(_))
        ));

        let mut elsewhere = deploy_request(network());
        elsewhere.target = "mars".into();
        assert!(matches!(backend.deploy(elsewhere).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_learn_reports_progress() {
        let backend = backend();
        backend.deploy(deploy_request(network())).await.unwrap();
        let mut events = backend.open(Concern::Learner).await.unwrap();

        let request = LearnRequest {
            id: "nn-1".into(),
            config: Map::new(),
            modules: vec![EntityId::from("in"), EntityId::from("out")],
            target: EntityId::from("trainer"),
        };
        let labels = backend.learn(request).await.unwrap();
        assert_eq!(labels[&EntityId::from("out")].len(), CLASS_COUNT);

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&first).unwrap()["sample"], 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_accuracy() {
        let backend = backend();
        backend.deploy(deploy_request(network())).await.unwrap();
        let request = LearnRequest {
            id: "nn-1".into(),
            config: Map::new(),
            modules: Vec::new(),
            target: EntityId::from("eval"),
        };
        let result = backend.evaluate(request).await.unwrap();
        assert!((result.accuracy - 90.0).abs() < 1e-9);
        assert_eq!(result.confusion_matrix[3][4], 10.0);
    }

    #[tokio::test]
    async fn test_run_inputs() {
        let backend = backend();
        backend.deploy(deploy_request(network())).await.unwrap();
        let mut outputs = backend.open(Concern::RunOutput).await.unwrap();
        let input = EntityId::from("in");

        backend.forward_url("nn-1", &input, "http://example.org/7.png").await.unwrap();
        let output: RunOutput = serde_json::from_str(&outputs.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(output.id, "out");
        assert_eq!(output.tags, vec!["http://example.org/7.png".to_string()]);

        assert!(backend.sample("nn-1", &input, "CIFAR").await.is_err());
        assert!(backend.sample("nn-1", &input, "MNIST").await.unwrap().is_well_formed());

        let fork = EntityId::from("fork");
        backend
            .set_forward_mode("nn-1", &fork, ForwardMode::WaitForAll)
            .await
            .unwrap();
        assert!(backend
            .set_forward_mode("nn-1", &input, ForwardMode::WaitForAll)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let backend = backend();
        assert!(matches!(backend.load().await, Err(ServiceError::NotFound(_))));

        let mut graph = GraphModel::new();
        graph.add_module("Input", Some("in".into()));
        let mut layout = Layout::default();
        layout.place(EntityId::from("in"), 40, 80);
        let saved = SavedNetwork::capture(&graph, layout);

        backend.save(&saved).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), saved);
        tokio::fs::remove_dir_all(backend.store_path.parent().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_rpc() {
        let backend = Arc::new(backend());
        let rpc = DianneRpc::new(backend.clone());
        assert_eq!(rpc.available_datasets().await.unwrap(), json!(["MNIST"]));
        assert_eq!(rpc.queued_jobs().await.unwrap(), json!([]));
        assert!(matches!(
            rpc.learn("nn-1", "MNIST", json!({})).await,
            Err(RpcError::Remote { code: -32601, .. })
        ));
    }
}
