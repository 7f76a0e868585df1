// SPDX-License-Identifier: MIT OR Apache-2.0
//! The editing session: one graph model plus the collaborators it talks to.
//!
//! Service calls are awaited first and applied to the model afterwards, so
//! a failed or abandoned call never leaves a half-applied change behind.

use crate::canvas::{canvas_sample, Sample};
use crate::config::BuilderConfig;
use crate::error::{Result, ServiceResult, SessionError};
use crate::palette::DeploymentPalette;
use crate::services::{
    DeployRequest, DeployResponse, DeployScope, EvaluationResult, ForwardMode, LearnRequest, Services,
};
use crate::subscription::{Concern, Subscription, Subscriptions, Telemetry};
use dianne_builder_graph::{
    Block, BlockType, EntityId, EntityKind, FieldValue, GraphError, GraphModel, Layout, Mode, ModuleCatalog,
    ModuleProperty, ModuleType, SavedNetwork,
};
use futures::future::BoxFuture;

/// Module field carrying the catalog category
pub const CATEGORY_FIELD: &str = "category";

/// Name given to networks until the user picks one
pub const DEFAULT_NETWORK_NAME: &str = "unnamed";

/// A user's editing session
#[derive(Debug)]
pub struct EditingSession {
    config: BuilderConfig,
    graph: GraphModel,
    catalog: ModuleCatalog,
    layout: Layout,
    palette: DeploymentPalette,
    services: Services,
    subscriptions: Subscriptions,
    name: String,
    nn_id: Option<String>,
}

impl EditingSession {
    /// Create a session with an empty canvas
    pub fn new(config: BuilderConfig, services: Services) -> Self {
        let graph = GraphModel::with_defaults(config.defaults.clone());
        let subscriptions = Subscriptions::new(services.events.clone(), config.backoff.clone());
        Self {
            config,
            graph,
            catalog: ModuleCatalog::new(),
            layout: Layout::default(),
            palette: DeploymentPalette::new(),
            services,
            subscriptions,
            name: DEFAULT_NETWORK_NAME.to_string(),
            nn_id: None,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// The graph model
    pub fn graph(&self) -> &GraphModel {
        &self.graph
    }

    /// Mutable access for structural edits
    pub fn graph_mut(&mut self) -> &mut GraphModel {
        &mut self.graph
    }

    /// Known module types
    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Canvas layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Mutable canvas layout
    pub fn layout_mut(&mut self) -> &mut Layout {
        &mut self.layout
    }

    /// Network name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the network
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Instance id assigned by the deployer
    pub fn nn_id(&self) -> Option<&str> {
        self.nn_id.as_deref()
    }

    /// Open telemetry streams
    pub fn subscriptions(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }

    /// Switch editing mode
    pub fn set_mode(&mut self, mode: Mode) {
        if self.graph.mode() != mode {
            tracing::debug!("Switch to {mode} mode");
        }
        self.graph.set_mode(mode);
    }

    /// Fetch the module types from the catalog service
    pub async fn refresh_catalog(&mut self) -> Result<usize> {
        let types = self.services.catalog.available_modules().await?;
        let count = types.len();
        for module_type in types {
            self.catalog.register(module_type);
        }
        tracing::debug!("Catalog holds {} module types", self.catalog.len());
        Ok(count)
    }

    /// Add a module or block. Modules get their catalog category.
    pub fn add_module(&mut self, entity_type: &str, id: Option<EntityId>) -> Option<EntityId> {
        let id = self.graph.add_module(entity_type, id)?;
        if let Some(category) = self.catalog.category_of(entity_type) {
            if self.graph.module(&id).is_some() {
                let value = FieldValue::Text(category.to_string());
                if let Err(e) = self.graph.configure(&id, CATEGORY_FIELD, value) {
                    tracing::warn!("Could not tag {id} with its category: {e}");
                }
            }
        }
        Some(id)
    }

    /// Delete a module or block together with its canvas position
    pub fn remove(&mut self, id: &EntityId) -> Result<EntityKind> {
        let kind = self.graph.remove_entity(id)?;
        self.layout.retain_known(&self.graph);
        Ok(kind)
    }

    /// Configuration form of a module, fetching its properties on first use
    pub async fn property_form(&mut self, id: &EntityId) -> Result<Vec<ModuleProperty>> {
        let module = self
            .graph
            .module(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        let module_type = module.module_type.clone();
        let category = module.category().unwrap_or_default().to_string();

        let cached = self
            .catalog
            .get(&module_type)
            .is_some_and(|t| !t.properties.is_empty());
        if !cached {
            let properties = self.services.catalog.module_properties(&module_type).await?;
            if self.catalog.get(&module_type).is_none() {
                self.catalog.register(ModuleType::new(module_type.clone(), category));
            }
            self.catalog.set_properties(&module_type, properties);
        }

        let module = self
            .graph
            .module(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        Ok(self.catalog.property_form(module))
    }

    /// Targets offered by the deployer
    pub async fn targets(&self) -> Result<Vec<String>> {
        Ok(self.services.deployer.targets().await?)
    }

    /// Deploy one module. Returns how many modules the deployer reported.
    pub async fn deploy(&mut self, id: &EntityId, target: &str) -> Result<usize> {
        if self.graph.is_deployed(id) {
            return Err(GraphError::Deployed(id.clone()).into());
        }
        let request = DeployRequest {
            id: self.nn_id.clone(),
            name: self.name.clone(),
            scope: DeployScope::Module(self.graph.module_json(id)?),
            target: target.to_string(),
        };
        let response = self.services.deployer.deploy(request).await?;
        Ok(self.apply_deployment(response))
    }

    /// Deploy the whole network onto one target
    pub async fn deploy_all(&mut self, target: &str) -> Result<usize> {
        let request = DeployRequest {
            id: self.nn_id.clone(),
            name: self.name.clone(),
            scope: DeployScope::Modules(self.graph.to_network_json()),
            target: target.to_string(),
        };
        let response = self.services.deployer.deploy(request).await?;
        Ok(self.apply_deployment(response))
    }

    fn apply_deployment(&mut self, response: DeployResponse) -> usize {
        self.nn_id = Some(response.id);
        let mut applied = 0;
        for (id, target) in response.deployment {
            match self.graph.mark_deployed(&id, target.as_str()) {
                Ok(()) => {
                    self.palette.color_for(&target);
                    applied += 1;
                }
                Err(e) => tracing::warn!("Ignoring deployment of {id}: {e}"),
            }
        }
        applied
    }

    /// Undeploy one module
    pub async fn undeploy(&mut self, id: &EntityId) -> Result<()> {
        if !self.graph.is_deployed(id) {
            return Err(GraphError::NotFound(id.clone()).into());
        }
        let nn_id = self.nn_id.clone().ok_or(SessionError::NotDeployed)?;
        self.services.deployer.undeploy(&nn_id, id).await?;
        self.graph.mark_undeployed(id);
        Ok(())
    }

    /// Undeploy every deployed module. Stops at the first failure.
    pub async fn undeploy_all(&mut self) -> Result<usize> {
        let ids: Vec<EntityId> = self.graph.deployment().map(|(id, _)| id.clone()).collect();
        for id in &ids {
            self.undeploy(id).await?;
        }
        Ok(ids.len())
    }

    /// Colour of the target a module is deployed to
    pub fn deployment_color(&self, id: &EntityId) -> Option<&'static str> {
        self.graph
            .deployment_of(id)
            .and_then(|target| self.palette.get(target))
    }

    fn require_block(&self, id: &EntityId, expected: BlockType) -> Result<&Block> {
        let block = self
            .graph
            .block(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        if block.block_type != expected {
            return Err(SessionError::WrongBlock {
                id: id.clone(),
                expected: expected.as_str(),
            });
        }
        Ok(block)
    }

    fn require_nn_id(&self) -> Result<String> {
        self.nn_id.clone().ok_or(SessionError::NotDeployed)
    }

    /// Train through a trainer block, reporting learner telemetry while the
    /// job runs. Learned labels are merged into the model; returns how many
    /// modules received labels.
    pub async fn learn<F>(&mut self, trainer: &EntityId, mut on_event: F) -> Result<usize>
    where
        F: FnMut(&Telemetry),
    {
        self.require_block(trainer, BlockType::Trainer)?;
        let request = LearnRequest {
            id: self.require_nn_id()?,
            config: self.graph.learning_config(),
            modules: self.graph.learn_modules(),
            target: trainer.clone(),
        };

        tracing::info!("Start learning with {trainer}");
        let learner = self.services.learner.clone();
        let labels = self.watch_job(learner.learn(request), &mut on_event).await?;
        let merged = self.graph.merge_labels(&labels);
        tracing::info!("Learning finished, labels for {merged} modules");
        Ok(merged)
    }

    /// Evaluate through an evaluator block, reporting telemetry while the
    /// job runs
    pub async fn evaluate<F>(&mut self, evaluator: &EntityId, mut on_event: F) -> Result<EvaluationResult>
    where
        F: FnMut(&Telemetry),
    {
        self.require_block(evaluator, BlockType::Evaluator)?;
        let request = LearnRequest {
            id: self.require_nn_id()?,
            config: self.graph.learning_config(),
            modules: Vec::new(),
            target: evaluator.clone(),
        };

        tracing::info!("Start evaluation with {evaluator}");
        let learner = self.services.learner.clone();
        let result = self.watch_job(learner.evaluate(request), &mut on_event).await?;
        tracing::info!("Evaluation finished: accuracy {}", result.accuracy);
        Ok(result)
    }

    async fn watch_job<T>(
        &mut self,
        mut job: BoxFuture<'_, ServiceResult<T>>,
        on_event: &mut impl FnMut(&Telemetry),
    ) -> ServiceResult<T> {
        let subscription = self.subscriptions.open(Concern::Learner);
        let outcome = loop {
            tokio::select! {
                result = &mut job => break result,
                Some(event) = subscription.next_event() => on_event(&event),
            }
        };
        while let Some(event) = subscription.try_next_event() {
            on_event(&event);
        }
        self.subscriptions.close(Concern::Learner);
        outcome
    }

    /// Start streaming output probabilities
    pub fn open_output_stream(&mut self) -> &mut Subscription {
        self.subscriptions.open(Concern::RunOutput)
    }

    /// Start streaming camera frames
    pub fn open_camera_stream(&mut self) -> &mut Subscription {
        self.subscriptions.open(Concern::Camera)
    }

    /// Close one telemetry stream
    pub fn close_stream(&mut self, concern: Concern) -> bool {
        self.subscriptions.close(concern)
    }

    /// Forward a 224x224 RGBA drawing through a canvas input block
    pub async fn forward_canvas(&self, input: &EntityId, rgba: &[u8]) -> Result<()> {
        self.require_block(input, BlockType::CanvasInput)?;
        let nn_id = self.require_nn_id()?;
        let sample = canvas_sample(rgba)?;
        self.services.runner.forward(&nn_id, input, sample).await?;
        Ok(())
    }

    /// Forward the image behind a URL through a URL input block
    pub async fn forward_url(&self, input: &EntityId, url: &str) -> Result<()> {
        self.require_block(input, BlockType::UrlInput)?;
        let nn_id = self.require_nn_id()?;
        self.services.runner.forward_url(&nn_id, input, url).await?;
        Ok(())
    }

    /// Forward a random sample of the block's dataset and return it
    pub async fn sample_dataset(&self, input: &EntityId) -> Result<Sample> {
        let block = self.require_block(input, BlockType::DatasetInput)?;
        let dataset = block
            .fields
            .get("dataset")
            .and_then(FieldValue::as_text)
            .unwrap_or(self.config.defaults.dataset.dataset.as_str())
            .to_string();
        let nn_id = self.require_nn_id()?;
        Ok(self.services.runner.sample(&nn_id, input, &dataset).await?)
    }

    /// Set how a fork or join module forwards
    pub async fn set_forward_mode(&self, module: &EntityId, mode: ForwardMode) -> Result<()> {
        if self.graph.module(module).is_none() {
            return Err(GraphError::NotFound(module.clone()).into());
        }
        let nn_id = self.require_nn_id()?;
        self.services.runner.set_forward_mode(&nn_id, module, mode).await?;
        Ok(())
    }

    /// Store the network and its layout
    pub async fn save(&self) -> Result<()> {
        let saved = SavedNetwork::capture(&self.graph, self.layout.clone());
        self.services.store.save(&saved).await?;
        tracing::info!("Saved network {} ({} modules)", self.name, saved.modules.len());
        Ok(())
    }

    /// Replace the canvas with the stored network
    pub async fn load(&mut self) -> Result<()> {
        let mut saved = self.services.store.load().await?;
        saved.restore(&mut self.graph)?;
        self.subscriptions.close_all();
        self.layout = saved.layout;
        self.palette.clear();
        self.nn_id = None;
        tracing::info!("Loaded network with {} modules", self.graph.module_count());
        Ok(())
    }

    /// Clear the canvas and close every stream
    pub fn reset(&mut self) {
        self.teardown();
        self.graph.reset();
        self.layout = Layout::default();
        self.palette.clear();
        self.nn_id = None;
    }

    /// Close every telemetry stream
    pub fn teardown(&mut self) {
        self.subscriptions.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::{
        CatalogService, DeploymentService, Labels, LearnerService, PersistenceService, RunService,
    };
    use crate::subscription::{EventSource, EventStream, LearnProgress, SubscriptionStatus};
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeBackend {
        deploy_requests: Mutex<Vec<DeployRequest>>,
        undeployed: Mutex<Vec<EntityId>>,
        learn_requests: Mutex<Vec<LearnRequest>>,
        forwarded: Mutex<Vec<Sample>>,
        stored: Mutex<Option<SavedNetwork>>,
    }

    impl CatalogService for FakeBackend {
        fn available_modules(&self) -> BoxFuture<'_, ServiceResult<Vec<ModuleType>>> {
            let types = vec![
                ModuleType::new("Input", "Input-Output"),
                ModuleType::new("Output", "Input-Output"),
                ModuleType::new("Linear", "Layer"),
            ];
            Box::pin(async move { Ok::<_, ServiceError>(types) })
        }

        fn module_properties<'a>(
            &'a self,
            module_type: &'a str,
        ) -> BoxFuture<'a, ServiceResult<Vec<ModuleProperty>>> {
            let properties = match module_type {
                "Linear" => vec![ModuleProperty::new("Output size", "outputSize")],
                _ => Vec::new(),
            };
            Box::pin(async move { Ok::<_, ServiceError>(properties) })
        }
    }

    impl DeploymentService for FakeBackend {
        fn targets(&self) -> BoxFuture<'_, ServiceResult<Vec<String>>> {
            Box::pin(async { Ok::<_, ServiceError>(vec!["node1".to_string(), "node2".to_string()]) })
        }

        fn deploy(&self, request: DeployRequest) -> BoxFuture<'_, ServiceResult<DeployResponse>> {
            let ids: Vec<String> = match &request.scope {
                DeployScope::Modules(modules) => modules.keys().cloned().collect(),
                DeployScope::Module(module) => module["id"].as_str().map(str::to_string).into_iter().collect(),
            };
            let response = DeployResponse {
                id: request.id.clone().unwrap_or_else(|| "nn-1".to_string()),
                deployment: ids
                    .into_iter()
                    .map(|id| (EntityId::from(id), request.target.clone()))
                    .collect(),
            };
            self.deploy_requests.lock().push(request);
            Box::pin(async move { Ok::<_, ServiceError>(response) })
        }

        fn undeploy<'a>(&'a self, _nn_id: &'a str, module: &'a EntityId) -> BoxFuture<'a, ServiceResult<()>> {
            self.undeployed.lock().push(module.clone());
            Box::pin(async { Ok::<_, ServiceError>(()) })
        }
    }

    impl LearnerService for FakeBackend {
        fn learn(&self, request: LearnRequest) -> BoxFuture<'_, ServiceResult<Labels>> {
            let mut labels = Labels::new();
            labels.insert(EntityId::from("out"), vec!["zero".to_string(), "one".to_string()]);
            self.learn_requests.lock().push(request);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ServiceError>(labels)
            })
        }

        fn evaluate(&self, _request: LearnRequest) -> BoxFuture<'_, ServiceResult<EvaluationResult>> {
            Box::pin(async {
                Err::<EvaluationResult, _>(ServiceError::Failed("evaluator crashed".into()))
            })
        }
    }

    impl RunService for FakeBackend {
        fn forward<'a>(&'a self, _nn_id: &'a str, _input: &'a EntityId, sample: Sample) -> BoxFuture<'a, ServiceResult<()>> {
            self.forwarded.lock().push(sample);
            Box::pin(async { Ok::<_, ServiceError>(()) })
        }

        fn forward_url<'a>(&'a self, _nn_id: &'a str, _input: &'a EntityId, _url: &'a str) -> BoxFuture<'a, ServiceResult<()>> {
            Box::pin(async { Ok::<_, ServiceError>(()) })
        }

        fn sample<'a>(&'a self, _nn_id: &'a str, _input: &'a EntityId, dataset: &'a str) -> BoxFuture<'a, ServiceResult<Sample>> {
            Box::pin(async move {
                if dataset == "MNIST" {
                    Ok(Sample { width: 1, height: 1, channels: 1, data: vec![0.5] })
                } else {
                    Err(ServiceError::NotFound(dataset.to_string()))
                }
            })
        }

        fn set_forward_mode<'a>(&'a self, _nn_id: &'a str, _module: &'a EntityId, _mode: ForwardMode) -> BoxFuture<'a, ServiceResult<()>> {
            Box::pin(async { Ok::<_, ServiceError>(()) })
        }
    }

    impl PersistenceService for FakeBackend {
        fn save<'a>(&'a self, network: &'a SavedNetwork) -> BoxFuture<'a, ServiceResult<()>> {
            *self.stored.lock() = Some(network.clone());
            Box::pin(async { Ok::<_, ServiceError>(()) })
        }

        fn load(&self) -> BoxFuture<'_, ServiceResult<SavedNetwork>> {
            let stored = self.stored.lock().clone();
            Box::pin(async move { stored.ok_or_else(|| ServiceError::NotFound("saved network".into())) })
        }
    }

    impl EventSource for FakeBackend {
        fn open(&self, concern: Concern) -> BoxFuture<'_, ServiceResult<EventStream>> {
            let messages: Vec<ServiceResult<String>> = match concern {
                Concern::Learner => vec![
                    Ok(r#"{"sample": 10, "error": 0.9}"#.to_string()),
                    Ok(r#"{"sample": 20, "error": 0.7}"#.to_string()),
                ],
                _ => Vec::new(),
            };
            let stream = futures::stream::iter(messages).chain(futures::stream::pending()).boxed();
            Box::pin(async move { Ok::<_, ServiceError>(stream) })
        }
    }

    fn session() -> (EditingSession, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        let session = EditingSession::new(BuilderConfig::default(), Services::from_backend(backend.clone()));
        (session, backend)
    }

    async fn mnist_session() -> (EditingSession, Arc<FakeBackend>) {
        let (mut session, backend) = session();
        session.refresh_catalog().await.unwrap();
        let input = session.add_module("Input", Some("in".into())).unwrap();
        let linear = session.add_module("Linear", Some("lin".into())).unwrap();
        let output = session.add_module("Output", Some("out".into())).unwrap();
        session.add_module("Dataset", Some("data".into())).unwrap();
        session.add_module("Trainer", Some("train".into())).unwrap();

        let graph = session.graph_mut();
        graph.connect(&input, &linear).unwrap();
        graph.connect(&linear, &output).unwrap();
        graph.set_trainable(&linear, true).unwrap();
        (session, backend)
    }

    #[tokio::test]
    async fn test_add_module_tags_category() {
        let (session, _) = mnist_session().await;
        let input = session.graph().module(&"in".into()).unwrap();
        assert_eq!(input.category(), Some("Input-Output"));
        assert!(session.graph().block(&"data".into()).is_some());
    }

    #[tokio::test]
    async fn test_remove_forgets_position() {
        let (mut session, _) = mnist_session().await;
        session.layout_mut().place("lin".into(), 120, 40);
        session.layout_mut().place("out".into(), 240, 40);

        assert_eq!(session.remove(&"lin".into()).unwrap(), EntityKind::Module);
        assert_eq!(session.layout().position_of(&"lin".into()), None);
        assert_eq!(session.layout().position_of(&"out".into()), Some((240, 40)));
        assert!(session.graph().module(&"in".into()).unwrap().next.is_none());
    }

    #[tokio::test]
    async fn test_property_form_fetches_once() {
        let (mut session, _) = mnist_session().await;
        session
            .graph_mut()
            .configure(&"lin".into(), "outputSize", FieldValue::Int(10))
            .unwrap();

        let form = session.property_form(&"lin".into()).await.unwrap();
        assert_eq!(form.len(), 1);
        assert_eq!(form[0].value.as_deref(), Some("10"));
        assert!(session.property_form(&"in".into()).await.unwrap().is_empty());
        assert!(matches!(
            session.property_form(&"data".into()).await,
            Err(SessionError::Graph(GraphError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_deploy_and_undeploy() {
        let (mut session, backend) = mnist_session().await;
        assert_eq!(session.targets().await.unwrap().len(), 2);

        assert_eq!(session.deploy(&"lin".into(), "node1").await.unwrap(), 1);
        assert_eq!(session.nn_id(), Some("nn-1"));
        assert_eq!(session.graph().deployment_of(&"lin".into()), Some("node1"));
        let color = session.deployment_color(&"lin".into()).unwrap();

        assert!(matches!(
            session.deploy(&"lin".into(), "node2").await,
            Err(SessionError::Graph(GraphError::Deployed(_)))
        ));

        assert_eq!(session.deploy_all("node2").await.unwrap(), 3);
        assert_eq!(session.graph().deployment_of(&"lin".into()), Some("node2"));
        assert_ne!(session.deployment_color(&"in".into()), Some(color));

        let requests = backend.deploy_requests.lock().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].id.as_deref(), Some("nn-1"));

        assert_eq!(session.undeploy_all().await.unwrap(), 3);
        assert_eq!(session.graph().deployment().count(), 0);
        assert_eq!(backend.undeployed.lock().len(), 3);
        assert!(matches!(
            session.undeploy(&"lin".into()).await,
            Err(SessionError::Graph(GraphError::NotFound(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_learn_merges_labels_and_reports_progress() {
        let (mut session, backend) = mnist_session().await;
        assert!(matches!(
            session.learn(&"train".into(), |_| {}).await,
            Err(SessionError::NotDeployed)
        ));
        assert!(matches!(
            session.learn(&"data".into(), |_| {}).await,
            Err(SessionError::WrongBlock { .. })
        ));

        session.deploy_all("node1").await.unwrap();
        let mut progress = Vec::new();
        let merged = session
            .learn(&"train".into(), |event| {
                if let Telemetry::Progress(p) = event {
                    progress.push(p.clone());
                }
            })
            .await
            .unwrap();

        assert_eq!(merged, 1);
        assert_eq!(
            progress,
            vec![
                LearnProgress { sample: 10, error: 0.9 },
                LearnProgress { sample: 20, error: 0.7 },
            ]
        );
        let out = session.graph().module(&"out".into()).unwrap();
        assert_eq!(
            out.fields.get("labels"),
            Some(&FieldValue::List(vec!["zero".into(), "one".into()]))
        );
        assert!(!session.subscriptions().is_open(Concern::Learner));

        let request = backend.learn_requests.lock()[0].clone();
        let modules: Vec<String> = request.modules.iter().map(|m| m.to_string()).collect();
        assert_eq!(modules, vec!["in", "lin", "out"]);
        assert!(request.config.contains_key("train"));
    }

    #[tokio::test]
    async fn test_failed_evaluation_closes_stream() {
        let (mut session, _) = mnist_session().await;
        session.add_module("Evaluator", Some("eval".into())).unwrap();
        session.deploy_all("node1").await.unwrap();

        let result = session.evaluate(&"eval".into(), |_| {}).await;
        assert!(matches!(result, Err(SessionError::Service(ServiceError::Failed(_)))));
        assert!(session.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_run_mode_inputs() {
        let (mut session, backend) = mnist_session().await;
        session.add_module("CanvasInput", Some("canvas".into())).unwrap();
        session.add_module("DatasetInput", Some("sampler".into())).unwrap();
        session.deploy_all("node1").await.unwrap();

        let rgba = vec![255u8; 224 * 224 * 4];
        session.forward_canvas(&"canvas".into(), &rgba).await.unwrap();
        assert_eq!(backend.forwarded.lock()[0].data.len(), 28 * 28);
        assert!(matches!(
            session.forward_canvas(&"canvas".into(), &rgba[..10]).await,
            Err(SessionError::Canvas(_))
        ));
        assert!(matches!(
            session.forward_url(&"canvas".into(), "http://example.org/img.png").await,
            Err(SessionError::WrongBlock { .. })
        ));

        let sample = session.sample_dataset(&"sampler".into()).await.unwrap();
        assert_eq!(sample.data, vec![0.5]);

        session
            .set_forward_mode(&"lin".into(), ForwardMode::WaitForAll)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_streams_close_on_replace_and_teardown() {
        let (mut session, _) = session();
        let first = session.open_output_stream().watch();
        let second = session.open_output_stream().watch();
        let camera = session.open_camera_stream().watch();
        assert_eq!(first.get(), SubscriptionStatus::Closed);
        assert_ne!(second.get(), SubscriptionStatus::Closed);

        assert!(session.close_stream(Concern::Camera));
        assert_eq!(camera.get(), SubscriptionStatus::Closed);

        drop(session);
        assert_eq!(second.get(), SubscriptionStatus::Closed);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let (mut session, _) = mnist_session().await;
        assert!(matches!(
            session.load().await,
            Err(SessionError::Service(ServiceError::NotFound(_)))
        ));

        session.layout_mut().place("in".into(), 40, 80);
        session.layout_mut().place("data".into(), 10, 10);
        session.deploy(&"lin".into(), "node1").await.unwrap();
        session.save().await.unwrap();

        session.reset();
        assert!(session.graph().is_empty());
        assert_eq!(session.nn_id(), None);

        session.load().await.unwrap();
        assert_eq!(session.graph().module_count(), 3);
        assert_eq!(session.graph().block_count(), 0);
        assert_eq!(session.graph().deployment().count(), 0);
        assert_eq!(session.layout().position_of(&"in".into()), Some((40, 80)));
        assert_eq!(session.layout().position_of(&"data".into()), None);
        assert_eq!(
            session.graph().module(&"lin".into()).unwrap().prev,
            Some(EntityId::from("in"))
        );
    }
}
