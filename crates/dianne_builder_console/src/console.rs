// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-oriented command console over an editing session.

use dianne_builder_graph::{EntityId, EntityKind, EntityRef, FieldValue, GraphError, Mode};
use dianne_builder_session::{
    Concern, DianneRpc, EditingSession, ForwardMode, RpcError, SessionError, Telemetry,
};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Horizontal spacing of auto-placed nodes
const PLACEMENT_STEP: i64 = 120;

/// Commands with their usage and a short description
const COMMANDS: &[(&str, &str, &str)] = &[
    ("mode", "mode <build|deploy|learn|run>", "Switch editing mode"),
    ("add", "add <type> [id]", "Add a module or block"),
    ("rm", "rm <id>", "Remove a module or block"),
    ("connect", "connect <from> <to>", "Connect two entities"),
    ("disconnect", "disconnect <from> <to>", "Remove a connection"),
    ("set", "set <id> <field> <value>", "Configure a property"),
    ("trainable", "trainable <id> <on|off>", "Toggle training of a module"),
    ("slide", "slide <dataset> <handle1> <handle2>", "Move the dataset split slider"),
    ("place", "place <id> <x> <y>", "Move a node on the canvas"),
    ("name", "name <network>", "Rename the network"),
    ("types", "types [category]", "List module types"),
    ("props", "props <id>", "Show the configuration form of a module"),
    ("targets", "targets", "List deployment targets"),
    ("deploy", "deploy <id> [target]", "Deploy one module"),
    ("deploy-all", "deploy-all [target]", "Deploy the whole network"),
    ("undeploy", "undeploy <id>", "Undeploy one module"),
    ("undeploy-all", "undeploy-all", "Undeploy every module"),
    ("learn", "learn <trainer>", "Train through a trainer block"),
    ("eval", "eval <evaluator>", "Evaluate through an evaluator block"),
    ("draw", "draw <input> <rgba-file>", "Forward a 224x224 RGBA drawing"),
    ("url", "url <input> <url>", "Forward the image behind a URL"),
    ("sample", "sample <input>", "Forward a random dataset sample"),
    ("fork-mode", "fork-mode <module> <on-change|wait-all>", "Set fork/join forwarding"),
    ("watch", "watch <output|camera|learner>", "Open a telemetry stream"),
    ("unwatch", "unwatch <output|camera|learner>", "Close a telemetry stream"),
    ("events", "events", "Print received telemetry"),
    ("show", "show [id]", "Show the network or one entity"),
    ("export", "export", "Print the network description"),
    ("snapshot", "snapshot", "Print the graph snapshot"),
    ("save", "save", "Store the network and its layout"),
    ("load", "load", "Replace the canvas with the stored network"),
    ("reset", "reset", "Clear the canvas"),
    ("datasets", "datasets", "List datasets known to the platform"),
    ("jobs", "jobs", "List queued, running and finished jobs"),
    ("status", "status", "Show platform status"),
    ("rpc", "rpc <method> [params-json]", "Call a JSON-RPC method"),
    ("history", "history", "Show command history"),
    ("help", "help", "Show this help"),
    ("quit", "quit", "Leave the builder"),
];

fn usage(command: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|(name, _, _)| *name == command)
        .map(|(_, usage, _)| *usage)
}

/// Error parsing a command line
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// No such command
    #[error("Unknown command: {0} (try `help`)")]
    UnknownCommand(String),
    /// Known command, wrong arguments
    #[error("Usage: {0}")]
    Usage(&'static str),
    /// Argument should have been an integer
    #[error("Not a number: {0}")]
    InvalidNumber(String),
    /// Argument has the wrong shape
    #[error("{0}")]
    InvalidArgument(String),
}

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch editing mode
    Mode(Mode),
    /// Add a module or block
    Add {
        /// Module type or block type name
        entity_type: String,
        /// Requested id
        id: Option<EntityId>,
    },
    /// Remove an entity
    Remove(EntityId),
    /// Connect two entities
    Connect {
        /// Source
        from: EntityId,
        /// Target
        to: EntityId,
    },
    /// Remove a connection
    Disconnect {
        /// Source
        from: EntityId,
        /// Target
        to: EntityId,
    },
    /// Configure a property
    Set {
        /// Entity
        id: EntityId,
        /// Field name
        field: String,
        /// Raw value
        value: String,
    },
    /// Toggle the trainable flag
    Trainable {
        /// Module
        id: EntityId,
        /// New flag
        trainable: bool,
    },
    /// Move the dataset split slider
    Slide {
        /// Dataset block
        id: EntityId,
        /// First handle
        handle1: i64,
        /// Second handle
        handle2: i64,
    },
    /// Move a node
    Place {
        /// Entity
        id: EntityId,
        /// Horizontal position
        x: i64,
        /// Vertical position
        y: i64,
    },
    /// Rename the network
    Name(String),
    /// List module types, optionally of one category
    Types(Option<String>),
    /// Show a module's configuration form
    Props(EntityId),
    /// List deployment targets
    Targets,
    /// Deploy one module
    Deploy {
        /// Module
        id: EntityId,
        /// Target, the first offered when omitted
        target: Option<String>,
    },
    /// Deploy the whole network
    DeployAll(Option<String>),
    /// Undeploy one module
    Undeploy(EntityId),
    /// Undeploy everything
    UndeployAll,
    /// Train
    Learn(EntityId),
    /// Evaluate
    Eval(EntityId),
    /// Forward a drawing read from a raw RGBA file
    Draw {
        /// Canvas input block
        input: EntityId,
        /// File with 224x224 RGBA bytes
        path: PathBuf,
    },
    /// Forward an image URL
    Url {
        /// URL input block
        input: EntityId,
        /// Image location
        url: String,
    },
    /// Forward a dataset sample
    Sample(EntityId),
    /// Set fork/join forwarding
    ForkMode {
        /// Fork or join module
        module: EntityId,
        /// Forwarding mode
        mode: ForwardMode,
    },
    /// Open a telemetry stream
    Watch(Concern),
    /// Close a telemetry stream
    Unwatch(Concern),
    /// Print received telemetry
    Events,
    /// Show the network or one entity
    Show(Option<EntityId>),
    /// Print the network description
    Export,
    /// Print the graph snapshot
    Snapshot,
    /// Store the network
    Save,
    /// Load the stored network
    Load,
    /// Clear the canvas
    Reset,
    /// List datasets
    Datasets,
    /// List jobs
    Jobs,
    /// Platform status
    Status,
    /// Raw JSON-RPC call
    Rpc {
        /// Method name
        method: String,
        /// Parameters
        params: Option<Value>,
    },
    /// Command history
    History,
    /// Help text
    Help,
    /// Leave
    Quit,
}

fn number(raw: &str) -> Result<i64, ParseError> {
    raw.parse()
        .map_err(|_| ParseError::InvalidNumber(raw.to_string()))
}

fn flag(raw: &str) -> Result<bool, ParseError> {
    match raw {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        _ => Err(ParseError::InvalidArgument(format!("Expected on or off, got {raw}"))),
    }
}

fn concern(raw: &str) -> Result<Concern, ParseError> {
    match raw {
        "output" | "run" => Ok(Concern::RunOutput),
        "camera" | "input" => Ok(Concern::Camera),
        "learner" => Ok(Concern::Learner),
        _ => Err(ParseError::InvalidArgument(format!("Unknown stream: {raw}"))),
    }
}

fn forward_mode(raw: &str) -> Result<ForwardMode, ParseError> {
    match raw.to_ascii_lowercase().replace('_', "-").as_str() {
        "on-change" | "forward-on-change" => Ok(ForwardMode::ForwardOnChange),
        "wait-all" | "wait-for-all" => Ok(ForwardMode::WaitForAll),
        _ => Err(ParseError::InvalidArgument(format!("Unknown forward mode: {raw}"))),
    }
}

fn id(raw: &str) -> EntityId {
    EntityId::from(raw)
}

impl Command {
    /// Parse one console line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let (name, args) = (parts[0], &parts[1..]);

        let command = match (name, args) {
            ("mode", [mode]) => Self::Mode(
                mode.parse()
                    .map_err(|e: dianne_builder_graph::mode::UnknownMode| {
                        ParseError::InvalidArgument(e.to_string())
                    })?,
            ),
            ("add", [entity_type]) => Self::Add {
                entity_type: entity_type.to_string(),
                id: None,
            },
            ("add", [entity_type, new_id]) => Self::Add {
                entity_type: entity_type.to_string(),
                id: Some(id(new_id)),
            },
            ("rm", [target]) => Self::Remove(id(target)),
            ("connect", [from, to]) => Self::Connect {
                from: id(from),
                to: id(to),
            },
            ("disconnect", [from, to]) => Self::Disconnect {
                from: id(from),
                to: id(to),
            },
            ("set", [target, field, value @ ..]) if !value.is_empty() => Self::Set {
                id: id(target),
                field: field.to_string(),
                value: value.join(" "),
            },
            ("trainable", [target, value]) => Self::Trainable {
                id: id(target),
                trainable: flag(value)?,
            },
            ("slide", [target, handle1, handle2]) => Self::Slide {
                id: id(target),
                handle1: number(handle1)?,
                handle2: number(handle2)?,
            },
            ("place", [target, x, y]) => Self::Place {
                id: id(target),
                x: number(x)?,
                y: number(y)?,
            },
            ("name", words) if !words.is_empty() => Self::Name(words.join(" ")),
            ("types", []) => Self::Types(None),
            ("types", [category]) => Self::Types(Some(category.to_string())),
            ("props", [target]) => Self::Props(id(target)),
            ("targets", []) => Self::Targets,
            ("deploy", [target]) => Self::Deploy {
                id: id(target),
                target: None,
            },
            ("deploy", [module, target]) => Self::Deploy {
                id: id(module),
                target: Some(target.to_string()),
            },
            ("deploy-all", []) => Self::DeployAll(None),
            ("deploy-all", [target]) => Self::DeployAll(Some(target.to_string())),
            ("undeploy", [target]) => Self::Undeploy(id(target)),
            ("undeploy-all", []) => Self::UndeployAll,
            ("learn", [trainer]) => Self::Learn(id(trainer)),
            ("eval", [evaluator]) => Self::Eval(id(evaluator)),
            ("draw", [input, path]) => Self::Draw {
                input: id(input),
                path: PathBuf::from(path),
            },
            ("url", [input, url]) => Self::Url {
                input: id(input),
                url: url.to_string(),
            },
            ("sample", [input]) => Self::Sample(id(input)),
            ("fork-mode", [module, mode]) => Self::ForkMode {
                module: id(module),
                mode: forward_mode(mode)?,
            },
            ("watch", [stream]) => Self::Watch(concern(stream)?),
            ("unwatch", [stream]) => Self::Unwatch(concern(stream)?),
            ("events", []) => Self::Events,
            ("show", []) => Self::Show(None),
            ("show", [target]) => Self::Show(Some(id(target))),
            ("export", []) => Self::Export,
            ("snapshot", []) => Self::Snapshot,
            ("save", []) => Self::Save,
            ("load", []) => Self::Load,
            ("reset", []) => Self::Reset,
            ("datasets", []) => Self::Datasets,
            ("jobs", []) => Self::Jobs,
            ("status", []) => Self::Status,
            ("rpc", [method, params @ ..]) => {
                let params = if params.is_empty() {
                    None
                } else {
                    let raw = params.join(" ");
                    Some(serde_json::from_str(&raw).map_err(|e| {
                        ParseError::InvalidArgument(format!("Bad JSON parameters: {e}"))
                    })?)
                };
                Self::Rpc {
                    method: method.to_string(),
                    params,
                }
            }
            ("history", []) => Self::History,
            ("help", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            (name, _) => {
                return Err(match usage(name) {
                    Some(usage) => ParseError::Usage(usage),
                    None => ParseError::UnknownCommand(name.to_string()),
                })
            }
        };
        Ok(Some(command))
    }
}

/// Error executing a console line
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// Line could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Session operation failed
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Graph edit refused
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// JSON-RPC call failed
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Reading an input file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Output could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The model refused to create an entity
    #[error("Cannot add {0}: unknown type or id already in use")]
    AddRefused(String),
    /// No deployment target is offered
    #[error("No deployment targets available")]
    NoTargets,
}

fn describe_event(event: &Telemetry) -> String {
    match event {
        Telemetry::Progress(p) => format!("  sample {:>8}  error {:.4}", p.sample, p.error),
        Telemetry::Confusion(matrix) => {
            let total: f64 = matrix.iter().flatten().sum();
            let correct: f64 = matrix
                .iter()
                .enumerate()
                .filter_map(|(i, row)| row.get(i))
                .sum();
            format!("  confusion {}x{}  {correct}/{total} correct", matrix.len(), matrix.len())
        }
        Telemetry::Output(output) => {
            let best = output
                .output
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1));
            match best {
                Some((index, p)) => {
                    let label = output.labels.get(index).map_or("?", String::as_str);
                    format!("  {}: {label} ({:.1}%)", output.id, p * 100.0)
                }
                None => format!("  {}: no output", output.id),
            }
        }
        Telemetry::Frame(sample) => {
            format!("  frame {}x{}x{}", sample.width, sample.height, sample.channels)
        }
    }
}

/// Interactive front end: parses lines and runs them against a session
#[derive(Debug)]
pub struct Console {
    session: EditingSession,
    rpc: DianneRpc,
    history: Vec<String>,
    quit: bool,
}

impl Console {
    /// Create a console over a session
    pub fn new(session: EditingSession, rpc: DianneRpc) -> Self {
        Self {
            session,
            rpc,
            history: Vec::new(),
            quit: false,
        }
    }

    /// The session being edited
    pub fn session(&self) -> &EditingSession {
        &self.session
    }

    /// Whether `quit` was entered
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Run one line and return the text to print
    pub async fn execute(&mut self, line: &str) -> Result<Vec<String>, ConsoleError> {
        let Some(command) = Command::parse(line)? else {
            return Ok(Vec::new());
        };
        self.history.push(line.trim().to_string());
        self.run(command).await
    }

    async fn default_target(&self, target: Option<String>) -> Result<String, ConsoleError> {
        if let Some(target) = target {
            return Ok(target);
        }
        self.session
            .targets()
            .await?
            .into_iter()
            .next()
            .ok_or(ConsoleError::NoTargets)
    }

    fn describe(&self, id: &EntityId) -> Result<Vec<String>, ConsoleError> {
        let graph = self.session.graph();
        let entity = graph.entity(id).ok_or_else(|| GraphError::NotFound(id.clone()))?;

        let mut header = format!("{id} ({})", entity.type_name());
        match entity {
            EntityRef::Module(module) => {
                if let Some(prev) = &module.prev {
                    let _ = write!(header, " prev={prev}");
                }
                if let Some(next) = &module.next {
                    let _ = write!(header, " next={next}");
                }
                if let Some(trainable) = module.trainable {
                    let _ = write!(header, " trainable={trainable}");
                }
            }
            EntityRef::Block(block) => {
                if let Some(linked) = block.linked_module() {
                    let _ = write!(header, " -> {linked}");
                }
            }
        }
        if let Some(target) = graph.deployment_of(id) {
            let color = self.session.deployment_color(id).unwrap_or("-");
            let _ = write!(header, " [deployed on {target} {color}]");
        }
        if let Some((x, y)) = self.session.layout().position_of(id) {
            let _ = write!(header, " @({x}, {y})");
        }

        let mut lines = vec![header];
        lines.extend(
            entity
                .fields()
                .iter()
                .map(|(name, value)| format!("  {name} = {value}")),
        );
        Ok(lines)
    }

    fn overview(&self) -> Vec<String> {
        let graph = self.session.graph();
        let mut lines = vec![format!(
            "{} [{} mode]: {} modules, {} blocks{}",
            self.session.name(),
            graph.mode(),
            graph.module_count(),
            graph.block_count(),
            self.session
                .nn_id()
                .map(|nn| format!(", deployed as {nn}"))
                .unwrap_or_default(),
        )];
        for module in graph.modules() {
            let deployed = graph
                .deployment_of(&module.id)
                .map(|t| format!(" [{t}]"))
                .unwrap_or_default();
            lines.push(format!("  {} ({}){deployed}", module.id, module.module_type));
        }
        for block in graph.blocks() {
            lines.push(format!("  {} ({})", block.id, block.block_type));
        }
        for connection in graph.connections() {
            lines.push(format!("  {} -> {}", connection.source, connection.target));
        }
        lines
    }

    fn json_lines(value: &impl serde::Serialize) -> Result<Vec<String>, ConsoleError> {
        Ok(serde_json::to_string_pretty(value)?
            .lines()
            .map(str::to_string)
            .collect())
    }

    async fn run(&mut self, command: Command) -> Result<Vec<String>, ConsoleError> {
        let lines = match command {
            Command::Mode(mode) => {
                self.session.set_mode(mode);
                vec![format!("Mode: {mode}")]
            }
            Command::Add { entity_type, id } => {
                let id = self
                    .session
                    .add_module(&entity_type, id)
                    .ok_or_else(|| ConsoleError::AddRefused(entity_type.clone()))?;
                let column = self.session.layout().nodes.len() as i64;
                self.session
                    .layout_mut()
                    .place(id.clone(), column * PLACEMENT_STEP, PLACEMENT_STEP);
                vec![format!("Added {entity_type} {id}")]
            }
            Command::Remove(id) => {
                let kind = match self.session.remove(&id)? {
                    EntityKind::Module => "module",
                    EntityKind::Block => "block",
                };
                vec![format!("Removed {kind} {id}")]
            }
            Command::Connect { from, to } => {
                self.session.graph_mut().connect(&from, &to)?;
                vec![format!("Connected {from} -> {to}")]
            }
            Command::Disconnect { from, to } => {
                self.session.graph_mut().disconnect(&from, &to)?;
                vec![format!("Disconnected {from} -> {to}")]
            }
            Command::Set { id, field, value } => {
                let value = FieldValue::parse(&value);
                self.session.graph_mut().configure(&id, &field, value.clone())?;
                vec![format!("{id}.{field} = {value}")]
            }
            Command::Trainable { id, trainable } => {
                self.session.graph_mut().set_trainable(&id, trainable)?;
                vec![format!("{id} trainable: {trainable}")]
            }
            Command::Slide { id, handle1, handle2 } => {
                let config = self.session.config();
                let (handle1, handle2) = (config.snap(handle1), config.snap(handle2));
                let split = self.session.graph_mut().slide_dataset(&id, handle1, handle2)?;
                vec![format!(
                    "{id}: train {} / test {} / validation {} of {}",
                    split.train, split.test, split.validation, split.total
                )]
            }
            Command::Place { id, x, y } => {
                if !self.session.graph().contains(&id) {
                    return Err(GraphError::NotFound(id).into());
                }
                self.session.layout_mut().place(id.clone(), x, y);
                vec![format!("{id} @({x}, {y})")]
            }
            Command::Name(name) => {
                self.session.set_name(name.clone());
                vec![format!("Network: {name}")]
            }
            Command::Types(category) => {
                let catalog = self.session.catalog();
                let types: Vec<_> = match &category {
                    Some(category) => catalog.types_in_category(category).collect(),
                    None => catalog.types().collect(),
                };
                types
                    .into_iter()
                    .map(|t| format!("  {:<16} {}", t.name, t.category))
                    .collect()
            }
            Command::Props(id) => {
                let form = self.session.property_form(&id).await?;
                if form.is_empty() {
                    vec![format!("{id} has no configurable properties")]
                } else {
                    form.into_iter()
                        .map(|p| {
                            format!("  {} ({}) = {}", p.name, p.id, p.value.as_deref().unwrap_or(""))
                        })
                        .collect()
                }
            }
            Command::Targets => self
                .session
                .targets()
                .await?
                .into_iter()
                .map(|t| format!("  {t}"))
                .collect(),
            Command::Deploy { id, target } => {
                let target = self.default_target(target).await?;
                let count = self.session.deploy(&id, &target).await?;
                vec![format!("Deployed {count} module(s) on {target}")]
            }
            Command::DeployAll(target) => {
                let target = self.default_target(target).await?;
                let count = self.session.deploy_all(&target).await?;
                vec![format!(
                    "Deployed {count} module(s) on {target} as {}",
                    self.session.nn_id().unwrap_or("?")
                )]
            }
            Command::Undeploy(id) => {
                self.session.undeploy(&id).await?;
                vec![format!("Undeployed {id}")]
            }
            Command::UndeployAll => {
                let count = self.session.undeploy_all().await?;
                vec![format!("Undeployed {count} module(s)")]
            }
            Command::Learn(trainer) => {
                let mut lines = Vec::new();
                let merged = self
                    .session
                    .learn(&trainer, |event| lines.push(describe_event(event)))
                    .await?;
                lines.push(format!("Learning done, labels for {merged} module(s)"));
                lines
            }
            Command::Eval(evaluator) => {
                let mut lines = Vec::new();
                let result = self
                    .session
                    .evaluate(&evaluator, |event| lines.push(describe_event(event)))
                    .await?;
                lines.push(format!("Accuracy: {:.2}%", result.accuracy));
                lines
            }
            Command::Draw { input, path } => {
                let rgba = tokio::fs::read(&path).await?;
                self.session.forward_canvas(&input, &rgba).await?;
                vec![format!("Forwarded {} through {input}", path.display())]
            }
            Command::Url { input, url } => {
                self.session.forward_url(&input, &url).await?;
                vec![format!("Forwarded {url} through {input}")]
            }
            Command::Sample(input) => {
                let sample = self.session.sample_dataset(&input).await?;
                vec![format!(
                    "Forwarded a {}x{}x{} sample through {input}",
                    sample.width, sample.height, sample.channels
                )]
            }
            Command::ForkMode { module, mode } => {
                self.session.set_forward_mode(&module, mode).await?;
                vec![format!("{module}: {mode}")]
            }
            Command::Watch(concern) => {
                self.session.subscriptions().open(concern);
                vec![format!("Watching {concern}")]
            }
            Command::Unwatch(concern) => {
                if self.session.close_stream(concern) {
                    vec![format!("Stopped watching {concern}")]
                } else {
                    vec![format!("Not watching {concern}")]
                }
            }
            Command::Events => {
                let mut lines = Vec::new();
                for concern in [Concern::Learner, Concern::RunOutput, Concern::Camera] {
                    if let Some(subscription) = self.session.subscriptions().get_mut(concern) {
                        lines.push(format!("{concern} ({:?})", subscription.status()));
                        while let Some(event) = subscription.try_next_event() {
                            lines.push(describe_event(&event));
                        }
                    }
                }
                if lines.is_empty() {
                    lines.push("No open streams".to_string());
                }
                lines
            }
            Command::Show(None) => self.overview(),
            Command::Show(Some(id)) => self.describe(&id)?,
            Command::Export => Self::json_lines(&self.session.graph().to_network_json())?,
            Command::Snapshot => Self::json_lines(&self.session.graph().serialize())?,
            Command::Save => {
                self.session.save().await?;
                vec![format!("Saved {}", self.session.name())]
            }
            Command::Load => {
                self.session.load().await?;
                vec![format!(
                    "Loaded {} modules, {} blocks",
                    self.session.graph().module_count(),
                    self.session.graph().block_count()
                )]
            }
            Command::Reset => {
                self.session.reset();
                vec!["Canvas cleared".to_string()]
            }
            Command::Datasets => {
                let datasets = self.rpc.available_datasets().await?;
                vec![datasets.to_string()]
            }
            Command::Jobs => vec![
                format!("queued:   {}", self.rpc.queued_jobs().await?),
                format!("running:  {}", self.rpc.running_jobs().await?),
                format!("finished: {}", self.rpc.finished_jobs().await?),
            ],
            Command::Status => vec![self.rpc.status().await?.to_string()],
            Command::Rpc { method, params } => vec![self.rpc.call(&method, params).await?.to_string()],
            Command::History => self
                .history
                .iter()
                .enumerate()
                .map(|(i, line)| format!("{:>4}  {line}", i + 1))
                .collect(),
            Command::Help => {
                let mut lines = vec!["Available commands:".to_string()];
                lines.extend(
                    COMMANDS
                        .iter()
                        .map(|(_, usage, about)| format!("  {usage:<40} - {about}")),
                );
                lines
            }
            Command::Quit => {
                self.quit = true;
                self.session.teardown();
                vec!["Bye".to_string()]
            }
        };
        Ok(lines)
    }
}
