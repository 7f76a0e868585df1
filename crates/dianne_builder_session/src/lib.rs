// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editing session of the DIANNE neural network builder.
//!
//! Wraps a [`dianne_builder_graph::GraphModel`] together with the backend
//! collaborators a builder needs:
//! - Module catalog, deployer, learner, run-mode inputs and save/load
//! - Live telemetry streams with reconnect and backoff
//! - The JSON-RPC job and platform API

pub mod canvas;
pub mod config;
pub mod error;
pub mod palette;
pub mod rpc;
pub mod services;
pub mod session;
pub mod subscription;

pub use canvas::{canvas_sample, Sample};
pub use config::{BuilderConfig, ServerConfig};
pub use error::{Result, RpcError, ServiceError, SessionError};
pub use palette::DeploymentPalette;
pub use rpc::{DianneRpc, RpcTransport};
pub use services::{
    CatalogService, DeployRequest, DeployResponse, DeployScope, DeploymentService, EvaluationResult,
    ForwardMode, Labels, LearnRequest, LearnerService, PersistenceService, RunService, Services,
};
pub use session::EditingSession;
pub use subscription::{
    BackoffPolicy, Concern, EventSource, EventStream, Subscription, SubscriptionStatus, Subscriptions,
    Telemetry,
};
