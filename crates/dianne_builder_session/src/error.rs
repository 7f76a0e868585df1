// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session errors.

use crate::canvas::CanvasError;
use dianne_builder_graph::{EntityId, GraphError};

/// Failure reported by a backend collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Collaborator could not be reached
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    /// Collaborator answered with an error status
    #[error("Service failed: {0}")]
    Failed(String),
    /// Answer could not be understood
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    /// Requested item does not exist on the backend
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failure of a JSON-RPC call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// The server returned an error object
    #[error("Remote error {code}: {message}")]
    Remote {
        /// JSON-RPC error code
        code: i64,
        /// Server message
        message: String,
    },
    /// No response within the call timeout
    #[error("Request {method} timed out")]
    Timeout {
        /// Method that timed out
        method: String,
    },
    /// The transport failed to deliver the request
    #[error("Transport error: {0}")]
    Transport(String),
    /// Response is not a valid JSON-RPC 2.0 reply
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Error from an editing session operation
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Graph model refused the operation
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Backend collaborator failed
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// JSON-RPC call failed
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// File I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Drawing could not be turned into a sample
    #[error(transparent)]
    Canvas(#[from] CanvasError),

    /// Job targets a block of the wrong type
    #[error("{id} is not a {expected} block")]
    WrongBlock {
        /// Offending block
        id: EntityId,
        /// Block type the job needs
        expected: &'static str,
    },

    /// Operation needs a deployed network
    #[error("No network has been deployed yet")]
    NotDeployed,
}

/// Result type for collaborator calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Result type for JSON-RPC calls
pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
