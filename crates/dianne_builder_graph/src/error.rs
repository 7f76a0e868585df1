// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph model errors.

use crate::entity::EntityId;
use crate::mode::Mode;

/// Error from a graph model operation.
///
/// A failed operation never leaves a partial mutation behind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Unknown id referenced by an operation
    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    /// The connection edit is not legal in the current state
    #[error("Illegal connection {from} -> {to}: {reason}")]
    IllegalConnection {
        /// Source entity
        from: EntityId,
        /// Target entity
        to: EntityId,
        /// Why the edit was refused
        reason: IllegalReason,
    },

    /// Snapshot failed referential integrity checks
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Entity is deployed and therefore frozen
    #[error("Entity is deployed: {0}")]
    Deployed(EntityId),

    /// The structural policy refused the operation
    #[error("Operation rejected by policy for {0}")]
    Rejected(EntityId),

    /// Field name carries structure and cannot be configured
    #[error("Reserved field: {0}")]
    ReservedField(String),

    /// Value does not fit the field
    #[error("Invalid value for {field}: {value}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Offending value
        value: String,
    },

    /// Operation needs a dataset block
    #[error("Not a dataset: {0}")]
    NotADataset(EntityId),
}

/// Why a connection edit was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalReason {
    /// The mode does not allow connection editing
    #[error("connections cannot be edited in {0} mode")]
    ModeDisabled(Mode),

    /// Endpoints do not expose matching anchors for the mode
    #[error("anchors do not match in {0} mode")]
    AnchorMismatch(Mode),

    /// An endpoint is deployed
    #[error("{0} is deployed")]
    Deployed(EntityId),

    /// Endpoint kinds cannot be linked (block to block, wrong block side)
    #[error("incompatible endpoints")]
    IncompatibleKinds,

    /// A single-fan slot on this endpoint is already taken
    #[error("{0} is already connected")]
    SlotOccupied(EntityId),

    /// There is no such edge to remove
    #[error("not connected")]
    NotConnected,
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;
