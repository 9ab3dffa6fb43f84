// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Error Types

use serde::{Deserialize, Serialize};

use crate::units::{CarrierId, NodeId, TaskId};

/// Errors surfaced by engine components and control operations.
///
/// None of these stop the clock: the tick pipeline inspects the result,
/// emits an event and carries on.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no node can take task {task}")]
    NoCapacity { task: TaskId },

    #[error("carrier {carrier} needs {needed:.3} reserve, has {available:.3}")]
    InsufficientReserve { carrier: CarrierId, needed: f64, available: f64 },

    #[error("node {node} is not an eligible harvest source")]
    SourceIneligible { node: NodeId },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("state corruption on {entity}.{field}: observed {value}")]
    StateCorruption { entity: String, field: &'static str, value: f64 },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown carrier {0}")]
    UnknownCarrier(CarrierId),

    #[error("no transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Ledger append rejections.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LedgerError {
    #[error("harvest cost mismatch: expected {expected}, recorded {recorded}")]
    CostMismatch { expected: String, recorded: String },

    #[error("{kind} transfers must be free, recorded cost {cost}")]
    NonZeroCost { kind: &'static str, cost: String },

    #[error("transfer amount must be positive, got {0}")]
    NonPositiveAmount(f64),
}

/// Why a task left tracking without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoCapacity,
    QueueOverflow,
    Timeout,
    InvalidSpec,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoCapacity => "no_capacity",
            Self::QueueOverflow => "queue_overflow",
            Self::Timeout => "timeout",
            Self::InvalidSpec => "invalid_spec",
        };
        f.write_str(s)
    }
}

impl std::error::Error for DropReason {}
