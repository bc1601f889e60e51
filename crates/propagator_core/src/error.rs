//! Error types for network construction, propagation and equation parsing.

use crate::connector::{ConnectorId, ConstraintId};
use thiserror::Error;

/// Errors raised while building or propagating through a network.
///
/// A propagation error aborts the cascade where it happened. Writes applied
/// earlier in the same cascade stay in place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropagationError {
    /// A connector holding a value was asked to take a different one.
    #[error("Contradiction at connector {connector}: holds {held}, proposed {proposed}")]
    Contradiction {
        connector: ConnectorId,
        held: f64,
        proposed: f64,
    },

    /// Read of a connector that holds no value.
    #[error("Connector {0} has no value")]
    NoValue(ConnectorId),

    /// A named variable was not determined by the network.
    #[error("Variable '{0}' has no value")]
    UnknownValue(String),

    /// Divider needed to divide by zero.
    #[error("Division by zero")]
    DivisionByZero,

    /// Constraint built with the wrong number of inputs.
    #[error("{constraint} expects {expected} inputs, got {actual}")]
    ArityMismatch {
        constraint: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A connector id that does not belong to this network.
    #[error("Unknown connector {0}")]
    UnknownConnector(ConnectorId),

    /// A constraint id that does not belong to this network.
    #[error("Unknown constraint {0}")]
    UnknownConstraint(ConstraintId),

    /// Propagation nested deeper than the configured limit.
    #[error("Propagation exceeded maximum depth of {0}")]
    DepthExceeded(usize),
}

/// Result type for network operations.
pub type PropagationResult<T> = Result<T, PropagationError>;

/// Errors raised by the equation parser.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Unexpected token {found} (expected {expected})")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("Unexpected end of input (expected {0})")]
    UnexpectedEnd(&'static str),

    #[error("Equation must contain exactly one '='")]
    MissingEquals,

    #[error("Unsupported operator '{0}'")]
    UnsupportedOperator(char),

    #[error("Function calls are not supported: {0}(...)")]
    UnsupportedCall(String),
}
