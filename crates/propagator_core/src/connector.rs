//! Connector cells and the identities that may write them.
//!
//! Connectors live inside a `Network` arena and are addressed by
//! `ConnectorId`. Constraints and constants are addressed the same way, so an
//! `Informant` is a plain copyable value and comparing two of them is an
//! identity check.

use crate::traits::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a connector within its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectorId(pub(crate) usize);

/// Index of a constraint within its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub(crate) usize);

/// Index of a constant within its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstantId(pub(crate) usize);

/// Identity of an external caller supplying values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserToken(pub(crate) usize);

impl ConnectorId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl ConstraintId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Whoever wrote a connector's current value. Only the same informant may
/// retract it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Informant {
    User(UserToken),
    Constraint(ConstraintId),
    Constant(ConstantId),
}

impl Informant {
    /// The constraint behind this informant, if it is one.
    pub fn constraint(self) -> Option<ConstraintId> {
        match self {
            Informant::Constraint(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Informant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Informant::User(token) => write!(f, "user{}", token.0),
            Informant::Constraint(id) => write!(f, "{id}"),
            Informant::Constant(id) => write!(f, "const{}", id.0),
        }
    }
}

/// A value cell. `value` and `informant` are always both set or both unset.
#[derive(Debug, Clone)]
pub(crate) struct ConnectorState<T: Scalar> {
    value: Option<(T, Informant)>,
    constraints: Vec<ConstraintId>,
}

impl<T: Scalar> ConnectorState<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: None,
            constraints: Vec::new(),
        }
    }

    pub(crate) fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub(crate) fn value(&self) -> Option<T> {
        self.value.map(|(v, _)| v)
    }

    pub(crate) fn informant(&self) -> Option<Informant> {
        self.value.map(|(_, who)| who)
    }

    pub(crate) fn store(&mut self, value: T, informant: Informant) {
        self.value = Some((value, informant));
    }

    pub(crate) fn clear(&mut self) {
        self.value = None;
    }

    /// Registers a constraint. Returns false if it was already attached.
    pub(crate) fn attach(&mut self, constraint: ConstraintId) -> bool {
        if self.constraints.contains(&constraint) {
            return false;
        }
        self.constraints.push(constraint);
        true
    }

    /// Snapshot of the attached constraints, excluding `skip` if it is one.
    pub(crate) fn listeners_except(&self, skip: Informant) -> Vec<ConstraintId> {
        let skip = skip.constraint();
        self.constraints
            .iter()
            .copied()
            .filter(|c| Some(*c) != skip)
            .collect()
    }

    pub(crate) fn constraints(&self) -> &[ConstraintId] {
        &self.constraints
    }
}
