//! The `propagator_core` crate provides the constraint-propagation engine.
//! Values written into any sufficient subset of connectors flow through the
//! attached constraints, forward or inverted, until nothing more can be derived.
//!
//! Key components:
//! - **Network**: arena of connectors, constraints and constants; runs value and forget propagation.
//! - **Constraints**: `Adder`, `Subtracter`, `Multiplier`, `Divider` behind the `Relation` trait.
//! - **Equation Engine**: parser for `lhs = rhs` text, `NetworkBuilder`, and `solve`.

pub mod connector;
pub mod constraint;
pub mod equation_engine;
pub mod error;
pub mod network;
pub mod traits;

pub use connector::{ConnectorId, ConstantId, ConstraintId, Informant, UserToken};
pub use constraint::{Adder, Constraint, ConstraintKind, Divider, Multiplier, Subtracter};
pub use equation_engine::{parse, parse_equation, solve, solve_str, Equation, Expr, NetworkBuilder};
pub use error::{ParseError, PropagationError, PropagationResult};
pub use network::{Network, NetworkSettings};
