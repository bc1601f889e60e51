use crate::error::PropagationError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be held by a connector.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// The arithmetic half of a constraint: how to compute the output from the
/// inputs, how to recover one missing input, and an optional shortcut.
/// Input counts are checked by `ConstraintKind::check_arity` before a
/// relation is ever wired up.
///
/// Relations never touch connectors. The network gathers the current input
/// values and decides which of these to call (see `Network::process_new_value`).
pub trait Relation<T: Scalar> {
    /// Name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Output value once every input is known.
    fn forward(&self, inputs: &[T]) -> Result<T, PropagationError>;

    /// Value of the single unknown input (the `None` slot of `inputs`) given
    /// the output and the remaining inputs.
    fn invert(&self, inputs: &[Option<T>], output: T) -> Result<T, PropagationError>;

    /// Output value determined by partial input information, if any.
    fn shortcut(&self, _inputs: &[Option<T>]) -> Option<T> {
        None
    }
}
