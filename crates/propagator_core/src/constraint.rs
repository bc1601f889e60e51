//! Arithmetic relations and the constraint records that bind them to
//! connectors.

use crate::connector::ConnectorId;
use crate::error::PropagationError;
use crate::traits::{Relation, Scalar};
use serde::{Deserialize, Serialize};

/// `output = in[0] + in[1] + ...`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Adder;

/// `output = in[0] - in[1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subtracter;

/// `output = in[0] * in[1] * ...`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Multiplier;

/// `output = in[0] / in[1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Divider;

fn sum_known<T: Scalar>(inputs: &[Option<T>]) -> T {
    inputs.iter().flatten().fold(T::zero(), |acc, v| acc + *v)
}

fn product_known<T: Scalar>(inputs: &[Option<T>]) -> T {
    inputs.iter().flatten().fold(T::one(), |acc, v| acc * *v)
}

fn binary_shape(name: &'static str, actual: usize) -> PropagationError {
    PropagationError::ArityMismatch {
        constraint: name,
        expected: 2,
        actual,
    }
}

impl<T: Scalar> Relation<T> for Adder {
    fn name(&self) -> &'static str {
        "Adder"
    }

    fn forward(&self, inputs: &[T]) -> Result<T, PropagationError> {
        Ok(inputs.iter().fold(T::zero(), |acc, v| acc + *v))
    }

    fn invert(&self, inputs: &[Option<T>], output: T) -> Result<T, PropagationError> {
        Ok(output - sum_known(inputs))
    }
}

impl<T: Scalar> Relation<T> for Subtracter {
    fn name(&self) -> &'static str {
        "Subtracter"
    }

    fn forward(&self, inputs: &[T]) -> Result<T, PropagationError> {
        match inputs {
            [a, b] => Ok(*a - *b),
            _ => Err(binary_shape("Subtracter", inputs.len())),
        }
    }

    fn invert(&self, inputs: &[Option<T>], output: T) -> Result<T, PropagationError> {
        // Which side is known decides the formula.
        match inputs {
            [Some(a), None] => Ok(*a - output),
            [None, Some(b)] => Ok(output + *b),
            _ => Err(binary_shape("Subtracter", inputs.len())),
        }
    }
}

impl<T: Scalar> Relation<T> for Multiplier {
    fn name(&self) -> &'static str {
        "Multiplier"
    }

    fn forward(&self, inputs: &[T]) -> Result<T, PropagationError> {
        Ok(inputs.iter().fold(T::one(), |acc, v| acc * *v))
    }

    fn invert(&self, inputs: &[Option<T>], output: T) -> Result<T, PropagationError> {
        let product = product_known(inputs);
        if product.is_zero() {
            return Err(PropagationError::DivisionByZero);
        }
        Ok(output / product)
    }

    /// Any known zero factor pins the product to zero.
    fn shortcut(&self, inputs: &[Option<T>]) -> Option<T> {
        inputs
            .iter()
            .flatten()
            .any(|v| v.is_zero())
            .then(T::zero)
    }
}

impl<T: Scalar> Relation<T> for Divider {
    fn name(&self) -> &'static str {
        "Divider"
    }

    fn forward(&self, inputs: &[T]) -> Result<T, PropagationError> {
        match inputs {
            [_, b] if b.is_zero() => Err(PropagationError::DivisionByZero),
            [a, b] => Ok(*a / *b),
            _ => Err(binary_shape("Divider", inputs.len())),
        }
    }

    fn invert(&self, inputs: &[Option<T>], output: T) -> Result<T, PropagationError> {
        match inputs {
            [Some(_), None] if output.is_zero() => Err(PropagationError::DivisionByZero),
            [Some(a), None] => Ok(*a / output),
            [None, Some(b)] => Ok(output * *b),
            _ => Err(binary_shape("Divider", inputs.len())),
        }
    }
}

/// The closed set of constraint kinds a network can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    Adder,
    Subtracter,
    Multiplier,
    Divider,
}

impl ConstraintKind {
    /// Maps an infix operator to its constraint kind.
    pub fn from_operator(op: char) -> Option<Self> {
        match op {
            '+' => Some(ConstraintKind::Adder),
            '-' => Some(ConstraintKind::Subtracter),
            '*' => Some(ConstraintKind::Multiplier),
            '/' => Some(ConstraintKind::Divider),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConstraintKind::Adder => "Adder",
            ConstraintKind::Subtracter => "Subtracter",
            ConstraintKind::Multiplier => "Multiplier",
            ConstraintKind::Divider => "Divider",
        }
    }

    /// Exact input count, or `None` for any non-zero count.
    pub fn arity(self) -> Option<usize> {
        match self {
            ConstraintKind::Subtracter | ConstraintKind::Divider => Some(2),
            ConstraintKind::Adder | ConstraintKind::Multiplier => None,
        }
    }

    /// Checks an input count against this kind's arity.
    pub fn check_arity(self, actual: usize) -> Result<(), PropagationError> {
        match self.arity() {
            Some(expected) if expected != actual => Err(PropagationError::ArityMismatch {
                constraint: self.name(),
                expected,
                actual,
            }),
            None if actual == 0 => Err(PropagationError::ArityMismatch {
                constraint: self.name(),
                expected: 1,
                actual,
            }),
            _ => Ok(()),
        }
    }
}

impl<T: Scalar> Relation<T> for ConstraintKind {
    fn name(&self) -> &'static str {
        ConstraintKind::name(*self)
    }

    fn forward(&self, inputs: &[T]) -> Result<T, PropagationError> {
        match self {
            ConstraintKind::Adder => Adder.forward(inputs),
            ConstraintKind::Subtracter => Subtracter.forward(inputs),
            ConstraintKind::Multiplier => Multiplier.forward(inputs),
            ConstraintKind::Divider => Divider.forward(inputs),
        }
    }

    fn invert(&self, inputs: &[Option<T>], output: T) -> Result<T, PropagationError> {
        match self {
            ConstraintKind::Adder => Adder.invert(inputs, output),
            ConstraintKind::Subtracter => Subtracter.invert(inputs, output),
            ConstraintKind::Multiplier => Multiplier.invert(inputs, output),
            ConstraintKind::Divider => Divider.invert(inputs, output),
        }
    }

    fn shortcut(&self, inputs: &[Option<T>]) -> Option<T> {
        match self {
            ConstraintKind::Adder => Adder.shortcut(inputs),
            ConstraintKind::Subtracter => Subtracter.shortcut(inputs),
            ConstraintKind::Multiplier => Multiplier.shortcut(inputs),
            ConstraintKind::Divider => Divider.shortcut(inputs),
        }
    }
}

/// A relation wired to concrete connectors. Input order matters for
/// `Subtracter` and `Divider`.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub inputs: Vec<ConnectorId>,
    pub output: ConnectorId,
}

impl Constraint {
    /// Every connector this constraint is attached to, output first.
    pub fn connectors(&self) -> impl Iterator<Item = ConnectorId> + '_ {
        std::iter::once(self.output).chain(self.inputs.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adder_inverts_against_known_inputs() {
        assert_eq!(Adder.forward(&[1.0, 2.0, 3.0]), Ok(6.0));
        assert_eq!(Adder.invert(&[Some(1.0), None, Some(3.0)], 10.0), Ok(6.0));
    }

    #[test]
    fn subtracter_inversion_depends_on_known_side() {
        assert_eq!(Subtracter.forward(&[10.0, 8.0]), Ok(2.0));
        assert_eq!(Subtracter.invert(&[Some(10.0), None], 2.0), Ok(8.0));
        assert_eq!(Subtracter.invert(&[None, Some(8.0)], 2.0), Ok(10.0));
    }

    #[test]
    fn divider_inversion_depends_on_known_side() {
        assert_eq!(Divider.forward(&[20.0, 10.0]), Ok(2.0));
        assert_eq!(Divider.invert(&[Some(20.0), None], 2.0), Ok(10.0));
        assert_eq!(Divider.invert(&[None, Some(10.0)], 2.0), Ok(20.0));
    }

    #[test]
    fn divider_rejects_zero_divisors() {
        assert_eq!(
            Divider.forward(&[1.0, 0.0]),
            Err(PropagationError::DivisionByZero)
        );
        assert_eq!(
            Divider.invert(&[Some(1.0), None], 0.0),
            Err(PropagationError::DivisionByZero)
        );
        // Recovering the dividend multiplies, so a zero output is fine.
        assert_eq!(Divider.invert(&[None, Some(4.0)], 0.0), Ok(0.0));
    }

    #[test]
    fn multiplier_shortcut_only_fires_on_zero() {
        assert_eq!(Multiplier.shortcut(&[Some(0.0), None]), Some(0.0));
        assert_eq!(Multiplier.shortcut(&[None, Some(-0.0)]), Some(0.0));
        assert_eq!(Multiplier.shortcut(&[Some(2.0), None]), None);
        assert_eq!(Multiplier.invert(&[Some(2.0), None, Some(3.0)], 12.0), Ok(2.0));
    }

    #[test]
    fn binary_kinds_check_arity() {
        let err = ConstraintKind::Divider
            .check_arity(3)
            .expect_err("divider takes two inputs");
        assert_eq!(
            err,
            PropagationError::ArityMismatch {
                constraint: "Divider",
                expected: 2,
                actual: 3,
            }
        );
        assert_eq!(ConstraintKind::Subtracter.arity(), Some(2));
        assert_eq!(ConstraintKind::Adder.arity(), None);
        assert!(ConstraintKind::Subtracter.check_arity(2).is_ok());
        assert!(ConstraintKind::Adder.check_arity(5).is_ok());
        assert!(ConstraintKind::Multiplier.check_arity(0).is_err());
    }

    #[test]
    fn operators_map_to_kinds() {
        assert_eq!(ConstraintKind::from_operator('+'), Some(ConstraintKind::Adder));
        assert_eq!(ConstraintKind::from_operator('/'), Some(ConstraintKind::Divider));
        assert_eq!(ConstraintKind::from_operator('^'), None);
    }
}
