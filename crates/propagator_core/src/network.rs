//! The propagation engine.
//!
//! A `Network` owns every connector, constraint and constant it creates and
//! hands out copyable ids for them. Writes and retractions cascade
//! synchronously and depth-first: `set_value` and `forget_value` return only
//! once every consequence has been applied or an error has stopped the
//! cascade.

use crate::connector::{
    ConnectorId, ConnectorState, ConstantId, ConstraintId, Informant, UserToken,
};
use crate::constraint::{Constraint, ConstraintKind};
use crate::error::{PropagationError, PropagationResult};
use crate::traits::{Relation, Scalar};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

/// Settings controlling propagation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Relative tolerance under which a rewrite counts as agreeing with the
    /// held value. The default `0.0` compares exactly.
    pub tolerance: f64,
    /// Maximum nesting of notifications within one cascade.
    pub max_depth: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            max_depth: 10_000,
        }
    }
}

/// A reaction waiting on the agenda.
#[derive(Debug, Clone, Copy)]
enum Task {
    /// New-value reaction of a constraint.
    Update(ConstraintId),
    /// Forget reaction of a constraint.
    Retract(ConstraintId),
    /// Clear `connector` if `retractor` wrote it.
    Forget {
        connector: ConnectorId,
        retractor: Informant,
    },
}

/// A task together with its notification depth.
#[derive(Debug, Clone, Copy)]
struct Pending {
    task: Task,
    depth: usize,
}

/// Arena of connectors, constraints and constants.
#[derive(Debug, Clone)]
pub struct Network<T: Scalar = f64> {
    connectors: Vec<ConnectorState<T>>,
    constraints: Vec<Constraint>,
    constants: Vec<(T, ConnectorId)>,
    next_user: usize,
    settings: NetworkSettings,
}

impl<T: Scalar> Default for Network<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn as_f64<T: Scalar>(value: T) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

impl<T: Scalar> Network<T> {
    pub fn new() -> Self {
        Self::with_settings(NetworkSettings::default())
    }

    pub fn with_settings(settings: NetworkSettings) -> Self {
        Self {
            connectors: Vec::new(),
            constraints: Vec::new(),
            constants: Vec::new(),
            next_user: 0,
            settings,
        }
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Creates an unheld connector.
    pub fn new_connector(&mut self) -> ConnectorId {
        self.connectors.push(ConnectorState::new());
        ConnectorId(self.connectors.len() - 1)
    }

    /// Mints a fresh external informant, distinct from every other one.
    pub fn user(&mut self) -> Informant {
        let token = UserToken(self.next_user);
        self.next_user += 1;
        Informant::User(token)
    }

    fn cell(&self, connector: ConnectorId) -> PropagationResult<&ConnectorState<T>> {
        self.connectors
            .get(connector.0)
            .ok_or(PropagationError::UnknownConnector(connector))
    }

    fn cell_mut(&mut self, connector: ConnectorId) -> PropagationResult<&mut ConnectorState<T>> {
        self.connectors
            .get_mut(connector.0)
            .ok_or(PropagationError::UnknownConnector(connector))
    }

    pub fn has_value(&self, connector: ConnectorId) -> bool {
        self.cell(connector).map_or(false, |cell| cell.has_value())
    }

    pub fn get_value(&self, connector: ConnectorId) -> PropagationResult<T> {
        self.cell(connector)?
            .value()
            .ok_or(PropagationError::NoValue(connector))
    }

    /// Who wrote the connector's current value.
    pub fn informant(&self, connector: ConnectorId) -> Option<Informant> {
        self.cell(connector).ok().and_then(|cell| cell.informant())
    }

    /// Constraints attached to a connector.
    pub fn attached(&self, connector: ConnectorId) -> &[ConstraintId] {
        match self.cell(connector) {
            Ok(cell) => cell.constraints(),
            Err(_) => &[],
        }
    }

    /// The constraint record behind an id.
    pub fn constraint_record(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id.0)
    }

    /// Value and target connector of a constant.
    pub fn constant_record(&self, id: ConstantId) -> Option<(T, ConnectorId)> {
        self.constants.get(id.0).copied()
    }

    fn agrees(&self, held: T, proposed: T) -> bool {
        if held == proposed {
            return true;
        }
        let tol = T::from_f64(self.settings.tolerance).unwrap_or_else(T::zero);
        let scale = held.abs().max(proposed.abs()).max(T::one());
        (held - proposed).abs() <= tol * scale
    }

    /// Queues `listeners` one notification level below `depth`, first
    /// listener on top, failing once the configured depth is reached.
    fn schedule(
        &self,
        listeners: Vec<ConstraintId>,
        depth: usize,
        forget: bool,
        agenda: &mut Vec<Pending>,
    ) -> PropagationResult<()> {
        if listeners.is_empty() {
            return Ok(());
        }
        if depth >= self.settings.max_depth {
            return Err(PropagationError::DepthExceeded(self.settings.max_depth));
        }
        agenda.extend(listeners.into_iter().rev().map(|id| Pending {
            task: if forget {
                Task::Retract(id)
            } else {
                Task::Update(id)
            },
            depth: depth + 1,
        }));
        Ok(())
    }

    /// Runs queued reactions until the agenda is empty. Popping from the top
    /// keeps the cascade depth-first: everything a write triggers runs before
    /// the next sibling listener.
    fn drain(&mut self, mut agenda: Vec<Pending>) -> PropagationResult<()> {
        while let Some(Pending { task, depth }) = agenda.pop() {
            match task {
                Task::Update(id) => self.process_new_value(id, depth, &mut agenda)?,
                Task::Retract(id) => self.process_forget_value(id, depth, &mut agenda),
                Task::Forget {
                    connector,
                    retractor,
                } => self.clear(connector, retractor, depth, &mut agenda)?,
            }
        }
        Ok(())
    }

    /// Writes `value` into an unheld connector and notifies every attached
    /// constraint other than `informant`.
    ///
    /// Rewriting an equal value is a no-op. Rewriting a different one is a
    /// `Contradiction`.
    pub fn set_value(
        &mut self,
        connector: ConnectorId,
        value: T,
        informant: Informant,
    ) -> PropagationResult<()> {
        let mut agenda = Vec::new();
        self.write(connector, value, informant, 0, &mut agenda)?;
        self.drain(agenda)
    }

    fn write(
        &mut self,
        connector: ConnectorId,
        value: T,
        informant: Informant,
        depth: usize,
        agenda: &mut Vec<Pending>,
    ) -> PropagationResult<()> {
        if let Some(held) = self.cell(connector)?.value() {
            if self.agrees(held, value) {
                return Ok(());
            }
            warn!(
                "contradiction at {connector}: holds {held:?}, {informant} proposed {value:?}"
            );
            return Err(PropagationError::Contradiction {
                connector,
                held: as_f64(held),
                proposed: as_f64(value),
            });
        }

        trace!("{connector} := {value:?} (by {informant})");
        let listeners = {
            let cell = self.cell_mut(connector)?;
            cell.store(value, informant);
            cell.listeners_except(informant)
        };
        self.schedule(listeners, depth, false, agenda)
    }

    /// Clears the connector if `retractor` wrote its value, then notifies
    /// every attached constraint other than `retractor`. Any other retractor
    /// is silently ignored.
    pub fn forget_value(
        &mut self,
        connector: ConnectorId,
        retractor: Informant,
    ) -> PropagationResult<()> {
        let mut agenda = Vec::new();
        self.clear(connector, retractor, 0, &mut agenda)?;
        self.drain(agenda)
    }

    fn clear(
        &mut self,
        connector: ConnectorId,
        retractor: Informant,
        depth: usize,
        agenda: &mut Vec<Pending>,
    ) -> PropagationResult<()> {
        if self.cell(connector)?.informant() != Some(retractor) {
            return Ok(());
        }

        trace!("{connector} forgotten (by {retractor})");
        let listeners = {
            let cell = self.cell_mut(connector)?;
            cell.clear();
            cell.listeners_except(retractor)
        };
        self.schedule(listeners, depth, true, agenda)
    }

    /// Attaches a constraint to a connector. A connector that already holds
    /// a value notifies the constraint right away.
    pub fn connect(
        &mut self,
        connector: ConnectorId,
        constraint: ConstraintId,
    ) -> PropagationResult<()> {
        if constraint.0 >= self.constraints.len() {
            return Err(PropagationError::UnknownConstraint(constraint));
        }
        let cell = self.cell_mut(connector)?;
        let attached = cell.attach(constraint);
        if attached && cell.has_value() {
            let mut agenda = Vec::new();
            self.process_new_value(constraint, 0, &mut agenda)?;
            self.drain(agenda)?;
        }
        Ok(())
    }

    /// Builds a constraint over `inputs` and `output` and registers it with
    /// each of them, inputs first.
    pub fn constraint(
        &mut self,
        kind: ConstraintKind,
        inputs: &[ConnectorId],
        output: ConnectorId,
    ) -> PropagationResult<ConstraintId> {
        kind.check_arity(inputs.len())?;
        for &connector in inputs.iter().chain(std::iter::once(&output)) {
            self.cell(connector)?;
        }

        let id = ConstraintId(self.constraints.len());
        self.constraints.push(Constraint {
            kind,
            inputs: inputs.to_vec(),
            output,
        });
        debug!("{id}: {} over {inputs:?} -> {output}", kind.name());

        for &input in inputs {
            self.connect(input, id)?;
        }
        self.connect(output, id)?;
        Ok(id)
    }

    pub fn adder(
        &mut self,
        inputs: &[ConnectorId],
        output: ConnectorId,
    ) -> PropagationResult<ConstraintId> {
        self.constraint(ConstraintKind::Adder, inputs, output)
    }

    pub fn subtracter(
        &mut self,
        inputs: &[ConnectorId],
        output: ConnectorId,
    ) -> PropagationResult<ConstraintId> {
        self.constraint(ConstraintKind::Subtracter, inputs, output)
    }

    pub fn multiplier(
        &mut self,
        inputs: &[ConnectorId],
        output: ConnectorId,
    ) -> PropagationResult<ConstraintId> {
        self.constraint(ConstraintKind::Multiplier, inputs, output)
    }

    pub fn divider(
        &mut self,
        inputs: &[ConnectorId],
        output: ConnectorId,
    ) -> PropagationResult<ConstraintId> {
        self.constraint(ConstraintKind::Divider, inputs, output)
    }

    /// Pins `value` into `connector`. Constants never react to notifications
    /// and nothing inside the network can retract them.
    pub fn constant(&mut self, value: T, connector: ConnectorId) -> PropagationResult<ConstantId> {
        self.cell(connector)?;
        let id = ConstantId(self.constants.len());
        self.constants.push((value, connector));
        self.set_value(connector, value, Informant::Constant(id))?;
        Ok(id)
    }

    /// New-value reaction: shortcut, then forward, then inversion of a
    /// single missing input. Anything less determined waits.
    fn process_new_value(
        &mut self,
        id: ConstraintId,
        depth: usize,
        agenda: &mut Vec<Pending>,
    ) -> PropagationResult<()> {
        let (kind, inputs, output) = {
            let c = &self.constraints[id.0];
            (c.kind, c.inputs.clone(), c.output)
        };
        let values: Vec<Option<T>> = inputs
            .iter()
            .map(|input| self.connectors[input.0].value())
            .collect();
        let me = Informant::Constraint(id);

        if let Some(value) = kind.shortcut(&values) {
            debug!("{id}: {} shortcut {output} = {value:?}", kind.name());
            return self.write(output, value, me, depth, agenda);
        }

        let missing: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| i)
            .collect();

        match missing.as_slice() {
            [] => {
                let known: Vec<T> = values.iter().flatten().copied().collect();
                let value = kind.forward(&known)?;
                debug!("{id}: {} forward {output} = {value:?}", kind.name());
                self.write(output, value, me, depth, agenda)
            }
            [slot] => match self.connectors[output.0].value() {
                Some(out) => {
                    let target = inputs[*slot];
                    let value = kind.invert(&values, out)?;
                    debug!("{id}: {} inverse {target} = {value:?}", kind.name());
                    self.write(target, value, me, depth, agenda)
                }
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Forget reaction: retract whatever this constraint derived, output
    /// first, then each input in order.
    fn process_forget_value(&self, id: ConstraintId, depth: usize, agenda: &mut Vec<Pending>) {
        let c = &self.constraints[id.0];
        let me = Informant::Constraint(id);
        let targets: Vec<ConnectorId> = std::iter::once(c.output)
            .chain(c.inputs.iter().copied())
            .collect();
        agenda.extend(targets.into_iter().rev().map(|connector| Pending {
            task: Task::Forget {
                connector,
                retractor: me,
            },
            depth,
        }));
    }
}
