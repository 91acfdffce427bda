//! Per-control-flow-point SSA environment: local renamings plus the current
//! control/effect dependencies, and the merge logic that joins environments
//! at confluences.

use crate::alloc::Vec;
use crate::builder::Builder;
use decode_asm::ValueType;

/// Reachability state of an [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No predecessor has flowed here yet; `locals` is absent, the first
    /// [`goto`] overwrites this environment wholesale.
    Unreachable,
    /// Exactly one predecessor has flowed here; `control`/`effect` are that
    /// predecessor's ends, unchanged.
    Reached,
    /// Two or more predecessors have flowed here; `control` is a merge node
    /// and `locals`/`effect` are phis hanging off it (or are identical
    /// across predecessors, in which case no phi was materialized).
    Merged,
    /// Terminated by return/break/continue; no further statement may
    /// contribute from this environment until a branch joins it.
    ControlEnd,
}

/// A snapshot of local renamings and control/effect dependencies at one
/// point in the decoded control-flow graph.
#[derive(Debug, Clone)]
pub struct Environment<N> {
    /// Reachability state.
    pub state: State,
    /// Current control dependency, absent only while `Unreachable`.
    pub control: Option<N>,
    /// Current effect dependency, absent only while `Unreachable`.
    pub effect: Option<N>,
    /// Per-local value, indexed by flat local index; absent only while
    /// `Unreachable`.
    pub locals: Option<Vec<N>>,
}

impl<N: Copy + PartialEq> Environment<N> {
    /// A fresh environment with no predecessor yet.
    pub fn unreachable() -> Self {
        Self {
            state: State::Unreachable,
            control: None,
            effect: None,
            locals: None,
        }
    }

    /// Copy-on-split a new environment from `from`.
    ///
    /// `locals` is always copied, never aliased — sharing one writable
    /// locals vector across branches would let a write down one arm of an
    /// `if` corrupt the other arm's view of the same local.
    pub fn split(from: Option<&Self>) -> Self {
        match from {
            None => Self {
                state: State::Reached,
                control: None,
                effect: None,
                locals: None,
            },
            Some(env) => Self {
                state: if env.state == State::Unreachable {
                    State::Unreachable
                } else {
                    State::Reached
                },
                control: env.control,
                effect: env.effect,
                locals: env.locals.clone(),
            },
        }
    }

    /// Whether control can currently reach a statement decoded against this
    /// environment.
    pub fn is_reachable(&self) -> bool {
        matches!(self.state, State::Reached | State::Merged)
    }

    fn kill(&mut self) {
        self.state = State::ControlEnd;
        self.control = None;
        self.effect = None;
        self.locals = None;
    }

    /// A terminated environment with no predecessor, used when a construct
    /// (e.g. a zero-trip infinite loop) has no fallthrough continuation at all.
    pub fn dead() -> Self {
        Self {
            state: State::ControlEnd,
            control: None,
            effect: None,
            locals: None,
        }
    }
}

/// Join `from` into `to`.
///
/// Does nothing if `from` isn't reachable. Otherwise promotes `to` through
/// `unreachable -> reached -> merged`, synthesizing or extending merge
/// nodes, effect phis, and per-local phis as needed, then kills `from`.
pub fn goto<B: Builder>(
    builder: &mut B,
    from: &mut Environment<B::Node>,
    to: &mut Environment<B::Node>,
    local_types: &[ValueType],
) {
    if !from.is_reachable() {
        return;
    }

    match to.state {
        State::Unreachable => {
            to.state = State::Reached;
            to.control = from.control;
            to.effect = from.effect;
            to.locals = from.locals.clone();
        }
        State::Reached => {
            let from_ctrl = from.control.expect("reachable env carries a control node");
            let to_ctrl = to.control.expect("reached env carries a control node");
            let merge = builder.merge(&[to_ctrl, from_ctrl]);
            to.control = Some(merge);

            let from_effect = from.effect.expect("reachable env carries an effect node");
            let to_effect = to.effect.expect("reached env carries an effect node");
            to.effect = Some(if to_effect == from_effect {
                to_effect
            } else {
                builder.effect_phi(&[to_effect, from_effect], merge)
            });

            let to_locals = to.locals.take().expect("reached env carries locals");
            let from_locals = from
                .locals
                .as_ref()
                .expect("reachable env carries locals");
            let merged = to_locals
                .iter()
                .zip(from_locals.iter())
                .enumerate()
                .map(|(i, (&tv, &fv))| {
                    if tv == fv {
                        tv
                    } else {
                        builder.phi(local_types[i], &[tv, fv], merge)
                    }
                })
                .collect();
            to.locals = Some(merged);
            to.state = State::Merged;
        }
        State::Merged => {
            let merge = to.control.expect("merged env carries a merge control node");
            let from_ctrl = from.control.expect("reachable env carries a control node");
            builder.append_to_merge(merge, from_ctrl);
            let new_arity = builder.input_count(merge);
            let old_arity = new_arity.saturating_sub(1);

            let from_effect = from.effect.expect("reachable env carries an effect node");
            let to_effect = to.effect.expect("merged env carries an effect node");
            to.effect = Some(if builder.is_phi_with_merge(to_effect, merge) {
                builder.append_to_phi(merge, to_effect, from_effect);
                to_effect
            } else if to_effect == from_effect {
                to_effect
            } else {
                let mut inputs = crate::alloc::vec![to_effect; old_arity];
                inputs.push(from_effect);
                builder.effect_phi(&inputs, merge)
            });

            let mut to_locals = to.locals.take().expect("merged env carries locals");
            let from_locals = from
                .locals
                .as_ref()
                .expect("reachable env carries locals");
            for (i, slot) in to_locals.iter_mut().enumerate() {
                let from_v = from_locals[i];
                if builder.is_phi_with_merge(*slot, merge) {
                    builder.append_to_phi(merge, *slot, from_v);
                } else if *slot != from_v {
                    let mut inputs = crate::alloc::vec![*slot; old_arity];
                    inputs.push(from_v);
                    *slot = builder.phi(local_types[i], &inputs, merge);
                }
            }
            to.locals = Some(to_locals);
        }
        State::ControlEnd => {
            unreachable!("a goto target is never left in control-end state")
        }
    }

    from.kill();
}

/// Turn `env.control` into a loop header, ready to receive backedges.
///
/// Wraps the effect and every local in a one-input phi attached to the
/// header, and attaches a terminator. Subsequent [`goto`] calls back to
/// this environment extend those phis in place, per the same incremental
/// merge-extension discipline as a regular merged environment.
pub fn prepare_for_loop<B: Builder>(builder: &mut B, env: &mut Environment<B::Node>, local_types: &[ValueType]) {
    env.state = State::Merged;

    let control = env.control.expect("env carries a control node before looping");
    let header = builder.loop_header(control);
    env.control = Some(header);

    let effect = env.effect.expect("env carries an effect node before looping");
    let effect_phi = builder.effect_phi(&[effect], header);
    builder.terminate(effect_phi, header);
    env.effect = Some(effect_phi);

    let locals = env.locals.take().expect("env carries locals before looping");
    let wrapped = locals
        .into_iter()
        .enumerate()
        .map(|(i, v)| builder.phi(local_types[i], &[v], header))
        .collect();
    env.locals = Some(wrapped);
}
