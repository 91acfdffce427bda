//! Semantic control stacks: one frame per open `block`/`loop`/`switch` and
//! one per open `if`/`if-then`/`ternary`/`switch` case. These are
//! independent of the shift–reduce production stack — a reduce may
//! complete without ever touching them.

use crate::env::Environment;

/// Pushed on entering a `block`, `loop`, or `switch`.
pub struct BlockFrame<N> {
    /// Destination for `continue`; `None` except inside a `loop`.
    pub cont_env: Option<Environment<N>>,
    /// Destination for `break`, and for falling off the structural end of
    /// the frame's body.
    pub break_env: Environment<N>,
}

/// Pushed on the structural entry to an `if`, `if-then`, `ternary`, or one
/// `switch` case.
pub struct IfFrame<N> {
    /// Environment after taking the true edge.
    pub true_env: Environment<N>,
    /// Environment after taking the false edge.
    pub false_env: Environment<N>,
}
