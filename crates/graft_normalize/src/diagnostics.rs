//! Fatal normalization diagnostics.
//!
//! Both conditions reported here are programmer errors that the codegen layer
//! could not catch; the public entry points render them and terminate the
//! process, while the fallible variants hand them back for the caller (and
//! the test suite) to inspect.

use std::fmt;

use graft_component::TypeId;
use thiserror::Error;

/// One in-progress component on the installation trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceFrame {
    /// Identity of the component function still being expanded.
    pub fun_type_id: TypeId,
    /// Whether the loop re-entered the expansion at this frame.
    pub loop_start: bool,
}

/// The component installation walk rendered when a loop is found, ordered
/// from the top-level component to the most deeply nested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTrace {
    pub toplevel_component_fun_type_id: TypeId,
    pub frames: Vec<TraceFrame>,
    /// The component whose second installation closed the loop.
    pub repeated_fun_type_id: TypeId,
}

impl fmt::Display for InstallationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found a loop while expanding the components passed to install().")?;
        writeln!(f, "Component installation trace (from top-level to the most deeply-nested):")?;
        writeln!(f, "{}", self.toplevel_component_fun_type_id)?;
        for frame in &self.frames {
            if frame.loop_start {
                writeln!(f, "<-- the loop starts here")?;
            }
            writeln!(f, "{}", frame.fun_type_id)?;
        }
        writeln!(f, "{}", self.repeated_fun_type_id)
    }
}

/// Fatal conditions surfaced during binding normalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// Two entries bound the same type in ways that cannot be unified.
    #[error("{}", multiple_bindings_message(.type_id))]
    MultipleBindings { type_id: TypeId },

    /// A lazy component was reached again while its own expansion was still
    /// in progress.
    #[error("{trace}")]
    InstallationLoop { trace: InstallationTrace },
}

fn multiple_bindings_message(type_id: &TypeId) -> String {
    format!(
        "Fatal injection error: the type {type_id} was provided more than once, with different bindings.\n\
         This was not caught at compile time because at least one of the involved components binds this type \
         without exposing it in the component signature.\n\
         If the source of the problem is unclear, try exposing this type in all the component signatures where \
         it is bound; if no component hides it this cannot happen.\n"
    )
}
