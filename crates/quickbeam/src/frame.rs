//! Live call frames
//!
//! A frame pairs an action with the varlist holding its gathered
//! arguments. The engine keeps frames on a stack while they run; on
//! return the varlist is expired unless the frame was captured, in which
//! case it survives as a free-standing context.

use crate::action::ActionHandle;
use crate::context::ContextHandle;
use crate::symbol::Symbol;

/// One activation on the call stack.
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    varlist: ContextHandle,
    action: ActionHandle,
    phase: ActionHandle,
    label: Option<Symbol>,
    captured: bool,
}

impl Frame {
    /// A fresh activation; the phase starts at the invoked action.
    pub fn new(varlist: ContextHandle, action: ActionHandle, label: Option<Symbol>) -> Self {
        Frame {
            varlist,
            action,
            phase: action,
            label,
            captured: false,
        }
    }

    /// The context holding this frame's argument variables.
    pub fn varlist(self) -> ContextHandle {
        self.varlist
    }

    /// The action this frame was built for.
    pub fn action(self) -> ActionHandle {
        self.action
    }

    /// The phase currently executing; composed actions walk this forward
    /// without rebuilding the frame.
    pub fn phase(self) -> ActionHandle {
        self.phase
    }

    /// Move the phase pointer to the next action in the composition.
    pub fn advance_phase(&mut self, next: ActionHandle) {
        self.phase = next;
    }

    /// Display label, if the call site supplied one.
    pub fn label(self) -> Option<Symbol> {
        self.label
    }

    /// Whether the varlist outlives the call.
    pub fn is_captured(self) -> bool {
        self.captured
    }

    /// Keep the varlist alive after return.
    pub fn capture(&mut self) {
        self.captured = true;
    }
}
