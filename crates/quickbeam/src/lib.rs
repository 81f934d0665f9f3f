//! # Quickbeam
//!
//! The execution core of a homoiconic scripting language.
//!
//! Code and data share one representation: fixed-size cells held in
//! heap-allocated series. The scanner turns source bytes into arrays of
//! cells, contexts bind words to variable slots, and the evaluator walks
//! arrays invoking actions as it meets them. Hosts embed the whole thing
//! through [`Engine`].
//!
//! ## Architecture
//!
//! - **Cells**: tagged values with orthogonal quoting and lift state
//! - **Heap**: generation-checked series slots, mark-and-sweep collected
//! - **Contexts**: append-only symbol-to-slot maps sharing keylists copy-on-write
//! - **Actions**: natives, generic verbs, and block bodies dispatched over frames
//! - **Scanner**: explicit-state reader producing bind-ready arrays
//!
//! ```
//! use quickbeam::Engine;
//!
//! let mut engine = Engine::new();
//! let result = engine.run("b: [1 2] append b 3 length-of b").unwrap();
//! assert_eq!(result.as_int(), Some(3));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod array;
pub mod cell;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod frame;
pub mod heap;
pub mod prelude;
pub mod render;
pub mod scanner;
pub mod symbol;

// Re-export main types
pub use action::{
    ActionData, ActionFn, ActionHandle, Actions, DispatchBuilder, DispatchTable, Dispatcher,
    Param, ParamClass,
};
pub use cell::{Binding, Cell, Kind, KindSet, Lift, Payload, KIND_COUNT};
pub use config::EngineConfig;
pub use context::{Case, ContextFlavor, ContextHandle, Keylist};
pub use engine::Engine;
pub use error::{CoreError, Result, ScanError, ScanErrorKind};
pub use heap::{Heap, SeriesHandle};
pub use render::{render_context, render_value};
pub use scanner::scan;
pub use symbol::{Symbol, SymbolTable};

/// Quickbeam version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
