//! Engine tuning knobs and the shared interrupt flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::heap::DEFAULT_COLLECT_THRESHOLD;

/// Settings a host hands to [`Engine::with_config`].
///
/// Cloning is cheap and keeps the interrupt flag shared, so one clone
/// can sit in a signal handler or watchdog thread while the engine owns
/// another. The evaluator polls the flag between frame steps and
/// unwinds with `CoreError::Interrupted` once it is set.
///
/// [`Engine::with_config`]: crate::engine::Engine::with_config
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Call frames allowed before evaluation fails with `StackOverflow`.
    pub max_call_depth: usize,

    /// Managed heap allocations between automatic collections.
    pub collect_threshold: usize,

    /// Cancellation flag shared across clones.
    pub interrupt: Arc<AtomicBool>,

    /// Emit a trace event for every evaluation step.
    pub trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_call_depth: 1000,
            collect_threshold: DEFAULT_COLLECT_THRESHOLD,
            interrupt: Arc::new(AtomicBool::new(false)),
            trace: false,
        }
    }
}

impl EngineConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings with a custom recursion cap.
    pub fn with_max_call_depth(depth: usize) -> Self {
        EngineConfig {
            max_call_depth: depth,
            ..Self::default()
        }
    }

    /// Whether a cancellation request is pending.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Ask the evaluator to stop at its next checkpoint.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }

    /// Clear a pending cancellation request.
    pub fn reset_interrupt(&self) {
        self.interrupt.store(false, Ordering::Relaxed);
    }
}
