//! The engine: heap, symbols, actions, and the lib context in one place
//!
//! An [`Engine`] owns everything evaluation touches. The generic dispatch
//! table is sealed before the engine exists; actions and lib definitions
//! accumulate afterwards through the registration methods. Collection
//! runs between evaluation steps with the engine assembling the root set
//! from its own structures, so hosts only manage holds for series they
//! keep outside any context.

use crate::action::{parse_spec, ActionFn, ActionHandle, Actions, DispatchBuilder, DispatchTable, Dispatcher};
use crate::cell::{Cell, Kind};
use crate::config::EngineConfig;
use crate::context::{Case, ContextFlavor, ContextHandle};
use crate::error::{CoreError, Result, ScanError};
use crate::frame::Frame;
use crate::heap::{Heap, SeriesHandle};
use crate::prelude;
use crate::scanner;
use crate::symbol::{Symbol, SymbolTable};

/// The evaluation engine.
pub struct Engine {
    pub(crate) heap: Heap,
    pub(crate) symbols: SymbolTable,
    pub(crate) actions: Actions,
    pub(crate) dispatch: DispatchTable,
    pub(crate) lib: ContextHandle,
    pub(crate) frames: Vec<Frame>,
    pub(crate) eval_roots: Vec<SeriesHandle>,
    pub(crate) config: EngineConfig,
}

impl Engine {
    /// An engine with the stock dispatch table and default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// An engine with the stock dispatch table.
    pub fn with_config(config: EngineConfig) -> Self {
        let symbols = SymbolTable::new();
        let mut builder = DispatchBuilder::new();
        prelude::register_generics(&symbols, &mut builder);
        Self::with_dispatch(symbols, builder.build(), config)
    }

    /// An engine around a custom dispatch table. The verbs in the table
    /// must have been interned through `symbols`; the stock natives and
    /// generic verb actions are still defined, so a table without their
    /// registrations reports `NoHandlerForType` when those verbs run.
    pub fn with_dispatch(
        symbols: SymbolTable,
        dispatch: DispatchTable,
        config: EngineConfig,
    ) -> Self {
        let mut heap = Heap::with_collect_threshold(config.collect_threshold);
        let lib = ContextHandle::make(&mut heap, ContextFlavor::Module, 64)
            .expect("lib context allocates on a fresh heap");
        let mut engine = Engine {
            heap,
            symbols,
            actions: Actions::new(),
            dispatch,
            lib,
            frames: Vec::new(),
            eval_roots: Vec::new(),
            config,
        };
        prelude::install(&mut engine).expect("boot definitions are well-formed");
        engine
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scanning and running
    // ═══════════════════════════════════════════════════════════════════

    /// Scan source bytes into a managed array.
    pub fn scan(
        &mut self,
        bytes: &[u8],
        file: Option<&str>,
    ) -> std::result::Result<SeriesHandle, ScanError> {
        scanner::scan(&mut self.heap, &self.symbols, bytes, file)
    }

    /// Scan, bind to lib, and evaluate. Top-level set-words become lib
    /// variables. The result keeps its lift state; use [`Cell::decay`]
    /// for the value ordinary channels would see.
    pub fn run(&mut self, source: &str) -> Result<Cell> {
        let block = self.scan(source.as_bytes(), None)?;
        self.lib.bind_block(&mut self.heap, block)?;
        self.eval(block)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Action registration
    // ═══════════════════════════════════════════════════════════════════

    /// Build a native action from a spec block. The spec is parsed now;
    /// a malformed one fails here, never at call time.
    pub fn make_native(
        &mut self,
        spec: SeriesHandle,
        label: Option<&str>,
        func: ActionFn,
    ) -> Result<ActionHandle> {
        let params = parse_spec(&self.heap, &self.symbols, spec)?;
        let label = label.map(|l| self.symbols.intern(l));
        Ok(self
            .actions
            .push(label, params, Dispatcher::Native(func), None))
    }

    /// Scan a spec like `"[value [block!]]"`, build a native from it,
    /// and define it in lib.
    pub fn register_native(
        &mut self,
        name: &str,
        spec_source: &str,
        func: ActionFn,
    ) -> Result<ActionHandle> {
        let scanned = self.scan(spec_source.as_bytes(), None)?;
        let spec = self.unwrap_spec(scanned)?;
        let handle = self.make_native(spec, Some(name), func)?;
        self.define(name, Cell::action(handle))?;
        Ok(handle)
    }

    /// Scan a spec and define a generic verb action: calls resolve
    /// through the dispatch table on the kind of the first argument.
    pub fn register_generic(
        &mut self,
        name: &str,
        spec_source: &str,
        verb: &str,
    ) -> Result<ActionHandle> {
        let scanned = self.scan(spec_source.as_bytes(), None)?;
        let spec = self.unwrap_spec(scanned)?;
        let params = parse_spec(&self.heap, &self.symbols, spec)?;
        if params.is_empty() {
            return Err(CoreError::BadActionSpec {
                reason: "a generic action needs at least one parameter".to_string(),
            });
        }
        let label = self.symbols.intern(name);
        let verb = self.symbols.intern(verb);
        let handle = self
            .actions
            .push(Some(label), params, Dispatcher::Generic(verb), None);
        self.define(name, Cell::action(handle))?;
        Ok(handle)
    }

    /// Spec sources are conventionally written bracketed; scanning one
    /// leaves the parameter cells a level down, inside a single block.
    fn unwrap_spec(&self, scanned: SeriesHandle) -> Result<SeriesHandle> {
        let body = self.heap.array(scanned)?;
        if body.len() == 1 {
            if let Some(cell) = body.at(0) {
                if cell.kind() == Kind::Block {
                    if let Some((series, _)) = cell.series_ref() {
                        return Ok(series);
                    }
                }
            }
        }
        Ok(scanned)
    }

    /// Compose a block onto an existing action: the block runs first in
    /// the shared frame, then control falls through to `inner` via the
    /// frame's phase pointer, without a second argument gathering.
    pub fn make_adaptation(
        &mut self,
        prelude_block: SeriesHandle,
        inner: ActionHandle,
        label: Option<&str>,
    ) -> Result<ActionHandle> {
        let params = self.actions.get(inner).params().to_vec();
        let label = label.map(|l| self.symbols.intern(l));
        Ok(self
            .actions
            .push(label, params, Dispatcher::Body(prelude_block), Some(inner)))
    }

    /// The definition behind an action handle.
    pub fn action(&self, handle: ActionHandle) -> &crate::action::ActionData {
        self.actions.get(handle)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Contexts and variables
    // ═══════════════════════════════════════════════════════════════════

    /// The lib context, where top-level definitions live.
    pub fn lib(&self) -> ContextHandle {
        self.lib
    }

    /// Define or overwrite a lib variable.
    pub fn define(&mut self, name: &str, value: Cell) -> Result<()> {
        let context = self.lib;
        self.set_var(context, name, value)
    }

    /// Find a variable slot by name.
    pub fn lookup(&self, context: ContextHandle, name: &str, case: Case) -> Result<Option<u32>> {
        let symbol = self.symbols.intern(name);
        context.lookup(&self.heap, symbol, case)
    }

    /// Append a key to a context, or return the slot it already has.
    pub fn append(&mut self, context: ContextHandle, name: &str) -> Result<u32> {
        let symbol = self.symbols.intern(name);
        context.append(&mut self.heap, symbol)
    }

    /// Read a variable by name, decaying isotopes.
    pub fn get_var(&self, context: ContextHandle, name: &str) -> Result<Cell> {
        let symbol = self.symbols.intern(name);
        match context.lookup(&self.heap, symbol, Case::Insensitive)? {
            Some(index) => context.get_var(&self.heap, index),
            None => Err(CoreError::NameNotBound {
                name: name.to_string(),
            }),
        }
    }

    /// Write a variable by name, appending the key when absent.
    pub fn set_var(&mut self, context: ContextHandle, name: &str, value: Cell) -> Result<()> {
        let symbol = self.symbols.intern(name);
        let index = match context.lookup(&self.heap, symbol, Case::Insensitive)? {
            Some(index) => index,
            None => context.append(&mut self.heap, symbol)?,
        };
        context.set_var(&mut self.heap, index, value)
    }

    /// Deep-bind a block to a context.
    pub fn bind(&mut self, block: SeriesHandle, context: ContextHandle) -> Result<()> {
        context.bind_block(&mut self.heap, block)
    }

    /// Keep a live frame's varlist alive past its return, turning it
    /// into a free-standing context. Idempotent on captured frames.
    pub fn capture_frame(&mut self, varlist: ContextHandle) -> Result<()> {
        for frame in self.frames.iter_mut().rev() {
            if frame.varlist() == varlist {
                frame.capture();
                return Ok(());
            }
        }
        // Not on the stack: live means it was captured earlier, dead
        // reports the expiry.
        self.heap.array(varlist.varlist()).map(|_| ())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Heap surface
    // ═══════════════════════════════════════════════════════════════════

    /// Hand a byte buffer to the heap without copying.
    pub fn adopt_bytes(&mut self, bytes: Vec<u8>) -> SeriesHandle {
        self.heap.adopt_bytes(bytes)
    }

    /// Take a byte buffer back from the heap without copying; the series
    /// becomes inaccessible.
    pub fn take_bytes(&mut self, handle: SeriesHandle) -> Result<Vec<u8>> {
        self.heap.take_bytes(handle)
    }

    /// Root a series against collection.
    pub fn push_hold(&mut self, handle: SeriesHandle) {
        self.heap.push_hold(handle);
    }

    /// Drop the most recent hold on a series.
    pub fn drop_hold(&mut self, handle: SeriesHandle) {
        self.heap.drop_hold(handle);
    }

    /// Collect now. Roots are the lib context, live frames, arrays under
    /// evaluation, action bodies, and explicit holds. Returns the number
    /// of slots swept.
    pub fn collect(&mut self) -> usize {
        let mut roots: Vec<SeriesHandle> = Vec::with_capacity(
            2 + self.frames.len() + self.eval_roots.len(),
        );
        roots.push(self.lib.varlist());
        roots.extend(self.frames.iter().map(|f| f.varlist().varlist()));
        roots.extend(self.eval_roots.iter().copied());
        roots.extend(self.actions.body_roots());
        self.heap.collect(&roots)
    }

    pub(crate) fn safepoint(&mut self) {
        if self.heap.should_collect() {
            self.collect();
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════

    /// The heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The heap, mutably.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The symbol interner.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The sealed dispatch table.
    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// The engine configuration; the interrupt flag inside is shared, so
    /// a clone taken before long evaluations can stop them.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn label_text(&self, label: Option<Symbol>) -> String {
        match label {
            Some(symbol) => self.symbols.spelling(symbol).to_string(),
            None => "anonymous".to_string(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("live_series", &self.heap.live_count())
            .field("actions", &self.actions.len())
            .field("frames", &self.frames.len())
            .finish()
    }
}
