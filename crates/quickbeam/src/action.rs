//! Actions and dispatch tables
//!
//! An action is an immutable bundle of paramlist and dispatcher. Natives
//! carry a Rust closure; generic actions carry a verb resolved per call
//! through the dispatch table on the kind of their first argument; body
//! actions carry a block evaluated in their frame. The dispatch table
//! itself is built once by a `DispatchBuilder` and handed to the engine at
//! construction, so registration is a boot-time affair and lookups touch
//! no shared mutable state.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::cell::{Cell, Kind, KindSet, KIND_COUNT};
use crate::context::{ContextFlavor, ContextHandle, Keylist};
use crate::engine::Engine;
use crate::error::{CoreError, Result};
use crate::heap::{Heap, SeriesHandle};
use crate::symbol::{Symbol, SymbolTable};

/// Handle to a registered action. Actions live for the life of the
/// engine, so handles carry no generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionHandle(u32);

impl ActionHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a parameter receives its argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamClass {
    /// Argument is evaluated before the frame fills
    Normal,
    /// Argument is taken literally, unevaluated (spelled `'name`)
    Literal,
}

/// One parameter of an action.
#[derive(Clone, Debug)]
pub struct Param {
    /// Parameter name; doubles as the frame variable key
    pub name: Symbol,
    /// Evaluated or literal
    pub class: ParamClass,
    /// Accepted kinds; `None` accepts anything
    pub constraint: Option<KindSet>,
}

/// The Rust face of an action: natives and generic handlers share it.
/// The frame handle gives typed access to the gathered arguments.
pub type ActionFn = Arc<dyn Fn(&mut Engine, ContextHandle) -> Result<Cell> + Send + Sync>;

/// What runs when an action's frame is full.
#[derive(Clone)]
pub enum Dispatcher {
    /// Call a Rust function
    Native(ActionFn),
    /// Resolve (verb, kind of first argument) through the dispatch table
    Generic(Symbol),
    /// Evaluate a block with the frame as its binding context
    Body(SeriesHandle),
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatcher::Native(_) => write!(f, "Native(..)"),
            Dispatcher::Generic(verb) => write!(f, "Generic({:?})", verb),
            Dispatcher::Body(handle) => write!(f, "Body({:?})", handle),
        }
    }
}

/// An immutable action definition.
#[derive(Clone, Debug)]
pub struct ActionData {
    label: Option<Symbol>,
    params: Vec<Param>,
    keylist: Arc<Keylist>,
    dispatcher: Dispatcher,
    phase: Option<ActionHandle>,
}

impl ActionData {
    /// Display label, when the action has one.
    pub fn label(&self) -> Option<Symbol> {
        self.label
    }

    /// The parameters in frame order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// The paramlist as a frame keylist; frames share it, never copy it.
    pub fn keylist(&self) -> &Arc<Keylist> {
        &self.keylist
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The next action in a composition, delegated to through the frame's
    /// phase pointer.
    pub fn phase(&self) -> Option<ActionHandle> {
        self.phase
    }
}

/// The arena of registered actions. Append-only; actions are never freed.
#[derive(Default)]
pub struct Actions {
    items: Vec<ActionData>,
}

impl Actions {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action, returning its handle.
    pub fn push(
        &mut self,
        label: Option<Symbol>,
        params: Vec<Param>,
        dispatcher: Dispatcher,
        phase: Option<ActionHandle>,
    ) -> ActionHandle {
        let keylist = Arc::new(Keylist::from_keys(
            ContextFlavor::Frame,
            params.iter().map(|p| p.name),
        ));
        let handle = ActionHandle(self.items.len() as u32);
        self.items.push(ActionData {
            label,
            params,
            keylist,
            dispatcher,
            phase,
        });
        handle
    }

    /// The definition behind a handle. Handles only come from `push`, so
    /// the index is always in range.
    pub fn get(&self, handle: ActionHandle) -> &ActionData {
        &self.items[handle.index()]
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every body block handle, for rooting during collection.
    pub fn body_roots(&self) -> impl Iterator<Item = SeriesHandle> + '_ {
        self.items.iter().filter_map(|a| match a.dispatcher {
            Dispatcher::Body(handle) => Some(handle),
            _ => None,
        })
    }
}

impl std::fmt::Debug for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Actions({} registered)", self.items.len())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Spec parsing
// ═══════════════════════════════════════════════════════════════════════

/// Turn a spec block into a parameter list.
///
/// The grammar is small: an optional leading text is a description,
/// `name` declares an evaluated parameter, `'name` a literal one, and a
/// block right after a parameter lists the datatype names it accepts:
///
/// ```text
/// [ "add a pad to a block"  block [block! group!]  'count [integer!] ]
/// ```
///
/// Any other shape fails with `BadActionSpec` at construction time, never
/// per call.
pub fn parse_spec(heap: &Heap, symbols: &SymbolTable, spec: SeriesHandle) -> Result<Vec<Param>> {
    let body = heap.array(spec)?;
    let mut params: Vec<Param> = Vec::new();
    let mut i = 0;

    while i < body.len() {
        let cell = match body.at(i) {
            Some(c) => c,
            None => break,
        };

        // Leading description text is tolerated and skipped.
        if cell.kind() == Kind::Text && params.is_empty() && i == 0 {
            i += 1;
            continue;
        }

        let (symbol, class) = match (cell.kind(), cell.quotes()) {
            (Kind::Word, 0) => (cell.as_word(), ParamClass::Normal),
            (Kind::Word, 1) => (cell.as_word(), ParamClass::Literal),
            _ => {
                return Err(CoreError::BadActionSpec {
                    reason: format!("unexpected {} in spec block", cell.kind()),
                })
            }
        };
        let symbol = symbol.ok_or_else(|| CoreError::BadActionSpec {
            reason: "word without spelling in spec block".to_string(),
        })?;

        if params.iter().any(|p| p.name.canon_eq(symbol)) {
            return Err(CoreError::BadActionSpec {
                reason: format!("duplicate parameter {}", symbols.spelling(symbol)),
            });
        }

        // Optional constraint block directly after the parameter word.
        let mut constraint = None;
        if let Some(next) = body.at(i + 1) {
            if next.kind() == Kind::Block && next.quotes() == 0 {
                let (series, _) = next.series_ref().ok_or(CoreError::SeriesFreed)?;
                constraint = Some(parse_constraint(heap, symbols, series)?);
                i += 1;
            }
        }

        params.push(Param {
            name: symbol,
            class,
            constraint,
        });
        i += 1;
    }

    Ok(params)
}

fn parse_constraint(heap: &Heap, symbols: &SymbolTable, block: SeriesHandle) -> Result<KindSet> {
    let body = heap.array(block)?;
    let mut set = KindSet::none();
    for cell in body.cells() {
        let name = cell
            .as_word()
            .map(|s| symbols.spelling(s))
            .ok_or_else(|| CoreError::BadActionSpec {
                reason: "type constraint must list datatype words".to_string(),
            })?;
        let kind = Kind::from_name(&name).ok_or_else(|| CoreError::BadActionSpec {
            reason: format!("unknown datatype {}", name),
        })?;
        set = set.with(kind);
    }
    if set.is_empty() {
        return Err(CoreError::BadActionSpec {
            reason: "empty type constraint".to_string(),
        });
    }
    Ok(set)
}

// ═══════════════════════════════════════════════════════════════════════
// Generic dispatch table
// ═══════════════════════════════════════════════════════════════════════

type Row = Box<[Option<ActionFn>; KIND_COUNT]>;

fn empty_row() -> Row {
    Box::new(std::array::from_fn(|_| None))
}

/// Mutable registration surface for generic handlers. Built during boot,
/// sealed into a [`DispatchTable`], and passed to the engine constructor.
#[derive(Default)]
pub struct DispatchBuilder {
    rows: IndexMap<Symbol, Row>,
}

impl DispatchBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for (verb, kind). Re-registering replaces the
    /// previous handler; registration order is otherwise irrelevant.
    pub fn register(&mut self, verb: Symbol, kind: Kind, handler: ActionFn) -> &mut Self {
        debug!(kind = kind.name(), "registering generic handler");
        let row = self.rows.entry(verb).or_insert_with(empty_row);
        row[kind.index()] = Some(handler);
        self
    }

    /// Seal the table.
    pub fn build(self) -> DispatchTable {
        DispatchTable { rows: self.rows }
    }
}

impl std::fmt::Debug for DispatchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchBuilder({} verbs)", self.rows.len())
    }
}

/// The immutable (verb, kind) -> handler table.
///
/// One row per verb, one column per built-in kind; a miss is a miss, with
/// no inheritance or fallback column.
pub struct DispatchTable {
    rows: IndexMap<Symbol, Row>,
}

impl DispatchTable {
    /// Look up the handler for a verb applied to a kind.
    pub fn find(&self, verb: Symbol, kind: Kind) -> Option<&ActionFn> {
        self.rows.get(&verb)?[kind.index()].as_ref()
    }

    /// All registered verbs, in registration order.
    pub fn verbs(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.rows.keys().copied()
    }

    /// Number of registered verbs.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no verb is registered.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchTable({} verbs)", self.rows.len())
    }
}
