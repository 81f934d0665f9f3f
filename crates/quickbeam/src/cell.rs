//! The Cell value representation
//!
//! A Cell is one fixed-size value slot. Every array element, context
//! variable, and evaluation result is a Cell. The datatype tag, the quote
//! level, and the lift state are independent axes: quoting or lifting a
//! value never changes its kind or its payload bits.

use crate::action::ActionHandle;
use crate::context::ContextHandle;
use crate::error::{CoreError, Result};
use crate::heap::SeriesHandle;
use crate::symbol::Symbol;

/// Built-in datatypes.
///
/// The discriminant doubles as the column index of the generic dispatch
/// table, so the set is closed and ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Kind {
    /// The falsey placeholder value `_`
    Blank,
    /// 64-bit signed integer
    Integer,
    /// Short immutable token: `#`, `#name`, `#"c"`
    Rune,
    /// Evaluating name reference
    Word,
    /// Assigning name reference: `name:`
    SetWord,
    /// Fetching name reference: `:name`
    GetWord,
    /// UTF-8 string series
    Text,
    /// Byte series: `#{DECAFBAD}`
    Binary,
    /// Inert cell sequence: `[...]`
    Block,
    /// Evaluating cell sequence: `(...)`
    Group,
    /// Slash-joined sequence: `a/b/c`
    Path,
    /// Dot-joined sequence: `a.b.c`
    Tuple,
    /// Keyed context reference
    Object,
    /// Action activation record reference
    Frame,
    /// Invokable function reference
    Action,
}

/// Number of built-in kinds (the width of a dispatch row).
pub const KIND_COUNT: usize = 15;

impl Kind {
    /// All kinds in discriminant order.
    pub const ALL: [Kind; KIND_COUNT] = [
        Kind::Blank,
        Kind::Integer,
        Kind::Rune,
        Kind::Word,
        Kind::SetWord,
        Kind::GetWord,
        Kind::Text,
        Kind::Binary,
        Kind::Block,
        Kind::Group,
        Kind::Path,
        Kind::Tuple,
        Kind::Object,
        Kind::Frame,
        Kind::Action,
    ];

    /// Datatype name as written in source, e.g. `integer!`.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Blank => "blank!",
            Kind::Integer => "integer!",
            Kind::Rune => "rune!",
            Kind::Word => "word!",
            Kind::SetWord => "set-word!",
            Kind::GetWord => "get-word!",
            Kind::Text => "text!",
            Kind::Binary => "binary!",
            Kind::Block => "block!",
            Kind::Group => "group!",
            Kind::Path => "path!",
            Kind::Tuple => "tuple!",
            Kind::Object => "object!",
            Kind::Frame => "frame!",
            Kind::Action => "action!",
        }
    }

    /// Parse a datatype name, the inverse of [`Kind::name`].
    pub fn from_name(name: &str) -> Option<Kind> {
        Kind::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Column index in a dispatch row.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this kind is one of the word flavors.
    pub fn is_word_like(self) -> bool {
        matches!(self, Kind::Word | Kind::SetWord | Kind::GetWord)
    }

    /// Whether this kind is a cell-sequence (array-backed) kind.
    pub fn is_any_array(self) -> bool {
        matches!(self, Kind::Block | Kind::Group | Kind::Path | Kind::Tuple)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of kinds, used for parameter type constraints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KindSet(u64);

impl KindSet {
    /// The empty set.
    pub fn none() -> Self {
        KindSet(0)
    }

    /// The set of all built-in kinds.
    pub fn all() -> Self {
        KindSet((1u64 << KIND_COUNT) - 1)
    }

    /// Add a kind to the set.
    pub fn with(mut self, kind: Kind) -> Self {
        self.0 |= 1 << kind.index();
        self
    }

    /// Membership test.
    pub fn contains(self, kind: Kind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// True when no kind is in the set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for KindSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for kind in Kind::ALL {
            if self.contains(kind) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{}", kind)?;
                first = false;
            }
        }
        if first {
            write!(f, "(no types)")?;
        }
        Ok(())
    }
}

impl FromIterator<Kind> for KindSet {
    fn from_iter<I: IntoIterator<Item = Kind>>(iter: I) -> Self {
        iter.into_iter().fold(KindSet::none(), KindSet::with)
    }
}

/// The lift axis of a cell, orthogonal to kind and quote level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lift {
    /// An ordinary value
    #[default]
    Plain,
    /// A `~...~` placeholder; storable, becomes an isotope when evaluated
    Quasi,
    /// An unstable evaluation product; never storable in plain arrays
    Isotope,
}

/// Maximum byte length of rune content held inline in a cell.
pub const RUNE_INLINE: usize = 14;

/// Inline buffer for short rune content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuneBuf {
    len: u8,
    bytes: [u8; RUNE_INLINE],
}

impl RuneBuf {
    /// Build from a short UTF-8 string. `None` when the content does not
    /// fit inline; callers fall back to series storage.
    pub fn from_str(s: &str) -> Option<RuneBuf> {
        if s.is_empty() || s.len() > RUNE_INLINE {
            return None;
        }
        let mut bytes = [0u8; RUNE_INLINE];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(RuneBuf {
            len: s.len() as u8,
            bytes,
        })
    }

    /// The content as a string slice.
    pub fn as_str(&self) -> &str {
        // The buffer is only ever filled from &str input.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Runes are never empty; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for RuneBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RuneBuf({:?})", self.as_str())
    }
}

/// A word's cached binding: which context, which slot.
///
/// Contexts are append-only, so a cached index never goes stale; re-binding
/// simply overwrites it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Binding {
    /// The bound-to context
    pub context: ContextHandle,
    /// Variable slot index within that context
    pub index: u32,
}

/// Cell payload: what the value actually holds.
///
/// The inline-versus-external distinction is the variant itself; variants
/// carrying handles reference heap series, the rest are self-contained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Payload {
    /// No content (blank)
    None,
    /// Inline integer
    Int(i64),
    /// Inline rune content
    Rune(RuneBuf),
    /// Word symbol plus optional cached binding
    Word {
        /// Interned spelling
        symbol: Symbol,
        /// Cached context slot, when bound
        binding: Option<Binding>,
    },
    /// Position into a heap series (texts, binaries, any-arrays, long runes)
    Series {
        /// The backing series
        series: SeriesHandle,
        /// 0-based element offset the cell addresses
        index: u32,
    },
    /// Context reference (objects, modules)
    Context(ContextHandle),
    /// Frame reference: its varlist plus the action it instantiates
    FrameOf {
        /// The frame's variable context
        varlist: ContextHandle,
        /// The action this frame is an activation of
        action: ActionHandle,
    },
    /// Action reference
    Action(ActionHandle),
}

/// One fixed-size value slot.
///
/// Cells are plain data and are copied freely; series and context payloads
/// are references into the heap, so copying a cell never copies content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cell {
    kind: Kind,
    quotes: u8,
    lift: Lift,
    protected: bool,
    payload: Payload,
}

impl Cell {
    fn new(kind: Kind, payload: Payload) -> Cell {
        Cell {
            kind,
            quotes: 0,
            lift: Lift::Plain,
            protected: false,
            payload,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Constructors
    // ═══════════════════════════════════════════════════════════════════

    /// The blank value `_`.
    pub fn blank() -> Cell {
        Cell::new(Kind::Blank, Payload::None)
    }

    /// An integer value.
    pub fn integer(value: i64) -> Cell {
        Cell::new(Kind::Integer, Payload::Int(value))
    }

    /// A rune with inline content. `None` when the content does not fit;
    /// see `Heap::alloc_rune` for the series-backed fallback.
    pub fn rune(content: &str) -> Option<Cell> {
        RuneBuf::from_str(content).map(|buf| Cell::new(Kind::Rune, Payload::Rune(buf)))
    }

    /// The blackhole rune `#`: the single codepoint-zero character.
    /// Truthy, contentless in print, distinct from blank.
    pub fn blackhole() -> Cell {
        Cell::rune("\u{0}").unwrap_or_else(Cell::blank)
    }

    /// An unbound evaluating word.
    pub fn word(symbol: Symbol) -> Cell {
        Cell::new(
            Kind::Word,
            Payload::Word {
                symbol,
                binding: None,
            },
        )
    }

    /// An unbound set-word `name:`.
    pub fn set_word(symbol: Symbol) -> Cell {
        Cell::new(
            Kind::SetWord,
            Payload::Word {
                symbol,
                binding: None,
            },
        )
    }

    /// An unbound get-word `:name`.
    pub fn get_word(symbol: Symbol) -> Cell {
        Cell::new(
            Kind::GetWord,
            Payload::Word {
                symbol,
                binding: None,
            },
        )
    }

    /// A series-referencing cell of the given kind, positioned at `index`.
    ///
    /// `kind` must be a series kind (text, binary, any-array, or rune for
    /// overlong rune content).
    pub fn series_at(kind: Kind, series: SeriesHandle, index: u32) -> Cell {
        debug_assert!(
            kind.is_any_array() || matches!(kind, Kind::Text | Kind::Binary | Kind::Rune),
            "series cell with non-series kind"
        );
        Cell::new(kind, Payload::Series { series, index })
    }

    /// A text cell at position 0 of its series.
    pub fn text(series: SeriesHandle) -> Cell {
        Cell::series_at(Kind::Text, series, 0)
    }

    /// A binary cell at position 0 of its series.
    pub fn binary(series: SeriesHandle) -> Cell {
        Cell::series_at(Kind::Binary, series, 0)
    }

    /// A block cell at position 0 of its array.
    pub fn block(series: SeriesHandle) -> Cell {
        Cell::series_at(Kind::Block, series, 0)
    }

    /// A group cell at position 0 of its array.
    pub fn group(series: SeriesHandle) -> Cell {
        Cell::series_at(Kind::Group, series, 0)
    }

    /// A path cell at position 0 of its array.
    pub fn path(series: SeriesHandle) -> Cell {
        Cell::series_at(Kind::Path, series, 0)
    }

    /// A tuple cell at position 0 of its array.
    pub fn tuple(series: SeriesHandle) -> Cell {
        Cell::series_at(Kind::Tuple, series, 0)
    }

    /// An object reference.
    pub fn object(context: ContextHandle) -> Cell {
        Cell::new(Kind::Object, Payload::Context(context))
    }

    /// A frame reference.
    pub fn frame(varlist: ContextHandle, action: ActionHandle) -> Cell {
        Cell::new(Kind::Frame, Payload::FrameOf { varlist, action })
    }

    /// An action reference.
    pub fn action(action: ActionHandle) -> Cell {
        Cell::new(Kind::Action, Payload::Action(action))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════

    /// The datatype tag.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Current quote level.
    pub fn quotes(&self) -> u8 {
        self.quotes
    }

    /// Current lift state.
    pub fn lift(&self) -> Lift {
        self.lift
    }

    /// Whether the cell is marked read-only.
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// The raw payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Integer content, when this is an integer cell.
    pub fn as_int(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Word symbol, for any word flavor.
    pub fn as_word(&self) -> Option<Symbol> {
        match self.payload {
            Payload::Word { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// Cached binding, for a bound word.
    pub fn binding(&self) -> Option<Binding> {
        match self.payload {
            Payload::Word { binding, .. } => binding,
            _ => None,
        }
    }

    /// Series handle and index, for series-referencing cells.
    pub fn series_ref(&self) -> Option<(SeriesHandle, u32)> {
        match self.payload {
            Payload::Series { series, index } => Some((series, index)),
            _ => None,
        }
    }

    /// Context handle, for objects and frames.
    pub fn context_ref(&self) -> Option<ContextHandle> {
        match self.payload {
            Payload::Context(ctx) => Some(ctx),
            Payload::FrameOf { varlist, .. } => Some(varlist),
            _ => None,
        }
    }

    /// Action handle, for action cells and frames.
    pub fn action_ref(&self) -> Option<ActionHandle> {
        match self.payload {
            Payload::Action(a) => Some(a),
            Payload::FrameOf { action, .. } => Some(action),
            _ => None,
        }
    }

    /// Inline rune content. Series-backed runes return `None`; read those
    /// through the heap.
    pub fn rune_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Rune(buf) => Some(buf.as_str()),
            _ => None,
        }
    }

    /// Whether this is the blackhole rune.
    pub fn is_blackhole(&self) -> bool {
        matches!(&self.payload, Payload::Rune(buf) if buf.as_str() == "\u{0}")
    }

    /// Conditional truth. Blank is the single falsey value; the blackhole
    /// and everything else count as true.
    pub fn is_truthy(&self) -> bool {
        self.kind != Kind::Blank
    }

    // ═══════════════════════════════════════════════════════════════════
    // Quote level
    // ═══════════════════════════════════════════════════════════════════

    /// Add one quote level.
    pub fn quote(self) -> Result<Cell> {
        self.quote_depth(1)
    }

    /// Add `levels` quote levels.
    pub fn quote_depth(mut self, levels: u8) -> Result<Cell> {
        match self.quotes.checked_add(levels) {
            Some(q) => {
                self.quotes = q;
                Ok(self)
            }
            None => Err(CoreError::QuoteOverflow),
        }
    }

    /// Remove one quote level. Kind and payload are untouched.
    pub fn unquote(mut self) -> Result<Cell> {
        if self.quotes == 0 {
            return Err(CoreError::QuoteUnderflow);
        }
        self.quotes -= 1;
        Ok(self)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lift state
    // ═══════════════════════════════════════════════════════════════════

    /// The quasi form of this value, payload bits untouched.
    pub fn quasi(mut self) -> Cell {
        self.lift = Lift::Quasi;
        self
    }

    /// The isotope form of this value, payload bits untouched.
    pub fn isotopic(mut self) -> Cell {
        self.lift = Lift::Isotope;
        self
    }

    /// The plain form of this value, payload bits untouched.
    pub fn plain(mut self) -> Cell {
        self.lift = Lift::Plain;
        self
    }

    /// Collapse an isotope to its plain form; identity on plain and quasi
    /// values, so applying it twice equals applying it once.
    pub fn decay(mut self) -> Cell {
        if self.lift == Lift::Isotope {
            self.lift = Lift::Plain;
        }
        self
    }

    /// Whether the lift state is isotope.
    pub fn is_isotope(&self) -> bool {
        self.lift == Lift::Isotope
    }

    /// Whether the lift state is quasi.
    pub fn is_quasi(&self) -> bool {
        self.lift == Lift::Quasi
    }

    // ═══════════════════════════════════════════════════════════════════
    // Bookkeeping bits
    // ═══════════════════════════════════════════════════════════════════

    /// Return this cell with the protected bit set or cleared.
    pub fn with_protected(mut self, on: bool) -> Cell {
        self.protected = on;
        self
    }

    /// Return this cell with its binding cache replaced. Only meaningful
    /// for word cells; other kinds are returned unchanged.
    pub fn with_binding(mut self, new: Binding) -> Cell {
        if let Payload::Word { symbol, .. } = self.payload {
            self.payload = Payload::Word {
                symbol,
                binding: Some(new),
            };
        }
        self
    }

    /// Redirect a series-referencing cell to another series, keeping the
    /// position, quotes, and lift state. Copying uses this to rewire
    /// cells onto duplicated children.
    pub(crate) fn with_series(mut self, series: SeriesHandle) -> Cell {
        if let Payload::Series { index, .. } = self.payload {
            self.payload = Payload::Series { series, index };
        }
        self
    }

    /// Redirect a context or frame cell to another varlist. Frame cells
    /// keep their action.
    pub(crate) fn with_context(mut self, context: ContextHandle) -> Cell {
        match self.payload {
            Payload::Context(_) => self.payload = Payload::Context(context),
            Payload::FrameOf { action, .. } => {
                self.payload = Payload::FrameOf {
                    varlist: context,
                    action,
                }
            }
            _ => {}
        }
        self
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for _ in 0..self.quotes {
            write!(f, "'")?;
        }
        if self.lift == Lift::Quasi {
            write!(f, "~")?;
        }
        if self.lift == Lift::Isotope {
            write!(f, "~*~")?;
        }
        match &self.payload {
            Payload::None => write!(f, "_"),
            Payload::Int(n) => write!(f, "{}", n),
            Payload::Rune(buf) => {
                if self.is_blackhole() {
                    write!(f, "#")
                } else {
                    write!(f, "#{}", buf.as_str())
                }
            }
            Payload::Word { symbol, binding } => {
                write!(f, "{:?}@{:?}", symbol, binding)
            }
            Payload::Series { series, index } => {
                write!(f, "{}[{:?}+{}]", self.kind, series, index)
            }
            Payload::Context(ctx) => write!(f, "{}[{:?}]", self.kind, ctx),
            Payload::FrameOf { varlist, action } => {
                write!(f, "frame![{:?} of {:?}]", varlist, action)
            }
            Payload::Action(a) => write!(f, "action![{:?}]", a),
        }
    }
}
