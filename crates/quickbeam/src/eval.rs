//! The evaluator
//!
//! Evaluation walks an array cell by cell. Inert kinds pass through,
//! words resolve through their cached bindings, and a word that lands on
//! an action gathers the action's arguments from the cells that follow,
//! so calls read prefix-style with no delimiters around the arguments.
//!
//! Collection may only run at the top of a step. Every value that has to
//! survive across steps sits in a rooted structure by then: frame slots,
//! the lib context, or the eval root stack. Natives that allocate several
//! series before connecting them rely on the same rule, since nothing
//! inside a single step collects.

use tracing::trace;

use crate::action::{ActionHandle, Dispatcher, Param, ParamClass};
use crate::cell::{Cell, Kind};
use crate::context::{Case, ContextHandle};
use crate::engine::Engine;
use crate::error::{CoreError, Result};
use crate::frame::Frame;
use crate::heap::SeriesHandle;
use crate::symbol::Symbol;

impl Engine {
    /// Evaluate a block that is already bound, returning the value of its
    /// last expression. An empty block evaluates to an isotopic blank,
    /// the "nothing happened" signal that decays to blank.
    pub fn eval(&mut self, block: SeriesHandle) -> Result<Cell> {
        self.eval_array(block)
    }

    pub(crate) fn eval_array(&mut self, block: SeriesHandle) -> Result<Cell> {
        self.eval_array_from(block, 0)
    }

    fn eval_array_from(&mut self, block: SeriesHandle, start: usize) -> Result<Cell> {
        self.eval_roots.push(block);
        let result = self.eval_array_inner(block, start);
        self.eval_roots.pop();
        result
    }

    fn eval_array_inner(&mut self, block: SeriesHandle, start: usize) -> Result<Cell> {
        let mut index = start;
        let mut result = Cell::blank().isotopic();
        while index < self.heap.array(block)?.len() {
            result = self.eval_step(block, &mut index)?;
        }
        Ok(result)
    }

    /// One expression: consume the cell at `index` plus whatever argument
    /// cells an invoked action gathers. `index` ends up just past the
    /// consumed range.
    fn eval_step(&mut self, block: SeriesHandle, index: &mut usize) -> Result<Cell> {
        if self.config.is_interrupted() {
            return Err(CoreError::Interrupted);
        }
        self.safepoint();
        let cell = self
            .heap
            .array(block)?
            .at(*index)
            .ok_or(CoreError::OutOfRange { index: *index })?;
        *index += 1;
        if self.config.trace {
            trace!(index = *index - 1, kind = cell.kind().name(), "eval step");
        }
        self.eval_cell(cell, block, index)
    }

    fn eval_cell(&mut self, cell: Cell, block: SeriesHandle, index: &mut usize) -> Result<Cell> {
        if cell.quotes() > 0 {
            return cell.unquote();
        }
        if cell.is_quasi() {
            return Ok(cell.isotopic());
        }
        match cell.kind() {
            Kind::Blank
            | Kind::Integer
            | Kind::Rune
            | Kind::Text
            | Kind::Binary
            | Kind::Block
            | Kind::Tuple
            | Kind::Object
            | Kind::Frame => Ok(cell),

            Kind::Group => match cell.series_ref() {
                Some((series, from)) => self.eval_array_from(series, from as usize),
                None => Ok(cell),
            },

            Kind::Word => {
                let value = self.resolve_word(cell)?;
                if value.kind() == Kind::Action && value.quotes() == 0 {
                    match value.action_ref() {
                        Some(action) => self.invoke(action, cell.as_word(), block, index),
                        None => Ok(value),
                    }
                } else {
                    Ok(value)
                }
            }

            Kind::SetWord => {
                if *index >= self.heap.array(block)?.len() {
                    return Err(CoreError::MissingArgument {
                        action: self.word_name(cell),
                        param: "assignment".to_string(),
                    });
                }
                let value = self.eval_step(block, index)?;
                match cell.binding() {
                    Some(binding) => {
                        binding.context.set_var(&mut self.heap, binding.index, value)?;
                        Ok(value)
                    }
                    None => Err(CoreError::NameNotBound {
                        name: self.word_name(cell),
                    }),
                }
            }

            // Fetch without invoking; isotopes still decay.
            Kind::GetWord => self.resolve_word(cell),

            Kind::Path => self.eval_path(cell),

            Kind::Action => match cell.action_ref() {
                Some(action) => self.invoke(action, None, block, index),
                None => Ok(cell),
            },
        }
    }

    fn resolve_word(&self, cell: Cell) -> Result<Cell> {
        let binding = cell.binding().ok_or_else(|| CoreError::NameNotBound {
            name: self.word_name(cell),
        })?;
        binding.context.get_var(&self.heap, binding.index)
    }

    fn word_name(&self, cell: Cell) -> String {
        match cell.as_word() {
            Some(symbol) => self.symbols.spelling(symbol).to_string(),
            None => "unnamed".to_string(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Paths
    // ═══════════════════════════════════════════════════════════════════

    /// A path resolves its head, then picks through the remaining
    /// segments. Tuple segments flatten into successive picks, so
    /// `a.b/c` reads field `b` of `a`, then picks `c` from that. The
    /// final value is returned as-is; an action at the end of a path is
    /// fetched, not invoked.
    fn eval_path(&self, cell: Cell) -> Result<Cell> {
        let (series, start) = match cell.series_ref() {
            Some(pair) => pair,
            None => return Ok(cell),
        };
        let mut atoms: Vec<Cell> = Vec::new();
        for segment in tail_cells(self.heap.array(series)?.cells(), start) {
            match segment.series_ref() {
                Some((inner, from)) if segment.kind() == Kind::Tuple => {
                    atoms.extend(tail_cells(self.heap.array(inner)?.cells(), from));
                }
                _ => atoms.push(*segment),
            }
        }
        let mut iter = atoms.into_iter();
        let head = iter.next().ok_or(CoreError::OutOfRange {
            index: start as usize,
        })?;
        let mut current = match head.kind() {
            Kind::Word => self.resolve_word(head)?,
            _ => head,
        };
        for atom in iter {
            current = self.path_pick(current, atom)?;
        }
        Ok(current)
    }

    /// One path segment. Words must resolve, unlike `pick` where an
    /// absent key softens to blank.
    fn path_pick(&self, current: Cell, atom: Cell) -> Result<Cell> {
        if let Some(symbol) = atom.as_word() {
            let context = current.context_ref().ok_or_else(|| no_pick(current))?;
            return match context.lookup(&self.heap, symbol, Case::Insensitive)? {
                Some(index) => context.get_var(&self.heap, index),
                None => Err(CoreError::NameNotBound {
                    name: self.symbols.spelling(symbol).to_string(),
                }),
            };
        }
        self.pick_value(current, atom)
    }

    /// Position-or-key selection, shared between path evaluation and the
    /// `pick` generic. Out-of-range indexes and absent keys give blank.
    pub(crate) fn pick_value(&self, target: Cell, picker: Cell) -> Result<Cell> {
        if let Some(symbol) = picker.as_word() {
            let context = target.context_ref().ok_or_else(|| no_pick(target))?;
            return match context.lookup(&self.heap, symbol, Case::Insensitive)? {
                Some(index) => context.get_var(&self.heap, index),
                None => Ok(Cell::blank()),
            };
        }
        if let Some(n) = picker.as_int() {
            return self.pick_at(target, n);
        }
        if picker.kind() == Kind::Blank {
            return Ok(Cell::blank());
        }
        Err(CoreError::NoHandlerForType {
            verb: "pick".to_string(),
            kind: picker.kind().name().to_string(),
        })
    }

    /// One-based positional pick relative to the cell's position.
    fn pick_at(&self, target: Cell, n: i64) -> Result<Cell> {
        if n < 1 {
            return Ok(Cell::blank());
        }
        let (series, index) = match target.series_ref() {
            Some(pair) => pair,
            None => return Err(no_pick(target)),
        };
        let offset = (index as usize).checked_add((n - 1) as usize);
        match target.kind() {
            kind if kind.is_any_array() => {
                let body = self.heap.array(series)?;
                Ok(offset.and_then(|at| body.at(at)).unwrap_or_else(Cell::blank))
            }
            Kind::Text => {
                let text = self.heap.text(series)?;
                let tail = text.get(index as usize..).unwrap_or("");
                match tail.chars().nth((n - 1) as usize) {
                    Some(ch) => {
                        let mut buffer = [0u8; 4];
                        Ok(Cell::rune(ch.encode_utf8(&mut buffer)).unwrap_or_else(Cell::blank))
                    }
                    None => Ok(Cell::blank()),
                }
            }
            Kind::Binary => {
                let bytes = self.heap.bytes(series)?;
                match offset.and_then(|at| bytes.get(at)) {
                    Some(byte) => Ok(Cell::integer(*byte as i64)),
                    None => Ok(Cell::blank()),
                }
            }
            _ => Err(no_pick(target)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Invocation
    // ═══════════════════════════════════════════════════════════════════

    /// Call an action, gathering its arguments from `block` starting at
    /// `index`. The frame expires when the call returns unless something
    /// captured it along the way.
    pub(crate) fn invoke(
        &mut self,
        action: ActionHandle,
        label: Option<Symbol>,
        block: SeriesHandle,
        index: &mut usize,
    ) -> Result<Cell> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(CoreError::StackOverflow {
                depth: self.frames.len() + 1,
                max: self.config.max_call_depth,
            });
        }
        let data = self.actions.get(action);
        let params = data.params().to_vec();
        let keylist = data.keylist().clone();
        let label = label.or(data.label());
        if self.config.trace {
            trace!(action = %self.label_text(label), depth = self.frames.len(), "invoke");
        }

        let varlist = ContextHandle::make_frame(&mut self.heap, action, keylist)?;
        self.frames.push(Frame::new(varlist, action, label));
        let frame_index = self.frames.len() - 1;

        let result = self
            .fill_frame(varlist, &params, label, block, index)
            .and_then(|()| self.run_dispatch_chain(frame_index));

        let captured = self.frames.pop().map(|f| f.is_captured()).unwrap_or(false);
        if !captured {
            let archetype = Cell::frame(varlist, action);
            let label_text = label.map(|s| self.symbols.spelling(s));
            self.heap
                .expire_frame(varlist.varlist(), archetype, label_text)?;
        }
        result
    }

    /// Run a captured frame again. The varlist must belong to a frame
    /// that was kept alive past its original call.
    pub fn run_frame(&mut self, varlist: ContextHandle) -> Result<Cell> {
        let archetype = varlist.archetype(&self.heap)?;
        let action = archetype.action_ref().ok_or(CoreError::SeriesTypeMismatch {
            expected: "frame varlist",
        })?;
        if self.frames.len() >= self.config.max_call_depth {
            return Err(CoreError::StackOverflow {
                depth: self.frames.len() + 1,
                max: self.config.max_call_depth,
            });
        }
        let label = self.actions.get(action).label();
        let mut frame = Frame::new(varlist, action, label);
        frame.capture();
        self.frames.push(frame);
        let frame_index = self.frames.len() - 1;
        let result = self.run_dispatch_chain(frame_index);
        self.frames.pop();
        result
    }

    /// Evaluate (or take literally) one argument per parameter and store
    /// it in the frame. Arguments land lifted: an isotope argument stays
    /// an isotope in its slot.
    fn fill_frame(
        &mut self,
        varlist: ContextHandle,
        params: &[Param],
        label: Option<Symbol>,
        block: SeriesHandle,
        index: &mut usize,
    ) -> Result<()> {
        for (slot, param) in params.iter().enumerate() {
            let arg = match param.class {
                ParamClass::Normal => {
                    if *index >= self.heap.array(block)?.len() {
                        return Err(self.missing_argument(label, param));
                    }
                    self.eval_step(block, index)?
                }
                ParamClass::Literal => {
                    let cell = self
                        .heap
                        .array(block)?
                        .at(*index)
                        .ok_or_else(|| self.missing_argument(label, param))?;
                    *index += 1;
                    cell
                }
            };
            if let Some(constraint) = param.constraint {
                let kind = arg.decay().kind();
                if !constraint.contains(kind) {
                    return Err(CoreError::ArgumentTypeMismatch {
                        action: self.label_text(label),
                        param: self.symbols.spelling(param.name).to_string(),
                        expected: constraint.to_string(),
                        got: kind.name().to_string(),
                    });
                }
            }
            varlist.set_var(&mut self.heap, slot as u32, arg)?;
        }
        Ok(())
    }

    fn missing_argument(&self, label: Option<Symbol>, param: &Param) -> CoreError {
        CoreError::MissingArgument {
            action: self.label_text(label),
            param: self.symbols.spelling(param.name).to_string(),
        }
    }

    /// Run the frame's dispatcher, following phase pointers: a composed
    /// action's prelude runs first in the shared frame, its result is
    /// discarded, and control falls through to the next phase without
    /// re-gathering arguments. The last phase's result is the call's.
    fn run_dispatch_chain(&mut self, frame_index: usize) -> Result<Cell> {
        loop {
            let frame = self.frames[frame_index];
            let varlist = frame.varlist();
            let phase = frame.phase();
            let dispatcher = self.actions.get(phase).dispatcher().clone();

            let result = match dispatcher {
                Dispatcher::Native(func) => (*func)(self, varlist)?,
                Dispatcher::Generic(verb) => {
                    let first = varlist.get_var(&self.heap, 0)?;
                    let handler = self
                        .dispatch
                        .find(verb, first.kind())
                        .cloned()
                        .ok_or_else(|| CoreError::NoHandlerForType {
                            verb: self.symbols.spelling(verb).to_string(),
                            kind: first.kind().name().to_string(),
                        })?;
                    (*handler)(self, varlist)?
                }
                Dispatcher::Body(body) => {
                    let copy = self.heap.copy_array_deep(body)?;
                    varlist.bind_existing(&mut self.heap, copy)?;
                    self.eval_array(copy)?
                }
            };

            match self.actions.get(phase).phase() {
                Some(next) => self.frames[frame_index].advance_phase(next),
                None => return Ok(result),
            }
        }
    }
}

fn no_pick(target: Cell) -> CoreError {
    CoreError::NoHandlerForType {
        verb: "pick".to_string(),
        kind: target.kind().name().to_string(),
    }
}

fn tail_cells(cells: &[Cell], from: u32) -> &[Cell] {
    cells.get(from as usize..).unwrap_or(&[])
}
