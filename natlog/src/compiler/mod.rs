//! Turns parsed clause blocks into the flat cell form the machine copies
//! to its heap.

use std::collections::HashMap;

use arcstr::ArcStr;

use crate::machine::cell::{Cell, Tag, MAX_SMALL_INT};
use crate::symbols::SymbolTable;

pub mod ast;
pub mod parser;

use ast::{ClauseAst, TermAst, ANONYMOUS};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("a clause block has no lines")]
    EmptyClause,
    #[error("a goal line must start with a symbol")]
    GoalWithoutFunctor,
    #[error("variable {variable} must be followed by holds, cons or list and the right number of terms")]
    BadBindingRow { variable: ArcStr },
    #[error("variable {variable} is bound more than once")]
    RebindsVariable { variable: ArcStr },
    #[error("integer literal {value} does not fit in a cell")]
    IntegerOutOfRange { value: i64 },
    #[error("the program has no clauses")]
    EmptyProgram,
}

/// A compiled clause before relocation: cell payloads are relative to the
/// first cell, `goal_positions` point at the arity cell of the head and of
/// each body goal, and `neck` is where the body cells begin.
pub struct CompiledCells {
    pub cells: Vec<Cell>,
    pub goal_positions: Vec<usize>,
    pub neck: usize,
}

/// Variable equivalence classes and their compile-time values.
///
/// `X holds Y` merges two classes; `holds`/`cons` rows with a non-variable
/// right side give the class a value. A class has at most one value.
#[derive(Default)]
struct Classes {
    parent: HashMap<ArcStr, ArcStr>,
    values: HashMap<ArcStr, TermAst>,
}

impl Classes {
    fn root(&self, name: &ArcStr) -> ArcStr {
        let mut current = name.clone();
        while let Some(next) = self.parent.get(&current) {
            current = next.clone();
        }
        current
    }

    fn alias(&mut self, a: &ArcStr, b: &ArcStr) {
        let (ra, rb) = (self.root(a), self.root(b));
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }

    fn bind(&mut self, name: &ArcStr, value: &TermAst) -> Result<(), CompileError> {
        let root = self.root(name);
        if self.values.contains_key(&root) {
            return Err(CompileError::RebindsVariable {
                variable: name.clone(),
            });
        }
        self.values.insert(root, value.clone());
        Ok(())
    }

    fn value(&self, root: &ArcStr) -> Option<&TermAst> {
        self.values.get(root)
    }
}

/// What a term contributes to the cell slot about to be written.
enum Slot {
    Ready(Cell),
    /// An anonymous variable, always fresh
    Fresh,
    /// A free variable class: V at its first occurrence, U afterwards
    FreeVar(ArcStr),
    /// A class bound to a structure that may not be laid out yet
    StructRef(ArcStr),
}

struct Emitter<'a> {
    cells: Vec<Cell>,
    symbols: &'a mut SymbolTable,
    classes: Classes,
    first_seen: HashMap<ArcStr, usize>,
    struct_pos: HashMap<ArcStr, usize>,
    pending: Vec<(usize, ArcStr)>,
}

impl<'a> Emitter<'a> {
    fn plan(&mut self, term: &TermAst) -> Result<Slot, CompileError> {
        match term {
            TermAst::Atom(name) => Ok(Slot::Ready(Cell::symbol(self.symbols.intern(name)))),
            TermAst::Int(value) => Ok(Slot::Ready(int_cell(*value)?)),
            TermAst::Var(name) if name.as_str() == ANONYMOUS => Ok(Slot::Fresh),
            TermAst::Var(name) => {
                let root = self.classes.root(name);
                match self.classes.value(&root).cloned() {
                    None | Some(TermAst::Var(_)) => Ok(Slot::FreeVar(root)),
                    Some(TermAst::Atom(name)) => {
                        Ok(Slot::Ready(Cell::symbol(self.symbols.intern(&name))))
                    }
                    Some(TermAst::Int(value)) => Ok(Slot::Ready(int_cell(value)?)),
                    Some(TermAst::Compound(..)) => Ok(Slot::StructRef(root)),
                }
            }
            TermAst::Compound(functor, args) => {
                let at = self.compound(functor, args)?;
                Ok(Slot::Ready(Cell::structure(at)))
            }
        }
    }

    /// Lays out one compound: nested compounds first, then the arity cell,
    /// the functor and the argument slots.
    fn compound(&mut self, functor: &ArcStr, args: &[TermAst]) -> Result<usize, CompileError> {
        let slots = args
            .iter()
            .map(|arg| self.plan(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let at = self.cells.len();
        self.cells.push(Cell::arity(args.len()));
        self.cells.push(Cell::symbol(self.symbols.intern(functor)));
        for slot in slots {
            self.write_slot(slot);
        }
        Ok(at)
    }

    fn write_slot(&mut self, slot: Slot) {
        let position = self.cells.len();
        let cell = match slot {
            Slot::Ready(cell) => cell,
            Slot::Fresh => Cell::var(position),
            Slot::FreeVar(root) => match self.first_seen.get(&root) {
                Some(&first) => Cell::var_ref(first),
                None => {
                    self.first_seen.insert(root, position);
                    Cell::var(position)
                }
            },
            Slot::StructRef(root) => match self.struct_pos.get(&root) {
                Some(&at) => Cell::structure(at),
                None => {
                    // placeholder, overwritten by the patch pass
                    self.pending.push((position, root));
                    Cell::new(Tag::Bad, position as i32)
                }
            },
        };
        self.cells.push(cell);
    }
}

fn int_cell(value: i64) -> Result<Cell, CompileError> {
    if value > MAX_SMALL_INT || value < -MAX_SMALL_INT {
        return Err(CompileError::IntegerOutOfRange { value });
    }
    Ok(Cell::int(value as i32))
}

/// Compiles a classified clause into relative cells.
pub fn compile(
    clause: &ClauseAst,
    symbols: &mut SymbolTable,
) -> Result<CompiledCells, CompileError> {
    let mut classes = Classes::default();
    // aliases first so later value bindings see the final classes
    for (variable, value) in &clause.bindings {
        if let TermAst::Var(other) = value {
            if other.as_str() != ANONYMOUS {
                classes.alias(variable, other);
            }
        }
    }
    for (variable, value) in &clause.bindings {
        if !matches!(value, TermAst::Var(_)) {
            classes.bind(variable, value)?;
        }
    }

    let mut emitter = Emitter {
        cells: Vec::new(),
        symbols,
        classes,
        first_seen: HashMap::new(),
        struct_pos: HashMap::new(),
        pending: Vec::new(),
    };

    let head_at = match &clause.head {
        TermAst::Compound(functor, args) => emitter.compound(functor, args)?,
        _ => return Err(CompileError::GoalWithoutFunctor),
    };

    // every bound structure lands in the head region, so copying a fact's
    // head never leaves a reference past the neck
    for (variable, value) in &clause.bindings {
        if let TermAst::Compound(functor, args) = value {
            let root = emitter.classes.root(variable);
            if !emitter.struct_pos.contains_key(&root) {
                let at = emitter.compound(functor, args)?;
                emitter.struct_pos.insert(root, at);
            }
        }
    }

    let neck = emitter.cells.len();

    let mut goal_positions = Vec::with_capacity(1 + clause.goals.len());
    goal_positions.push(head_at);
    for goal in &clause.goals {
        match goal {
            TermAst::Compound(functor, args) => {
                goal_positions.push(emitter.compound(functor, args)?);
            }
            _ => return Err(CompileError::GoalWithoutFunctor),
        }
    }

    let Emitter {
        mut cells,
        struct_pos,
        pending,
        ..
    } = emitter;
    for (position, root) in pending {
        debug_assert!(struct_pos.contains_key(&root));
        if let Some(&at) = struct_pos.get(&root) {
            cells[position] = Cell::structure(at);
        }
    }

    Ok(CompiledCells {
        cells,
        goal_positions,
        neck,
    })
}
