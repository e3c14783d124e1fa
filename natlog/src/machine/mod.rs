//! The abstract machine: clause database, heap, trail, unifier and the
//! spine-driven resolution loop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use arcstr::ArcStr;

use crate::compiler::{self, ast, parser, CompileError, CompiledCells};
use crate::symbols::{Sym, SymbolTable};
use crate::term::Term;

pub mod cell;
pub mod heap;
pub mod index;
pub mod spine;

use cell::{Cell, Tag};
use heap::{Heap, OutOfMemory};
use index::{cell_key, quick_match, ClauseIndex, Key, MAXIND};
use spine::{Goals, Spine};

/// A clause compiled into the database region of the heap.
#[derive(Clone)]
pub struct Clause {
    /// Heap offset of the clause's first cell
    pub base: usize,
    /// Number of cells
    pub len: usize,
    /// Offset relative to `base` where the body cells begin; equals `len`
    /// for facts
    pub neck: usize,
    /// Absolute references to the head and to each body goal
    pub hgs: Vec<Cell>,
    /// Index keys of the head: predicate symbol, then leading arguments
    pub xs: [Key; MAXIND],
}

/// A fatal machine error. Logical failure is never an error; it is handled
/// by unwinding and trying the next alternative.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
    #[error("malformed cell {0:?} reached term export")]
    BadCell(Cell),
}

/// Errors surfaced while loading a program.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] parser::ParseErrorReport),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// An answer produced by `yield`: the caller exports the query head and
/// unwinds the trail to `ttop` to force the search onwards.
struct Answer {
    ttop: usize,
}

enum Step {
    Answer(Answer),
    Child(Spine),
}

/// One interpreter instance: owns every runtime area and produces the
/// stream of answers to the query clause.
pub struct Engine {
    symbols: SymbolTable,
    heap: Heap,
    trail: Vec<usize>,
    ustack: Vec<(Cell, Cell)>,
    spines: Vec<Spine>,
    clauses: Vec<Clause>,
    all_clauses: Rc<[usize]>,
    index: Option<ClauseIndex>,
    /// The relocated query head, captured when the root spine is built
    query: Option<Cell>,
}

impl Engine {
    /// Loads a `.nl` program file. The last clause is the query.
    pub fn load(path: PathBuf) -> Result<Self, LoadError> {
        Self::build(parser::parse_file(path)?)
    }

    /// Loads a program from text; `id` names the source in error reports.
    pub fn from_source(id: &str, source: &str) -> Result<Self, LoadError> {
        Self::build(parser::parse_source(ArcStr::from(id), source)?)
    }

    fn build(blocks: Vec<Vec<ast::Row>>) -> Result<Self, LoadError> {
        let mut engine = Self::empty();
        for block in blocks {
            let clause = ast::classify(block)?;
            let compiled = compiler::compile(&clause, &mut engine.symbols)?;
            engine.put_clause(compiled)?;
        }
        if engine.clauses.is_empty() {
            return Err(CompileError::EmptyProgram.into());
        }
        engine.all_clauses = (0..engine.clauses.len()).collect();
        engine.index = ClauseIndex::build(&engine.clauses);
        log::debug!(
            "loaded {} clauses, {} heap cells, indexing {}",
            engine.clauses.len(),
            engine.heap.size(),
            if engine.index.is_some() { "on" } else { "off" },
        );
        Ok(engine)
    }

    fn empty() -> Self {
        Self {
            symbols: SymbolTable::new(),
            heap: Heap::new(),
            trail: Vec::new(),
            ustack: Vec::new(),
            spines: Vec::new(),
            clauses: Vec::new(),
            all_clauses: Rc::from(Vec::new()),
            index: None,
            query: None,
        }
    }

    /// Relocates a compiled clause onto the end of the database region.
    fn put_clause(&mut self, compiled: CompiledCells) -> Result<(), EngineError> {
        let base = self.heap.size();
        self.heap.ensure(compiled.cells.len())?;
        for cell in &compiled.cells {
            self.heap.push(cell.relocate(base));
        }
        let hgs: Vec<Cell> = compiled
            .goal_positions
            .iter()
            .map(|&position| Cell::structure(position + base))
            .collect();
        let xs = self.goal_keys(hgs[0]);
        self.clauses.push(Clause {
            base,
            len: compiled.cells.len(),
            neck: compiled.neck,
            hgs,
            xs,
        });
        Ok(())
    }

    /// Dereferenced index keys of a goal's predicate symbol and leading
    /// arguments, computed once per goal.
    fn goal_keys(&self, goal: Cell) -> [Key; MAXIND] {
        let at = goal.index();
        let count = (self.heap.get(at).payload() as usize).min(MAXIND);
        let mut keys = [Key::NONE; MAXIND];
        for (i, key) in keys.iter_mut().enumerate().take(count) {
            let cell = self.heap.deref(self.heap.get(at + 1 + i));
            *key = cell_key(&self.heap, cell);
        }
        keys
    }

    fn candidates(&self, keys: &[Key; MAXIND]) -> Rc<[usize]> {
        match &self.index {
            Some(index) => index
                .candidates(keys)
                .unwrap_or_else(|| Rc::clone(&self.all_clauses)),
            None => Rc::clone(&self.all_clauses),
        }
    }

    /// Builds the root spine: a copy of the query clause whose head is the
    /// one goal to prove, with the query clause as its only candidate.
    fn init(&mut self) -> Result<(), EngineError> {
        let number = self.clauses.len() - 1;
        let (base, len) = (self.clauses[number].base, self.clauses[number].len);
        let heap_mark = self.heap.size();
        let offset = heap_mark - base;
        self.heap.ensure(len)?;
        for at in base..base + len {
            let cell = self.heap.get(at);
            self.heap.push(cell.relocate(offset));
        }
        let head = self.clauses[number].hgs[0].relocate(offset);
        self.query = Some(head);
        self.spines.push(Spine {
            hd: head,
            base: heap_mark,
            gs: Goals::single(head),
            ttop: self.trail.len(),
            k: 0,
            cs: Rc::from(vec![number]),
            xs: [Key::NONE; MAXIND],
        });
        Ok(())
    }

    /// Copies and relocates a clause's head region, returning the copied
    /// head reference.
    fn push_head(&mut self, number: usize, offset: usize) -> Result<Cell, EngineError> {
        let (base, neck) = (self.clauses[number].base, self.clauses[number].neck);
        self.heap.ensure(neck)?;
        for at in base..base + neck {
            let cell = self.heap.get(at);
            self.heap.push(cell.relocate(offset));
        }
        Ok(self.clauses[number].hgs[0].relocate(offset))
    }

    /// Copies and relocates a clause's body region, returning references to
    /// the copied head and body goals.
    fn push_body(&mut self, number: usize, offset: usize, head: Cell) -> Result<Vec<Cell>, EngineError> {
        let (base, neck, len) = (
            self.clauses[number].base,
            self.clauses[number].neck,
            self.clauses[number].len,
        );
        self.heap.ensure(len - neck)?;
        for at in base + neck..base + len {
            let cell = self.heap.get(at);
            self.heap.push(cell.relocate(offset));
        }
        let clause = &self.clauses[number];
        let mut refs = Vec::with_capacity(clause.hgs.len());
        refs.push(head);
        refs.extend(clause.hgs.iter().skip(1).map(|&goal| goal.relocate(offset)));
        Ok(refs)
    }

    /// Binds the variable cell at `variable` to `value`, trailing the write
    /// when the address is old enough to survive the failure truncate.
    fn bind(&mut self, variable: Cell, value: Cell, base: usize) {
        let at = variable.index();
        self.heap.set(at, value);
        if at < base {
            self.trail.push(at);
        }
    }

    /// Drains pairs off the unification stack. `base` is the heap size
    /// saved before the candidate copy: bindings below it are trailed,
    /// bindings above it will be freed by the truncate on failure.
    ///
    /// On failure the caller unwinds the trail and resets the heap; no
    /// cleanup happens here.
    fn unify(&mut self, base: usize) -> bool {
        while let Some((x1, x2)) = self.ustack.pop() {
            let w1 = self.heap.deref(x1);
            let w2 = self.heap.deref(x2);
            if w1 == w2 {
                continue;
            }
            match (w1.is_var(), w2.is_var()) {
                (true, true) => {
                    // the younger variable is bound to the older one
                    if w1.index() < w2.index() {
                        self.bind(w2, w1, base);
                    } else {
                        self.bind(w1, w2, base);
                    }
                }
                (true, false) => self.bind(w1, w2, base),
                (false, true) => self.bind(w2, w1, base),
                (false, false) => {
                    if w1.tag() != Tag::Struct || w2.tag() != Tag::Struct {
                        return false;
                    }
                    if !self.unify_args(w1.index(), w2.index()) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Matches two compounds whose arity cells sit at `a1` and `a2`: equal
    /// arity, equal functor, then the argument pairs go on the stack.
    fn unify_args(&mut self, a1: usize, a2: usize) -> bool {
        let arity = self.heap.get(a1);
        if arity != self.heap.get(a2) {
            return false;
        }
        if self.heap.get(a1 + 1) != self.heap.get(a2 + 1) {
            return false;
        }
        let count = arity.payload() as usize;
        // reversed so the leftmost pair is popped and unified first
        for i in (2..=count).rev() {
            let u1 = self.heap.get(a1 + i);
            let u2 = self.heap.get(a2 + i);
            if u1 != u2 {
                self.ustack.push((u1, u2));
            }
        }
        true
    }

    fn unwind_trail(&mut self, mark: usize) {
        for at in self.trail.drain(mark..) {
            self.heap.set(at, Cell::var(at));
        }
    }

    /// Removes the top spine and restores the heap and trail to their
    /// state at its creation.
    fn pop_spine(&mut self) {
        if let Some(spine) = self.spines.pop() {
            log::trace!("spine for {:?} exhausted", spine.hd);
            self.unwind_trail(spine.ttop);
            self.heap.truncate(spine.base);
        }
    }

    /// Tries the top spine's remaining candidates against its first goal.
    /// Returns the child spine of the first success, the answer if the
    /// success left no goals, or `None` when the candidates are exhausted.
    fn unfold(&mut self) -> Result<Option<Step>, EngineError> {
        let trail_mark = self.trail.len();
        let heap_mark = self.heap.size();

        let (goal, rest, cs, xs, mut k) = match self.spines.last() {
            Some(spine) => match spine.gs.head() {
                Some(goal) => (
                    goal,
                    spine.gs.tail(),
                    Rc::clone(&spine.cs),
                    spine.xs,
                    spine.k,
                ),
                None => return Ok(None),
            },
            None => return Ok(None),
        };

        while k < cs.len() {
            let number = cs[k];
            k += 1;
            if !quick_match(&xs, &self.clauses[number].xs) {
                continue;
            }
            log::trace!("goal {goal:?} tries clause {number}");
            let offset = heap_mark - self.clauses[number].base;
            let head = self.push_head(number, offset)?;
            self.ustack.clear();
            self.ustack.push((head, goal));
            if !self.unify(heap_mark) {
                self.unwind_trail(trail_mark);
                self.heap.truncate(heap_mark);
                continue;
            }
            let goal_refs = self.push_body(number, offset, head)?;
            if let Some(spine) = self.spines.last_mut() {
                spine.k = k;
            }
            let new_gs = Goals::prepended(&goal_refs[1..], rest.clone());
            return Ok(Some(match new_gs.head() {
                None => Step::Answer(Answer { ttop: trail_mark }),
                Some(hd) => {
                    let xs = self.goal_keys(hd);
                    let cs = self.candidates(&xs);
                    Step::Child(Spine {
                        hd,
                        base: heap_mark,
                        gs: new_gs,
                        ttop: trail_mark,
                        k: 0,
                        cs,
                        xs,
                    })
                }
            }));
        }
        if let Some(spine) = self.spines.last_mut() {
            spine.k = k;
        }
        Ok(None)
    }

    /// Runs resolution steps until the next answer, or until the spine
    /// stack empties.
    fn step_to_answer(&mut self) -> Result<Option<Answer>, EngineError> {
        loop {
            let exhausted = match self.spines.last() {
                None => return Ok(None),
                Some(spine) => spine.k >= spine.cs.len(),
            };
            if exhausted {
                self.pop_spine();
                continue;
            }
            match self.unfold()? {
                None => self.pop_spine(),
                Some(Step::Answer(answer)) => return Ok(Some(answer)),
                Some(Step::Child(child)) => self.spines.push(child),
            }
        }
    }

    /// Produces the next answer as an exported term, unwinding the trail so
    /// the search can be resumed, or `None` once the query is exhausted.
    pub fn ask(&mut self) -> Result<Option<Term>, EngineError> {
        if self.query.is_none() {
            self.init()?;
        }
        match self.step_to_answer()? {
            None => Ok(None),
            Some(Answer { ttop }) => {
                let term = match self.query {
                    Some(head) => self.export_term(head)?,
                    None => return Ok(None),
                };
                log::trace!("answer {term}");
                self.unwind_trail(ttop);
                Ok(Some(term))
            }
        }
    }

    /// Drives the search to exhaustion and collects every answer.
    pub fn run(&mut self) -> Result<Vec<Term>, EngineError> {
        let mut answers = Vec::new();
        while let Some(term) = self.ask()? {
            answers.push(term);
        }
        Ok(answers)
    }

    /// Iterator over the remaining answers.
    pub fn answers(&mut self) -> Answers<'_> {
        Answers(self)
    }

    /// Materialises a heap cell as a tree for display and testing. Shared
    /// structures are exported once; a cyclic structure becomes a back
    /// reference instead of hanging.
    pub fn export_term(&self, cell: Cell) -> Result<Term, EngineError> {
        let mut memo = HashMap::new();
        self.export_cell(cell, &mut memo)
    }

    fn export_cell(
        &self,
        cell: Cell,
        memo: &mut HashMap<usize, Term>,
    ) -> Result<Term, EngineError> {
        let cell = self.heap.deref(cell);
        match cell.tag() {
            Tag::Var => Ok(Term::Var(format!("_{}", cell.index()))),
            Tag::Int => Ok(Term::Int(i64::from(cell.payload()))),
            Tag::Sym => self
                .symbols
                .resolve(Sym::from_payload(cell.payload()))
                .map(|name| Term::Atom(name.clone()))
                .ok_or(EngineError::BadCell(cell)),
            Tag::Struct => {
                let at = cell.index();
                if let Some(term) = memo.get(&at) {
                    return Ok(term.clone());
                }
                memo.insert(at, Term::Var(format!("_{at}")));
                let count = self.heap.get(at).payload() as usize;
                let items = (1..=count)
                    .map(|i| self.export_cell(self.heap.get(at + i), memo))
                    .collect::<Result<Vec<_>, _>>()?;
                let term = Term::Seq(items);
                memo.insert(at, term.clone());
                Ok(term)
            }
            Tag::Bound | Tag::Arity | Tag::Bad => Err(EngineError::BadCell(cell)),
        }
    }

    /// Current number of live heap cells. Diagnostic; the property tests
    /// use it to check that backtracking reclaims everything.
    pub fn heap_size(&self) -> usize {
        self.heap.size()
    }

    /// Whether argument indexing was built for this database.
    pub fn indexing_active(&self) -> bool {
        self.index.is_some()
    }
}

/// Iterator adapter over [`Engine::ask`].
pub struct Answers<'a>(&'a mut Engine);

impl Iterator for Answers<'_> {
    type Item = Result<Term, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.ask().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(source: &str) -> Engine {
        Engine::from_source("<test>", source).expect("program loads")
    }

    fn displayed(engine: &mut Engine) -> Vec<String> {
        engine
            .run()
            .expect("query runs")
            .iter()
            .map(Term::to_string)
            .collect()
    }

    #[test]
    fn unify_binds_the_younger_variable_and_trails_old_addresses() {
        let mut e = Engine::empty();
        e.heap.push(Cell::var(0));
        e.heap.push(Cell::var(1));
        // both variables predate the base, so both would be trailed
        e.ustack.push((Cell::var_ref(0), Cell::var_ref(1)));
        assert!(e.unify(2));
        assert_eq!(e.heap.get(1), Cell::var(0));
        assert_eq!(e.trail, vec![1]);

        // binding above the base is not trailed
        e.heap.push(Cell::var(2));
        e.ustack.push((Cell::var_ref(2), Cell::int(7)));
        assert!(e.unify(2));
        assert_eq!(e.heap.get(2), Cell::int(7));
        assert_eq!(e.trail, vec![1]);
    }

    #[test]
    fn unify_compares_constants_by_payload() {
        let mut e = Engine::empty();
        e.ustack.push((Cell::int(3), Cell::int(3)));
        assert!(e.unify(0));
        e.ustack.push((Cell::int(3), Cell::int(4)));
        assert!(!e.unify(0));
        let sym = Cell::symbol(e.symbols.intern("a"));
        e.ustack.clear();
        e.ustack.push((sym, Cell::int(3)));
        assert!(!e.unify(0));
    }

    #[test]
    fn unify_args_requires_matching_arity_and_functor() {
        let mut e = Engine::empty();
        let f = e.symbols.intern("f");
        let g = e.symbols.intern("g");
        // f(1) and g(1)
        e.heap.push(Cell::arity(1));
        e.heap.push(Cell::symbol(f));
        e.heap.push(Cell::int(1));
        e.heap.push(Cell::arity(1));
        e.heap.push(Cell::symbol(g));
        e.heap.push(Cell::int(1));
        e.ustack.push((Cell::structure(0), Cell::structure(3)));
        assert!(!e.unify(6));

        // f(1) and f(X)
        e.heap.push(Cell::arity(1));
        e.heap.push(Cell::symbol(f));
        e.heap.push(Cell::var(8));
        e.ustack.clear();
        e.ustack.push((Cell::structure(0), Cell::structure(6)));
        assert!(e.unify(9));
        assert_eq!(e.heap.deref(Cell::var_ref(8)), Cell::int(1));
    }

    #[test]
    fn failed_queries_restore_the_heap_and_trail() {
        let mut e = engine("p 1\n\ngoal X\np X\nq X\n");
        let loaded = e.heap_size();
        assert_eq!(displayed(&mut e), Vec::<String>::new());
        assert_eq!(e.heap_size(), loaded);
        assert!(e.trail.is_empty());
        assert!(e.spines.is_empty());
    }

    #[test]
    fn exhausted_engines_stay_exhausted() {
        let mut e = engine("goal X\nX holds 42\n");
        assert_eq!(displayed(&mut e), vec!["goal(42)"]);
        assert_eq!(e.ask().expect("resumable"), None);
        assert_eq!(e.ask().expect("resumable"), None);
    }

    #[test]
    fn shared_structures_export_once() {
        let mut e = engine("goal X Y\nX cons 1 nil\nY holds X\n");
        let answers = e.run().expect("query runs");
        assert_eq!(answers.len(), 1);
        match &answers[0] {
            Term::Seq(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[1], items[2]);
            }
            other => panic!("expected a compound answer, got {other}"),
        }
    }

    #[test]
    fn compiled_heads_export_back_to_their_source_shape() {
        let e = engine("member X L\n  L cons X _\n\ngoal X\n  member X L\n");
        let head = e.clauses[0].hgs[0];
        let shown = e.export_term(head).expect("head exports").to_string();
        // member(X, cons(X, _)) up to variable renaming
        assert!(shown.starts_with("member(_"));
        assert!(shown.contains(" | _"));
    }

    #[test]
    fn only_real_tags_reach_the_heap() {
        let e = engine("member X L\n  L cons X _\n\ngoal X\n  L list 1 2 3\n  member X L\n");
        for at in 0..e.heap.size() {
            assert_ne!(e.heap.get(at).tag(), Tag::Bad);
        }
    }

    #[test]
    fn unbound_query_variables_export_as_fresh_names() {
        let mut e = engine("goal X\n");
        let answers = displayed(&mut e);
        assert_eq!(answers.len(), 1);
        assert!(answers[0].starts_with("goal(_"));
    }
}
