use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use super::cell::{Cell, Tag};
use super::heap::Heap;
use super::Clause;

/// Number of indexed positions per clause head: the predicate symbol
/// itself, then its leading arguments.
pub const MAXIND: usize = 3;

/// Indexing stays off for databases smaller than this.
pub const START_INDEX: usize = 20;

/// An argument-position index key. Zero means "not indexable here":
/// a variable, or a position past the head's arity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
#[repr(transparent)]
pub struct Key(i32);

impl Key {
    pub const NONE: Key = Key(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// The key of a dereferenced cell. Constants and integers key on their own
/// cell value; a compound keys on its arity cell, which is collision
/// tolerant but never produces a false negative; variables have no key.
pub fn cell_key(heap: &Heap, cell: Cell) -> Key {
    match cell.tag() {
        Tag::Sym | Tag::Int => Key(cell.raw()),
        Tag::Struct => Key(heap.get(cell.index()).raw()),
        _ => Key::NONE,
    }
}

/// Quick rejection between a goal's keys and a clause head's keys: a
/// position rejects only when both sides carry a key and they differ.
pub fn quick_match(xs: &[Key; MAXIND], ys: &[Key; MAXIND]) -> bool {
    xs.iter()
        .zip(ys)
        .all(|(x, y)| x.is_none() || y.is_none() || x == y)
}

/// Per-position candidate maps, built once after load and immutable
/// afterwards.
pub struct ClauseIndex {
    /// key -> clauses whose head carries that key at this position
    imaps: Vec<HashMap<Key, BTreeSet<usize>>>,
    /// clauses whose head has a variable (or nothing) at this position
    vmaps: Vec<BTreeSet<usize>>,
}

impl ClauseIndex {
    /// Builds the index, or `None` when the database is too small for
    /// indexing to pay off.
    pub fn build(clauses: &[Clause]) -> Option<Self> {
        if clauses.len() < START_INDEX {
            return None;
        }
        let mut imaps: Vec<HashMap<Key, BTreeSet<usize>>> = vec![HashMap::new(); MAXIND];
        let mut vmaps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); MAXIND];
        for (number, clause) in clauses.iter().enumerate() {
            for position in 0..MAXIND {
                let key = clause.xs[position];
                if key.is_none() {
                    vmaps[position].insert(number);
                } else {
                    imaps[position].entry(key).or_default().insert(number);
                }
            }
        }
        Some(Self { imaps, vmaps })
    }

    /// Candidate clauses for a goal with keys `xs`: the intersection over
    /// keyed positions of the clauses matching that key plus the clauses
    /// with a variable there. `None` when every position is unkeyed, in
    /// which case the caller falls back to all clauses.
    pub fn candidates(&self, xs: &[Key; MAXIND]) -> Option<Rc<[usize]>> {
        let mut result: Option<BTreeSet<usize>> = None;
        for (position, &key) in xs.iter().enumerate() {
            if key.is_none() {
                continue;
            }
            let mut matching = self.vmaps[position].clone();
            if let Some(keyed) = self.imaps[position].get(&key) {
                matching.extend(keyed);
            }
            result = Some(match result {
                None => matching,
                Some(sofar) => sofar.intersection(&matching).copied().collect(),
            });
        }
        result.map(|set| set.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(xs: [Key; MAXIND]) -> Clause {
        Clause {
            base: 0,
            len: 0,
            neck: 0,
            hgs: Vec::new(),
            xs,
        }
    }

    #[test]
    fn keys_distinguish_constants_but_not_variables() {
        let mut heap = Heap::new();
        heap.push(Cell::var(0));
        let sym = Cell::new(Tag::Sym, 4);
        assert_eq!(cell_key(&heap, Cell::var(0)), Key::NONE);
        assert_eq!(cell_key(&heap, sym), cell_key(&heap, sym));
        assert_ne!(cell_key(&heap, sym), cell_key(&heap, Cell::int(4)));
        assert_ne!(cell_key(&heap, Cell::int(1)), cell_key(&heap, Cell::int(2)));
    }

    #[test]
    fn compound_keys_come_from_the_arity_cell() {
        let mut heap = Heap::new();
        heap.push(Cell::arity(2));
        heap.push(Cell::new(Tag::Sym, 9));
        heap.push(Cell::int(1));
        heap.push(Cell::int(2));
        heap.push(Cell::arity(1));
        heap.push(Cell::new(Tag::Sym, 9));
        heap.push(Cell::int(1));

        let two = cell_key(&heap, Cell::structure(0));
        let one = cell_key(&heap, Cell::structure(4));
        assert!(!two.is_none());
        assert_ne!(two, one);
    }

    #[test]
    fn quick_match_rejects_only_conflicting_keys() {
        let k1 = Key(-11);
        let k2 = Key(-19);
        assert!(quick_match(&[Key::NONE; MAXIND], &[k1, k2, Key::NONE]));
        assert!(quick_match(&[k1, Key::NONE, Key::NONE], &[k1, k2, Key::NONE]));
        assert!(!quick_match(&[k2, Key::NONE, Key::NONE], &[k1, k2, Key::NONE]));
    }

    #[test]
    fn candidates_intersect_across_positions() {
        let p = Key(-11);
        let q = Key(-19);
        let clauses: Vec<Clause> = (0..START_INDEX)
            .map(|n| {
                if n < 3 {
                    keyed([p, if n == 0 { q } else { Key::NONE }, Key::NONE])
                } else {
                    keyed([q, Key::NONE, Key::NONE])
                }
            })
            .collect();
        let index = ClauseIndex::build(&clauses).expect("database is large enough");

        // keyed on the predicate only
        let cs = index.candidates(&[p, Key::NONE, Key::NONE]).unwrap();
        assert_eq!(cs.as_ref(), &[0, 1, 2]);

        // second position narrows to the matching clause plus variables
        let cs = index.candidates(&[p, q, Key::NONE]).unwrap();
        assert_eq!(cs.as_ref(), &[0, 1, 2]);

        let cs = index.candidates(&[p, Key(-27), Key::NONE]).unwrap();
        assert_eq!(cs.as_ref(), &[1, 2]);

        // nothing keyed falls back to the caller
        assert!(index.candidates(&[Key::NONE; MAXIND]).is_none());
    }

    #[test]
    fn small_databases_are_not_indexed() {
        let clauses = vec![keyed([Key::NONE; MAXIND]); START_INDEX - 1];
        assert!(ClauseIndex::build(&clauses).is_none());
    }
}
