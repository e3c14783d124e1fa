use std::rc::Rc;

use super::cell::Cell;
use super::index::{Key, MAXIND};

/// An immutable cons list of goal references.
///
/// Prepending a clause body in front of a parent's remaining goals shares
/// the tail across alternatives instead of copying it.
#[derive(Clone, Default)]
pub struct Goals(Option<Rc<Node>>);

struct Node {
    head: Cell,
    tail: Goals,
}

impl Goals {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn single(goal: Cell) -> Self {
        Self::empty().cons(goal)
    }

    pub fn cons(&self, goal: Cell) -> Self {
        Self(Some(Rc::new(Node {
            head: goal,
            tail: self.clone(),
        })))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn head(&self) -> Option<Cell> {
        self.0.as_ref().map(|node| node.head)
    }

    pub fn tail(&self) -> Goals {
        match &self.0 {
            Some(node) => node.tail.clone(),
            None => Self::empty(),
        }
    }

    /// `goals` in order, followed by `tail`.
    pub fn prepended(goals: &[Cell], tail: Goals) -> Self {
        goals.iter().rev().fold(tail, |rest, &goal| rest.cons(goal))
    }
}

/// One frame of the resolution search: a choice point over candidate
/// clauses together with the list of goals still to prove.
pub struct Spine {
    /// The goal cell this spine was created to prove
    pub hd: Cell,
    /// Heap size before this spine's clause instance was pushed; popping
    /// the spine truncates back to it
    pub base: usize,
    /// Remaining goals, first to be tried at the front
    pub gs: Goals,
    /// Trail size at creation, the unwind watermark for popping
    pub ttop: usize,
    /// Cursor into `cs`, advanced as alternatives are consumed
    pub k: usize,
    /// Ordered candidate clause numbers, shared with the index
    pub cs: Rc<[usize]>,
    /// Dereferenced index keys of `hd`, for the quick match test
    pub xs: [Key; MAXIND],
}
