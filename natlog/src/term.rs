use core::fmt;

use arcstr::ArcStr;

/// An answer term materialised off the heap: a symbol, an integer, an
/// unbound variable, or a sequence holding a functor and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Atom(ArcStr),
    Int(i64),
    Var(String),
    Seq(Vec<Term>),
}

const NIL: &str = "nil";
const CONS: &str = "cons";

impl Term {
    /// Views a `cons` pair as head and tail.
    fn as_cons(&self) -> Option<(&Term, &Term)> {
        match self {
            Term::Seq(items) => match items.as_slice() {
                [Term::Atom(functor), head, tail] if functor.as_str() == CONS => {
                    Some((head, tail))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn is_nil(&self) -> bool {
        matches!(self, Term::Atom(name) if name.as_str() == NIL)
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Term]) -> fmt::Result {
    let mut first = true;
    for arg in args {
        if !first {
            f.write_str(", ")?;
        }
        first = false;
        write!(f, "{arg}")?;
    }
    Ok(())
}

fn write_list(f: &mut fmt::Formatter<'_>, head: &Term, tail: &Term) -> fmt::Result {
    write!(f, "[{head}")?;
    let mut rest = tail;
    loop {
        if rest.is_nil() {
            return f.write_str("]");
        }
        match rest.as_cons() {
            Some((head, tail)) => {
                write!(f, ", {head}")?;
                rest = tail;
            }
            None => return write!(f, " | {rest}]"),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((head, tail)) = self.as_cons() {
            return write_list(f, head, tail);
        }
        match self {
            Term::Atom(name) if name.as_str() == NIL => f.write_str("[]"),
            Term::Atom(name) => f.write_str(name),
            Term::Int(value) => write!(f, "{value}"),
            Term::Var(name) => f.write_str(name),
            Term::Seq(items) => match items.split_first() {
                None => f.write_str("()"),
                Some((functor, [])) => write!(f, "{functor}"),
                Some((functor, args)) => {
                    write!(f, "{functor}(")?;
                    write_args(f, args)?;
                    f.write_str(")")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(name: &str) -> Term {
        Term::Atom(ArcStr::from(name))
    }

    fn cons(head: Term, tail: Term) -> Term {
        Term::Seq(vec![atom("cons"), head, tail])
    }

    #[test]
    fn compounds_display_with_argument_lists() {
        let term = Term::Seq(vec![atom("goal"), Term::Int(42), Term::Var("_3".into())]);
        assert_eq!(term.to_string(), "goal(42, _3)");
        assert_eq!(Term::Seq(vec![atom("main")]).to_string(), "main");
    }

    #[test]
    fn proper_lists_display_bracketed() {
        let list = cons(Term::Int(1), cons(Term::Int(2), atom("nil")));
        assert_eq!(list.to_string(), "[1, 2]");
        assert_eq!(atom("nil").to_string(), "[]");
    }

    #[test]
    fn improper_tails_display_with_a_bar() {
        let list = cons(Term::Int(1), Term::Var("_9".into()));
        assert_eq!(list.to_string(), "[1 | _9]");
    }

    #[test]
    fn nested_terms_display_recursively() {
        let inner = cons(Term::Int(7), atom("nil"));
        let term = Term::Seq(vec![atom("pair"), inner.clone(), atom("x")]);
        assert_eq!(term.to_string(), "pair([7], x)");
    }
}
