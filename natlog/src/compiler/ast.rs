use arcstr::ArcStr;

use super::CompileError;

/// One parsed term of the surface syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermAst {
    Atom(ArcStr),
    Int(i64),
    Var(ArcStr),
    Compound(ArcStr, Vec<TermAst>),
}

/// One line of a clause block: a flat sequence of terms.
pub type Row = Vec<TermAst>;

/// A clause block after classification: the head compound, the body goals
/// in source order, and the compile-time variable bindings collected from
/// `holds`/`cons`/`list` rows.
#[derive(Debug)]
pub struct ClauseAst {
    pub head: TermAst,
    pub goals: Vec<TermAst>,
    pub bindings: Vec<(ArcStr, TermAst)>,
}

/// The single `_` is anonymous; every occurrence is a distinct variable.
pub const ANONYMOUS: &str = "_";

/// Sorts a block's rows into the head, the body goals and the variable
/// bindings, expanding `X list …` sugar along the way.
pub fn classify(rows: Vec<Row>) -> Result<ClauseAst, CompileError> {
    let mut rows = rows.into_iter();
    let head = match rows.next() {
        Some(row) => goal_row(row)?,
        None => return Err(CompileError::EmptyClause),
    };

    let mut goals = Vec::new();
    let mut bindings = Vec::new();
    for row in rows {
        match row.first() {
            Some(TermAst::Var(_)) => expand_binding(row, &mut bindings)?,
            _ => goals.push(goal_row(row)?),
        }
    }
    Ok(ClauseAst {
        head,
        goals,
        bindings,
    })
}

/// A goal row is `functor arg …`; a lone functor is a zero-argument goal.
fn goal_row(row: Row) -> Result<TermAst, CompileError> {
    let mut row = row.into_iter();
    match row.next() {
        Some(TermAst::Atom(functor)) => Ok(TermAst::Compound(functor, row.collect())),
        _ => Err(CompileError::GoalWithoutFunctor),
    }
}

/// Turns a `Var …` row into bindings. `X holds T` aliases, `X cons H T`
/// builds one pair, and `X list e1 … en` chains pairs down to `nil`.
fn expand_binding(
    row: Row,
    bindings: &mut Vec<(ArcStr, TermAst)>,
) -> Result<(), CompileError> {
    let mut row = row.into_iter();
    let variable = match row.next() {
        Some(TermAst::Var(variable)) => variable,
        _ => return Err(CompileError::GoalWithoutFunctor),
    };
    let keyword = match row.next() {
        Some(TermAst::Atom(word)) => word,
        _ => return Err(CompileError::BadBindingRow { variable }),
    };
    let rest: Vec<TermAst> = row.collect();
    match (keyword.as_str(), rest.len()) {
        ("holds", 1) => match <[TermAst; 1]>::try_from(rest) {
            Ok([term]) => bindings.push((variable, term)),
            Err(_) => return Err(CompileError::BadBindingRow { variable }),
        },
        ("cons", 2) => {
            bindings.push((variable, cons(rest)));
        }
        ("list", 0) => {
            bindings.push((variable, TermAst::Atom(arcstr::literal!("nil"))));
        }
        ("list", _) => {
            // X holds X#0, X#0 cons e1 X#1, .., last tail nil; the `#`
            // cannot appear in a source token, so the chain is capture free
            let fresh = |i: usize| ArcStr::from(format!("{variable}#{i}"));
            bindings.push((variable.clone(), TermAst::Var(fresh(0))));
            let last = rest.len() - 1;
            for (i, element) in rest.into_iter().enumerate() {
                let tail = if i == last {
                    TermAst::Atom(arcstr::literal!("nil"))
                } else {
                    TermAst::Var(fresh(i + 1))
                };
                bindings.push((fresh(i), cons(vec![element, tail])));
            }
        }
        _ => return Err(CompileError::BadBindingRow { variable }),
    }
    Ok(())
}

fn cons(head_tail: Vec<TermAst>) -> TermAst {
    TermAst::Compound(arcstr::literal!("cons"), head_tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(name: &str) -> TermAst {
        TermAst::Atom(ArcStr::from(name))
    }

    fn var(name: &str) -> TermAst {
        TermAst::Var(ArcStr::from(name))
    }

    #[test]
    fn classifies_goals_and_bindings() {
        let clause = classify(vec![
            vec![atom("member"), var("X"), var("L")],
            vec![var("L"), atom("cons"), var("X"), var("_")],
        ])
        .unwrap();

        assert_eq!(clause.head, TermAst::Compound("member".into(), vec![var("X"), var("L")]));
        assert!(clause.goals.is_empty());
        assert_eq!(
            clause.bindings,
            vec![("L".into(), TermAst::Compound("cons".into(), vec![var("X"), var("_")]))]
        );
    }

    #[test]
    fn expands_list_sugar_to_a_cons_chain() {
        let clause = classify(vec![
            vec![atom("goal"), var("X")],
            vec![var("L"), atom("list"), TermAst::Int(1), TermAst::Int(2)],
        ])
        .unwrap();

        assert_eq!(
            clause.bindings,
            vec![
                ("L".into(), var("L#0")),
                (
                    "L#0".into(),
                    TermAst::Compound("cons".into(), vec![TermAst::Int(1), var("L#1")])
                ),
                (
                    "L#1".into(),
                    TermAst::Compound("cons".into(), vec![TermAst::Int(2), atom("nil")])
                ),
            ]
        );
    }

    #[test]
    fn empty_list_sugar_holds_nil() {
        let clause = classify(vec![
            vec![atom("goal")],
            vec![var("L"), atom("list")],
        ])
        .unwrap();
        assert_eq!(clause.bindings, vec![("L".into(), atom("nil"))]);
    }

    #[test]
    fn rejects_heads_that_are_not_goals() {
        assert!(matches!(
            classify(vec![vec![var("X"), atom("holds"), TermAst::Int(1)]]),
            Err(CompileError::GoalWithoutFunctor)
        ));
        assert!(matches!(
            classify(vec![vec![TermAst::Int(3), atom("f")]]),
            Err(CompileError::GoalWithoutFunctor)
        ));
    }

    #[test]
    fn rejects_malformed_binding_rows() {
        let bad = classify(vec![
            vec![atom("goal")],
            vec![var("X"), atom("holds"), TermAst::Int(1), TermAst::Int(2)],
        ]);
        assert!(matches!(bad, Err(CompileError::BadBindingRow { .. })));

        let bad = classify(vec![vec![atom("goal")], vec![var("X"), TermAst::Int(1)]]);
        assert!(matches!(bad, Err(CompileError::BadBindingRow { .. })));
    }
}
