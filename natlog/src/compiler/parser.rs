use std::{fmt, path::PathBuf};

use arcstr::ArcStr;
use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::prelude::*;

use super::ast::{Row, TermAst};

type ParseError = Simple<char>;

/// Syntax errors for one source, rendered as ariadne reports on display.
#[derive(Debug)]
pub enum ParseErrorReport {
    FailedToOpenFile {
        path: PathBuf,
        error: std::io::Error,
    },
    ParseError {
        id: ArcStr,
        source: String,
        errors: Vec<ParseError>,
    },
}

impl ParseErrorReport {
    fn describe(error: &ParseError) -> String {
        if let chumsky::error::SimpleReason::Custom(message) = error.reason() {
            return message.clone();
        }
        let found = match error.found() {
            Some(token) => format!("unexpected token {token:?}"),
            None => "unexpected end of input".to_string(),
        };
        let context = error
            .label()
            .map(|label| format!(" while parsing {label}"))
            .unwrap_or_default();
        let expected = if error.expected().len() == 0 {
            "something else".to_string()
        } else {
            error
                .expected()
                .map(|expected| match expected {
                    Some(expected) => format!("{expected:?}"),
                    None => "end of input".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{found}{context}, expected {expected}")
    }
}

impl fmt::Display for ParseErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailedToOpenFile { path, error } => {
                write!(f, "failed to open {}: {}", path.display(), error)
            }
            Self::ParseError { id, source, errors } => {
                for error in errors {
                    let report = Report::build(ReportKind::Error, id, error.span().start)
                        .with_message(Self::describe(error))
                        .with_label(
                            Label::new((id, error.span()))
                                .with_message(match error.found() {
                                    Some(token) => format!("unexpected {token:?}"),
                                    None => "input ends here".to_string(),
                                })
                                .with_color(Color::Red),
                        );

                    let mut buffer = Vec::new();
                    report
                        .finish()
                        .write((id, Source::from(&source)), &mut buffer)
                        .map_err(|_| fmt::Error)?;
                    f.write_str(&String::from_utf8_lossy(&buffer))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ParseErrorReport {}

fn inline_space() -> impl Parser<char, (), Error = ParseError> + Clone {
    filter(|c: &char| *c == ' ' || *c == '\t').repeated().ignored()
}

fn inline_space1() -> impl Parser<char, (), Error = ParseError> + Clone {
    filter(|c: &char| *c == ' ' || *c == '\t')
        .repeated()
        .at_least(1)
        .ignored()
}

fn ident_char(c: &char) -> bool {
    c.is_ascii_alphanumeric() || *c == '_'
}

fn term() -> impl Parser<char, TermAst, Error = ParseError> {
    recursive(|term| {
        let atom = filter(|c: &char| c.is_ascii_lowercase())
            .chain(filter(ident_char).repeated())
            .collect::<String>()
            .map(ArcStr::from)
            .map(TermAst::Atom)
            .labelled("symbol");

        let variable = filter(|c: &char| c.is_ascii_uppercase() || *c == '_')
            .chain(filter(ident_char).repeated())
            .collect::<String>()
            .map(ArcStr::from)
            .map(TermAst::Var)
            .labelled("variable");

        let integer = just('-')
            .or_not()
            .chain::<char, _, _>(text::int(10))
            .collect::<String>()
            .try_map(|digits: String, span| {
                digits.parse::<i64>().map(TermAst::Int).map_err(|_| {
                    Simple::custom(span, format!("integer literal {digits} is out of range"))
                })
            })
            .labelled("integer");

        // a parenthesised group is a nested compound; a singleton group is
        // just its term
        let group = term
            .separated_by(inline_space1())
            .at_least(1)
            .delimited_by(just('(').then(inline_space()), inline_space().then(just(')')))
            .try_map(|mut terms: Vec<TermAst>, span| {
                if terms.len() == 1 {
                    return Ok(terms.remove(0));
                }
                match terms.remove(0) {
                    TermAst::Atom(functor) => Ok(TermAst::Compound(functor, terms)),
                    _ => Err(Simple::custom(
                        span,
                        "a compound term must start with a symbol",
                    )),
                }
            })
            .labelled("group");

        choice((integer, atom, variable, group))
    })
}

/// Parses a whole file into clause blocks of token rows. Lines holding only
/// spaces separate blocks.
fn file() -> impl Parser<char, Vec<Vec<Row>>, Error = ParseError> {
    let row = term().separated_by(inline_space1()).at_least(1);
    let line = inline_space()
        .ignore_then(row.or_not())
        .then_ignore(inline_space());
    let newline = just('\r').or_not().ignore_then(just('\n')).ignored();

    line.separated_by(newline)
        .then_ignore(end())
        .map(|lines: Vec<Option<Row>>| {
            let mut blocks = Vec::new();
            let mut block = Vec::new();
            for line in lines {
                match line {
                    Some(row) => block.push(row),
                    None => {
                        if !block.is_empty() {
                            blocks.push(std::mem::take(&mut block));
                        }
                    }
                }
            }
            if !block.is_empty() {
                blocks.push(block);
            }
            blocks
        })
}

/// Parses program text into clause blocks.
pub fn parse_source(id: ArcStr, source: &str) -> Result<Vec<Vec<Row>>, ParseErrorReport> {
    file()
        .parse(source)
        .map_err(|errors| ParseErrorReport::ParseError {
            id,
            source: source.to_string(),
            errors,
        })
}

/// Reads and parses a program file.
pub fn parse_file(path: PathBuf) -> Result<Vec<Vec<Row>>, ParseErrorReport> {
    let source = std::fs::read_to_string(&path)
        .map_err(|error| ParseErrorReport::FailedToOpenFile { path: path.clone(), error })?;
    parse_source(arcstr::format!("{}", path.display()), &source)
}
