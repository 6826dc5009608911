#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(corvid::parse::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("no `{section}` block defined")]
    #[diagnostic(
        code(corvid::parse::missing_section),
        help("every model needs an `attacker[...]` block, at least one principal or message block, and a `queries[...]` block")
    )]
    MissingSection { section: String },

    #[error("no principal or message blocks defined")]
    #[diagnostic(code(corvid::parse::no_blocks))]
    NoBlocks,

    #[error("cannot use reserved keyword in name: {name}")]
    #[diagnostic(
        code(corvid::parse::reserved),
        help("names may not be keywords, primitive names, or start with `attacker` or `unnamed`")
    )]
    Reserved {
        name: String,
        #[label("reserved")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("cannot assign value to value")]
    #[diagnostic(
        code(corvid::parse::assign_value),
        help("assignments must produce a primitive or an equation, not another constant")
    )]
    AssignValueToValue {
        #[label("constant on the right-hand side")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Invalid number '{text}'")]
    #[diagnostic(code(corvid::parse::number))]
    InvalidNumber {
        text: String,
        #[label("not a phase number")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unknown query option '{name}'")]
    #[diagnostic(code(corvid::parse::query_option), help("the only supported option is `precondition`"))]
    UnknownQueryOption {
        name: String,
        #[label("unknown option")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

fn named(source: &str, filename: &str) -> miette::NamedSource<String> {
    miette::NamedSource::new(filename, source.to_owned())
}

fn source_span(span: Span) -> miette::SourceSpan {
    (span.start, span.end.saturating_sub(span.start)).into()
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::Syntax {
            message: message.into(),
            span: source_span(span),
            src: named(source, filename),
        }
    }

    pub fn reserved(name: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::Reserved {
            name: name.into(),
            span: source_span(span),
            src: named(source, filename),
        }
    }

    pub fn assign_value_to_value(span: Span, source: &str, filename: &str) -> Self {
        ParseError::AssignValueToValue {
            span: source_span(span),
            src: named(source, filename),
        }
    }

    pub fn invalid_number(text: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::InvalidNumber {
            text: text.into(),
            span: source_span(span),
            src: named(source, filename),
        }
    }

    pub fn unknown_query_option(
        name: impl Into<String>,
        span: Span,
        source: &str,
        filename: &str,
    ) -> Self {
        ParseError::UnknownQueryOption {
            name: name.into(),
            span: source_span(span),
            src: named(source, filename),
        }
    }

    pub fn missing(section: &str) -> Self {
        ParseError::MissingSection {
            section: section.to_owned(),
        }
    }
}
