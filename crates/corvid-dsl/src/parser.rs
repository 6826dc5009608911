#![allow(clippy::result_large_err)]

use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct CorvidParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

/// Words that may not name a constant or a principal.
pub const RESERVED: &[&str] = &[
    "attacker",
    "passive",
    "active",
    "principal",
    "knows",
    "generates",
    "leaks",
    "phase",
    "public",
    "private",
    "password",
    "confidentiality",
    "authentication",
    "freshness",
    "unlinkability",
    "precondition",
    "ringsign",
    "ringsignverif",
    "primitive",
    "pw_hash",
    "hash",
    "hkdf",
    "aead_enc",
    "aead_dec",
    "enc",
    "dec",
    "mac",
    "assert",
    "sign",
    "signverif",
    "pke_enc",
    "pke_dec",
    "shamir_split",
    "shamir_join",
    "concat",
    "split",
    "blind",
    "unblind",
    "g",
    "nil",
    "unnamed",
];

/// Returns true when `name` cannot be used as a declared identifier.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name) || name.starts_with("attacker") || name.starts_with("unnamed")
}

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

fn title_case(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parse a `.vp` source file into an AST [`Model`].
pub fn parse(source: &str, filename: &str) -> Result<Model, ParseError> {
    let mut pairs = CorvidParser::parse(Rule::model, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p + 1),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        let end = end.min(source.len()).max(start.min(source.len()));
        ParseError::syntax(
            format!("{e}"),
            Span::new(start.min(source.len()), end),
            source,
            filename,
        )
    })?;

    let model_pair = pairs
        .next()
        .ok_or_else(|| ParseError::syntax("empty input", Span::new(0, 0), source, filename))?;
    ModelBuilder::new(source, filename).build(model_pair)
}

/// Walks the pest parse tree and assembles the AST.
///
/// Holds the `unnamed_N` counter for `_` assignment targets so that every
/// parse starts numbering from zero.
struct ModelBuilder<'s> {
    source: &'s str,
    filename: &'s str,
    unnamed: usize,
}

impl<'s> ModelBuilder<'s> {
    fn new(source: &'s str, filename: &'s str) -> Self {
        Self {
            source,
            filename,
            unnamed: 0,
        }
    }

    fn syntax(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::syntax(message, span, self.source, self.filename)
    }

    fn check_reserved(&self, name: &str, span: Span) -> Result<(), ParseError> {
        if is_reserved(name) {
            return Err(ParseError::reserved(name, span, self.source, self.filename));
        }
        Ok(())
    }

    fn build(mut self, pair: Pair<'_>) -> Result<Model, ParseError> {
        let mut attacker = None;
        let mut blocks = Vec::new();
        let mut queries = None;

        for inner in pair.into_inner() {
            let span = span_from(&inner);
            match inner.as_rule() {
                Rule::attacker_decl => attacker = Some(self.attacker(inner)?),
                Rule::principal_decl => {
                    let principal = self.principal(inner)?;
                    blocks.push(Spanned::new(Block::Principal(principal), span));
                }
                Rule::message_decl => {
                    let message = self.message(inner)?;
                    blocks.push(Spanned::new(Block::Message(message), span));
                }
                Rule::phase_decl => {
                    let phase = self.phase(inner)?;
                    blocks.push(Spanned::new(Block::Phase(phase), span));
                }
                Rule::queries_decl => queries = Some(self.queries(inner)?),
                _ => {}
            }
        }

        let attacker = attacker.ok_or_else(|| ParseError::missing("attacker"))?;
        if blocks.is_empty() {
            return Err(ParseError::NoBlocks);
        }
        let queries = queries.ok_or_else(|| ParseError::missing("queries"))?;
        Ok(Model {
            attacker,
            blocks,
            queries,
        })
    }

    fn attacker(&self, pair: Pair<'_>) -> Result<Spanned<AttackerKind>, ParseError> {
        let span = span_from(&pair);
        let kind = pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::attacker_kind)
            .ok_or_else(|| self.syntax("expected `active` or `passive`", span))?;
        let kind = match kind.as_str() {
            "active" => AttackerKind::Active,
            _ => AttackerKind::Passive,
        };
        Ok(Spanned::new(kind, span))
    }

    fn principal(&mut self, pair: Pair<'_>) -> Result<PrincipalBlock, ParseError> {
        let mut name = String::new();
        let mut expressions = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::principal_name => name = self.principal_name(&inner)?,
                Rule::knows_expr
                | Rule::generates_expr
                | Rule::leaks_expr
                | Rule::assignment_expr => expressions.push(self.expression(inner)?),
                _ => {}
            }
        }
        Ok(PrincipalBlock { name, expressions })
    }

    fn principal_name(&self, pair: &Pair<'_>) -> Result<String, ParseError> {
        let raw = pair.as_str().trim();
        self.check_reserved(&raw.to_lowercase(), span_from(pair))?;
        Ok(title_case(raw))
    }

    fn expression(&mut self, pair: Pair<'_>) -> Result<Spanned<Expression>, ParseError> {
        let span = span_from(&pair);
        let rule = pair.as_rule();
        let mut qualifier = Qualifier::Public;
        let mut constants = Vec::new();
        let mut value = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::qualifier => {
                    qualifier = match inner.as_str() {
                        "private" => Qualifier::Private,
                        "password" => Qualifier::Password,
                        _ => Qualifier::Public,
                    }
                }
                Rule::constants => constants = self.declared_constants(inner)?,
                Rule::value => value = Some(self.value(inner)?),
                _ => {}
            }
        }

        let expression = match rule {
            Rule::knows_expr => Expression::Knows {
                qualifier,
                constants,
            },
            Rule::generates_expr => Expression::Generates { constants },
            Rule::leaks_expr => Expression::Leaks { constants },
            _ => {
                let value = value.ok_or_else(|| self.syntax("expected a value", span))?;
                if let ValueExpr::Constant(c) = &value {
                    return Err(ParseError::assign_value_to_value(
                        c.span,
                        self.source,
                        self.filename,
                    ));
                }
                let targets = constants
                    .into_iter()
                    .map(|mut c| {
                        if c.name == "_" {
                            c.name = format!("unnamed_{}", self.unnamed);
                            self.unnamed += 1;
                        }
                        c
                    })
                    .collect();
                Expression::Assignment { targets, value }
            }
        };
        Ok(Spanned::new(expression, span))
    }

    fn declared_constants(&self, pair: Pair<'_>) -> Result<Vec<ConstantRef>, ParseError> {
        pair.into_inner()
            .filter(|p| p.as_rule() == Rule::constant)
            .map(|p| {
                let c = constant_ref(&p);
                self.check_reserved(&c.name, c.span)?;
                Ok(c)
            })
            .collect()
    }

    fn value(&self, pair: Pair<'_>) -> Result<ValueExpr, ParseError> {
        let span = span_from(&pair);
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| self.syntax("expected a value", span))?;
        match inner.as_rule() {
            Rule::primitive => {
                let span = span_from(&inner);
                let mut name = String::new();
                let mut arguments = Vec::new();
                let mut check = false;
                for p in inner.into_inner() {
                    match p.as_rule() {
                        Rule::primitive_name => name = p.as_str().trim().to_uppercase(),
                        Rule::value => arguments.push(self.value(p)?),
                        Rule::check => check = true,
                        _ => {}
                    }
                }
                Ok(ValueExpr::Primitive(PrimitiveExpr {
                    name,
                    arguments,
                    check,
                    span,
                }))
            }
            Rule::equation => Ok(ValueExpr::Equation(
                inner
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::constant)
                    .map(|p| constant_ref(&p))
                    .collect(),
            )),
            Rule::constant => Ok(ValueExpr::Constant(constant_ref(&inner))),
            other => Err(self.syntax(format!("unexpected {other:?}"), span)),
        }
    }

    fn message(&self, pair: Pair<'_>) -> Result<Message, ParseError> {
        let span = span_from(&pair);
        let mut names = Vec::with_capacity(2);
        let mut constants = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::principal_name => names.push(self.principal_name(&inner)?),
                Rule::message_constants => {
                    for c in inner.into_inner() {
                        let guard = c.as_rule() == Rule::guarded_constant;
                        let text = c.as_str().trim();
                        let name = if guard {
                            text.trim_start_matches('[').trim_end_matches(']').trim()
                        } else {
                            text
                        };
                        let mut constant = ConstantRef::new(name.to_lowercase(), span_from(&c));
                        constant.guard = guard;
                        self.check_reserved(&constant.name, constant.span)?;
                        constants.push(constant);
                    }
                }
                _ => {}
            }
        }
        let mut names = names.into_iter();
        match (names.next(), names.next()) {
            (Some(sender), Some(recipient)) => Ok(Message {
                sender,
                recipient,
                constants,
            }),
            _ => Err(self.syntax("expected `Sender -> Recipient: ...`", span)),
        }
    }

    fn phase(&self, pair: Pair<'_>) -> Result<Phase, ParseError> {
        let span = span_from(&pair);
        let number = pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::number)
            .ok_or_else(|| self.syntax("expected a phase number", span))?;
        let text = number.as_str();
        let number = text.parse::<usize>().map_err(|_| {
            ParseError::invalid_number(text, span_from(&number), self.source, self.filename)
        })?;
        Ok(Phase { number })
    }

    fn queries(&self, pair: Pair<'_>) -> Result<Vec<Spanned<Query>>, ParseError> {
        let mut queries = Vec::new();
        for inner in pair.into_inner() {
            let span = span_from(&inner);
            let rule = inner.as_rule();
            if !matches!(
                rule,
                Rule::confidentiality_query
                    | Rule::authentication_query
                    | Rule::freshness_query
                    | Rule::unlinkability_query
            ) {
                continue;
            }

            let mut constants = Vec::new();
            let mut message = None;
            let mut options = Vec::new();
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::constant => constants.push(constant_ref(&p)),
                    Rule::constants => constants.extend(
                        p.into_inner()
                            .filter(|c| c.as_rule() == Rule::constant)
                            .map(|c| constant_ref(&c)),
                    ),
                    Rule::message_decl => message = Some(self.message(p)?),
                    Rule::query_options => options = self.query_options(p)?,
                    _ => {}
                }
            }

            let kind = match rule {
                Rule::authentication_query => QueryKind::Authentication(
                    message.ok_or_else(|| self.syntax("expected a message", span))?,
                ),
                Rule::unlinkability_query => QueryKind::Unlinkability(constants),
                _ => {
                    let constant = constants
                        .into_iter()
                        .next()
                        .ok_or_else(|| self.syntax("expected a constant", span))?;
                    if rule == Rule::confidentiality_query {
                        QueryKind::Confidentiality(constant)
                    } else {
                        QueryKind::Freshness(constant)
                    }
                }
            };
            queries.push(Spanned::new(Query { kind, options }, span));
        }
        Ok(queries)
    }

    fn query_options(&self, pair: Pair<'_>) -> Result<Vec<QueryOption>, ParseError> {
        let mut options = Vec::new();
        for option in pair.into_inner() {
            let span = span_from(&option);
            let mut name = None;
            let mut message = None;
            for p in option.into_inner() {
                match p.as_rule() {
                    Rule::identifier => name = Some((p.as_str().to_lowercase(), span_from(&p))),
                    Rule::message_decl => message = Some(self.message(p)?),
                    _ => {}
                }
            }
            let (name, name_span) =
                name.ok_or_else(|| self.syntax("expected an option name", span))?;
            if name != "precondition" {
                return Err(ParseError::unknown_query_option(
                    name,
                    name_span,
                    self.source,
                    self.filename,
                ));
            }
            let message = message.ok_or_else(|| self.syntax("expected a message", span))?;
            options.push(QueryOption {
                kind: QueryOptionKind::Precondition,
                message,
                span,
            });
        }
        Ok(options)
    }
}

fn constant_ref(pair: &Pair<'_>) -> ConstantRef {
    ConstantRef::new(pair.as_str().trim().to_lowercase(), span_from(pair))
}
