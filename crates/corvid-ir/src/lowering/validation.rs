//! Span lookup for lowering diagnostics.

use corvid_dsl::ast;

use super::LoweringError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Site {
    Declaration,
    Use,
    Message,
    Query,
}

fn collect_value_refs<'a>(v: &'a ast::ValueExpr, out: &mut Vec<(Site, &'a ast::ConstantRef)>) {
    match v {
        ast::ValueExpr::Constant(r) => out.push((Site::Use, r)),
        ast::ValueExpr::Primitive(p) => p.arguments.iter().for_each(|a| collect_value_refs(a, out)),
        ast::ValueExpr::Equation(rs) => out.extend(rs.iter().map(|r| (Site::Use, r))),
    }
}

/// Every constant reference in source order, tagged with where it appears.
fn constant_refs(model: &ast::Model) -> Vec<(Site, &ast::ConstantRef)> {
    let mut out = Vec::new();
    for block in &model.blocks {
        match &block.node {
            ast::Block::Principal(p) => {
                for expr in &p.expressions {
                    match &expr.node {
                        ast::Expression::Knows { constants, .. }
                        | ast::Expression::Generates { constants } => {
                            out.extend(constants.iter().map(|r| (Site::Declaration, r)));
                        }
                        ast::Expression::Leaks { constants } => {
                            out.extend(constants.iter().map(|r| (Site::Use, r)));
                        }
                        ast::Expression::Assignment { targets, value } => {
                            collect_value_refs(value, &mut out);
                            out.extend(targets.iter().map(|r| (Site::Declaration, r)));
                        }
                    }
                }
            }
            ast::Block::Message(m) => out.extend(m.constants.iter().map(|r| (Site::Message, r))),
            ast::Block::Phase(_) => {}
        }
    }
    for q in &model.queries {
        match &q.node.kind {
            ast::QueryKind::Confidentiality(r) | ast::QueryKind::Freshness(r) => {
                out.push((Site::Query, r))
            }
            ast::QueryKind::Unlinkability(rs) => out.extend(rs.iter().map(|r| (Site::Query, r))),
            ast::QueryKind::Authentication(m) => {
                out.extend(m.constants.iter().map(|r| (Site::Query, r)))
            }
        }
        for o in &q.node.options {
            out.extend(o.message.constants.iter().map(|r| (Site::Query, r)));
        }
    }
    out
}

fn find_primitive<'a>(v: &'a ast::ValueExpr, name: &str) -> Option<&'a ast::PrimitiveExpr> {
    match v {
        ast::ValueExpr::Primitive(p) if p.name == name => Some(p),
        ast::ValueExpr::Primitive(p) => p.arguments.iter().find_map(|a| find_primitive(a, name)),
        _ => None,
    }
}

fn primitive_span(model: &ast::Model, name: &str) -> Option<ast::Span> {
    model.blocks.iter().find_map(|block| match &block.node {
        ast::Block::Principal(p) => p.expressions.iter().find_map(|expr| match &expr.node {
            ast::Expression::Assignment { value, .. } => find_primitive(value, name).map(|p| p.span),
            _ => None,
        }),
        _ => None,
    })
}

fn nth_ref(model: &ast::Model, name: &str, sites: &[Site], n: usize) -> Option<ast::Span> {
    let refs: Vec<_> = constant_refs(model)
        .into_iter()
        .filter(|(site, r)| r.name == name && sites.contains(site))
        .map(|(_, r)| r.span)
        .collect();
    refs.get(n).or_else(|| refs.first()).copied()
}

fn message_block_span(model: &ast::Model, principal: &str) -> Option<ast::Span> {
    model.blocks.iter().find_map(|block| match &block.node {
        ast::Block::Message(m) if m.sender == principal || m.recipient == principal => {
            Some(block.span)
        }
        _ => None,
    })
}

/// Best-effort span lookup for a lowering error by examining the AST.
pub(super) fn find_span_for_error(err: &LoweringError, model: &ast::Model) -> Option<ast::Span> {
    use Site::*;
    match err {
        LoweringError::UnknownPrimitive(name) | LoweringError::NotCheckable(name) => {
            primitive_span(model, name)
        }
        LoweringError::WrongArity { primitive, .. }
        | LoweringError::WrongOutputs { primitive, .. } => primitive_span(model, primitive),
        LoweringError::UnknownConstant { name, .. } => nth_ref(model, name, &[Use], 0),
        LoweringError::LeakUnknown { name, .. } => nth_ref(model, name, &[Use], 0),
        LoweringError::AssignedTwice(name)
        | LoweringError::GeneratedExists(name)
        | LoweringError::KnownDifferently(name) => nth_ref(model, name, &[Declaration], 1),
        LoweringError::MultipleTargets(name) | LoweringError::AssignValueToValue(name) => {
            nth_ref(model, name, &[Declaration], 0)
        }
        LoweringError::SenderDoesNotKnow { name, .. } => nth_ref(model, name, &[Message], 0),
        LoweringError::RecipientAlreadyKnows { name, .. } => nth_ref(model, name, &[Message], 0),
        LoweringError::UndeclaredPrincipal(name) | LoweringError::SelfMessage(name) => {
            message_block_span(model, name)
        }
        LoweringError::PhaseOrder { found, .. } => model.blocks.iter().find_map(|b| match &b.node {
            ast::Block::Phase(p) if p.number == *found => Some(b.span),
            _ => None,
        }),
        LoweringError::UnknownQueryConstant(name) => nth_ref(model, name, &[Query], 0),
        LoweringError::UnknownMessage(_) => model
            .queries
            .iter()
            .find(|q| {
                matches!(q.node.kind, ast::QueryKind::Authentication(_))
                    || !q.node.options.is_empty()
            })
            .map(|q| q.span),
        LoweringError::NoPrincipals => None,
    }
}
