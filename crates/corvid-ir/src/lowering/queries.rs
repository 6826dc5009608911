//! Query lowering.

use corvid_dsl::ast;

use super::LoweringError;
use crate::knowledge_map::KnowledgeMap;
use crate::query::{MessageRef, Query, QueryKind, QueryOption};
use crate::value::Constant;

fn constant(km: &KnowledgeMap, r: &ast::ConstantRef) -> Result<Constant, LoweringError> {
    km.constant(&r.name)
        .cloned()
        .ok_or_else(|| LoweringError::UnknownQueryConstant(r.name.clone()))
}

/// Resolves a message reference and checks that such a send happened.
fn sent_message(km: &KnowledgeMap, m: &ast::Message) -> Result<MessageRef, LoweringError> {
    let principal = |name: &str| {
        km.principal_id(name)
            .filter(|id| !id.is_attacker())
            .ok_or_else(|| LoweringError::UndeclaredPrincipal(name.to_owned()))
    };
    let sender = principal(&m.sender)?;
    let recipient = principal(&m.recipient)?;
    let constants = m
        .constants
        .iter()
        .map(|r| constant(km, r))
        .collect::<Result<Vec<_>, _>>()?;
    let message = MessageRef {
        sender,
        recipient,
        sender_name: m.sender.clone(),
        recipient_name: m.recipient.clone(),
        constants,
    };
    let was_sent = message.constants.iter().all(|c| {
        km.messages().iter().any(|w| {
            w.sender == sender
                && w.recipient == recipient
                && w.constants.iter().any(|s| s.name == c.name)
        })
    });
    if !was_sent {
        return Err(LoweringError::UnknownMessage(message.to_string()));
    }
    Ok(message)
}

pub fn lower_queries(model: &ast::Model, km: &KnowledgeMap) -> Result<Vec<Query>, LoweringError> {
    model
        .queries
        .iter()
        .map(|q| lower_query(&q.node, km))
        .collect()
}

fn lower_query(q: &ast::Query, km: &KnowledgeMap) -> Result<Query, LoweringError> {
    let kind = match &q.kind {
        ast::QueryKind::Confidentiality(r) => QueryKind::Confidentiality(constant(km, r)?),
        ast::QueryKind::Freshness(r) => QueryKind::Freshness(constant(km, r)?),
        ast::QueryKind::Unlinkability(rs) => QueryKind::Unlinkability(
            rs.iter()
                .map(|r| constant(km, r))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        ast::QueryKind::Authentication(m) => QueryKind::Authentication(sent_message(km, m)?),
    };
    let options = q
        .options
        .iter()
        .map(|o| match o.kind {
            ast::QueryOptionKind::Precondition => {
                sent_message(km, &o.message).map(QueryOption::Precondition)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Query { kind, options })
}
