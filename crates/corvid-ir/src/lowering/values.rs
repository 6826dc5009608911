//! Lowering of right-hand-side expressions into symbolic values.

use corvid_dsl::ast;

use super::LoweringError;
use crate::knowledge_map::KnowledgeMap;
use crate::primitive::PrimitiveId;
use crate::value::{Constant, Equation, Primitive, PrincipalId, Value};

/// Context for checking constant uses inside one principal block.
pub(super) struct ValueScope<'a> {
    pub km: &'a KnowledgeMap,
    pub principal: PrincipalId,
    pub principal_name: &'a str,
}

impl ValueScope<'_> {
    pub(super) fn knows(&self, name: &str) -> bool {
        knows(self.km, self.principal, name)
    }

    fn constant(&self, r: &ast::ConstantRef) -> Result<Constant, LoweringError> {
        match self.km.constant(&r.name) {
            Some(c) if self.knows(&r.name) => Ok(c.clone()),
            _ => Err(LoweringError::UnknownConstant {
                principal: self.principal_name.to_owned(),
                name: r.name.clone(),
            }),
        }
    }

    pub(super) fn value(&self, expr: &ast::ValueExpr) -> Result<Value, LoweringError> {
        match expr {
            ast::ValueExpr::Constant(r) => Ok(Value::Constant(self.constant(r)?)),
            ast::ValueExpr::Primitive(p) => self.primitive(p).map(Value::Primitive),
            ast::ValueExpr::Equation(terms) => {
                let values = terms
                    .iter()
                    .map(|t| self.constant(t).map(Value::Constant))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Equation(Equation { values }))
            }
        }
    }

    fn primitive(&self, p: &ast::PrimitiveExpr) -> Result<Primitive, LoweringError> {
        let id = PrimitiveId::from_name(&p.name)
            .ok_or_else(|| LoweringError::UnknownPrimitive(p.name.clone()))?;
        let spec = id.spec();
        if !spec.accepts_arity(p.arguments.len()) {
            return Err(LoweringError::WrongArity {
                primitive: p.name.clone(),
                expected: range_text(spec.arity),
                got: p.arguments.len(),
            });
        }
        if p.check && !spec.checkable {
            return Err(LoweringError::NotCheckable(p.name.clone()));
        }
        let arguments = p
            .arguments
            .iter()
            .map(|a| self.value(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Primitive {
            id,
            arguments,
            output: 0,
            check: p.check,
        })
    }
}

pub(super) fn knows(km: &KnowledgeMap, principal: PrincipalId, name: &str) -> bool {
    km.entry(name).is_some_and(|e| {
        e.constant.is_g_or_nil()
            || e.creator == principal
            || e.known_by.iter().any(|k| k.recipient == principal)
    })
}

pub(super) fn range_text((lo, hi): (usize, usize)) -> String {
    if lo == hi {
        lo.to_string()
    } else {
        format!("{lo} to {hi}")
    }
}
