mod knowledge;
mod queries;
mod validation;
mod values;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::debug;

use corvid_dsl::ast;

use crate::knowledge_map::KnowledgeMap;
use crate::principal_state::{principal_state_for, PrincipalState};
use crate::query::Query;

use knowledge::KnowledgeMapBuilder;
use validation::find_span_for_error;

pub use queries::lower_queries;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoweringError {
    #[error("unknown primitive '{0}'")]
    UnknownPrimitive(String),
    #[error("primitive {primitive} takes {expected} arguments, got {got}")]
    WrongArity {
        primitive: String,
        expected: String,
        got: usize,
    },
    #[error("primitive {0} cannot be checked")]
    NotCheckable(String),
    #[error("primitive {primitive} has {expected} outputs, but {got} constants are assigned")]
    WrongOutputs {
        primitive: String,
        expected: String,
        got: usize,
    },
    #[error("only one constant can be assigned an equation, starting at '{0}'")]
    MultipleTargets(String),
    #[error("cannot assign value to value: '{0}'")]
    AssignValueToValue(String),
    #[error("{principal} uses '{name}' without knowing it")]
    UnknownConstant { principal: String, name: String },
    #[error("constant assigned twice: '{0}'")]
    AssignedTwice(String),
    #[error("generated constant already exists: '{0}'")]
    GeneratedExists(String),
    #[error("constant is known more than once and in different ways: '{0}'")]
    KnownDifferently(String),
    #[error("{principal} leaks '{name}' without knowing it")]
    LeakUnknown { principal: String, name: String },
    #[error("{sender} sends '{name}' without knowing it")]
    SenderDoesNotKnow { sender: String, name: String },
    #[error("{recipient} receives '{name}' but already knows it")]
    RecipientAlreadyKnows { recipient: String, name: String },
    #[error("principal '{0}' is never declared")]
    UndeclaredPrincipal(String),
    #[error("{0} sends a message to itself")]
    SelfMessage(String),
    #[error("phase {found} does not follow phase {previous}")]
    PhaseOrder { previous: usize, found: usize },
    #[error("query refers to unknown constant '{0}'")]
    UnknownQueryConstant(String),
    #[error("query refers to a message that is never sent: {0}")]
    UnknownMessage(String),
    #[error("no principals declared")]
    NoPrincipals,
}

/// A lowering error enriched with source span information for pretty-printed diagnostics.
#[derive(Debug, Error, Diagnostic)]
#[error("{inner}")]
#[diagnostic(code(corvid::lower))]
#[allow(unused_assignments)]
pub struct SpannedLoweringError {
    #[source_code]
    pub src: NamedSource<String>,
    pub inner: LoweringError,
    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl SpannedLoweringError {
    fn new(err: LoweringError, source: String, filename: String, span: Option<ast::Span>) -> Self {
        Self {
            src: NamedSource::new(filename, source),
            inner: err,
            span: span.map(|s| SourceSpan::new(s.start.into(), s.end - s.start)),
        }
    }
}

/// Everything the engine needs to verify a model.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub attacker: ast::AttackerKind,
    pub knowledge_map: KnowledgeMap,
    pub principal_states: Vec<PrincipalState>,
    pub queries: Vec<Query>,
}

/// Builds the knowledge map, checking the model for consistency on the way.
pub fn build_knowledge_map(model: &ast::Model) -> Result<KnowledgeMap, LoweringError> {
    KnowledgeMapBuilder::new(model)?.build(model)
}

/// One state per principal, in order of first declaration.
pub fn build_principal_states(model: &ast::Model, km: &KnowledgeMap) -> Vec<PrincipalState> {
    let mut states: Vec<PrincipalState> = Vec::new();
    for block in model.principals() {
        let ast::Block::Principal(p) = &block.node else {
            continue;
        };
        if states.iter().any(|s| s.name() == p.name) {
            continue;
        }
        if let Some(id) = km.principal_id(&p.name) {
            states.push(principal_state_for(km, id, &p.name));
        }
    }
    states
}

pub fn lower(model: &ast::Model) -> Result<CompiledModel, LoweringError> {
    let knowledge_map = build_knowledge_map(model)?;
    let principal_states = build_principal_states(model, &knowledge_map);
    let queries = lower_queries(model, &knowledge_map)?;
    debug!(
        principals = principal_states.len(),
        queries = queries.len(),
        "lowered model"
    );
    Ok(CompiledModel {
        attacker: model.attacker.node,
        knowledge_map,
        principal_states,
        queries,
    })
}

/// Lower a model with rich source-span diagnostics.
///
/// This wraps `lower()` and attaches source spans for pretty error reporting via miette.
#[allow(clippy::result_large_err)]
pub fn lower_with_source(
    model: &ast::Model,
    source: &str,
    filename: &str,
) -> Result<CompiledModel, SpannedLoweringError> {
    lower(model).map_err(|err| {
        let span = find_span_for_error(&err, model);
        SpannedLoweringError::new(err, source.to_string(), filename.to_string(), span)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{PrincipalId, Value};

    fn lower_src(src: &str) -> Result<CompiledModel, LoweringError> {
        let model = corvid_dsl::parse(src, "test.vp").expect("parses");
        lower(&model)
    }

    const DH: &str = r#"
attacker[active]

principal Alice[
    knows public c0
    generates a
    ga = G^a
]

principal Bob[
    knows public c0
    generates b
    gb = G^b
]

Alice -> Bob: [ga]
Bob -> Alice: gb

principal Alice[
    ss_a = gb^a
    knows private m
    e = AEAD_ENC(ss_a, m, c0)
]

Alice -> Bob: e

principal Bob[
    ss_b = ga^b
    m_b = AEAD_DEC(ss_b, e, c0)?
]

queries[
    confidentiality? m
    authentication? Alice -> Bob: e
]
"#;

    #[test]
    fn lowers_diffie_hellman_model() {
        let compiled = lower_src(DH).expect("lowers");
        let km = &compiled.knowledge_map;
        assert_eq!(km.principals(), ["Attacker", "Alice", "Bob"]);
        let declared = |name: &str| km.entry(name).expect(name).declared_at;
        assert!(declared("a") < declared("ga"));
        assert!(declared("ss_b") < declared("m_b"));
        assert_eq!(km.max_declared_at, declared("m_b"));
        assert_eq!(km.messages().len(), 3);
        assert!(km.messages()[0].constants[0].guard);
        assert_eq!(compiled.principal_states.len(), 2);
        assert_eq!(compiled.queries.len(), 2);

        let ga = km.entry("ga").expect("ga");
        assert_eq!(ga.creator, PrincipalId(1));
        assert_eq!(ga.known_by.len(), 1);
        assert_eq!(ga.assigned.to_string(), "G^a");
        assert_eq!(
            km.resolve(&Value::Constant(km.constant("ss_b").cloned().expect("ss_b")))
                .to_string(),
            "G^a^b"
        );
    }

    #[test]
    fn principal_views_differ() {
        let compiled = lower_src(DH).expect("lowers");
        let alice = &compiled.principal_states[0];
        let bob = &compiled.principal_states[1];
        let a = alice.index_of("a").expect("a");
        let ga = bob.index_of("ga").expect("ga");
        let gb = alice.index_of("gb").expect("gb");
        assert!(alice.known()[a]);
        assert!(!bob.known()[a]);
        assert!(bob.known()[ga]);
        assert!(bob.guard()[ga]);
        assert!(!alice.guard()[gb]);
        assert_eq!(alice.sender()[gb], PrincipalId(2));
        assert_eq!(bob.wire()[ga], vec![PrincipalId(2)]);
        assert!(bob.mutatable_to()[ga].is_empty());
        assert_eq!(alice.mutatable_to()[gb], vec![PrincipalId(1)]);
        assert!(alice.lengths_agree() && bob.lengths_agree());
    }

    fn err_of(src: &str) -> LoweringError {
        lower_src(src).expect_err("should be rejected")
    }

    #[test]
    fn rejects_unknown_primitive() {
        let src = "attacker[passive] principal A[ knows private x h = SHA3(x) ] queries[ confidentiality? x ]";
        assert_eq!(err_of(src), LoweringError::UnknownPrimitive("SHA3".into()));
    }

    #[test]
    fn rejects_wrong_arity() {
        let src = "attacker[passive] principal A[ knows private x e = ENC(x) ] queries[ confidentiality? x ]";
        assert!(matches!(err_of(src), LoweringError::WrongArity { got: 1, .. }));
    }

    #[test]
    fn rejects_uncheckable_primitive() {
        let src = "attacker[passive] principal A[ knows private x h = HASH(x)? ] queries[ confidentiality? x ]";
        assert_eq!(err_of(src), LoweringError::NotCheckable("HASH".into()));
    }

    #[test]
    fn rejects_wrong_output_count() {
        let src = "attacker[passive] principal A[ knows private x s1, s2 = SHAMIR_SPLIT(x) ] queries[ confidentiality? x ]";
        assert!(matches!(err_of(src), LoweringError::WrongOutputs { got: 2, .. }));
    }

    #[test]
    fn rejects_use_of_unknown_constant() {
        let src = "attacker[passive] principal A[ knows private x ] principal B[ h = HASH(x) ] queries[ confidentiality? x ]";
        assert!(matches!(err_of(src), LoweringError::UnknownConstant { .. }));
    }

    #[test]
    fn rejects_double_assignment() {
        let src = "attacker[passive] principal A[ knows private x h = HASH(x) h = HASH(x, x) ] queries[ confidentiality? x ]";
        assert_eq!(err_of(src), LoweringError::AssignedTwice("h".into()));
    }

    #[test]
    fn rejects_generating_twice() {
        let src = "attacker[passive] principal A[ generates n ] principal B[ generates n ] queries[ freshness? n ]";
        assert_eq!(err_of(src), LoweringError::GeneratedExists("n".into()));
    }

    #[test]
    fn shared_knowledge_must_agree() {
        let ok = "attacker[passive] principal A[ knows private k ] principal B[ knows private k ] queries[ confidentiality? k ]";
        let compiled = lower_src(ok).expect("shared key");
        let b = &compiled.principal_states[1];
        assert!(b.known()[b.index_of("k").expect("k")]);

        let bad = "attacker[passive] principal A[ knows private k ] principal B[ knows public k ] queries[ confidentiality? k ]";
        assert_eq!(err_of(bad), LoweringError::KnownDifferently("k".into()));
    }

    #[test]
    fn rejects_bad_messages() {
        let unknown = "attacker[passive] principal A[ ] principal B[ knows private x ] A -> B: x queries[ confidentiality? x ]";
        assert!(matches!(err_of(unknown), LoweringError::SenderDoesNotKnow { .. }));

        let known = "attacker[passive] principal A[ knows private x ] principal B[ knows private x ] A -> B: x queries[ confidentiality? x ]";
        assert!(matches!(err_of(known), LoweringError::RecipientAlreadyKnows { .. }));

        let stranger = "attacker[passive] principal A[ knows private x ] A -> Carol: x queries[ confidentiality? x ]";
        assert_eq!(err_of(stranger), LoweringError::UndeclaredPrincipal("Carol".into()));
    }

    #[test]
    fn phases_must_increase() {
        let src = "attacker[passive] principal A[ knows private x ] phase[1] principal A[ knows private y ] phase[1] queries[ confidentiality? x ]";
        assert_eq!(
            err_of(src),
            LoweringError::PhaseOrder {
                previous: 1,
                found: 1
            }
        );
    }

    #[test]
    fn leaks_are_recorded_per_phase() {
        let src = "attacker[passive] principal A[ knows private x ] phase[1] principal A[ leaks x ] queries[ confidentiality? x ]";
        let compiled = lower_src(src).expect("lowers");
        let km = &compiled.knowledge_map;
        assert_eq!(km.leaked_in("x"), [1]);
        assert!(km.constant("x").expect("x").leaked);
        assert_eq!(km.max_phase, 1);
    }

    #[test]
    fn authentication_queries_need_a_real_message() {
        let src = "attacker[active] principal A[ knows private x ] principal B[ knows private y ] A -> B: x queries[ authentication? B -> A: x ]";
        assert!(matches!(err_of(src), LoweringError::UnknownMessage(_)));
    }

    #[test]
    fn spanned_errors_point_at_the_offending_name() {
        let src = "attacker[passive] principal A[ knows private x h = SHA3(x) ] queries[ confidentiality? x ]";
        let model = corvid_dsl::parse(src, "t.vp").expect("parses");
        let err = lower_with_source(&model, src, "t.vp").expect_err("rejects");
        let span = err.span.expect("span");
        assert_eq!(&src[span.offset()..span.offset() + 4], "SHA3");
    }
}
