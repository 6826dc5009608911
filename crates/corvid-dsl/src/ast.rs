/// Source span for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A spanned AST node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A complete protocol model: attacker, ordered blocks, and queries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Model {
    pub attacker: Spanned<AttackerKind>,
    pub blocks: Vec<Spanned<Block>>,
    pub queries: Vec<Spanned<Query>>,
}

/// Attacker capability declared by `attacker[...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum AttackerKind {
    Passive,
    Active,
}

impl AttackerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttackerKind::Passive => "passive",
            AttackerKind::Active => "active",
        }
    }
}

impl std::fmt::Display for AttackerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level block in declaration order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Block {
    Principal(PrincipalBlock),
    Message(Message),
    Phase(Phase),
}

/// `principal Name[ ... ]`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct PrincipalBlock {
    pub name: String,
    pub expressions: Vec<Spanned<Expression>>,
}

/// Qualifier on a `knows` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Qualifier {
    Public,
    Private,
    Password,
}

impl Qualifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Qualifier::Public => "public",
            Qualifier::Private => "private",
            Qualifier::Password => "password",
        }
    }
}

/// A statement inside a principal block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Expression {
    Knows {
        qualifier: Qualifier,
        constants: Vec<ConstantRef>,
    },
    Generates {
        constants: Vec<ConstantRef>,
    },
    Leaks {
        constants: Vec<ConstantRef>,
    },
    Assignment {
        targets: Vec<ConstantRef>,
        value: ValueExpr,
    },
}

/// A constant reference as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ConstantRef {
    pub name: String,
    /// Written as `[name]` in a message.
    pub guard: bool,
    pub span: Span,
}

impl ConstantRef {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            guard: false,
            span,
        }
    }
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum ValueExpr {
    Constant(ConstantRef),
    Primitive(PrimitiveExpr),
    /// `base ^ exponent`; the base is usually the generator `G`.
    Equation(Vec<ConstantRef>),
}

/// `NAME(arg, ...)` with an optional trailing `?` check.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct PrimitiveExpr {
    pub name: String,
    pub arguments: Vec<ValueExpr>,
    pub check: bool,
    pub span: Span,
}

/// `Sender -> Recipient: a, [b]`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub constants: Vec<ConstantRef>,
}

/// `phase[n]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Phase {
    pub number: usize,
}

/// Security query in the `queries[...]` block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Query {
    pub kind: QueryKind,
    pub options: Vec<QueryOption>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum QueryKind {
    Confidentiality(ConstantRef),
    Authentication(Message),
    Freshness(ConstantRef),
    Unlinkability(Vec<ConstantRef>),
}

impl QueryKind {
    pub fn name(&self) -> &'static str {
        match self {
            QueryKind::Confidentiality(_) => "confidentiality",
            QueryKind::Authentication(_) => "authentication",
            QueryKind::Freshness(_) => "freshness",
            QueryKind::Unlinkability(_) => "unlinkability",
        }
    }
}

/// Query option such as `precondition[Alice -> Bob: m]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct QueryOption {
    pub kind: QueryOptionKind,
    pub message: Message,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum QueryOptionKind {
    Precondition,
}

impl Model {
    /// Principal blocks in declaration order.
    pub fn principals(&self) -> impl Iterator<Item = &Spanned<Block>> {
        self.blocks
            .iter()
            .filter(|b| matches!(b.node, Block::Principal(_)))
    }
}
