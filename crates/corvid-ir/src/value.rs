//! The symbolic term algebra: constants, primitives, and equations.

use std::fmt;

pub use corvid_dsl::ast::Qualifier;

use crate::primitive::PrimitiveId;

/// Index of a principal in the knowledge map's principal table.
///
/// Index zero is reserved for the attacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PrincipalId(pub usize);

impl PrincipalId {
    pub const ATTACKER: PrincipalId = PrincipalId(0);

    pub fn is_attacker(self) -> bool {
        self == Self::ATTACKER
    }
}

/// How a constant entered the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Declaration {
    Knows,
    Generates,
    Leaks,
    Assignment,
}

/// A named symbolic atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub name: String,
    pub guard: bool,
    pub fresh: bool,
    pub leaked: bool,
    pub declaration: Declaration,
    pub qualifier: Qualifier,
}

pub const G: &str = "g";
pub const NIL: &str = "nil";

impl Constant {
    pub fn new(name: impl Into<String>, declaration: Declaration, qualifier: Qualifier) -> Self {
        Self {
            name: name.into(),
            guard: false,
            fresh: false,
            leaked: false,
            declaration,
            qualifier,
        }
    }

    /// The generator `g`.
    pub fn g() -> Self {
        Self::new(G, Declaration::Knows, Qualifier::Public)
    }

    pub fn nil() -> Self {
        Self::new(NIL, Declaration::Knows, Qualifier::Public)
    }

    pub fn is_g_or_nil(&self) -> bool {
        self.name == G || self.name == NIL
    }
}

/// A cryptographic operation applied to argument values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Primitive {
    pub id: PrimitiveId,
    pub arguments: Vec<Value>,
    /// Selected output for multi-output primitives.
    pub output: usize,
    /// Failure to rewrite aborts the branch.
    pub check: bool,
}

impl Primitive {
    pub fn new(id: PrimitiveId, arguments: Vec<Value>) -> Self {
        Self {
            id,
            arguments,
            output: 0,
            check: false,
        }
    }

    pub fn checked(mut self) -> Self {
        self.check = true;
        self
    }

    pub fn with_output(mut self, output: usize) -> Self {
        self.output = output;
        self
    }
}

/// Repeated exponentiation `values[0]^values[1]^...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Equation {
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Constant(Constant),
    Primitive(Primitive),
    Equation(Equation),
}

impl From<Constant> for Value {
    fn from(c: Constant) -> Self {
        Value::Constant(c)
    }
}

impl From<Primitive> for Value {
    fn from(p: Primitive) -> Self {
        Value::Primitive(p)
    }
}

impl From<Equation> for Value {
    fn from(e: Equation) -> Self {
        Value::Equation(e)
    }
}

impl Value {
    pub fn g() -> Self {
        Value::Constant(Constant::g())
    }

    pub fn nil() -> Self {
        Value::Constant(Constant::nil())
    }

    /// `G^nil`
    pub fn g_nil() -> Self {
        Value::Equation(Equation {
            values: vec![Value::g(), Value::nil()],
        })
    }

    /// `G^nil^nil`
    pub fn g_nil_nil() -> Self {
        Value::Equation(Equation {
            values: vec![Value::g(), Value::nil(), Value::nil()],
        })
    }

    /// Builds `G^v_1^...^v_n`.
    pub fn exp(exponents: impl IntoIterator<Item = Value>) -> Self {
        let mut values = vec![Value::g()];
        values.extend(exponents);
        Value::Equation(Equation { values })
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Value::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_equation(&self) -> Option<&Equation> {
        match self {
            Value::Equation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_g_or_nil(&self) -> bool {
        matches!(self, Value::Constant(c) if c.is_g_or_nil())
    }

    pub fn is_g(&self) -> bool {
        matches!(self, Value::Constant(c) if c.name == G)
    }

    /// Structural equivalence.
    ///
    /// Constants compare by name. Primitives compare identifier, arity, and
    /// arguments, and the output selector only when `consider_output` is set.
    /// Equations treat the two exponents of a three-term chain as commutative.
    pub fn equivalent(&self, other: &Value, consider_output: bool) -> bool {
        match (self, other) {
            (Value::Constant(a), Value::Constant(b)) => a.name == b.name,
            (Value::Primitive(a), Value::Primitive(b)) => {
                primitives_equivalent(a, b, consider_output)
            }
            (Value::Equation(a), Value::Equation(b)) => equations_equivalent(a, b),
            _ => false,
        }
    }

    /// Every leaf constant reachable from this value, in left-to-right order.
    pub fn constants(&self) -> Vec<&Constant> {
        let mut out = Vec::new();
        self.collect_constants(&mut out);
        out
    }

    fn collect_constants<'a>(&'a self, out: &mut Vec<&'a Constant>) {
        match self {
            Value::Constant(c) => out.push(c),
            Value::Primitive(p) => p.arguments.iter().for_each(|a| a.collect_constants(out)),
            Value::Equation(e) => e.values.iter().for_each(|v| v.collect_constants(out)),
        }
    }

    /// True when a constant named `name` appears anywhere inside this value.
    pub fn contains_constant(&self, name: &str) -> bool {
        match self {
            Value::Constant(c) => c.name == name,
            Value::Primitive(p) => p.arguments.iter().any(|a| a.contains_constant(name)),
            Value::Equation(e) => e.values.iter().any(|v| v.contains_constant(name)),
        }
    }
}

/// Primitive equivalence; see [`Value::equivalent`].
pub fn primitives_equivalent(a: &Primitive, b: &Primitive, consider_output: bool) -> bool {
    if a.id != b.id || a.arguments.len() != b.arguments.len() {
        return false;
    }
    if consider_output && a.output != b.output {
        return false;
    }
    a.arguments
        .iter()
        .zip(&b.arguments)
        .all(|(x, y)| x.equivalent(y, true))
}

fn equations_equivalent(a: &Equation, b: &Equation) -> bool {
    let (x, y) = (&a.values, &b.values);
    if x.len() != y.len() {
        return false;
    }
    let eq = |i: usize, j: usize| x[i].equivalent(&y[j], true);
    match x.len() {
        0 => true,
        1 => eq(0, 0),
        2 => eq(0, 0) && eq(1, 1),
        n => {
            eq(0, 0)
                && ((eq(1, 1) && eq(2, 2)) || (eq(1, 2) && eq(2, 1)))
                && (3..n).all(|i| eq(i, i))
        }
    }
}

/// Position of the first value in `values` equivalent to `v`.
pub fn position_equivalent(values: &[Value], v: &Value) -> Option<usize> {
    values.iter().position(|x| x.equivalent(v, true))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(c) => f.write_str(&c.name),
            Value::Primitive(p) => {
                write!(f, "{}(", p.id.name())?;
                for (i, a) in p.arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")?;
                if p.check {
                    f.write_str("?")?;
                }
                Ok(())
            }
            Value::Equation(e) => {
                for (i, v) in e.values.iter().enumerate() {
                    if i > 0 {
                        f.write_str("^")?;
                    }
                    match v {
                        Value::Constant(c) if c.name == G => f.write_str("G")?,
                        other => write!(f, "{other}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(name: &str) -> Value {
        Value::Constant(Constant::new(name, Declaration::Knows, Qualifier::Private))
    }

    #[test]
    fn constants_compare_by_name_only() {
        let mut fresh = Constant::new("a", Declaration::Generates, Qualifier::Private);
        fresh.fresh = true;
        assert!(Value::Constant(fresh).equivalent(&c("a"), true));
        assert!(!c("a").equivalent(&c("b"), true));
    }

    #[test]
    fn three_term_equations_commute() {
        let ab = Value::exp([c("a"), c("b")]);
        let ba = Value::exp([c("b"), c("a")]);
        assert!(ab.equivalent(&ba, true));
        assert!(ba.equivalent(&ab, true));
    }

    #[test]
    fn two_term_equations_with_different_exponents_differ() {
        assert!(!Value::exp([c("a")]).equivalent(&Value::exp([c("b")]), true));
    }

    #[test]
    fn equations_of_different_length_differ() {
        assert!(!Value::exp([c("a")]).equivalent(&Value::exp([c("a"), c("b")]), true));
    }

    #[test]
    fn output_selector_only_matters_when_requested() {
        let p0 = Value::Primitive(Primitive::new(PrimitiveId::Hkdf, vec![c("a"), c("b"), c("c")]));
        let p1 = Value::Primitive(
            Primitive::new(PrimitiveId::Hkdf, vec![c("a"), c("b"), c("c")]).with_output(1),
        );
        assert!(!p0.equivalent(&p1, true));
        assert!(p0.equivalent(&p1, false));
    }

    #[test]
    fn nested_arguments_always_consider_output() {
        let inner0 = Value::Primitive(Primitive::new(PrimitiveId::Split, vec![c("x")]));
        let inner1 =
            Value::Primitive(Primitive::new(PrimitiveId::Split, vec![c("x")]).with_output(1));
        let outer0 = Value::Primitive(Primitive::new(PrimitiveId::Hash, vec![inner0]));
        let outer1 = Value::Primitive(Primitive::new(PrimitiveId::Hash, vec![inner1]));
        assert!(!outer0.equivalent(&outer1, false));
    }

    #[test]
    fn constants_are_collected_in_order() {
        let v = Value::Primitive(Primitive::new(
            PrimitiveId::Enc,
            vec![Value::exp([c("a"), c("b")]), c("m")],
        ));
        let names: Vec<_> = v.constants().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["g", "a", "b", "m"]);
        assert!(v.contains_constant("b"));
        assert!(!v.contains_constant("k"));
    }

    #[test]
    fn display_uses_surface_syntax() {
        let v = Value::Primitive(
            Primitive::new(PrimitiveId::AeadDec, vec![Value::exp([c("a")]), c("e"), c("ad")])
                .checked(),
        );
        assert_eq!(v.to_string(), "AEAD_DEC(G^a, e, ad)?");
        assert_eq!(Value::g_nil_nil().to_string(), "G^nil^nil");
    }
}
