//! Built-in cryptographic primitives and their algebraic rules.
//!
//! Every primitive is described by a static [`PrimitiveSpec`]. The rules are
//! fixed; models cannot add new ones.

use crate::value::{primitives_equivalent, Primitive, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveId {
    Assert,
    Concat,
    Split,
    PwHash,
    Hash,
    Hkdf,
    AeadEnc,
    AeadDec,
    Enc,
    Dec,
    Mac,
    Sign,
    SignVerif,
    PkeEnc,
    PkeDec,
    ShamirSplit,
    ShamirJoin,
    RingSign,
    RingSignVerif,
    Blind,
    Unblind,
}

impl PrimitiveId {
    pub const ALL: [PrimitiveId; 21] = [
        PrimitiveId::Assert,
        PrimitiveId::Concat,
        PrimitiveId::Split,
        PrimitiveId::PwHash,
        PrimitiveId::Hash,
        PrimitiveId::Hkdf,
        PrimitiveId::AeadEnc,
        PrimitiveId::AeadDec,
        PrimitiveId::Enc,
        PrimitiveId::Dec,
        PrimitiveId::Mac,
        PrimitiveId::Sign,
        PrimitiveId::SignVerif,
        PrimitiveId::PkeEnc,
        PrimitiveId::PkeDec,
        PrimitiveId::ShamirSplit,
        PrimitiveId::ShamirJoin,
        PrimitiveId::RingSign,
        PrimitiveId::RingSignVerif,
        PrimitiveId::Blind,
        PrimitiveId::Unblind,
    ];

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Looks up a primitive by its upper-case surface name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    pub fn spec(self) -> &'static PrimitiveSpec {
        match self {
            PrimitiveId::Assert => &ASSERT,
            PrimitiveId::Concat => &CONCAT,
            PrimitiveId::Split => &SPLIT,
            PrimitiveId::PwHash => &PW_HASH,
            PrimitiveId::Hash => &HASH,
            PrimitiveId::Hkdf => &HKDF,
            PrimitiveId::AeadEnc => &AEAD_ENC,
            PrimitiveId::AeadDec => &AEAD_DEC,
            PrimitiveId::Enc => &ENC,
            PrimitiveId::Dec => &DEC,
            PrimitiveId::Mac => &MAC,
            PrimitiveId::Sign => &SIGN,
            PrimitiveId::SignVerif => &SIGNVERIF,
            PrimitiveId::PkeEnc => &PKE_ENC,
            PrimitiveId::PkeDec => &PKE_DEC,
            PrimitiveId::ShamirSplit => &SHAMIR_SPLIT,
            PrimitiveId::ShamirJoin => &SHAMIR_JOIN,
            PrimitiveId::RingSign => &RINGSIGN,
            PrimitiveId::RingSignVerif => &RINGSIGNVERIF,
            PrimitiveId::Blind => &BLIND,
            PrimitiveId::Unblind => &UNBLIND,
        }
    }
}

/// Maps an argument of the primitive being examined onto the form it must
/// take to match. Arguments: the value, its argument position, and the
/// position it is compared against. `None` means no match is possible.
pub type Filter = fn(&Value, usize, usize) -> Option<Value>;

/// Rewrite function for core primitives: `(applied, outputs)`.
pub type CoreRule = fn(&Primitive) -> (bool, Vec<Value>);

/// Attacker learns `reveal` once it knows every `given` argument.
pub struct DecomposeRule {
    pub given: &'static [usize],
    pub reveal: usize,
    pub filter: Filter,
}

/// Attacker learns `reveal` once it holds outputs forming a `given` set.
pub struct RecomposeRule {
    pub given: &'static [&'static [usize]],
    pub reveal: usize,
}

/// `self(.., from(..), ..)` simplifies when the matching arguments agree.
pub struct RewriteRule {
    pub from: PrimitiveId,
    /// Position of the nested `from` primitive among this primitive's arguments.
    pub argument: usize,
    /// `(own argument, candidate positions in from)` pairs that must match.
    pub matching: &'static [(usize, &'static [usize])],
    pub filter: Filter,
    pub to: fn(&Primitive, &Primitive) -> Option<Value>,
}

/// All arguments are outputs of one `from` primitive forming a `given` set.
pub struct RebuildRule {
    pub from: PrimitiveId,
    pub given: &'static [&'static [usize]],
    pub reveal: usize,
}

pub struct PrimitiveSpec {
    pub id: PrimitiveId,
    pub name: &'static str,
    pub arity: (usize, usize),
    pub outputs: (usize, usize),
    pub core: bool,
    pub core_rule: Option<CoreRule>,
    pub decompose: Option<DecomposeRule>,
    pub recompose: Option<RecomposeRule>,
    pub rewrite: Option<RewriteRule>,
    pub rebuild: Option<RebuildRule>,
    pub checkable: bool,
    pub injectable: bool,
    /// Injecting candidates for this primitive multiplies the search space.
    pub explosive: bool,
    pub password_hashing: &'static [usize],
}

impl PrimitiveSpec {
    /// True when rewriting can change a value built from this primitive.
    pub fn has_rule(&self) -> bool {
        self.core_rule.is_some() || self.rewrite.is_some()
    }

    pub fn accepts_arity(&self, n: usize) -> bool {
        (self.arity.0..=self.arity.1).contains(&n)
    }

    pub fn accepts_outputs(&self, n: usize) -> bool {
        (self.outputs.0..=self.outputs.1).contains(&n)
    }
}

fn identity(v: &Value, _: usize, _: usize) -> Option<Value> {
    Some(v.clone())
}

/// `G^k` becomes `k`.
fn exponent(v: &Value) -> Option<Value> {
    match v {
        Value::Equation(e) if e.values.len() == 2 && e.values[0].is_g() => {
            Some(e.values[1].clone())
        }
        _ => None,
    }
}

fn public_key_exponent(v: &Value, i: usize, _: usize) -> Option<Value> {
    if i == 0 {
        exponent(v)
    } else {
        Some(v.clone())
    }
}

fn private_key_to_public(v: &Value, i: usize, _: usize) -> Option<Value> {
    if i == 0 {
        Some(Value::exp([v.clone()]))
    } else {
        Some(v.clone())
    }
}

/// The ring signer's own key is private; the other ring members are public.
fn ring_member_key(v: &Value, _: usize, target: usize) -> Option<Value> {
    if target == 0 {
        exponent(v)
    } else {
        Some(v.clone())
    }
}

fn assert_rule(p: &Primitive) -> (bool, Vec<Value>) {
    match p.arguments.as_slice() {
        [a, b] if a.equivalent(b, true) => (true, vec![Value::nil()]),
        _ => (false, vec![Value::Primitive(p.clone())]),
    }
}

fn split_rule(p: &Primitive) -> (bool, Vec<Value>) {
    match p.arguments.first() {
        Some(Value::Primitive(c)) if c.id == PrimitiveId::Concat => (true, c.arguments.clone()),
        _ => (false, vec![Value::Primitive(p.clone())]),
    }
}

fn reveal_second(from: &Primitive, _: &Primitive) -> Option<Value> {
    from.arguments.get(1).cloned()
}

fn to_nil(_: &Primitive, _: &Primitive) -> Option<Value> {
    Some(Value::nil())
}

/// `UNBLIND(k, m, SIGN(a, BLIND(k, m)))` becomes `SIGN(a, m)`.
fn unblind(from: &Primitive, own: &Primitive) -> Option<Value> {
    let blinded = from.arguments.get(1)?.as_primitive()?;
    if blinded.id != PrimitiveId::Blind {
        return None;
    }
    let (k, m) = (own.arguments.first()?, own.arguments.get(1)?);
    if !blinded.arguments.first()?.equivalent(k, true)
        || !blinded.arguments.get(1)?.equivalent(m, true)
    {
        return None;
    }
    Some(Value::Primitive(Primitive::new(
        PrimitiveId::Sign,
        vec![from.arguments.first()?.clone(), m.clone()],
    )))
}

const fn plain(id: PrimitiveId, name: &'static str, arity: (usize, usize)) -> PrimitiveSpec {
    PrimitiveSpec {
        id,
        name,
        arity,
        outputs: (1, 1),
        core: false,
        core_rule: None,
        decompose: None,
        recompose: None,
        rewrite: None,
        rebuild: None,
        checkable: false,
        injectable: true,
        explosive: false,
        password_hashing: &[],
    }
}

static ASSERT: PrimitiveSpec = PrimitiveSpec {
    core: true,
    core_rule: Some(assert_rule),
    checkable: true,
    injectable: false,
    ..plain(PrimitiveId::Assert, "ASSERT", (2, 2))
};

static CONCAT: PrimitiveSpec = PrimitiveSpec {
    core: true,
    ..plain(PrimitiveId::Concat, "CONCAT", (2, 5))
};

static SPLIT: PrimitiveSpec = PrimitiveSpec {
    outputs: (1, 5),
    core: true,
    core_rule: Some(split_rule),
    checkable: true,
    injectable: false,
    ..plain(PrimitiveId::Split, "SPLIT", (1, 1))
};

static PW_HASH: PrimitiveSpec = PrimitiveSpec {
    injectable: false,
    password_hashing: &[0, 1, 2, 3, 4],
    ..plain(PrimitiveId::PwHash, "PW_HASH", (1, 5))
};

static HASH: PrimitiveSpec = plain(PrimitiveId::Hash, "HASH", (1, 5));

static HKDF: PrimitiveSpec = PrimitiveSpec {
    outputs: (1, 5),
    explosive: true,
    ..plain(PrimitiveId::Hkdf, "HKDF", (3, 3))
};

static AEAD_ENC: PrimitiveSpec = PrimitiveSpec {
    decompose: Some(DecomposeRule {
        given: &[0],
        reveal: 1,
        filter: identity,
    }),
    ..plain(PrimitiveId::AeadEnc, "AEAD_ENC", (3, 3))
};

static AEAD_DEC: PrimitiveSpec = PrimitiveSpec {
    rewrite: Some(RewriteRule {
        from: PrimitiveId::AeadEnc,
        argument: 1,
        matching: &[(0, &[0]), (2, &[2])],
        filter: identity,
        to: reveal_second,
    }),
    checkable: true,
    injectable: false,
    ..plain(PrimitiveId::AeadDec, "AEAD_DEC", (3, 3))
};

static ENC: PrimitiveSpec = PrimitiveSpec {
    decompose: Some(DecomposeRule {
        given: &[0],
        reveal: 1,
        filter: identity,
    }),
    ..plain(PrimitiveId::Enc, "ENC", (2, 2))
};

static DEC: PrimitiveSpec = PrimitiveSpec {
    rewrite: Some(RewriteRule {
        from: PrimitiveId::Enc,
        argument: 1,
        matching: &[(0, &[0])],
        filter: identity,
        to: reveal_second,
    }),
    injectable: false,
    ..plain(PrimitiveId::Dec, "DEC", (2, 2))
};

static MAC: PrimitiveSpec = plain(PrimitiveId::Mac, "MAC", (2, 2));

static SIGN: PrimitiveSpec = plain(PrimitiveId::Sign, "SIGN", (2, 2));

static SIGNVERIF: PrimitiveSpec = PrimitiveSpec {
    rewrite: Some(RewriteRule {
        from: PrimitiveId::Sign,
        argument: 2,
        matching: &[(0, &[0]), (1, &[1])],
        filter: public_key_exponent,
        to: to_nil,
    }),
    checkable: true,
    injectable: false,
    ..plain(PrimitiveId::SignVerif, "SIGNVERIF", (3, 3))
};

static PKE_ENC: PrimitiveSpec = PrimitiveSpec {
    decompose: Some(DecomposeRule {
        given: &[0],
        reveal: 1,
        filter: public_key_exponent,
    }),
    ..plain(PrimitiveId::PkeEnc, "PKE_ENC", (2, 2))
};

static PKE_DEC: PrimitiveSpec = PrimitiveSpec {
    rewrite: Some(RewriteRule {
        from: PrimitiveId::PkeEnc,
        argument: 1,
        matching: &[(0, &[0])],
        filter: private_key_to_public,
        to: reveal_second,
    }),
    injectable: false,
    ..plain(PrimitiveId::PkeDec, "PKE_DEC", (2, 2))
};

static SHAMIR_SPLIT: PrimitiveSpec = PrimitiveSpec {
    outputs: (3, 3),
    recompose: Some(RecomposeRule {
        given: &[&[0, 1], &[0, 2], &[1, 2]],
        reveal: 0,
    }),
    injectable: false,
    ..plain(PrimitiveId::ShamirSplit, "SHAMIR_SPLIT", (1, 1))
};

static SHAMIR_JOIN: PrimitiveSpec = PrimitiveSpec {
    rebuild: Some(RebuildRule {
        from: PrimitiveId::ShamirSplit,
        given: &[&[0, 1], &[1, 0], &[0, 2], &[2, 0], &[1, 2], &[2, 1]],
        reveal: 0,
    }),
    injectable: false,
    ..plain(PrimitiveId::ShamirJoin, "SHAMIR_JOIN", (2, 2))
};

static RINGSIGN: PrimitiveSpec = plain(PrimitiveId::RingSign, "RINGSIGN", (4, 4));

static RINGSIGNVERIF: PrimitiveSpec = PrimitiveSpec {
    rewrite: Some(RewriteRule {
        from: PrimitiveId::RingSign,
        argument: 4,
        matching: &[(0, &[0, 1, 2]), (1, &[0, 1, 2]), (2, &[0, 1, 2]), (3, &[3])],
        filter: ring_member_key,
        to: to_nil,
    }),
    checkable: true,
    injectable: false,
    ..plain(PrimitiveId::RingSignVerif, "RINGSIGNVERIF", (5, 5))
};

static BLIND: PrimitiveSpec = PrimitiveSpec {
    decompose: Some(DecomposeRule {
        given: &[0],
        reveal: 1,
        filter: identity,
    }),
    ..plain(PrimitiveId::Blind, "BLIND", (2, 2))
};

static UNBLIND: PrimitiveSpec = PrimitiveSpec {
    rewrite: Some(RewriteRule {
        from: PrimitiveId::Sign,
        argument: 2,
        matching: &[],
        filter: identity,
        to: unblind,
    }),
    checkable: true,
    injectable: false,
    ..plain(PrimitiveId::Unblind, "UNBLIND", (3, 3))
};

/// Applies the primitive's rewrite rule to an already argument-rewritten
/// primitive. Returns whether a rule applied and the resulting outputs; when
/// nothing applied the single output is the primitive itself.
pub fn possible_to_rewrite(p: &Primitive) -> (bool, Vec<Value>) {
    let spec = p.id.spec();
    if let Some(core) = spec.core_rule {
        return core(p);
    }
    let unchanged = || (false, vec![Value::Primitive(p.clone())]);
    let Some(rule) = &spec.rewrite else {
        return unchanged();
    };
    let Some(Value::Primitive(from)) = p.arguments.get(rule.argument) else {
        return unchanged();
    };
    if from.id != rule.from {
        return unchanged();
    }
    for &(own, candidates) in rule.matching {
        let Some(arg) = p.arguments.get(own) else {
            return unchanged();
        };
        let matched = candidates.iter().any(|&target| {
            let (Some(filtered), Some(theirs)) =
                ((rule.filter)(arg, own, target), from.arguments.get(target))
            else {
                return false;
            };
            filtered.equivalent(theirs, true)
        });
        if !matched {
            return unchanged();
        }
    }
    match (rule.to)(from, p) {
        Some(v) => (true, vec![v]),
        None => unchanged(),
    }
}

/// `SHAMIR_JOIN`-style reconstruction from sibling outputs.
pub fn possible_to_rebuild(p: &Primitive) -> Option<Value> {
    let rule = p.id.spec().rebuild.as_ref()?;
    let first = p.arguments.first()?.as_primitive()?;
    let mut outputs = Vec::with_capacity(p.arguments.len());
    for a in &p.arguments {
        let ap = a.as_primitive()?;
        if ap.id != rule.from || !primitives_equivalent(ap, first, false) {
            return None;
        }
        outputs.push(ap.output);
    }
    rule.given
        .iter()
        .any(|combo| *combo == outputs.as_slice())
        .then(|| first.arguments.get(rule.reveal).cloned())
        .flatten()
}

/// Attacker-side decomposition: if `knows` accepts every given argument,
/// returns the revealed argument and the values that were required.
pub fn possible_to_decompose(
    p: &Primitive,
    knows: impl Fn(&Value) -> bool,
) -> Option<(Value, Vec<Value>)> {
    let rule = p.id.spec().decompose.as_ref()?;
    let mut used = Vec::with_capacity(rule.given.len());
    for &g in rule.given {
        let x = (rule.filter)(p.arguments.get(g)?, g, g)?;
        if !knows(&x) {
            return None;
        }
        used.push(x);
    }
    p.arguments.get(rule.reveal).cloned().map(|r| (r, used))
}

/// Attacker-side recomposition from known outputs of the same primitive.
pub fn possible_to_recompose(p: &Primitive, known: &[Value]) -> Option<Value> {
    let rule = p.id.spec().recompose.as_ref()?;
    let outputs: Vec<usize> = known
        .iter()
        .filter_map(Value::as_primitive)
        .filter(|k| k.id == p.id && primitives_equivalent(k, p, false))
        .map(|k| k.output)
        .collect();
    rule.given
        .iter()
        .any(|combo| combo.iter().all(|o| outputs.contains(o)))
        .then(|| p.arguments.get(rule.reveal).cloned())
        .flatten()
}
