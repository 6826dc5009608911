//! Queries after name resolution against the knowledge map.

use std::fmt;

use crate::value::{Constant, PrincipalId};

/// `sender -> recipient: constants` with principals resolved to ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub sender: PrincipalId,
    pub recipient: PrincipalId,
    pub sender_name: String,
    pub recipient_name: String,
    pub constants: Vec<Constant>,
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: ", self.sender_name, self.recipient_name)?;
        for (i, c) in self.constants.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&c.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Confidentiality(Constant),
    Authentication(MessageRef),
    Freshness(Constant),
    Unlinkability(Vec<Constant>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOption {
    Precondition(MessageRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: QueryKind,
    pub options: Vec<QueryOption>,
}

impl Query {
    pub fn name(&self) -> &'static str {
        match self.kind {
            QueryKind::Confidentiality(_) => "confidentiality",
            QueryKind::Authentication(_) => "authentication",
            QueryKind::Freshness(_) => "freshness",
            QueryKind::Unlinkability(_) => "unlinkability",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}? ", self.name())?;
        match &self.kind {
            QueryKind::Confidentiality(c) | QueryKind::Freshness(c) => f.write_str(&c.name)?,
            QueryKind::Authentication(m) => write!(f, "{m}")?,
            QueryKind::Unlinkability(cs) => {
                let names: Vec<&str> = cs.iter().map(|c| c.name.as_str()).collect();
                f.write_str(&names.join(", "))?;
            }
        }
        for option in &self.options {
            match option {
                QueryOption::Precondition(m) => write!(f, " precondition[{m}]")?,
            }
        }
        Ok(())
    }
}
