use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use corvid_ir::query::Query;

/// Outcome of a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pass,
    Fail,
    Unresolved,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryStatus::Pass => "PASS",
            QueryStatus::Fail => "FAIL",
            QueryStatus::Unresolved => "UNRESOLVED",
        })
    }
}

/// One attacker substitution in an attack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mutation {
    pub constant: String,
    pub original: String,
    pub substituted: String,
}

/// Whether a query option held in the state that decided the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionResult {
    pub option: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub status: QueryStatus,
    pub summary: Option<String>,
    /// The offending value, rendered in surface syntax.
    pub value: Option<String>,
    /// Principal whose state exhibited the failure.
    pub principal: Option<String>,
    pub mutations: Vec<Mutation>,
    pub options: Vec<OptionResult>,
}

impl QueryResult {
    pub fn unresolved(query: &Query) -> Self {
        Self {
            query: query.to_string(),
            status: QueryStatus::Unresolved,
            summary: None,
            value: None,
            principal: None,
            mutations: Vec::new(),
            options: Vec::new(),
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.query)?;
        if let Some(summary) = &self.summary {
            write!(f, "\n    {summary}")?;
        }
        if !self.mutations.is_empty() {
            f.write_str("\n    attack:")?;
            for m in &self.mutations {
                write!(f, "\n      {}: {} -> {}", m.constant, m.original, m.substituted)?;
            }
        }
        for o in &self.options {
            let verdict = if o.resolved { "holds" } else { "does not hold" };
            write!(f, "\n    option {} {verdict}", o.option)?;
        }
        Ok(())
    }
}

/// Counters describing how much work a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub phases: usize,
    pub stages: usize,
    pub analyses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub file: String,
    pub source_sha256: String,
    pub attacker: String,
    pub queries: Vec<QueryResult>,
    pub stats: SearchStats,
}

impl VerificationReport {
    pub fn all_pass(&self) -> bool {
        self.queries.iter().all(|q| q.status == QueryStatus::Pass)
    }

    pub fn failures(&self) -> impl Iterator<Item = &QueryResult> {
        self.queries.iter().filter(|q| q.status == QueryStatus::Fail)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} attacker)", self.file, self.attacker)?;
        for q in &self.queries {
            writeln!(f, "  {q}")?;
        }
        write!(
            f,
            "  {} phase(s), {} stage(s), {} analyses",
            self.stats.phases, self.stats.stages, self.stats.analyses
        )
    }
}

/// Query results shared between concurrent analyses.
///
/// Once a query fails its result is frozen. `all_resolved` is checked at
/// every spawn point so the search stops early once nothing is left to
/// decide.
#[derive(Debug)]
pub struct VerifyResults {
    results: Mutex<Vec<QueryResult>>,
    all_resolved: AtomicBool,
    analyses: AtomicUsize,
}

impl VerifyResults {
    pub fn new(queries: &[Query]) -> Self {
        Self {
            results: Mutex::new(queries.iter().map(QueryResult::unresolved).collect()),
            all_resolved: AtomicBool::new(queries.is_empty()),
            analyses: AtomicUsize::new(0),
        }
    }

    pub fn all_resolved(&self) -> bool {
        self.all_resolved.load(Ordering::Acquire)
    }

    pub fn is_resolved(&self, index: usize) -> bool {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results
            .get(index)
            .is_some_and(|r| r.status != QueryStatus::Unresolved)
    }

    /// Records a decided result. Returns false if the query was already
    /// decided by another analysis.
    pub fn record(&self, index: usize, result: QueryResult) -> bool {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = results.get_mut(index) else {
            return false;
        };
        if slot.status != QueryStatus::Unresolved {
            return false;
        }
        *slot = result;
        if results.iter().all(|r| r.status != QueryStatus::Unresolved) {
            self.all_resolved.store(true, Ordering::Release);
        }
        true
    }

    pub fn count_analysis(&self) {
        self.analyses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn analyses(&self) -> usize {
        self.analyses.load(Ordering::Relaxed)
    }

    /// Final results. Queries no attack could decide pass.
    pub fn finish(self) -> Vec<QueryResult> {
        let mut results = self
            .results
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        for r in &mut results {
            if r.status == QueryStatus::Unresolved {
                r.status = QueryStatus::Pass;
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_ir::query::QueryKind;
    use corvid_ir::value::{Constant, Declaration, Qualifier};

    fn confidentiality(name: &str) -> Query {
        Query {
            kind: QueryKind::Confidentiality(Constant::new(
                name,
                Declaration::Knows,
                Qualifier::Private,
            )),
            options: vec![],
        }
    }

    fn failed(query: &Query) -> QueryResult {
        QueryResult {
            status: QueryStatus::Fail,
            summary: Some("known".into()),
            ..QueryResult::unresolved(query)
        }
    }

    #[test]
    fn first_failure_wins() {
        let queries = [confidentiality("a")];
        let results = VerifyResults::new(&queries);
        assert!(results.record(0, failed(&queries[0])));
        assert!(!results.record(0, failed(&queries[0])));
        assert!(results.all_resolved());
    }

    #[test]
    fn unresolved_queries_finish_as_pass() {
        let queries = [confidentiality("a"), confidentiality("b")];
        let results = VerifyResults::new(&queries);
        results.record(1, failed(&queries[1]));
        assert!(!results.all_resolved());
        let finished = results.finish();
        assert_eq!(finished[0].status, QueryStatus::Pass);
        assert_eq!(finished[1].status, QueryStatus::Fail);
    }

    #[test]
    fn report_renders_attack_trace() {
        let query = confidentiality("m");
        let mut result = failed(&query);
        result.mutations.push(Mutation {
            constant: "ga".into(),
            original: "G^a".into(),
            substituted: "G^nil".into(),
        });
        let text = result.to_string();
        assert!(text.starts_with("FAIL confidentiality? m"));
        assert!(text.contains("ga: G^a -> G^nil"));
    }

    #[test]
    fn status_serializes_in_snake_case() {
        let json = serde_json::to_string(&QueryStatus::Unresolved).expect("serializes");
        assert_eq!(json, "\"unresolved\"");
    }
}
