//! Query scoping across mission and run boundaries.
//!
//! A [`Query`] is a plain value handed to the query layer. Its
//! [`MissionScope`] bounds which writes a read may see: only the current
//! run's, every run of the same mission, or everything. `all` is the default
//! so that callers written before scoping existed keep their behavior.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of results.
pub const DEFAULT_TOP_K: u32 = 10;

/// Default traversal depth.
pub const DEFAULT_MAX_HOPS: u32 = 3;

/// Largest accepted traversal depth.
pub const MAX_HOPS_LIMIT: u32 = 10;

/// How far a knowledge-graph read reaches across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MissionScope {
    /// Only the invoking run's own writes.
    CurrentRun,
    /// Every run under the same named mission.
    SameMission,
    /// Unscoped.
    #[default]
    All,
}

impl MissionScope {
    pub const ALL: [MissionScope; 3] = [
        MissionScope::CurrentRun,
        MissionScope::SameMission,
        MissionScope::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MissionScope::CurrentRun => "current_run",
            MissionScope::SameMission => "same_mission",
            MissionScope::All => "all",
        }
    }
}

impl fmt::Display for MissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionScope {
    type Err = ScopeError;

    /// Parses a scope literal. The empty string means "unset" and yields `All`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(MissionScope::All),
            "current_run" => Ok(MissionScope::CurrentRun),
            "same_mission" => Ok(MissionScope::SameMission),
            other => Err(ScopeError::UnknownScope {
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for MissionScope {
    type Error = ScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MissionScope> for String {
    fn from(scope: MissionScope) -> Self {
        scope.as_str().to_string()
    }
}

/// A malformed [`Query`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScopeError {
    #[error("invalid mission scope '{value}': expected current_run, same_mission or all")]
    UnknownScope { value: String },

    #[error("mission scope same_mission requires a mission name")]
    MissingMissionName,

    #[error("run number must be a positive integer, got {run_number}")]
    NonPositiveRunNumber { run_number: i64 },

    #[error("mission scope current_run requires a run number")]
    MissingRunContext,

    #[error("top_k must be at least 1, got {top_k}")]
    InvalidTopK { top_k: u32 },

    #[error("max_hops must be at most {max}, got {max_hops}", max = MAX_HOPS_LIMIT)]
    InvalidMaxHops { max_hops: u32 },

    #[error("min_score must be between 0.0 and 1.0, got {min_score}")]
    InvalidMinScore { min_score: f64 },
}

/// A knowledge-graph read request as seen by the integrity layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub text: String,
    pub node_types: Vec<String>,
    pub top_k: u32,
    pub max_hops: u32,
    pub min_score: f64,
    pub mission_scope: MissionScope,
    pub mission_name: Option<String>,
    /// Explicit run filter; must be positive when present.
    pub run_number: Option<i64>,
    pub include_run_metadata: bool,
}

impl Default for Query {
    fn default() -> Self {
        Query {
            text: String::new(),
            node_types: Vec::new(),
            top_k: DEFAULT_TOP_K,
            max_hops: DEFAULT_MAX_HOPS,
            min_score: 0.0,
            mission_scope: MissionScope::All,
            mission_name: None,
            run_number: None,
            include_run_metadata: false,
        }
    }
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Query {
            text: text.into(),
            ..Query::default()
        }
    }

    pub fn with_mission_scope(mut self, scope: MissionScope) -> Self {
        self.mission_scope = scope;
        self
    }

    pub fn with_mission_name(mut self, name: impl Into<String>) -> Self {
        self.mission_name = Some(name.into());
        self
    }

    pub fn with_run_number(mut self, run_number: i64) -> Self {
        self.run_number = Some(run_number);
        self
    }

    pub fn with_run_metadata(mut self, include: bool) -> Self {
        self.include_run_metadata = include;
        self
    }

    pub fn with_node_types<I, S>(mut self, node_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_types = node_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// The mission name if it is present and not blank.
    pub fn mission_name(&self) -> Option<&str> {
        self.mission_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Checks the scope rules and the retrieval bounds.
    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.mission_scope == MissionScope::SameMission && self.mission_name().is_none() {
            return Err(ScopeError::MissingMissionName);
        }
        if let Some(run_number) = self.run_number {
            if run_number <= 0 {
                return Err(ScopeError::NonPositiveRunNumber { run_number });
            }
        }
        if self.top_k == 0 {
            return Err(ScopeError::InvalidTopK { top_k: self.top_k });
        }
        if self.max_hops > MAX_HOPS_LIMIT {
            return Err(ScopeError::InvalidMaxHops {
                max_hops: self.max_hops,
            });
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ScopeError::InvalidMinScore {
                min_score: self.min_score,
            });
        }
        Ok(())
    }

    /// Resolves the scope against the invoking run into concrete bounds.
    ///
    /// An explicit `run_number` on the query takes precedence over the run in
    /// `context`; an explicit `mission_name` over the context mission.
    pub fn resolve(&self, context: &RunContext) -> Result<ScopeFilter, ScopeError> {
        self.validate()?;
        let mission_name = self
            .mission_name()
            .map(str::to_string)
            .or_else(|| context.mission_name.clone());

        match self.mission_scope {
            MissionScope::All => Ok(ScopeFilter::Unbounded),
            MissionScope::SameMission => mission_name
                .map(|mission_name| ScopeFilter::Mission { mission_name })
                .ok_or(ScopeError::MissingMissionName),
            MissionScope::CurrentRun => {
                let run_number = self
                    .run_number
                    .or(context.run_number)
                    .ok_or(ScopeError::MissingRunContext)?;
                if run_number <= 0 {
                    return Err(ScopeError::NonPositiveRunNumber { run_number });
                }
                Ok(ScopeFilter::Run {
                    mission_name,
                    run_number,
                })
            }
        }
    }
}

/// The run a query is issued from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub mission_name: Option<String>,
    pub run_number: Option<i64>,
}

impl RunContext {
    pub fn new(mission_name: impl Into<String>, run_number: i64) -> Self {
        RunContext {
            mission_name: Some(mission_name.into()),
            run_number: Some(run_number),
        }
    }
}

/// Concrete read bounds produced by [`Query::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeFilter {
    Run {
        mission_name: Option<String>,
        run_number: i64,
    },
    Mission {
        mission_name: String,
    },
    Unbounded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_is_all() {
        assert_eq!(MissionScope::default(), MissionScope::All);
        assert_eq!(Query::default().mission_scope, MissionScope::All);
        assert!(Query::default().validate().is_ok());
    }

    #[test]
    fn empty_literal_means_all() {
        assert_eq!("".parse::<MissionScope>().unwrap(), MissionScope::All);
        let q: Query = serde_json::from_str(r#"{"mission_scope": ""}"#).unwrap();
        assert_eq!(q.mission_scope, MissionScope::All);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn unknown_literal_is_rejected() {
        let err = "everything".parse::<MissionScope>().unwrap_err();
        assert_eq!(
            err,
            ScopeError::UnknownScope {
                value: "everything".into()
            }
        );
        assert!(serde_json::from_str::<Query>(r#"{"mission_scope": "galaxy"}"#).is_err());
    }

    #[test]
    fn literals_roundtrip() {
        for scope in MissionScope::ALL {
            assert_eq!(scope.as_str().parse::<MissionScope>().unwrap(), scope);
            let json = serde_json::to_string(&scope).unwrap();
            assert_eq!(json, format!("\"{}\"", scope));
        }
    }

    #[test]
    fn same_mission_needs_a_name() {
        let q = Query::new("creds").with_mission_scope(MissionScope::SameMission);
        assert_eq!(q.validate(), Err(ScopeError::MissingMissionName));

        let blank = q.clone().with_mission_name("   ");
        assert_eq!(blank.validate(), Err(ScopeError::MissingMissionName));

        let named = q.with_mission_name("op-nightfall");
        assert!(named.validate().is_ok());
    }

    #[test]
    fn run_number_must_be_positive() {
        let zero = Query::new("x").with_run_number(0);
        assert_eq!(
            zero.validate(),
            Err(ScopeError::NonPositiveRunNumber { run_number: 0 })
        );
        assert!(Query::new("x").with_run_number(-4).validate().is_err());
        assert!(Query::new("x").with_run_number(1).validate().is_ok());
    }

    #[test]
    fn retrieval_bounds() {
        assert!(Query::new("x").with_top_k(0).validate().is_err());
        assert!(Query::new("x").with_max_hops(MAX_HOPS_LIMIT + 1).validate().is_err());
        assert!(Query::new("x").with_max_hops(MAX_HOPS_LIMIT).validate().is_ok());
        assert!(Query::new("x").with_min_score(1.5).validate().is_err());
        assert!(Query::new("x").with_min_score(-0.1).validate().is_err());
        assert!(Query::new("x").with_min_score(1.0).validate().is_ok());
    }

    #[test]
    fn resolve_current_run_uses_context() {
        let ctx = RunContext::new("op-nightfall", 4);
        let q = Query::new("x").with_mission_scope(MissionScope::CurrentRun);
        assert_eq!(
            q.resolve(&ctx).unwrap(),
            ScopeFilter::Run {
                mission_name: Some("op-nightfall".into()),
                run_number: 4
            }
        );

        let pinned = q.clone().with_run_number(2);
        assert_eq!(
            pinned.resolve(&ctx).unwrap(),
            ScopeFilter::Run {
                mission_name: Some("op-nightfall".into()),
                run_number: 2
            }
        );

        assert_eq!(
            q.resolve(&RunContext::default()),
            Err(ScopeError::MissingRunContext)
        );
    }

    #[test]
    fn resolve_same_mission_and_all() {
        let ctx = RunContext::new("op-nightfall", 4);
        let q = Query::new("x")
            .with_mission_scope(MissionScope::SameMission)
            .with_mission_name("op-dawn");
        assert_eq!(
            q.resolve(&ctx).unwrap(),
            ScopeFilter::Mission {
                mission_name: "op-dawn".into()
            }
        );
        assert_eq!(Query::new("x").resolve(&ctx).unwrap(), ScopeFilter::Unbounded);
    }

    #[test]
    fn query_serializes_with_scope_literal() {
        let q = Query::new("x")
            .with_mission_scope(MissionScope::SameMission)
            .with_mission_name("m")
            .with_run_metadata(true);
        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(value["mission_scope"], "same_mission");
        assert_eq!(value["include_run_metadata"], true);
        let back: Query = serde_json::from_value(value).unwrap();
        assert_eq!(back, q);
    }
}
