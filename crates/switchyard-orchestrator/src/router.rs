use crate::triggers::TriggerTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use switchyard_core::{Catalog, SwitchyardResult};

/// The trigger stage that produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStage {
    Glob,
    Keyword,
    Pattern,
    /// Nothing matched; fall back to selection and decomposition.
    Miss,
}

impl fmt::Display for RouteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStage::Glob => write!(f, "glob"),
            RouteStage::Keyword => write!(f, "keyword"),
            RouteStage::Pattern => write!(f, "pattern"),
            RouteStage::Miss => write!(f, "miss"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub stage: RouteStage,
    pub candidates: Vec<String>,
}

impl RouteOutcome {
    fn miss() -> Self {
        Self {
            stage: RouteStage::Miss,
            candidates: Vec::new(),
        }
    }

    /// True when no stage matched.
    pub fn is_miss(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// One path matched by one glob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatch {
    pub path: String,
    pub pattern: String,
    pub worker_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRouteOutcome {
    pub matches: Vec<FileMatch>,
    pub candidates: Vec<String>,
}

/// Deterministic staged trigger matching.
///
/// Stages run in a fixed order (file globs, literal keywords, regex patterns)
/// and the first stage with any match decides. The router holds no mutable
/// state, so the same input always yields the same candidates in the same
/// order.
#[derive(Debug, Clone)]
pub struct Router {
    table: Arc<TriggerTable>,
}

impl Router {
    pub fn new(table: Arc<TriggerTable>) -> Self {
        Self { table }
    }

    pub fn from_catalog(catalog: &Catalog) -> SwitchyardResult<Self> {
        Ok(Self::new(Arc::new(TriggerTable::compile(catalog)?)))
    }

    pub fn table(&self) -> &TriggerTable {
        &self.table
    }

    /// Route free text. Path-like tokens in the text feed the glob stage.
    pub fn route(&self, text: &str) -> RouteOutcome {
        let paths = path_tokens(text);
        self.route_request(text, &paths)
    }

    /// Route free text against an explicit set of target paths.
    pub fn route_request<S: AsRef<str>>(&self, text: &str, paths: &[S]) -> RouteOutcome {
        let by_glob = self.route_files(paths);
        if !by_glob.candidates.is_empty() {
            return RouteOutcome {
                stage: RouteStage::Glob,
                candidates: by_glob.candidates,
            };
        }

        let lower = text.to_lowercase();
        let mut candidates = Vec::new();
        for entry in self.table.keywords() {
            if lower.contains(&entry.keyword) {
                for id in &entry.worker_ids {
                    push_unique(&mut candidates, id);
                }
            }
        }
        if !candidates.is_empty() {
            return RouteOutcome {
                stage: RouteStage::Keyword,
                candidates,
            };
        }

        for pattern in self.table.patterns() {
            if pattern.regex.is_match(text) {
                push_unique(&mut candidates, &pattern.worker_id);
            }
        }
        if !candidates.is_empty() {
            return RouteOutcome {
                stage: RouteStage::Pattern,
                candidates,
            };
        }

        tracing::debug!("No trigger matched");
        RouteOutcome::miss()
    }

    /// Match each path against every glob, in path order then catalog order.
    pub fn route_files<S: AsRef<str>>(&self, paths: &[S]) -> FileRouteOutcome {
        let mut outcome = FileRouteOutcome::default();

        for path in paths {
            let path = path.as_ref();
            for glob in self.table.globs() {
                if !glob.pattern.matches(path) {
                    continue;
                }
                push_unique(&mut outcome.candidates, &glob.worker_id);
                match outcome
                    .matches
                    .iter_mut()
                    .find(|m| m.path == path && m.pattern == glob.raw)
                {
                    Some(existing) => push_unique(&mut existing.worker_ids, &glob.worker_id),
                    None => outcome.matches.push(FileMatch {
                        path: path.to_string(),
                        pattern: glob.raw.clone(),
                        worker_ids: vec![glob.worker_id.clone()],
                    }),
                }
            }
        }

        outcome
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// Tokens that look like file paths: contain `/` or end in a short extension.
fn path_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| "\"'`()[]{},;:!?".contains(c)))
        .map(|t| t.trim_end_matches('.'))
        .filter(|t| !t.is_empty() && !t.contains("://"))
        .filter(|t| t.contains('/') || has_extension(t))
        .map(str::to_string)
        .collect()
}

fn has_extension(token: &str) -> bool {
    match token.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=8).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}
