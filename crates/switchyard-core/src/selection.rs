use crate::plan::AgentPick;
use serde::{Deserialize, Serialize};

/// One chosen worker with its score and the reasons it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub worker_id: String,
    pub score: f64,
    pub reasons: Vec<String>,
}

impl Pick {
    pub fn new(worker_id: impl Into<String>, score: f64) -> Self {
        Self {
            worker_id: worker_id.into(),
            score,
            reasons: Vec::new(),
        }
    }

    /// Add a reason tag unless it is already present.
    pub fn add_reason(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }
}

/// The ordered set of workers chosen for one goal. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    picks: Vec<Pick>,
}

impl Selection {
    pub fn new(picks: Vec<Pick>) -> Self {
        Self { picks }
    }

    /// Selection from bare ids, e.g. router candidates.
    pub fn from_ids<I, S>(ids: I, reason: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let picks = ids
            .into_iter()
            .map(|id| {
                let mut pick = Pick::new(id, 1.0);
                pick.add_reason(reason);
                pick
            })
            .collect();
        Self { picks }
    }

    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn ids(&self) -> Vec<&str> {
        self.picks.iter().map(|p| p.worker_id.as_str()).collect()
    }

    pub fn contains(&self, worker_id: &str) -> bool {
        self.picks.iter().any(|p| p.worker_id == worker_id)
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    /// The `agents` section of a plan document.
    pub fn agents(&self) -> Vec<AgentPick> {
        self.picks
            .iter()
            .map(|p| AgentPick {
                id: p.worker_id.clone(),
                reason: p.reasons.join(", "),
                weight: Some(p.score),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_are_deduplicated() {
        let mut pick = Pick::new("backend", 1.5);
        pick.add_reason("semantic:api");
        pick.add_reason("semantic:api");
        pick.add_reason("capability:api");
        assert_eq!(pick.reasons, vec!["semantic:api", "capability:api"]);
    }

    #[test]
    fn test_from_ids_preserves_order() {
        let selection = Selection::from_ids(["tester", "backend"], "route:keyword");
        assert_eq!(selection.ids(), vec!["tester", "backend"]);
        assert!(selection.contains("backend"));
        assert!(!selection.contains("architect"));
        let agents = selection.agents();
        assert_eq!(agents[0].reason, "route:keyword");
        assert_eq!(agents[0].weight, Some(1.0));
    }
}
