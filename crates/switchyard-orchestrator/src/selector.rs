use crate::history::{PerformanceHistory, DEFAULT_WINDOW};
use crate::text::{cosine, distinct_tokens, synonyms_of, tokenize, trigrams};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use switchyard_core::{Catalog, Pick, Selection, Worker};

/// Per-signal multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    #[serde(default = "default_one")]
    pub semantic: f64,
    #[serde(default = "default_one")]
    pub trigram: f64,
    #[serde(default = "default_capability")]
    pub capability: f64,
    #[serde(default = "default_history")]
    pub history: f64,
}

fn default_one() -> f64 {
    1.0
}

fn default_capability() -> f64 {
    0.5
}

fn default_history() -> f64 {
    0.25
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            semantic: default_one(),
            trigram: default_one(),
            capability: default_capability(),
            history: default_history(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_min")]
    pub min: usize,
    #[serde(default = "default_max")]
    pub max: usize,
    /// Trigram similarity below this floor contributes nothing.
    #[serde(default = "default_trigram_floor")]
    pub trigram_floor: f64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub weights: SignalWeights,
    /// Ordered worker ids returned when nothing scores, and used for padding.
    #[serde(default)]
    pub fallback: Vec<String>,
}

fn default_min() -> usize {
    2
}

fn default_max() -> usize {
    5
}

fn default_trigram_floor() -> f64 {
    0.15
}

fn default_history_window() -> usize {
    DEFAULT_WINDOW
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
            trigram_floor: default_trigram_floor(),
            history_window: default_history_window(),
            weights: SignalWeights::default(),
            fallback: Vec::new(),
        }
    }
}

/// Precomputed terms of one worker.
#[derive(Debug)]
struct Profile {
    worker: Arc<Worker>,
    bag: HashSet<String>,
    trigrams: HashMap<String, usize>,
    capabilities: Vec<(String, Vec<String>)>,
}

impl Profile {
    fn build(worker: &Arc<Worker>) -> Self {
        let text = profile_text(worker);
        let capabilities = worker
            .capabilities
            .iter()
            .map(|tag| (tag.to_lowercase(), tokenize(tag)))
            .collect();
        Self {
            worker: Arc::clone(worker),
            bag: tokenize(&text).into_iter().collect(),
            trigrams: trigrams(&text),
            capabilities,
        }
    }
}

fn profile_text(worker: &Worker) -> String {
    let mut parts = vec![worker.id.replace(['-', '_'], " "), worker.name.clone()];
    parts.extend(worker.capabilities.iter().cloned());
    parts.extend(worker.responsibilities.iter().cloned());
    parts.join(" ")
}

/// Ranks catalog workers against a goal.
///
/// Signals (each scaled by its weight and summed): IDF-weighted token overlap
/// with the worker's bag of terms, character-trigram cosine above a floor,
/// capability/synonym hits, and the worker's recent success rate.
pub struct Selector {
    catalog: Arc<Catalog>,
    config: SelectorConfig,
    profiles: Vec<Profile>,
    idf: HashMap<String, f64>,
    history: Option<Arc<PerformanceHistory>>,
}

impl Selector {
    pub fn new(catalog: Arc<Catalog>, config: SelectorConfig) -> Self {
        let profiles: Vec<Profile> = catalog.workers().iter().map(Profile::build).collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for profile in &profiles {
            for term in &profile.bag {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        let n = profiles.len() as f64;
        let idf = df
            .into_iter()
            .map(|(term, count)| (term.to_string(), ((n + 1.0) / (count as f64 + 1.0)).ln() + 1.0))
            .collect();

        Self {
            catalog,
            config,
            profiles,
            idf,
            history: None,
        }
    }

    pub fn with_history(mut self, history: Arc<PerformanceHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Select with the configured bounds.
    pub fn select(&self, goal: &str) -> Selection {
        self.select_bounded(goal, self.config.min, self.config.max)
    }

    /// Between `min` and `max` workers (fewer only if the catalog is smaller than `min`).
    pub fn select_bounded(&self, goal: &str, min: usize, max: usize) -> Selection {
        let max = max.max(1);
        let min = min.min(max).min(self.catalog.len());

        let has_core = self.profiles.iter().any(|p| p.worker.core);
        let goal_tokens = distinct_tokens(goal);
        let goal_trigrams = trigrams(goal);

        let mut picks: Vec<Pick> = self
            .profiles
            .iter()
            .filter(|p| !has_core || p.worker.core)
            .map(|p| self.score(p, &goal_tokens, &goal_trigrams))
            .filter(|pick| pick.score > 0.0)
            .collect();

        picks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.worker_id.cmp(&b.worker_id))
        });
        picks.truncate(max);

        if picks.is_empty() {
            tracing::info!(goal = %goal, "No worker scored above zero, using fallback list");
        }
        let mut pool_ids: Vec<&str> = self
            .profiles
            .iter()
            .filter(|p| !has_core || p.worker.core)
            .map(|p| p.worker.id.as_str())
            .collect();
        pool_ids.sort_unstable();
        self.pad(&mut picks, &pool_ids, min, max);

        tracing::debug!(
            goal = %goal,
            picks = ?picks.iter().map(|p| p.worker_id.as_str()).collect::<Vec<_>>(),
            "Workers selected"
        );
        Selection::new(picks)
    }

    fn score(
        &self,
        profile: &Profile,
        goal_tokens: &[String],
        goal_trigrams: &HashMap<String, usize>,
    ) -> Pick {
        let weights = &self.config.weights;
        let mut pick = Pick::new(profile.worker.id.clone(), 0.0);

        if !goal_tokens.is_empty() {
            let mut overlap = 0.0;
            for token in goal_tokens.iter().filter(|t| profile.bag.contains(*t)) {
                overlap += self.idf.get(token).copied().unwrap_or(1.0);
                pick.add_reason(format!("semantic:{token}"));
            }
            pick.score += weights.semantic * overlap / goal_tokens.len() as f64;
        }

        let similarity = cosine(goal_trigrams, &profile.trigrams);
        if similarity >= self.config.trigram_floor {
            pick.score += weights.trigram * similarity;
            pick.add_reason(format!("trigram:{similarity:.2}"));
        }

        let mut capability_hits = 0usize;
        for (tag, tag_tokens) in &profile.capabilities {
            let hit = goal_tokens.iter().any(|g| {
                tag_tokens.contains(g) || synonyms_of(g).iter().any(|s| tag_tokens.contains(s))
            });
            if hit {
                capability_hits += 1;
                pick.add_reason(format!("capability:{tag}"));
            }
        }
        pick.score += weights.capability * capability_hits as f64;

        // The prior only adjusts workers the goal already points at.
        if pick.score > 0.0 {
            if let Some(rate) = self
                .history
                .as_ref()
                .and_then(|h| h.success_rate(&profile.worker.id))
            {
                pick.score += weights.history * rate;
                pick.add_reason(format!("history:{rate:.2}"));
            }
        }

        pick
    }

    /// Top up with fallback ids, then scored-pool ids, then any catalog id, in lexical order.
    fn pad(&self, picks: &mut Vec<Pick>, pool_ids: &[&str], min: usize, max: usize) {
        let only_fallback = picks.is_empty();
        let configured = self
            .config
            .fallback
            .iter()
            .map(String::as_str)
            .filter(|id| self.catalog.contains(id));

        let push = |picks: &mut Vec<Pick>, id: &str| {
            if !picks.iter().any(|p| p.worker_id == id) {
                let mut pick = Pick::new(id, 0.0);
                pick.add_reason("fallback");
                picks.push(pick);
            }
        };

        if only_fallback {
            for id in configured.clone() {
                if picks.len() >= max {
                    break;
                }
                push(picks, id);
            }
        }
        let padding = configured
            .chain(pool_ids.iter().copied())
            .chain(self.catalog.ids());
        for id in padding {
            if picks.len() >= min {
                break;
            }
            push(picks, id);
        }
    }
}
