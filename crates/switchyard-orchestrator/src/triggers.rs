use regex::{Regex, RegexBuilder};
use switchyard_core::{Catalog, SwitchyardError, SwitchyardResult};

/// A literal keyword and the workers it points at, in catalog order.
#[derive(Debug, Clone)]
pub struct KeywordEntry {
    pub keyword: String,
    pub worker_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub worker_id: String,
    pub priority: i32,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub struct CompiledGlob {
    pub worker_id: String,
    pub raw: String,
    pub pattern: glob::Pattern,
}

/// Trigger definitions of a catalog, compiled once.
///
/// Every list keeps catalog order; regex patterns are additionally sorted by
/// descending priority (stable, so equal priorities keep catalog order).
#[derive(Debug, Clone, Default)]
pub struct TriggerTable {
    keywords: Vec<KeywordEntry>,
    patterns: Vec<CompiledPattern>,
    globs: Vec<CompiledGlob>,
}

impl TriggerTable {
    pub fn compile(catalog: &Catalog) -> SwitchyardResult<Self> {
        let mut table = TriggerTable::default();

        for worker in catalog.workers() {
            let invalid = |reason: String| SwitchyardError::InvalidTrigger {
                worker: worker.id.clone(),
                reason,
            };

            for keyword in &worker.triggers.keywords {
                let keyword = keyword.trim().to_lowercase();
                if keyword.is_empty() {
                    return Err(invalid("empty keyword".into()));
                }
                match table.keywords.iter_mut().find(|e| e.keyword == keyword) {
                    Some(entry) => {
                        if !entry.worker_ids.contains(&worker.id) {
                            entry.worker_ids.push(worker.id.clone());
                        }
                    }
                    None => table.keywords.push(KeywordEntry {
                        keyword,
                        worker_ids: vec![worker.id.clone()],
                    }),
                }
            }

            for trigger in &worker.triggers.patterns {
                let regex = RegexBuilder::new(&trigger.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| invalid(format!("regex '{}': {e}", trigger.pattern)))?;
                table.patterns.push(CompiledPattern {
                    worker_id: worker.id.clone(),
                    priority: trigger.priority,
                    regex,
                });
            }

            for raw in &worker.triggers.globs {
                let pattern = glob::Pattern::new(raw)
                    .map_err(|e| invalid(format!("glob '{raw}': {e}")))?;
                table.globs.push(CompiledGlob {
                    worker_id: worker.id.clone(),
                    raw: raw.clone(),
                    pattern,
                });
            }
        }

        table.patterns.sort_by(|a, b| b.priority.cmp(&a.priority));

        tracing::debug!(
            keywords = table.keywords.len(),
            patterns = table.patterns.len(),
            globs = table.globs.len(),
            "Trigger table compiled"
        );
        Ok(table)
    }

    pub fn keywords(&self) -> &[KeywordEntry] {
        &self.keywords
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn globs(&self) -> &[CompiledGlob] {
        &self.globs
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.patterns.is_empty() && self.globs.is_empty()
    }
}
