//! Tokenisation and similarity helpers for worker selection.

use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "its", "of", "on", "or", "our", "please", "so", "that", "the", "then", "this", "to", "us",
    "we", "with", "you", "your",
];

/// Groups of interchangeable terms. A goal term matches a capability when
/// both appear in the same group.
pub const SYNONYMS: &[&[&str]] = &[
    &["build", "scaffold", "implement", "create", "develop", "make", "code"],
    &["test", "testing", "qa", "verify", "validate", "check", "coverage"],
    &["api", "endpoint", "rest", "http", "service", "server", "backend"],
    &["design", "architecture", "architect", "plan", "structure", "blueprint"],
    &["ui", "frontend", "interface", "web", "page", "component"],
    &["deploy", "release", "ship", "infrastructure", "devops", "pipeline"],
    &["document", "docs", "documentation", "readme", "guide"],
    &["data", "database", "schema", "sql", "storage", "migration"],
    &["review", "audit", "inspect", "lint", "security"],
    &["fix", "debug", "bug", "repair", "patch"],
];

/// Light suffix stemming so that "tests", "testing" and "tested" agree.
pub fn stem(word: &str) -> String {
    if let Some(base) = word.strip_suffix("ies") {
        if base.len() >= 2 {
            return format!("{base}y");
        }
    }
    for suffix in ["ing", "ed"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.len() >= 3 {
                return base.to_string();
            }
        }
    }
    if let Some(base) = word.strip_suffix('s') {
        if base.len() >= 3 && !base.ends_with('s') {
            return base.to_string();
        }
    }
    word.to_string()
}

/// Lower-cased, stemmed, stopword-free tokens in input order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
        .map(stem)
        .collect()
}

/// Distinct tokens, first occurrence wins.
pub fn distinct_tokens(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for token in tokenize(text) {
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

/// Stemmed members of every synonym group containing `token`.
pub fn synonyms_of(token: &str) -> Vec<String> {
    let mut out = Vec::new();
    for group in SYNONYMS {
        let stems: Vec<String> = group.iter().map(|w| stem(w)).collect();
        if stems.iter().any(|s| s == token) {
            for s in stems {
                if !out.contains(&s) {
                    out.push(s);
                }
            }
        }
    }
    out
}

/// Character trigram counts of the normalised text, padded with spaces.
pub fn trigrams(text: &str) -> HashMap<String, usize> {
    let normalised: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let padded = format!(" {} ", normalised.split_whitespace().collect::<Vec<_>>().join(" "));
    let chars: Vec<char> = padded.chars().collect();

    let mut counts = HashMap::new();
    for window in chars.windows(3) {
        *counts.entry(window.iter().collect::<String>()).or_insert(0) += 1;
    }
    counts
}

pub fn cosine(a: &HashMap<String, usize>, b: &HashMap<String, usize>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(k, &va)| b.get(k).map(|&vb| (va * vb) as f64))
        .sum();
    let norm = |m: &HashMap<String, usize>| m.values().map(|&v| (v * v) as f64).sum::<f64>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stemming() {
        assert_eq!(stem("tests"), "test");
        assert_eq!(stem("testing"), "test");
        assert_eq!(stem("tested"), "test");
        assert_eq!(stem("apis"), "api");
        assert_eq!(stem("api"), "api");
        assert_eq!(stem("libraries"), "library");
        assert_eq!(stem("class"), "class");
    }

    #[test]
    fn test_tokenize_drops_stopwords() {
        assert_eq!(
            tokenize("Build a minimal API with tests"),
            vec!["build", "minimal", "api", "test"]
        );
    }

    #[test]
    fn test_synonyms() {
        let syn = synonyms_of("build");
        assert!(syn.contains(&"scaffold".to_string()));
        assert!(syn.contains(&"implement".to_string()));
        assert!(synonyms_of("zebra").is_empty());
        // "testing" stems to "test", which sits in the test group
        assert!(synonyms_of("test").contains(&"qa".to_string()));
    }

    #[test]
    fn test_cosine_bounds() {
        let a = trigrams("backend api");
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-9);
        let b = trigrams("zzz");
        assert_eq!(cosine(&a, &b), 0.0);
        let c = trigrams("backend apis");
        let sim = cosine(&a, &c);
        assert!(sim > 0.5 && sim < 1.0);
    }
}
