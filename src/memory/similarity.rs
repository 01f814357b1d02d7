//! Lexical similarity used to rank stored interactions.
//!
//! Documents become term-frequency vectors over lowercase word tokens and are
//! compared by cosine similarity.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+").expect("token pattern is valid")
});

/// Term-frequency vector of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermVector {
    terms: HashMap<String, f32>,
    norm: f32,
}

impl TermVector {
    pub fn from_text(text: &str) -> Self {
        let mut terms: HashMap<String, f32> = HashMap::new();
        for token in TOKEN.find_iter(&text.to_lowercase()) {
            *terms.entry(token.as_str().to_string()).or_default() += 1.0;
        }
        let norm = terms.values().map(|v| v * v).sum::<f32>().sqrt();
        Self { terms, norm }
    }

    /// Cosine similarity in `[0, 1]`; zero when either side has no terms.
    pub fn cosine(&self, other: &TermVector) -> f32 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.terms.len() <= other.terms.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f32 = small
            .terms
            .iter()
            .filter_map(|(t, w)| large.terms.get(t).map(|v| v * w))
            .sum();
        dot / (self.norm * other.norm)
    }
}

/// A candidate for ranking: the document text and an insertion sequence
/// (higher is newer).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: String,
    pub seq: u64,
}

/// Rank `candidates` against `query`, returning up to `k` documents, most
/// similar first. Ties go to the newer document.
pub fn rank(query: &str, candidates: Vec<Candidate>, k: usize) -> Vec<String> {
    let query = TermVector::from_text(query);
    let mut scored: Vec<(f32, u64, String)> = candidates
        .into_iter()
        .map(|c| {
            let score = query.cosine(&TermVector::from_text(&c.document));
            (score, c.seq, c.document)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    scored.into_iter().take(k).map(|(_, _, doc)| doc).collect()
}
