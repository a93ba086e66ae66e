//! Naive screening for visitor comments before they reach the CMS.
//!
//! Counts flagged keywords and links. It is a first pass for a human
//! moderator, not a classifier.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const FLAGGED_KEYWORDS: &[&str] = &[
    "casino",
    "apuestas",
    "viagra",
    "bitcoin",
    "cripto",
    "crypto",
    "préstamo",
    "prestamo",
    "loan",
    "gratis",
    "free money",
    "xxx",
    "estafa",
    "idiota",
    "imbécil",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationVerdict {
    Approved,
    Pending,
    Rejected,
}

impl ModerationVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationVerdict::Approved => "approved",
            ModerationVerdict::Pending => "pending",
            ModerationVerdict::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationReport {
    pub verdict: ModerationVerdict,
    pub hits: usize,
}

fn keyword_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let alternatives: Vec<String> = FLAGGED_KEYWORDS.iter().map(|k| regex::escape(k)).collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
            .expect("keyword pattern is valid")
    })
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("link pattern is valid"))
}

/// 0 hits approves, 1 holds for review, 2 or more rejects. Blank comments are rejected.
pub fn moderate(comment: &str) -> ModerationReport {
    if comment.trim().is_empty() {
        return ModerationReport {
            verdict: ModerationVerdict::Rejected,
            hits: 0,
        };
    }

    let hits = keyword_pattern().find_iter(comment).count() + link_pattern().find_iter(comment).count();

    let verdict = match hits {
        0 => ModerationVerdict::Approved,
        1 => ModerationVerdict::Pending,
        _ => ModerationVerdict::Rejected,
    };

    ModerationReport { verdict, hits }
}
