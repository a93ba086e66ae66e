//! Inline action tags used by the older chat endpoint.
//!
//! Replies are free text with tags like `[ACTION:navigate:precios|Ver precios]`
//! sprinkled in. Every tag is removed from the visible text, but only the first
//! two become buttons.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Most actions kept from a single legacy reply.
pub const MAX_LEGACY_ACTIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyAction {
    pub section: String,
    pub label: String,
    pub path: String,
}

impl LegacyAction {
    pub fn new(section: &str, label: &str) -> Self {
        Self {
            section: section.to_string(),
            label: label.to_string(),
            path: section_path(section),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegacyActionMessage {
    pub text: String,
    pub actions: Vec<LegacyAction>,
}

impl LegacyActionMessage {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub fn section_path(section: &str) -> String {
    format!("/seccion/{}", section)
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[ACTION:navigate:([A-Za-z0-9_-]+)\|([^\]]+)\]").expect("action tag pattern is valid")
    })
}

pub fn parse_legacy_tags(text: &str) -> LegacyActionMessage {
    let pattern = tag_pattern();

    let actions = pattern
        .captures_iter(text)
        .take(MAX_LEGACY_ACTIONS)
        .map(|caps| LegacyAction::new(&caps[1], &caps[2]))
        .collect();

    LegacyActionMessage {
        text: pattern.replace_all(text, "").trim().to_string(),
        actions,
    }
}
