//! Reply protocol spoken between the generation service and the chat client.
//!
//! A reply is a handful of labelled, line-oriented sections:
//!
//! ```text
//! ARCHETYPE: handoff
//! MESSAGE:
//! Free text, possibly over several lines.
//! VISUAL:
//! CARDS: Title | Description | action-token
//! VIDEO: https://example.com/tutorial | Tutorial
//! ACTIONS:
//! Ver precios → precios (navigate)
//! ---
//! ```
//!
//! Labels are case-insensitive. Every rule here degrades instead of failing:
//! a line that does not fit its section is skipped and parsing carries on.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::OnceLock;

use crate::catalog::SiteCatalog;
use crate::legacy::MAX_LEGACY_ACTIONS;
use crate::state::ReplyFormat;

/// Most actions kept from a single reply.
pub const MAX_ACTIONS: usize = 3;

/// Title used when a `VIDEO:` line carries only a URL.
pub const VIDEO_PLACEHOLDER_TITLE: &str = "Video tutorial";

/// Coarse intent of an assistant turn, driving which layout the UI picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Discover,
    #[default]
    Inform,
    Handoff,
    Redirect,
}

impl Archetype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::Discover => "discover",
            Archetype::Inform => "inform",
            Archetype::Handoff => "handoff",
            Archetype::Redirect => "redirect",
        }
    }

    /// Reads the first word of an `ARCHETYPE:` value. Anything unrecognized is `Inform`.
    pub fn from_value(value: &str) -> Self {
        let word = value
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_alphanumeric());

        match word.to_lowercase().as_str() {
            "discover" => Archetype::Discover,
            "handoff" => Archetype::Handoff,
            "redirect" => Archetype::Redirect,
            _ => Archetype::Inform,
        }
    }

    pub fn all() -> Vec<Archetype> {
        vec![
            Archetype::Discover,
            Archetype::Inform,
            Archetype::Handoff,
            Archetype::Redirect,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub src: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    pub description: String,
    /// Opaque navigation token resolved by the site router.
    pub action: String,
}

/// Optional rich element attached to a reply. A video always beats cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Visual {
    Video(Video),
    CardList { cards: Vec<Card> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Message,
    External,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Message => "message",
            ActionKind::External => "external",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "navigate" => Some(ActionKind::Navigate),
            "message" => Some(ActionKind::Message),
            "external" => Some(ActionKind::External),
            _ => None,
        }
    }
}

/// Suggested next step, rendered as a button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
}

/// Decoded assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuredMessage {
    pub archetype: Archetype,
    pub message: String,
    /// Serialized as a list of zero or one block, which is what the frontend expects.
    #[serde(with = "visual_list", default)]
    pub visual: Option<Visual>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl StructuredMessage {
    /// A plain `inform` reply with no visual or actions.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty()
    }
}

mod visual_list {
    use super::*;

    pub fn serialize<S: Serializer>(visual: &Option<Visual>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(visual.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Visual>, D::Error> {
        let blocks = Vec::<Visual>::deserialize(deserializer)?;
        Ok(blocks.into_iter().next())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Archetype,
    Message,
    Visual,
    Cards,
    Video,
    Actions,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Archetype => "ARCHETYPE",
            Label::Message => "MESSAGE",
            Label::Visual => "VISUAL",
            Label::Cards => "CARDS",
            Label::Video => "VIDEO",
            Label::Actions => "ACTIONS",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            Label::Archetype,
            Label::Message,
            Label::Visual,
            Label::Cards,
            Label::Video,
            Label::Actions,
        ]
        .into_iter()
        .find(|label| label.as_str().eq_ignore_ascii_case(name))
    }
}

/// One classified line of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// A section label and whatever follows its colon on the same line.
    Labelled(Label, &'a str),
    Terminator,
    Text(&'a str),
}

pub fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed == "---" {
        return Line::Terminator;
    }

    if let Some((head, rest)) = trimmed.split_once(':') {
        if let Some(label) = Label::from_name(head.trim_end()) {
            return Line::Labelled(label, rest);
        }
    }

    Line::Text(line)
}

/// `<title> | <description> | <action>`, all three present and non-empty.
pub fn parse_card(payload: &str) -> Option<Card> {
    let fields: Vec<&str> = payload.split('|').map(str::trim).collect();
    match fields.as_slice() {
        [title, description, action]
            if !title.is_empty() && !description.is_empty() && !action.is_empty() =>
        {
            Some(Card {
                title: title.to_string(),
                description: description.to_string(),
                action: action.to_string(),
            })
        }
        _ => None,
    }
}

/// `<url> | <title>`; the title may be left out.
pub fn parse_video(payload: &str) -> Option<Video> {
    let (src, title) = match payload.split_once('|') {
        Some((src, title)) => (src.trim(), title.trim()),
        None => (payload.trim(), ""),
    };

    if src.is_empty() {
        return None;
    }

    let title = if title.is_empty() {
        VIDEO_PLACEHOLDER_TITLE
    } else {
        title
    };

    Some(Video {
        src: src.to_string(),
        title: title.to_string(),
    })
}

fn action_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:[-*•]\s+)?(?P<label>.+?)\s*(?:→|->)\s*(?P<value>.+?)\s*\(\s*(?P<kind>navigate|message|external)\s*\)\s*$",
        )
        .expect("action pattern is valid")
    })
}

/// `<label> → <value> (<type>)`. ASCII `->` is accepted for the arrow.
pub fn parse_action(line: &str) -> Option<Action> {
    let caps = action_pattern().captures(line)?;
    let kind = ActionKind::from_str(&caps["kind"])?;

    Some(Action {
        label: caps["label"].to_string(),
        value: caps["value"].to_string(),
        kind,
    })
}

/// Instructions handed to a generator so its completions follow `format`.
pub fn system_prompt(catalog: &SiteCatalog, format: ReplyFormat) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are the assistant of a company website. ");
    prompt.push_str("Answer in the visitor's language, briefly and warmly.\n\n");

    match format {
        ReplyFormat::Structured => {
            prompt.push_str("Always reply using exactly this format:\n\n");
            prompt.push_str("ARCHETYPE: <discover|inform|handoff|redirect>\n");
            prompt.push_str("MESSAGE:\n<your answer as plain text>\n");
            prompt.push_str("VISUAL:\n");
            prompt.push_str("CARDS: <title> | <description> | <section>\n");
            prompt.push_str("VIDEO: <url> | <title>\n");
            prompt.push_str("ACTIONS:\n<label> → <value> (<navigate|message|external>)\n");
            prompt.push_str("---\n\n");

            prompt.push_str("Rules:\n");
            prompt.push_str("- VISUAL and ACTIONS are optional. Use CARDS or VIDEO, never both.\n");
            prompt.push_str(&format!("- At most {} actions.\n", MAX_ACTIONS));
            prompt.push_str("- Use handoff when the visitor needs a person; redirect when they should go elsewhere.\n");
            prompt.push_str("- Only use the section tokens listed below for CARDS and navigate actions.\n\n");
        }
        ReplyFormat::Legacy => {
            prompt.push_str("Reply in plain text. To suggest a section, add a tag anywhere in the text:\n\n");
            prompt.push_str("[ACTION:navigate:<section>|<button label>]\n\n");
            prompt.push_str("Rules:\n");
            prompt.push_str(&format!("- At most {} tags; extra tags are ignored.\n", MAX_LEGACY_ACTIONS));
            prompt.push_str("- Only use the section tokens listed below.\n\n");
        }
    }

    if !catalog.sections.is_empty() {
        prompt.push_str("Sections:\n");
        for section in &catalog.sections {
            prompt.push_str(&format!("{}: {} - {}\n", section.slug, section.title, section.summary));
        }
        prompt.push('\n');
    }

    if let Some(video) = &catalog.video {
        match format {
            ReplyFormat::Structured => {
                prompt.push_str("Tutorial video (the only one; prefer it for handoff replies):\n");
                prompt.push_str(&format!("VIDEO: {} | {}\n", video.src, video.title));
            }
            ReplyFormat::Legacy => {
                prompt.push_str(&format!("Tutorial video, share the link when useful: {} ({})\n", video.src, video.title));
            }
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SectionRecord, VideoRecord};

    #[test]
    fn test_archetype_from_value() {
        assert_eq!(Archetype::from_value("handoff"), Archetype::Handoff);
        assert_eq!(Archetype::from_value("  DISCOVER "), Archetype::Discover);
        assert_eq!(Archetype::from_value("redirect."), Archetype::Redirect);
        assert_eq!(Archetype::from_value("bogus"), Archetype::Inform);
        assert_eq!(Archetype::from_value(""), Archetype::Inform);
    }

    #[test]
    fn test_classify_labels_case_insensitive() {
        assert_eq!(classify("message:"), Line::Labelled(Label::Message, ""));
        assert_eq!(classify("  Archetype: inform"), Line::Labelled(Label::Archetype, " inform"));
        assert_eq!(classify("---"), Line::Terminator);
        assert_eq!(classify("Nota: abrimos a las 9"), Line::Text("Nota: abrimos a las 9"));
    }

    #[test]
    fn test_parse_card_requires_three_fields() {
        let card = parse_card(" Precios | Planes y tarifas | precios ").unwrap();
        assert_eq!(card.title, "Precios");
        assert_eq!(card.description, "Planes y tarifas");
        assert_eq!(card.action, "precios");

        assert!(parse_card("Precios | Planes").is_none());
        assert!(parse_card("a | b | c | d").is_none());
        assert!(parse_card("Precios | Planes | ").is_none());
    }

    #[test]
    fn test_parse_video_placeholder_title() {
        let video = parse_video(" https://example.com/v ").unwrap();
        assert_eq!(video.src, "https://example.com/v");
        assert_eq!(video.title, VIDEO_PLACEHOLDER_TITLE);

        let video = parse_video("https://example.com/v | Cómo empezar").unwrap();
        assert_eq!(video.title, "Cómo empezar");

        assert!(parse_video(" | Sin URL").is_none());
    }

    #[test]
    fn test_parse_action_shapes() {
        let action = parse_action("Ver precios → precios (navigate)").unwrap();
        assert_eq!(action.label, "Ver precios");
        assert_eq!(action.value, "precios");
        assert_eq!(action.kind, ActionKind::Navigate);

        let action = parse_action("- Escríbenos -> https://wa.me/123 (External)").unwrap();
        assert_eq!(action.label, "Escríbenos");
        assert_eq!(action.kind, ActionKind::External);

        assert!(parse_action("Ver precios → precios").is_none());
        assert!(parse_action("Ver precios → precios (teleport)").is_none());
    }

    #[test]
    fn test_visual_serializes_as_list() {
        let empty = serde_json::to_value(StructuredMessage::text("hola")).unwrap();
        assert_eq!(empty["visual"], serde_json::json!([]));
        assert_eq!(empty["archetype"], "inform");

        let with_video = StructuredMessage {
            visual: Some(Visual::Video(Video {
                src: "https://example.com/v".to_string(),
                title: "Tutorial".to_string(),
            })),
            ..StructuredMessage::text("mira")
        };
        let value = serde_json::to_value(&with_video).unwrap();
        assert_eq!(value["visual"][0]["type"], "video");

        let back: StructuredMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, with_video);
    }

    #[test]
    fn test_system_prompt_lists_catalog() {
        let catalog = SiteCatalog {
            sections: vec![SectionRecord {
                slug: "precios".to_string(),
                title: "Precios".to_string(),
                summary: "Planes y tarifas".to_string(),
            }],
            video: Some(VideoRecord {
                src: "https://example.com/v".to_string(),
                title: "Tutorial".to_string(),
            }),
        };

        let prompt = system_prompt(&catalog, ReplyFormat::Structured);
        assert!(prompt.contains("ARCHETYPE:"));
        assert!(prompt.contains("precios: Precios - Planes y tarifas"));
        assert!(prompt.contains("VIDEO: https://example.com/v | Tutorial"));
        assert!(!prompt.contains("[ACTION:"));
    }

    #[test]
    fn test_legacy_system_prompt_asks_for_tags() {
        let catalog = SiteCatalog {
            sections: vec![SectionRecord {
                slug: "precios".to_string(),
                title: "Precios".to_string(),
                summary: "Planes y tarifas".to_string(),
            }],
            video: None,
        };

        let prompt = system_prompt(&catalog, ReplyFormat::Legacy);
        assert!(prompt.contains("[ACTION:navigate:<section>|<button label>]"));
        assert!(prompt.contains("precios: Precios - Planes y tarifas"));
        assert!(!prompt.contains("ARCHETYPE:"));
        assert!(!prompt.contains("MESSAGE:"));
    }
}
