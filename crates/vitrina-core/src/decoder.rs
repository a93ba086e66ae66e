//! Streaming decoder for structured replies.
//!
//! `decode` is a pure function of the whole text received so far. Callers keep
//! re-running it as chunks arrive; the last call on the complete text gives the
//! same answer a one-shot parse would, however the text was split.

use crate::protocol::{self, Action, Archetype, Card, Label, Line, StructuredMessage, Video, Visual, MAX_ACTIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Message,
    Visual,
    Actions,
}

/// Best-effort parse of a possibly truncated reply. Never fails.
pub fn decode(buffer: &str) -> StructuredMessage {
    let mut section = Section::Preamble;
    let mut archetype: Option<Archetype> = None;
    let mut message_lines: Vec<&str> = Vec::new();
    let mut video: Option<Video> = None;
    let mut cards: Vec<Card> = Vec::new();
    let mut actions: Vec<Action> = Vec::new();

    for line in buffer.lines() {
        match protocol::classify(line) {
            Line::Terminator => break,
            Line::Labelled(Label::Archetype, value) => {
                if archetype.is_none() {
                    archetype = Some(Archetype::from_value(value));
                }
                section = Section::Preamble;
            }
            Line::Labelled(Label::Message, rest) => {
                if !rest.trim().is_empty() {
                    message_lines.push(rest);
                }
                section = Section::Message;
            }
            Line::Labelled(Label::Visual, _) => section = Section::Visual,
            Line::Labelled(Label::Cards, payload) if section == Section::Visual => {
                if let Some(card) = protocol::parse_card(payload) {
                    cards.push(card);
                }
            }
            Line::Labelled(Label::Video, payload) if section == Section::Visual => {
                if video.is_none() {
                    video = protocol::parse_video(payload);
                }
            }
            Line::Labelled(Label::Actions, rest) => {
                push_action(&mut actions, rest);
                section = Section::Actions;
            }
            // CARDS/VIDEO outside VISUAL are ordinary text ("Video: ..." in a message).
            Line::Labelled(Label::Cards | Label::Video, _) | Line::Text(_) => match section {
                Section::Message => message_lines.push(line),
                Section::Actions => push_action(&mut actions, line),
                Section::Preamble | Section::Visual => {}
            },
        }
    }

    let visual = match video {
        Some(video) => Some(Visual::Video(video)),
        None if !cards.is_empty() => Some(Visual::CardList { cards }),
        None => None,
    };

    StructuredMessage {
        archetype: archetype.unwrap_or_default(),
        message: message_lines.join("\n").trim().to_string(),
        visual,
        actions,
    }
}

// Lines past the cap are still scanned, just not kept.
fn push_action(actions: &mut Vec<Action>, line: &str) {
    if actions.len() >= MAX_ACTIONS || line.trim().is_empty() {
        return;
    }
    if let Some(action) = protocol::parse_action(line) {
        actions.push(action);
    }
}

/// Accumulates raw response bytes into text.
///
/// Chunks may end in the middle of a UTF-8 sequence; those trailing bytes are
/// held back until the rest of the character arrives. Invalid sequences become
/// U+FFFD exactly as `String::from_utf8_lossy` would render them.
#[derive(Debug, Default)]
pub struct TextBuffer {
    text: String,
    pending: Vec<u8>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Incomplete sequence at the end, wait for more bytes.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Flushes any dangling partial sequence and returns the final text.
    pub fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
        }
        self.text
    }
}

/// Convenience pairing of a `TextBuffer` with `decode`.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: TextBuffer,
    chunks: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the reply as understood so far.
    pub fn push(&mut self, chunk: &[u8]) -> StructuredMessage {
        self.buffer.push(chunk);
        self.chunks += 1;
        decode(self.buffer.as_str())
    }

    pub fn text(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn finish(self) -> StructuredMessage {
        decode(&self.buffer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ActionKind;

    const FULL_REPLY: &str = "ARCHETYPE: discover\n\
MESSAGE:\n\
¡Hola! Tenemos varios planes.\n\
\n\
Elige el que mejor te quede.\n\
VISUAL:\n\
CARDS: Básico | Para empezar | plan-basico\n\
CARDS: Pro | Para equipos | plan-pro\n\
ACTIONS:\n\
Ver precios → precios (navigate)\n\
Hablar con ventas → Quiero hablar con ventas (message)\n\
---\n";

    #[test]
    fn test_decode_full_reply() {
        let reply = decode(FULL_REPLY);

        assert_eq!(reply.archetype, Archetype::Discover);
        assert_eq!(
            reply.message,
            "¡Hola! Tenemos varios planes.\n\nElige el que mejor te quede."
        );
        match reply.visual {
            Some(Visual::CardList { cards }) => {
                assert_eq!(cards.len(), 2);
                assert_eq!(cards[0].action, "plan-basico");
                assert_eq!(cards[1].title, "Pro");
            }
            other => panic!("expected cards, got {:?}", other),
        }
        assert_eq!(reply.actions.len(), 2);
        assert_eq!(reply.actions[1].kind, ActionKind::Message);
    }

    #[test]
    fn test_unknown_archetype_is_inform() {
        let reply = decode("ARCHETYPE: bogus\nMESSAGE:\nhi\n---");
        assert_eq!(reply.archetype, Archetype::Inform);
        assert_eq!(reply.message, "hi");
    }

    #[test]
    fn test_missing_sections_default() {
        let reply = decode("");
        assert_eq!(reply, StructuredMessage::default());

        let reply = decode("ARCHETYPE: handoff\n");
        assert_eq!(reply.archetype, Archetype::Handoff);
        assert_eq!(reply.message, "");
        assert!(reply.visual.is_none());
        assert!(reply.actions.is_empty());
    }

    #[test]
    fn test_message_on_label_line() {
        let reply = decode("MESSAGE: Hola\nqué tal\nACTIONS:\n");
        assert_eq!(reply.message, "Hola\nqué tal");
    }

    #[test]
    fn test_video_wins_over_cards() {
        let reply = decode(
            "ARCHETYPE: handoff\nMESSAGE:\nMira esto\nVISUAL:\n\
CARDS: A | a | a\nVIDEO: https://example.com/v | Tutorial\nCARDS: B | b | b\n---",
        );

        assert_eq!(
            reply.visual,
            Some(Visual::Video(Video {
                src: "https://example.com/v".to_string(),
                title: "Tutorial".to_string(),
            }))
        );
    }

    #[test]
    fn test_visual_labels_in_message_stay_text() {
        let reply = decode("ARCHETYPE: inform\nMESSAGE:\nVideo: te lo explico en dos pasos.\n---");
        assert_eq!(reply.message, "Video: te lo explico en dos pasos.");
        assert!(reply.visual.is_none());

        let reply = decode(
            "MESSAGE:\nCards: las tienes abajo\nVISUAL:\nCARDS: Pro | Para equipos | plan-pro\n---",
        );
        assert_eq!(reply.message, "Cards: las tienes abajo");
        match reply.visual {
            Some(Visual::CardList { cards }) => assert_eq!(cards[0].action, "plan-pro"),
            other => panic!("expected cards, got {:?}", other),
        }
    }

    #[test]
    fn test_only_first_video_kept() {
        let reply = decode("VISUAL:\nVIDEO: https://a\nVIDEO: https://b | B\n");
        match reply.visual {
            Some(Visual::Video(video)) => {
                assert_eq!(video.src, "https://a");
                assert_eq!(video.title, protocol::VIDEO_PLACEHOLDER_TITLE);
            }
            other => panic!("expected video, got {:?}", other),
        }
    }

    #[test]
    fn test_action_cap_keeps_first_three_in_order() {
        let reply = decode(
            "MESSAGE:\nopciones\nACTIONS:\n\
Uno → uno (navigate)\nDos → dos (navigate)\nTres → tres (message)\n\
Cuatro → cuatro (navigate)\nCinco → cinco (external)\n---",
        );

        let labels: Vec<&str> = reply.actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["Uno", "Dos", "Tres"]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let reply = decode(
            "MESSAGE:\nhola\nVISUAL:\nCARDS: Solo | dos\nCARDS: Bien | formada | ok\n\
ACTIONS:\nsin flecha (navigate)\nVale → vale (navigate)\n",
        );

        match reply.visual {
            Some(Visual::CardList { cards }) => {
                assert_eq!(cards.len(), 1);
                assert_eq!(cards[0].title, "Bien");
            }
            other => panic!("expected cards, got {:?}", other),
        }
        assert_eq!(reply.actions.len(), 1);
        assert_eq!(reply.actions[0].value, "vale");
    }

    #[test]
    fn test_terminator_stops_parsing() {
        let reply = decode("MESSAGE:\nantes\n---\ndespués\nACTIONS:\nX → x (navigate)\n");
        assert_eq!(reply.message, "antes");
        assert!(reply.actions.is_empty());
    }

    #[test]
    fn test_truncated_card_line_does_not_fail() {
        let reply = decode("ARCHETYPE: discover\nMESSAGE:\nHola\nVISUAL:\nCARDS: Básico | Para em");
        assert_eq!(reply.archetype, Archetype::Discover);
        assert_eq!(reply.message, "Hola");
        assert!(reply.visual.is_none());
    }

    #[test]
    fn test_crlf_line_endings() {
        let reply = decode("ARCHETYPE: redirect\r\nMESSAGE:\r\nvete\r\n---\r\n");
        assert_eq!(reply.archetype, Archetype::Redirect);
        assert_eq!(reply.message, "vete");
    }

    #[test]
    fn test_every_split_converges() {
        let bytes = FULL_REPLY.as_bytes();
        let expected = decode(FULL_REPLY);

        // Includes offsets inside the multi-byte characters.
        for split in 0..=bytes.len() {
            let mut decoder = StreamDecoder::new();
            decoder.push(&bytes[..split]);
            decoder.push(&bytes[split..]);
            assert_eq!(decoder.finish(), expected, "split at byte {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time_converges() {
        let mut decoder = StreamDecoder::new();
        for byte in FULL_REPLY.as_bytes() {
            decoder.push(std::slice::from_ref(byte));
        }
        assert_eq!(decoder.text(), FULL_REPLY);
        assert_eq!(decoder.chunks(), FULL_REPLY.len());
        assert_eq!(decoder.finish(), decode(FULL_REPLY));
    }

    #[test]
    fn test_text_buffer_holds_partial_sequence() {
        let bytes = "¡".as_bytes();
        let mut buffer = TextBuffer::new();
        buffer.push(&bytes[..1]);
        assert_eq!(buffer.as_str(), "");
        buffer.push(&bytes[1..]);
        assert_eq!(buffer.as_str(), "¡");
    }

    #[test]
    fn test_text_buffer_replaces_invalid_bytes() {
        let mut buffer = TextBuffer::new();
        buffer.push(b"ok\xFFfine");
        assert_eq!(buffer.as_str(), "ok\u{FFFD}fine");

        let mut buffer = TextBuffer::new();
        buffer.push(&"é".as_bytes()[..1]);
        assert_eq!(buffer.finish(), "\u{FFFD}");
    }
}
