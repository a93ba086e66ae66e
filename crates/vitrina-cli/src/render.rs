use colored::*;
use std::io::{self, Write};
use std::time::Duration;

use vitrina_core::legacy::LegacyActionMessage;
use vitrina_core::protocol::{StructuredMessage, Visual};
use vitrina_core::{ChatMessage, Reply, SessionObserver};

/// Shown when a turn completes with nothing to say.
pub const EMPTY_REPLY: &str = "(The assistant sent an empty reply. Try rephrasing your question.)";

/// Prints a streaming reply as it grows.
///
/// Re-decoding can rewrite earlier text (a half-received label shows up as
/// message text for a moment), so only appends are printed live and the
/// final text is reconciled in `finish_turn`.
#[derive(Default)]
pub struct TerminalRenderer {
    printed: String,
    elapsed: Option<Duration>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints whatever the live output missed, then the visual and actions.
    pub fn finish_turn(&mut self, message: &ChatMessage) {
        if message.content.trim().is_empty() {
            println!("{}", EMPTY_REPLY.dimmed());
        } else if let Some(rest) = message.content.strip_prefix(self.printed.as_str()) {
            println!("{}", rest);
        } else {
            println!("\n{}", message.content);
        }

        if let Some(reply) = &message.reply {
            print_extras(reply);
        }

        if let Some(elapsed) = self.elapsed {
            println!("{}", format!("({:.1}s)", elapsed.as_secs_f32()).dimmed());
        }

        self.reset();
    }

    /// Forgets the previous turn. Needed after aborted or failed turns, which
    /// never reach `finish_turn`.
    pub fn reset(&mut self) {
        self.printed.clear();
        self.elapsed = None;
    }
}

impl SessionObserver for TerminalRenderer {
    fn on_update(&mut self, message: &ChatMessage) {
        let Some(rest) = message.content.strip_prefix(self.printed.as_str()) else {
            return;
        };
        if rest.is_empty() {
            return;
        }

        print!("{}", rest);
        let _ = io::stdout().flush();
        self.printed = message.content.clone();
    }

    fn on_finish(&mut self, elapsed: Duration) {
        self.elapsed = Some(elapsed);
    }
}

pub fn print_extras(reply: &Reply) {
    match reply {
        Reply::Structured(message) => print_structured_extras(message),
        Reply::Legacy(message) => print_legacy_extras(message),
    }
}

fn print_structured_extras(message: &StructuredMessage) {
    match &message.visual {
        Some(Visual::Video(video)) => {
            println!("\n{} {} {}", "▶".bold().magenta(), video.title.bold(), video.src.dimmed());
        }
        Some(Visual::CardList { cards }) => {
            println!();
            for card in cards {
                println!(
                    "  {} {} - {} {}",
                    "▪".cyan(),
                    card.title.bold(),
                    card.description,
                    format!("[{}]", card.action).dimmed()
                );
            }
        }
        None => {}
    }

    if !message.actions.is_empty() {
        println!();
        for (i, action) in message.actions.iter().enumerate() {
            println!(
                "  {} {} {}",
                format!("{}.", i + 1).bold().blue(),
                action.label.yellow(),
                format!("→ {} ({})", action.value, action.kind.as_str()).dimmed()
            );
        }
    }
}

fn print_legacy_extras(message: &LegacyActionMessage) {
    if message.actions.is_empty() {
        return;
    }

    println!();
    for (i, action) in message.actions.iter().enumerate() {
        println!(
            "  {} {} {}",
            format!("{}.", i + 1).bold().blue(),
            action.label.yellow(),
            action.path.dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrina_core::decoder::decode;

    fn streamed(text: &str) -> ChatMessage {
        ChatMessage::assistant(Reply::Structured(decode(text)))
    }

    #[test]
    fn test_on_update_tracks_appended_text() {
        let mut renderer = TerminalRenderer::new();
        renderer.on_update(&streamed("MESSAGE:\nHo"));
        renderer.on_update(&streamed("MESSAGE:\nHola"));
        assert_eq!(renderer.printed, "Hola");
    }

    #[test]
    fn test_reset_after_interrupted_turn() {
        let mut renderer = TerminalRenderer::new();
        renderer.on_update(&streamed("MESSAGE:\nEspera"));
        renderer.on_finish(Duration::from_millis(10));

        // Aborted turn: no finish_turn, next turn starts with a reset.
        renderer.reset();
        assert!(renderer.printed.is_empty());
        assert!(renderer.elapsed.is_none());

        renderer.on_update(&streamed("MESSAGE:\nHola"));
        assert_eq!(renderer.printed, "Hola");
    }

    #[test]
    fn test_finish_turn_clears_state() {
        let mut renderer = TerminalRenderer::new();
        let message = streamed("MESSAGE:\nHola\n---");
        renderer.on_update(&message);
        renderer.finish_turn(&message);
        assert!(renderer.printed.is_empty());
    }
}
