pub mod catalog;
pub mod config;
pub mod decoder;
pub mod embeddings;
pub mod legacy;
pub mod moderation;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod state;
pub mod transport;

// Re-export main types for convenience
pub use catalog::SiteCatalog;
pub use config::Config;
pub use decoder::{decode, StreamDecoder};
pub use embeddings::SectionIndex;
pub use legacy::{parse_legacy_tags, LegacyActionMessage};
pub use moderation::{moderate, ModerationVerdict};
pub use protocol::{Archetype, StructuredMessage};
pub use provider::Provider;
pub use session::{ChatSession, SessionObserver, TurnOutcome};
pub use state::{ChatMessage, ChatRole, Reply, ReplyFormat, SessionStatus};
pub use transport::{OllamaClient, OllamaTransport, SiteTransport, Transport, TransportError};
