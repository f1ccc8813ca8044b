// ABOUTME: Core library for stockscout, containing the conversation data model.
// ABOUTME: Defines messages, stream updates, handoff messages, and the update formatter.

pub mod format;
pub mod handoff;
pub mod message;
pub mod update;

pub use format::{FormatOptions, format_message, format_update};
pub use message::{Content, ContentBlock, Message, Role, ToolCall};
pub use update::{NodeUpdate, Update};
