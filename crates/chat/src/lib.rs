#![deny(unsafe_code)]

/// Conversation session engine.
///
/// Holds the message log, drives the reply lifecycle against a [`murmur_llm::ReplyBackend`],
/// validates attachments and tracks whether the viewport follows the live edge. Rendering
/// is left to the host.
pub mod chat;
/// Layered settings (defaults, JSON file, environment).
pub mod settings;

pub use murmur_llm as llm;
