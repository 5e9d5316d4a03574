#![deny(unsafe_code)]

/// Terminal shell: input parsing, event loop and rendering.
pub mod app;
pub mod carbon_tracker;
/// Chat state container, composer and list/thread projections.
pub mod chat;
/// Model selector component for changing LLM models.
pub mod model_selector;
/// Settings persistence.
pub mod settings;
