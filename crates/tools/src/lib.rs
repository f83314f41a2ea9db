//! Built-in tools for the agent loop: `shell`, `view`, `edit`.
//!
//! Each tool declares a JSON-schema parameters object (advertised to the
//! model in the OpenAI `tools` payload) and accepts the canonical input
//! shape `{items: [...]}` where each item is one per-call argument object.
//! The legacy `{input: {...}}` single-object shape is rejected.

pub mod edit;
pub mod registry;
pub mod shell;
pub mod view;

pub use registry::{ToolRegistry, TOOL_EDIT, TOOL_SHELL, TOOL_VIEW};
