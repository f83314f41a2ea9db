//! LLM provider runner.
//!
//! Abstracts providers behind a uniform `generate_turn` contract. Adapters
//! are registered by string id; canonical messages are translated to/from
//! each adapter's wire format. Two adapters ship built in: `demo` (echo)
//! and `openai-compatible` (any chat-completions endpoint).

pub mod demo;
pub mod openai_compat;
pub mod runner;

pub use demo::DemoAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use runner::{GenerateConfig, ProviderAdapter, Runner, TurnResult};
