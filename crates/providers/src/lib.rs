//! Language model provider implementations for ForgeLoop.
//!
//! All providers implement the `forgeloop_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
