//! Pipeline stages for PDF-to-quiz generation.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and collaborators can be swapped without touching
//! the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ invoke ──▶ llm ──▶ postprocess
//! (bytes/path/URI) (lopdf) (prompt) (model) (JSON cleanup)
//! ```
//!
//! 1. [`input`]   — resolve a [`input::DocumentReference`] to a byte buffer
//! 2. [`extract`] — per-page tolerant text extraction; runs in `spawn_blocking`
//! 3. [`invoke`]  — pull the named prompt, bind the text, validate the result
//! 4. [`llm`]     — schema-constrained generation over a chat model
//! 5. [`postprocess`] — strip fences and prose around the model's JSON reply

pub mod extract;
pub mod input;
pub mod invoke;
pub mod llm;
pub mod postprocess;
