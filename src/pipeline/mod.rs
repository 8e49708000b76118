//! Pipeline stages shared by the analysis and comparison flows.
//!
//! Each submodule implements one step, so each can be tested without the
//! others and without a network.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ ingest ──▶ extract ──▶ llm ──▶ parse
//! (bytes)   (session)   (lopdf)    (chat)  (JSON + repair)
//! ```
//!
//! 1. [`upload`]  — validate a file name and its `%PDF` magic, save atomically
//! 2. [`ingest`]  — place uploads in a session directory and read them back
//! 3. [`extract`] — page text via lopdf; runs in `spawn_blocking`
//! 4. [`llm`]     — the [`llm::ChatModel`] seam; the only stage with network I/O
//! 5. [`parse`]   — typed JSON out of chatty replies, one repair call on failure

pub mod extract;
pub mod ingest;
pub mod llm;
pub mod parse;
pub mod upload;
