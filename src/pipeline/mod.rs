//! Pipeline stages for workout-log extraction.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ parse ──▶ write
//! (path/URL) (pages)   (base64)  (VLM)   (JSON)    (CSV/XLSX)
//! ```
//!
//! 1. [`input`]  — resolve a path or URL and decide PDF vs image
//! 2. [`render`] — rasterise PDF pages / re-encode images into a temp dir
//! 3. [`encode`] — base64-wrap each image for the multimodal request
//! 4. [`llm`]    — the model call; the only stage with network I/O
//! 5. [`parse`]  — find the JSON object in the reply
//! 6. [`write`]  — flatten to rows and write the table

pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
pub mod write;
