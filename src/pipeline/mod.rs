//! Pipeline stages for datasheet extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets the driver loop in
//! [`crate::run`] compose them without any stage knowing about the state
//! machine.
//!
//! ## Data Flow
//!
//! ```text
//! markdown ──▶ chunk ──▶ anchor ──▶ tables+score ──▶ extract ──▶ validate
//! (cleaned)   (split)   (screen)   (attempt-1 set)  (LLM loop)  (dedup)
//! ```
//!
//! 1. [`chunk`]    — clean the converted markdown and split it into
//!    bounded-size, section-aligned chunks
//! 2. [`anchor`]   — derive the document's component identity and screening
//!    classification from the opening excerpt (one model call, fail-open)
//! 3. [`tables`]   — isolate markdown tables and their nearest preceding
//!    headings; their concatenation is the attempt-1 chunking input
//! 4. [`score`]    — rank chunks by relevance to the anchor identity and
//!    select the attempt-1 candidate set
//! 5. [`extract`]  — per-chunk model call with the parse-and-repair
//!    sub-machine; the only stage with network I/O besides `anchor`
//! 6. [`validate`] — deterministic merge of partial records into one
//!    canonical record per part number

pub mod anchor;
pub mod chunk;
pub mod extract;
pub mod score;
pub mod tables;
pub mod validate;
