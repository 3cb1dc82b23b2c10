//! Pipeline stages for flipbook downloads.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own without a browser or network.
//!
//! ## Data Flow
//!
//! ```text
//! locate ──▶ expand ──▶ fetch ──▶ assemble ──▶ scratch cleanup
//! (markup)   (URLs)     (HTTP)    (lopdf)
//! ```
//!
//! 1. [`locate`]    — parse title, page count and first page location from
//!    rendered markup
//! 2. [`expand`]    — substitute page indices into the first page location
//! 3. [`fetch`]     — download pages into the [`scratch`] directory, skipping
//!    failures
//! 4. [`rasterize`] — render SVG / SVGZ pages to pixels for the assembler
//! 5. [`assemble`]  — write one PDF page per asset on a fixed canvas; runs in
//!    `spawn_blocking` because decoding is CPU-bound

pub mod assemble;
pub mod expand;
pub mod fetch;
pub mod locate;
pub mod rasterize;
pub mod scratch;
