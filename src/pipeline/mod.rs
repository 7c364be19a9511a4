//! Pipeline stages for fax classification.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ quality ──▶ encode ──▶ request ──▶ llm ──▶ response
//! (path)   (pdfium)   (luma stats) (base64)   (prompt)   (retry)  (schema)
//! ```
//!
//! 1. [`input`]   : validate a local path, scan a directory for PDFs
//! 2. [`render`]  : rasterise the capped page prefix; pdfium runs in
//!    `spawn_blocking`
//! 3. [`quality`] : grade each page from brightness and contrast
//! 4. [`encode`]  : PNG-encode and base64-wrap each page
//! 5. [`request`] : instruction block plus images, in page order
//! 6. [`llm`]     : the provider call, wrapped in [`retry`]
//! 7. [`response`]: fence stripping, defaults, schema check, clamp, fallback

pub mod encode;
pub mod input;
pub mod llm;
pub mod quality;
pub mod render;
pub mod request;
pub mod response;
pub mod retry;
