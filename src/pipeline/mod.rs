//! Pipeline stages for exam-paper ingestion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the rasteriser or OCR backend can be swapped without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ validate ──▶ page_count ──▶ render ──▶ encode ──▶ ocr
//! (path)    (8 KB scan)  (pdfium/scan)  (pdfium)   (PNG)      (tesseract)
//!    │
//!    └──▶ docx (zip + XML, no OCR)
//! ```
//!
//! 1. [`input`]       classify the upload and check it exists and fits
//! 2. [`validate`]    structural PDF checks on the first few kilobytes
//! 3. [`page_count`]  authoritative count with a byte-scan fallback
//! 4. [`render`]      rasterise one page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 5. [`encode`]      PNG-encode the rendered page
//! 6. [`ocr`]         recognise text; the only stage that spawns processes
//! 7. [`docx`]        Word documents skip rendering and OCR entirely

pub mod docx;
pub mod encode;
pub mod input;
pub mod ocr;
pub mod page_count;
pub mod render;
pub mod validate;
