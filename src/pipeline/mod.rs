//! Pipeline stages for scanned-PDF searchification.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌── page 1: extract → classify → deskew → preprocess → ocr → downsample ──┐
//! input ──▶  ├── page 2: …                                                             ├──▶ barrier
//!            └── page N: …                                                             ┘
//!
//! barrier ──▶ compose (bitonal ∥ color) ──▶ merge ──▶ text overlay ──▶ metadata restore
//! ```
//!
//! 1. [`input`]: validate the input PDF and resolve both paths to absolute form
//! 2. [`page`]: per-page state machine; stages run on the blocking pool
//! 3. [`compose`]: split finished pages by color class into two composite PDFs
//! 4. [`merge`]: rebuild source page order from the two streams
//! 5. [`overlay`]: lay the hOCR text layers over the pages, then re-apply
//!    the original document info and write the output atomically

pub mod compose;
pub mod input;
pub mod merge;
pub mod overlay;
pub mod page;
