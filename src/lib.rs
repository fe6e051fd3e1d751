//! # edgequake-pdf2html
//!
//! Convert PDF documents to HTML, one page at a time, with a vision model.
//!
//! Each page is rasterised to an image, the image is sent to the model with a
//! prompt asking for HTML in a fenced block, and the fenced block is pulled
//! out of every reply and stitched into a single document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Render    pdfium rasterises every page   → {img_dir}/p{n}.png
//!  ├─ 2. Annotate  one model call per page image  → {img_dir}/claude_responses/p{n}.json
//!  └─ 3. Extract   first ```html block per reply  → {img_dir}/p{n}.html + combined.html
//! ```
//!
//! The stages only share files, named by the contract in [`naming`]. Each can
//! be run on its own, later, or on another machine, and a partially finished
//! run is a valid input to the next stage.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2html::{process_document, AnthropicClient, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .api_key(std::env::var("ANTHROPIC_API_KEY")?)
//!         .build()?;
//!     let model = AnthropicClient::from_config(&config)?;
//!     let report = process_document("document.pdf", Path::new("output_images"), &model, &config).await?;
//!     println!("success: {}", report.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2html` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2html = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, RasterFormat};
pub use convert::{process_batch, process_document};
pub use error::{PageError, Pdf2HtmlError};
pub use naming::{page_file_name, parse_page_index, response_file_name};
pub use output::{
    AnnotationReport, BatchReport, DocumentReport, ExtractionReport, Fragment, PageImage,
    RenderOutput, ResponseRecord,
};
pub use pipeline::annotate::{annotate_dir, annotate_pages};
pub use pipeline::assemble::assemble_document;
pub use pipeline::encode::EncodedImage;
pub use pipeline::extract::{extract_dir, extract_fragment, FenceExtractor};
pub use pipeline::llm::{AnthropicClient, VisionError, VisionModel};
pub use pipeline::render::render_pdf;
pub use progress::{NoopProgressCallback, ProgressCallback, Stage};
