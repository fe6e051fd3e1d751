//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn ProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as each stage works through its pages. The CLI uses this to drive
//! an indicatif progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2html::{PipelineConfig, ProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ProgressCallback for Counter {
//!     fn on_page_complete(&self, _stage: Stage, _page: u32) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three independently runnable pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// PDF → page images.
    Render,
    /// Page images → response records.
    Annotate,
    /// Response records → fragments + combined document.
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Render => "render",
            Stage::Annotate => "annotate",
            Stage::Extract => "extract",
        })
    }
}

/// Called by the pipeline stages as they process each page.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// annotator reports pages from several in-flight requests. All methods
/// default to no-ops.
pub trait ProgressCallback: Send + Sync {
    /// Called once per stage, before the first page.
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let _ = (stage, total_pages);
    }

    /// Called just before a page is processed.
    fn on_page_start(&self, stage: Stage, page: u32) {
        let _ = (stage, page);
    }

    /// Called when a page produced its artifact.
    fn on_page_complete(&self, stage: Stage, page: u32) {
        let _ = (stage, page);
    }

    /// Called when a page was skipped because of a per-page error.
    fn on_page_error(&self, stage: Stage, page: u32, error: &str) {
        let _ = (stage, page, error);
    }

    /// Called once per stage after every page has been attempted.
    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        let _ = (stage, total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProgressCallback for NoopProgressCallback {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Tracking {
        completes: AtomicUsize,
        errors: AtomicUsize,
        stages: Mutex<Vec<(Stage, usize)>>,
    }

    impl ProgressCallback for Tracking {
        fn on_stage_start(&self, stage: Stage, total_pages: usize) {
            self.stages.lock().unwrap().push((stage, total_pages));
        }

        fn on_page_complete(&self, _stage: Stage, _page: u32) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _stage: Stage, _page: u32, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Render, 5);
        cb.on_page_start(Stage::Render, 1);
        cb.on_page_complete(Stage::Render, 1);
        cb.on_page_error(Stage::Annotate, 2, "boom");
        cb.on_stage_complete(Stage::Extract, 5, 4);
    }

    #[test]
    fn tracking_callback_through_arc_dyn() {
        let tracker = Arc::new(Tracking::default());
        let cb: Arc<dyn ProgressCallback> = tracker.clone();

        cb.on_stage_start(Stage::Annotate, 3);
        cb.on_page_complete(Stage::Annotate, 1);
        cb.on_page_error(Stage::Annotate, 2, "timeout");
        cb.on_page_complete(Stage::Annotate, 3);

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.stages.lock().unwrap(), vec![(Stage::Annotate, 3)]);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Render.to_string(), "render");
        assert_eq!(Stage::Annotate.to_string(), "annotate");
        assert_eq!(Stage::Extract.to_string(), "extract");
    }
}
