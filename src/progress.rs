//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ClassifierConfigBuilder::progress_callback`]. The CLI uses
//! it to drive a progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use faxtriage::{BatchProgressCallback, ClassifierConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_document_complete(&self, _index: usize, _total: usize, _filename: &str, _label: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ClassifierConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it works through documents.
///
/// All methods default to no-ops. `index` is 1-based.
pub trait BatchProgressCallback: Send + Sync {
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    fn on_document_start(&self, index: usize, total: usize, filename: &str) {
        let _ = (index, total, filename);
    }

    /// `label` is the final document type (after the confidence clamp).
    fn on_document_complete(&self, index: usize, total: usize, filename: &str, label: &str) {
        let _ = (index, total, filename, label);
    }

    /// The document produced an error row instead of a classification.
    fn on_document_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let _ = (index, total, filename, error);
    }

    fn on_batch_complete(&self, total_documents: usize, error_count: usize) {
        let _ = (total_documents, error_count);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::ClassifierConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
