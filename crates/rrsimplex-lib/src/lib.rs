//! RR-interval extraction and compositional normalization for single-lead ECG.
//!
//! A recording is loaded from a delimited file, its sampling rate derived from
//! the timestamp column, invalid samples filled, R-peaks located, and the
//! resulting RR intervals grouped into non-overlapping triplets that are each
//! mapped onto the 2-simplex. Derived tables and plots are stored as flat files
//! and can be bundled into a zip archive.

pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod signal;
pub mod storage;
pub mod synthetic;

pub use config::{LoaderSettings, SimplexConfig, StorageConfig};
pub use detectors::ecg::{
    detect_peak_indices, BeatDetector, EcgPipelineConfig, PanTompkinsDetector,
};
pub use error::{ErrorKind, Failure, SimplexError};
pub use metrics::triplets::{normalize_triplets, SimplexPoint, TripletNormalization};
pub use pipeline::{Pipeline, ProcessOutcome, ProcessResponse};
pub use signal::*;
pub use storage::{ArtifactStore, ExportBundle, ExportSelection, ImageFormat};
