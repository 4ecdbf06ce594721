//! trainload - Activity-file decoder and training-load engine
//!
//! trainload turns raw activity files into a longitudinal training-load model
//! through a deterministic pipeline: stream decoding → activity summary →
//! stress score → daily totals → chronic/acute load series → versioned export.
//!
//! ## Modules
//!
//! - **Decoder**: self-describing binary record stream with per-stream layouts
//! - **Analytics**: summary extraction, stress scoring, and the load series
//! - **Surfaces**: batch processing, export encoding, C ABI, and the CLI

pub mod archive;
pub mod batch;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod extractor;
pub mod load;
pub mod pipeline;
pub mod stress;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use batch::{decode_batch, BatchInput, BatchReport};
pub use config::EngineConfig;
pub use decoder::{decode_messages, DecodedMessage, StreamDecoder};
pub use encoder::{ExportEncoder, EXPORT_SCHEMA_VERSION};
pub use error::{ComputeError, DecodeError, Rejection};
pub use extractor::{extract_summary, ActivitySummaryExtractor};
pub use load::LoadSeriesTracker;
pub use pipeline::{
    build_load_series, decode_activity, process_batch, score_activity, TrainingLoadProcessor,
};
pub use stress::StressScoreCalculator;

/// Engine version embedded in every export
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for exports
pub const PRODUCER_NAME: &str = "trainload";
