//! Batch decoding across files
//!
//! Each file is decoded by its own [`StreamDecoder`](crate::decoder::StreamDecoder)
//! with its own layout table, so files decode in parallel on the rayon pool.
//! Results are joined in input order before any daily aggregation happens.
//! Zipped inputs are unpacked first (see [`crate::archive`]).
//! A file that fails to decode, or decodes without a start time, is reported
//! in [`BatchReport::failures`] and never affects the rest of the batch.

use crate::archive::activity_bytes;
use crate::config::DecoderOptions;
use crate::error::Rejection;
use crate::extractor::extract_summary;
use crate::types::{ActivitySummary, FileFailure};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One activity file handed to the batch decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInput {
    /// Caller-chosen identity, usually the file name
    pub id: String,
    pub bytes: Vec<u8>,
}

impl BatchInput {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            bytes,
        }
    }
}

/// A successfully summarized file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedFile {
    pub id: String,
    pub summary: ActivitySummary,
}

/// Outcome of a batch decode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub decoded: Vec<DecodedFile>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.decoded.len() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl FileFailure {
    pub fn from_rejection(id: impl Into<String>, rejection: &Rejection) -> Self {
        Self {
            id: id.into(),
            code: rejection.code().to_string(),
            message: rejection.to_string(),
        }
    }
}

/// Decode and summarize every input, in parallel across files.
pub fn decode_batch(inputs: &[BatchInput], options: DecoderOptions) -> BatchReport {
    let outcomes: Vec<(&str, Result<ActivitySummary, Rejection>)> = inputs
        .par_iter()
        .map(|input| {
            let outcome = activity_bytes(&input.bytes)
                .and_then(|bytes| extract_summary(&bytes, options));
            (input.id.as_str(), outcome)
        })
        .collect();

    let mut report = BatchReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(summary) => report.decoded.push(DecodedFile {
                id: id.to_string(),
                summary,
            }),
            Err(rejection) => {
                warn!(file = id, code = rejection.code(), "{rejection}");
                report.failures.push(FileFailure::from_rejection(id, &rejection));
            }
        }
    }

    info!(
        files = inputs.len(),
        decoded = report.decoded.len(),
        failed = report.failures.len(),
        "batch decoded"
    );
    report
}
