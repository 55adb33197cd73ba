//! Capture sidecar metadata (SigMF-style JSON).
//!
//! A recording is a raw data file plus a `.sigmf-meta` descriptor holding:
//!
//! - **global**: data type, sample rate, free-text description
//! - **captures**: segments of the data file, each with its own center
//!   frequency, ISO-8601 start time and optional header size
//! - **annotations**: frequency sub-bands (lower/upper edge, label, comment)
//!   anchored to a sample range
//!
//! Two annotations may start at the same sample; their relative order carries
//! no meaning and is accepted as is.
//!
//! # Example
//!
//! ```
//! use iqfm::IqFormat;
//! use iqfm::meta::{SigMfAnnotation, SigMfMeta};
//!
//! let mut meta = SigMfMeta::new(IqFormat::Cf32, 2_400_000.0);
//! meta.add_capture(0, Some(100.0e6), None);
//! meta.add_annotation(SigMfAnnotation::band(0, 1_000, 99.9e6, 100.1e6, "broadcast FM"));
//! assert!(meta.validate().is_ok());
//! ```

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::iqread::IqConfig;
use crate::{IqFormat, expanduser};

pub const SIGMF_VERSION: &str = "1.0.0";
pub const META_EXTENSION: &str = "sigmf-meta";
pub const DATA_EXTENSION: &str = "sigmf-data";

/// Global recording metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigMfGlobal {
    #[serde(rename = "core:datatype")]
    pub datatype: String,

    #[serde(rename = "core:sample_rate")]
    pub sample_rate: f64,

    #[serde(rename = "core:version")]
    pub version: String,

    #[serde(rename = "core:description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "core:author", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(rename = "core:hw", skip_serializing_if = "Option::is_none")]
    pub hw: Option<String>,

    /// Fields from other namespaces, kept verbatim
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// One capture segment of the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigMfCapture {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,

    /// Center frequency in Hz
    #[serde(rename = "core:frequency", skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,

    /// ISO-8601 start time of the segment
    #[serde(rename = "core:datetime", skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Bytes to skip before the samples of this segment
    #[serde(rename = "core:header_bytes", skip_serializing_if = "Option::is_none")]
    pub header_bytes: Option<u64>,

    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// A frequency sub-band of interest over a sample range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigMfAnnotation {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,

    #[serde(rename = "core:sample_count", skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,

    #[serde(rename = "core:freq_lower_edge", skip_serializing_if = "Option::is_none")]
    pub freq_lower_edge: Option<f64>,

    #[serde(rename = "core:freq_upper_edge", skip_serializing_if = "Option::is_none")]
    pub freq_upper_edge: Option<f64>,

    #[serde(rename = "core:label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(rename = "core:comment", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl SigMfAnnotation {
    /// A sub-band annotation with a free-text comment.
    pub fn band(
        sample_start: u64,
        sample_count: u64,
        freq_lower_edge: f64,
        freq_upper_edge: f64,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            sample_start,
            sample_count: Some(sample_count),
            freq_lower_edge: Some(freq_lower_edge),
            freq_upper_edge: Some(freq_upper_edge),
            label: None,
            comment: Some(comment.into()),
            extensions: BTreeMap::new(),
        }
    }

    /// Sample range covered; an annotation without a count runs to the end.
    pub fn sample_range(&self) -> Range<u64> {
        let end = match self.sample_count {
            Some(count) => self.sample_start.saturating_add(count),
            None => u64::MAX,
        };
        self.sample_start..end
    }
}

/// Complete sidecar descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigMfMeta {
    pub global: SigMfGlobal,
    #[serde(default)]
    pub captures: Vec<SigMfCapture>,
    #[serde(default)]
    pub annotations: Vec<SigMfAnnotation>,
}

impl SigMfMeta {
    pub fn new(format: IqFormat, sample_rate: f64) -> Self {
        Self {
            global: SigMfGlobal {
                datatype: format.sigmf_datatype().to_string(),
                sample_rate,
                version: SIGMF_VERSION.to_string(),
                description: None,
                author: None,
                hw: None,
                extensions: BTreeMap::new(),
            },
            captures: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a descriptor. Annotations come back sorted by start,
    /// ties keeping their listed order.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expanduser(path.as_ref().to_path_buf());
        let json = std::fs::read_to_string(&path)?;
        let mut meta = Self::from_json(&json)?;
        meta.validate()?;
        meta.annotations.sort_by_key(|a| a.sample_start);
        debug!(
            path = %path.display(),
            captures = meta.captures.len(),
            annotations = meta.annotations.len(),
            "loaded capture metadata"
        );
        Ok(meta)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = expanduser(path.as_ref().to_path_buf());
        std::fs::write(&path, self.to_json()?)?;
        Ok(())
    }

    pub fn iq_format(&self) -> Result<IqFormat> {
        self.global.datatype.parse()
    }

    /// Append a capture segment stamped with `datetime`, or the current time.
    pub fn add_capture(
        &mut self,
        sample_start: u64,
        frequency: Option<f64>,
        datetime: Option<DateTime<Utc>>,
    ) {
        let datetime = datetime.unwrap_or_else(Utc::now);
        self.captures.push(SigMfCapture {
            sample_start,
            frequency,
            datetime: Some(datetime.to_rfc3339_opts(SecondsFormat::Millis, true)),
            header_bytes: None,
            extensions: BTreeMap::new(),
        });
    }

    /// Insert an annotation after every annotation starting at or before it.
    pub fn add_annotation(&mut self, annotation: SigMfAnnotation) {
        let at = self
            .annotations
            .partition_point(|a| a.sample_start <= annotation.sample_start);
        self.annotations.insert(at, annotation);
    }

    /// Check the descriptor against the record schema.
    ///
    /// Captures must start at strictly increasing sample indices. Annotations
    /// may be listed in any order.
    pub fn validate(&self) -> Result<()> {
        let rate = self.global.sample_rate;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::malformed(format!(
                "sample rate must be positive, got {rate}"
            )));
        }
        self.iq_format()
            .map_err(|e| Error::malformed(format!("datatype {:?}: {e}", self.global.datatype)))?;

        for pair in self.captures.windows(2) {
            if pair[1].sample_start <= pair[0].sample_start {
                return Err(Error::malformed(format!(
                    "capture starting at sample {} is not after the one at {}",
                    pair[1].sample_start, pair[0].sample_start
                )));
            }
        }
        for capture in &self.captures {
            if let Some(datetime) = &capture.datetime {
                parse_datetime(datetime)?;
            }
        }

        for annotation in &self.annotations {
            if let (Some(lo), Some(hi)) = (annotation.freq_lower_edge, annotation.freq_upper_edge)
                && lo > hi
            {
                return Err(Error::malformed(format!(
                    "annotation at sample {}: lower edge {lo} Hz above upper edge {hi} Hz",
                    annotation.sample_start
                )));
            }
        }
        Ok(())
    }

    /// The capture segment that sample `index` belongs to.
    pub fn capture_at(&self, index: u64) -> Option<&SigMfCapture> {
        self.captures
            .iter()
            .take_while(|c| c.sample_start <= index)
            .last()
    }

    /// Annotations whose sample range intersects `range`.
    pub fn annotations_overlapping(
        &self,
        range: Range<u64>,
    ) -> impl Iterator<Item = &SigMfAnnotation> {
        self.annotations.iter().filter(move |a| {
            let own = a.sample_range();
            own.start < range.end && range.start < own.end
        })
    }

    /// Reader configuration for the data file described by this sidecar,
    /// taken from the first capture segment.
    pub fn iq_config(&self, chunk_size: usize) -> Result<IqConfig> {
        let mut config = IqConfig::new(self.global.sample_rate, chunk_size, self.iq_format()?);
        if let Some(first) = self.captures.first() {
            if let Some(frequency) = first.frequency {
                config = config.with_center_freq(frequency);
            }
            if let Some(header_bytes) = first.header_bytes {
                config = config.with_header_bytes(header_bytes);
            }
        }
        Ok(config)
    }
}

/// Parse an ISO-8601 / RFC 3339 timestamp.
pub fn parse_datetime(datetime: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(datetime)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Timestamp(format!("{datetime:?}: {e}")))
}

/// The data file paired with a `.sigmf-meta` path.
pub fn data_path_for<P: AsRef<Path>>(meta_path: P) -> PathBuf {
    meta_path.as_ref().with_extension(DATA_EXTENSION)
}

/// The descriptor paired with a data file path.
pub fn meta_path_for<P: AsRef<Path>>(data_path: P) -> PathBuf {
    data_path.as_ref().with_extension(META_EXTENSION)
}
