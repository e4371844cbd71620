//! Error types for OpenTV EPG acquisition.
//!
//! Per-record and per-section failures ([`RecordError`], [`DecodeError`]) are
//! recovered where they happen. Only [`EpgError`] crosses the session boundary.

use thiserror::Error;

use crate::acquisition::TableGroup;

/// A structure in a section body could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A declared length runs past the buffer, or a required field is missing.
    #[error("Malformed record at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
}

impl RecordError {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        RecordError::Malformed { offset, reason }
    }
}

/// Compressed text could not be expanded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bit path left the dictionary tree.
    #[error("Invalid code at bit offset {bit_offset}")]
    InvalidCode { bit_offset: usize },

    /// The dictionary has no entries.
    #[error("Dictionary is empty")]
    EmptyDictionary,
}

/// Failure reported by a section queue collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Section delivery stopped because the source failed.
    #[error("Section source failed: {0}")]
    SourceFailed(String),

    /// The queue was closed while the loop still expected data.
    #[error("Section queue closed")]
    Closed,
}

/// Session-level errors.
#[derive(Error, Debug)]
pub enum EpgError {
    /// Section delivery for one table group failed. Ends the current frequency.
    #[error("Acquisition failed for {group} group: {source}")]
    AcquisitionFailed {
        group: TableGroup,
        #[source]
        source: DeliveryError,
    },

    /// The text dictionary for the configured country could not be loaded.
    #[error("Failed to load dictionary for {country}: {reason}")]
    DictionaryLoadFailed { country: String, reason: String },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background acquisition task stopped abnormally.
    #[error("Acquisition task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EpgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RecordError::malformed(12, "name record missing");
        assert_eq!(
            err.to_string(),
            "Malformed record at offset 12: name record missing"
        );

        let err = EpgError::AcquisitionFailed {
            group: TableGroup::Titles,
            source: DeliveryError::SourceFailed("demux lost".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Acquisition failed for titles group: Section source failed: demux lost"
        );
    }
}
