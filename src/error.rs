use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid source database: {0} (expected vdjdb or iedb)")]
    InvalidSource(String),

    #[error("invalid locus code: {0}")]
    InvalidLocus(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("VDJdb request failed: {0}")]
    VdjdbHttp(String),

    #[error("VDJdb returned status {status}: {message}")]
    VdjdbStatus { status: u16, message: String },

    #[error("IEDB request failed: {0}")]
    IedbHttp(String),

    #[error("IEDB returned status {status}: {message}")]
    IedbStatus { status: u16, message: String },

    #[error("VDJdb version listing is empty")]
    EmptyVersionListing,

    #[error("archive {archive} has no entry matching {entry}")]
    ArchiveEntryMissing { archive: String, entry: String },

    #[error("failed to parse source table: {0}")]
    TableParse(String),

    #[error("source table has no column {0:?}")]
    #[diagnostic(help("the upstream export schema may have changed"))]
    MissingColumn(String),

    #[error("unknown dataset: {0}")]
    #[diagnostic(help("available datasets: wu2020, wu2020_3k, maynard2020"))]
    UnknownDataset(String),

    #[error("dataset request failed: {0}")]
    DatasetHttp(String),

    #[error("dataset host returned status {status}: {message}")]
    DatasetStatus { status: u16, message: String },

    #[error("checksum mismatch for {file}: expected md5 {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("no cached container for {0}")]
    DatasetNotFound(String),

    #[error("failed to encode container: {0}")]
    ContainerEncode(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
