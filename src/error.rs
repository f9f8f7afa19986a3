use std::path::PathBuf;

use thiserror::Error;

use crate::checks::Issue;

/// Pipeline stage a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Opening the input and resolving the descriptor inside a package
    Open,
    /// XML well-formedness
    Parse,
    /// DSPL XML Schema conformance
    Schema,
    /// Building the dataset model (and loading data files at full level)
    Load,
    /// Model consistency checks
    Model,
    /// Data consistency checks
    Data,
    /// Writing to the output sink
    Output,
}

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Error opening XML file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error opening zip file {path}: {details}")]
    OpenArchive { path: PathBuf, details: String },

    #[error("Error: zip file {path} does not have any XML files")]
    NoXmlInArchive { path: PathBuf },

    #[error("Error: zip file {path} contains multiple XML files: {}", .entries.join(", "))]
    MultipleXmlInArchive { path: PathBuf, entries: Vec<String> },

    #[error("Error extracting zip file {path}: {details}")]
    Extract { path: PathBuf, details: String },

    #[error("Error parsing XML file {path}: {details}")]
    XmlParse { path: PathBuf, details: String },

    #[error("Error loading DSPL schema: {details}")]
    SchemaLoad { details: String },

    #[error("XML file does not validate against DSPL schema ({error_count} errors)")]
    SchemaInvalid {
        error_count: usize,
        errors: Vec<String>,
    },

    #[error("Error while trying to parse DSPL dataset: {details}")]
    DatasetLoad { details: String },

    #[error("DSPL model check failed with {} issue(s)", .issues.len())]
    ModelInconsistent { issues: Vec<Issue> },

    #[error("DSPL data check failed with {} issue(s)", .issues.len())]
    DataInconsistent { issues: Vec<Issue> },

    #[error("Error writing output: {0}")]
    Output(#[from] std::io::Error),
}

impl CheckError {
    pub fn stage(&self) -> Stage {
        match self {
            CheckError::OpenFile { .. }
            | CheckError::OpenArchive { .. }
            | CheckError::NoXmlInArchive { .. }
            | CheckError::MultipleXmlInArchive { .. }
            | CheckError::Extract { .. } => Stage::Open,
            CheckError::XmlParse { .. } => Stage::Parse,
            CheckError::SchemaLoad { .. } | CheckError::SchemaInvalid { .. } => Stage::Schema,
            CheckError::DatasetLoad { .. } => Stage::Load,
            CheckError::ModelInconsistent { .. } => Stage::Model,
            CheckError::DataInconsistent { .. } => Stage::Data,
            CheckError::Output(_) => Stage::Output,
        }
    }

    /// Consistency issues carried by model and data failures
    pub fn issues(&self) -> &[Issue] {
        match self {
            CheckError::ModelInconsistent { issues } | CheckError::DataInconsistent { issues } => {
                issues
            }
            _ => &[],
        }
    }

    pub(crate) fn load(details: impl Into<String>) -> Self {
        CheckError::DatasetLoad {
            details: details.into(),
        }
    }
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: null pointer returned")]
    SchemaParseFailed,

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("File validation failed with code {code}: {file}")]
    ValidationFailed { code: i32, file: PathBuf },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Path cannot be passed to libxml2: {file}")]
    InvalidPath { file: PathBuf },
}

impl From<LibXml2Error> for CheckError {
    fn from(err: LibXml2Error) -> Self {
        match err {
            LibXml2Error::InvalidPath { file } => CheckError::OpenFile {
                path: file,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path cannot be passed to libxml2",
                ),
            },
            other => CheckError::SchemaLoad {
                details: other.to_string(),
            },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CheckError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
