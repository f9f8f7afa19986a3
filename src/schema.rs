use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CheckError, Result};
use crate::libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};

/// DSPL 2010 schema shipped with the binary
pub const DSPL_SCHEMA: &str = include_str!("../schemas/dspl.xsd");

/// Namespace of DSPL 2010 descriptors
pub const DSPL_NAMESPACE: &str = "http://schemas.google.com/dspl/2010";

/// Where the XML Schema comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaSource {
    #[default]
    Embedded,
    File(PathBuf),
}

impl SchemaSource {
    pub fn from_option(path: Option<PathBuf>) -> Self {
        path.map(SchemaSource::File).unwrap_or_default()
    }
}

/// A parsed schema ready to validate descriptors
pub struct DsplSchema {
    wrapper: LibXml2Wrapper,
    schema: XmlSchemaPtr,
}

impl DsplSchema {
    pub fn load(source: &SchemaSource) -> Result<Self> {
        let wrapper = LibXml2Wrapper::new();
        let bytes = match source {
            SchemaSource::Embedded => DSPL_SCHEMA.as_bytes().to_vec(),
            SchemaSource::File(path) => {
                std::fs::read(path).map_err(|e| CheckError::SchemaLoad {
                    details: format!("cannot read {}: {}", path.display(), e),
                })?
            }
        };
        debug!(?source, bytes = bytes.len(), "parsing XML schema");

        let schema = wrapper.parse_schema_from_memory(&bytes).map_err(|failure| {
            let mut details = failure.error.to_string();
            for message in failure.messages {
                details.push_str("\n  ");
                details.push_str(&message);
            }
            CheckError::SchemaLoad { details }
        })?;

        Ok(Self { wrapper, schema })
    }

    /// Check the descriptor at `path`.
    ///
    /// Schema violations become `CheckError::SchemaInvalid`.
    pub fn validate(&self, path: &Path) -> Result<()> {
        match self.wrapper.validate_file(&self.schema, path)? {
            ValidationResult::Valid => Ok(()),
            // The return code is an error code, not a count.
            ValidationResult::Invalid { errors, .. } => Err(CheckError::SchemaInvalid {
                error_count: errors.len().max(1),
                errors,
            }),
        }
    }
}
