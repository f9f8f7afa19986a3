//! # dspl-validate Library
//!
//! Checks DSPL (Dataset Publishing Language) dataset packages: the XML
//! descriptor against the DSPL schema, the dataset model for consistency, and
//! the CSV data files it references.

pub mod checks;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod libxml2;
pub mod model;
pub mod output;
pub mod package;
pub mod schema;
pub mod validator;

pub use checks::{DataChecker, Issue, IssueKind, ModelChecker};
pub use cli::Cli;
pub use config::{Config, ConfigError, ConfigManager, EnvProvider, SystemEnvProvider};
pub use data::{DatePattern, TableData};
pub use error::{CheckError, LibXml2Error, Stage};
pub use libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
pub use model::{ConceptRef, DataType, Dataset, DatasetLoader};
pub use output::Output;
pub use package::{DatasetPackage, PackageKind};
pub use schema::{DSPL_NAMESPACE, DSPL_SCHEMA, DsplSchema, SchemaSource};
pub use validator::{CheckingLevel, ValidationConfig, ValidationReport, Validator};
