//! Staged validation pipeline
//!
//! A run resolves the package, parses the descriptor, checks it against the
//! DSPL schema and then, depending on the checking level, loads the dataset
//! model and checks model and data consistency. Each stage stops the run on
//! failure; the error is written to the output sink and returned to the
//! caller, who decides what it means for the process.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use roxmltree::Document;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checks::{DataChecker, ModelChecker};
use crate::error::{CheckError, Result};
use crate::model::DatasetLoader;
use crate::output::{DEFAULT_MAX_LISTED, Output};
use crate::package::DatasetPackage;
use crate::schema::{DsplSchema, SchemaSource};

/// How much of the pipeline to run
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckingLevel {
    /// XML Schema conformance only
    #[value(name = "schema_only")]
    SchemaOnly,
    /// Schema plus model consistency; data files are not read
    #[value(name = "schema_and_model")]
    SchemaAndModel,
    /// Schema, model and the rows of every data file
    #[default]
    #[value(name = "full")]
    Full,
}

impl CheckingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckingLevel::SchemaOnly => "schema_only",
            CheckingLevel::SchemaAndModel => "schema_and_model",
            CheckingLevel::Full => "full",
        }
    }

    pub fn checks_model(&self) -> bool {
        *self >= CheckingLevel::SchemaAndModel
    }

    pub fn checks_data(&self) -> bool {
        *self >= CheckingLevel::Full
    }
}

impl fmt::Display for CheckingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckingLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "schema_only" => Ok(CheckingLevel::SchemaOnly),
            "schema_and_model" => Ok(CheckingLevel::SchemaAndModel),
            "full" => Ok(CheckingLevel::Full),
            other => Err(format!(
                "invalid checking level '{}' (expected schema_only, schema_and_model or full)",
                other
            )),
        }
    }
}

/// Settings for one validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    pub level: CheckingLevel,
    pub schema: SchemaSource,
    /// List every schema error and issue instead of the first few
    pub verbose: bool,
    pub max_listed: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            level: CheckingLevel::default(),
            schema: SchemaSource::default(),
            verbose: false,
            max_listed: DEFAULT_MAX_LISTED,
        }
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub level: CheckingLevel,
    /// Descriptor name as shown in messages
    pub descriptor: String,
    pub concepts: usize,
    pub slices: usize,
    pub tables: usize,
    /// Data rows checked (zero below the full level)
    pub rows: usize,
}

impl ValidationReport {
    fn new(level: CheckingLevel, package: &DatasetPackage) -> Self {
        Self {
            level,
            descriptor: package.display_name().to_string(),
            concepts: 0,
            slices: 0,
            tables: 0,
            rows: 0,
        }
    }
}

pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate the package at `path`, writing progress to `sink`.
    pub fn run<W: Write>(&self, path: &Path, sink: &mut W) -> Result<ValidationReport> {
        let mut output = Output::new(sink, self.config.verbose, self.config.max_listed);

        match self.run_stages(path, &mut output) {
            Ok(report) => {
                output.completed()?;
                info!(
                    descriptor = %report.descriptor,
                    level = %report.level,
                    rows = report.rows,
                    "validation completed"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(write_err) = output.error(&err).and_then(|_| output.flush()) {
                    warn!(error = %write_err, "could not write error to output");
                }
                debug!(stage = ?err.stage(), "validation failed");
                Err(err)
            }
        }
    }

    fn run_stages<W: Write>(
        &self,
        path: &Path,
        output: &mut Output<W>,
    ) -> Result<ValidationReport> {
        let level = self.config.level;
        let package = DatasetPackage::open(path)?;
        debug!(descriptor = %package.display_name(), %level, "validating dataset");

        output.header("Checking XML file against DSPL schema")?;
        let text = package.read_descriptor()?;
        let document = Document::parse(&text).map_err(|e| CheckError::XmlParse {
            path: PathBuf::from(package.display_name()),
            details: e.to_string(),
        })?;

        let schema = DsplSchema::load(&self.config.schema)?;
        schema.validate(package.descriptor_path())?;
        output.line("XML file validates successfully!")?;

        let mut report = ValidationReport::new(level, &package);
        if !level.checks_model() {
            return Ok(report);
        }

        output.header("Parsing DSPL dataset")?;
        let dataset = DatasetLoader::new(package.base_dir())
            .with_data(level.checks_data())
            .load(&document)?;
        output.line("Parsing completed.")?;

        output.header(if level.checks_data() {
            "Checking DSPL model and data"
        } else {
            "Checking DSPL model"
        })?;
        let issues = ModelChecker::new(&dataset).check();
        if !issues.is_empty() {
            return Err(CheckError::ModelInconsistent { issues });
        }
        if level.checks_data() {
            let issues = DataChecker::new(&dataset).check();
            if !issues.is_empty() {
                return Err(CheckError::DataInconsistent { issues });
            }
        }
        output.line("Validation successful.")?;

        report.concepts = dataset.concepts.len();
        report.slices = dataset.slices.len();
        report.tables = dataset.tables.len();
        report.rows = dataset.row_count();
        Ok(report)
    }
}
