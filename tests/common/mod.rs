#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use zip::write::SimpleFileOptions;

use dspl_validate::{CheckError, CheckingLevel, ValidationConfig, ValidationReport, Validator};

/// Minimal dataset: schema valid, consistent, no tables
pub const DSPL_CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<dspl xmlns="http://schemas.google.com/dspl/2010"
    xmlns:time="http://www.google.com/publicdata/dataset/google/time">
  <import namespace="http://www.google.com/publicdata/dataset/google/time"/>
  <info>
    <name>
      <value>Dataset Name</value>
    </name>
  </info>
  <provider>
    <name>
      <value>Provider Name</value>
    </name>
  </provider>
</dspl>"#;

/// Dataset whose only table points at a data file that does not exist
pub const DSPL_CONTENT_BAD_CSV_PATH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<dspl xmlns="http://schemas.google.com/dspl/2010"
    xmlns:time="http://www.google.com/publicdata/dataset/google/time">
  <import namespace="http://www.google.com/publicdata/dataset/google/time"/>
  <info>
    <name>
      <value>Dataset Name</value>
    </name>
  </info>
  <provider>
    <name>
      <value>Provider Name</value>
    </name>
  </provider>
  <tables>
    <table id="my_table">
      <column id="col1" type="string"/>
      <column id="col2" type="string"/>
      <data>
        <file format="csv" encoding="utf-8">non_existent_file.csv</file>
      </data>
    </table>
  </tables>
</dspl>"#;

pub const FIXTURE_FILES: [&str; 3] = ["dataset.xml", "countries.csv", "population.csv"];

/// Directory of the complete sample dataset
pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("population")
}

pub fn fixture_text(name: &str) -> String {
    fs::read_to_string(fixture_dir().join(name)).unwrap()
}

/// Copy the sample dataset into `dir`, replacing the named files' contents
pub fn copy_fixture(dir: &Path, overrides: &[(&str, String)]) -> PathBuf {
    for name in FIXTURE_FILES {
        let content = overrides
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| fixture_text(name));
        fs::write(dir.join(name), content).unwrap();
    }
    dir.join("dataset.xml")
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Run a validator at `level` and capture what it writes
pub fn run_validator(
    level: CheckingLevel,
    path: &Path,
) -> (Result<ValidationReport, CheckError>, String) {
    let validator = Validator::new(ValidationConfig {
        level,
        ..ValidationConfig::default()
    });
    let mut sink = Vec::new();
    let result = validator.run(path, &mut sink);
    (result, String::from_utf8(sink).unwrap())
}

/// Whether `pattern` matches anywhere in `output`, `.` matching newlines
pub fn output_matches(output: &str, pattern: &str) -> bool {
    Regex::new(&format!("(?s){}", pattern))
        .unwrap()
        .is_match(output)
}

pub const SUCCESS_PATTERN: &str =
    r"validates successfully.*Parsing completed.*Checking DSPL model and data.*Completed";
