//! Table data files
//!
//! Loading of the CSV files referenced by `<table><data><file>` and parsing of
//! individual values against their declared column type.

use std::path::Path;
use std::sync::OnceLock;

use chrono::format::{Parsed, ParseErrorKind, StrftimeItems, parse};
use regex::Regex;
use thiserror::Error;

use crate::model::{DataFile, DataType};

/// Failure to turn a data file reference into rows
#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("unsupported data file format '{format}' for '{path}'")]
    UnsupportedFormat { path: String, format: String },

    #[error("unsupported encoding '{encoding}' for '{path}'")]
    UnsupportedEncoding { path: String, encoding: String },

    #[error("error reading data file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("data file '{path}' is not valid {encoding}")]
    Decode { path: String, encoding: String },

    #[error("malformed CSV in '{path}': {details}")]
    Csv { path: String, details: String },

    #[error("data file '{path}' has no header row")]
    MissingHeader { path: String },
}

/// Header and rows of one CSV file, all fields trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Text encodings accepted for descriptors and data files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    /// Missing labels mean UTF-8.
    pub fn from_label(label: Option<&str>) -> Option<Self> {
        match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
            None | Some("utf-8") | Some("utf8") | Some("ascii") | Some("us-ascii") => {
                Some(Encoding::Utf8)
            }
            Some("iso-8859-1") | Some("iso_8859-1") | Some("latin1") | Some("latin-1")
            | Some("l1") => Some(Encoding::Latin1),
            Some(_) => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "ISO-8859-1",
        }
    }

    /// Decode `bytes`, dropping a leading UTF-8 byte order mark.
    pub fn decode(self, bytes: Vec<u8>) -> Option<String> {
        match self {
            Encoding::Utf8 => {
                let text = String::from_utf8(bytes).ok()?;
                Some(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
            }
            Encoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl TableData {
    /// Read `file` relative to `base_dir`.
    ///
    /// Errors name the file as written in the descriptor.
    pub fn load(base_dir: &Path, file: &DataFile) -> Result<Self, DataLoadError> {
        if !file.format.eq_ignore_ascii_case("csv") {
            return Err(DataLoadError::UnsupportedFormat {
                path: file.path.clone(),
                format: file.format.clone(),
            });
        }
        let encoding = Encoding::from_label(file.encoding.as_deref()).ok_or_else(|| {
            DataLoadError::UnsupportedEncoding {
                path: file.path.clone(),
                encoding: file.encoding.clone().unwrap_or_default(),
            }
        })?;

        let bytes = std::fs::read(base_dir.join(&file.path)).map_err(|source| {
            DataLoadError::Read {
                path: file.path.clone(),
                source,
            }
        })?;

        let text = encoding
            .decode(bytes)
            .ok_or_else(|| DataLoadError::Decode {
                path: file.path.clone(),
                encoding: encoding.name().to_string(),
            })?;

        Self::from_csv(&file.path, &text)
    }

    fn from_csv(path: &str, text: &str) -> Result<Self, DataLoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let csv_error = |e: csv::Error| DataLoadError::Csv {
            path: path.to_string(),
            details: e.to_string(),
        };

        let header: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if header.iter().all(String::is_empty) {
            return Err(DataLoadError::MissingHeader {
                path: path.to_string(),
            });
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { header, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.header.iter().position(|h| h == id)
    }

    /// `(row number, value)` pairs of one column; row 1 is the header
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = (usize, &str)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(move |(i, row)| row.get(index).map(|v| (i + 2, v.as_str())))
    }
}

static PATTERN_TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn pattern_token_regex() -> &'static Regex {
    PATTERN_TOKEN_REGEX.get_or_init(|| {
        Regex::new(r"'[^']*'|y+|M+|d+|H+|m+|s+|[A-Za-z]+|[^A-Za-z']+")
            .expect("Failed to compile date pattern regex")
    })
}

/// A DSPL date format (`yyyy-MM-dd` style) compiled to a strftime string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    source: String,
    strftime: String,
}

impl DatePattern {
    pub fn compile(pattern: &str) -> Result<Self, String> {
        if pattern.trim().is_empty() {
            return Err("empty date format".to_string());
        }

        let mut strftime = String::new();
        let mut end = 0;
        for token in pattern_token_regex().find_iter(pattern) {
            if token.start() != end {
                return Err(format!("unterminated quote in date format '{}'", pattern));
            }
            end = token.end();

            let text = token.as_str();
            let letters = text.len();
            match text.as_bytes()[0] {
                b'\'' if letters == 2 => strftime.push('\''),
                b'\'' => strftime.push_str(&text[1..letters - 1].replace('%', "%%")),
                b'y' if letters == 2 => strftime.push_str("%y"),
                b'y' => strftime.push_str("%Y"),
                b'M' if letters <= 2 => strftime.push_str("%m"),
                b'M' if letters == 3 => strftime.push_str("%b"),
                b'M' => strftime.push_str("%B"),
                b'd' => strftime.push_str("%d"),
                b'H' => strftime.push_str("%H"),
                b'm' => strftime.push_str("%M"),
                b's' => strftime.push_str("%S"),
                c if c.is_ascii_alphabetic() => {
                    return Err(format!(
                        "unsupported letter '{}' in date format '{}'",
                        char::from(c),
                        pattern
                    ));
                }
                _ => strftime.push_str(&text.replace('%', "%%")),
            }
        }
        if end != pattern.len() {
            return Err(format!("unterminated quote in date format '{}'", pattern));
        }

        Ok(Self {
            source: pattern.to_string(),
            strftime,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `value` is a (possibly partial) date in this format
    pub fn matches(&self, value: &str) -> bool {
        let mut parsed = Parsed::new();
        if parse(&mut parsed, value, StrftimeItems::new(&self.strftime)).is_err() {
            return false;
        }
        match parsed.to_naive_date() {
            Ok(_) => true,
            Err(e) => e.kind() == ParseErrorKind::NotEnough,
        }
    }
}

/// Check a single non-empty value against its column type
pub fn parse_value(
    data_type: DataType,
    pattern: Option<&DatePattern>,
    value: &str,
) -> Result<(), String> {
    let ok = match data_type {
        DataType::String => true,
        DataType::Integer => value.parse::<i64>().is_ok(),
        DataType::Float => value.parse::<f64>().is_ok_and(f64::is_finite),
        DataType::Boolean => {
            value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
        }
        DataType::Date => match pattern {
            Some(p) => p.matches(value),
            None => return Err("date column has no usable format".to_string()),
        },
    };
    if ok {
        Ok(())
    } else {
        match (data_type, pattern) {
            (DataType::Date, Some(p)) => Err(format!(
                "'{}' is not a date in format '{}'",
                value,
                p.as_str()
            )),
            _ => Err(format!("'{}' is not a valid {}", value, data_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn csv_file(path: &str) -> DataFile {
        DataFile {
            path: path.to_string(),
            format: "csv".to_string(),
            encoding: Some("utf-8".to_string()),
        }
    }

    #[test]
    fn test_load_csv() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("data.csv"),
            "\u{feff}country, name\nfr, France\n\"us\",\"United States, The\"\n",
        )
        .unwrap();

        let data = TableData::load(dir.path(), &csv_file("data.csv")).unwrap();
        assert_eq!(data.header, vec!["country", "name"]);
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.rows[1][1], "United States, The");
        assert_eq!(data.column_index("name"), Some(1));

        let values: Vec<_> = data.column_values(0).collect();
        assert_eq!(values, vec![(2, "fr"), (3, "us")]);
    }

    #[test]
    fn test_missing_file_keeps_reference() {
        let dir = TempDir::new().unwrap();
        let err = TableData::load(dir.path(), &csv_file("non_existent_file.csv")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'non_existent_file.csv'"));
        assert!(!msg.contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ragged.csv"), "a,b\n1,2\n3\n").unwrap();

        let err = TableData::load(dir.path(), &csv_file("ragged.csv")).unwrap_err();
        assert!(matches!(err, DataLoadError::Csv { .. }));
    }

    #[test]
    fn test_unsupported_format_and_encoding() {
        let dir = TempDir::new().unwrap();
        let mut file = csv_file("data.tsv");
        file.format = "tsv".to_string();
        assert!(matches!(
            TableData::load(dir.path(), &file),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));

        let mut file = csv_file("data.csv");
        file.encoding = Some("utf-16".to_string());
        assert!(matches!(
            TableData::load(dir.path(), &file),
            Err(DataLoadError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_latin1_encoding() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("latin.csv"), b"city\nS\xe3o Paulo\n").unwrap();
        let mut file = csv_file("latin.csv");
        file.encoding = Some("ISO-8859-1".to_string());

        let data = TableData::load(dir.path(), &file).unwrap();
        assert_eq!(data.rows[0][0], "São Paulo");
    }

    #[test]
    fn test_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.csv"), b"city\nS\xe3o Paulo\n").unwrap();

        let err = TableData::load(dir.path(), &csv_file("bad.csv")).unwrap_err();
        assert!(matches!(err, DataLoadError::Decode { .. }));
    }

    #[test]
    fn test_date_patterns() {
        let year = DatePattern::compile("yyyy").unwrap();
        assert!(year.matches("2010"));
        assert!(!year.matches("20x0"));
        assert!(!year.matches("2010-01"));

        let month = DatePattern::compile("yyyy-MM").unwrap();
        assert!(month.matches("2010-07"));
        assert!(!month.matches("2010-13"));

        let day = DatePattern::compile("MM/dd/yyyy").unwrap();
        assert!(day.matches("02/28/2011"));
        assert!(!day.matches("02/30/2011"));

        let quoted = DatePattern::compile("yyyy'Q'MM").unwrap();
        assert!(quoted.matches("2010Q03"));
    }

    #[test]
    fn test_bad_date_patterns() {
        assert!(DatePattern::compile("").is_err());
        assert!(DatePattern::compile("yyyy-ww").is_err());
        assert!(DatePattern::compile("yyyy'Q").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert!(parse_value(DataType::Integer, None, "42").is_ok());
        assert!(parse_value(DataType::Integer, None, "4.2").is_err());
        assert!(parse_value(DataType::Float, None, "4.2e3").is_ok());
        assert!(parse_value(DataType::Float, None, "NaN").is_err());
        assert!(parse_value(DataType::Boolean, None, "TRUE").is_ok());
        assert!(parse_value(DataType::Boolean, None, "yes").is_err());
        assert!(parse_value(DataType::String, None, "anything").is_ok());

        let pattern = DatePattern::compile("yyyy").unwrap();
        let err = parse_value(DataType::Date, Some(&pattern), "soon").unwrap_err();
        assert!(err.contains("format 'yyyy'"));
        assert!(parse_value(DataType::Date, None, "2010").is_err());
    }
}
