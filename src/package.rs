//! Dataset package resolution
//!
//! A package is either a bare DSPL descriptor or a zip archive holding exactly
//! one descriptor plus the data files it references. Archives are extracted
//! into a temporary directory that lives as long as the `DatasetPackage`.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::bytes::Regex;
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

use crate::data::Encoding;
use crate::error::{CheckError, Result};

/// A resolved dataset package
#[derive(Debug)]
pub struct DatasetPackage {
    descriptor: PathBuf,
    display_name: String,
    kind: PackageKind,
    // Dropping the TempDir removes the extracted files.
    extracted: Option<TempDir>,
}

/// How the descriptor was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageKind {
    XmlFile,
    Archive { entry: String },
}

impl DatasetPackage {
    /// Resolve `path` into a descriptor on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| CheckError::OpenFile {
            path: path.to_path_buf(),
            source,
        })?;
        let is_file = file
            .metadata()
            .map_err(|source| CheckError::OpenFile {
                path: path.to_path_buf(),
                source,
            })?
            .is_file();
        if !is_file {
            return Err(CheckError::OpenFile {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }

        match ZipArchive::new(file) {
            Ok(archive) => Self::from_archive(path, archive),
            Err(e) if has_zip_extension(path) => Err(CheckError::OpenArchive {
                path: path.to_path_buf(),
                details: e.to_string(),
            }),
            Err(_) => {
                debug!(path = %path.display(), "treating input as a plain XML file");
                Ok(Self {
                    descriptor: path.to_path_buf(),
                    display_name: path.display().to_string(),
                    kind: PackageKind::XmlFile,
                    extracted: None,
                })
            }
        }
    }

    fn from_archive<R: Read + Seek>(path: &Path, mut archive: ZipArchive<R>) -> Result<Self> {
        let entry = single_xml_entry(path, &archive)?;
        debug!(archive = %path.display(), %entry, "extracting dataset archive");

        let extracted = TempDir::new().map_err(|e| CheckError::Extract {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
        archive
            .extract(extracted.path())
            .map_err(|e| CheckError::Extract {
                path: path.to_path_buf(),
                details: e.to_string(),
            })?;

        let relative = archive
            .by_name(&entry)
            .ok()
            .and_then(|f| f.enclosed_name())
            .ok_or_else(|| CheckError::Extract {
                path: path.to_path_buf(),
                details: format!("unsafe entry name {}", entry),
            })?;

        Ok(Self {
            descriptor: extracted.path().join(relative),
            display_name: format!("{}:{}", path.display(), entry),
            kind: PackageKind::Archive { entry },
            extracted: Some(extracted),
        })
    }

    /// Path of the descriptor on disk (inside the extraction directory for archives)
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor
    }

    /// Directory data file references are resolved against
    pub fn base_dir(&self) -> &Path {
        self.descriptor.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Stable name for messages; never mentions the extraction directory
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> &PackageKind {
        &self.kind
    }

    pub fn extraction_dir(&self) -> Option<&Path> {
        self.extracted.as_ref().map(TempDir::path)
    }

    /// Read the descriptor as text.
    ///
    /// A byte order mark wins; otherwise the encoding named in the XML
    /// declaration is used, defaulting to UTF-8.
    pub fn read_descriptor(&self) -> Result<String> {
        let parse_error = |details: String| CheckError::XmlParse {
            path: PathBuf::from(&self.display_name),
            details,
        };
        let bytes = std::fs::read(&self.descriptor).map_err(|e| parse_error(e.to_string()))?;
        decode_descriptor(bytes).map_err(parse_error)
    }
}

fn declared_encoding(bytes: &[u8]) -> Option<&[u8]> {
    static DECLARATION: OnceLock<Regex> = OnceLock::new();
    let re = DECLARATION.get_or_init(|| {
        Regex::new(r#"^\s*<\?xml\s[^>]*?encoding\s*=\s*["']([A-Za-z0-9._-]+)["']"#)
            .expect("Failed to compile XML declaration regex")
    });
    re.captures(bytes)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_bytes())
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> std::result::Result<String, String> {
    if bytes.len() % 2 != 0 {
        return Err("truncated UTF-16 document".to_string());
    }
    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| format!("invalid UTF-16: {}", e))
}

fn decode_descriptor(bytes: Vec<u8>) -> std::result::Result<String, String> {
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Encoding::Utf8
            .decode(bytes)
            .ok_or_else(|| "stream did not contain valid UTF-8".to_string());
    }

    let label = declared_encoding(&bytes).map(|l| String::from_utf8_lossy(l).into_owned());
    let encoding = Encoding::from_label(label.as_deref())
        .ok_or_else(|| format!("unsupported encoding '{}'", label.unwrap_or_default()))?;
    debug!(encoding = encoding.name(), "decoding descriptor");
    encoding
        .decode(bytes)
        .ok_or_else(|| format!("stream did not contain valid {}", encoding.name()))
}

fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn single_xml_entry<R: Read + Seek>(path: &Path, archive: &ZipArchive<R>) -> Result<String> {
    let mut entries: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/') && name.to_ascii_lowercase().ends_with(".xml"))
        .map(str::to_string)
        .collect();
    entries.sort();

    match entries.len() {
        0 => Err(CheckError::NoXmlInArchive {
            path: path.to_path_buf(),
        }),
        1 => Ok(entries.remove(0)),
        _ => Err(CheckError::MultipleXmlInArchive {
            path: path.to_path_buf(),
            entries,
        }),
    }
}
