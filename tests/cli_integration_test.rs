mod common;

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

use common::*;

/// Run the binary from an empty directory with no user configuration
fn dspl_validate(workdir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dspl-validate"))
        .args(args)
        .current_dir(workdir)
        .env("XDG_CONFIG_HOME", workdir)
        .env_remove("DSPL_VALIDATE_LEVEL")
        .env_remove("DSPL_VALIDATE_SCHEMA_FILE")
        .env_remove("DSPL_VALIDATE_VERBOSE")
        .env_remove("DSPL_VALIDATE_MAX_LISTED")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8(output.stderr.clone()).unwrap()
}

#[test]
fn test_cli_help_output() {
    let dir = TempDir::new().unwrap();
    let output = dspl_validate(dir.path(), &["--help"]);

    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.contains("--checking-level"));
    assert!(help.contains("--schema-file"));
    assert!(help.contains("--verbose"));
    assert!(help.contains("--config"));
    assert!(help.contains("schema_and_model"));
}

#[test]
fn test_cli_version_output() {
    let dir = TempDir::new().unwrap();
    let output = dspl_validate(dir.path(), &["--version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("dspl-validate 0.2.0"));
}

#[test]
fn test_cli_valid_dataset() {
    let dir = TempDir::new().unwrap();
    let xml = write_file(dir.path(), "valid_dataset.xml", DSPL_CONTENT);

    let output = dspl_validate(dir.path(), &[xml.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(output_matches(&out, SUCCESS_PATTERN), "stdout:\n{}", out);
    assert!(!out.contains('\x1b'));
}

#[test]
fn test_cli_checking_level_spellings() {
    let dir = TempDir::new().unwrap();
    let xml = write_file(dir.path(), "valid_dataset.xml", DSPL_CONTENT);
    let xml = xml.to_str().unwrap();

    for flag in ["-l", "--checking-level", "--checking_level"] {
        let output = dspl_validate(dir.path(), &[xml, flag, "schema_only"]);
        assert_eq!(output.status.code(), Some(0));
        assert!(output_matches(&stdout(&output), r"validates successfully\W*Completed"));
    }

    let output = dspl_validate(dir.path(), &[xml, "-l", "schema_and_model"]);
    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("Checking DSPL model"));
    assert!(!out.contains("Checking DSPL model and data"));
}

#[test]
fn test_cli_missing_file() {
    let dir = TempDir::new().unwrap();
    let output = dspl_validate(dir.path(), &["nonexistent_input_file.xml"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Error opening XML file"));
}

#[test]
fn test_cli_bad_csv_path() {
    let dir = TempDir::new().unwrap();
    let xml = write_file(dir.path(), "invalid_csv_dataset.xml", DSPL_CONTENT_BAD_CSV_PATH);

    let output = dspl_validate(dir.path(), &[xml.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Error while trying to parse"));
}

#[test]
fn test_cli_zip_errors() {
    let dir = TempDir::new().unwrap();
    let empty = dir.path().join("empty.zip");
    write_zip(&empty, &[("test.txt", "Text")]);
    let multiple = dir.path().join("multiple.zip");
    write_zip(&multiple, &[("test.xml", "Text"), ("test2.xml", "Text")]);

    let output = dspl_validate(dir.path(), &[empty.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("does not have any XML"));

    let output = dspl_validate(dir.path(), &[multiple.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("multiple XML files"));
}

#[test]
fn test_cli_repeated_runs_are_identical() {
    let dir = TempDir::new().unwrap();
    let xml = fixture_dir().join("dataset.xml");
    let xml = xml.to_str().unwrap();

    let first = dspl_validate(dir.path(), &[xml]);
    let second = dspl_validate(dir.path(), &[xml]);
    assert_eq!(first.status.code(), Some(0));
    assert_eq!(first.status.code(), second.status.code());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_cli_invalid_checking_level() {
    let dir = TempDir::new().unwrap();
    let output = dspl_validate(dir.path(), &["dataset.xml", "-l", "thorough"]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_missing_schema_file() {
    let dir = TempDir::new().unwrap();
    let xml = write_file(dir.path(), "valid_dataset.xml", DSPL_CONTENT);

    let output = dspl_validate(
        dir.path(),
        &[xml.to_str().unwrap(), "-s", "/nonexistent/dspl.xsd"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Schema file does not exist"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_cli_config_file() {
    let dir = TempDir::new().unwrap();
    let xml = write_file(dir.path(), "valid_dataset.xml", DSPL_CONTENT);
    write_file(
        dir.path(),
        "dspl-validate.toml",
        "[checking]\nlevel = \"schema_only\"\n",
    );

    let output = dspl_validate(dir.path(), &[xml.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(output_matches(&out, r"validates successfully\W*Completed"), "stdout:\n{}", out);
}

#[test]
fn test_cli_invalid_environment() {
    let dir = TempDir::new().unwrap();
    let xml = write_file(dir.path(), "valid_dataset.xml", DSPL_CONTENT);

    let output = Command::new(env!("CARGO_BIN_EXE_dspl-validate"))
        .arg(&xml)
        .current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("DSPL_VALIDATE_MAX_LISTED", "0")
        .output()
        .expect("Failed to execute command");
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("max_listed must be greater than 0"));
}

#[test]
fn test_cli_zip_extraction_dir_removed() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let dataset = fixture_text("dataset.xml");
    let countries = fixture_text("countries.csv");
    let population = fixture_text("population.csv");

    let complete = dir.path().join("complete.zip");
    write_zip(
        &complete,
        &[
            ("dataset.xml", dataset.as_str()),
            ("countries.csv", countries.as_str()),
            ("population.csv", population.as_str()),
        ],
    );
    let missing_data = dir.path().join("missing_data.zip");
    write_zip(&missing_data, &[("dataset.xml", dataset.as_str())]);

    for (zip_path, code) in [(&complete, 0), (&missing_data, 1)] {
        let output = Command::new(env!("CARGO_BIN_EXE_dspl-validate"))
            .arg(zip_path)
            .current_dir(dir.path())
            .env("XDG_CONFIG_HOME", dir.path())
            .env("TMPDIR", scratch.path())
            .env_remove("DSPL_VALIDATE_LEVEL")
            .env_remove("DSPL_VALIDATE_MAX_LISTED")
            .output()
            .expect("Failed to execute command");
        assert_eq!(output.status.code(), Some(code), "stdout:\n{}", stdout(&output));
        let leftovers: Vec<_> = std::fs::read_dir(scratch.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "extraction directory left behind: {:?}", leftovers);
    }
}

#[test]
fn test_cli_directory_path() {
    let dir = TempDir::new().unwrap();
    let output = dspl_validate(dir.path(), &[dir.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Error opening XML file"));
}
