/*!
 * Tests for file utility functions
 */

use std::fs;
use std::path::PathBuf;

use epubwai::app_config::OutputFormat;
use epubwai::file_utils::{FileManager, FileType, RunWorkspace};

use crate::common::{create_temp_dir, sample_book};

/// Test output path generation for every rendition
#[test]
fn test_generateOutputPath_withEachFormat_shouldUseFormatExtension() {
    let cases = [
        (OutputFormat::Epub, "/out/My Book.de.epub"),
        (OutputFormat::Text, "/out/My Book.de.txt"),
        (OutputFormat::Paged, "/out/My Book.de.pages.txt"),
    ];
    for (format, expected) in cases {
        let path = FileManager::generate_output_path("/library/My Book.epub", "/out", "de", format);
        assert_eq!(path, PathBuf::from(expected));
    }
}

#[test]
fn test_generateReportPath_shouldSitNextToOutputs() {
    let path = FileManager::generate_report_path("novel.epub", "translated", "ja");
    assert_eq!(path, PathBuf::from("translated/novel.ja.report.json"));
}

#[test]
fn test_ensureDir_withNestedPath_shouldCreateParents() {
    let temp = create_temp_dir().unwrap();
    let nested = temp.path().join("a/b/c");

    FileManager::ensure_dir(&nested).unwrap();
    assert!(FileManager::dir_exists(&nested));

    // Existing directories are accepted
    FileManager::ensure_dir(&nested).unwrap();
}

#[test]
fn test_writeToFile_andCopyFile_shouldCreateMissingParents() {
    let temp = create_temp_dir().unwrap();
    let source = temp.path().join("reports/run.json");

    FileManager::write_to_file(&source, "{}").unwrap();
    assert!(FileManager::file_exists(&source));

    let copy = temp.path().join("archive/2024/run.json");
    FileManager::copy_file(&source, &copy).unwrap();
    assert_eq!(fs::read_to_string(&copy).unwrap(), "{}");

    assert!(FileManager::copy_file(temp.path().join("missing.json"), &copy).is_err());
}

#[test]
fn test_findFiles_shouldReturnSortedMatchesOnly() {
    let temp = create_temp_dir().unwrap();
    let series = temp.path().join("series");
    FileManager::ensure_dir(&series).unwrap();
    sample_book().write_to(temp.path(), "b.epub").unwrap();
    sample_book().write_to(&series, "a.epub").unwrap();
    fs::write(temp.path().join("notes.txt"), "x").unwrap();

    let found = FileManager::find_files(temp.path(), "epub").unwrap();

    assert_eq!(
        found,
        vec![temp.path().join("b.epub"), temp.path().join("series/a.epub")]
    );
}

#[test]
fn test_detectFileType_shouldDistinguishEpubArchiveAndOther() {
    let temp = create_temp_dir().unwrap();
    let epub = sample_book().write_to(temp.path(), "book.epub").unwrap();
    let zip = sample_book().write_to(temp.path(), "book.zip").unwrap();
    let text = temp.path().join("book.epub.txt");
    fs::write(&text, "plain").unwrap();

    assert_eq!(FileManager::detect_file_type(&epub).unwrap(), FileType::Epub);
    assert_eq!(FileManager::detect_file_type(&zip).unwrap(), FileType::Archive);
    assert_eq!(FileManager::detect_file_type(&text).unwrap(), FileType::Unknown);
    assert!(FileManager::detect_file_type(temp.path().join("nope.epub")).is_err());
}

#[test]
fn test_runWorkspace_shouldNameDirectoryAfterRun() {
    let workspace = RunWorkspace::new("abc123").unwrap();
    let name = workspace.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("epubwai-abc123-"));
    assert!(workspace.path().is_dir());
}
