use anyhow::{Context, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::app_config::OutputFormat;

// @module: File and directory utilities

/// Local file header signature of a zip archive
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    // @generates: Output path for a translated rendition
    // @params: input_file, output_dir, target_language, format
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        target_language: &str,
        format: OutputFormat,
    ) -> PathBuf {
        let stem = input_file.as_ref().file_stem().unwrap_or_default();
        let file_name = format!(
            "{}.{}.{}",
            stem.to_string_lossy(),
            target_language,
            format.extension()
        );
        output_dir.as_ref().join(file_name)
    }

    // @generates: Path of the JSON run report next to the outputs
    pub fn generate_report_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        target_language: &str,
    ) -> PathBuf {
        let stem = input_file.as_ref().file_stem().unwrap_or_default();
        output_dir
            .as_ref()
            .join(format!("{}.{}.report.json", stem.to_string_lossy(), target_language))
    }

    /// Find files with a specific extension in a directory, sorted by path
    pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let extension = extension.trim_start_matches('.');
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file()
                && let Some(ext) = path.extension()
                && ext.to_string_lossy().eq_ignore_ascii_case(extension)
            {
                result.push(path.to_path_buf());
            }
        }

        result.sort();
        Ok(result)
    }

    /// Write a string to a file, creating parent directories
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Copy a file, ensuring the target directory exists
    pub fn copy_file<P1: AsRef<Path>, P2: AsRef<Path>>(from: P1, to: P2) -> Result<()> {
        let from = from.as_ref();
        let to = to.as_ref();

        if !from.exists() {
            return Err(anyhow::anyhow!("Source file does not exist: {:?}", from));
        }
        if let Some(parent) = to.parent() {
            Self::ensure_dir(parent)?;
        }

        fs::copy(from, to).with_context(|| format!("Failed to copy {:?} to {:?}", from, to))?;
        Ok(())
    }

    /// Detect whether a file looks like an EPUB
    pub fn detect_file_type<P: AsRef<Path>>(path: P) -> Result<FileType> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("File does not exist: {:?}", path));
        }

        let mut header = [0u8; 4];
        let mut file = fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let read = file.read(&mut header)?;
        let is_zip = read == ZIP_MAGIC.len() && header == ZIP_MAGIC;

        let has_epub_extension = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("epub"));

        Ok(match (is_zip, has_epub_extension) {
            (true, true) => FileType::Epub,
            (true, false) => FileType::Archive,
            _ => FileType::Unknown,
        })
    }
}

/// Enum representing the input file types the tool distinguishes
#[derive(Debug, PartialEq, Eq)]
pub enum FileType {
    /// Zip archive with an `.epub` extension
    Epub,
    /// Zip archive with another extension; may still be an EPUB
    Archive,
    Unknown,
}

/// Scoped working directory of one run, removed on drop whatever the exit path
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    pub fn new(run_id: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("epubwai-{}-", run_id))
            .tempdir()
            .context("Failed to create run workspace")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
