/*!
 * Common test utilities for the epubwai test suite
 */

use anyhow::Result;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use epubwai::app_config::{Config, OutputFormat};
use epubwai::app_controller::Controller;
use epubwai::providers::TranslationBackend;
use epubwai::translation::RateLimiterRegistry;

/// Route `log` output through the test harness; safe to call repeatedly
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// A chapter of a generated book
#[derive(Debug, Clone)]
pub struct Chapter {
    pub file: String,
    pub title: String,
    /// Body markup after the `<h1>` heading
    pub body: String,
}

impl Chapter {
    pub fn new(file: &str, title: &str, body: &str) -> Self {
        Self {
            file: file.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

/// In-memory EPUB builder with a package, nav document, NCX and assets
#[derive(Debug, Clone)]
pub struct EpubBuilder {
    chapters: Vec<Chapter>,
    language: String,
    extra_entries: Vec<(String, Vec<u8>)>,
}

impl Default for EpubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            chapters: Vec::new(),
            language: "en".to_string(),
            extra_entries: Vec::new(),
        }
    }

    pub fn chapter(mut self, file: &str, title: &str, body: &str) -> Self {
        self.chapters.push(Chapter::new(file, title, body));
        self
    }

    /// Raw entry added after the regular ones
    pub fn entry(mut self, name: &str, data: &[u8]) -> Self {
        self.extra_entries.push((name.to_string(), data.to_vec()));
        self
    }

    pub fn chapter_markup(chapter: &Chapter, language: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{lang}\" xml:lang=\"{lang}\"><head><title>{title}</title><link rel=\"stylesheet\" href=\"../style.css\"/></head><body><h1>{title}</h1>{body}</body></html>",
            lang = language,
            title = chapter.title,
            body = chapter.body
        )
    }

    fn package(&self) -> String {
        let mut manifest = String::from(
            r#"<item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/><item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/><item id="css" href="style.css" media-type="text/css"/><item id="cover" href="images/cover.png" media-type="image/png"/>"#,
        );
        let mut spine = String::new();
        for (i, chapter) in self.chapters.iter().enumerate() {
            manifest.push_str(&format!(
                r#"<item id="ch{}" href="text/{}" media-type="application/xhtml+xml"/>"#,
                i + 1,
                chapter.file
            ));
            spine.push_str(&format!(r#"<itemref idref="ch{}"/>"#, i + 1));
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"uid\"><metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\"><dc:identifier id=\"uid\">urn:uuid:test</dc:identifier><dc:title>Test Book</dc:title><dc:language>{}</dc:language></metadata><manifest>{}</manifest><spine toc=\"ncx\">{}</spine></package>",
            self.language, manifest, spine
        )
    }

    fn nav(&self) -> String {
        let items: String = self
            .chapters
            .iter()
            .map(|c| format!(r#"<li><a href="text/{}">{}</a></li>"#, c.file, c.title))
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\"><head><title>Contents</title></head><body><nav epub:type=\"toc\"><ol>{}</ol></nav></body></html>",
            items
        )
    }

    fn ncx(&self) -> String {
        let points: String = self
            .chapters
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    r#"<navPoint id="np{0}" playOrder="{0}"><navLabel><text>{1}</text></navLabel><content src="text/{2}"/></navPoint>"#,
                    i + 1,
                    c.title,
                    c.file
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\"><head/><docTitle><text>Test Book</text></docTitle><navMap>{}</navMap></ncx>",
            points
        )
    }

    /// Every entry in archive order, `mimetype` first
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries = vec![
            ("mimetype".to_string(), b"application/epub+zip".to_vec()),
            (
                "META-INF/container.xml".to_string(),
                br#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#.to_vec(),
            ),
            ("OEBPS/content.opf".to_string(), self.package().into_bytes()),
            ("OEBPS/nav.xhtml".to_string(), self.nav().into_bytes()),
            ("OEBPS/toc.ncx".to_string(), self.ncx().into_bytes()),
            ("OEBPS/style.css".to_string(), b"h1 { font-weight: bold; }".to_vec()),
            ("OEBPS/images/cover.png".to_string(), PNG_BYTES.to_vec()),
        ];
        for chapter in &self.chapters {
            entries.push((
                format!("OEBPS/text/{}", chapter.file),
                Self::chapter_markup(chapter, &self.language).into_bytes(),
            ));
        }
        entries.extend(self.extra_entries.iter().cloned());
        entries
    }

    pub fn build(&self) -> Vec<u8> {
        zip_entries(&self.entries())
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let path = dir.join(file_name);
        fs::write(&path, self.build())?;
        Ok(path)
    }
}

/// First bytes of a PNG file, enough to check binary passthrough
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0xFF, 0x10, 0x80];

/// Zip entries as given; `mimetype` is stored, everything else deflated
pub fn zip_entries(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let method = if name == "mimetype" {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        zip.start_file(name.as_str(), SimpleFileOptions::default().compression_method(method))
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Names and contents of every entry of an archive, in archive order
pub fn read_entries(data: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            std::io::Read::read_to_end(&mut file, &mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

/// Three short chapters with headings, inline markup, a URL and a number
pub fn sample_book() -> EpubBuilder {
    EpubBuilder::new()
        .chapter(
            "chapter_01.xhtml",
            "The Beginning",
            r#"<p>It was a <em>bright</em> cold day in April.</p><p>Visit https://example.com/start for more.</p>"#,
        )
        .chapter(
            "chapter_02.xhtml",
            "The Middle",
            r#"<p>The year 1984 began quietly.</p><pre>let x = 1;</pre><p>Write to editor@example.com today.</p>"#,
        )
        .chapter(
            "chapter_03.xhtml",
            "The End",
            r#"<p>Everything ended <a href="chapter_01.xhtml">where it began</a>.</p><p><img src="../images/cover.png" alt="Cover"/> A final image.</p>"#,
        )
}

/// Config for tests: French target, EPUB and text outputs, fast retries
pub fn test_config(target_language: &str) -> Config {
    let mut config = Config::default();
    config.source_language = "en".to_string();
    config.target_language = target_language.to_string();
    config.output.formats = vec![OutputFormat::Epub, OutputFormat::Text];
    config.translation.common.retry_count = 2;
    config.translation.common.retry_backoff_ms = 1;
    config.translation.common.retry_jitter_ms = 0;
    config
}

/// Controller with a fixed backend chain and its own rate limiter registry
pub fn controller_with(config: Config, backends: Vec<Arc<dyn TranslationBackend>>) -> Controller {
    init_test_logging();
    Controller::with_config(config)
        .unwrap()
        .with_backends(backends)
        .with_registry(Arc::new(RateLimiterRegistry::default()))
        .with_progress(false)
}
