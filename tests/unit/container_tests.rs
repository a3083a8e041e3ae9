/*!
 * Tests for reading, rewriting and writing EPUB containers
 */

use std::io::{Cursor, Read};

use epubwai::app_config::ContainerConfig;
use epubwai::container::{ContainerReader, ContainerWriter, EpubContainer, NavSnapshot};
use epubwai::errors::ContainerError;
use epubwai::markup::serialize_tree;

use crate::common::{read_entries, sample_book, zip_entries, EpubBuilder, PNG_BYTES};

fn read(builder: &EpubBuilder) -> EpubContainer {
    ContainerReader::new(ContainerConfig::default())
        .read_bytes(&builder.build())
        .unwrap()
}

fn write(writer: &ContainerWriter, container: &EpubContainer) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    writer.write_to(container, &mut buffer).unwrap();
    buffer.into_inner()
}

fn assert_unsafe(result: Result<EpubContainer, ContainerError>, needle: &str) {
    match result {
        Err(ContainerError::UnsafeInput(message)) => {
            assert!(message.contains(needle), "unexpected message: {message}")
        }
        other => panic!("expected UnsafeInput, got {:?}", other.map(|c| c.documents.len())),
    }
}

#[test]
fn test_read_shouldLoadSpineNavigationNcxAndAssets() {
    let container = read(&sample_book());

    let ids: Vec<&str> = container.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["ch1", "ch2", "ch3", "nav"]);
    assert_eq!(container.spine_documents().count(), 3);
    assert!(container.document("nav").unwrap().is_navigation);
    assert!(!container.document("nav").unwrap().in_spine);
    assert_eq!(container.document("ch2").unwrap().title.as_deref(), Some("The Middle"));

    assert_eq!(container.ncx.as_ref().map(|n| n.path.as_str()), Some("OEBPS/toc.ncx"));
    assert_eq!(container.asset("OEBPS/images/cover.png"), Some(PNG_BYTES));
    assert!(container.asset("OEBPS/text/chapter_01.xhtml").is_none());
    assert_eq!(container.title().as_deref(), Some("Test Book"));
    assert!(!container.entry_names().iter().any(|name| name == "mimetype"));
}

#[test]
fn test_read_withTraversalEntry_shouldRejectArchive() {
    let data = sample_book().entry("../evil.txt", b"pwned").build();
    let result = ContainerReader::new(ContainerConfig::default()).read_bytes(&data);
    assert_unsafe(result, "evil.txt");
}

#[test]
fn test_read_withTooManyEntries_shouldRejectArchive() {
    let limits = ContainerConfig {
        max_entries: 5,
        ..ContainerConfig::default()
    };
    let result = ContainerReader::new(limits).read_bytes(&sample_book().build());
    assert_unsafe(result, "entries exceed");
}

#[test]
fn test_read_withHighlyCompressedEntry_shouldRejectArchive() {
    let zeros = vec![0u8; 1024 * 1024];
    let data = sample_book().entry("OEBPS/blob.bin", &zeros).build();
    let result = ContainerReader::new(ContainerConfig::default()).read_bytes(&data);
    assert_unsafe(result, "compression ratio");
}

#[test]
fn test_read_withTotalSizeOverLimit_shouldRejectArchive() {
    let limits = ContainerConfig {
        max_total_uncompressed_bytes: 512,
        ..ContainerConfig::default()
    };
    let result = ContainerReader::new(limits).read_bytes(&sample_book().build());
    assert_unsafe(result, "uncompressed bytes");
}

#[test]
fn test_read_withoutContainerXml_shouldFail() {
    let entries: Vec<(String, Vec<u8>)> = sample_book()
        .entries()
        .into_iter()
        .filter(|(name, _)| name != "META-INF/container.xml")
        .collect();
    let result = ContainerReader::new(ContainerConfig::default()).read_bytes(&zip_entries(&entries));
    assert!(matches!(result, Err(ContainerError::InvalidEpub(_))));
}

#[test]
fn test_read_withMalformedChapter_shouldNameTheDocument() {
    let mut entries = sample_book().entries();
    for (name, data) in entries.iter_mut() {
        if name == "OEBPS/text/chapter_02.xhtml" {
            *data = b"<html><body><p>Unclosed</body></html>".to_vec();
        }
    }
    let result = ContainerReader::new(ContainerConfig::default()).read_bytes(&zip_entries(&entries));
    match result {
        Err(ContainerError::MalformedDocument { path, .. }) => assert_eq!(path, "OEBPS/text/chapter_02.xhtml"),
        other => panic!("expected MalformedDocument, got {:?}", other.map(|c| c.documents.len())),
    }
}

#[test]
fn test_write_shouldPutStoredMimetypeFirstAndKeepEntryOrder() {
    let builder = sample_book();
    let container = read(&builder);
    let data = write(&ContainerWriter::new("en", false), &container);

    let mut archive = zip::ZipArchive::new(Cursor::new(data.clone())).unwrap();
    {
        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        let mut content = String::new();
        first.read_to_string(&mut content).unwrap();
        assert_eq!(content, "application/epub+zip");
    }

    let written: Vec<String> = read_entries(&data).into_iter().map(|(name, _)| name).collect();
    let original: Vec<String> = builder.entries().into_iter().map(|(name, _)| name).collect();
    assert_eq!(written, original);
}

#[test]
fn test_write_thenRead_shouldReproduceDocumentsAndAssets() {
    let container = read(&sample_book());
    let data = write(&ContainerWriter::new("en", false), &container);
    let reread = ContainerReader::new(ContainerConfig::default()).read_bytes(&data).unwrap();

    assert_eq!(reread.documents.len(), container.documents.len());
    for (before, after) in container.documents.iter().zip(reread.documents.iter()) {
        assert_eq!(before.path, after.path);
        assert_eq!(serialize_tree(&before.markup), serialize_tree(&after.markup));
    }
    assert_eq!(reread.asset("OEBPS/images/cover.png"), Some(PNG_BYTES));
    assert_eq!(reread.asset("OEBPS/style.css"), container.asset("OEBPS/style.css"));
}

#[test]
fn test_rewrite_withRightToLeftTarget_shouldSetDirection() {
    let mut container = read(&sample_book());
    let snapshot = NavSnapshot::capture(&container.documents);

    let summary = ContainerWriter::new("ar", false).rewrite(&mut container, &snapshot, &[]);

    assert!(summary.right_to_left);
    assert_eq!(container.package.language().as_deref(), Some("ar"));
    assert_eq!(container.package.page_progression_direction().as_deref(), Some("rtl"));
    for document in &container.documents {
        let root = document.markup.root().unwrap();
        assert_eq!(root.attr("dir").as_deref(), Some("rtl"));
        assert_eq!(root.attr("lang").as_deref(), Some("ar"));
        assert_eq!(root.attr("xml:lang").as_deref(), Some("ar"));
    }
}

#[test]
fn test_rewrite_withLeftToRightTarget_shouldNotAddDirection() {
    let mut container = read(&sample_book());
    let snapshot = NavSnapshot::capture(&container.documents);

    let summary = ContainerWriter::new("fr", false).rewrite(&mut container, &snapshot, &[]);

    assert!(!summary.right_to_left);
    assert!(container.package.page_progression_direction().is_none());
    let root = container.documents[0].markup.root().unwrap();
    assert!(root.attr("dir").is_none());
    assert_eq!(root.attr("lang").as_deref(), Some("fr"));
}

#[test]
fn test_rewrite_withRenaming_shouldRemapEveryLink() {
    let mut container = read(&sample_book());
    let snapshot = NavSnapshot::capture(&container.documents);

    let summary = ContainerWriter::new("fr", true).rewrite(&mut container, &snapshot, &[]);

    assert_eq!(
        summary.renamed_documents.get("OEBPS/text/chapter_01.xhtml").map(String::as_str),
        Some("OEBPS/text/chapter-01.xhtml")
    );
    assert!(!summary.renamed_documents.contains_key("OEBPS/nav.xhtml"));

    let data = write(&ContainerWriter::new("fr", true), &container);
    let entries = read_entries(&data);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"OEBPS/text/chapter-03.xhtml"));
    assert!(!names.iter().any(|name| name.contains("chapter_0")));

    let text_of = |entry: &str| {
        entries
            .iter()
            .find(|(name, _)| name == entry)
            .map(|(_, data)| String::from_utf8_lossy(data).into_owned())
            .unwrap()
    };
    assert!(text_of("OEBPS/content.opf").contains("href=\"text/chapter-02.xhtml\""));
    assert!(text_of("OEBPS/nav.xhtml").contains("href=\"text/chapter-01.xhtml\""));
    assert!(text_of("OEBPS/toc.ncx").contains("src=\"text/chapter-02.xhtml\""));
    assert!(text_of("OEBPS/text/chapter-03.xhtml").contains("href=\"chapter-01.xhtml\""));
}
