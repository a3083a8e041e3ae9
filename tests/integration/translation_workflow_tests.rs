/*!
 * End-to-end tests of the translation workflow through the controller
 */

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use epubwai::app_config::{ContainerConfig, OutputFormat};
use epubwai::app_controller::JobStatus;
use epubwai::container::ContainerReader;
use epubwai::errors::ProviderError;
use epubwai::providers::mock::{MockBackend, MockBehavior};
use epubwai::providers::TranslationBackend;

use crate::common::{
    controller_with, create_temp_dir, read_entries, sample_book, test_config, EpubBuilder, PNG_BYTES,
};

fn entry_text(epub: &Path, name: &str) -> String {
    let data = fs::read(epub).unwrap();
    read_entries(&data)
        .into_iter()
        .find(|(entry, _)| entry == name)
        .map(|(_, content)| String::from_utf8(content).unwrap())
        .unwrap_or_else(|| panic!("no entry {name} in {}", epub.display()))
}

fn entry_names(epub: &Path) -> Vec<String> {
    read_entries(&fs::read(epub).unwrap())
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

/// ROT13 of ASCII letters outside placeholder tokens
fn rot13(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_token = false;
    for c in text.chars() {
        match c {
            '{' => in_token = true,
            '}' => in_token = false,
            _ => {}
        }
        let mapped = match c {
            'a'..='z' if !in_token => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' if !in_token => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => c,
        };
        out.push(mapped);
    }
    out
}

#[tokio::test]
async fn test_run_withSampleBook_shouldWriteEpubTextAndReport() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let backend = Arc::new(MockBackend::prefixed("mt", "[fr] "));
    let controller = controller_with(test_config("fr"), vec![backend.clone() as Arc<dyn TranslationBackend>]);
    let report = controller.run(input.clone(), out_dir.clone(), false).await.unwrap();

    assert_eq!(report.status, JobStatus::Complete, "reason: {:?}", report.reason);
    assert!(report.unresolved_segments.is_empty());
    assert_eq!(report.failover_count, 0);
    assert!(report.segment_count > 0);

    let epub = out_dir.join("sample.fr.epub");
    let text = out_dir.join("sample.fr.txt");
    let report_path = out_dir.join("sample.fr.report.json");
    assert_eq!(report.outputs, vec![epub.clone(), text.clone()]);
    assert!(epub.exists() && text.exists() && report_path.exists());

    let chapter_one = entry_text(&epub, "OEBPS/text/chapter_01.xhtml");
    assert!(chapter_one.contains("<p>[fr] It was a <em>bright</em> cold day in April.</p>"));
    assert!(chapter_one.contains("https://example.com/start"));
    assert!(chapter_one.contains("lang=\"fr\" xml:lang=\"fr\""));
    assert!(chapter_one.contains("<title>[fr] The Beginning</title>"));

    let chapter_two = entry_text(&epub, "OEBPS/text/chapter_02.xhtml");
    assert!(chapter_two.contains("<pre>let x = 1;</pre>"));
    assert!(chapter_two.contains("[fr] The year 1984 began quietly."));
    assert!(chapter_two.contains("editor@example.com"));

    let chapter_three = entry_text(&epub, "OEBPS/text/chapter_03.xhtml");
    assert!(chapter_three.contains("<a href=\"chapter_01.xhtml\">where it began</a>"));
    assert!(chapter_three.contains("<img src=\"../images/cover.png\" alt=\"Cover\"/>"));

    let rendition = fs::read_to_string(&text).unwrap();
    assert!(rendition.contains("[fr] It was a bright cold day in April."));
    assert!(rendition.contains("let x = 1;"));
    assert!(rendition.contains("* * *"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["status"], "complete");
    assert_eq!(json["target_language"], "fr");
    assert_eq!(json["segment_count"], report.segment_count);
    assert_eq!(json["run_id"], report.run_id.as_str());
}

#[tokio::test]
async fn test_run_shouldKeepUrlsAndNumbersWhileTranslatingProse() {
    let temp = create_temp_dir().unwrap();
    let book = EpubBuilder::new().chapter(
        "report.xhtml",
        "Annual Report",
        "<p>The archive opened in 2019 after a long delay.</p>\
         <p>Read the full notes at https://example.org/notes/2019 before the meeting.</p>\
         <p>Nobody expected the results to be so clear.</p>",
    );
    let input = book.write_to(temp.path(), "report.epub").unwrap();
    let out_dir = temp.path().join("out");

    let backend: Arc<dyn TranslationBackend> = Arc::new(MockBackend::new("mt", MockBehavior::Map(rot13)));
    let controller = controller_with(test_config("de"), vec![backend]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();
    assert_eq!(report.status, JobStatus::Complete);

    let chapter = entry_text(&out_dir.join("report.de.epub"), "OEBPS/text/report.xhtml");
    assert!(chapter.contains("<p>Gur nepuvir bcrarq va 2019 nsgre n ybat qrynl.</p>"));
    assert!(chapter.contains(" https://example.org/notes/2019 "));
    assert!(chapter.contains("<p>Abobql rkcrpgrq gur erfhygf gb or fb pyrne.</p>"));
    assert!(!chapter.contains("The archive opened"));
    assert!(chapter.contains("<h1>Naahny Ercbeg</h1>"));
}

#[tokio::test]
async fn test_run_withEchoBackend_shouldKeepChaptersByteIdentical() {
    let temp = create_temp_dir().unwrap();
    let book = sample_book();
    let input = book.write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let mut config = test_config("en");
    config.output.formats = vec![OutputFormat::Epub];
    let controller = controller_with(config, vec![Arc::new(MockBackend::echo("echo"))]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();
    assert_eq!(report.status, JobStatus::Complete);

    let epub = out_dir.join("sample.en.epub");
    let original = book.entries();
    let written = read_entries(&fs::read(&epub).unwrap());
    let names: Vec<&str> = written.iter().map(|(name, _)| name.as_str()).collect();
    let original_names: Vec<&str> = original.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, original_names);

    for (name, content) in &original {
        if name.starts_with("OEBPS/text/") || name == "OEBPS/images/cover.png" || name == "OEBPS/style.css" {
            let (_, output) = written.iter().find(|(n, _)| n == name).unwrap();
            assert_eq!(output, content, "{} changed", name);
        }
    }
}

#[tokio::test]
async fn test_run_shouldRefreshNavigationLabels() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let controller = controller_with(test_config("fr"), vec![Arc::new(MockBackend::prefixed("mt", "[fr] "))]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();

    let rewrite = report.rewrite.unwrap();
    assert_eq!(rewrite.ncx_labels_refreshed, 3);
    assert_eq!(rewrite.nav_labels_refreshed, 3);

    let epub = out_dir.join("sample.fr.epub");
    let ncx = entry_text(&epub, "OEBPS/toc.ncx");
    assert!(ncx.contains("<text>[fr] The Beginning</text>"));
    assert!(ncx.contains("<text>[fr] The End</text>"));
    assert!(ncx.contains("<text>Test Book</text>"));

    let nav = entry_text(&epub, "OEBPS/nav.xhtml");
    assert!(nav.contains(">[fr] The Middle</a>"));
    let cover = read_entries(&fs::read(&epub).unwrap())
        .into_iter()
        .find(|(name, _)| name == "OEBPS/images/cover.png")
        .map(|(_, data)| data);
    assert_eq!(cover.as_deref(), Some(PNG_BYTES));
}

#[tokio::test]
async fn test_run_withRightToLeftTarget_shouldMarkDirection() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let controller = controller_with(test_config("ar"), vec![Arc::new(MockBackend::prefixed("mt", "[ar] "))]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();
    assert_eq!(report.status, JobStatus::Complete);
    assert!(report.rewrite.as_ref().unwrap().right_to_left);

    let epub = out_dir.join("sample.ar.epub");
    let package = entry_text(&epub, "OEBPS/content.opf");
    assert!(package.contains("page-progression-direction=\"rtl\""));
    assert!(package.contains("<dc:language>ar</dc:language>"));
    assert!(entry_text(&epub, "OEBPS/text/chapter_02.xhtml").contains("dir=\"rtl\""));

    let container = ContainerReader::new(ContainerConfig::default()).open(&epub).unwrap();
    assert_eq!(container.package.page_progression_direction().as_deref(), Some("rtl"));
}

#[tokio::test]
async fn test_run_withRenaming_shouldWriteSanitizedNames() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let mut config = test_config("fr");
    config.output.rename_documents = true;
    let controller = controller_with(config, vec![Arc::new(MockBackend::echo("echo"))]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();
    assert_eq!(report.rewrite.unwrap().renamed_documents.len(), 3);

    let epub = out_dir.join("sample.fr.epub");
    let names = entry_names(&epub);
    assert!(names.contains(&"OEBPS/text/chapter-02.xhtml".to_string()));
    assert!(entry_text(&epub, "OEBPS/text/chapter-03.xhtml").contains("href=\"chapter-01.xhtml\""));

    // The renamed book still opens and resolves its spine
    let container = ContainerReader::new(ContainerConfig::default()).open(&epub).unwrap();
    assert_eq!(container.spine_documents().count(), 3);
}

#[tokio::test]
async fn test_run_withFailingBackends_shouldReportPartialFailure() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let backend = Arc::new(MockBackend::failing(
        "down",
        ProviderError::ConnectionError("refused".to_string()),
    ));
    let controller = controller_with(test_config("fr"), vec![backend]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();

    assert_eq!(report.status, JobStatus::PartialFailure);
    assert!(report.is_success());
    assert_eq!(report.unresolved_segments.len(), report.segment_count);
    assert!(report.unresolved_segments[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("refused"));

    // Untranslated segments keep their source text
    let chapter = entry_text(&out_dir.join("sample.fr.epub"), "OEBPS/text/chapter_01.xhtml");
    assert!(chapter.contains("<p>It was a <em>bright</em> cold day in April.</p>"));
}

#[tokio::test]
async fn test_run_withFailOnPartial_shouldFailWithoutOutputs() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let mut config = test_config("fr");
    config.output.fail_on_partial = true;
    let backend = Arc::new(MockBackend::new("lossy", MockBehavior::DropTokens));
    let controller = controller_with(config, vec![backend]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.reason.as_deref().unwrap().starts_with("partial_failure"));
    assert!(report.outputs.is_empty());
    assert!(!out_dir.join("sample.fr.epub").exists());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("sample.fr.report.json")).unwrap()).unwrap();
    assert_eq!(json["status"], "failed");
}

#[tokio::test]
async fn test_run_whenCancelled_shouldWriteNoOutputs() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let out_dir = temp.path().join("out");

    let backend = Arc::new(MockBackend::echo("echo"));
    let controller = controller_with(test_config("fr"), vec![backend.clone() as Arc<dyn TranslationBackend>]);
    controller.cancellation_flag().store(true, Ordering::SeqCst);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();

    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(report.cancelled_segments, report.segment_count);
    assert!(report.outputs.is_empty());
    assert_eq!(backend.call_count(), 0);
    assert!(!out_dir.join("sample.fr.epub").exists());
}

#[tokio::test]
async fn test_run_withUnsafeArchive_shouldFailWithReasonCode() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book()
        .entry("../escape.txt", b"nope")
        .write_to(temp.path(), "evil.epub")
        .unwrap();
    let out_dir = temp.path().join("out");

    let controller = controller_with(test_config("fr"), vec![Arc::new(MockBackend::echo("echo"))]);
    let report = controller.run(input, out_dir.clone(), false).await.unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.reason.as_deref().unwrap().starts_with("unsafe_input"));
    assert!(report.outputs.is_empty());
}

#[tokio::test]
async fn test_run_withMissingInput_shouldError() {
    let temp = create_temp_dir().unwrap();
    let controller = controller_with(test_config("fr"), vec![Arc::new(MockBackend::echo("echo"))]);
    let result = controller
        .run(temp.path().join("missing.epub"), temp.path().to_path_buf(), false)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_runFolder_shouldTranslateEveryBookAndSkipExisting() {
    let temp = create_temp_dir().unwrap();
    let books = temp.path().join("books");
    fs::create_dir_all(&books).unwrap();
    sample_book().write_to(&books, "first.epub").unwrap();
    EpubBuilder::new()
        .chapter("only.xhtml", "Only Chapter", "<p>A single short chapter of text.</p>")
        .write_to(&books, "second.epub")
        .unwrap();
    let out_dir = temp.path().join("out");

    let backend = Arc::new(MockBackend::prefixed("mt", "[fr] "));
    let controller = controller_with(test_config("fr"), vec![backend.clone() as Arc<dyn TranslationBackend>]);

    let reports = controller.run_folder(books.clone(), Some(out_dir.clone()), false).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.status == JobStatus::Complete));
    assert!(out_dir.join("first.fr.epub").exists());
    assert!(out_dir.join("second.fr.txt").exists());

    let calls = backend.call_count();
    let again = controller.run_folder(books, Some(out_dir), false).await.unwrap();
    assert!(again.iter().all(|r| r.run_id == "skipped"));
    assert_eq!(backend.call_count(), calls);
}

#[tokio::test]
async fn test_runFolder_withOutputsNextToInputs_shouldNotRetranslateOutputs() {
    let temp = create_temp_dir().unwrap();
    sample_book().write_to(temp.path(), "novel.epub").unwrap();

    let backend = Arc::new(MockBackend::prefixed("mt", "[fr] "));
    let controller = controller_with(test_config("fr"), vec![backend.clone() as Arc<dyn TranslationBackend>]);

    let first = controller.run_folder(temp.path().to_path_buf(), None, false).await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(temp.path().join("novel.fr.epub").exists());

    let second = controller.run_folder(temp.path().to_path_buf(), None, true).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].source_path, temp.path().join("novel.epub"));
    assert!(!temp.path().join("novel.fr.fr.epub").exists());
}

#[tokio::test]
async fn test_inspect_shouldSummarizeContainer() {
    let temp = create_temp_dir().unwrap();
    let input = sample_book().write_to(temp.path(), "sample.epub").unwrap();
    let controller = controller_with(test_config("fr"), Vec::new());

    let summary = controller.inspect(&input).unwrap();

    assert_eq!(summary.title.as_deref(), Some("Test Book"));
    assert_eq!(summary.language.as_deref(), Some("en"));
    assert_eq!(summary.documents, 4);
    assert_eq!(summary.spine_documents, 3);
    assert!(summary.has_navigation_document && summary.has_ncx);
    assert!(summary.segments > 0);
}
