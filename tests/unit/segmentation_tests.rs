/*!
 * Tests for segmentation and reconstruction over whole books
 */

use epubwai::app_config::ContainerConfig;
use epubwai::container::ContainerReader;
use epubwai::document::Document;
use epubwai::errors::SegmentationError;
use epubwai::markup::{serialize_tree, Element, Node};
use epubwai::segmentation::reconstruct::title_translations;
use epubwai::segmentation::Segmenter;

use crate::common::{sample_book, EpubBuilder};

fn documents_of(builder: &EpubBuilder) -> Vec<Document> {
    ContainerReader::new(ContainerConfig::default())
        .read_bytes(&builder.build())
        .unwrap()
        .documents
}

fn element_shape(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        if let Node::Element(element) = node {
            out.push(shape_of(element));
            element_shape(&element.children, out);
        }
    }
}

fn shape_of(element: &Element) -> String {
    let attrs: Vec<String> = element
        .attributes
        .iter()
        .map(|a| format!("{}={}", a.name, a.raw_value))
        .collect();
    format!("{}[{}]", element.name, attrs.join(","))
}

#[test]
fn test_segment_shouldKeepSegmentsAndEntriesAligned() {
    let documents = documents_of(&sample_book());
    let (segments, map) = Segmenter::new().segment(&documents);

    assert_eq!(segments.len(), map.len());
    assert!(map.check_alignment("segment", segments.len()).is_ok());
    for (position, (segment, entry)) in segments.iter().zip(map.entries.iter()).enumerate() {
        assert_eq!(segment.index, position);
        assert_eq!(segment.source_document_id, entry.document_id);
        assert_eq!(segment.node_path, entry.node_path);
    }
}

#[test]
fn test_segment_shouldFollowDocumentOrderAndSkipPre() {
    let documents = documents_of(&sample_book());
    let (segments, _) = Segmenter::new().segment(&documents);
    let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();

    let beginning = texts.iter().position(|t| *t == "The Beginning").unwrap();
    let middle = texts.iter().position(|t| *t == "The Middle").unwrap();
    let end = texts.iter().position(|t| *t == "The End").unwrap();
    assert!(beginning < middle && middle < end);

    assert!(texts.contains(&"It was a <em>bright</em> cold day in April."));
    assert!(!texts.iter().any(|t| t.contains("let x = 1;")));
    assert!(texts.contains(&"<img src=\"../images/cover.png\" alt=\"Cover\"/> A final image."));
}

#[test]
fn test_reconstruct_withIdentityTranslation_shouldKeepBookByteIdentical() {
    let original = documents_of(&sample_book());
    let segmenter = Segmenter::new();
    let (segments, map) = segmenter.segment(&original);

    let mut documents = original.clone();
    let identity: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
    segmenter.reconstruct(&mut documents, &map, &identity).unwrap();

    for (before, after) in original.iter().zip(documents.iter()) {
        assert_eq!(serialize_tree(&before.markup), serialize_tree(&after.markup));
    }
}

#[test]
fn test_reconstruct_withRewrittenText_shouldKeepElementStructure() {
    let original = documents_of(&sample_book());
    let segmenter = Segmenter::new();
    let (segments, map) = segmenter.segment(&original);

    let mut documents = original.clone();
    let translated: Vec<String> = segments
        .iter()
        .map(|s| s.text.replace("The", "Le").replace("day", "jour"))
        .collect();
    segmenter.reconstruct(&mut documents, &map, &translated).unwrap();

    for (before, after) in original.iter().zip(documents.iter()) {
        let mut shape_before = Vec::new();
        let mut shape_after = Vec::new();
        element_shape(&before.markup.nodes, &mut shape_before);
        element_shape(&after.markup.nodes, &mut shape_after);
        assert_eq!(shape_before, shape_after, "structure changed in {}", before.path);
    }

    let first = serialize_tree(&documents[0].markup);
    assert!(first.contains("<title>Le Beginning</title>"));
    assert!(first.contains("It was a <em>bright</em> cold jour in April."));
    assert_eq!(documents[0].title.as_deref(), Some("Le Beginning"));
}

#[test]
fn test_reconstruct_withMissingSegment_shouldReportMismatch() {
    let mut documents = documents_of(&sample_book());
    let segmenter = Segmenter::new();
    let (segments, map) = segmenter.segment(&documents);

    let mut texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
    texts.pop();
    let error = segmenter.reconstruct(&mut documents, &map, &texts).unwrap_err();

    match error {
        SegmentationError::Mismatch { segments: got, entries, .. } => {
            assert_eq!(got, map.len() - 1);
            assert_eq!(entries, map.len());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_reconstruct_withBrokenFragment_shouldFailWithoutPanicking() {
    let mut documents = documents_of(&EpubBuilder::new().chapter("a.xhtml", "Alpha", "<p>Some text here.</p>"));
    let segmenter = Segmenter::new();
    let (segments, map) = segmenter.segment(&documents);

    let texts: Vec<String> = segments
        .iter()
        .map(|s| if s.text == "Some text here." { "<em>Unclosed".to_string() } else { s.text.clone() })
        .collect();

    assert!(matches!(
        segmenter.reconstruct(&mut documents, &map, &texts),
        Err(SegmentationError::Reconstruction { .. })
    ));
}

#[test]
fn test_titleTranslations_shouldCoverTitlesAndHeadings() {
    let documents = documents_of(&sample_book());
    let (segments, map) = Segmenter::new().segment(&documents);
    let translated: Vec<String> = segments.iter().map(|s| s.text.replace("The ", "La ")).collect();

    let titles = title_translations(&segments, &map, &translated);

    assert!(titles.iter().any(|t| t.original == "The Middle" && t.translated == "La Middle"));
    assert!(titles.iter().all(|t| t.original != t.translated));
}
