/*!
 * Rewriting and serializing an EPUB.
 *
 * `rewrite` adjusts a translated container in place: package language,
 * reading direction, root `lang`/`dir` attributes, navigation labels and,
 * optionally, sanitized document file names with every link remapped.
 * `write` then emits the archive with the `mimetype` entry first and stored,
 * followed by every other entry in its original order.
 */

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Seek, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::navigation::{refresh_nav_documents, refresh_ncx, NavSnapshot};
use super::{parent_dir, remap_link, EpubContainer, EPUB_MIMETYPE, MIMETYPE_ENTRY};
use crate::document::Document;
use crate::errors::ContainerError;
use crate::language_utils::is_rtl;
use crate::markup::{serialize_tree, MarkupTree};
use crate::segmentation::reconstruct::TitleTranslation;

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// What `rewrite` changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub right_to_left: bool,
    pub nav_labels_refreshed: usize,
    pub ncx_labels_refreshed: usize,
    /// Old to new container path
    pub renamed_documents: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ContainerWriter {
    target_language: String,
    rename_documents: bool,
}

impl ContainerWriter {
    pub fn new(target_language: &str, rename_documents: bool) -> Self {
        Self {
            target_language: target_language.to_string(),
            rename_documents,
        }
    }

    /// Apply target-language metadata and navigation updates to a
    /// reconstructed container
    pub fn rewrite(
        &self,
        container: &mut EpubContainer,
        snapshot: &NavSnapshot,
        titles: &[TitleTranslation],
    ) -> RewriteSummary {
        let right_to_left = is_rtl(&self.target_language);
        let mut summary = RewriteSummary {
            right_to_left,
            ..RewriteSummary::default()
        };

        container.package.set_language(&self.target_language);
        if right_to_left {
            container.package.set_page_progression_direction("rtl");
        } else if container.package.page_progression_direction().as_deref() == Some("rtl") {
            container.package.set_page_progression_direction("ltr");
        }

        for document in container.documents.iter_mut() {
            set_root_language(&mut document.markup, &self.target_language, right_to_left);
        }

        summary.nav_labels_refreshed = refresh_nav_documents(&mut container.documents, snapshot, titles);
        if let Some(ncx) = container.ncx.as_mut() {
            summary.ncx_labels_refreshed = refresh_ncx(ncx, &container.documents, titles);
        }

        if self.rename_documents {
            summary.renamed_documents = rename_documents(container);
        }

        info!(
            "Rewrote container for {} (rtl: {}, {} nav + {} ncx labels, {} renamed)",
            self.target_language,
            right_to_left,
            summary.nav_labels_refreshed,
            summary.ncx_labels_refreshed,
            summary.renamed_documents.len()
        );
        summary
    }

    /// Serialize the container to a file
    pub fn write(&self, container: &EpubContainer, path: &Path) -> Result<(), ContainerError> {
        let file = std::fs::File::create(path)?;
        self.write_to(container, file)?;
        debug!("Wrote EPUB to {}", path.display());
        Ok(())
    }

    /// Serialize the container to any seekable writer
    pub fn write_to<W: Write + Seek>(&self, container: &EpubContainer, writer: W) -> Result<(), ContainerError> {
        let mut zip = ZipWriter::new(writer);

        let options_stored =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let options_deflate =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(MIMETYPE_ENTRY, options_stored)?;
        zip.write_all(EPUB_MIMETYPE.as_bytes())?;

        let documents: HashMap<&str, &Document> = container
            .documents
            .iter()
            .map(|d| (d.path.as_str(), d))
            .collect();

        for name in &container.entries {
            let data = if *name == container.package.path {
                container.package.serialize().into_bytes()
            } else if let Some(ncx) = container.ncx.as_ref().filter(|ncx| ncx.path == *name) {
                serialize_tree(&ncx.markup).into_bytes()
            } else if let Some(document) = documents.get(name.as_str()) {
                serialize_tree(&document.markup).into_bytes()
            } else if let Some(asset) = container.assets.get(name) {
                asset.clone()
            } else {
                warn!("No content for entry {}, skipping", name);
                continue;
            };

            zip.start_file(name.as_str(), options_deflate)?;
            zip.write_all(&data)?;
        }

        zip.finish()?;
        Ok(())
    }
}

/// Set `lang`/`xml:lang` on the root element and the reading direction
fn set_root_language(markup: &mut MarkupTree, language: &str, right_to_left: bool) {
    let Some(root) = markup.root_mut() else {
        return;
    };
    root.set_attr("lang", language);
    root.set_attr("xml:lang", language);
    if right_to_left {
        root.set_attr("dir", "rtl");
    } else if root.attr("dir").as_deref() == Some("rtl") {
        root.set_attr("dir", "ltr");
    }
}

/// Lowercase ASCII file name with runs of other characters collapsed to `-`
pub fn sanitize_file_name(name: &str) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos + 1..]),
        _ => (name, ""),
    };

    let stem = UNSAFE_NAME_CHARS
        .replace_all(&stem.to_ascii_lowercase(), "-")
        .trim_matches('-')
        .to_string();
    let stem = if stem.is_empty() { "document".to_string() } else { stem };

    let extension = UNSAFE_NAME_CHARS
        .replace_all(&extension.to_ascii_lowercase(), "")
        .into_owned();
    let extension = if extension.is_empty() { "xhtml".to_string() } else { extension };

    format!("{}.{}", stem, extension)
}

/// Give every markup document a sanitized, unique file name and remap all
/// links that point at a renamed document
fn rename_documents(container: &mut EpubContainer) -> BTreeMap<String, String> {
    let mut taken: HashSet<String> = container.entries.iter().cloned().collect();
    let mut renames: HashMap<String, String> = HashMap::new();

    for document in &container.documents {
        let dir = parent_dir(&document.path);
        let sanitized = sanitize_file_name(document.file_name());
        let join = |file: &str| {
            if dir.is_empty() {
                file.to_string()
            } else {
                format!("{}/{}", dir, file)
            }
        };

        let mut candidate = join(&sanitized);
        if candidate == document.path {
            continue;
        }
        let (stem, extension) = sanitized.rsplit_once('.').unwrap_or((sanitized.as_str(), "xhtml"));
        let mut suffix = 2;
        while taken.contains(&candidate) {
            candidate = join(&format!("{}-{}.{}", stem, suffix, extension));
            suffix += 1;
        }
        taken.insert(candidate.clone());
        renames.insert(document.path.clone(), candidate);
    }

    if renames.is_empty() {
        return BTreeMap::new();
    }

    for document in container.documents.iter_mut() {
        if let Some(new_path) = renames.get(&document.path) {
            document.path = new_path.clone();
        }
        let base_dir = parent_dir(&document.path).to_string();
        remap_attributes(&mut document.markup, &base_dir, &renames, &["href", "src"]);
    }

    for entry in container.entries.iter_mut() {
        if let Some(new_path) = renames.get(entry) {
            *entry = new_path.clone();
        }
    }

    container.package.remap_links(&renames);
    if let Some(ncx) = container.ncx.as_mut() {
        let base_dir = parent_dir(&ncx.path).to_string();
        remap_attributes(&mut ncx.markup, &base_dir, &renames, &["src"]);
    }

    renames.into_iter().collect()
}

fn remap_attributes(
    markup: &mut MarkupTree,
    base_dir: &str,
    renames: &HashMap<String, String>,
    attributes: &[&str],
) {
    markup.visit_elements_mut(|element| {
        for name in attributes {
            if let Some(value) = element.attr(name)
                && let Some(remapped) = remap_link(&value, base_dir, renames)
            {
                element.set_attr(name, &remapped);
            }
        }
    });
}
