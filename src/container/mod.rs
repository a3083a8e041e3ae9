/*!
 * EPUB container handling.
 *
 * - `reader`: Opens and validates an archive, parses the package and the
 *   linked markup documents
 * - `package`: OPF package document (manifest, spine, metadata)
 * - `navigation`: NCX and EPUB 3 navigation label refresh
 * - `writer`: Rewrites package metadata and links, then serializes the
 *   container with the `mimetype` entry first
 */

use percent_encoding::percent_decode_str;
use std::collections::HashMap;

use crate::document::Document;
use crate::markup::MarkupTree;

pub mod navigation;
pub mod package;
pub mod reader;
pub mod writer;

pub use navigation::NavSnapshot;
pub use package::{ManifestItem, Package};
pub use reader::ContainerReader;
pub use writer::{ContainerWriter, RewriteSummary};

pub const MIMETYPE_ENTRY: &str = "mimetype";
pub const EPUB_MIMETYPE: &str = "application/epub+zip";
pub const CONTAINER_ENTRY: &str = "META-INF/container.xml";
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// The legacy NCX table of contents
#[derive(Debug, Clone, PartialEq)]
pub struct NcxDocument {
    pub path: String,
    pub markup: MarkupTree,
}

/// An opened EPUB: parsed package, markup documents and opaque assets
#[derive(Debug, Clone)]
pub struct EpubContainer {
    pub package: Package,
    /// Spine documents in reading order, then non-spine markup documents
    pub documents: Vec<Document>,
    pub ncx: Option<NcxDocument>,
    /// Archive entry names in original order, without `mimetype`
    pub(crate) entries: Vec<String>,
    /// Raw bytes of every entry that is not re-serialized
    pub(crate) assets: HashMap<String, Vec<u8>>,
}

impl EpubContainer {
    pub fn entry_names(&self) -> &[String] {
        &self.entries
    }

    /// Raw bytes of a passthrough entry
    pub fn asset(&self, path: &str) -> Option<&[u8]> {
        self.assets.get(path).map(Vec::as_slice)
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn spine_documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().filter(|d| d.in_spine)
    }

    /// Book title from the package metadata
    pub fn title(&self) -> Option<String> {
        self.package.title()
    }
}

/// Directory part of a container path, without trailing slash
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Resolve a relative reference against a directory inside the container.
///
/// The fragment and query are dropped, percent escapes are decoded and `.`
/// and `..` segments are normalized. Returns `None` for external references
/// and for paths that climb above the container root.
pub fn resolve_href(base_dir: &str, href: &str) -> Option<String> {
    if is_external(href) {
        return None;
    }
    let path = href.split(['#', '?']).next().unwrap_or_default();
    if path.is_empty() {
        return None;
    }

    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let mut parts: Vec<&str> = if decoded.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|p| !p.is_empty()).collect()
    };

    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Rewrite a link whose target was renamed, keeping its relative directory
/// part and its fragment. `renames` maps old to new container paths.
pub fn remap_link(href: &str, base_dir: &str, renames: &HashMap<String, String>) -> Option<String> {
    let target = resolve_href(base_dir, href)?;
    let renamed = renames.get(&target)?;
    let new_name = renamed.rsplit('/').next()?;

    let split = href.find(['#', '?']).unwrap_or(href.len());
    let (path, suffix) = href.split_at(split);
    let prefix = match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "",
    };
    Some(format!("{}{}{}", prefix, new_name, suffix))
}

/// Links with a scheme, and pure fragment links, never point at another entry
pub fn is_external(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return true;
    }
    match href.find(':') {
        Some(colon) => {
            let scheme = &href[..colon];
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
                && href.find('/').is_none_or(|slash| slash > colon)
        }
        None => false,
    }
}
