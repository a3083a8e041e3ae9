/*!
 * Opening an EPUB archive.
 *
 * The archive is checked before anything is parsed: entry count, entry
 * names, total uncompressed size and compression ratio must stay inside the
 * configured limits. Declared sizes are not trusted; every entry is read
 * through a bounded reader.
 */

use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

use super::package::Package;
use super::{EpubContainer, NcxDocument, CONTAINER_ENTRY, EPUB_MIMETYPE, MIMETYPE_ENTRY};
use crate::app_config::ContainerConfig;
use crate::document::Document;
use crate::errors::ContainerError;
use crate::markup::parse_document;

/// Entries smaller than this are exempt from the per-entry ratio check
const RATIO_CHECK_MIN_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ContainerReader {
    limits: ContainerConfig,
}

impl ContainerReader {
    pub fn new(limits: ContainerConfig) -> Self {
        Self { limits }
    }

    /// Open an EPUB file from disk
    pub fn open(&self, path: &Path) -> Result<EpubContainer, ContainerError> {
        let file = std::fs::File::open(path)?;
        self.read_from(file)
    }

    /// Open an EPUB held in memory
    pub fn read_bytes(&self, data: &[u8]) -> Result<EpubContainer, ContainerError> {
        self.read_from(Cursor::new(data))
    }

    pub fn read_from<R: Read + Seek>(&self, reader: R) -> Result<EpubContainer, ContainerError> {
        let mut archive = ZipArchive::new(reader)?;
        self.check_safety(&mut archive)?;

        let (entries, mut contents) = self.read_entries(&mut archive)?;

        match contents.get(MIMETYPE_ENTRY) {
            Some(mimetype) if mimetype.trim_ascii() == EPUB_MIMETYPE.as_bytes() => {}
            Some(_) => warn!("Unexpected mimetype entry, continuing as EPUB"),
            None => warn!("Archive has no mimetype entry, continuing as EPUB"),
        }

        let container_xml = text_entry(&contents, CONTAINER_ENTRY)?;
        let package_path = find_package_path(&container_xml)?;
        let package_xml = text_entry(&contents, &package_path)?;
        let package = Package::parse(&package_path, &package_xml)?;
        contents.remove(&package_path);

        let documents = load_documents(&package, &mut contents)?;

        let ncx = match package.ncx_item().and_then(|item| package.item_path(item)) {
            Some(path) if contents.contains_key(&path) => {
                let content = text_entry(&contents, &path)?;
                let markup = parse_document(&content).map_err(|e| ContainerError::MalformedDocument {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                contents.remove(&path);
                Some(NcxDocument { path, markup })
            }
            _ => None,
        };

        contents.remove(MIMETYPE_ENTRY);
        debug!(
            "Opened EPUB: {} documents, {} passthrough entries, ncx: {}",
            documents.len(),
            contents.len(),
            ncx.is_some()
        );

        Ok(EpubContainer {
            package,
            documents,
            ncx,
            entries: entries.into_iter().filter(|name| name != MIMETYPE_ENTRY).collect(),
            assets: contents,
        })
    }

    /// Validate the archive directory before reading any entry
    fn check_safety<R: Read + Seek>(&self, archive: &mut ZipArchive<R>) -> Result<(), ContainerError> {
        if archive.len() > self.limits.max_entries {
            return Err(ContainerError::UnsafeInput(format!(
                "{} entries exceed the limit of {}",
                archive.len(),
                self.limits.max_entries
            )));
        }

        let mut total_uncompressed: u64 = 0;
        let mut total_compressed: u64 = 0;

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            let name = file.name().to_string();
            check_entry_name(&name)?;

            let size = file.size();
            let compressed = file.compressed_size();
            total_uncompressed = total_uncompressed.saturating_add(size);
            total_compressed = total_compressed.saturating_add(compressed);

            if size >= RATIO_CHECK_MIN_BYTES && ratio(size, compressed) > self.limits.max_compression_ratio {
                return Err(ContainerError::UnsafeInput(format!(
                    "entry {} has compression ratio {:.0}, limit is {}",
                    name,
                    ratio(size, compressed),
                    self.limits.max_compression_ratio
                )));
            }
        }

        if total_uncompressed > self.limits.max_total_uncompressed_bytes {
            return Err(ContainerError::UnsafeInput(format!(
                "{} uncompressed bytes exceed the limit of {}",
                total_uncompressed, self.limits.max_total_uncompressed_bytes
            )));
        }
        if total_uncompressed >= RATIO_CHECK_MIN_BYTES
            && ratio(total_uncompressed, total_compressed) > self.limits.max_compression_ratio
        {
            return Err(ContainerError::UnsafeInput(format!(
                "archive compression ratio {:.0} exceeds the limit of {}",
                ratio(total_uncompressed, total_compressed),
                self.limits.max_compression_ratio
            )));
        }

        Ok(())
    }

    /// Read every file entry, stopping as soon as the size budget is spent
    fn read_entries<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<(Vec<String>, HashMap<String, Vec<u8>>), ContainerError> {
        let mut names = Vec::with_capacity(archive.len());
        let mut contents = HashMap::with_capacity(archive.len());
        let mut budget = self.limits.max_total_uncompressed_bytes;

        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();

            let mut data = Vec::new();
            file.take(budget.saturating_add(1)).read_to_end(&mut data)?;
            let read = data.len() as u64;
            if read > budget {
                return Err(ContainerError::UnsafeInput(format!(
                    "entry {} inflates beyond the uncompressed size limit",
                    name
                )));
            }
            budget -= read;

            names.push(name.clone());
            contents.insert(name, data);
        }

        Ok((names, contents))
    }
}

fn ratio(uncompressed: u64, compressed: u64) -> f64 {
    uncompressed as f64 / compressed.max(1) as f64
}

/// Reject absolute paths, backslashes and parent-directory segments
fn check_entry_name(name: &str) -> Result<(), ContainerError> {
    let unsafe_name = name.starts_with('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.split('/').any(|segment| segment == "..")
        || name.chars().nth(1) == Some(':');
    if unsafe_name {
        return Err(ContainerError::UnsafeInput(format!("unsafe entry path '{}'", name)));
    }
    Ok(())
}

fn text_entry(contents: &HashMap<String, Vec<u8>>, path: &str) -> Result<String, ContainerError> {
    let bytes = contents
        .get(path)
        .map(Vec::as_slice)
        .ok_or_else(|| ContainerError::InvalidEpub(format!("missing entry {}", path)))?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|e| ContainerError::MalformedDocument {
        path: path.to_string(),
        reason: format!("not valid UTF-8: {}", e),
    })
}

/// Path of the first rootfile named in `META-INF/container.xml`
fn find_package_path(container_xml: &str) -> Result<String, ContainerError> {
    let mut reader = Reader::from_str(container_xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        let path = String::from_utf8_lossy(&attr.value).into_owned();
                        check_entry_name(&path)?;
                        return Ok(path);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(ContainerError::InvalidEpub("No rootfile found in container.xml".into()))
}

/// Parse spine documents in reading order, then the remaining markup items
fn load_documents(
    package: &Package,
    contents: &mut HashMap<String, Vec<u8>>,
) -> Result<Vec<Document>, ContainerError> {
    let spine_items = package.spine.iter().filter_map(|id| package.item(id));
    let other_items = package
        .manifest
        .iter()
        .filter(|item| !package.spine.contains(&item.id));

    let mut documents = Vec::new();
    for item in spine_items.chain(other_items) {
        if !item.is_markup() {
            continue;
        }
        let Some(path) = package.item_path(item) else {
            warn!("Skipping manifest item {} with unresolvable href {}", item.id, item.href);
            continue;
        };
        if documents.iter().any(|d: &Document| d.path == path) {
            continue;
        }
        if !contents.contains_key(&path) {
            warn!("Manifest item {} points to missing entry {}", item.id, path);
            continue;
        }

        let content = text_entry(contents, &path)?;
        let markup = parse_document(&content).map_err(|e| ContainerError::MalformedDocument {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        contents.remove(&path);

        let mut document = Document::new(item.id.clone(), path, markup);
        document.media_type = item.media_type.clone();
        document.is_navigation = item.has_property("nav");
        document.in_spine = package.spine.contains(&item.id);
        documents.push(document);
    }

    if !documents.iter().any(|d| d.in_spine) {
        return Err(ContainerError::InvalidEpub(
            "spine references no markup documents".to_string(),
        ));
    }
    Ok(documents)
}
