/*!
 * OPF package document.
 *
 * The package is kept as a parsed markup tree so it can be rewritten in place
 * (language, page progression, renamed hrefs) and serialized without losing
 * metadata this crate does not model.
 */

use std::collections::HashMap;

use super::{parent_dir, remap_link, resolve_href, NCX_MEDIA_TYPE};
use crate::errors::ContainerError;
use crate::markup::{parse_document, serialize_tree, Element, MarkupTree, Node};

/// One manifest `<item>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    /// XHTML or HTML content document
    pub fn is_markup(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html" | "application/html+xml"
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    /// Path of the OPF file inside the container
    pub path: String,
    pub markup: MarkupTree,
    pub manifest: Vec<ManifestItem>,
    /// Manifest ids in reading order
    pub spine: Vec<String>,
    /// Manifest id of the NCX named by `<spine toc="...">`
    pub toc_id: Option<String>,
}

impl Package {
    pub fn parse(path: &str, content: &str) -> Result<Self, ContainerError> {
        let markup = parse_document(content).map_err(|e| {
            ContainerError::InvalidEpub(format!("package document {} is not well-formed: {}", path, e))
        })?;

        let root = markup
            .root()
            .filter(|root| root.local_name() == "package")
            .ok_or_else(|| ContainerError::InvalidEpub(format!("{} has no <package> root", path)))?;

        let manifest = root
            .find(&|e: &Element| e.local_name() == "manifest")
            .map(|manifest| {
                manifest
                    .child_elements()
                    .filter(|e| e.local_name() == "item")
                    .filter_map(|item| {
                        Some(ManifestItem {
                            id: item.attr("id")?,
                            href: item.attr("href")?,
                            media_type: item.attr("media-type").unwrap_or_default(),
                            properties: item
                                .attr("properties")
                                .map(|p| p.split_ascii_whitespace().map(str::to_string).collect())
                                .unwrap_or_default(),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .ok_or_else(|| ContainerError::InvalidEpub(format!("{} has no manifest", path)))?;

        let spine_element = root.find(&|e: &Element| e.local_name() == "spine");
        let spine = spine_element
            .map(|spine| {
                spine
                    .child_elements()
                    .filter(|e| e.local_name() == "itemref")
                    .filter_map(|itemref| itemref.attr("idref"))
                    .collect()
            })
            .unwrap_or_default();
        let toc_id = spine_element.and_then(|spine| spine.attr("toc"));

        Ok(Self {
            path: path.to_string(),
            markup,
            manifest,
            spine,
            toc_id,
        })
    }

    /// Directory that manifest hrefs are relative to
    pub fn base_dir(&self) -> &str {
        parent_dir(&self.path)
    }

    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Container path of a manifest item
    pub fn item_path(&self, item: &ManifestItem) -> Option<String> {
        resolve_href(self.base_dir(), &item.href)
    }

    /// The EPUB 3 navigation document
    pub fn navigation_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    /// The NCX, by spine reference or by media type
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.toc_id
            .as_deref()
            .and_then(|id| self.item(id))
            .or_else(|| self.manifest.iter().find(|item| item.media_type == NCX_MEDIA_TYPE))
    }

    fn metadata_value(&self, local_name: &str) -> Option<String> {
        self.markup
            .root()?
            .find(&|e: &Element| e.local_name() == "metadata")?
            .child_elements()
            .find(|e| e.local_name() == local_name)
            .map(|e| crate::document::normalize_whitespace(&e.text_content()))
            .filter(|value| !value.is_empty())
    }

    pub fn title(&self) -> Option<String> {
        self.metadata_value("title")
    }

    pub fn language(&self) -> Option<String> {
        self.metadata_value("language")
    }

    /// Set every `dc:language` to `language`, adding one when missing
    pub fn set_language(&mut self, language: &str) {
        let Some(metadata) = self
            .markup
            .root_mut()
            .and_then(|root| root.find_mut(&|e: &Element| e.local_name() == "metadata"))
        else {
            return;
        };

        let mut found = false;
        for child in metadata.children.iter_mut().filter_map(Node::as_element_mut) {
            if child.local_name() == "language" {
                child.children = vec![Node::Text(language.to_string())];
                found = true;
            }
        }

        if !found {
            let mut element = Element::new("dc:language");
            element.children.push(Node::Text(language.to_string()));
            metadata.children.push(Node::Element(element));
        }
    }

    pub fn page_progression_direction(&self) -> Option<String> {
        self.markup
            .root()?
            .find(&|e: &Element| e.local_name() == "spine")?
            .attr("page-progression-direction")
    }

    pub fn set_page_progression_direction(&mut self, direction: &str) {
        if let Some(spine) = self
            .markup
            .root_mut()
            .and_then(|root| root.find_mut(&|e: &Element| e.local_name() == "spine"))
        {
            spine.set_attr("page-progression-direction", direction);
        }
    }

    /// Rewrite every `href` in the package after documents were renamed
    pub fn remap_links(&mut self, renames: &HashMap<String, String>) {
        let base_dir = self.base_dir().to_string();

        self.markup.visit_elements_mut(|element| {
            if let Some(href) = element.attr("href")
                && let Some(remapped) = remap_link(&href, &base_dir, renames)
            {
                element.set_attr("href", &remapped);
            }
        });

        for item in self.manifest.iter_mut() {
            if let Some(remapped) = remap_link(&item.href, &base_dir, renames) {
                item.href = remapped;
            }
        }
    }

    pub fn serialize(&self) -> String {
        serialize_tree(&self.markup)
    }
}
