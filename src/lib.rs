/*!
 * # epubwai - structure-preserving EPUB translation
 *
 * A Rust library that translates the text of EPUB books while keeping their
 * markup, links, navigation and assets intact.
 *
 * ## Features
 *
 * - Safe container loading (entry count, size and compression ratio limits,
 *   path traversal rejection)
 * - Segmentation of content documents into translatable runs, with recorded
 *   addresses for exact re-injection
 * - Placeholder protection of tags, URLs, e-mail addresses and numbers
 * - Translation through various providers:
 *   - DeepL API
 *   - OpenAI API and LM Studio
 *   - Anthropic API
 *   - Ollama (local LLM)
 * - Batching, shared rate limiting, retries with backoff and provider failover
 * - Navigation refresh, right-to-left support and optional file renaming
 * - Plain text and fixed-page text renditions
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `container`: Reading, rewriting and writing EPUB archives
 * - `markup`: Lossless markup tree used by every document
 * - `document`: Content documents of a container
 * - `segmentation`: Segment extraction and reconstruction
 * - `translation`: Orchestration of translation jobs:
 *   - `translation::placeholders`: Masking and restoring protected fragments
 *   - `translation::batch`: Batching under provider limits
 *   - `translation::rate_limiter`: Process-wide per-provider rate limiting
 *   - `translation::routing`: Provider selection per target language
 *   - `translation::orchestrator`: Retry, validation and failover
 * - `providers`: Client implementations for translation backends
 * - `render`: Secondary text renditions
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod container;
pub mod document;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod markup;
pub mod providers;
pub mod render;
pub mod segmentation;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, JobReport, JobRequest, JobStatus};
pub use container::{ContainerReader, ContainerWriter, EpubContainer};
pub use document::Document;
pub use errors::{AppError, ContainerError, ProviderError, SegmentationError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use segmentation::Segmenter;
pub use translation::{PlaceholderGuard, TranslationOrchestrator};
