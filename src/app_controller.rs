use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::app_config::{Config, OutputFormat};
use crate::container::{ContainerReader, ContainerWriter, NavSnapshot, RewriteSummary};
use crate::errors::AppError;
use crate::file_utils::{FileManager, RunWorkspace};
use crate::providers::TranslationBackend;
use crate::render::{PagedTextRenderer, PlainTextRenderer, Renderer};
use crate::segmentation::reconstruct::title_translations;
use crate::segmentation::Segmenter;
use crate::translation::{
    OrchestratorSettings, RateLimiterRegistry, RoutingTable, TranslationOrchestrator, TranslationStats,
};

// @module: Application controller for e-book translation jobs

/// What to translate and where to put the results
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub source_path: PathBuf,
    pub target_language: String,
    pub output_formats: Vec<OutputFormat>,
    pub output_dir: PathBuf,
}

impl JobRequest {
    /// Request using the languages and formats of the configuration
    pub fn from_config(source_path: PathBuf, output_dir: PathBuf, config: &Config) -> Self {
        Self {
            source_path,
            target_language: config.target_language.clone(),
            output_formats: config.output.formats.clone(),
            output_dir,
        }
    }
}

/// Final state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Complete,
    /// Outputs were written but some segments kept their source text
    PartialFailure,
    Failed,
    Cancelled,
}

/// A segment that no backend could translate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedSegment {
    pub segment_index: usize,
    pub document_id: String,
    pub reason: Option<String>,
}

/// Outcome of one job, written as JSON next to the outputs
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub run_id: String,
    pub source_path: PathBuf,
    pub target_language: String,
    pub status: JobStatus,
    pub outputs: Vec<PathBuf>,
    pub segment_count: usize,
    pub unresolved_segments: Vec<UnresolvedSegment>,
    pub cancelled_segments: usize,
    pub failover_count: usize,
    /// Structured reason of a failed or cancelled run
    pub reason: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub rewrite: Option<RewriteSummary>,
    pub stats: Option<TranslationStats>,
}

impl JobReport {
    fn new(run_id: &str, request: &JobRequest) -> Self {
        Self {
            run_id: run_id.to_string(),
            source_path: request.source_path.clone(),
            target_language: request.target_language.clone(),
            status: JobStatus::Failed,
            outputs: Vec::new(),
            segment_count: 0,
            unresolved_segments: Vec::new(),
            cancelled_segments: 0,
            failover_count: 0,
            reason: None,
            started_at: Local::now().to_rfc3339(),
            finished_at: String::new(),
            rewrite: None,
            stats: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Complete | JobStatus::PartialFailure)
    }
}

/// Structure of a container, as shown by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub title: Option<String>,
    pub language: Option<String>,
    pub page_progression_direction: Option<String>,
    pub entries: usize,
    pub documents: usize,
    pub spine_documents: usize,
    pub has_navigation_document: bool,
    pub has_ncx: bool,
    pub segments: usize,
    pub characters: usize,
}

/// Main application controller for e-book translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Backend chain override; built from the routing table when unset
    backends: Option<Vec<Arc<dyn TranslationBackend>>>,
    // @field: Shared per-provider rate limiters
    registry: Arc<RateLimiterRegistry>,
    // @field: Set to stop dispatching new batches
    cancel: Arc<AtomicBool>,
    // @field: Draw progress bars
    show_progress: bool,
}

impl Controller {
    /// Create a new controller for test purposes with default configuration
    pub fn new_for_test() -> Result<Self> {
        Ok(Self::with_config(Config::default())?
            .with_registry(Arc::new(RateLimiterRegistry::default()))
            .with_progress(false))
    }

    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let registry = RateLimiterRegistry::global(config.translation.common.rate_limit_safety_margin);
        Ok(Self {
            config,
            backends: None,
            registry,
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: true,
        })
    }

    /// Use a fixed backend chain instead of the configured providers
    pub fn with_backends(mut self, backends: Vec<Arc<dyn TranslationBackend>>) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn with_registry(mut self, registry: Arc<RateLimiterRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flag observed between batches; setting it cancels the running job
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Check if the controller is properly initialized with configuration
    pub fn is_initialized(&self) -> bool {
        !self.config.source_language.is_empty() && !self.config.target_language.is_empty()
    }

    /// Describe a container without translating it
    pub fn inspect(&self, path: &Path) -> Result<ContainerSummary> {
        let container = ContainerReader::new(self.config.container.clone())
            .open(path)
            .with_context(|| format!("Failed to open {:?}", path))?;
        let (segments, _) = Segmenter::new().segment(&container.documents);

        Ok(ContainerSummary {
            title: container.title(),
            language: container.package.language(),
            page_progression_direction: container.package.page_progression_direction(),
            entries: container.entry_names().len(),
            documents: container.documents.len(),
            spine_documents: container.spine_documents().count(),
            has_navigation_document: container.documents.iter().any(|d| d.is_navigation),
            has_ncx: container.ncx.is_some(),
            segments: segments.len(),
            characters: segments.iter().map(|s| s.text.chars().count()).sum(),
        })
    }

    /// Run the main workflow for a single book
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<JobReport> {
        let multi_progress = MultiProgress::new();
        let request = JobRequest::from_config(input_file, output_dir, &self.config);
        self.run_with_progress(&request, &multi_progress, force_overwrite).await
    }

    /// Run one job and always produce a report
    pub async fn run_job(&self, request: &JobRequest) -> JobReport {
        let multi_progress = MultiProgress::new();
        self.execute(request, &multi_progress).await
    }

    async fn run_with_progress(
        &self,
        request: &JobRequest,
        multi_progress: &MultiProgress,
        force_overwrite: bool,
    ) -> Result<JobReport> {
        if !request.source_path.exists() {
            return Err(anyhow::anyhow!("Input file does not exist: {:?}", request.source_path));
        }
        FileManager::ensure_dir(&request.output_dir)?;

        if !force_overwrite && let Some(existing) = self.existing_output(request) {
            warn!(
                "Skipping file, translation already exists at {} (use -f to force overwrite)",
                existing.display()
            );
            let mut report = JobReport::new("skipped", request);
            report.status = JobStatus::Complete;
            report.outputs.push(existing);
            report.finished_at = Local::now().to_rfc3339();
            return Ok(report);
        }

        Ok(self.execute(request, multi_progress).await)
    }

    fn existing_output(&self, request: &JobRequest) -> Option<PathBuf> {
        let format = request.output_formats.first().copied()?;
        let path = FileManager::generate_output_path(
            &request.source_path,
            &request.output_dir,
            &request.target_language,
            format,
        );
        FileManager::file_exists(&path).then_some(path)
    }

    async fn execute(&self, request: &JobRequest, multi_progress: &MultiProgress) -> JobReport {
        let start_time = std::time::Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = JobReport::new(&run_id, request);

        info!(
            "🚀 epubwai run {}: {} -> {}",
            run_id,
            request.source_path.display(),
            request.target_language
        );

        if let Err(e) = self.translate_book(request, &run_id, multi_progress, &mut report).await {
            error!("Run {} failed: {}", run_id, e);
            report.status = JobStatus::Failed;
            report.reason = Some(format!("{}: {}", e.reason_code(), e));
        }

        report.finished_at = Local::now().to_rfc3339();
        info!(
            "Run {} finished with status {:?} in {}",
            run_id,
            report.status,
            Self::format_duration(start_time.elapsed())
        );

        if self.config.output.write_report
            && let Err(e) = self.write_report(request, &report)
        {
            warn!("Failed to write job report: {}", e);
        }
        report
    }

    /// The pipeline proper. Outputs are staged in the run workspace and only
    /// copied to the output directory once the run succeeded.
    async fn translate_book(
        &self,
        request: &JobRequest,
        run_id: &str,
        multi_progress: &MultiProgress,
        report: &mut JobReport,
    ) -> Result<(), AppError> {
        let workspace = RunWorkspace::new(run_id)?;
        let target = request.target_language.as_str();

        let mut container = ContainerReader::new(self.config.container.clone()).open(&request.source_path)?;
        let snapshot = NavSnapshot::capture(&container.documents);

        let segmenter = Segmenter::new();
        let (segments, map) = segmenter.segment(&container.documents);
        map.check_alignment("segment", segments.len())?;
        report.segment_count = segments.len();

        let backends = match &self.backends {
            Some(backends) => backends.clone(),
            None => RoutingTable::from_config(&self.config.translation).backends(
                target,
                &self.config.translation,
                &self.config.source_language,
            ),
        };
        let orchestrator = TranslationOrchestrator::new(
            backends,
            Arc::clone(&self.registry),
            OrchestratorSettings::from_common(&self.config.translation.common),
        )
        .with_cancellation(Arc::clone(&self.cancel));

        let titles: HashMap<&str, &str> = container
            .documents
            .iter()
            .filter_map(|d| d.title.as_deref().map(|title| (d.id.as_str(), title)))
            .collect();
        let protected = orchestrator.protect_segments(&segments, |segment| {
            titles
                .get(segment.source_document_id.as_str())
                .map(|title| title.to_string())
        });
        map.check_alignment("protect", protected.len())?;

        let progress_bar = self.progress_bar(multi_progress, segments.len() as u64);
        let pb = progress_bar.clone();
        let outcome = orchestrator
            .translate(&protected, target, move |done, _total| {
                pb.set_position(done as u64);
            })
            .await?;
        progress_bar.finish_and_clear();

        report.failover_count = outcome.failover_count;
        report.cancelled_segments = outcome.cancelled_segments.len();
        report.stats = Some(outcome.stats.clone());
        report.unresolved_segments = outcome
            .failed_segments
            .iter()
            .map(|&index| UnresolvedSegment {
                segment_index: index,
                document_id: segments[index].source_document_id.clone(),
                reason: outcome.results[index].reason.clone(),
            })
            .collect();

        if outcome.cancelled {
            report.status = JobStatus::Cancelled;
            report.reason = Some("cancelled".to_string());
            warn!("Run {} cancelled, no outputs written", run_id);
            return Ok(());
        }
        if !report.unresolved_segments.is_empty() && self.config.output.fail_on_partial {
            report.status = JobStatus::Failed;
            report.reason = Some(format!(
                "partial_failure: {} segments unresolved",
                report.unresolved_segments.len()
            ));
            return Ok(());
        }

        let translated = outcome.translated_texts();
        map.check_alignment("restore", translated.len())?;
        let title_pairs = title_translations(&segments, &map, &translated);
        segmenter.reconstruct(&mut container.documents, &map, &translated)?;

        let writer = ContainerWriter::new(target, self.config.output.rename_documents);
        report.rewrite = Some(writer.rewrite(&mut container, &snapshot, &title_pairs));

        let mut staged = Vec::new();
        for format in &request.output_formats {
            let path = FileManager::generate_output_path(&request.source_path, workspace.path(), target, *format);
            match format {
                OutputFormat::Epub => writer.write(&container, &path)?,
                OutputFormat::Text | OutputFormat::Paged => {
                    let rendition = self.renderer(*format).render(&container.documents);
                    FileManager::write_to_file(&path, &rendition)?;
                }
            }
            staged.push((*format, path));
        }

        FileManager::ensure_dir(&request.output_dir)?;
        for (format, path) in staged {
            let destination =
                FileManager::generate_output_path(&request.source_path, &request.output_dir, target, format);
            FileManager::copy_file(&path, &destination)?;
            info!("Success: {}", destination.display());
            report.outputs.push(destination);
        }

        report.status = if report.unresolved_segments.is_empty() {
            JobStatus::Complete
        } else {
            warn!(
                "{} segments kept their source text",
                report.unresolved_segments.len()
            );
            JobStatus::PartialFailure
        };
        Ok(())
    }

    fn renderer(&self, format: OutputFormat) -> Box<dyn Renderer> {
        match format {
            OutputFormat::Paged => Box::new(PagedTextRenderer::new(
                self.config.output.page_width,
                self.config.output.page_lines,
            )),
            _ => Box::new(PlainTextRenderer::new()),
        }
    }

    fn progress_bar(&self, multi_progress: &MultiProgress, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = multi_progress.add(ProgressBar::new(total));
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));
        progress_bar.set_message("Translating");
        progress_bar
    }

    fn write_report(&self, request: &JobRequest, report: &JobReport) -> Result<()> {
        let path =
            FileManager::generate_report_path(&request.source_path, &request.output_dir, &request.target_language);
        let json = serde_json::to_string_pretty(report).context("Failed to serialize job report")?;
        FileManager::write_to_file(&path, &json)?;
        info!("Report written to {}", path.display());
        Ok(())
    }

    // Format duration in a human-readable format
    fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }

    /// Run the workflow in folder mode, translating every EPUB in a directory.
    /// Books that already have a translation are skipped unless forced.
    pub async fn run_folder(
        &self,
        input_dir: PathBuf,
        output_dir: Option<PathBuf>,
        force_overwrite: bool,
    ) -> Result<Vec<JobReport>> {
        let start_time = std::time::Instant::now();

        if !input_dir.exists() {
            return Err(anyhow::anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        // Outputs written next to their source must not be picked up as inputs
        let translated_suffix = format!(".{}", self.config.target_language);
        let books: Vec<PathBuf> = FileManager::find_files(&input_dir, "epub")?
            .into_iter()
            .filter(|book| {
                !book
                    .file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().ends_with(&translated_suffix))
            })
            .collect();
        if books.is_empty() {
            return Err(anyhow::anyhow!("No EPUB files found in directory: {:?}", input_dir));
        }

        let multi_progress = MultiProgress::new();
        let folder_pb = if self.show_progress {
            let pb = multi_progress.add(ProgressBar::new(books.len() as u64));
            let template_result = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} books ({percent}%) {msg} {eta}")
                .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(template_result.progress_chars("█▓▒░"));
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut reports = Vec::new();
        let mut error_count = 0;

        for book in &books {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("Cancelled, {} books left unprocessed", books.len() - reports.len() - error_count);
                break;
            }

            let file_name = book
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            folder_pb.set_message(format!("Processing: {}", file_name));

            let book_output_dir = output_dir
                .clone()
                .or_else(|| book.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| input_dir.clone());
            let request = JobRequest::from_config(book.clone(), book_output_dir, &self.config);

            match self.run_with_progress(&request, &multi_progress, force_overwrite).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Error processing file {}: {}", file_name, e);
                    error_count += 1;
                }
            }
            folder_pb.inc(1);
        }

        folder_pb.finish_with_message("Folder processing complete");

        let failed = reports.iter().filter(|r| !r.is_success()).count() + error_count;
        info!(
            "Folder processing completed in {}: {} books, {} failed",
            Self::format_duration(start_time.elapsed()),
            books.len(),
            failed
        );
        Ok(reports)
    }
}

