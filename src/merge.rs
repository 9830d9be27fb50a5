//! Document merge engine.
//!
//! Output order is fixed: letter, then each non-empty attachment group in
//! `GroupKind` order (label page + attachment pages), then the reference
//! document under its own label. Pages are only ever appended.

use crate::attachment::{normalize_groups, Attachment, AttachmentFile, AttachmentGroup};
use crate::config::BinderConfig;
use crate::error::{BinderError, Result};
use crate::fallback;
use crate::geometry::PageBounds;
use crate::letter::{layout_letter, output_filename, FormData, LetterContext, LetterLayout};
use crate::pages::{self, Prepared};
use crate::raster::RasterImage;
use crate::resources::{load_reference, LogoCache};
use lopdf::Document;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const LETTER_SECTION: &str = "Letter";

/// Result of one embedding step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedOutcome {
    Embedded { pages: usize },
    /// the file contributes nothing; everything else proceeds
    Skipped(String),
    /// the output document can no longer be trusted
    FallbackRequired(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpan {
    pub title: String,
    /// 1-based
    pub first_page: usize,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAttachment {
    pub section: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    pub sections: Vec<SectionSpan>,
    pub skipped: Vec<SkippedAttachment>,
    pub reference_included: bool,
    pub fallback_used: bool,
    pub total_pages: usize,
}

impl AssemblyReport {
    pub fn section(&self, title: &str) -> Option<&SectionSpan> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub(crate) fn skip(&mut self, section: &str, name: &str, reason: String) {
        log::warn!("Skipping attachment '{name}' in '{section}': {reason}");
        self.skipped.push(SkippedAttachment {
            section: section.to_string(),
            name: name.to_string(),
            reason,
        });
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub success: bool,
    pub document: Option<Vec<u8>>,
    pub filename: String,
    pub report: AssemblyReport,
}

/// Assembles approval letters with their attachments.
pub struct Binder {
    config: BinderConfig,
    logo: Arc<LogoCache>,
    http: reqwest::Client,
}

impl Binder {
    pub fn new(config: BinderConfig, logo: Arc<LogoCache>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.reference.timeout_secs))
            .build()?;
        Ok(Self { config, logo, http })
    }

    /// Generates the approval document. Never fails outright: when neither the
    /// merge engine nor the fallback can produce a document the result carries
    /// `success = false`.
    pub async fn generate(&self, form: &FormData, groups: Vec<AttachmentGroup>) -> GenerationResult {
        let t0 = Instant::now();
        let date = form
            .approval_date
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let filename = output_filename(&self.config.letterhead.organization, form, date);
        let groups = normalize_groups(groups);

        let logo = self.logo.get().await;
        let ctx = LetterContext {
            letterhead: &self.config.letterhead,
            page: &self.config.page,
            deposit: &self.config.deposit,
            date,
            logo: logo.as_ref().map(|img| (img.width, img.height)),
            has_attachments: !groups.is_empty(),
        };
        let layout = layout_letter(form, &ctx);

        let merged = if self.config.primary_merge {
            self.merge(&layout, logo.as_deref(), &groups).await
        } else {
            Err("primary merge disabled".to_string())
        };
        self.conclude(merged, &layout, logo.as_deref(), &groups, filename, t0)
    }

    /// Turns the merge result into the final answer, running the fallback
    /// assembler when the merge could not produce a document.
    fn conclude(
        &self,
        merged: std::result::Result<(Vec<u8>, AssemblyReport), String>,
        layout: &LetterLayout,
        logo: Option<&RasterImage>,
        groups: &[AttachmentGroup],
        filename: String,
        t0: Instant,
    ) -> GenerationResult {
        match merged {
            Ok((bytes, report)) => {
                log::info!(
                    "Generated '{filename}': {} pages, {} skipped, {} bytes in {:.1}ms",
                    report.total_pages,
                    report.skipped.len(),
                    bytes.len(),
                    t0.elapsed().as_secs_f64() * 1000.0
                );
                return GenerationResult { success: true, document: Some(bytes), filename, report };
            }
            Err(reason) => log::warn!("Merge engine cannot proceed ({reason}); using fallback assembler"),
        }

        match fallback::assemble(layout, logo, groups, &self.config) {
            Ok((bytes, report)) => {
                log::info!(
                    "Generated '{filename}' with fallback assembler: {} pages, {} skipped",
                    report.total_pages,
                    report.skipped.len()
                );
                GenerationResult { success: true, document: Some(bytes), filename, report }
            }
            Err(e) => {
                log::error!("Document generation failed: {e}");
                GenerationResult { success: false, document: None, filename, report: AssemblyReport::default() }
            }
        }
    }

    async fn merge(
        &self,
        layout: &LetterLayout,
        logo: Option<&RasterImage>,
        groups: &[AttachmentGroup],
    ) -> std::result::Result<(Vec<u8>, AssemblyReport), String> {
        let session = Session::start(layout, logo).map_err(|e| format!("letter: {e}"))?;
        self.merge_into(session, groups).await
    }

    async fn merge_into(
        &self,
        mut session: Session,
        groups: &[AttachmentGroup],
    ) -> std::result::Result<(Vec<u8>, AssemblyReport), String> {
        let bounds = self.config.page.image_bounds();

        for group in groups {
            let title = self.config.sections.title(group.kind);
            for (name, outcome) in session.embed_group(title, &group.files, &bounds, &self.config).await {
                match outcome {
                    EmbedOutcome::Embedded { pages } => log::info!("Embedded '{name}' ({pages} pages)"),
                    EmbedOutcome::Skipped(reason) => session.report.skip(title, &name, reason),
                    EmbedOutcome::FallbackRequired(reason) => return Err(reason),
                }
            }
        }

        self.append_reference(&mut session).await?;

        let report = session.report.clone();
        let bytes = pages::finalize(&mut session.doc).map_err(|e| format!("serialization: {e}"))?;
        Ok((bytes, AssemblyReport { total_pages: session.page_count(), ..report }))
    }

    async fn append_reference(&self, session: &mut Session) -> std::result::Result<(), String> {
        let reference = &self.config.reference;
        let prepared = match load_reference(reference, &self.http).await {
            Ok(bytes) => off_runtime(move || pages::load_pdf(&bytes).and_then(pages::prepare)).await,
            Err(e) => Err(e),
        };
        match prepared {
            Ok(prepared) => {
                let outcome = session.commit_section(&reference.title, &self.config, vec![prepared]);
                if let EmbedOutcome::FallbackRequired(reason) = outcome {
                    return Err(reason);
                }
                session.report.reference_included = true;
            }
            Err(e) => log::warn!("Reference document '{}' omitted: {e}", reference.title),
        }
        Ok(())
    }
}

/// Runs a staging step, turning a panic inside the PDF/image libraries into
/// an error for that one file.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        Err(BinderError::ResourceUnavailable("malformed input aborted parsing".to_string()))
    })
}

/// Runs a guarded parse/decode step on the blocking pool.
async fn off_runtime<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || guarded(f))
        .await
        .unwrap_or_else(|e| Err(BinderError::ResourceUnavailable(format!("staging task failed: {e}"))))
}

/// Turns one attachment into staged pages without touching the output.
pub fn stage_file(file: &AttachmentFile, bounds: &PageBounds) -> Result<Prepared> {
    match file.classify() {
        Attachment::PaginatedDocument(bytes) => guarded(|| pages::load_pdf(bytes).and_then(pages::prepare)),
        Attachment::RasterImage(bytes, encoding) => guarded(|| {
            let img = RasterImage::decode(bytes, encoding)?;
            pages::prepare(pages::image_page_doc(&img, bounds)?)
        }),
        Attachment::Unsupported(reason) => Err(BinderError::ResourceUnavailable(reason)),
    }
}

/// The in-progress output document
struct Session {
    doc: Document,
    report: AssemblyReport,
}

impl Session {
    fn start(layout: &LetterLayout, logo: Option<&RasterImage>) -> Result<Session> {
        let doc = pages::letter_doc(layout, logo)?;
        let pages = pages::page_count(&doc);
        let report = AssemblyReport {
            sections: vec![SectionSpan { title: LETTER_SECTION.to_string(), first_page: 1, page_count: pages }],
            ..AssemblyReport::default()
        };
        log::info!("Letter rendered ({pages} pages)");
        Ok(Session { doc, report })
    }

    fn page_count(&self) -> usize {
        pages::page_count(&self.doc)
    }

    /// Stages every file of a group, then commits the label and the staged
    /// pages in input order. A group with nothing usable adds no pages.
    async fn embed_group(
        &mut self,
        title: &str,
        files: &[AttachmentFile],
        bounds: &PageBounds,
        config: &BinderConfig,
    ) -> Vec<(String, EmbedOutcome)> {
        let mut outcomes = Vec::with_capacity(files.len());
        let mut staged = Vec::new();
        for file in files {
            let (owned, bounds) = (file.clone(), *bounds);
            match off_runtime(move || stage_file(&owned, &bounds)).await {
                Ok(prepared) => staged.push((file.name.clone(), prepared)),
                Err(e) => outcomes.push((file.name.clone(), EmbedOutcome::Skipped(e.to_string()))),
            }
        }

        if staged.is_empty() {
            log::warn!("Section '{title}' has no usable attachments; omitted");
            return outcomes;
        }

        let (names, prepared): (Vec<String>, Vec<Prepared>) = staged.into_iter().unzip();
        let counts: Vec<usize> = prepared.iter().map(Prepared::page_count).collect();
        match self.commit_section(title, config, prepared) {
            EmbedOutcome::Embedded { .. } => {
                outcomes.extend(
                    names
                        .into_iter()
                        .zip(counts)
                        .map(|(name, pages)| (name, EmbedOutcome::Embedded { pages })),
                );
            }
            other => outcomes.push((title.to_string(), other)),
        }
        outcomes
    }

    /// Appends a label page followed by `parts`, recording the section span.
    fn commit_section(&mut self, title: &str, config: &BinderConfig, parts: Vec<Prepared>) -> EmbedOutcome {
        let first_page = self.page_count() + 1;
        let label = match pages::section_label_doc(title, config.page.size, config.page.margin) {
            Ok(doc) => doc,
            Err(e) => return EmbedOutcome::FallbackRequired(format!("label '{title}': {e}")),
        };

        let mut added = 0;
        let staged = std::iter::once(pages::prepare(label)).chain(parts.into_iter().map(Ok));
        for part in staged {
            match part.and_then(|p| pages::attach(&mut self.doc, p)) {
                Ok(n) => added += n,
                Err(e) => return EmbedOutcome::FallbackRequired(format!("section '{title}': {e}")),
            }
        }

        log::info!("Section '{title}' appended ({added} pages from page {first_page})");
        self.report.sections.push(SectionSpan { title: title.to_string(), first_page, page_count: added });
        EmbedOutcome::Embedded { pages: added }
    }
}
