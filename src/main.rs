use approval_binder::{AttachmentFile, AttachmentGroup, Binder, BinderConfig, BinderError, FormData, GroupKind};
use approval_binder::{LogoCache, LogoSource};
use clap::Parser;
use glob::glob;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Render an approval letter and bind its attachments into a single PDF
#[derive(Parser, Debug)]
#[command(name = "approval-binder", about = "Render an approval letter and bind its attachments into one PDF")]
struct Args {
    /// Letter content as JSON
    #[arg(long)]
    form: PathBuf,
    /// Glob of site-condition photos/documents (repeatable)
    #[arg(long = "site-conditions")]
    site_conditions: Vec<String>,
    /// Glob of submitted plans (repeatable)
    #[arg(long)]
    submitted: Vec<String>,
    /// Organization logo (PNG or JPEG)
    #[arg(long)]
    logo: Option<PathBuf>,
    /// Engine configuration as JSON (defaults apply to missing keys)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Base URL serving assets/<name>.pdf for the reference document
    #[arg(long)]
    reference_url: Option<String>,
    /// File holding the reference document as base64
    #[arg(long)]
    reference_b64: Option<PathBuf>,
    /// Output directory (default: current directory)
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// Skip the merge engine and use the image-only fallback assembler
    #[arg(long, default_value_t = false)]
    fallback_only: bool,
}

impl Args {
    fn engine_config(&self) -> Result<BinderConfig, BinderError> {
        let mut config = match &self.config {
            Some(path) => BinderConfig::from_json_file(path)?,
            None => BinderConfig::default(),
        };
        if let Some(url) = &self.reference_url {
            config.reference.base_url = Some(url.clone());
        }
        if let Some(path) = &self.reference_b64 {
            config.reference.embedded_base64 = Some(std::fs::read_to_string(path)?);
        }
        if self.fallback_only {
            config.primary_merge = false;
        }
        Ok(config)
    }
}

fn read_attachment(path: &Path) -> Result<AttachmentFile, BinderError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or_default()
        .to_string();
    Ok(AttachmentFile::new(name, mime, bytes))
}

/// Expands the patterns in order; files within one pattern are sorted.
fn collect_group(kind: GroupKind, patterns: &[String]) -> Result<AttachmentGroup, BinderError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let entries = glob(pattern).map_err(|e| BinderError::Config(format!("bad pattern '{pattern}': {e}")))?;
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).filter(|p| p.is_file()).collect();
        paths.sort();
        if paths.is_empty() {
            log::warn!("Pattern '{pattern}' matched no files");
        }
        for path in paths {
            match read_attachment(&path) {
                Ok(file) => files.push(file),
                Err(e) => log::warn!("Cannot read {}: {e}", path.display()),
            }
        }
    }
    Ok(AttachmentGroup::new(kind, files))
}

/// Keeps the generated name a single path component (lots like "17/B").
fn flat_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
        .collect()
}

async fn run(args: Args) -> Result<bool, BinderError> {
    let config = args.engine_config()?;
    let form: FormData = serde_json::from_str(&std::fs::read_to_string(&args.form)?)?;

    let groups = vec![
        collect_group(GroupKind::SiteConditions, &args.site_conditions)?,
        collect_group(GroupKind::SubmittedFiles, &args.submitted)?,
    ];

    let logo = match &args.logo {
        Some(path) => LogoSource::Path(path.clone()),
        None => LogoSource::None,
    };
    let binder = Binder::new(config, Arc::new(LogoCache::new(logo)))?;

    let result = binder.generate(&form, groups).await;
    let Some(bytes) = result.document.filter(|_| result.success) else {
        log::error!("No document produced");
        return Ok(false);
    };

    std::fs::create_dir_all(&args.out_dir)?;
    let out = args.out_dir.join(flat_file_name(&result.filename));
    std::fs::write(&out, &bytes)?;

    for skipped in &result.report.skipped {
        println!("skipped: {} ({}): {}", skipped.name, skipped.section, skipped.reason);
    }
    if !result.report.reference_included {
        println!("note: reference document not included");
    }
    println!("{} ({} pages)", out.display(), result.report.total_pages);
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_do_not_create_subdirectories() {
        let name = flat_file_name("HOA Approval Letter - 17/B - 1 Elm St - Deck - 03_14_2024.pdf");
        assert_eq!(name, "HOA Approval Letter - 17-B - 1 Elm St - Deck - 03_14_2024.pdf");
        assert_eq!(flat_file_name(r"Lot 4\5.pdf"), "Lot 4-5.pdf");

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(flat_file_name("Approval - 17/B.pdf"));
        assert_eq!(out.parent(), Some(dir.path()));
        std::fs::write(&out, b"%PDF").unwrap();
    }
}
