//! Storybook CLI - Command line tool for generating illustrated children's books.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use storybook_core::config::BackendConfig;
use storybook_core::orchestrator::TOTAL_STEPS;
use storybook_core::{AppConfig, FormState, Progress, ReferenceMode, Studio, pdf_file_name};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "storybook")]
#[command(author, version, about = "Generate an illustrated storybook", long_about = None)]
struct Args {
    /// Form file (JSON or TOML); flags below override its fields
    #[arg(short, long)]
    form: Option<PathBuf>,

    /// Child's name
    #[arg(long)]
    name: Option<String>,

    /// Child's age
    #[arg(long)]
    age: Option<u32>,

    /// Reading age (3-12)
    #[arg(long)]
    reading_age: Option<u32>,

    /// Number of story pages (12, 16 or 20)
    #[arg(long)]
    pages: Option<u32>,

    /// Illustration style
    #[arg(long)]
    style: Option<String>,

    /// Story theme
    #[arg(long)]
    theme: Option<String>,

    /// Description of the child's appearance
    #[arg(long)]
    traits: Option<String>,

    /// Reference photo of the child
    #[arg(long)]
    photo: Option<PathBuf>,

    /// Output PDF file (default: <name>-storybook.pdf)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, env = "STORYBOOK_API_BASE")]
    api_base: Option<String>,

    /// Backend API key
    #[arg(long, env = "STORYBOOK_API_KEY")]
    api_key: Option<String>,

    /// Illustrate these pages again after the run (e.g., "3" or "3,5-7")
    #[arg(long)]
    retry_pages: Option<String>,

    /// Illustrate again every page left without an illustration
    #[arg(long)]
    retry_failed: bool,

    /// Stop after generation without exporting a PDF
    #[arg(long)]
    no_pdf: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_page_list(pages: &str, total: u32) -> Result<Vec<u32>> {
    let mut result = Vec::new();

    for part in pages.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().context("Invalid page range start")?;
            let end: u32 = end.trim().parse().context("Invalid page range end")?;
            result.extend((start..=end).filter(|p| (1..=total).contains(p)));
        } else {
            let page: u32 = part.parse().context("Invalid page number")?;
            if (1..=total).contains(&page) {
                result.push(page);
            }
        }
    }

    result.sort_unstable();
    result.dedup();
    Ok(result)
}

fn build_form(args: &Args, max_photo_dimension: u32) -> Result<FormState> {
    let mut form = match &args.form {
        Some(path) => FormState::from_file(path)
            .context(format!("Failed to load form: {}", path.display()))?,
        None => FormState::default(),
    };

    if let Some(name) = &args.name {
        form.name.clone_from(name);
    }
    if let Some(age) = args.age {
        form.age = age;
    }
    if let Some(reading_age) = args.reading_age {
        form.reading_age = reading_age;
    }
    if let Some(pages) = args.pages {
        form.page_count = pages;
    }
    if let Some(style) = &args.style {
        form.style.clone_from(style);
    }
    if let Some(theme) = &args.theme {
        form.theme.clone_from(theme);
    }
    if let Some(traits) = &args.traits {
        form.traits.clone_from(traits);
        form.reference_mode = ReferenceMode::Description;
    }

    if let Some(path) = &args.photo {
        let bytes =
            std::fs::read(path).context(format!("Failed to read photo: {}", path.display()))?;
        form.attach_photo(&bytes, max_photo_dimension)
            .context(format!("Failed to process photo: {}", path.display()))?;
    }

    Ok(form)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(u64::from(TOTAL_STEPS));
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override backend with CLI arguments
    if args.api_base.is_some() || args.api_key.is_some() {
        let api_base = args
            .api_base
            .clone()
            .unwrap_or_else(|| config.backend.api_base.clone());
        let api_key = args.api_key.clone().or_else(|| config.backend.api_key.clone());
        let timeout_secs = config.backend.timeout_secs;
        config.backend = BackendConfig {
            timeout_secs,
            ..BackendConfig::new(api_base, api_key)
        };
    }

    let form = build_form(&args, config.generation.max_photo_dimension)?;
    let form = match form.validate() {
        Ok(form) => form,
        Err(e) => anyhow::bail!("{e}"),
    };

    info!("Using backend at {}", config.backend.api_base);
    let studio = Studio::new(config).context("Failed to initialize backend client")?;

    // Generation run
    let pb = progress_bar();
    let sink = pb.clone();
    let summary = studio
        .generate(
            &form,
            Some(Box::new(move |progress: &Progress| {
                sink.set_position(u64::from(progress.step));
                sink.set_message(progress.label.clone());
            })),
        )
        .await;

    let summary = match summary {
        Ok(summary) => {
            pb.finish_with_message("Book generated");
            summary
        }
        Err(e) => {
            pb.abandon();
            return Err(e).context("Generation failed");
        }
    };

    for page in &summary.missing {
        pb.println(format!("Page {page} has no illustration"));
    }

    // Single-page retries
    let total = u32::try_from(studio.snapshot().await.pages.len()).unwrap_or(u32::MAX);
    let mut retries = match &args.retry_pages {
        Some(list) => parse_page_list(list, total)?,
        None => Vec::new(),
    };
    if args.retry_failed {
        retries.extend(&summary.missing);
    }
    retries.sort_unstable();
    retries.dedup();

    for page in retries {
        info!("Retrying page {}", page);
        match studio.retry_page(page).await {
            Ok(_) => pb.println(format!("Page {page} illustrated again")),
            Err(e) => warn!("Page {} retry failed: {}", page, e),
        }
    }

    if args.no_pdf {
        return Ok(());
    }

    // PDF export
    if !studio.pdf_ready().await {
        let missing = studio.snapshot().await.missing_pages();
        let list: Vec<String> = missing.iter().map(ToString::to_string).collect();
        anyhow::bail!(
            "Pages {} have no illustration; retry them with --retry-pages or --retry-failed",
            list.join(", ")
        );
    }

    let document = studio.export_pdf().await.context("Failed to export PDF")?;

    let output_path = args
        .output
        .unwrap_or_else(|| PathBuf::from(pdf_file_name(form.name())));

    document
        .save(&output_path)
        .context(format!("Failed to write output: {}", output_path.display()))?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("Storybook saved to: {}", output_path.display());
    }

    Ok(())
}
