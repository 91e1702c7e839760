//! Document Translator CLI - Command line tool for translating documents.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use doc_translator_core::{AppConfig, InsertMode, Workflow};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InsertOption {
    Replace,
    Append,
    Prepend,
}

impl From<InsertOption> for InsertMode {
    fn from(opt: InsertOption) -> Self {
        match opt {
            InsertOption::Replace => Self::Replace,
            InsertOption::Append => Self::Append,
            InsertOption::Prepend => Self::Prepend,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "doc-translate")]
#[command(author, version, about = "Translate documents while keeping their structure", long_about = None)]
struct Args {
    /// Input document (md, txt, srt, json, xlsx, csv, docx, html, epub)
    #[arg(required = true)]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Target language
    #[arg(short = 't', long)]
    to_lang: Option<String>,

    /// OpenAI API base URL
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// Model name for OpenAI-compatible API
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// How the translation is written next to the original text
    #[arg(long, value_enum)]
    insert_mode: Option<InsertOption>,

    /// Separator between original and translation in append/prepend mode
    #[arg(long)]
    separator: Option<String>,

    /// Maximum chunk size in bytes
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Also save a standalone HTML page of the translation
    #[arg(long)]
    html: bool,

    /// Also save markdown output as a zip with its images as files
    #[arg(long)]
    mdzip: bool,

    /// Maximum concurrent requests
    #[arg(long)]
    concurrent: Option<usize>,

    /// Extract a glossary first and save it next to the output
    #[arg(long)]
    glossary: bool,

    /// Extra instructions appended to the system prompt
    #[arg(long)]
    prompt: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(to_lang) = &self.to_lang {
            config.to_lang.clone_from(to_lang);
        }
        if let Some(base_url) = &self.api_base {
            config.agent.base_url.clone_from(base_url);
        }
        if self.api_key.is_some() {
            config.agent.api_key.clone_from(&self.api_key);
        }
        if let Some(model) = &self.model {
            config.agent.model_id.clone_from(model);
        }
        if let Some(mode) = self.insert_mode {
            config.insert_mode = mode.into();
        }
        if self.separator.is_some() {
            config.separator.clone_from(&self.separator);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(concurrent) = self.concurrent {
            config.agent.concurrent = concurrent;
        }
        if self.glossary {
            config.glossary.enabled = true;
        }
        if self.prompt.is_some() {
            config.custom_prompt.clone_from(&self.prompt);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

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

    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load().context("Failed to load configuration")?
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    #[allow(clippy::unwrap_used)]
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} requests ({eta})")
        .unwrap()
        .progress_chars("#>-");
    let pb = ProgressBar::new(0);
    pb.set_style(style);

    let bar = pb.clone();
    let progress = Arc::new(move |done: usize, total: usize| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    });

    let mut workflow = Workflow::from_config(config)
        .context("Failed to initialize workflow")?
        .with_progress(progress);

    info!("Reading {}", args.input.display());
    workflow
        .read_path(&args.input)
        .context(format!("Failed to read: {}", args.input.display()))?;

    workflow
        .translate_async()
        .await
        .context(format!("Failed to translate: {}", args.input.display()))?;
    pb.finish_with_message("Translation complete");

    let output_path = workflow
        .save_translated(None, Some(&args.output_dir))
        .context("Failed to save translated document")?;
    let glossary_path = workflow
        .save_attachment("glossary", Some(&args.output_dir))
        .context("Failed to save glossary")?;
    let html_path = if args.html {
        Some(
            workflow
                .save_as_html(None, Some(&args.output_dir))
                .context("Failed to save HTML page")?,
        )
    } else {
        None
    };
    let mdzip_path = if args.mdzip {
        Some(
            workflow
                .save_as_mdzip(None, Some(&args.output_dir))
                .context("Failed to save markdown zip")?,
        )
    } else {
        None
    };

    let usage = workflow.usage();
    info!(
        "Token usage: {} prompt ({} cached), {} completion",
        usage.prompt_tokens, usage.cached_tokens, usage.completion_tokens
    );

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("Translated document saved to: {}", output_path.display());
        if let Some(path) = glossary_path {
            println!("Glossary saved to: {}", path.display());
        }
        if let Some(path) = html_path {
            println!("HTML page saved to: {}", path.display());
        }
        if let Some(path) = mdzip_path {
            println!("Markdown zip saved to: {}", path.display());
        }
    }

    Ok(())
}
