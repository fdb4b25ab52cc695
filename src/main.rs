use anyhow::{anyhow, Context, Result};
use clap::Parser;
use html4docx::fetch::FileLoader;
use html4docx::{docx, ListContinuation, Options, StyleSources};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input HTML file (any fragment or full document).
    #[arg(long)]
    html_file: PathBuf,

    /// Output .docx path.
    #[arg(long)]
    out: PathBuf,

    /// JSON object mapping class names to Word style names.
    #[arg(long)]
    style_map: Option<PathBuf>,

    /// JSON object mapping tag names to Word style names.
    #[arg(long)]
    tag_override: Option<PathBuf>,

    /// Paragraph style for paragraphs that resolve none of their own.
    #[arg(long)]
    default_style: Option<String>,

    #[arg(long)]
    no_images: bool,

    /// Walk table cells as plain blocks.
    #[arg(long)]
    no_tables: bool,

    /// Ignore inline styles, stylesheets and the style map.
    #[arg(long)]
    no_styles: bool,

    /// Render HTML comments as italic green paragraphs.
    #[arg(long)]
    html_comments: bool,

    #[arg(long)]
    no_style_map: bool,

    #[arg(long)]
    no_tag_override: bool,

    /// Restart nested list counters at each item of the enclosing list.
    #[arg(long)]
    list_reset_per_item: bool,

    /// Log recovered problems and skipped declarations.
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            images: !self.no_images,
            tables: !self.no_tables,
            styles: !self.no_styles,
            html_comments: self.html_comments,
            style_map: !self.no_style_map,
            tag_override: !self.no_tag_override,
            list_continuation: if self.list_reset_per_item {
                ListContinuation::PerItem
            } else {
                ListContinuation::AcrossItems
            },
        }
    }

    fn style_sources(&self) -> Result<StyleSources> {
        let mut sources = StyleSources::new();
        if let Some(path) = &self.style_map {
            sources.class_map = read_map(path)?;
        }
        if let Some(path) = &self.tag_override {
            for (tag, style) in read_map(path)? {
                sources = sources.with_tag_override(tag, style);
            }
        }
        if let Some(name) = &self.default_style {
            sources = sources.with_default_paragraph_style(name.clone());
        }
        Ok(sources)
    }
}

fn read_to_string(path: &Path) -> Result<String> {
    let mut out = String::new();
    File::open(path)
        .with_context(|| format!("open {}", path.display()))?
        .read_to_string(&mut out)
        .with_context(|| format!("read {}", path.display()))?;
    Ok(out)
}

/// `{"name": "Word Style", ...}`
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct StyleMapFile(HashMap<String, String>);

fn read_map(path: &Path) -> Result<HashMap<String, String>> {
    let text = read_to_string(path)?;
    let map: StyleMapFile = serde_json::from_str(&text)
        .with_context(|| format!("parse {} as a JSON object of strings", path.display()))?;
    Ok(map.0)
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN })
        .init();

    let html = read_to_string(&args.html_file)?;
    if html.trim().is_empty() {
        return Err(anyhow!("empty html"));
    }

    let options = args.options();
    let sources = args.style_sources()?;
    let loader = FileLoader::for_document(&args.html_file);

    let conversion = html4docx::convert_html(&html, &sources, &options, &loader)
        .with_context(|| format!("convert {}", args.html_file.display()))?;
    for problem in &conversion.recovered {
        warn!("{problem}");
    }

    docx::write_docx_file(&args.out, &conversion).with_context(|| format!("write {}", args.out.display()))?;
    info!(
        out = %args.out.display(),
        constructs = conversion.constructs.len(),
        recovered = conversion.recovered.len(),
        "done"
    );
    Ok(())
}
