//! PDF Collate CLI tool
//!
//! A command-line tool for merging PDFs, optionally picking pages from each.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use pdf_collate::pdf::{extract_metadata, merge_pdfs, parse_page_selection, MergeOptions};

/// PDF Collate - Merge PDFs into one document
#[derive(Parser)]
#[command(name = "pdf-collate")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge PDFs in order
    pdf-collate merge -o output.pdf intro.pdf body.pdf

    # Merge numbered PDFs in order
    pdf-collate merge -o handout.pdf \"[0-9]*.pdf\"

    # Take pages 3 and 1 of the first file, all of the second
    pdf-collate merge -o output.pdf --pages 3,1 --pages all first.pdf second.pdf

    # Show version and page count
    pdf-collate info output.pdf")]
struct Cli {
    /// Log progress details (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge multiple PDF files into one
    Merge {
        /// Input PDF files (in order). Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Pages to take from the input at the same position, e.g. "1-3,7"
        /// or "all"; inputs without one contribute every page
        #[arg(long = "pages", value_name = "SPEC")]
        pages: Vec<String>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Merge {
            inputs,
            output,
            pages,
            open,
        } => cmd_merge(inputs, output, pages, open),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Expand glob patterns in input paths
///
/// Matches of one pattern are sorted; patterns keep their argument order.
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched: Vec<PathBuf> = Vec::new();
            let entries =
                glob(&pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
            for entry in entries {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", pattern);
            }
            matched.sort();
            paths.extend(matched);
        } else {
            // No glob characters, treat as literal path
            paths.push(PathBuf::from(pattern));
        }
    }

    Ok(paths)
}

/// Turn `--pages` values into per-input selections
fn parse_selections(specs: &[String], input_count: usize) -> Result<Vec<Option<Vec<u32>>>> {
    if specs.len() > input_count {
        bail!(
            "{} --pages values given for {} input files",
            specs.len(),
            input_count
        );
    }
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            if spec.trim().eq_ignore_ascii_case("all") {
                Ok(None)
            } else {
                parse_page_selection(spec)
                    .map(Some)
                    .with_context(|| format!("--pages value {} ({:?})", i + 1, spec))
            }
        })
        .collect()
}

/// Open a file with the system default application
fn open_file(path: &PathBuf) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(path).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(path).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Merge multiple PDFs into one
fn cmd_merge(inputs: Vec<String>, output: PathBuf, pages: Vec<String>, open: bool) -> Result<()> {
    let inputs = expand_globs(inputs)?;
    let page_selections = parse_selections(&pages, inputs.len())?;

    eprintln!("Merging {} PDF files...", inputs.len());

    let options = MergeOptions {
        input_paths: inputs,
        page_selections,
        output_path: output.clone(),
    };

    merge_pdfs(&options).context("Merge failed")?;

    let metadata = extract_metadata(&output)?;
    eprintln!(
        "Merged {} pages to: {} (PDF {})",
        metadata.page_count,
        output.display(),
        metadata.version
    );

    if open {
        open_file(&output).context("Could not open the merged file")?;
    }

    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    let metadata = extract_metadata(&input)
        .with_context(|| format!("Could not read {}", input.display()))?;

    println!("File: {}", input.display());
    println!("Version: {}", metadata.version);
    println!("Pages: {}", metadata.page_count);
    println!("Encrypted: {}", if metadata.encrypted { "yes" } else { "no" });

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }

    Ok(())
}
