//! Rubric CLI - structural-pattern linter and autocorrector for Ruby sources

use anyhow::{bail, Context as _, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use glob::glob;
use globset::GlobSet;
use rubric::config::{ColorMode, Config, OutputFormat};
use rubric::engine::Linter;
use rubric::fixer::FixMode;
use rubric::output::formatter_for;
use rubric::ruby::RubyFrontend;
use rubric::rules;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "rubric",
    version,
    about = "Structural-pattern linter for Ruby",
    long_about = "Matches declarative node patterns against Ruby syntax trees, reports \
                  violations and applies conflict-checked autocorrections."
)]
struct Cli {
    /// Files, directories or glob patterns to lint (default: files.include from the config)
    files: Vec<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (default: output.format from the config)
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Apply autocorrections and write the files
    #[arg(long)]
    fix: bool,

    /// Run the autocorrections without writing anything (requires --fix)
    #[arg(long, requires = "fix")]
    dry_run: bool,

    /// Disable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    disable: Option<Vec<String>>,

    /// Only enable specific rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    select: Option<Vec<String>>,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Show per-rule timing statistics
    #[arg(long)]
    timing: bool,

    /// List available rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default().context("failed to load config")?,
    };

    apply_cli(&mut config, &cli);
    match config.output.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    let rules = rules::load_rules(&config).context("failed to load rules")?;

    if cli.list_rules {
        println!("{}", "Available rules:".bold());
        for registered in rules.iter() {
            println!(
                "  {} {:<8} [{}] {}",
                format!("{:<32}", registered.id()).cyan(),
                registered.severity().to_string(),
                registered.rule().interests(),
                registered.rule().description()
            );
        }
        println!("\n{} rules", rules.len());
        return Ok(0);
    }

    let fix_mode = match (cli.fix, cli.dry_run) {
        (true, true) => FixMode::DryRun,
        (true, false) => FixMode::Apply,
        (false, _) => FixMode::Report,
    };

    let excludes = config.exclude_set()?;
    let patterns = if cli.files.is_empty() {
        config.files.include.clone()
    } else {
        cli.files.clone()
    };

    let mut linter = Linter::new(config, rules).with_fix_mode(fix_mode);
    linter.register_frontend(Arc::new(RubyFrontend));

    let files = collect_files(&patterns, &excludes, &linter)?;
    if files.is_empty() {
        bail!("No files found to lint");
    }

    if cli.verbose {
        eprintln!("Linting {} files with {} rules...", files.len(), linter.rules().len());
    }

    let result = linter.lint(&files);
    let formatter = formatter_for(linter.config().output.format, linter.config().output.color);
    print!("{}", formatter.format(&result));

    if cli.timing {
        eprintln!("\n{}", result.format_timings());
    }
    if fix_mode == FixMode::DryRun && result.files_fixed > 0 {
        eprintln!(
            "{} {} would be rewritten (dry run)",
            result.files_fixed,
            if result.files_fixed == 1 { "file" } else { "files" }
        );
    }

    Ok(result.exit_code())
}

/// Layer the flags the user actually passed over the loaded configuration
fn apply_cli(config: &mut Config, cli: &Cli) {
    config.merge_cli(
        cli.format.map(Into::into),
        cli.verbose.then_some(true),
        cli.jobs,
        cli.disable.clone(),
        cli.select.clone(),
    );
    if cli.no_color {
        config.output.color = ColorMode::Never;
    }
}

/// Expand files, directories and glob patterns into the lintable files, minus excludes
fn collect_files(patterns: &[String], excludes: &GlobSet, linter: &Linter) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    let keep = |path: PathBuf, files: &mut BTreeSet<PathBuf>| {
        if !excludes.is_match(&path) {
            files.insert(path);
        }
    };

    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_file() {
            keep(path.to_path_buf(), &mut files);
            continue;
        }

        let expanded = if path.is_dir() {
            format!("{}/**/*", pattern.trim_end_matches('/'))
        } else {
            pattern.clone()
        };
        let entries = glob(&expanded).with_context(|| format!("Invalid pattern '{}'", pattern))?;
        for entry in entries.flatten() {
            if entry.is_file() && linter.frontend_for(&entry).is_some() {
                keep(entry, &mut files);
            }
        }
    }

    Ok(files.into_iter().collect())
}
