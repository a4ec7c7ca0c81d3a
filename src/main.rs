use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use woo_migrate::presentation::cli_summary::{
    render_export_summary, render_import_summary, render_perf_summary, render_run_list,
};
use woo_migrate::{
    configured_import_source, init_tracing, AppConfig, ImportSource, LogLevel, OutputMethod,
    Selection, SelectionFlag, WriteMode,
};

#[derive(Parser, Debug)]
#[command(
    name = "woo-migrate",
    version,
    about = "Export WooCommerce table groups to chunked SQL files and replay them selectively."
)]
struct Cli {
    #[arg(short, long, global = true, default_value = "woo-migrate.toml")]
    config: String,

    /// Log every query.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export selected groups from the source database.
    Export(ExportArgs),
    /// Replay exported files into the destination database.
    Import(ImportArgs),
    /// List previous export runs under the output directory.
    List,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// append | overwrite | update
    #[arg(long)]
    mode: Option<WriteMode>,

    /// Comma-separated selection flags (products, categories, tags, attributes,
    /// users, customers, orders, attachments).
    #[arg(long, value_delimiter = ',')]
    only: Vec<SelectionFlag>,

    #[arg(long)]
    parallel: Option<usize>,

    /// progress | direct
    #[arg(long)]
    output_method: Option<OutputMethod>,

    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    page_size: Option<u64>,

    #[arg(long)]
    max_file_size: Option<u64>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Run directory of a previous export.
    #[arg(long, conflicts_with = "files")]
    from: Option<PathBuf>,

    /// Loose SQL files, matched to groups by name.
    #[arg(long, num_args = 1..)]
    files: Vec<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    only: Vec<SelectionFlag>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(match (cli.verbose, cli.quiet) {
        (true, _) => LogLevel::Debug,
        (_, true) => LogLevel::Error,
        _ => LogLevel::Info,
    });

    let mut cfg = AppConfig::load(&cli.config)?;

    match cli.command {
        Command::Export(args) => {
            apply_export_args(&mut cfg, args);
            let direct = cfg.export.output_method == OutputMethod::Direct;
            let (report, perf) = woo_migrate::export(&cfg).await?;

            let summary = format!("{}{}", render_export_summary(&report), render_perf_summary(&perf));
            if direct {
                eprint!("{summary}");
            } else {
                print!("{summary}");
            }
            if report.failed_groups().is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Import(args) => {
            let source = import_source(&mut cfg, args)?;
            let (report, perf) = woo_migrate::import(&cfg, &source).await?;
            print!("{}{}", render_import_summary(&report), render_perf_summary(&perf));
            if report.statements_failed() == 0 && report.unreadable.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::List => {
            print!("{}", render_run_list(&woo_migrate::list_exports(&cfg)?));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_export_args(cfg: &mut AppConfig, args: ExportArgs) {
    let e = &mut cfg.export;
    if let Some(mode) = args.mode {
        e.mode = mode;
    }
    if !args.only.is_empty() {
        e.select = Selection::from_flags(args.only);
    }
    if let Some(n) = args.parallel {
        e.parallelism = n;
    }
    if let Some(m) = args.output_method {
        e.output_method = m;
    }
    if let Some(n) = args.page_size {
        e.page_size = n;
    }
    if let Some(n) = args.max_file_size {
        e.max_file_size = n;
    }
    if let Some(dir) = args.output_dir {
        cfg.output.dir = dir;
    }
}

fn import_source(cfg: &mut AppConfig, args: ImportArgs) -> Result<ImportSource> {
    if !args.only.is_empty() {
        cfg.import.select = Selection::from_flags(args.only);
    }
    if let Some(dir) = args.from {
        return Ok(ImportSource::Directory(dir));
    }
    if !args.files.is_empty() {
        return Ok(ImportSource::Files(args.files));
    }
    match configured_import_source(&cfg.import) {
        Some(source) => Ok(source),
        None => bail!("Nothing to import: pass --from DIR or --files F..."),
    }
}
