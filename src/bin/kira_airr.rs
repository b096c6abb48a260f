use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_airr::app::{App, LoadAction, LoadOptions, LoadResult};
use kira_airr::config::{ConfigLoader, ResolvedConfig};
use kira_airr::datasets::{DatasetFetch, DatasetFetcher, FigshareHttpClient};
use kira_airr::domain::Source;
use kira_airr::error::KiraError;
use kira_airr::iedb::IedbHttpClient;
use kira_airr::output::{JsonOutput, OutputMode, TerminalProgress};
use kira_airr::store::Store;
use kira_airr::vdjdb::VdjdbHttpClient;

#[derive(Parser)]
#[command(name = "kira-airr")]
#[command(about = "Normalize VDJdb and IEDB receptor exports into AIRR cell/chain records")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Load a database, from cache when available")]
    Load(LoadArgs),
    #[command(about = "Show the cached container for a database")]
    Info(InfoArgs),
    #[command(about = "Fetch a public repertoire dataset (wu2020, wu2020_3k, maynard2020)")]
    Dataset(DatasetArgs),
}

#[derive(Args)]
struct LoadArgs {
    source: Source,

    #[arg(long)]
    no_cache: bool,

    #[arg(long)]
    cache_path: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct InfoArgs {
    source: Source,

    #[arg(long)]
    cache_path: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct DatasetArgs {
    name: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::DatasetNotFound(_)
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::InvalidSource(_)
        | KiraError::UnknownDataset(_) => 2,
        KiraError::VdjdbHttp(_)
        | KiraError::VdjdbStatus { .. }
        | KiraError::IedbHttp(_)
        | KiraError::IedbStatus { .. }
        | KiraError::EmptyVersionListing
        | KiraError::DatasetHttp(_)
        | KiraError::DatasetStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(config.data_dir.as_deref())?;

    match cli.command {
        Commands::Load(args) => run_load(args, store, &config, output_mode),
        Commands::Info(args) => run_info(args, store, &config),
        Commands::Dataset(args) => run_dataset(args, store, &config, output_mode),
    }
}

fn build_app(
    store: Store,
    config: &ResolvedConfig,
) -> miette::Result<App<VdjdbHttpClient, IedbHttpClient>> {
    let vdjdb = VdjdbHttpClient::new(config.vdjdb_latest_version_url.clone())?;
    let iedb = IedbHttpClient::new(config.iedb_export_url.clone())?;
    Ok(App::new(store, vdjdb, iedb))
}

fn run_load(
    args: LoadArgs,
    store: Store,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = build_app(store, config)?;
    let options = LoadOptions {
        cached: !args.no_cache,
        cache_path: args.cache_path,
    };

    let result = match output_mode {
        OutputMode::Interactive => {
            let progress = TerminalProgress;
            let result = app.load_summary(args.source, &options, &progress);
            progress.finish();
            result?
        }
        OutputMode::NonInteractive => app.load_summary(args.source, &options, &JsonOutput)?,
    };

    match output_mode {
        OutputMode::Interactive => print_load_summary(&result),
        OutputMode::NonInteractive => JsonOutput::print_load(&result).into_diagnostic()?,
    }
    Ok(())
}

fn run_info(args: InfoArgs, store: Store, config: &ResolvedConfig) -> miette::Result<()> {
    let app = build_app(store, config)?;
    let options = LoadOptions {
        cached: true,
        cache_path: args.cache_path,
    };
    let result = app.info(args.source, &options)?;
    JsonOutput::print_load(&result).into_diagnostic()
}

fn run_dataset(
    args: DatasetArgs,
    store: Store,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let client = FigshareHttpClient::new(config.datasets_article_url.clone())?;
    let fetcher = DatasetFetcher::new(store, client);

    match output_mode {
        OutputMode::Interactive => {
            let progress = TerminalProgress;
            let result = fetcher.fetch(&args.name, &progress);
            progress.finish();
            print_dataset_summary(&result?);
        }
        OutputMode::NonInteractive => {
            let result = fetcher.fetch(&args.name, &JsonOutput)?;
            JsonOutput::print_dataset(&result).into_diagnostic()?;
        }
    }
    Ok(())
}

fn print_dataset_summary(result: &DatasetFetch) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    let (label, color) = match result.action {
        LoadAction::Cache => ("cached", green),
        LoadAction::Download => ("downloaded", cyan),
    };
    println!("{color}{} ({label}){reset}", result.name);
    println!("   path: {}", result.path);
    println!("   md5: {}", result.md5);
}

fn print_load_summary(result: &LoadResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let summary = &result.summary;
    let (label, color) = match result.action {
        LoadAction::Cache => ("cached", green),
        LoadAction::Download => ("downloaded", cyan),
    };
    println!(
        "{color}{} ({label}){reset}",
        summary.database.as_deref().unwrap_or(result.source.db_name())
    );
    if let Some(date) = &summary.date_downloaded {
        println!("   date downloaded: {date}");
    }
    println!("   cache: {}", result.cache_path);
    println!(
        "   cells: {} ({} without chains, {} multichain)",
        summary.cells, summary.empty_cells, summary.multichain_cells
    );
    println!("   chains: {}", summary.chains);
    for (locus, count) in &summary.loci {
        println!("     {locus}: {count}");
    }
    if summary.unresolved_loci > 0 {
        println!(
            "{yellow}   unresolved loci: {}{reset}",
            summary.unresolved_loci
        );
    }
}
