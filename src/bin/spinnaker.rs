use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use spinnaker::app::{App, UploadOptions};
use spinnaker::config::{ConfigLoader, ResolvedConfig};
use spinnaker::error::SpinnakerError;
use spinnaker::output::{JsonOutput, LogProgress};
use spinnaker::probe::LocalFileProbe;
use spinnaker::schema::Schema;
use spinnaker::store::BundleStore;
use spinnaker::submission::HttpSubmissionClient;
use spinnaker::upload::SystemUploadClient;

const LOG_FILE: &str = "spinnaker.log";

#[derive(Parser)]
#[command(name = "spinnaker")]
#[command(about = "Build metadata bundles from sample sheets and upload them to storage")]
#[command(version, author)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Assemble bundles from input tables, then register and upload them")]
    Upload(UploadArgs),
    #[command(about = "Merge bundles below a directory into one document per donor")]
    Merge(MergeArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// Input tables: workbooks (sheet `Sheet1`) or tab-separated text
    inputs: Vec<PathBuf>,

    #[arg(long)]
    config: Option<String>,

    /// Stop after writing bundle directories
    #[arg(long)]
    skip_upload: bool,

    /// Also merge the assembled bundles per donor and validate the result
    #[arg(short, long)]
    test: bool,

    #[arg(long, value_name = "FILE")]
    input_metadata_schema: Option<Utf8PathBuf>,

    #[arg(long, value_name = "FILE")]
    metadata_schema: Option<Utf8PathBuf>,

    #[arg(long, value_name = "FILE")]
    registration_file: Option<String>,

    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long, value_name = "FILE")]
    receipt_file: Option<String>,

    #[arg(long, value_name = "URL")]
    submission_server_url: Option<String>,

    #[arg(long)]
    force_upload: bool,

    #[arg(long)]
    skip_submit: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Directory holding `<bundle_uuid>/metadata.json` bundles
    bundle_dir: Utf8PathBuf,

    /// Write `donors/<donor_uuid>.json` here instead of printing the mapping
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long, value_name = "FILE")]
    metadata_schema: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SpinnakerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SpinnakerError) -> u8 {
    match error {
        SpinnakerError::NoInputs
        | SpinnakerError::InputRead { .. }
        | SpinnakerError::ConfigRead(_)
        | SpinnakerError::ConfigParse(_)
        | SpinnakerError::PreviousUpload(_)
        | SpinnakerError::InvalidBundles(_) => 2,
        SpinnakerError::MissingTool(_)
        | SpinnakerError::RegistrationFailed(_)
        | SpinnakerError::UploadFailed(_)
        | SpinnakerError::SubmissionHttp(_)
        | SpinnakerError::SubmissionStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Upload(args) => run_upload(args, cli.verbose),
        Commands::Merge(args) => run_merge(args, cli.verbose),
    }
}

fn init_logging(verbose: bool, log_file: Option<&Utf8Path>) -> miette::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path.as_std_path())
                .into_diagnostic()?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();
    Ok(())
}

fn load_schema(
    path: Option<&Utf8Path>,
    fallback: fn() -> Result<Schema, SpinnakerError>,
) -> miette::Result<Schema> {
    let schema = match path {
        Some(path) => Schema::from_path(path.as_std_path())?,
        None => fallback()?,
    };
    Ok(schema)
}

fn run_upload(args: UploadArgs, verbose: bool) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir.clone());

    let store = BundleStore::new(output_dir.clone());
    store.ensure_root()?;
    let log_path = output_dir.join(LOG_FILE);
    init_logging(verbose, Some(&log_path))?;
    debug!(?config, "resolved configuration");

    let options = upload_options(&args, &config)?;
    let input_schema = load_schema(
        args.input_metadata_schema
            .as_deref()
            .or(config.input_metadata_schema.as_deref()),
        Schema::input_default,
    )?;
    let metadata_schema = load_schema(
        args.metadata_schema
            .as_deref()
            .or(config.metadata_schema.as_deref()),
        Schema::metadata_default,
    )?;
    let server_url = args
        .submission_server_url
        .clone()
        .unwrap_or_else(|| config.submission_server_url.clone());

    let app = App::new(
        store,
        input_schema,
        metadata_schema,
        SystemUploadClient::new(),
        HttpSubmissionClient::new(server_url)?,
        LocalFileProbe::new(),
    );
    let result = app.upload(&options, &LogProgress)?;
    tracing::info!("a detailed log is at {log_path}");
    JsonOutput::print_upload(&result).into_diagnostic()?;
    Ok(())
}

fn upload_options(args: &UploadArgs, config: &ResolvedConfig) -> miette::Result<UploadOptions> {
    let cwd = std::env::current_dir().into_diagnostic()?;
    let working_dir = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|path| miette::miette!("working directory {} is not UTF-8", path.display()))?;
    Ok(UploadOptions {
        inputs: args.inputs.clone(),
        test: args.test,
        skip_upload: args.skip_upload,
        force_upload: args.force_upload || config.force_upload,
        skip_submit: args.skip_submit || config.skip_submit,
        registration_file: args
            .registration_file
            .clone()
            .unwrap_or_else(|| config.registration_file.clone()),
        receipt_file: args
            .receipt_file
            .clone()
            .unwrap_or_else(|| config.receipt_file.clone()),
        working_dir,
    })
}

fn run_merge(args: MergeArgs, verbose: bool) -> miette::Result<()> {
    init_logging(verbose, None)?;
    let metadata_schema = load_schema(args.metadata_schema.as_deref(), Schema::metadata_default)?;
    let write = args.output_dir.is_some();
    let store = BundleStore::new(
        args.output_dir
            .clone()
            .unwrap_or_else(|| args.bundle_dir.clone()),
    );
    let app = App::new(
        store,
        Schema::input_default()?,
        metadata_schema,
        SystemUploadClient::new(),
        HttpSubmissionClient::new(spinnaker::config::DEFAULT_SUBMISSION_SERVER)?,
        LocalFileProbe::new(),
    );
    let result = app.merge(&args.bundle_dir, write, &LogProgress)?;
    JsonOutput::print_merge(&result).into_diagnostic()?;
    Ok(())
}
