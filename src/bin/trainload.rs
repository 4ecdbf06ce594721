//! trainload CLI - Command-line interface for the training-load engine
//!
//! Commands:
//! - import: Decode activity files into an export document (incremental)
//! - decode: Decode a single activity file
//! - series: Rebuild the load series from an export or a summaries array
//! - config: Print the default engine configuration

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use trainload::archive::{activity_bytes, has_extension, ACTIVITY_EXTENSION, ARCHIVE_EXTENSION};
use trainload::batch::BatchInput;
use trainload::config::EngineConfig;
use trainload::decoder::decode_messages;
use trainload::encoder::parse_export;
use trainload::pipeline::{build_load_series, decode_activity, score_activity, TrainingLoadProcessor};
use trainload::types::{ActivitySummary, ScoredActivity};
use trainload::{ComputeError, Rejection, ENGINE_VERSION};

/// trainload - Activity-file decoder and training-load engine
#[derive(Parser)]
#[command(name = "trainload")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Turn activity files into stress scores and a fitness/fatigue/form series", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode activity files and write an export document
    Import {
        /// Activity files, zipped activity files, or directories containing them
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Previous export to resume from; known files are skipped
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Recompute stored scores from a previous export with current thresholds
        #[arg(long)]
        rescore: bool,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output format
        #[arg(long, default_value = "auto")]
        format: OutputFormat,
    },

    /// Decode a single activity file
    Decode {
        /// Activity file (use - for stdin)
        file: PathBuf,

        /// Print every decoded data message instead of the summary
        #[arg(long)]
        messages: bool,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output format
        #[arg(long, default_value = "auto")]
        format: OutputFormat,
    },

    /// Rebuild the load series from an export or a JSON array of summaries
    Series {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output format
        #[arg(long, default_value = "auto")]
        format: OutputFormat,
    },

    /// Print the default engine configuration
    Config,
}

/// Configuration file and per-run threshold overrides
#[derive(clap::Args)]
struct EngineArgs {
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cycling functional threshold power (watts)
    #[arg(long)]
    ftp: Option<f64>,

    /// Running threshold pace (seconds per km)
    #[arg(long)]
    run_pace: Option<f64>,

    /// Swim threshold pace (seconds per 100 m)
    #[arg(long)]
    swim_pace: Option<f64>,

    /// Threshold heart rate (bpm)
    #[arg(long)]
    threshold_hr: Option<f64>,

    /// Verify the trailing file CRC
    #[arg(long)]
    verify_crc: bool,

    /// Read record headers with the top bit set as compressed timestamps
    #[arg(long)]
    compressed_timestamps: bool,

    /// Last day of the series (YYYY-MM-DD, default today in UTC)
    #[arg(long)]
    today: Option<NaiveDate>,
}

impl EngineArgs {
    fn resolve(&self) -> Result<EngineConfig, CliFailure> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        let t = &mut config.thresholds;
        if let Some(ftp) = self.ftp {
            t.cycling_ftp_watts = ftp;
        }
        if let Some(pace) = self.run_pace {
            t.running_threshold_pace_sec_per_km = pace;
        }
        if let Some(pace) = self.swim_pace {
            t.swim_threshold_pace_sec_per_100m = pace;
        }
        if let Some(hr) = self.threshold_hr {
            t.threshold_heart_rate = hr;
        }
        config.decoder.verify_crc |= self.verify_crc;
        config.decoder.compressed_timestamps |= self.compressed_timestamps;
        config.validate()?;
        Ok(config)
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Pretty when writing to a terminal, compact otherwise
    Auto,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Import {
            input,
            output,
            previous,
            rescore,
            engine,
            format,
        } => cmd_import(&input, &output, previous.as_deref(), rescore, &engine, &format),
        Commands::Decode {
            file,
            messages,
            engine,
            format,
        } => cmd_decode(&file, messages, &engine, &format),
        Commands::Series {
            input,
            engine,
            format,
        } => cmd_series(&input, &engine, &format),
        Commands::Config => {
            println!("{}", EngineConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn cmd_import(
    inputs: &[PathBuf],
    output: &Path,
    previous: Option<&Path>,
    rescore: bool,
    engine: &EngineArgs,
    format: &OutputFormat,
) -> Result<(), CliFailure> {
    let config = engine.resolve()?;
    let mut processor = TrainingLoadProcessor::with_config(config).with_today(engine.today());

    if let Some(path) = previous {
        let json = fs::read_to_string(path)?;
        processor.load_export(&json)?;
        if rescore {
            processor.rescore_all();
        }
    }

    let files = collect_activity_files(inputs)?;
    if files.is_empty() && processor.activity_count() == 0 {
        return Err(CliFailure::NoActivityFiles);
    }

    let batch = files
        .iter()
        .map(|path| -> Result<BatchInput, io::Error> {
            Ok(BatchInput::new(file_id(path), fs::read(path)?))
        })
        .collect::<Result<Vec<_>, _>>()?;
    processor.add_files(&batch);

    let document = processor.export()?;
    write_output(output, &format_output(&document, format)?)
}

fn cmd_decode(
    file: &Path,
    messages: bool,
    engine: &EngineArgs,
    format: &OutputFormat,
) -> Result<(), CliFailure> {
    let config = engine.resolve()?;
    let bytes = read_input_bytes(file)?;

    if messages {
        let decoded =
            decode_messages(&activity_bytes(&bytes)?, config.decoder).map_err(Rejection::from)?;
        return write_output(Path::new("-"), &format_output(&decoded, format)?);
    }

    let summary = decode_activity(&bytes, &config)?;
    let stress = score_activity(&summary, &config);
    let activity = ScoredActivity {
        id: file_id(file),
        summary,
        stress,
    };
    write_output(Path::new("-"), &format_output(&activity, format)?)
}

fn cmd_series(input: &Path, engine: &EngineArgs, format: &OutputFormat) -> Result<(), CliFailure> {
    let config = engine.resolve()?;
    let json = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let value: serde_json::Value = serde_json::from_str(&json)?;
    let activities: Vec<ScoredActivity> = if value.get("schema_version").is_some() {
        parse_export(&json)?
            .activities
            .into_iter()
            .map(ScoredActivity::from)
            .collect()
    } else {
        let summaries: Vec<ActivitySummary> = serde_json::from_value(value)?;
        summaries
            .into_iter()
            .enumerate()
            .map(|(i, summary)| ScoredActivity {
                id: format!("activity-{i}"),
                stress: score_activity(&summary, &config),
                summary,
            })
            .collect()
    };

    let series = build_load_series(&activities, engine.today(), &config);
    write_output(Path::new("-"), &format_output(&series, format)?)
}

/// Expand directories into their activity files and archives, sorted by path
fn collect_activity_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, io::Error> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    let name = path.to_string_lossy();
                    has_extension(&name, ACTIVITY_EXTENSION) || has_extension(&name, ARCHIVE_EXTENSION)
                })
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Activity id for a path: the file name, or the stem for an archive
fn file_id(path: &Path) -> String {
    let name = if has_extension(&path.to_string_lossy(), ARCHIVE_EXTENSION) {
        path.file_stem()
    } else {
        path.file_name()
    };
    name.map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn read_input_bytes(path: &Path) -> Result<Vec<u8>, io::Error> {
    if path.to_string_lossy() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read(path)
    }
}

fn format_output<T: Serialize>(value: &T, format: &OutputFormat) -> Result<String, CliFailure> {
    let pretty = match format {
        OutputFormat::Auto => atty::is(atty::Stream::Stdout),
        OutputFormat::Json => false,
        OutputFormat::JsonPretty => true,
    };
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json + "\n")
}

fn write_output(output: &Path, data: &str) -> Result<(), CliFailure> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoActivityFiles,
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<ComputeError> for CliFailure {
    fn from(e: ComputeError) -> Self {
        match e {
            ComputeError::Io(e) => CliFailure::Io(e),
            other => CliFailure::Compute(other),
        }
    }
}

impl From<Rejection> for CliFailure {
    fn from(e: Rejection) -> Self {
        CliFailure::Compute(e.into())
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Compute(ComputeError::Rejected(rejection)) => CliError {
                code: rejection.code().to_uppercase(),
                message: rejection.to_string(),
                hint: Some("The file is not a readable activity file".to_string()),
            },
            CliFailure::Compute(ComputeError::InvalidConfig(msg)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: msg,
                hint: Some("Run 'trainload config' to see every setting and its default".to_string()),
            },
            CliFailure::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::NoActivityFiles => CliError {
                code: "NO_ACTIVITY_FILES".to_string(),
                message: "No activity files found in input".to_string(),
                hint: Some(format!(
                    "Directories are scanned for *.{ACTIVITY_EXTENSION} and *.{ARCHIVE_EXTENSION} files"
                )),
            },
        }
    }
}
