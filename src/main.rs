/// Version injected at compile time via CLOUDFN_PLAN_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDFN_PLAN_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cloudfn_plan::bundle::{self, ZipPackager};
use cloudfn_plan::config::Config;
use cloudfn_plan::error::format_err_chain;
use cloudfn_plan::resource::{get_all_kind_keys, get_kind_def, required_services};
use cloudfn_plan::{hand_off, resolve, DeploymentSpec, DryRunEngine, ResolvedPlan};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Resolve Cloud Functions deployments into resource plans
#[derive(Parser, Debug)]
#[command(name = "cloudfn-plan", version = VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a deployment file and print the plan
    Plan {
        /// Deployment file (.yaml, .yml or .json)
        file: PathBuf,

        /// GCP project to use
        #[arg(short, long)]
        project: Option<String>,

        /// Region to deploy to
        #[arg(short, long)]
        region: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Print the dependency-ordered resource list instead of the plan
        #[arg(long)]
        summary: bool,
    },
    /// Package a source directory and print its content-addressed object name
    Bundle {
        /// Source directory
        dir: PathBuf,

        /// Relative path to leave out (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Where to write the archive
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the resource kinds a plan can contain
    Kinds,
    /// Save default project and region
    Config {
        #[arg(short, long)]
        project: Option<String>,

        #[arg(short, long)]
        region: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudfn-plan started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudfn-plan").join("cloudfn-plan.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudfn-plan").join("cloudfn-plan.log");
    }
    PathBuf::from("cloudfn-plan.log")
}

fn main() {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    if let Err(err) = run(args.command) {
        // Library errors carry their cause chain; show all of it
        match err.downcast_ref::<cloudfn_plan::PlanError>() {
            Some(plan_err) => eprintln!("Error: {}", format_err_chain(plan_err)),
            None => eprintln!("Error: {err:#}"),
        }
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Plan {
            file,
            project,
            region,
            format,
            summary,
        } => plan(file, project, region, format, summary),
        Command::Bundle {
            dir,
            exclude,
            output,
        } => {
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "source".to_string());
            let output = output.unwrap_or_else(|| bundle::default_output_path(&dir_name));
            let artifact = bundle::name(&ZipPackager, &dir, &exclude, &output)?;
            println!("{}", artifact.object_name);
            eprintln!("archive: {}", artifact.artifact_path.display());
            Ok(())
        }
        Command::Kinds => {
            for key in get_all_kind_keys() {
                if let Some(def) = get_kind_def(key) {
                    let scope = if def.is_regional { "regional" } else { "global" };
                    println!(
                        "{:<16} {:<26} {:<8} {}",
                        key, def.display_name, scope, def.service
                    );
                }
            }
            Ok(())
        }
        Command::Config { project, region } => {
            let mut config = Config::load();
            if project.is_some() {
                config.project_id = project;
            }
            if region.is_some() {
                config.region = region;
            }
            config.save()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn plan(
    file: PathBuf,
    project: Option<String>,
    region: Option<String>,
    format: OutputFormat,
    summary: bool,
) -> Result<()> {
    let config = Config::load();
    let mut spec = DeploymentSpec::from_file(&file)?;

    spec.project = config.effective_project(project.as_deref(), spec.project.as_deref());
    spec.region = Some(config.effective_region(region.as_deref(), spec.region.as_deref()));

    tracing::info!(
        "Planning {} [project: {:?}, region: {:?}]",
        file.display(),
        spec.project,
        spec.region
    );

    let plan = resolve(&spec, &ZipPackager)?;

    if summary {
        print_summary(&plan)?;
        return Ok(());
    }

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&plan)?,
        OutputFormat::Yaml => serde_yaml::to_string(&plan)?,
    };
    println!("{}", rendered);

    Ok(())
}

fn print_summary(plan: &ResolvedPlan) -> Result<()> {
    let mut engine = DryRunEngine::new();
    hand_off(plan, &mut engine)?;

    println!("trigger: {}", plan.trigger_mode.label());
    for addr in &engine.applied {
        let display = get_kind_def(addr.kind.key())
            .map(|def| def.display_name.as_str())
            .unwrap_or("?");
        println!("  {:<26} {}", display, addr.name);
    }

    let kinds: Vec<&str> = engine.applied.iter().map(|a| a.kind.key()).collect();
    println!("required APIs: {}", required_services(kinds).join(", "));

    Ok(())
}
