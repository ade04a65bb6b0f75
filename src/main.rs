use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use casewise::cli::commands;
use casewise::types::{CanonicalSectionId, ImageDomain, ParseWithDefault, RunMode};

fn parse_initial_mode(s: &str) -> Result<RunMode, String> {
    match s.parse::<RunMode>()? {
        mode @ (RunMode::Simple | RunMode::Full) => Ok(mode),
        other => Err(format!(
            "Mode '{}' needs an existing case; use 'casewise rerun'. Valid values: simple, full",
            other
        )),
    }
}

fn parse_rerun_mode(s: &str) -> Result<RunMode, String> {
    match s.parse::<RunMode>()? {
        mode @ (RunMode::Relaunch | RunMode::Deep) => Ok(mode),
        other => Err(format!(
            "Mode '{}' starts a new case; use 'casewise analyze'. Valid values: relaunch, deep",
            other
        )),
    }
}

fn parse_domain(s: &str) -> Result<ImageDomain, String> {
    ImageDomain::try_parse(s).ok_or_else(|| {
        format!(
            "Invalid image domain '{}'. Valid values: ecg, biology, radiology, dermatology, general",
            s
        )
    })
}

#[derive(Parser)]
#[command(name = "casewise")]
#[command(
    version,
    about = "Clinical case analysis with sectioned reports, references and versioned edits"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize casewise in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing config")]
        force: bool,
    },

    /// Analyze a new case
    Analyze {
        #[arg(help = "Case text (or use --file)")]
        text: Option<String>,
        #[arg(long, short = 'F', help = "Read the case text from a file")]
        file: Option<PathBuf>,
        #[arg(long = "image", short = 'i', help = "Image file (repeatable)")]
        images: Vec<PathBuf>,
        #[arg(long, default_value = "general", value_parser = parse_domain, help = "Image domain: ecg, biology, radiology, dermatology, general")]
        domain: ImageDomain,
        #[arg(long, short, default_value = "simple", value_parser = parse_initial_mode, help = "Run mode: simple, full")]
        mode: RunMode,
        #[arg(long, short, help = "Case title")]
        title: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Rerun an existing case (relaunch or deep research)
    Rerun {
        case_id: String,
        #[arg(long, short, default_value = "relaunch", value_parser = parse_rerun_mode, help = "Run mode: relaunch, deep")]
        mode: RunMode,
        #[arg(long = "image", short = 'i', help = "New image file (repeatable)")]
        images: Vec<PathBuf>,
        #[arg(long, default_value = "general", value_parser = parse_domain)]
        domain: ImageDomain,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Manage clinician edits
    Edit {
        #[command(subcommand)]
        action: EditAction,
    },

    /// List the versions of a case
    Versions { case_id: String },

    /// Make an older version current
    Restore { case_id: String, version: u32 },

    /// List cases, or show a case version
    Show {
        case_id: Option<String>,
        #[arg(long, short, help = "Version number (default: current)")]
        version: Option<u32>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Show or grant credits
    Credits {
        #[arg(long, help = "Add credits to the local account")]
        grant: Option<u32>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum EditAction {
    /// Record an addendum for a section
    Add {
        case_id: String,
        #[arg(help = "Section, e.g. diagnosis or treatment")]
        section: CanonicalSectionId,
        text: String,
        #[arg(long, help = "Commit immediately as a new version")]
        apply: bool,
    },
    /// Replace the text of a recorded edit
    Update {
        case_id: String,
        id: String,
        text: String,
    },
    /// List recorded edits
    List { case_id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Write the project configuration
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mcasewise encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Analyze {
            text,
            file,
            images,
            domain,
            mode,
            title,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::analyze::run(commands::analyze::AnalyzeOptions {
                text,
                file,
                images,
                domain,
                mode,
                title,
                format,
            }))?;
        }
        Commands::Rerun {
            case_id,
            mode,
            images,
            domain,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::rerun::run(
                &case_id, mode, &images, domain, &format,
            ))?;
        }
        Commands::Edit { action } => match action {
            EditAction::Add {
                case_id,
                section,
                text,
                apply,
            } => {
                commands::edit::record(&case_id, section, &text, apply)?;
            }
            EditAction::Update { case_id, id, text } => {
                commands::edit::update(&case_id, &id, &text)?;
            }
            EditAction::List { case_id } => {
                commands::edit::list(&case_id)?;
            }
        },
        Commands::Versions { case_id } => {
            commands::versions::list(&case_id)?;
        }
        Commands::Restore { case_id, version } => {
            commands::versions::restore(&case_id, version)?;
        }
        Commands::Show {
            case_id,
            version,
            format,
        } => {
            commands::show::run(case_id.as_deref(), version, &format)?;
        }
        Commands::Credits { grant } => match grant {
            Some(amount) => commands::credits::grant(amount)?,
            None => commands::credits::show()?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { force } => {
                commands::config::init(force)?;
            }
        },
    }

    Ok(())
}
