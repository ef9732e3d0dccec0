use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod analyze;
pub mod routines;

#[derive(Parser)]
#[command(
    name = "scrutiny",
    version = env!("CARGO_PKG_VERSION"),
    about = "Crash-tolerant parallel code analysis engine",
    long_about = "Scrutiny runs pluggable analysis routines over a workspace on a \
                  crash-tolerant worker pool, surviving routine failures, timeouts \
                  and worker crashes without losing overall progress."
)]
pub struct Cli {
    /// Run as if started in <DIR> instead of current working directory
    #[arg(short = 'C', long = "directory", global = true)]
    pub directory: Option<String>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze one or more workspaces with the registered routines
    Analyze(analyze::AnalyzeArgs),
    /// List the registered analysis routines
    Routines(routines::RoutinesArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        setup_logging(self.verbose, self.quiet);

        match self.command {
            Commands::Analyze(args) => {
                analyze::execute(args, self.verbose, self.quiet, self.config.as_deref())
            }
            Commands::Routines(args) => routines::execute(args),
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info,ignore=warn,globset=warn"),
            2 => tracing_subscriber::EnvFilter::new("debug,ignore=warn,globset=warn"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
