use std::io;
use std::path::PathBuf;

use clap::Parser;
use msbwizard::{commands, init_logging, WizardSettings};

#[derive(clap::Parser, Debug)]
#[command(name = "msbwizard", version, about = "Block project wizard")]
struct Cli {
    /// Settings file; missing files fall back to defaults
    #[arg(long, env = "MSBWIZARD_SETTINGS", default_value = "settings.json", global = true)]
    settings: PathBuf,

    /// Log filter overriding the settings file, e.g. "debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create an empty project file
    New {
        path: PathBuf,
        /// Project name
        #[arg(long)]
        name: Option<String>,
    },
    /// Apply a JSON request or batch to a project
    Apply {
        project: PathBuf,
        request: PathBuf,
        /// Print the response without saving the project
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate code for a project or one of its blocks
    Generate {
        project: PathBuf,
        /// Generate for this block instead of the whole project
        #[arg(long)]
        block: Option<String>,
        /// Template name overriding the default
        #[arg(long)]
        template: Option<String>,
        /// Write the code here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the registered operations and their methods
    Operations,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = WizardSettings::load(&cli.settings)?;
    init_logging(&settings, cli.log_level.as_deref())?;
    // Handler panics become error envelopes; log them instead of printing the default report.
    std::panic::set_hook(Box::new(|info| tracing::error!(%info, "panicked")));

    let mut out = io::stdout().lock();
    match cli.command {
        Commands::New { path, name } => {
            commands::create_project(&path, name.as_deref())?;
        }
        Commands::Apply {
            project,
            request,
            dry_run,
        } => commands::apply(&settings, &project, &request, dry_run, &mut out)?,
        Commands::Generate {
            project,
            block,
            template,
            output,
        } => commands::generate(
            &settings,
            &project,
            block.as_deref(),
            template.as_deref(),
            output.as_deref(),
            &mut out,
        )?,
        Commands::Operations => commands::operations(&settings, &mut out)?,
    }
    Ok(())
}
