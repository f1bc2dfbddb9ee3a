//! stool CLI - create, configure and publish stages from inheritable directions

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;
mod settings;

use commands::Context;
use commands::publish::PublishArgs;
use commands::values::ValuesArgs;
use error::Result;
use settings::Settings;

#[derive(Parser)]
#[command(name = "stool")]
#[command(author = "stool Contributors")]
#[command(version)]
#[command(about = "Create, configure and publish stages from inheritable directions", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Toolkit directory
    #[arg(long, global = true, env = "STOOL_TOOLKIT")]
    toolkit: Option<PathBuf>,

    /// Settings file (default: ~/.config/stool/settings.yaml)
    #[arg(long, global = true, env = "STOOL_SETTINGS")]
    settings: Option<PathBuf>,

    /// Kubernetes context for pods and helm
    #[arg(long, global = true)]
    kube_context: Option<String>,

    /// Namespace for toolkit pods
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate directions and print the resulting values
    Values {
        /// Builtin name, path to a directions file, image, or serialized reference
        directions: String,

        /// Values from the previous publish, exposed as `prev`
        #[arg(short, long)]
        previous: Option<PathBuf>,

        /// Replace a direction with a literal value (name=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Stage name exposed as `stool.stage`
        #[arg(long)]
        stage: Option<String>,

        /// Write a values file instead of printing
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Print private values instead of masking them
        #[arg(long)]
        show_private: bool,
    },

    /// Show the changes publishing would make
    Diff {
        directions: String,

        #[arg(short, long)]
        previous: Option<PathBuf>,

        #[arg(long = "set")]
        set: Vec<String>,

        /// Fail if a change touches a key not in this list
        #[arg(long, value_delimiter = ',')]
        allow: Option<Vec<String>>,

        #[arg(long)]
        stage: Option<String>,

        /// Print the reported changes as a flat JSON list of key, old, new triples
        #[arg(long)]
        json: bool,
    },

    /// Evaluate directions and install or upgrade the release
    Publish {
        directions: String,

        /// Release name
        #[arg(short, long)]
        release: String,

        #[arg(short, long)]
        previous: Option<PathBuf>,

        #[arg(long = "set")]
        set: Vec<String>,

        /// Keys allowed to change; other changes abort before helm runs
        #[arg(long, value_delimiter = ',')]
        allow: Option<Vec<String>>,

        #[arg(long)]
        stage: Option<String>,

        /// Upgrade an existing release
        #[arg(long)]
        upgrade: bool,

        /// Compute and show the changes without running helm
        #[arg(long)]
        dry_run: bool,

        /// Save the applied values for the next publish
        #[arg(long)]
        save: Option<PathBuf>,

        /// Helm binary
        #[arg(long, env = "STOOL_HELM")]
        helm: Option<PathBuf>,
    },

    /// Show merged directions with their inheritance chain
    Describe {
        directions: String,

        /// Print the merged bundle as a directions document
        #[arg(long)]
        yaml: bool,
    },

    /// List builtin directions, charts and scripts
    List,

    /// Check that every builtin bundle merges
    Validate,

    /// Render one expression
    Eval {
        expression: String,

        #[arg(long)]
        stage: Option<String>,
    },

    /// Encode or decode directions references
    #[command(subcommand)]
    Ref(RefCommands),
}

#[derive(Subcommand)]
enum RefCommands {
    /// Print the serialized reference for an argument
    Encode { directions: String },

    /// Show the parts of a serialized reference
    Decode { reference: String },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.settings.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;
    let mut context = Context::new(settings, runtime);
    context.toolkit_path = cli.toolkit;
    context.kube_context = cli.kube_context;
    context.namespace = cli.namespace;

    match cli.command {
        Commands::Values {
            directions,
            previous,
            set,
            stage,
            output,
            json,
            show_private,
        } => commands::values::run(
            &context,
            &ValuesArgs {
                directions,
                previous,
                set,
                stage,
                output,
                json,
                show_private,
            },
        ),

        Commands::Diff {
            directions,
            previous,
            set,
            allow,
            stage,
            json,
        } => commands::diff::run(
            &context,
            &directions,
            previous,
            &set,
            allow.as_deref(),
            stage.as_deref(),
            json,
        ),

        Commands::Publish {
            directions,
            release,
            previous,
            set,
            allow,
            stage,
            upgrade,
            dry_run,
            save,
            helm,
        } => commands::publish::run(
            &context,
            &PublishArgs {
                directions,
                release,
                previous,
                set,
                allow,
                stage,
                upgrade,
                dry_run,
                save,
                helm,
            },
        ),

        Commands::Describe { directions, yaml } => commands::describe::run(&context, &directions, yaml),

        Commands::List => commands::list::run(&context),

        Commands::Validate => commands::validate::run(&context),

        Commands::Eval { expression, stage } => commands::eval::run(&context, &expression, stage.as_deref()),

        Commands::Ref(RefCommands::Encode { directions }) => commands::reference::encode(&directions),

        Commands::Ref(RefCommands::Decode { reference }) => commands::reference::decode(&reference),
    }
}

fn main() -> ExitCode {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code as u8)
        }
    }
}
