#![forbid(unsafe_code)]

mod cmd;
mod output;
mod server;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use taskbridge_core::config;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tbridge: mirror task-tracker webhooks onto a task list",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: <config dir>/taskbridge/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        OutputMode::from_json_flag(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Bridge",
        about = "Run the webhook server",
        long_about = "Accept webhook deliveries and mirror each event onto the target task list.",
        after_help = "EXAMPLES:\n    # Serve on the configured address\n    tbridge serve\n\n    # Serve on all interfaces without touching the store file\n    tbridge serve --bind 0.0.0.0:8787 --memory-store"
    )]
    Serve(cmd::serve::ServeArgs),

    #[command(
        next_help_heading = "Bridge",
        about = "Process one event JSON",
        long_about = "Run one webhook body through the full pipeline and print the outcome.",
        after_help = "EXAMPLES:\n    # Replay a captured delivery\n    tbridge process --input event.json\n\n    # Read from stdin, machine-readable\n    cat event.json | tbridge process --json"
    )]
    Process(cmd::process::ProcessArgs),

    #[command(next_help_heading = "Store", about = "Manage per-user credentials and lists")]
    Credentials {
        #[command(subcommand)]
        command: cmd::credentials::CredentialsCommand,
    },

    #[command(next_help_heading = "Store", about = "Inspect or drop source-to-target mappings")]
    Mapping {
        #[command(subcommand)]
        command: cmd::mapping::MappingCommand,
    },

    #[command(
        next_help_heading = "Store",
        about = "Remove expired store entries",
        after_help = "EXAMPLES:\n    tbridge purge"
    )]
    Purge,

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    tbridge completions bash\n\n    # Generate zsh completions\n    tbridge completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TASKBRIDGE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "taskbridge=debug,tbridge=debug,info"
        } else {
            "taskbridge=info,tbridge=info,warn"
        })
    });

    let format = env::var("TASKBRIDGE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so `--json` output on stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = cli.output_mode();

    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let config = config::load_config(cli.config.as_deref())?;
    debug!(store = %config.store.path.display(), "configuration loaded");

    match &cli.command {
        Commands::Serve(args) => cmd::serve::run_serve(args, &config),
        Commands::Process(args) => cmd::process::run_process(args, &config, output),
        Commands::Credentials { command } => {
            let store = cmd::open_store(&config)?;
            cmd::credentials::run_credentials(command, &store, output)
        }
        Commands::Mapping { command } => {
            let store = cmd::open_store(&config)?;
            cmd::mapping::run_mapping(command, &store, output)
        }
        Commands::Purge => {
            let store = cmd::open_store(&config)?;
            cmd::purge::run_purge(&store, output)
        }
        Commands::Completions(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_sets_output_mode() {
        let cli = Cli::parse_from(["tbridge", "--json", "purge"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tbridge", "purge", "--json", "-v", "--config", "c.toml"]);
        assert!(cli.output_mode().is_json());
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("c.toml")));
    }

    #[test]
    fn default_output_is_human() {
        let cli = Cli::parse_from(["tbridge", "purge"]);
        assert!(!cli.output_mode().is_json());
        assert!(cli.config.is_none());
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::parse_from(["tbridge", "serve", "--bind", "0.0.0.0:9000", "--memory-store"]);
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
                assert!(args.memory_store);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn credentials_set_refresh_token_is_optional() {
        let cli = Cli::parse_from(["tbridge", "credentials", "set-refresh", "--user", "42"]);
        assert!(matches!(
            cli.command,
            Commands::Credentials {
                command: cmd::credentials::CredentialsCommand::SetRefresh { token: None, .. }
            }
        ));
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["tbridge", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["tbridge", "serve"],
            vec!["tbridge", "process", "--input", "e.json"],
            vec!["tbridge", "credentials", "set-refresh", "--user", "u", "--token", "t"],
            vec!["tbridge", "credentials", "set-list", "--user", "u", "--list", "l"],
            vec!["tbridge", "credentials", "forget", "--user", "u"],
            vec!["tbridge", "mapping", "show", "s1"],
            vec!["tbridge", "mapping", "forget", "s1"],
            vec!["tbridge", "purge"],
            vec!["tbridge", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "Failed to parse: {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
