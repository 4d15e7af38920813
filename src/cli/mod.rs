pub mod daemon;
pub mod history;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dive-in - container image analysis backend
#[derive(Parser, Debug)]
#[command(
    name = "dive-in",
    version,
    about = "dive-in - run dive analyses in the background and keep a local history"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory path
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the backend in the foreground
    Serve {
        /// Host to listen on (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Listen on a Unix domain socket instead of TCP
        #[arg(long = "socket")]
        socket: Option<PathBuf>,
    },

    /// Inspect or prune the local analysis history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Check whether the dive binary can be found
    Check,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// List saved analyses, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a saved analysis as JSON
    Show {
        /// History entry ID
        id: String,
    },

    /// Delete a saved analysis
    Delete {
        /// History entry ID
        id: String,
    },

    /// Delete every saved analysis
    Clear,
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();
    let data_dir = cli.data_dir.as_deref();

    match &cli.command {
        Some(Commands::Serve { host, port, socket }) => {
            daemon::cmd_serve(config, data_dir, host.clone(), *port, socket.clone()).await
        }
        Some(Commands::History { command }) => match command {
            HistoryCommand::List { json } => history::cmd_list(config, data_dir, *json).await,
            HistoryCommand::Show { id } => history::cmd_show(config, data_dir, id).await,
            HistoryCommand::Delete { id } => history::cmd_delete(config, data_dir, id).await,
            HistoryCommand::Clear => history::cmd_clear(config, data_dir).await,
        },
        Some(Commands::Check) => daemon::cmd_check(config),
        None => {
            // No subcommand provided -- print help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
