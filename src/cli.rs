use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to config.yaml. Defaults to $FOLIO_BASE_PATH/config.yaml
    /// or ~/.local/share/folio/config.yaml
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the chat service.
    Serve {
        /// Address to listen on, overrides server.listen
        #[clap(short, long)]
        listen: Option<String>,

        /// Don't refresh the portfolio cache on startup
        #[clap(long, default_value = "false")]
        no_warmup: bool,
    },

    /// Ask a single question and print the reply as json.
    Ask {
        /// The question
        message: String,
    },

    /// Fetch and chunk the portfolio, print the chunks as json.
    Chunks {},
}
