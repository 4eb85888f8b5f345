use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ndgr")]
#[command(author, version, about = "Watch, speak and relay live comments")]
pub struct Args {
    /// Path to the settings file
    #[arg(short, long, global = true, env = "NDGR_SETTINGS")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream comments from a view URI
    Watch {
        /// View URI of the comment server
        uri: String,

        /// Historical messages to replay before live ones
        #[arg(short, long, default_value_t = 0)]
        backward: usize,

        /// Start cursor: `now`, a Unix timestamp or a server cursor
        #[arg(long, default_value = "now")]
        at: String,

        /// Log speech requests as they would be spoken
        #[arg(long)]
        speak: bool,

        /// Print messages as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Send a sample comment through the configured relay
    RelayTest {
        /// Comment text
        #[arg(default_value = "Hello, world!")]
        comment: String,

        #[arg(long, default_value = "123")]
        user_id: String,

        #[arg(long, default_value = "tester")]
        name: String,

        #[arg(long)]
        owner: bool,
    },

    /// Show or reset the settings file
    Config {
        #[arg(long)]
        show: bool,

        #[arg(long)]
        reset: bool,
    },
}
