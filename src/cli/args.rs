use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Mirror a remote document folder into a local vector index and search it",
    version,
    author
)]
#[command(after_help = "Examples:
  docsync config root_folder_id 1AbC...   Choose the folder to index
  docsync sync                            Index new and changed documents
  docsync search \"refund policy\"          Semantic search
  docsync status                          Show index health
  docsync watch --interval 600            Keep the index fresh
")]
#[allow(clippy::struct_excessive_bools)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose (debug) logging on stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Remote folder to index, overriding the configured one
    #[arg(long, global = true, env = "DOCSYNC_FOLDER_ID")]
    pub folder: Option<String>,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Bring the index up to date with the remote folder
    #[command(after_help = "Examples:
  docsync sync
  docsync sync --folder 1AbC...    Sync a different folder
")]
    Sync,

    /// Discard the index and re-process every remote file
    #[command(after_help = "Examples:
  docsync rebuild
  docsync rebuild --force          Skip confirmation
")]
    Rebuild {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Search indexed documents
    #[command(after_help = "Examples:
  docsync search \"quarterly targets\"
  docsync search \"onboarding checklist\" --limit 10 --json
")]
    Search {
        /// Natural-language query
        query: String,

        /// Maximum number of results (defaults to `search_limit`)
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show index status
    Status,

    /// List known files
    #[command(after_help = "Examples:
  docsync list
  docsync list --remote            Compare with a live remote listing
")]
    List {
        /// Also list the remote folder tree
        #[arg(long)]
        remote: bool,
    },

    /// Print the text of one remote document
    #[command(after_help = "Examples:
  docsync read 1XyZ...
  docsync read 1XyZ... --pages 1-5
")]
    Read {
        /// Remote file id
        id: String,

        /// Inclusive 1-based PDF page range, e.g. 1-5
        #[arg(long)]
        pages: Option<String>,
    },

    /// Sync periodically until interrupted
    Watch {
        /// Seconds between syncs (defaults to `sync_interval_secs`)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show or edit configuration
    Config {
        /// Configuration key to show/set
        key: Option<String>,

        /// Value to set
        value: Option<String>,

        /// Reset to defaults
        #[arg(long)]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
