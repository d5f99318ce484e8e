use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP service
    Daemon {
        /// Address to listen on (overrides `listen_addr` in config.yaml)
        #[clap(short, long)]
        listen: Option<String>,
    },

    /// Train analyzers from a JSON array of documents
    Train {
        /// ISO language code; repeat to train several languages
        #[clap(short, long = "language", required = true)]
        languages: Vec<String>,

        #[clap(short, long)]
        dataset: String,

        /// Field name the documents belong to
        #[clap(short, long)]
        field: String,

        /// Path to a JSON file holding an array of strings
        documents: PathBuf,
    },

    /// Rank trained documents against a text
    Query {
        /// ISO language code
        #[clap(short, long)]
        language: String,

        #[clap(short, long)]
        dataset: String,

        /// Field to query; repeat to fuse several fields with the same text
        #[clap(short, long = "field", required = true)]
        fields: Vec<String>,

        /// Number of results (defaults to `default_top_n` in config.yaml)
        #[clap(short = 'n', long)]
        top_n: Option<usize>,

        text: String,
    },

    /// Print the health report of one analyzer
    Health {
        #[clap(short, long)]
        language: String,

        #[clap(short, long)]
        dataset: String,

        #[clap(short, long)]
        field: String,
    },
}
