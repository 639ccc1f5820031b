use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "mirrorsync",
    version,
    about = "Resolve mirror-unlocked comic chapters and their page image tokens"
)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the episode list and pull unlocked chapters from the mirror
    Episodes {
        comic_id: String,
        /// Comic info JSON with the remote `ep_list`; stored episodes are used when omitted
        #[arg(long)]
        info: Option<PathBuf>,
    },
    /// Resolve the page images and tokens of one stored episode
    Images { comic_id: String, episode_id: String },
    /// Show the stored episodes of a comic
    List { comic_id: String },
}
