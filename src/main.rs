mod app;
mod cli;
mod config;
mod db;
mod http;
mod paths;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = cli::Cli::parse();
    app::run(cli)
}
