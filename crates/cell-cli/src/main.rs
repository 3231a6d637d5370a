//! cell - packaging compiler for the Sphere JS game runtime

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cell_cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = run(cli)?;
    std::process::exit(code);
}
