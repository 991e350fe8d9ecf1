use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use adaptux_cli::{
    cli::{Cli, Commands},
    commands,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // --log-level / --verbose beat RUST_LOG; otherwise only warnings are shown
    let env_filter = match cli.level_filter() {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { config } => commands::check::execute(&config)?,
        Commands::Eval {
            config,
            signals,
            context,
        } => commands::eval::execute(&config, &signals, context.as_deref())?,
        Commands::Replay { config, events } => commands::replay::execute(&config, &events)?,
    }

    Ok(())
}
