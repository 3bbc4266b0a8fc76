mod app;
mod config;

use anyhow::{Context, Result};
use clap::Parser;

use app::{Cli, load_expressions, run};
use config::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let config = AppConfig::load(cli.config.as_deref()).context("Config: Failed to load")?;
    let config = cli.apply(config);
    tracing::info!(
        "Config: format {:?}, max depth {}, stats {}",
        config.format,
        config.parser.max_depth,
        config.stats
    );

    let expressions = load_expressions(&cli)?;
    if expressions.is_empty() {
        anyhow::bail!("CLI: No expressions given; pass them as arguments or use --file");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let failed = run(&expressions, &config, &mut out)?;

    if failed > 0 {
        anyhow::bail!("{} of {} expression(s) failed to parse", failed, expressions.len());
    }

    Ok(())
}
