use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the console subscriber. `RUST_LOG` wins over `level`.
pub fn init_logger(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init()?;

    tracing::debug!("logging initialized");
    Ok(())
}
