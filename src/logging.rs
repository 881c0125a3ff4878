use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `verbosity` counts `-v` flags. `RUST_LOG` overrides the default filter.
pub fn setup_tracing(verbosity: u8, json: bool) {
    let default_level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
        // zenoh is very chatty on debug
        .add_directive(
            "zenoh=warn"
                .parse()
                .unwrap_or_else(|_| LevelFilter::WARN.into()),
        );

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
