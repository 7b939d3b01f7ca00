use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Initialize tracing
///
/// `RUST_LOG` drives the filter (default `info`), `LOG_FORMAT=json` switches to json lines.
pub async fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .or(EnvFilter::try_new("info"))
        .unwrap();

    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    let (compact, json) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer().compact()), None)
    };

    let collector = Registry::default().with(env_filter).with(compact).with(json);

    // Initialize tracing
    tracing::subscriber::set_global_default(collector).unwrap();
}
