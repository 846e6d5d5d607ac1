//! Logging configuration using tracing.
//!
//! Logs go to stderr so command output on stdout stays clean for scripts.

use tracing_subscriber::{filter::Directive, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// HTTP client internals that are chatty below `warn`.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

/// Initialize logging with the specified level. `RUST_LOG` takes precedence.
pub fn init(level: &str) -> anyhow::Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::registry()
        .with(build_filter(level, env.as_deref()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()?;

    Ok(())
}

/// `env` wins when it parses; otherwise `level`, then `info`. Quiet targets are capped at
/// `warn` unless the chosen filter names them.
fn build_filter(level: &str, env: Option<&str>) -> EnvFilter {
    let directives = env
        .map(str::trim)
        .filter(|s| !s.is_empty() && EnvFilter::try_new(s).is_ok())
        .unwrap_or(level);

    let mut filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    for target in QUIET_TARGETS {
        if directives.contains(target) {
            continue;
        }
        if let Ok(directive) = format!("{}=warn", target).parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}
