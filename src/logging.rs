use std::env;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "CDM_MIGRATE_LOG";

fn filter_directive(explicit: Option<String>, rust_log: Option<String>, verbose: bool) -> String {
    explicit
        .or(rust_log)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string())
}

/// Install the stderr subscriber. Safe to call more than once; later calls are no-ops.
pub fn init(verbose: bool) {
    let directive = filter_directive(
        env::var(LOG_ENV).ok(),
        env::var("RUST_LOG").ok(),
        verbose,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::filter_directive;

    #[test]
    fn explicit_variable_wins_over_rust_log() {
        let got = filter_directive(Some("info".into()), Some("trace".into()), false);
        assert_eq!(got, "info");
    }

    #[test]
    fn verbose_only_changes_the_default() {
        assert_eq!(filter_directive(None, None, false), "warn");
        assert_eq!(filter_directive(None, None, true), "debug");
        assert_eq!(filter_directive(None, Some("error".into()), true), "error");
        assert_eq!(filter_directive(Some("  ".into()), None, true), "debug");
    }
}
