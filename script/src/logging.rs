use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const QUIET_DEPENDENCIES: &str =
    "h2=info,hyper=info,reqwest=info,rustls=warn,solana_rpc_client=info,solana_client=info";

/// Expand a bare level (`debug`) with quieter transport crates. Directive strings
/// containing `,` or `=` are used as-is.
pub fn filter_directives(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.is_empty() {
        return format!("info,{QUIET_DEPENDENCIES}");
    }
    if normalized.contains(',') || normalized.contains('=') {
        normalized.to_string()
    } else {
        format!("{normalized},{QUIET_DEPENDENCIES}")
    }
}

pub fn setup_logging(log_level: &str, json_format: bool) {
    let filter_spec = filter_directives(log_level);
    let filter = EnvFilter::from_str(&filter_spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        subscriber.with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .compact();
        subscriber.with(fmt_layer).init();
    }

    tracing::info!(
        filter = %filter_spec,
        format = if json_format { "json" } else { "compact" },
        "Logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_gets_dependency_overrides() {
        let spec = filter_directives("debug");
        assert!(spec.starts_with("debug,"));
        assert!(spec.contains("hyper=info"));
    }

    #[test]
    fn custom_directives_pass_through() {
        assert_eq!(
            filter_directives("warn,vault_swap_relay=trace"),
            "warn,vault_swap_relay=trace"
        );
    }
}
