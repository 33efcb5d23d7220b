use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SCHEMATA_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

fn env_filter() -> EnvFilter {
    let directive = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_DIRECTIVE.to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs the global subscriber. Output goes to stderr so `--json`
/// command output on stdout stays machine readable.
pub fn init(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false);
    let result = if json {
        builder
            .with_ansi(false)
            .json()
            .flatten_event(true)
            .try_init()
    } else {
        builder.with_ansi(crate::ui::stderr_is_terminal()).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
