//! Tracing subscriber setup.
//!
//! Variables, read once by [`init_tracing`]:
//! - `RUST_LOG`: full filter directives, overriding everything below
//! - `BOTLET_LOG`: level for botlet itself (`info` by default)
//! - `BOTLET_BOT_LOG`: level for lines bots send through `BotHost::log`
//!   (`trace` by default, so the bot's own handlers decide)
//! - `LOG_FORMAT`: `json` for JSON lines, anything else for text
//!
//! Output goes to stderr.

use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

fn parse_level(value: Option<&str>, default: &'static str) -> &'static str {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        Some("off") => "off",
        _ => default,
    }
}

/// Filter used when `RUST_LOG` is unset.
///
/// webrtc-rs is chatty below `warn`, and its ICE agent logs every failed
/// candidate pair at `warn`.
fn default_filter(level: Option<&str>, bot_level: Option<&str>) -> String {
    format!(
        "botlet={level},botlet::bot={bot_level},webrtc=warn,webrtc_ice=error",
        level = parse_level(level, "info"),
        bot_level = parse_level(bot_level, "trace"),
    )
}

fn filter_from<F>(lookup: F) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(directives) = lookup("RUST_LOG") {
        return EnvFilter::new(directives);
    }
    EnvFilter::new(default_filter(
        lookup("BOTLET_LOG").as_deref(),
        lookup("BOTLET_BOT_LOG").as_deref(),
    ))
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
    }
}

/// Install the global subscriber. Returns false if one was already set, in
/// which case nothing changes.
pub fn init_tracing() -> bool {
    let lookup = |var: &str| std::env::var(var).ok();
    let format = LogFormat::parse(lookup("LOG_FORMAT").as_deref());

    tracing_subscriber::registry()
        .with(filter_from(lookup))
        .with(fmt_layer(format))
        .try_init()
        .is_ok()
}
