use chrono::Local;
use eyre::Result;
use fern::Dispatch;

/// Log level from `RUST_LOG`, Info when unset or unparsable
fn level_from_env() -> log::LevelFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(log::LevelFilter::Info)
}

/// Sets up the application logger on stdout.
///
/// Chatty dependencies are capped at Warn so that `RUST_LOG=debug` shows
/// the engine and not the HTTP stack.
///
/// # Errors
/// * If a logger was already installed
pub fn setup_logger() -> Result<()> {
    Dispatch::new()
        .level(level_from_env())
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("alloy_transport_http", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        // time and level, then the message
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ));
        })
        .apply()?;
    Ok(())
}
