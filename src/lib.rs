// IPS site installer
// Library entry point: drives the remote installation wizard of an Invision Power Suite site

pub mod config;
pub mod database;
pub mod error;
pub mod installation;
pub mod models;
pub mod remote;
pub mod security;
pub mod utils;

pub use error::{InstallError, Result};
pub use installation::{run_wizard, InstallSummary, WizardContext, WizardOptions};

use std::path::Path;

fn local_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

/// Dispatch writing `[time] [LEVEL] [PHASE: ..] [STEP: ..] [target] message` lines.
fn text_dispatch() -> fern::Dispatch {
    fern::Dispatch::new().format(|out, message, record| {
        let raw = message.to_string();
        let (phase, step, text) = utils::logging::parse_log_metadata(&raw);
        out.finish(format_args!(
            "{}",
            utils::logging::format_human_readable_log(
                &local_timestamp(),
                record.level(),
                record.target(),
                &text,
                phase.as_deref(),
                step.as_deref(),
            )
        ))
    })
}

/// Dispatch writing one JSON object per record.
fn json_dispatch() -> fern::Dispatch {
    fern::Dispatch::new().format(|out, message, record| {
        let raw = message.to_string();
        let (phase, step, text) = utils::logging::parse_log_metadata(&raw);
        out.finish(format_args!(
            "{}",
            utils::logging::format_json_log(
                &chrono::Utc::now().to_rfc3339(),
                record.level(),
                record.target(),
                &text,
                phase.as_deref(),
                step.as_deref(),
            )
        ))
    })
}

/// Log to `ipsv-<timestamp>.log` (JSON lines) and `ipsv-<timestamp>.txt` under `log_dir`.
///
/// `with_stdout` also mirrors INFO and above to stdout; leave it off while a progress bar
/// owns the terminal.
pub fn init_logging(log_dir: &Path, with_stdout: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let stamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S").to_string();
    let json_file = fern::log_file(log_dir.join(format!("ipsv-{}.log", stamp)))?;
    let text_file = fern::log_file(log_dir.join(format!("ipsv-{}.txt", stamp)))?;

    let mut dispatch = fern::Dispatch::new()
        .level(log::LevelFilter::Debug)
        .level_for("html5ever", log::LevelFilter::Warn)
        .level_for("selectors", log::LevelFilter::Warn)
        .level_for("sqlx", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Info)
        .level_for("reqwest", log::LevelFilter::Info)
        .chain(json_dispatch().chain(json_file))
        .chain(text_dispatch().chain(text_file));

    if with_stdout {
        dispatch = dispatch.chain(
            text_dispatch()
                .level(log::LevelFilter::Info)
                .chain(std::io::stdout()),
        );
    }

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging to {:?} (stdout: {})",
        log_dir,
        with_stdout
    );
    Ok(())
}
