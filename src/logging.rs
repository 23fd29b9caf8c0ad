//! Structured logging for the shell.
//!
//! The release binary runs without a console, so events go both to stderr and to
//! a log file under the local data directory.

use std::{
    fs::{self, File, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::APP_NAME;

pub fn init() {
    let default_level = if cfg!(debug_assertions) {
        "winhtml=debug,info"
    } else {
        "winhtml=info,warn"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = open_log_file().map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(Mutex::new(file))
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .try_init();
}

pub fn log_file_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|base| base.join(APP_NAME).join("logs").join("shell.log"))
}

fn open_log_file() -> Option<File> {
    let path = log_file_path()?;
    fs::create_dir_all(path.parent()?).ok()?;
    OpenOptions::new().create(true).append(true).open(path).ok()
}

#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
