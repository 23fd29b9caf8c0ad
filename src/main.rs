#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod config;
mod document;
mod error;
mod instance;
mod logging;
mod platform;
mod render;
mod server;
mod session;
#[cfg(target_os = "windows")]
mod window;

fn main() -> Result<(), error::ShellError> {
    app::App::new()?.run()
}
