use std::{net::TcpListener, path::Path, sync::Arc};

use crate::{
    config::ShellConfig,
    document,
    error::Result,
    instance::{self, Claim, LaunchArgs, handover},
    logging,
    platform::{self, NativeShell},
    render::ChromeEngine,
    server::{ApiServer, ServerParts},
    session::{HandoverPayload, Session},
};

pub struct App {
    config: ShellConfig,
    args: LaunchArgs,
    shell: Arc<dyn NativeShell>,
}

impl App {
    pub fn new() -> Result<Self> {
        logging::init();
        let args = LaunchArgs::from_env();
        tracing::debug!(?args, "starting");
        Ok(Self {
            config: ShellConfig::default(),
            args,
            shell: platform::native(),
        })
    }

    pub fn run(self) -> Result<()> {
        let claim = instance::claim(self.config.port)?;
        tracing::debug!(role = ?claim.role(), "instance role decided");
        match claim {
            Claim::Secondary => {
                handover::hand_over(&self.args, &self.config, self.shell.as_ref());
                Ok(())
            }
            Claim::Primary(listener) => self.run_primary(listener),
        }
    }

    fn run_primary(self, listener: TcpListener) -> Result<()> {
        let session = Arc::new(Session::new());
        let launch_id = self
            .args
            .file
            .as_deref()
            .and_then(|file| ingest_cli_file(&session, file));

        let server = ApiServer::start(
            listener,
            ServerParts {
                session: Arc::clone(&session),
                shell: Arc::clone(&self.shell),
                engine: Arc::new(ChromeEngine::new()),
                config: self.config.clone(),
                terminate: Arc::new(|| std::process::exit(0)),
            },
        )?;

        let root_url = format!("http://{}/", server.addr());
        let editor_url = match launch_id {
            Some(id) => format!("{root_url}?fileId={id}"),
            None => root_url.clone(),
        };

        platform::launch_browser_later(
            Arc::clone(&self.shell),
            editor_url,
            self.config.browser_launch_delay,
        );

        let result = self.shell.run_tray(&root_url);
        server.shutdown();
        session.locks.unlock_all();
        tracing::info!("shutting down");
        result
    }
}

/// Stores the launch file for the editor's first page load.
fn ingest_cli_file(session: &Session, file: &Path) -> Option<String> {
    let path = std::path::absolute(file).ok()?;
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "launch argument is not a file");
        return None;
    }
    match document::load_for_editor(&path) {
        Ok(data) => {
            let id = session.files.insert(HandoverPayload {
                file_name: path.to_string_lossy().into_owned(),
                data,
            });
            tracing::info!(%id, path = %path.display(), "opened launch file");
            Some(id)
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to read launch file");
            None
        }
    }
}
