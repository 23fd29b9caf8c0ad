//! Loopback HTTP control API consumed by the browser editor.
//!
//! The accept loop owns one thread; every request gets a thread of its own, so a
//! long render never holds up dialogs, saves or lock calls.

mod assets;
mod form;
mod reply;
mod routes;

use std::{
    net::{SocketAddr, TcpListener},
    sync::Arc,
    thread::{self, JoinHandle},
};

use tiny_http::{Method, Request, Server};

use self::reply::Reply;

use crate::{
    config::ShellConfig,
    error::{Result, ShellError},
    platform::NativeShell,
    render::{HeadlessEngine, Renderer},
    session::Session,
};

/// Ends the process after `/api/kill`; tests swap in a flag.
pub type Terminator = Arc<dyn Fn() + Send + Sync>;

/// Everything the server is built from, before the listener address is known.
pub struct ServerParts {
    pub session: Arc<Session>,
    pub shell: Arc<dyn NativeShell>,
    pub engine: Arc<dyn HeadlessEngine>,
    pub config: ShellConfig,
    pub terminate: Terminator,
}

/// Shared by all request threads.
pub struct ApiContext {
    pub session: Arc<Session>,
    pub shell: Arc<dyn NativeShell>,
    pub renderer: Renderer,
    pub config: ShellConfig,
    pub base_url: String,
    terminate: Terminator,
}

pub struct ApiServer {
    addr: SocketAddr,
    server: Arc<Server>,
    accept_loop: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(listener: TcpListener, parts: ServerParts) -> Result<Self> {
        let addr = listener.local_addr()?;
        let base_url = format!("http://{addr}");
        let server = Server::from_listener(listener, None).map_err(|source| ShellError::Bind {
            addr: addr.to_string(),
            source: std::io::Error::other(source),
        })?;
        let server = Arc::new(server);

        let context = Arc::new(ApiContext {
            renderer: Renderer::new(
                parts.engine,
                Arc::clone(&parts.session),
                base_url.clone(),
                parts.config.render.clone(),
            ),
            session: parts.session,
            shell: parts.shell,
            config: parts.config,
            base_url,
            terminate: parts.terminate,
        });

        let accept_server = Arc::clone(&server);
        let accept_loop = thread::Builder::new()
            .name("http-accept".into())
            .spawn(move || {
                for request in accept_server.incoming_requests() {
                    let context = Arc::clone(&context);
                    let spawned = thread::Builder::new()
                        .name("http-request".into())
                        .spawn(move || handle(&context, request));
                    if let Err(error) = spawned {
                        tracing::error!(%error, "failed to spawn request thread");
                    }
                }
                tracing::debug!("accept loop finished");
            })?;

        tracing::info!(%addr, "control API listening");
        Ok(Self {
            addr,
            server,
            accept_loop: Some(accept_loop),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(mut self) {
        self.server.unblock();
        if let Some(handle) = self.accept_loop.take() {
            let _ = handle.join();
        }
    }
}

fn handle(context: &ApiContext, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();

    let reply = if method == Method::Options {
        Reply::ok()
    } else {
        routes::dispatch(context, &method, &url, &mut request).unwrap_or_else(|error| {
            if error.status() >= 500 {
                tracing::warn!(%method, %url, %error, "request failed");
            } else {
                tracing::debug!(%method, %url, %error, "request rejected");
            }
            Reply::error(&error)
        })
    };

    tracing::debug!(%method, %url, status = reply.status(), "request served");
    if let Err(error) = request.respond(reply.into_response()) {
        tracing::debug!(%url, %error, "client went away before the response");
    }
}
