//! Out-of-process rendering of editor HTML to PNG and PDF.
//!
//! The HTML is parked in the render store under a one-shot token, and a headless
//! browser is pointed at `/api/render-view?token=...`, which loads the editor's
//! styles exactly as the user sees them. Every job carries a deadline; an
//! overrunning browser is killed rather than waited on.

pub mod chrome;

use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{config::RenderConfig, session::Session};

pub use chrome::ChromeEngine;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderJob {
    /// Full-page PNG at a fixed CSS viewport width.
    Screenshot { width: u32 },
    /// A4 PDF; `scale` is already clamped to a positive value.
    Pdf { scale: f64 },
}

impl RenderJob {
    pub fn pdf(scale: f64) -> Self {
        let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
        Self::Pdf { scale }
    }

    pub fn deadline(&self, config: &RenderConfig) -> Duration {
        match self {
            Self::Screenshot { .. } => config.screenshot_timeout,
            Self::Pdf { .. } => config.pdf_timeout,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Screenshot { .. } => "screenshot",
            Self::Pdf { .. } => "pdf",
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to launch headless browser: {0}")]
    Launch(String),

    #[error("{0}")]
    Engine(String),

    #[error("render did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("render worker exited without a result")]
    WorkerLost,
}

/// Headless browser capable of loading a URL and producing bytes for a job.
pub trait HeadlessEngine: Send + Sync {
    /// Engines register a kill hook on `cancel` as soon as they own a process.
    fn render(
        &self,
        url: &str,
        job: RenderJob,
        config: &RenderConfig,
        cancel: &CancelHandle,
    ) -> Result<Vec<u8>, RenderError>;
}

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CancelState {
    cancelled: bool,
    hook: Option<CancelHook>,
}

/// Shared between the waiting request thread and the render worker.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<Mutex<CancelState>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs immediately when the job was already cancelled.
    pub fn set_hook(&self, hook: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.lock();
        if state.cancelled {
            drop(state);
            hook();
        } else {
            state.hook = Some(Box::new(hook));
        }
    }

    pub fn clear_hook(&self) {
        self.inner.lock().hook = None;
    }

    pub fn cancel(&self) {
        let hook = {
            let mut state = self.inner.lock();
            state.cancelled = true;
            state.hook.take()
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }
}

pub struct Renderer {
    engine: Arc<dyn HeadlessEngine>,
    session: Arc<Session>,
    base_url: String,
    config: RenderConfig,
}

impl Renderer {
    pub fn new(
        engine: Arc<dyn HeadlessEngine>,
        session: Arc<Session>,
        base_url: impl Into<String>,
        config: RenderConfig,
    ) -> Self {
        Self {
            engine,
            session,
            base_url: base_url.into(),
            config,
        }
    }

    pub fn screenshot(&self, html: String, width: u32) -> Result<Vec<u8>, RenderError> {
        self.render(html, RenderJob::Screenshot { width })
    }

    pub fn pdf(&self, html: String, scale: f64) -> Result<Vec<u8>, RenderError> {
        self.render(html, RenderJob::pdf(scale))
    }

    fn render(&self, html: String, job: RenderJob) -> Result<Vec<u8>, RenderError> {
        let ticket = self.session.renders.issue(html);
        let url = format!(
            "{}/api/render-view?token={}",
            self.base_url,
            ticket.token()
        );
        let deadline = job.deadline(&self.config);
        let cancel = CancelHandle::new();

        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(&self.engine);
        let config = self.config.clone();
        let worker_cancel = cancel.clone();
        let worker_url = url.clone();
        thread::Builder::new()
            .name(format!("render-{}", job.label()))
            .spawn(move || {
                let result = engine.render(&worker_url, job, &config, &worker_cancel);
                let _ = tx.send(result);
            })
            .map_err(|error| RenderError::Launch(error.to_string()))?;

        tracing::debug!(job = job.label(), %url, ?deadline, "render started");
        let result = match rx.recv_timeout(deadline) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                cancel.cancel();
                Err(RenderError::DeadlineExceeded(deadline))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RenderError::WorkerLost),
        };

        match &result {
            Ok(bytes) => tracing::info!(job = job.label(), bytes = bytes.len(), "render finished"),
            Err(error) => tracing::warn!(job = job.label(), %error, "render failed"),
        }
        drop(ticket);
        result
    }
}
