use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use headless_chrome::{
    Browser, LaunchOptions, Tab,
    protocol::cdp::{
        Emulation,
        Page::{self, CaptureScreenshotFormatOption, Viewport},
    },
    types::PrintToPdfOptions,
};

use super::{CancelHandle, HeadlessEngine, RenderError, RenderJob};
use crate::{config::RenderConfig, platform};

const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// Drives an installed Edge or Chrome through the DevTools protocol.
#[derive(Debug)]
pub struct ChromeEngine {
    executable: Option<PathBuf>,
}

impl ChromeEngine {
    pub fn new() -> Self {
        let executable = find_browser_path();
        match &executable {
            Some(path) => tracing::info!(path = %path.display(), "headless browser found"),
            None => tracing::debug!("no known browser install, using driver default"),
        }
        Self { executable }
    }

    fn launch(&self, config: &RenderConfig, job: RenderJob) -> Result<Browser, RenderError> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .path(self.executable.clone())
            .ignore_certificate_errors(true)
            .idle_browser_timeout(job.deadline(config))
            .args(vec![OsStr::new("--disable-gpu")])
            .build()
            .map_err(|error| RenderError::Launch(error.to_string()))?;
        Browser::new(options).map_err(|error| RenderError::Launch(error.to_string()))
    }
}

impl HeadlessEngine for ChromeEngine {
    fn render(
        &self,
        url: &str,
        job: RenderJob,
        config: &RenderConfig,
        cancel: &CancelHandle,
    ) -> Result<Vec<u8>, RenderError> {
        let browser = self.launch(config, job)?;
        if let Some(pid) = browser.get_process_id() {
            cancel.set_hook(move || {
                let killed = platform::terminate_process(pid);
                tracing::warn!(pid, killed, "headless browser terminated after deadline");
            });
        }

        let result = render_in(&browser, url, job, config);
        cancel.clear_hook();
        result
    }
}

fn render_in(
    browser: &Browser,
    url: &str,
    job: RenderJob,
    config: &RenderConfig,
) -> Result<Vec<u8>, RenderError> {
    let tab = browser.new_tab().map_err(engine_error)?;
    tab.set_default_timeout(job.deadline(config));
    tab.navigate_to(url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(engine_error)?;
    wait_until_visible(&tab, &config.content_selector, job.deadline(config))?;
    thread::sleep(config.settle_delay);

    match job {
        RenderJob::Screenshot { width } => full_page_png(&tab, width, config),
        RenderJob::Pdf { scale } => print_pdf(&tab, scale, config),
    }
}

/// Waits until the content root has a laid-out, non-empty box.
fn wait_until_visible(tab: &Tab, selector: &str, timeout: Duration) -> Result<(), RenderError> {
    poll_until(timeout, VISIBILITY_POLL, || {
        let Ok(element) = tab.find_element(selector) else {
            return false;
        };
        element
            .get_box_model()
            .is_ok_and(|model| model.width > 0.0 && model.height > 0.0)
    })
    .map_err(|waited| {
        RenderError::Engine(format!(
            "`{selector}` not visible within {}ms",
            waited.as_millis()
        ))
    })
}

/// Calls `ready` every `interval` until it holds or `timeout` elapses.
/// Returns the elapsed time on expiry.
fn poll_until(
    timeout: Duration,
    interval: Duration,
    mut ready: impl FnMut() -> bool,
) -> Result<(), Duration> {
    let started = Instant::now();
    loop {
        if ready() {
            return Ok(());
        }
        let waited = started.elapsed();
        if waited >= timeout {
            return Err(waited);
        }
        thread::sleep(interval.min(timeout - waited));
    }
}

fn full_page_png(tab: &Tab, width: u32, config: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    tab.call_method(Emulation::SetDeviceMetricsOverride {
        width,
        height: 1,
        device_scale_factor: config.device_scale,
        mobile: false,
        scale: None,
        screen_width: None,
        screen_height: None,
        position_x: None,
        position_y: None,
        dont_set_visible_size: None,
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    })
    .map_err(engine_error)?;

    let metrics = tab
        .call_method(Page::GetLayoutMetrics(None))
        .map_err(engine_error)?;
    let content = metrics.css_content_size;

    let shot = tab
        .call_method(Page::CaptureScreenshot {
            format: Some(CaptureScreenshotFormatOption::Png),
            quality: None,
            clip: Some(Viewport {
                x: 0.0,
                y: 0.0,
                width: f64::from(width),
                height: content.height.ceil(),
                scale: 1.0,
            }),
            from_surface: Some(true),
            capture_beyond_viewport: Some(true),
            optimize_for_speed: None,
        })
        .map_err(engine_error)?;

    STANDARD
        .decode(shot.data)
        .map_err(|error| RenderError::Engine(format!("screenshot payload: {error}")))
}

fn print_pdf(tab: &Tab, scale: f64, config: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    let page = config.page;
    tab.print_to_pdf(Some(PrintToPdfOptions {
        print_background: Some(true),
        paper_width: Some(page.width),
        paper_height: Some(page.height),
        margin_top: Some(page.margin),
        margin_bottom: Some(page.margin),
        margin_left: Some(page.margin),
        margin_right: Some(page.margin),
        scale: Some(scale),
        ..Default::default()
    }))
    .map_err(engine_error)
}

fn engine_error(error: impl std::fmt::Display) -> RenderError {
    RenderError::Engine(error.to_string())
}

/// First installed Chromium-based browser from the known Windows locations.
pub fn find_browser_path() -> Option<PathBuf> {
    if !cfg!(target_os = "windows") {
        return None;
    }
    let local_app_data = std::env::var_os("LOCALAPPDATA").map(PathBuf::from);
    browser_candidates(local_app_data.as_deref())
        .into_iter()
        .find(|path| path.is_file())
}

fn browser_candidates(local_app_data: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = [
        r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect();

    if let Some(local) = local_app_data {
        candidates.push(
            local
                .join("Google")
                .join("Chrome")
                .join("Application")
                .join("chrome.exe"),
        );
    }
    candidates
}
