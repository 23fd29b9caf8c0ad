use std::{path::PathBuf, time::Duration};

pub const APP_NAME: &str = "WinHTML Editor";
pub const APP_PORT: u16 = 58888;
pub const LOOPBACK: &str = "127.0.0.1";

const HANDOVER_TIMEOUT_MS: u64 = 2_000;
const BROWSER_LAUNCH_DELAY_MS: u64 = 200;
const KILL_GRACE_MS: u64 = 100;
const MAX_UPLOAD_BYTES: u64 = 128 << 20;

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub port: u16,
    pub handover_timeout: Duration,
    pub browser_launch_delay: Duration,
    pub kill_grace: Duration,
    pub max_upload_bytes: u64,
    pub ui_root: PathBuf,
    pub render: RenderConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            port: APP_PORT,
            handover_timeout: Duration::from_millis(HANDOVER_TIMEOUT_MS),
            browser_launch_delay: Duration::from_millis(BROWSER_LAUNCH_DELAY_MS),
            kill_grace: Duration::from_millis(KILL_GRACE_MS),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            ui_root: default_ui_root(),
            render: RenderConfig::default(),
        }
    }
}

impl ShellConfig {
    pub fn base_url(&self) -> String {
        base_url(self.port)
    }
}

pub fn base_url(port: u16) -> String {
    format!("http://{LOOPBACK}:{port}")
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Element that signals the editor surface has mounted in the render view.
    pub content_selector: String,
    pub settle_delay: Duration,
    pub screenshot_timeout: Duration,
    pub pdf_timeout: Duration,
    pub device_scale: f64,
    pub page: PageGeometry,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            content_selector: ".ProseMirror".to_string(),
            settle_delay: Duration::from_millis(500),
            screenshot_timeout: Duration::from_secs(30),
            pdf_timeout: Duration::from_secs(60),
            device_scale: 3.0,
            page: PageGeometry::a4(),
        }
    }
}

/// Paper geometry in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl PageGeometry {
    pub fn a4() -> Self {
        Self {
            width: 8.27,
            height: 11.69,
            margin: 0.4,
        }
    }
}

fn default_ui_root() -> PathBuf {
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("dist")))
        && dir.is_dir()
    {
        return dir;
    }
    PathBuf::from("dist")
}
