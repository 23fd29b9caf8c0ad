use std::{
    borrow::Cow,
    fs,
    io::Read,
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tiny_http::{Method, Request};

use super::{ApiContext, assets, form, reply::Reply};
use crate::{
    document::{self, placement::plan_save},
    error::{Result, ShellError},
    instance::handover::HandoverRequest,
    platform::{self, SaveFilter},
    session::HandoverPayload,
};

#[derive(Debug, Default, Deserialize)]
struct PathBody {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct ScreenshotRequest {
    #[serde(default)]
    html: String,
    #[serde(default)]
    width: u32,
}

#[derive(Debug, Deserialize)]
struct PdfRequest {
    #[serde(default)]
    html: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    scale: f64,
}

#[derive(Debug, Serialize)]
struct PathReply {
    path: String,
}

pub fn dispatch(
    context: &ApiContext,
    method: &Method,
    url: &str,
    request: &mut Request,
) -> Result<Reply> {
    let (path, query) = split_url(url);

    match (method, path) {
        (Method::Get, "/api/kill") => Ok(kill(context)),
        (Method::Post, "/api/file/lock") => Ok(set_lock(context, request, true)),
        (Method::Post, "/api/file/unlock") => Ok(set_lock(context, request, false)),
        (Method::Get, "/api/dialog/open") => Ok(dialog_open(context)),
        (Method::Get, "/api/dialog/save") => Ok(dialog_save(context, &query)),
        (Method::Post, "/api/cli-handover") => cli_handover(context, request),
        (Method::Get, "/api/open-file") => open_file(context, &query),
        (Method::Get, "/api/render-view") => render_view(context, &query),
        (Method::Post, "/api/export/screenshot") => export_screenshot(context, request),
        (Method::Post, "/api/export/pdf") => export_pdf(context, request),
        (Method::Post, "/api/save-file") => save_file(context, request),
        (Method::Get | Method::Head, _) => Ok(assets::serve(&context.config.ui_root, path)),
        _ => Err(ShellError::not_found("Not found")),
    }
}

fn kill(context: &ApiContext) -> Reply {
    tracing::info!("kill requested, releasing locks and exiting");
    context.session.locks.unlock_all();
    let terminate = Arc::clone(&context.terminate);
    let grace = context.config.kill_grace;
    thread::spawn(move || {
        thread::sleep(grace);
        terminate();
    });
    Reply::ok()
}

/// Best effort in both directions; the editor never sees a failure.
fn set_lock(context: &ApiContext, request: &mut Request, lock: bool) -> Reply {
    let body = read_body(request, context.config.max_upload_bytes)
        .ok()
        .and_then(|body| serde_json::from_slice::<PathBody>(&body).ok())
        .unwrap_or_default();
    if body.path.is_empty() {
        return Reply::ok();
    }
    let path = Path::new(&body.path);
    if lock {
        context.session.locks.lock(path);
    } else {
        context.session.locks.unlock(path);
    }
    Reply::ok()
}

fn dialog_open(context: &ApiContext) -> Reply {
    let path = context.shell.show_open_dialog();
    path_reply(path.as_deref())
}

fn dialog_save(context: &ApiContext, query: &Query) -> Reply {
    let filter = SaveFilter::from_query(query.get("filter"));
    let path = context.shell.show_save_dialog(filter);
    path_reply(path.as_deref())
}

fn path_reply(path: Option<&Path>) -> Reply {
    let path = path
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_default();
    Reply::json(&PathReply { path })
}

fn cli_handover(context: &ApiContext, request: &mut Request) -> Result<Reply> {
    let body = read_body(request, context.config.max_upload_bytes)?;
    let handover: HandoverRequest = serde_json::from_slice(&body)?;
    let data = STANDARD.decode(handover.data.as_bytes())?;
    let data = document::prepare_for_editor(Path::new(&handover.file_name), data);

    let id = context.session.files.insert(HandoverPayload {
        file_name: handover.file_name,
        data,
    });
    tracing::info!(%id, "received file from secondary instance");

    platform::launch_browser_later(
        Arc::clone(&context.shell),
        format!("{}/?fileId={id}", context.base_url),
        Duration::ZERO,
    );
    Ok(Reply::text(200, id))
}

fn open_file(context: &ApiContext, query: &Query) -> Result<Reply> {
    // A `path` parameter wins even when empty; only its absence falls back to `fileId`.
    let (full_path, data) = match query.get("path") {
        Some("") => return Err(ShellError::bad_request("Empty file path")),
        Some(file_path) => {
            let data = document::load_for_editor(Path::new(file_path))
                .map_err(|error| ShellError::not_found(format!("Failed to read file: {error}")))?;
            (file_path.to_string(), data)
        }
        None => {
            let file_id = query.get("fileId").unwrap_or_default();
            let payload = context
                .session
                .files
                .take(file_id)
                .ok_or_else(|| ShellError::not_found("File ID not found"))?;
            (payload.file_name, payload.data)
        }
    };

    let content_type = document::content_type_for(Path::new(&full_path));
    Ok(Reply::bytes(data, content_type)
        .with_header("X-File-Name", &urlencoding::encode(display_name(&full_path)))
        .with_header("X-File-Path", &urlencoding::encode(&full_path)))
}

fn render_view(context: &ApiContext, query: &Query) -> Result<Reply> {
    let token = query.get("token").unwrap_or_default();
    context
        .session
        .renders
        .get(token)
        .map(Reply::html)
        .ok_or_else(|| ShellError::not_found("Not found"))
}

fn export_screenshot(context: &ApiContext, request: &mut Request) -> Result<Reply> {
    let body = read_body(request, context.config.max_upload_bytes)?;
    let job: ScreenshotRequest = serde_json::from_slice(&body)?;
    if job.html.is_empty() {
        return Err(ShellError::bad_request("HTML content is empty"));
    }
    if job.width == 0 {
        return Err(ShellError::bad_request("Width must be positive"));
    }
    let png = context.renderer.screenshot(job.html, job.width)?;
    Ok(Reply::bytes(png, "image/png"))
}

fn export_pdf(context: &ApiContext, request: &mut Request) -> Result<Reply> {
    let body = read_body(request, context.config.max_upload_bytes)?;
    let job: PdfRequest = serde_json::from_slice(&body)?;
    if job.html.is_empty() || job.path.is_empty() {
        return Err(ShellError::bad_request("HTML content or Path is empty"));
    }
    let pdf = context.renderer.pdf(job.html, job.scale)?;
    fs::write(&job.path, pdf).map_err(|error| {
        tracing::warn!(path = %job.path, %error, "pdf write failed");
        ShellError::Io(std::io::Error::new(error.kind(), "Failed to write PDF file"))
    })?;
    tracing::info!(path = %job.path, "pdf exported");
    Ok(Reply::ok())
}

fn save_file(context: &ApiContext, request: &mut Request) -> Result<Reply> {
    let limit = context.config.max_upload_bytes;
    if request.body_length().is_some_and(|len| len as u64 > limit) {
        return Err(ShellError::bad_request("Request body too large"));
    }
    let content_type = header(request, "Content-Type");
    let form = form::parse_save_form(content_type.as_deref(), request.as_reader(), limit)?;

    let plan = plan_save(Path::new(&form.file_path), !form.assets.is_empty());
    if plan.create_asset_dir {
        fs::create_dir_all(&plan.asset_dir).map_err(|error| {
            ShellError::Io(std::io::Error::new(
                error.kind(),
                format!("Failed to create directory: {error}"),
            ))
        })?;
    }

    let locks = &context.session.locks;
    locks.unlock(&plan.document);
    if let Err(error) = fs::write(&plan.document, &form.html) {
        locks.lock(&plan.document);
        return Err(ShellError::SaveFailed(format!(
            "Failed to write file: {error}. The file might be open in another program."
        )));
    }

    for asset in &form.assets {
        let target = plan.asset_dir.join(&asset.file_name);
        if let Err(error) = fs::write(&target, &asset.data) {
            tracing::warn!(path = %target.display(), %error, "failed to write asset");
        }
    }

    tracing::info!(
        path = %plan.document.display(),
        strategy = ?plan.strategy,
        assets = form.assets.len(),
        "document saved"
    );
    Ok(Reply::json(&PathReply {
        path: plan.document.to_string_lossy().into_owned(),
    }))
}

fn read_body(request: &mut Request, limit: u64) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    request.as_reader().take(limit).read_to_end(&mut body)?;
    Ok(body)
}

fn header(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str().to_string())
}

/// Last path component, splitting on either separator since handed-over names
/// come from Windows.
fn display_name(full_path: &str) -> &str {
    full_path.rsplit(['/', '\\']).next().unwrap_or(full_path)
}

struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn split_url(url: &str) -> (&str, Query) {
    let (path, raw_query) = url.split_once('?').unwrap_or((url, ""));
    let pairs = raw_query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect();
    (path, Query { pairs })
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(Cow::Borrowed(value)) => value.to_string(),
        Ok(Cow::Owned(value)) => value,
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::TcpListener,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
        time::Instant,
    };

    use parking_lot::Mutex;

    use super::*;
    use crate::{
        config::{RenderConfig, ShellConfig},
        platform::NativeShell,
        render::{CancelHandle, HeadlessEngine, RenderError, RenderJob},
        server::{ApiServer, ServerParts, form::tests as multipart},
        session::Session,
    };

    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[derive(Default)]
    struct FakeShell {
        open_path: Option<PathBuf>,
        opened: Mutex<Vec<String>>,
    }

    impl NativeShell for FakeShell {
        fn show_open_dialog(&self) -> Option<PathBuf> {
            self.open_path.clone()
        }

        fn show_save_dialog(&self, filter: SaveFilter) -> Option<PathBuf> {
            Some(PathBuf::from(format!("picked.{}", filter.default_extension())))
        }

        fn open_url(&self, url: &str) {
            self.opened.lock().push(url.to_string());
        }

        fn run_tray(&self, _editor_url: &str) -> Result<()> {
            Ok(())
        }
    }

    /// Loads the render view over HTTP like a real browser would.
    #[derive(Default)]
    struct LoopbackEngine {
        urls: Mutex<Vec<String>>,
        /// Never finishes; waits for the deadline to cancel it instead.
        stalls: bool,
    }

    impl HeadlessEngine for LoopbackEngine {
        fn render(
            &self,
            url: &str,
            job: RenderJob,
            _config: &RenderConfig,
            cancel: &CancelHandle,
        ) -> std::result::Result<Vec<u8>, RenderError> {
            self.urls.lock().push(url.to_string());
            if self.stalls {
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                return Err(RenderError::Engine("cancelled".into()));
            }
            let html = ureq::get(url)
                .call()
                .map_err(|error| RenderError::Engine(error.to_string()))?
                .into_string()
                .map_err(|error| RenderError::Engine(error.to_string()))?;
            match job {
                RenderJob::Screenshot { .. } => Ok(PNG_BYTES.to_vec()),
                RenderJob::Pdf { scale } => Ok(format!("%PDF scale={scale} {html}").into_bytes()),
            }
        }
    }

    struct Harness {
        server: Option<ApiServer>,
        base: String,
        session: Arc<Session>,
        shell: Arc<FakeShell>,
        engine: Arc<LoopbackEngine>,
        killed: Arc<AtomicBool>,
        _ui: tempfile::TempDir,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            if let Some(server) = self.server.take() {
                server.shutdown();
            }
        }
    }

    fn harness_with(shell: FakeShell, engine: LoopbackEngine, render: RenderConfig) -> Harness {
        crate::logging::init_test();
        let ui = tempfile::tempdir().unwrap();
        fs::write(ui.path().join("index.html"), "<html>editor</html>").unwrap();

        let session = Arc::new(Session::new());
        let shell = Arc::new(shell);
        let engine = Arc::new(engine);
        let killed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&killed);

        let config = ShellConfig {
            port: 0,
            kill_grace: Duration::from_millis(10),
            ui_root: ui.path().to_path_buf(),
            render,
            ..ShellConfig::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let server = ApiServer::start(
            listener,
            ServerParts {
                session: Arc::clone(&session),
                shell: shell.clone(),
                engine: engine.clone(),
                config,
                terminate: Arc::new(move || flag.store(true, Ordering::SeqCst)),
            },
        )
        .unwrap();

        Harness {
            base: format!("http://{}", server.addr()),
            server: Some(server),
            session,
            shell,
            engine,
            killed,
            _ui: ui,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakeShell::default(),
            LoopbackEngine::default(),
            RenderConfig::default(),
        )
    }

    fn respond(result: std::result::Result<ureq::Response, ureq::Error>) -> ureq::Response {
        match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(error) => panic!("request failed: {error}"),
        }
    }

    fn body_bytes(response: ureq::Response) -> Vec<u8> {
        let mut body = Vec::new();
        response.into_reader().read_to_end(&mut body).unwrap();
        body
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(2) {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn handover_then_open_by_id_returns_the_bytes_once() {
        let h = harness();
        let body = serde_json::json!({
            "fileName": "C:\\docs\\meeting notes.txt",
            "data": STANDARD.encode("hello"),
        });

        let response = respond(ureq::post(&format!("{}/api/cli-handover", h.base)).send_json(body));
        assert_eq!(response.status(), 200);
        let id = response.into_string().unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let url = format!("{}/api/open-file?fileId={id}", h.base);
        let response = respond(ureq::get(&url).call());
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("X-File-Name"), Some("meeting%20notes.txt"));
        assert_eq!(body_bytes(response), b"hello");

        let again = respond(ureq::get(&url).call());
        assert_eq!(again.status(), 404);
        assert_eq!(again.into_string().unwrap(), "File ID not found");

        let expected = format!("{}/?fileId={id}", h.base);
        assert!(wait_until(|| h.shell.opened.lock().contains(&expected)));
    }

    #[test]
    fn handover_rejects_malformed_payloads() {
        let h = harness();
        let url = format!("{}/api/cli-handover", h.base);

        let bad_json = respond(ureq::post(&url).send_string("{not json"));
        assert_eq!(bad_json.status(), 400);

        let bad_base64 = respond(
            ureq::post(&url).send_json(serde_json::json!({"fileName": "a.txt", "data": "***"})),
        );
        assert_eq!(bad_base64.status(), 400);
        assert!(h.session.files.is_empty());
    }

    #[test]
    fn secondary_handover_reaches_a_live_primary() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("from-cli.txt");
        fs::write(&file, b"handed over").unwrap();

        let id = crate::instance::handover::send_file(&file, &h.base, &ShellConfig::default())
            .unwrap()
            .unwrap();

        let payload = h.session.files.get(&id).unwrap();
        assert_eq!(payload.data, b"handed over");
        assert!(payload.file_name.ends_with("from-cli.txt"));
    }

    #[test]
    fn open_file_by_path_inlines_images_and_names_the_file() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("img")).unwrap();
        fs::write(dir.path().join("img").join("photo.png"), PNG_BYTES).unwrap();
        let html_path = dir.path().join("my doc.html");
        fs::write(&html_path, r#"<p>hi</p><img src="img/photo.png">"#).unwrap();

        let url = format!(
            "{}/api/open-file?path={}",
            h.base,
            urlencoding::encode(&html_path.to_string_lossy())
        );
        let response = respond(ureq::get(&url).call());

        assert_eq!(response.status(), 200);
        assert_eq!(response.content_type(), "text/html");
        assert_eq!(response.header("X-File-Name"), Some("my%20doc.html"));
        let expected_path = urlencoding::encode(&html_path.to_string_lossy()).into_owned();
        assert_eq!(response.header("X-File-Path"), Some(expected_path.as_str()));
        let body = response.into_string().unwrap();
        assert!(body.contains("src=\"data:image/png;base64,"), "{body}");
    }

    #[test]
    fn open_file_reports_missing_sources() {
        let h = harness();

        let empty = respond(ureq::get(&format!("{}/api/open-file?path=", h.base)).call());
        assert_eq!(empty.status(), 400);

        let missing = respond(
            ureq::get(&format!("{}/api/open-file?path=%2Fno%2Fsuch%2Ffile.html", h.base)).call(),
        );
        assert_eq!(missing.status(), 404);
        assert!(missing.into_string().unwrap().starts_with("Failed to read file:"));

        let unknown = respond(ureq::get(&format!("{}/api/open-file?fileId=0000", h.base)).call());
        assert_eq!(unknown.status(), 404);
    }

    #[test]
    fn open_file_prefers_a_present_path_over_the_file_id() {
        let h = harness();
        let id = h.session.files.insert(HandoverPayload {
            file_name: "kept.txt".into(),
            data: b"kept".to_vec(),
        });

        let empty_path = respond(
            ureq::get(&format!("{}/api/open-file?path=&fileId={id}", h.base)).call(),
        );
        assert_eq!(empty_path.status(), 400);
        assert_eq!(empty_path.into_string().unwrap(), "Empty file path");
        assert!(!h.session.files.is_empty());

        let nothing = respond(ureq::get(&format!("{}/api/open-file", h.base)).call());
        assert_eq!(nothing.status(), 404);
        assert_eq!(nothing.into_string().unwrap(), "File ID not found");
    }

    #[test]
    fn screenshot_renders_and_forgets_the_token() {
        let h = harness();
        let url = format!("{}/api/export/screenshot", h.base);

        let response = respond(
            ureq::post(&url).send_json(serde_json::json!({"html": "<p>shot</p>", "width": 800})),
        );

        assert_eq!(response.status(), 200);
        assert_eq!(response.content_type(), "image/png");
        assert_eq!(body_bytes(response), PNG_BYTES);
        assert!(h.session.renders.is_empty());

        let view_url = h.engine.urls.lock().first().cloned().unwrap();
        assert!(view_url.starts_with(&format!("{}/api/render-view?token=", h.base)));
        assert_eq!(respond(ureq::get(&view_url).call()).status(), 404);
    }

    #[test]
    fn screenshot_validates_its_input() {
        let h = harness();
        let url = format!("{}/api/export/screenshot", h.base);

        let cases = [
            serde_json::json!({"html": "", "width": 800}),
            serde_json::json!({"html": "<p>x</p>", "width": 0}),
        ];
        for case in cases {
            assert_eq!(respond(ureq::post(&url).send_json(case)).status(), 400);
        }
        assert_eq!(respond(ureq::post(&url).send_string("nope")).status(), 400);
        assert!(h.engine.urls.lock().is_empty());
    }

    #[test]
    fn pdf_export_writes_the_file() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.pdf");
        let url = format!("{}/api/export/pdf", h.base);

        let response = respond(ureq::post(&url).send_json(serde_json::json!({
            "html": "<p>print me</p>",
            "path": target.to_string_lossy(),
            "scale": 0,
        })));

        assert_eq!(response.status(), 200);
        let written = fs::read_to_string(&target).unwrap();
        assert!(written.starts_with("%PDF scale=1 "), "{written}");
        assert!(written.contains("<p>print me</p>"));
        assert!(h.session.renders.is_empty());

        let missing = respond(ureq::post(&url).send_json(serde_json::json!({"html": "<p>x</p>"})));
        assert_eq!(missing.status(), 400);
    }

    #[test]
    fn stalled_pdf_export_fails_and_forgets_the_token() {
        let render = RenderConfig {
            pdf_timeout: Duration::from_millis(200),
            ..RenderConfig::default()
        };
        let engine = LoopbackEngine {
            stalls: true,
            ..LoopbackEngine::default()
        };
        let h = harness_with(FakeShell::default(), engine, render);
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never.pdf");

        let started = Instant::now();
        let response = respond(
            ureq::post(&format!("{}/api/export/pdf", h.base)).send_json(serde_json::json!({
                "html": "<p>stuck</p>",
                "path": target.to_string_lossy(),
            })),
        );

        assert_eq!(response.status(), 500);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!target.exists());
        assert!(h.session.renders.is_empty());

        let view_url = h.engine.urls.lock().first().cloned().unwrap();
        assert_eq!(respond(ureq::get(&view_url).call()).status(), 404);
    }

    fn post_save(h: &Harness, parts: &[(&str, Option<&str>, &[u8])]) -> ureq::Response {
        respond(
            ureq::post(&format!("{}/api/save-file", h.base))
                .set("Content-Type", &multipart::content_type())
                .send_bytes(&multipart::encode(parts)),
        )
    }

    fn saved_path(response: ureq::Response) -> PathBuf {
        let body: serde_json::Value = serde_json::from_str(&response.into_string().unwrap()).unwrap();
        PathBuf::from(body["path"].as_str().unwrap())
    }

    #[test]
    fn html_with_assets_is_saved_into_a_bundle() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let requested = dir.path().join("report.html");
        let requested = requested.to_string_lossy();

        let response = post_save(
            &h,
            &[
                ("filePath", None, requested.as_bytes()),
                ("html", Some("report.html"), b"<p>report</p>"),
                ("assets", Some("nested/logo.png"), PNG_BYTES),
            ],
        );

        assert_eq!(response.status(), 200);
        let bundle = dir.path().join("report");
        assert_eq!(saved_path(response), bundle.join("report.html"));
        assert_eq!(fs::read(bundle.join("report.html")).unwrap(), b"<p>report</p>");
        assert_eq!(fs::read(bundle.join("logo.png")).unwrap(), PNG_BYTES);
    }

    #[test]
    fn markdown_assets_go_to_the_sidecar_directory() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let requested = dir.path().join("notes.md");
        let requested = requested.to_string_lossy();

        let response = post_save(
            &h,
            &[
                ("filePath", None, requested.as_bytes()),
                ("html", Some("notes.md"), b"# notes"),
                ("assets", Some("chart.png"), PNG_BYTES),
            ],
        );

        assert_eq!(saved_path(response), dir.path().join("notes.md"));
        assert!(dir.path().join("notes_assets").join("chart.png").is_file());
    }

    #[test]
    fn saving_a_locked_document_releases_its_lock() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("draft.html");
        fs::write(&document, "old").unwrap();
        let lock_body = serde_json::json!({"path": document.to_string_lossy()});
        respond(ureq::post(&format!("{}/api/file/lock", h.base)).send_json(lock_body));
        assert!(h.session.locks.is_locked(&document));

        let requested = document.to_string_lossy();
        let response = post_save(
            &h,
            &[
                ("filePath", None, requested.as_bytes()),
                ("html", Some("draft.html"), b"new"),
            ],
        );

        assert_eq!(response.status(), 200);
        assert_eq!(fs::read_to_string(&document).unwrap(), "new");
        assert!(!h.session.locks.is_locked(&document));
    }

    /// A document path that can be opened for reading but not written.
    fn unwritable_document(dir: &Path) -> PathBuf {
        let path = dir.join("taken.html");
        if cfg!(windows) {
            fs::write(&path, "old").unwrap();
            let mut permissions = fs::metadata(&path).unwrap().permissions();
            permissions.set_readonly(true);
            fs::set_permissions(&path, permissions).unwrap();
        } else {
            fs::create_dir_all(&path).unwrap();
        }
        path
    }

    #[test]
    fn failed_document_write_is_a_json_error() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let blocked = unwritable_document(dir.path());
        let requested = blocked.to_string_lossy();

        let response = post_save(
            &h,
            &[
                ("filePath", None, requested.as_bytes()),
                ("html", Some("taken.html"), b"x"),
            ],
        );

        assert_eq!(response.status(), 500);
        let body: serde_json::Value = serde_json::from_str(&response.into_string().unwrap()).unwrap();
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Failed to write file:"), "{message}");
        assert!(message.ends_with("The file might be open in another program."));
    }

    #[test]
    fn failed_document_write_keeps_the_lock() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let blocked = unwritable_document(dir.path());
        h.session.locks.lock(&blocked);
        assert!(h.session.locks.is_locked(&blocked));
        let requested = blocked.to_string_lossy();

        let response = post_save(
            &h,
            &[
                ("filePath", None, requested.as_bytes()),
                ("html", Some("taken.html"), b"x"),
            ],
        );

        assert_eq!(response.status(), 500);
        assert!(h.session.locks.is_locked(&blocked));
    }

    #[test]
    fn save_without_a_path_is_rejected() {
        let h = harness();
        let response = post_save(&h, &[("html", Some("a.html"), b"x")]);
        assert_eq!(response.status(), 400);
        assert_eq!(response.into_string().unwrap(), "File path is empty");
    }

    #[test]
    fn lock_routes_are_idempotent_and_forgiving() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("a.html");
        fs::write(&document, "x").unwrap();
        let body = serde_json::json!({"path": document.to_string_lossy()});
        let lock_url = format!("{}/api/file/lock", h.base);
        let unlock_url = format!("{}/api/file/unlock", h.base);

        for _ in 0..2 {
            assert_eq!(respond(ureq::post(&lock_url).send_json(&body)).status(), 200);
        }
        assert_eq!(h.session.locks.len(), 1);

        for _ in 0..2 {
            assert_eq!(respond(ureq::post(&unlock_url).send_json(&body)).status(), 200);
        }
        assert!(h.session.locks.is_empty());

        assert_eq!(respond(ureq::post(&lock_url).send_string("garbage")).status(), 200);
        assert_eq!(respond(ureq::post(&lock_url).send_json(serde_json::json!({}))).status(), 200);
        assert!(h.session.locks.is_empty());
    }

    #[test]
    fn dialogs_report_the_chosen_path_or_empty() {
        let h = harness_with(
            FakeShell {
                open_path: Some(PathBuf::from("chosen.docx")),
                ..FakeShell::default()
            },
            LoopbackEngine::default(),
            RenderConfig::default(),
        );
        let open: serde_json::Value =
            respond(ureq::get(&format!("{}/api/dialog/open", h.base)).call())
                .into_json()
                .unwrap();
        assert_eq!(open["path"], "chosen.docx");

        let save: serde_json::Value =
            respond(ureq::get(&format!("{}/api/dialog/save?filter=pdf", h.base)).call())
                .into_json()
                .unwrap();
        assert_eq!(save["path"], "picked.pdf");

        let cancelled = harness();
        let open: serde_json::Value =
            respond(ureq::get(&format!("{}/api/dialog/open", cancelled.base)).call())
                .into_json()
                .unwrap();
        assert_eq!(open["path"], "");
    }

    #[test]
    fn preflight_and_cors_headers() {
        let h = harness();
        let preflight = respond(ureq::request("OPTIONS", &format!("{}/api/save-file", h.base)).call());
        assert_eq!(preflight.status(), 200);
        assert_eq!(preflight.header("Access-Control-Allow-Origin"), Some("*"));

        let index = respond(ureq::get(&format!("{}/", h.base)).call());
        assert_eq!(index.header("Access-Control-Allow-Methods"), Some("GET, POST, OPTIONS"));
        assert_eq!(index.into_string().unwrap(), "<html>editor</html>");
    }

    #[test]
    fn kill_releases_locks_and_terminates() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("a.html");
        fs::write(&document, "x").unwrap();
        h.session.locks.lock(&document);

        let response = respond(ureq::get(&format!("{}/api/kill", h.base)).call());

        assert_eq!(response.status(), 200);
        assert!(h.session.locks.is_empty());
        assert!(wait_until(|| h.killed.load(Ordering::SeqCst)));
    }

    #[test]
    fn query_components_are_decoded() {
        let (path, query) = split_url("/api/open-file?path=C%3A%5Cmy+docs%5Ca.html&x");
        assert_eq!(path, "/api/open-file");
        assert_eq!(query.get("path"), Some("C:\\my docs\\a.html"));
        assert_eq!(query.get("x"), Some(""));
        assert_eq!(query.get("fileId"), None);
        assert_eq!(display_name("C:\\my docs\\a.html"), "a.html");
    }
}
