//! HTTP control surface
//!
//! Exposes the workflow-facing endpoints over hyper: sensor monitoring
//! lifecycle, status introspection, snapshots, stored-photo queries and a
//! small debug echo. The callback URL for crossing notifications arrives in
//! the `CPEE-CALLBACK` header of the start request.

use crate::infra::config::Config;
use crate::io::camera::FrameCapture;
use crate::io::photos::PhotoStore;
use crate::services::monitor::MonitorController;
use crate::services::recorder::RecorderController;
use bytes::Bytes;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Header carrying the callback URL on registration, and echoed back to
/// announce that asynchronous callbacks will follow
const CPEE_CALLBACK_HEADER: &str = "CPEE-CALLBACK";

/// Everything the request handlers need
pub struct ServerContext {
    pub config: Config,
    pub monitor: Arc<MonitorController>,
    pub recorder: Arc<RecorderController>,
    pub photos: Arc<PhotoStore>,
    pub camera: Arc<dyn FrameCapture>,
}

/// Start the HTTP server and run it until shutdown is signalled
pub async fn serve(
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let ctx = ctx.clone();
                                async move { handle_request(req, ctx).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    ctx: Arc<ServerContext>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "http_body_read_failed");
            Bytes::new()
        }
    };
    Ok(route(&parts, body, &ctx).await)
}

/// Dispatch one request to its handler
pub(crate) async fn route(parts: &Parts, body: Bytes, ctx: &ServerContext) -> Response<Full<Bytes>> {
    match (&parts.method, parts.uri.path()) {
        (&Method::POST, "/start_sensor") => start_sensor(parts, ctx),
        (&Method::POST, "/stop_sensor") => stop_sensor(ctx).await,
        (&Method::GET, "/status") => status(ctx),
        (&Method::POST, "/start") => start_recorder(ctx),
        (&Method::POST, "/stop") => stop_recorder(ctx).await,
        (&Method::POST, "/snapshot") => snapshot(&body, ctx).await,
        (&Method::GET, "/latest") => latest_page(ctx),
        (&Method::GET, path) if path.starts_with("/images/") => {
            serve_image(&path["/images/".len()..], ctx).await
        }
        (&Method::POST, "/cleanup") => cleanup(&body, ctx),
        (&Method::POST, "/save_event_photos") => save_event_photos(&body, ctx),
        (_, "/debug") => debug_echo(parts, &body),
        _ => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
    }
}

fn json_response(status: StatusCode, value: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(value.to_string())))
        .expect("static response should not fail")
}

fn with_cpee_callback(mut resp: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    resp.headers_mut()
        .insert(HeaderName::from_static("cpee-callback"), HeaderValue::from_static("true"));
    resp
}

/// POST /start_sensor - register the callback URL and (if needed) launch
/// the monitoring task. Missing header rejects the request and leaves the
/// monitor untouched.
fn start_sensor(parts: &Parts, ctx: &ServerContext) -> Response<Full<Bytes>> {
    let callback_url = parts
        .headers
        .get(CPEE_CALLBACK_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(callback_url) = callback_url else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "Missing CPEE-CALLBACK header"}),
        );
    };

    info!(callback_url = %callback_url, "callback_registration_received");
    match ctx.monitor.start(callback_url) {
        Ok(_) => {
            // Announce that crossing events will arrive as callbacks
            with_cpee_callback(json_response(
                StatusCode::OK,
                json!({"status": "sensor_monitoring"}),
            ))
        }
        Err(e) => {
            error!(error = %e, "monitor_start_failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": e.to_string()}),
            )
        }
    }
}

async fn stop_sensor(ctx: &ServerContext) -> Response<Full<Bytes>> {
    ctx.monitor.stop().await;
    json_response(StatusCode::OK, json!({"status": "sensor_stopped"}))
}

fn status(ctx: &ServerContext) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        json!({
            "running": ctx.monitor.is_running(),
            "people_inside": ctx.monitor.people_inside(),
            "callback_url": ctx.monitor.callback_url(),
            "recording": ctx.recorder.is_recording(),
            "latest_photo": ctx.photos.latest(),
            "time": Utc::now().to_rfc3339(),
        }),
    )
}

fn start_recorder(ctx: &ServerContext) -> Response<Full<Bytes>> {
    if ctx.recorder.start() {
        json_response(
            StatusCode::OK,
            json!({"status": "started", "time": Utc::now().to_rfc3339()}),
        )
    } else {
        json_response(StatusCode::OK, json!({"status": "already_running"}))
    }
}

async fn stop_recorder(ctx: &ServerContext) -> Response<Full<Bytes>> {
    ctx.recorder.stop().await;
    json_response(StatusCode::OK, json!({"status": "stopped"}))
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotRequest {
    event: Option<String>,
}

/// POST /snapshot - capture one frame, optionally tagged with an event name
async fn snapshot(body: &Bytes, ctx: &ServerContext) -> Response<Full<Bytes>> {
    let event = serde_json::from_slice::<SnapshotRequest>(body)
        .unwrap_or_default()
        .event
        .unwrap_or_else(|| "manual".to_string());

    let filename = PhotoStore::snapshot_filename(&event, Local::now());
    let path = ctx.photos.dir().join(&filename);

    match ctx.camera.capture(&path).await {
        Ok(()) => {
            ctx.photos.set_latest(filename.clone());
            info!(file = %filename, event = %event, "snapshot_saved");
            json_response(
                StatusCode::CREATED,
                json!({
                    "status": "ok",
                    "file": filename,
                    "url": format!("/images/{filename}"),
                }),
            )
        }
        Err(e) => {
            error!(error = %e, "snapshot_failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"status": "error", "message": e.to_string()}),
            )
        }
    }
}

async fn serve_image(name: &str, ctx: &ServerContext) -> Response<Full<Bytes>> {
    let Some(path) = ctx.photos.resolve(name) else {
        return json_response(StatusCode::NOT_FOUND, json!({"error": "not found"}));
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "image/jpeg")
            .body(Full::new(Bytes::from(bytes)))
            .expect("static response should not fail"),
        Err(e) => {
            warn!(file = %name, error = %e, "image_read_failed");
            json_response(StatusCode::NOT_FOUND, json!({"error": "not found"}))
        }
    }
}

/// GET /latest - self-refreshing page showing the newest photo
fn latest_page(ctx: &ServerContext) -> Response<Full<Bytes>> {
    let body = match ctx.photos.latest() {
        Some(file) => {
            let updated = ctx
                .photos
                .modified(&file)
                .map(|mtime| {
                    DateTime::<Local>::from(mtime).format("%Y-%m-%d %H:%M:%S").to_string()
                })
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "<img src=\"/images/{file}\" alt=\"Latest snapshot\"/>\n      \
                 <div class=\"info\">File: {file} &nbsp; | &nbsp; Updated: {updated}</div>"
            )
        }
        None => "<div>No snapshot yet. Trigger POST /snapshot to take one.</div>".to_string(),
    };

    let html = format!(
        "<!doctype html>\n<html>\n  <head>\n    <meta charset=\"utf-8\"/>\n    \
         <title>Latest Snapshot</title>\n    <meta http-equiv=\"refresh\" content=\"2\">\n    \
         <style>\n      body {{ font-family: Arial, sans-serif; text-align: center; margin: 20px; }}\n      \
         img {{ max-width: 90vw; max-height: 80vh; border: 1px solid #ccc; }}\n      \
         .info {{ margin-top: 12px; color: #666; }}\n    </style>\n  </head>\n  <body>\n    \
         <h2>Latest Snapshot</h2>\n    {body}\n  </body>\n</html>\n"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(html)))
        .expect("static response should not fail")
}

#[derive(Debug, Deserialize)]
struct CleanupRequest {
    older_than: Option<u64>,
}

/// POST /cleanup - delete photos older than the given number of minutes
fn cleanup(body: &Bytes, ctx: &ServerContext) -> Response<Full<Bytes>> {
    let older_than_min = serde_json::from_slice::<CleanupRequest>(body)
        .ok()
        .and_then(|req| req.older_than)
        .unwrap_or_else(|| ctx.config.cleanup_older_than_min());

    match ctx.photos.cleanup_older_than(Duration::from_secs(older_than_min * 60)) {
        Ok(deleted) => {
            json_response(StatusCode::OK, json!({"status": "cleanup_done", "deleted": deleted}))
        }
        Err(e) => {
            error!(error = %e, "cleanup_failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"status": "error", "message": e.to_string()}),
            )
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SaveEventRequest {
    label: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
}

/// POST /save_event_photos - copy photos taken inside [start_time, end_time]
/// into a per-label subdirectory
fn save_event_photos(body: &Bytes, ctx: &ServerContext) -> Response<Full<Bytes>> {
    let req = serde_json::from_slice::<SaveEventRequest>(body).unwrap_or_default();

    let (Some(start_raw), Some(end_raw)) = (req.start_time, req.end_time) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "Missing start_time or end_time"}),
        );
    };

    let (Some(start), Some(end)) = (parse_iso(&start_raw), parse_iso(&end_raw)) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "Invalid datetime format"}),
        );
    };

    let label = req.label.unwrap_or_else(|| "event".to_string());
    match ctx.photos.copy_event_range(&label, start.into(), end.into()) {
        Ok(files) => json_response(
            StatusCode::OK,
            json!({
                "status": "saved",
                "label": label,
                "count": files.len(),
                "files": files,
            }),
        ),
        Err(e) => {
            error!(error = %e, "save_event_photos_failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"status": "error", "message": e.to_string()}),
            )
        }
    }
}

/// ANY /debug - log the request and announce a later callback
fn debug_echo(parts: &Parts, body: &Bytes) -> Response<Full<Bytes>> {
    info!(method = %parts.method, path = %parts.uri.path(), "debug_request");
    for (name, value) in parts.headers.iter() {
        debug!(header = %name, value = ?value, "debug_request_header");
    }
    if !body.is_empty() {
        debug!(body = %String::from_utf8_lossy(body), "debug_request_body");
    }

    with_cpee_callback(json_response(
        StatusCode::ACCEPTED,
        json!({"note": "Callback test triggered"}),
    ))
}

/// Parse an ISO-8601 timestamp, with or without an offset
///
/// Offset-free timestamps are interpreted in local time, matching the
/// clock used to stamp stored photos.
fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local.from_local_datetime(&naive).earliest().map(|dt| dt.with_timezone(&Utc))
}
