//! ==============================================================================
//! server.rs - web server
//! ==============================================================================
//!
//! routes:
//!     POST /            uplink webhook from the network server (bearer token)
//!     GET  /            html dashboard, refreshes every 3s
//!     GET  /api/status  json snapshot
//!
//! relationships:
//!     - uses: pipeline.rs (all state lives there)
//!     - started by: main.rs
//!
//! ==============================================================================

use crate::dashboard::DashboardSnapshot;
use crate::pipeline::{Pipeline, UplinkRequest};

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub auth_token: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler).post(uplink_handler))
        .route("/api/status", get(api_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!("[STARTUP] ✓ Dashboard live at http://{}:{}", bind, port);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthFailure {
    /// header missing or not a bearer token
    Unauthorized,
    /// token present but wrong, or no token configured
    Forbidden,
}

pub fn check_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AuthFailure> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthFailure::Unauthorized)?;

    match expected {
        Some(expected) if token.trim() == expected => Ok(()),
        _ => Err(AuthFailure::Forbidden),
    }
}

async fn uplink_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UplinkRequest>, JsonRejection>,
) -> Response {
    if let Err(failure) = check_bearer(&headers, state.auth_token.as_deref()) {
        warn!("[AUTH] Rejected uplink: {:?}", failure);
        return match failure {
            AuthFailure::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))).into_response()
            }
            AuthFailure::Forbidden => {
                (StatusCode::FORBIDDEN, Json(json!({"error": "Forbidden"}))).into_response()
            }
        };
    }

    // body errors only surface to authenticated callers
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection.into_response(),
    };

    match state.pipeline.handle_uplink(&request).await {
        Ok(Some(report)) => Json(json!({
            "message": "OK",
            "status": report.reading.status_label,
            "device": report.device_name,
            "notification": report.outcome,
        }))
        .into_response(),
        Ok(None) => Json(json!({"message": "OK"})).into_response(),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn dashboard_handler(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.pipeline.snapshot().await;
    Html(render_dashboard(&snapshot))
}

/// json api endpoint for programmatic access
async fn api_handler(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.pipeline.snapshot().await)
}

pub fn render_dashboard(snapshot: &DashboardSnapshot) -> String {
    let current = &snapshot.current;

    let rows: String = snapshot
        .history
        .iter()
        .map(|event| {
            format!(
                r#"
                <tr>
                    <td>{}</td>
                    <td>{}</td>
                    <td><span class="dot" style="background-color: {}"></span>{}</td>
                    <td>{}</td>
                </tr>"#,
                html_escape(&event.time),
                html_escape(&event.device_name),
                html_escape(&event.status_color),
                html_escape(&event.status_label),
                html_escape(&event.battery_text),
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Mailbox Monitor</title>
    <meta charset="utf-8">
    <meta http-equiv="refresh" content="3">
    <style>
        body {{ font-family: 'Segoe UI', sans-serif; text-align: center; padding: 40px; background-color: #f0f2f5; }}
        .card {{ background: white; padding: 40px; border-radius: 15px; display: inline-block;
                 box-shadow: 0 4px 12px rgba(0,0,0,0.1); width: 480px; }}
        h1 {{ color: #333; margin-top: 0; }}
        .status-box {{ font-size: 32px; font-weight: bold; margin: 20px 0; padding: 20px;
                       color: white; border-radius: 10px; background-color: {status_color}; }}
        .battery {{ font-weight: bold; color: {battery_color}; }}
        .meta {{ color: #666; font-size: 13px; margin-bottom: 30px; }}
        table {{ width: 100%; border-collapse: collapse; margin-top: 20px; text-align: left; }}
        th {{ border-bottom: 2px solid #ddd; padding: 10px; color: #555; }}
        td {{ border-bottom: 1px solid #eee; padding: 10px; font-size: 14px; }}
        .dot {{ height: 10px; width: 10px; border-radius: 50%; display: inline-block; margin-right: 5px; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>Smart Mailbox</h1>
        <div class="status-box">{status}</div>
        <p>{device} &middot; Battery: <span class="battery">{battery}</span></p>
        <p class="meta">Last Update: {time}</p>

        <h3>Recent Activity</h3>
        <table>
            <tr><th>Time</th><th>Device</th><th>Event</th><th>Battery</th></tr>{rows}
        </table>
    </div>
</body>
</html>"#,
        status_color = html_escape(&current.status_color),
        battery_color = html_escape(&current.battery_color),
        status = html_escape(&current.status_label),
        device = html_escape(&current.device_name),
        battery = html_escape(&current.battery_text),
        time = html_escape(&current.time),
        rows = rows,
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}
