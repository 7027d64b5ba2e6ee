// =============================================================================
// HTML pages — dashboard, chart page, login / registration / logout
// =============================================================================
//
// Templates live in `templates/` and are compiled into the binary. They use
// `{{name}}` placeholders; values are HTML-escaped by the caller unless they
// are markup built here.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Form, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::accounts::AccountError;
use crate::api::auth::{clear_session_cookie, session_cookie, session_id, PageUser};
use crate::app_state::AppState;

const INDEX_HTML: &str = include_str!("../../templates/index.html");
const CANDLESTICK_HTML: &str = include_str!("../../templates/candlestick.html");
const LOGIN_HTML: &str = include_str!("../../templates/login.html");
const REGISTER_HTML: &str = include_str!("../../templates/register.html");

/// Substitute `{{name}}` placeholders in one pass. Inserted values are never
/// rescanned; unknown placeholders are left as-is.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            rest = &rest[open..];
            break;
        };
        let name = &after[..close];
        match vars.iter().find(|(var, _)| *var == name) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 4]),
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// Dashboard
// =============================================================================

pub async fn index(
    PageUser(username): PageUser,
    State(state): State<Arc<AppState>>,
) -> Html<String> {
    let rows: String = state
        .config
        .symbols
        .iter()
        .map(|symbol| {
            let upper = escape_html(&symbol.to_uppercase());
            let lower = escape_html(symbol);
            let (price, volume, change) = match state.ticks.get(symbol) {
                Some(t) => (
                    format!("{:.6}", t.price),
                    format!("{:.2}", t.volume),
                    format!("{:.2}%", t.percent_change),
                ),
                None => ("—".into(), "—".into(), "—".into()),
            };
            format!(
                "<tr id=\"row-{upper}\"><td><a href=\"/candlestick/{lower}\">{upper}</a></td>\
                 <td class=\"price\">{price}</td><td class=\"volume\">{volume}</td>\
                 <td class=\"change\">{change}</td></tr>\n"
            )
        })
        .collect();

    Html(render(
        INDEX_HTML,
        &[
            ("username", escape_html(&username).as_str()),
            ("rows", rows.as_str()),
        ],
    ))
}

pub async fn candlestick(
    PageUser(_username): PageUser,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    if !state.config.is_allowed(&symbol) {
        return (StatusCode::NOT_FOUND, "Invalid coin symbol").into_response();
    }
    let symbol = escape_html(&symbol.to_uppercase());
    Html(render(CANDLESTICK_HTML, &[("symbol", symbol.as_str())])).into_response()
}

// =============================================================================
// Login / registration / logout
// =============================================================================

#[derive(Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn login_page(status: StatusCode, message: &str) -> Response {
    let page = render(LOGIN_HTML, &[("error", escape_html(message).as_str())]);
    (status, Html(page)).into_response()
}

fn register_page(status: StatusCode, message: &str) -> Response {
    let page = render(REGISTER_HTML, &[("error", escape_html(message).as_str())]);
    (status, Html(page)).into_response()
}

pub async fn login_form() -> Response {
    login_page(StatusCode::OK, "")
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return login_page(StatusCode::BAD_REQUEST, "Username and password are required");
    }

    match state.users.verify(username, &form.password).await {
        Ok(true) => {
            let id = state.sessions.create(username);
            let cookie = session_cookie(&id, state.sessions.ttl().num_seconds());
            info!(username, "user logged in");
            ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
        }
        Ok(false) => {
            warn!(username, "login rejected: invalid credentials");
            login_page(StatusCode::UNAUTHORIZED, "Invalid username or password")
        }
        Err(e) => {
            error!(error = %e, "login failed");
            login_page(StatusCode::INTERNAL_SERVER_ERROR, "Login is temporarily unavailable")
        }
    }
}

pub async fn register_form() -> Response {
    register_page(StatusCode::OK, "")
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CredentialsForm>,
) -> Response {
    match state.users.register(&form.username, &form.password).await {
        Ok(()) => Redirect::to("/login").into_response(),
        Err(e @ AccountError::MissingCredentials) => {
            register_page(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e @ AccountError::UsernameTaken) => register_page(StatusCode::CONFLICT, &e.to_string()),
        Err(e) => {
            error!(error = %e, "registration failed");
            register_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration is temporarily unavailable",
            )
        }
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(session) = session_id(&headers).and_then(|id| state.sessions.destroy(&id)) {
        info!(username = %session.username, "user logged out");
    }
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}
