/*
 * Responsibility
 * - GET  <LOGIN_PATH>  : ログインフォーム (Redirect 方式の遷移先)
 * - POST <LOGIN_PATH>  : form login → session に principal を保存 → 元の URL へ
 * - POST /logout       : session 破棄
 * - OAuth2 callback の着地点 (guard が先に応答するので通常は到達しない)
 */
use axum::{
    Extension, Form, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::error::AppError;
use crate::services::auth::{AuthError, redirect};
use crate::services::session::Session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub fn routes(login_path: &str) -> Router<AppState> {
    Router::new()
        .route(login_path, get(login_page).post(login_submit))
        .route("/logout", post(logout))
}

fn render_login(state: &AppState, error: Option<&str>) -> Html<String> {
    let error = error
        .map(|e| format!("<p role=\"alert\">{e}</p>"))
        .unwrap_or_default();

    Html(format!(
        "<!doctype html><html><head><title>{realm}</title></head><body>\
         <h1>Sign in to {realm}</h1>{error}\
         <form method=\"post\" action=\"{action}\">\
         <label>Username <input name=\"username\" autocomplete=\"username\"></label>\
         <label>Password <input name=\"password\" type=\"password\" autocomplete=\"current-password\"></label>\
         <button type=\"submit\">Sign in</button>\
         </form></body></html>",
        realm = state.auth_realm,
        action = state.login_path,
    ))
}

pub async fn login_page(State(state): State<AppState>) -> Html<String> {
    render_login(&state, None)
}

pub async fn login_submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match redirect::form_login(&state.credentials, &session, &form.username, &form.password).await {
        Ok(target) => Ok(Redirect::to(&target).into_response()),
        Err(AuthError::Unauthenticated { .. }) => Ok((
            StatusCode::UNAUTHORIZED,
            render_login(&state, Some("Invalid username or password.")),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Redirect, AppError> {
    redirect::logout(&session).await?;
    Ok(Redirect::to(&state.login_path))
}

pub async fn oauth2_callback_landing() -> Redirect {
    Redirect::to("/")
}
