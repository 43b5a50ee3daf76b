use crate::{
    auth::{RollcallSession, backend::RollcallAuthCredentials},
    data::user::User,
    error::RollcallResult,
    maud_conveniences::{form_submit_button, simple_form_element, title},
    routes::{encode_query, safe_next},
    state::RollcallState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::html;
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct LoginOptions {
    pub next: Option<String>,
    pub login_failed: Option<bool>,
}

pub async fn get_login(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(LoginOptions { next, login_failed }): Query<LoginOptions>,
) -> RollcallResult<Response<Body>> {
    if User::count(&mut *state.get_connection().await?).await? == 0 {
        return Ok(Redirect::to("/onboarding").into_response());
    }

    if session.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let login_failed = login_failed.unwrap_or(false);
    let next = safe_next(next.as_deref()).map(ToString::to_string);

    Ok(state.render(session, html! {
        div class="bg-gray-800 shadow-md rounded px-8 pt-6 pb-8 mb-4 w-full max-w-sm" {
            (title("Login"))
            @if login_failed {
                div role="alert" class="bg-red-100 border border-red-400 text-red-700 px-4 py-4 rounded relative" {
                    strong class="font-bold" {"Alert!"}
                    br;
                    // avoid giving extra details for security reasons :)
                    span class="block sm:inline" {"Invalid username or password"}
                }
                br;
            }

            form method="post" {
                @if let Some(next) = next {
                    input type="hidden" name="next" value=(next) {}
                }
                (simple_form_element("login", "Username or Email", true, None, None))
                (simple_form_element("password", "Password", true, Some("password"), None))
                (form_submit_button(Some("Login")))
            }
        }
    }).into_response())
}

#[derive(Deserialize)]
pub struct LoginForm {
    login: String,
    password: SecretString,
    next: Option<String>,
}

pub async fn post_login(
    mut session: RollcallSession,
    Form(LoginForm {
        login,
        password,
        next,
    }): Form<LoginForm>,
) -> RollcallResult<Redirect> {
    let next = safe_next(next.as_deref());

    let Some(user) = session
        .authenticate(RollcallAuthCredentials::LoginPassword { login, password })
        .await?
    else {
        let mut redirect = "/login?login_failed=true".to_string();
        if let Some(next) = next {
            redirect += &format!("&next={}", encode_query(next));
        }
        return Ok(Redirect::to(&redirect));
    };

    session.login(&user).await?;
    info!(username = %user.username, role = %user.role(), "Logged in");

    let destination = next.unwrap_or_else(|| user.role().dashboard());
    Ok(if user.current_password_is_default {
        Redirect::to(&format!(
            "/replace_default_password?next={}",
            encode_query(destination)
        ))
    } else {
        Redirect::to(destination)
    })
}

pub async fn post_logout(mut session: RollcallSession) -> RollcallResult<impl IntoResponse> {
    session.logout().await?;
    Ok(Redirect::to("/login"))
}
