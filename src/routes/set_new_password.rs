use crate::{
    auth::{RollcallSession, add_password, verify_password},
    data::{DataType, user::User},
    error::{MissingUserSnafu, RollcallResult},
    maud_conveniences::{errors_list, title},
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
use bitflags::bitflags;
use maud::html;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::OptionExt;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct ReplaceDefaultPasswordValidationError: u8 {
        const SAME_AS_BEFORE = 0b0000_0001;
        const DIDNT_MATCH =    0b0000_0010;
        const EMPTY =          0b0000_0100;
    }
}

impl ReplaceDefaultPasswordValidationError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|e| match e {
            Self::SAME_AS_BEFORE => Some("Provided password was same as default"),
            Self::DIDNT_MATCH => Some("Provided passwords didn't match"),
            Self::EMPTY => Some("Provided password was empty"),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
pub struct SetPasswordQuery {
    next: Option<String>,
    validation_errors: Option<u8>,
}

pub async fn get_replace_default_password(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(SetPasswordQuery {
        next,
        validation_errors,
    }): Query<SetPasswordQuery>,
) -> Response<Body> {
    let Some(user) = session.user.as_ref() else {
        return Redirect::to("/login").into_response();
    };
    if !user.current_password_is_default {
        return Redirect::to("/").into_response();
    }
    let next = safe_next(next.as_deref())
        .unwrap_or_else(|| user.role().dashboard())
        .to_string();

    let validation_errors = validation_errors.map_or_else(
        ReplaceDefaultPasswordValidationError::empty,
        ReplaceDefaultPasswordValidationError::from_bits_truncate,
    );

    state.render(session, html!{
        div class="bg-gray-800 shadow-md rounded px-8 pt-6 pb-8 mb-4 w-full max-w-md" {
            (title("Replace Default Password"))
            p class="mb-4 text-gray-300" {"Your account is still using the password it was created with. Please choose a new one."}
            @if !validation_errors.is_empty() {
                (errors_list(None, validation_errors.as_nice_list()))
            }
            form method="post" {
                input type="hidden" id="next" name="next" value=(next);
                div class="mb-4" {
                    label for="new_password" class="block text-sm font-bold mb-2 text-gray-300" {"New Password"}
                    input required id="new_password" name="new_password" type="password" class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600";
                }
                div class="mb-4" {
                    label for="confirmed_password" class="block text-sm font-bold mb-2 text-gray-300" {"Confirm Password"}
                    input required id="confirmed_password" name="confirmed_password" type="password" class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600";
                }
                div class="flex items-center justify-between" {
                    button type="submit" class="bg-green-500 hover:bg-green-700 font-bold py-2 px-4 rounded focus:outline-none focus:shadow-outline" {"Set New Password"}
                }
            }
        }
    }).into_response()
}

#[derive(Deserialize)]
pub struct SetPasswordForm {
    next: Option<String>,
    new_password: SecretString,
    confirmed_password: SecretString,
}

pub async fn post_replace_default_password(
    State(state): State<RollcallState>,
    mut session: RollcallSession,
    Form(SetPasswordForm {
        next,
        new_password,
        confirmed_password,
    }): Form<SetPasswordForm>,
) -> RollcallResult<Redirect> {
    let Some(user) = session.user.clone() else {
        return Ok(Redirect::to("/login"));
    };
    if !user.current_password_is_default {
        return Ok(Redirect::to("/"));
    }
    let next = safe_next(next.as_deref()).unwrap_or_else(|| user.role().dashboard());

    let mut errors = ReplaceDefaultPasswordValidationError::empty();
    if new_password.expose_secret() != confirmed_password.expose_secret() {
        errors |= ReplaceDefaultPasswordValidationError::DIDNT_MATCH;
    }
    if new_password.expose_secret().trim().is_empty() {
        errors |= ReplaceDefaultPasswordValidationError::EMPTY;
    }
    if let Some(hash) = user.bcrypt_hashed_password.clone()
        && verify_password(new_password.clone(), hash).await?
    {
        errors |= ReplaceDefaultPasswordValidationError::SAME_AS_BEFORE;
    }

    if !errors.is_empty() {
        return Ok(Redirect::to(&format!(
            "/replace_default_password?next={}&validation_errors={}",
            encode_query(next),
            errors.bits()
        )));
    }

    let mut conn = state.get_connection().await?;
    add_password(
        user.id,
        new_password,
        state.config().auth_config().bcrypt_cost,
        &mut conn,
        false,
    )
    .await?;
    let user = User::get_from_db_by_id(user.id, &mut conn)
        .await?
        .context(MissingUserSnafu { id: user.id })?;
    drop(conn);

    //the session hash is the password hash, so the session needs refreshing
    session.login(&user).await?;
    info!(username = %user.username, "Replaced default password");

    Ok(Redirect::to(next))
}
