use crate::{
    auth::RollcallSession,
    data::{
        DataType, empty_to_none,
        user::{AddPerson, AddUserKind, TeacherProfile, User},
    },
    error::{CommitTransactionSnafu, MissingUserSnafu, RollcallResult},
    maud_conveniences::{errors_list, form_submit_button, simple_form_element, supertitle},
    state::RollcallState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use bitflags::bitflags;
use email_address::EmailAddress;
use maud::html;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::str::FromStr;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    struct FirstTeacherDetailsError: u16 {
        const EMPTY_FULL_NAME =   0b0000_0000_0000_0001;
        const EMPTY_USERNAME =    0b0000_0000_0000_0010;
        const EMPTY_PASSWORD =    0b0000_0000_0000_0100;
        const EMPTY_CLASS =       0b0000_0000_0000_1000;
        const INVALID_EMAIL =     0b0000_0000_0001_0000;

        const MISMATCH_PASSWORD = 0b0000_0000_0010_0000;
    }
}

impl FirstTeacherDetailsError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|x| match x {
            Self::EMPTY_FULL_NAME => Some("Provided name was empty"),
            Self::EMPTY_USERNAME => Some("Provided username was empty"),
            Self::EMPTY_PASSWORD => Some("Provided password was empty"),
            Self::EMPTY_CLASS => Some("Provided class was empty"),
            Self::INVALID_EMAIL => Some("Provided email address wasn't valid"),
            Self::MISMATCH_PASSWORD => Some("Passwords didn't match"),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
pub struct OnboardingQuery {
    errors: Option<u16>,
}

pub async fn get_onboarding(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(OnboardingQuery { errors }): Query<OnboardingQuery>,
) -> RollcallResult<Response<Body>> {
    //only for the very first account
    if User::count(&mut *state.get_connection().await?).await? > 0 {
        return Ok(Redirect::to("/").into_response());
    }

    let errors = errors.map_or_else(
        FirstTeacherDetailsError::empty,
        FirstTeacherDetailsError::from_bits_truncate,
    );

    Ok(state.render(session, html! {
        div class="flex items-center justify-center" {
            div class="bg-gray-800 p-8 rounded-lg shadow-xl w-full max-w-md" {
                (supertitle("Create the first Teacher account"))

                @if !errors.is_empty() {
                    (errors_list(None, errors.as_nice_list()))
                }

                form method="post" {
                    (simple_form_element("full_name", "Full Name", true, None, None))
                    (simple_form_element("username", "Username", true, None, None))
                    (simple_form_element("email", "Email", true, Some("email"), None))
                    (simple_form_element("phone", "Phone", false, Some("tel"), None))
                    (simple_form_element("class_name", "Class", true, None, None))
                    (simple_form_element("subject", "Subject", false, None, None))
                    (simple_form_element("password", "Password", true, Some("password"), None))
                    (simple_form_element("confirm_password", "Confirm Password", true, Some("password"), None))
                    (form_submit_button(Some("Create Teacher")))
                }
            }
        }
    }).into_response())
}

#[derive(Deserialize)]
pub struct FirstTeacherForm {
    full_name: String,
    username: String,
    email: String,
    #[serde(default)]
    phone: String,
    class_name: String,
    #[serde(default)]
    subject: String,
    password: SecretString,
    confirm_password: SecretString,
}

pub async fn post_onboarding(
    State(state): State<RollcallState>,
    mut session: RollcallSession,
    Form(FirstTeacherForm {
        full_name,
        username,
        email,
        phone,
        class_name,
        subject,
        password,
        confirm_password,
    }): Form<FirstTeacherForm>,
) -> RollcallResult<Redirect> {
    let mut conn = state.get_transaction().await?;

    if User::count(&mut conn).await? > 0 {
        return Ok(Redirect::to("/"));
    }

    let mut errors = FirstTeacherDetailsError::empty();
    if full_name.trim().is_empty() {
        errors |= FirstTeacherDetailsError::EMPTY_FULL_NAME;
    }
    if username.trim().is_empty() {
        errors |= FirstTeacherDetailsError::EMPTY_USERNAME;
    }
    if class_name.trim().is_empty() {
        errors |= FirstTeacherDetailsError::EMPTY_CLASS;
    }
    if password.expose_secret().trim().is_empty() {
        errors |= FirstTeacherDetailsError::EMPTY_PASSWORD;
    }
    if password.expose_secret() != confirm_password.expose_secret() {
        errors |= FirstTeacherDetailsError::MISMATCH_PASSWORD;
    }
    let email = EmailAddress::from_str(email.trim()).ok();
    if email.is_none() {
        errors |= FirstTeacherDetailsError::INVALID_EMAIL;
    }

    let (false, Some(email)) = (!errors.is_empty(), email) else {
        return Ok(Redirect::to(&format!(
            "/onboarding?errors={}",
            errors.bits()
        )));
    };

    let id = User::insert_into_database(
        AddPerson {
            username: username.trim().to_string(),
            email,
            full_name: full_name.trim().to_string(),
            phone: empty_to_none(phone),
            password: Some(password),
            current_password_is_default: false,
            bcrypt_cost: state.config().auth_config().bcrypt_cost,
            kind: AddUserKind::Teacher(TeacherProfile {
                class_name: class_name.trim().to_string(),
                subject: subject.trim().to_string(),
            }),
        },
        &mut conn,
    )
    .await?;

    let user = User::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingUserSnafu { id })?;
    conn.commit().await.context(CommitTransactionSnafu)?;

    session.login(&user).await?;
    info!(username = %user.username, "Created first teacher account");

    Ok(Redirect::to("/teacher/dashboard"))
}
