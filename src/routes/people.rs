use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{
        DataType, IdForm, empty_to_none,
        user::{AddPerson, AddUserKind, Role, StudentProfile, TeacherProfile, User, UserKind},
    },
    error::{CommitTransactionSnafu, EmailSnafu, MissingUserSnafu, RollcallError, RollcallResult},
    maud_conveniences::{
        Email, errors_list, form_element, form_submit_button, simple_form_element, subtitle, title,
    },
    routes::sse::SseEvent,
    state::RollcallState,
};
use axum::{
    Form,
    extract::{Query, State},
};
use email_address::EmailAddress;
use maud::{Markup, html};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::str::FromStr;
use uuid::Uuid;

pub async fn get_people(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    Ok(state.render(session, html! {
        div class="mx-auto bg-gray-800 p-8 rounded shadow-md max-w-6xl w-full flex flex-col space-y-4" {
            div sse-connect="/sse_feed" class="container flex flex-row justify-center space-x-4" {
                div id="all_people" class="w-1/2" hx-get="/internal/get_people" hx-trigger="load, sse:people_changed" {}
                div id="in_focus" class="w-1/2" {}
            }
        }
    }))
}

fn person_card(person: &User) -> Markup {
    html! {
        a hx-get="/internal/get_person" hx-target="#in_focus" hx-vals={"{\"id\": \"" (person.id) "\"}"} class="block rounded-lg shadow-md p-4 text-center bg-gray-700 hover:bg-gray-600 cursor-pointer" {
            (person)
            @if let Some(profile) = person.student_profile() {
                p class="text-sm text-gray-400" {(profile.roll_number) " - " (profile.class_name)}
            }
            @if let Some(profile) = person.teacher_profile() {
                p class="text-sm text-gray-400" {(profile.class_name)}
            }
        }
    }
}

pub async fn internal_get_people(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    let mut conn = state.get_connection().await?;
    let teachers = User::get_all_with_role(Role::Teacher, &mut conn).await?;
    let students = User::get_all_with_role(Role::Student, &mut conn).await?;
    let parents = User::get_all_with_role(Role::Parent, &mut conn).await?;
    drop(conn);

    let sections = [
        ("Teachers", "/internal/people/new_teacher_form", "Add new Teacher", teachers),
        ("Students", "/internal/people/new_student_form", "Add new Student", students),
        ("Parents", "/internal/people/new_parent_form", "Add new Parent", parents),
    ];

    Ok(html! {
        div class="container mx-auto flex flex-col space-y-8" {
            @for (heading, form_url, button_text, people) in sections {
                div {
                    div class="flex flex-row items-center justify-between" {
                        (title(heading))
                        button class="bg-blue-600 hover:bg-blue-800 font-bold py-2 px-4 rounded" hx-get=(form_url) hx-target="#in_focus" {
                            (button_text)
                        }
                    }
                    @if people.is_empty() {
                        p class="text-gray-400 italic" {"Nobody yet"}
                    }
                    div class="grid grid-cols-1 sm:grid-cols-2 md:grid-cols-3 gap-4" {
                        @for person in &people {
                            (person_card(person))
                        }
                    }
                }
            }
        }
    })
}

fn new_person_form(heading: &str, put_url: &str, extra_fields: Markup) -> Markup {
    html! {
        (title(heading))

        form hx-put=(put_url) hx-trigger="submit" hx-target="#in_focus" class="p-4" {
            (simple_form_element("full_name", "Full Name", true, None, None))
            (simple_form_element("email", "Email", true, Some("email"), None))
            (simple_form_element("phone", "Phone (for absence texts)", false, Some("tel"), None))
            (extra_fields)
            (form_submit_button(Some("Add Person")))
        }
    }
}

pub async fn internal_get_add_student_form(session: RollcallSession) -> RollcallResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    Ok(new_person_form(
        "Add New Student",
        "/internal/people/new_student_form",
        html! {
            (simple_form_element("roll_number", "Roll Number (also their username)", true, None, None))
            (simple_form_element("class_name", "Class", true, None, None))
        },
    ))
}

pub async fn internal_get_add_parent_form(session: RollcallSession) -> RollcallResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    Ok(new_person_form(
        "Add New Parent",
        "/internal/people/new_parent_form",
        html! {
            p class="text-sm text-gray-400 mb-4" {"Their username will be the part of their email before the @."}
        },
    ))
}

pub async fn internal_get_add_teacher_form(session: RollcallSession) -> RollcallResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    Ok(new_person_form(
        "Add New Teacher",
        "/internal/people/new_teacher_form",
        html! {
            (simple_form_element("username", "Username", true, None, None))
            (simple_form_element("class_name", "Class", true, None, None))
            (simple_form_element("subject", "Subject", false, None, None))
        },
    ))
}

#[derive(Deserialize)]
pub struct NewPersonForm {
    full_name: String,
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    roll_number: String,
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    subject: String,
}

///parents sign in with whatever comes before the @ in their email
fn parent_username(email: &EmailAddress) -> String {
    email.local_part().to_string()
}

///builds the account from the form, or says which required field was missing
fn person_from_form(
    form: NewPersonForm,
    role: Role,
    password: SecretString,
    bcrypt_cost: u32,
) -> RollcallResult<AddPerson> {
    let NewPersonForm {
        full_name,
        email,
        phone,
        username,
        roll_number,
        class_name,
        subject,
    } = form;

    let full_name = full_name.trim().to_string();
    let class_name = class_name.trim().to_string();
    let email = EmailAddress::from_str(email.trim()).context(EmailSnafu)?;

    let (username, kind) = match role {
        Role::Student => {
            let roll_number = roll_number.trim().to_string();
            (
                roll_number.clone(),
                AddUserKind::Student(StudentProfile {
                    roll_number,
                    class_name: class_name.clone(),
                }),
            )
        }
        Role::Parent => (parent_username(&email), AddUserKind::Parent),
        Role::Teacher => (
            username.trim().to_string(),
            AddUserKind::Teacher(TeacherProfile {
                class_name: class_name.clone(),
                subject: subject.trim().to_string(),
            }),
        ),
    };

    if full_name.is_empty() || username.is_empty() || (role != Role::Parent && class_name.is_empty())
    {
        return Err(RollcallError::IncompleteForm);
    }

    Ok(AddPerson {
        username,
        email,
        full_name,
        phone: empty_to_none(phone),
        password: Some(password),
        current_password_is_default: true,
        bcrypt_cost,
        kind,
    })
}

async fn put_new_person(
    state: RollcallState,
    session: RollcallSession,
    form: NewPersonForm,
    role: Role,
) -> RollcallResult<Markup> {
    let creator = session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    let auth_config = state.config().auth_config();
    let password = auth_config.generate();
    let to_be_added = person_from_form(form, role, password.clone(), auth_config.bcrypt_cost)?;

    let mut conn = state.get_transaction().await?;
    let id = User::insert_into_database(to_be_added, &mut conn).await?;
    conn.commit().await.context(CommitTransactionSnafu)?;
    info!(by = %creator.username, %id, %role, "Teacher added account");
    state.send_sse_event(SseEvent::PeopleChanged);

    internal_get_person_in_detail(
        State(state.clone()),
        session,
        Query(InDetailForm {
            id,
            new_password: Some(password),
        }),
    )
    .await
}

pub async fn internal_put_new_student(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Form(form): Form<NewPersonForm>,
) -> RollcallResult<Markup> {
    put_new_person(state, session, form, Role::Student).await
}

pub async fn internal_put_new_parent(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Form(form): Form<NewPersonForm>,
) -> RollcallResult<Markup> {
    put_new_person(state, session, form, Role::Parent).await
}

pub async fn internal_put_new_teacher(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Form(form): Form<NewPersonForm>,
) -> RollcallResult<Markup> {
    put_new_person(state, session, form, Role::Teacher).await
}

pub async fn delete_person(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RollcallResult<Markup> {
    let user = session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    if user.id == id {
        return Ok(errors_list(
            Some("Unable to delete"),
            std::iter::once("You can't delete your own account."),
        ));
    }

    User::remove_from_database(id, &mut *state.get_connection().await?).await?;
    info!(by = %user.username, %id, "Deleted account");
    state.send_sse_event(SseEvent::PeopleChanged);

    Ok(html! {})
}

#[derive(Deserialize)]
pub struct InDetailForm {
    pub id: Uuid,
    pub new_password: Option<SecretString>,
}

pub async fn internal_get_person_in_detail(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(InDetailForm { id, new_password }): Query<InDetailForm>,
) -> RollcallResult<Markup> {
    let viewer = session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    let mut conn = state.get_connection().await?;
    let person = User::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingUserSnafu { id })?;

    let related = match &person.kind {
        UserKind::Student(_) => User::get_parents_of(person.id, &mut conn).await?,
        UserKind::Parent { .. } => person.get_children(&mut conn).await?,
        UserKind::Teacher(_) => vec![],
    };
    let linkable_students = if person.role() == Role::Parent {
        User::get_all_with_role(Role::Student, &mut conn)
            .await?
            .into_iter()
            .filter(|student| !person.is_parent_of(student.id))
            .collect()
    } else {
        vec![]
    };
    drop(conn);

    Ok(html! {
        div class="container mx-auto" {
            (title(&person))

            div class="rounded-lg shadow-md overflow-hidden bg-gray-800 max-w-md mx-auto" {
                div class="p-4 flex flex-col space-y-2" {
                    p class="text-gray-200 font-semibold" {
                        (person.role()) ", username "
                        span class="font-medium font-mono" {(person.username)}
                    }

                    @if let Some(new_password) = new_password {
                        div class="py-2" {
                            p class="text-gray-200 font-semibold" {
                                "Default Password (not shown again): "
                                span class="font-medium font-mono" {(new_password.expose_secret())}
                            }
                        }
                    }

                    (Email(&person.email))
                    @if let Some(phone) = &person.phone {
                        p class="text-gray-300" {"Phone: " (phone)}
                    }

                    @match &person.kind {
                        UserKind::Student(profile) => {
                            p class="text-gray-300" {"Roll number " (profile.roll_number) ", class " (profile.class_name)}
                            (subtitle("Parents"))
                        }
                        UserKind::Teacher(profile) => {
                            p class="text-gray-300" {"Teaches " (profile.class_name)}
                            @if !profile.subject.is_empty() {
                                p class="text-gray-300" {"Subject: " (profile.subject)}
                            }
                        }
                        UserKind::Parent { .. } => {
                            (subtitle("Children"))
                        }
                    }
                    @if person.role() != Role::Teacher {
                        @if related.is_empty() {
                            p class="text-gray-400 italic" {"None linked"}
                        }
                        ul class="list-disc list-inside" {
                            @for other in &related {
                                li {(other)}
                            }
                        }
                    }

                    @if !linkable_students.is_empty() {
                        form hx-post="/internal/people/link" hx-target="#in_focus" class="pt-4" {
                            input type="hidden" name="parent_id" value=(person.id);
                            (form_element("student_id", "Link to student", html!{
                                select id="student_id" name="student_id" class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600" {
                                    @for student in &linkable_students {
                                        option value=(student.id) {
                                            (student) " (" (student.student_profile().map(|p| p.roll_number.as_str()).unwrap_or_default()) ")"
                                        }
                                    }
                                }
                            }))
                            (form_submit_button(Some("Link")))
                        }
                    }

                    @if viewer.id != person.id {
                        button class="bg-red-600 hover:bg-red-800 font-bold py-2 px-4 rounded" hx-delete="/people" hx-vals={"{\"id\": \"" (id) "\"}"} hx-target="#in_focus" hx-confirm="Delete this account and all of its records?" {
                            "Delete person"
                        }
                    }
                }
            }
        }
    })
}

#[derive(Deserialize)]
pub struct LinkForm {
    parent_id: Uuid,
    student_id: Uuid,
}

pub async fn internal_post_link(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Form(LinkForm {
        parent_id,
        student_id,
    }): Form<LinkForm>,
) -> RollcallResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS, "/people")?;

    User::link_parent_to_student(parent_id, student_id, &mut *state.get_connection().await?)
        .await?;
    state.send_sse_event(SseEvent::PeopleChanged);

    internal_get_person_in_detail(
        State(state.clone()),
        session,
        Query(InDetailForm {
            id: parent_id,
            new_password: None,
        }),
    )
    .await
}
