use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{
        DataType, IdForm, empty_to_none, parse_date,
        progress::{AddProgress, ProgressRecord, ProgressValidationError},
        user::{TeacherProfile, User},
    },
    error::{MissingProgressRecordSnafu, RollcallError, RollcallResult},
    maud_conveniences::{
        Percentage, errors_list, form_element, form_submit_button, simple_form_element, title,
    },
    routes::{sse::SseEvent, teacher_profile},
    state::RollcallState,
};
use axum::{
    Form,
    extract::{Query, State},
    response::Redirect,
};
use jiff::civil::Date;
use maud::{Markup, html};
use serde::Deserialize;
use snafu::OptionExt;
use std::collections::HashMap;
use uuid::Uuid;

const CLASS_PROGRESS_SHOWN: u32 = 50;
const DEFAULT_TOTAL_MARKS: &str = "100";

#[derive(Deserialize)]
pub struct ProgressQuery {
    errors: Option<u8>,
    saved: Option<bool>,
}

///marks can be fractional, so no stepping
fn mark_input(id: &str, label: &str, value: Option<&str>) -> Markup {
    form_element(
        id,
        label,
        html! {
            input required id=(id) name=(id) type="number" min="0" step="any" value=[value] class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600";
        },
    )
}

fn subject_for(profile: &TeacherProfile) -> &str {
    let subject = profile.subject.trim();
    if subject.is_empty() { "General" } else { subject }
}

pub async fn get_progress(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(ProgressQuery { errors, saved }): Query<ProgressQuery>,
) -> RollcallResult<Markup> {
    let user = session
        .ensure_can(PermissionsTarget::RECORD_PROGRESS, "/teacher/progress")?
        .clone();
    let profile = teacher_profile(&user)?;
    let errors = errors.map(ProgressValidationError::from_bits_truncate);
    let today = state.today();

    let mut conn = state.get_connection().await?;
    let students = User::get_students_in_class(&profile.class_name, &mut conn).await?;
    let records =
        ProgressRecord::for_class(&profile.class_name, Some(CLASS_PROGRESS_SHOWN), &mut conn)
            .await?;
    drop(conn);

    let names: HashMap<_, _> = students
        .iter()
        .map(|s| (s.id, s.full_name.as_str()))
        .collect();

    Ok(state.render(session, html! {
        div class="container mx-auto flex flex-col space-y-8 max-w-5xl" {
            div class="bg-gray-800 p-8 rounded shadow-md" {
                (title(html!{"Record " (subject_for(profile)) " progress for " (profile.class_name)}))

                @if let Some(errors) = errors.filter(|e| !e.is_empty()) {
                    (errors_list(None, errors.messages().into_iter()))
                }
                @if saved == Some(true) {
                    div role="alert" class="bg-green-100 border border-green-400 text-green-700 px-4 py-3 rounded mb-4" {
                        "Progress saved."
                    }
                }

                @if students.is_empty() {
                    p class="text-gray-400" {"There are no students in this class yet."}
                } @else {
                    form method="post" {
                        (form_element("student_id", "Student", html!{
                            select id="student_id" name="student_id" required class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600" {
                                @for student in &students {
                                    option value=(student.id) {
                                        (student.student_profile().map(|p| p.roll_number.as_str()).unwrap_or_default()) " - " (student)
                                    }
                                }
                            }
                        }))
                        (simple_form_element("assignment_name", "Assignment", true, None, None))
                        div class="grid grid-cols-2 gap-4" {
                            (mark_input("marks_obtained", "Marks obtained", None))
                            (mark_input("total_marks", "Total marks", Some(DEFAULT_TOTAL_MARKS)))
                        }
                        (simple_form_element("date", "Date", true, Some("date"), Some(&today.to_string())))
                        (form_element("comments", "Comments", html!{
                            textarea id="comments" name="comments" rows="3" class="shadow appearance-none border rounded w-full py-2 px-3 leading-tight focus:outline-none focus:shadow-outline bg-gray-700 border-gray-600" {}
                        }))
                        (form_submit_button(Some("Save Progress")))
                    }
                }
            }

            div {
                (title("Class Progress"))
                table class="min-w-full bg-gray-800 rounded shadow-md" {
                    thead class="bg-gray-700" {
                        tr {
                            @for heading in ["Date", "Student", "Subject", "Assignment", "Marks", "Percentage", ""] {
                                th class="py-2 px-4 text-left font-semibold text-gray-300" {(heading)}
                            }
                        }
                    }
                    tbody {
                        @for record in records {
                            tr {
                                td class="py-2 px-4 border-b border-gray-600" {(record.date)}
                                td class="py-2 px-4 border-b border-gray-600" {(names.get(&record.student_id).copied().unwrap_or("Unknown student"))}
                                td class="py-2 px-4 border-b border-gray-600" {(record.subject)}
                                td class="py-2 px-4 border-b border-gray-600" {(record.assignment_name)}
                                td class="py-2 px-4 border-b border-gray-600" {(record.marks_obtained) " / " (record.total_marks)}
                                td class="py-2 px-4 border-b border-gray-600" {(Percentage(record.percentage))}
                                td class="py-2 px-4 border-b border-gray-600" {
                                    @if record.teacher_id == Some(user.id) {
                                        button class="bg-red-600 hover:bg-red-800 font-bold py-1 px-2 rounded" hx-delete="/teacher/progress" hx-vals={"{\"id\": \"" (record.id) "\"}"} hx-target="closest tr" hx-swap="outerHTML" hx-confirm="Delete this record?" {
                                            "Delete"
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }))
}

#[derive(Deserialize)]
pub struct ProgressForm {
    student_id: String,
    assignment_name: String,
    marks_obtained: String,
    #[serde(default = "default_total_marks")]
    total_marks: String,
    date: String,
    #[serde(default)]
    comments: String,
}

fn default_total_marks() -> String {
    DEFAULT_TOTAL_MARKS.to_string()
}

fn parse_mark(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

///turns the submitted form into something insertable, collecting everything wrong with it on the way
fn check_progress_form(
    form: ProgressForm,
    class: &[User],
    teacher_id: Uuid,
    subject: &str,
    today: Date,
) -> Result<AddProgress, ProgressValidationError> {
    let mut errors = ProgressValidationError::empty();

    let student_id = Uuid::parse_str(form.student_id.trim())
        .ok()
        .filter(|id| class.iter().any(|s| &s.id == id));
    if student_id.is_none() {
        errors |= ProgressValidationError::UNKNOWN_STUDENT;
    }

    let date = parse_date(form.date).ok().filter(|date| *date <= today);
    if date.is_none() {
        errors |= ProgressValidationError::BAD_DATE;
    }

    let to_be_added = AddProgress {
        student_id: student_id.unwrap_or_default(),
        teacher_id,
        subject: subject.to_string(),
        assignment_name: form.assignment_name,
        marks_obtained: parse_mark(&form.marks_obtained),
        total_marks: parse_mark(&form.total_marks),
        comments: empty_to_none(form.comments),
        date: date.unwrap_or(today),
    };
    errors |= to_be_added.validate();

    if errors.is_empty() {
        Ok(to_be_added)
    } else {
        Err(errors)
    }
}

pub async fn post_progress(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Form(form): Form<ProgressForm>,
) -> RollcallResult<Redirect> {
    let user = session.ensure_can(PermissionsTarget::RECORD_PROGRESS, "/teacher/progress")?;
    let profile = teacher_profile(user)?;

    let mut conn = state.get_connection().await?;
    let class = User::get_students_in_class(&profile.class_name, &mut conn).await?;

    let to_be_added = match check_progress_form(
        form,
        &class,
        user.id,
        subject_for(profile),
        state.today(),
    ) {
        Ok(to_be_added) => to_be_added,
        Err(errors) => {
            return Ok(Redirect::to(&format!(
                "/teacher/progress?errors={}",
                errors.bits()
            )));
        }
    };

    let student_id = to_be_added.student_id;
    let id = ProgressRecord::insert_into_database(to_be_added, &mut conn).await?;
    drop(conn);

    info!(teacher = %user.username, %student_id, %id, "Recorded progress");
    state.send_sse_event(SseEvent::ProgressRecorded);

    Ok(Redirect::to("/teacher/progress?saved=true"))
}

pub async fn delete_progress(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(IdForm { id }): Query<IdForm>,
) -> RollcallResult<Markup> {
    let user = session.ensure_can(PermissionsTarget::RECORD_PROGRESS, "/teacher/progress")?;

    let mut conn = state.get_connection().await?;
    let record = ProgressRecord::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingProgressRecordSnafu { id })?;

    if record.teacher_id != Some(user.id) {
        warn!(teacher = %user.username, %id, "Tried to delete someone else's progress record");
        return Err(RollcallError::NotRecordedByYou { id });
    }

    ProgressRecord::remove_from_database(id, &mut conn).await?;
    drop(conn);

    info!(teacher = %user.username, %id, "Deleted progress record");
    state.send_sse_event(SseEvent::ProgressRecorded);

    Ok(html! {})
}
