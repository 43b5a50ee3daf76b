use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{attendance::AttendanceRecord, progress::ProgressRecord, user::User},
    error::RollcallResult,
    maud_conveniences::{Percentage, render_table, stat_card, title},
    routes::teacher_profile,
    state::RollcallState,
};
use axum::extract::State;
use maud::{Markup, html};
use std::collections::HashMap;

const RECENT_PROGRESS: u32 = 5;

pub async fn get_teacher_dashboard(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Markup> {
    let user = session
        .ensure_can(PermissionsTarget::MARK_ATTENDANCE, "/teacher/dashboard")?
        .clone();
    let profile = teacher_profile(&user)?;

    let mut conn = state.get_connection().await?;
    let students = User::get_students_in_class(&profile.class_name, &mut conn).await?;
    let recent = ProgressRecord::for_class(&profile.class_name, Some(RECENT_PROGRESS), &mut conn)
        .await?;
    drop(conn);

    let names: HashMap<_, _> = students.iter().map(|s| (s.id, s.full_name.as_str())).collect();
    let recent_rows = recent
        .into_iter()
        .map(|record| {
            [
                html! {(record.date)},
                html! {(names.get(&record.student_id).copied().unwrap_or("Unknown student"))},
                html! {(record.assignment_name)},
                html! {(Percentage(record.percentage))},
            ]
        })
        .collect();

    Ok(state.render(session, html! {
        div class="container mx-auto flex flex-col space-y-8 max-w-5xl" sse-connect="/sse_feed" {
            div {
                (title(html!{"Welcome, " (user)}))
                p class="text-gray-400" {
                    "Class " (profile.class_name)
                    @if !profile.subject.is_empty() {
                        " - " (profile.subject)
                    }
                }
            }

            div id="today_summary" hx-get="/internal/teacher/today_summary" hx-trigger="load, sse:attendance_marked" {}

            div class="flex flex-row flex-wrap gap-4" {
                a href="/teacher/attendance" class="bg-blue-600 hover:bg-blue-800 font-bold py-2 px-4 rounded" {"Mark Attendance"}
                a href="/teacher/progress" class="bg-blue-600 hover:bg-blue-800 font-bold py-2 px-4 rounded" {"Record Progress"}
                a href="/teacher/reports" class="bg-blue-600 hover:bg-blue-800 font-bold py-2 px-4 rounded" {"Reports"}
                a href="/people" class="bg-slate-600 hover:bg-slate-800 font-bold py-2 px-4 rounded" {"People"}
            }

            (render_table("Recently Recorded Progress", ["Date", "Student", "Assignment", "Percentage"], recent_rows))
        }
    }))
}

pub async fn internal_get_today_summary(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Markup> {
    let user = session.ensure_can(PermissionsTarget::MARK_ATTENDANCE, "/teacher/dashboard")?;
    let profile = teacher_profile(user)?;
    let today = state.today();

    let mut conn = state.get_connection().await?;
    let class_size = User::get_students_in_class(&profile.class_name, &mut conn)
        .await?
        .len();
    let (present, absent) =
        AttendanceRecord::count_for_class_on(&profile.class_name, today, &mut conn).await?;

    let unmarked = i64::try_from(class_size)
        .unwrap_or(i64::MAX)
        .saturating_sub(present + absent)
        .max(0);

    Ok(html! {
        div class="grid grid-cols-2 sm:grid-cols-4 gap-4" {
            (stat_card("Students", class_size))
            (stat_card("Present today", present))
            (stat_card("Absent today", absent))
            (stat_card("Not yet marked", unmarked))
        }
    })
}
