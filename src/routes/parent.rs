use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{
        DataType,
        attendance::AttendanceRecord,
        notification::{NotificationStatus, SmsNotification},
        progress::ProgressRecord,
        user::User,
    },
    error::{MissingStudentSnafu, RollcallError, RollcallResult},
    maud_conveniences::{Percentage, render_table, stat_card, subtitle, title},
    routes::student_profile,
    stats::{AttendanceSummary, SHORT_WINDOW_DAYS, average_mark_percentage, window_start},
    state::RollcallState,
};
use axum::extract::{Path, State};
use maud::{Markup, html};
use snafu::OptionExt;
use uuid::Uuid;

const RECENT_ATTENDANCE: u32 = 30;

pub async fn get_parent_dashboard(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Markup> {
    let user = session
        .ensure_can(PermissionsTarget::VIEW_CHILD_RECORDS, "/parent/dashboard")?
        .clone();
    let today = state.today();

    let mut conn = state.get_connection().await?;
    let children = user.get_children(&mut conn).await?;

    let mut cards = Vec::with_capacity(children.len());
    for child in children {
        let attendance = AttendanceRecord::for_student_since(
            child.id,
            window_start(today, SHORT_WINDOW_DAYS),
            &mut conn,
        )
        .await?;
        let progress = ProgressRecord::for_student(child.id, None, &mut conn).await?;

        let summary = AttendanceSummary::over_window(&attendance, today, SHORT_WINDOW_DAYS);
        let average = average_mark_percentage(&progress, None);
        let class_name = child
            .student_profile()
            .map(|p| p.class_name.clone())
            .unwrap_or_default();

        cards.push(html! {
            a href={"/parent/student/" (child.id)} class="block rounded-lg shadow-md p-4 bg-gray-700 hover:bg-gray-600" {
                (subtitle(&child))
                p class="text-gray-400 mb-2" {"Class " (class_name)}
                div class="grid grid-cols-2 gap-2" {
                    (stat_card("Attendance (30 days)", Percentage(summary.percentage())))
                    (stat_card("Average mark", Percentage(average)))
                }
            }
        });
    }
    drop(conn);

    Ok(state.render(session, html! {
        div class="container mx-auto flex flex-col space-y-4 max-w-5xl" {
            (title(html!{"Welcome, " (user)}))
            @if cards.is_empty() {
                p class="text-gray-400" {"Your account isn't linked to any students yet. Please contact the school."}
            } @else {
                div class="grid grid-cols-1 md:grid-cols-2 gap-4" {
                    @for card in cards {
                        (card)
                    }
                }
            }
        }
    }))
}

pub async fn get_parent_view_student(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Path(student_id): Path<Uuid>,
) -> RollcallResult<Markup> {
    let user = session
        .ensure_can(
            PermissionsTarget::VIEW_CHILD_RECORDS,
            &format!("/parent/student/{student_id}"),
        )?
        .clone();

    if !user.is_parent_of(student_id) {
        warn!(parent = %user.username, %student_id, "Parent tried to view an unlinked student");
        return Err(RollcallError::NotLinkedToStudent { student_id });
    }

    let today = state.today();
    let mut conn = state.get_connection().await?;
    let student = User::get_from_db_by_id(student_id, &mut conn)
        .await?
        .context(MissingStudentSnafu { id: student_id })?;
    let profile = student_profile(&student)?.clone();

    let windowed = AttendanceRecord::for_student_since(
        student_id,
        window_start(today, SHORT_WINDOW_DAYS),
        &mut conn,
    )
    .await?;
    let attendance =
        AttendanceRecord::for_student(student_id, Some(RECENT_ATTENDANCE), &mut conn).await?;
    let progress = ProgressRecord::for_student(student_id, None, &mut conn).await?;
    let alerts = SmsNotification::for_parent_and_student(user.id, student_id, &mut conn).await?;
    drop(conn);

    let summary = AttendanceSummary::over_window(&windowed, today, SHORT_WINDOW_DAYS);
    let average = average_mark_percentage(&progress, None);

    let attendance_rows = attendance
        .into_iter()
        .map(|record| {
            [
                html! {(record.date)},
                html! {(record.status)},
                html! {(record.remarks.unwrap_or_default())},
            ]
        })
        .collect();
    let progress_rows = progress
        .into_iter()
        .map(|record| {
            [
                html! {(record.date)},
                html! {(record.subject)},
                html! {(record.assignment_name)},
                html! {(record.marks_obtained) " / " (record.total_marks)},
                html! {(Percentage(record.percentage))},
                html! {(record.comments.unwrap_or_default())},
            ]
        })
        .collect();
    let alert_rows = alerts
        .into_iter()
        .map(|alert| {
            let status = match alert.status {
                NotificationStatus::Sent => "Sent",
                NotificationStatus::Logged => "Not sent (SMS disabled)",
                NotificationStatus::Failed => "Failed",
            };
            [
                html! {(alert.created_at.strftime("%Y-%m-%d %H:%M"))},
                html! {(alert.phone)},
                html! {(status)},
            ]
        })
        .collect();

    Ok(state.render(session, html! {
        div class="container mx-auto flex flex-col space-y-8 max-w-5xl" {
            div {
                (title(&student))
                p class="text-gray-400" {"Roll number " (profile.roll_number) " - Class " (profile.class_name)}
            }
            div class="grid grid-cols-1 sm:grid-cols-2 gap-4" {
                (stat_card("Attendance (30 days)", Percentage(summary.percentage())))
                (stat_card("Average mark", Percentage(average)))
            }
            (render_table("Attendance", ["Date", "Status", "Remarks"], attendance_rows))
            (render_table("Progress", ["Date", "Subject", "Assignment", "Marks", "Percentage", "Comments"], progress_rows))
            (render_table("Absence Alerts", ["Sent at", "Phone", "Status"], alert_rows))
        }
    }))
}
