use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{attendance::AttendanceRecord, progress::ProgressRecord},
    error::RollcallResult,
    maud_conveniences::{Percentage, render_table, stat_card, subtitle, title},
    routes::student_profile,
    stats::{
        AttendanceSummary, LONG_WINDOW_DAYS, SHORT_WINDOW_DAYS, average_mark_percentage,
        window_start,
    },
    state::RollcallState,
};
use axum::extract::State;
use maud::{Markup, PreEscaped, html};

const RECENT_ATTENDANCE: u32 = 10;
const RECENT_PROGRESS: usize = 5;

pub async fn get_student_dashboard(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Markup> {
    let user = session
        .ensure_can(PermissionsTarget::VIEW_OWN_RECORDS, "/student/dashboard")?
        .clone();
    let profile = student_profile(&user)?;
    let today = state.today();

    let mut conn = state.get_connection().await?;
    let windowed = AttendanceRecord::for_student_since(
        user.id,
        window_start(today, LONG_WINDOW_DAYS),
        &mut conn,
    )
    .await?;
    let recent_attendance =
        AttendanceRecord::for_student(user.id, Some(RECENT_ATTENDANCE), &mut conn).await?;
    let progress = ProgressRecord::for_student(user.id, None, &mut conn).await?;
    drop(conn);

    let month = AttendanceSummary::over_window(&windowed, today, SHORT_WINDOW_DAYS);
    let two_months = AttendanceSummary::over_window(&windowed, today, LONG_WINDOW_DAYS);
    let average = average_mark_percentage(&progress, None);

    let attendance_rows = recent_attendance
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
        .take(RECENT_PROGRESS)
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

    Ok(state.render(session, html! {
        div class="container mx-auto flex flex-col space-y-8 max-w-5xl" {
            div {
                (title(html!{"Welcome, " (user)}))
                p class="text-gray-400" {"Roll number " (profile.roll_number) " - Class " (profile.class_name)}
            }

            div class="grid grid-cols-1 sm:grid-cols-3 gap-4" {
                (stat_card("Attendance (30 days)", Percentage(month.percentage())))
                (stat_card("Attendance (60 days)", Percentage(two_months.percentage())))
                (stat_card("Average mark", Percentage(average)))
            }

            div class="grid grid-cols-1 md:grid-cols-2 gap-4" {
                div class="bg-gray-800 rounded-lg p-4" {
                    (subtitle("Attendance over the last month"))
                    canvas id="attendance_chart" {}
                }
                div class="bg-gray-800 rounded-lg p-4" {
                    (subtitle("Marks"))
                    canvas id="progress_chart" {}
                }
            }

            (render_table("Recent Attendance", ["Date", "Status", "Remarks"], attendance_rows))
            (render_table("Recent Progress", ["Date", "Subject", "Assignment", "Marks", "Percentage", "Comments"], progress_rows))
        }

        script src="https://cdn.jsdelivr.net/npm/chart.js@4" {}
        script { (PreEscaped(CHART_SCRIPT)) }
    }))
}

const CHART_SCRIPT: &str = r#"
async function drawChart(url, id, type, label, max) {
    const response = await fetch(url);
    if (!response.ok) return;
    const { labels, data } = await response.json();
    new Chart(document.getElementById(id), {
        type,
        data: { labels, datasets: [{ label, data }] },
        options: { scales: { y: { beginAtZero: true, max } } },
    });
}
drawChart("/api/student-attendance-chart", "attendance_chart", "bar", "Present", 1);
drawChart("/api/progress-marks-chart", "progress_chart", "line", "Percentage", 100);
"#;
