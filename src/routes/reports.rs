use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{attendance::AttendanceRecord, progress::ProgressRecord, user::User},
    error::{CsvSnafu, IoSnafu, RollcallResult, ZipSnafu},
    maud_conveniences::{Percentage, render_table},
    routes::teacher_profile,
    state::RollcallState,
    stats::{AttendanceSummary, SHORT_WINDOW_DAYS, average_mark_percentage, round_2dp},
};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use jiff::civil::Date;
use maud::{Markup, html};
use serde::Serialize;
use snafu::ResultExt;
use std::{
    collections::HashMap,
    io::{Cursor, Write},
};
use uuid::Uuid;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct StudentReport {
    pub roll_number: String,
    pub name: String,
    pub attendance_percentage: f64,
    pub average_mark: f64,
}

fn class_report(
    students: &[User],
    attendance: &[AttendanceRecord],
    progress: &[ProgressRecord],
    today: Date,
) -> Vec<StudentReport> {
    students
        .iter()
        .map(|student| {
            let summary = AttendanceSummary::over_window(
                attendance.iter().filter(|r| r.student_id == student.id),
                today,
                SHORT_WINDOW_DAYS,
            );
            let average = average_mark_percentage(
                progress.iter().filter(|r| r.student_id == student.id),
                None,
            );

            StudentReport {
                roll_number: roll_number(student).to_string(),
                name: student.full_name.clone(),
                attendance_percentage: round_2dp(summary.percentage()),
                average_mark: round_2dp(average),
            }
        })
        .collect()
}

fn roll_number(student: &User) -> &str {
    student
        .student_profile()
        .map(|p| p.roll_number.as_str())
        .unwrap_or_default()
}

pub async fn get_reports(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Markup> {
    let user = session
        .ensure_can(PermissionsTarget::VIEW_CLASS_REPORTS, "/teacher/reports")?
        .clone();
    let profile = teacher_profile(&user)?;

    let mut conn = state.get_connection().await?;
    let students = User::get_students_in_class(&profile.class_name, &mut conn).await?;
    let attendance = AttendanceRecord::for_class(&profile.class_name, &mut conn).await?;
    let progress = ProgressRecord::for_class(&profile.class_name, None, &mut conn).await?;
    drop(conn);

    let rows = class_report(&students, &attendance, &progress, state.today())
        .into_iter()
        .map(|report| {
            [
                html! {(report.roll_number)},
                html! {(report.name)},
                html! {(Percentage(report.attendance_percentage))},
                html! {(Percentage(report.average_mark))},
            ]
        })
        .collect();

    Ok(state.render(session, html! {
        div class="container mx-auto flex flex-col space-y-4 max-w-5xl" {
            div class="flex flex-row items-center justify-between" {
                p class="text-gray-400" {"Class " (profile.class_name)}
                a href="/teacher/reports/export" class="bg-blue-600 hover:bg-blue-800 font-bold py-2 px-4 rounded" {"Export CSVs"}
            }
            (render_table("Class Report", ["Roll", "Name", "Attendance (30 days)", "Average mark"], rows))
        }
    }))
}

#[derive(Serialize)]
struct AttendanceCsvRow<'a> {
    date: String,
    roll_number: &'a str,
    student: &'a str,
    status: &'static str,
    remarks: &'a str,
}

#[derive(Serialize)]
struct ProgressCsvRow<'a> {
    date: String,
    roll_number: &'a str,
    student: &'a str,
    subject: &'a str,
    assignment: &'a str,
    marks_obtained: f64,
    total_marks: f64,
    percentage: f64,
    comments: &'a str,
}

fn write_csv<T: Serialize>(rows: impl IntoIterator<Item = T>) -> RollcallResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for row in rows {
        writer.serialize(row).context(CsvSnafu)?;
    }
    writer.into_inner().map_err(|e| e.into_error()).context(IoSnafu)
}

///zips up `attendance.csv` and `progress.csv`
fn build_export(
    students: &[User],
    attendance: &[AttendanceRecord],
    progress: &[ProgressRecord],
) -> RollcallResult<Vec<u8>> {
    let students: HashMap<Uuid, &User> = students.iter().map(|s| (s.id, s)).collect();
    let lookup = |id: &Uuid| {
        students
            .get(id)
            .map_or(("", "Unknown student"), |s| (roll_number(s), s.full_name.as_str()))
    };

    let attendance_csv = write_csv(attendance.iter().map(|record| {
        let (roll_number, student) = lookup(&record.student_id);
        AttendanceCsvRow {
            date: record.date.to_string(),
            roll_number,
            student,
            status: record.status.as_str(),
            remarks: record.remarks.as_deref().unwrap_or_default(),
        }
    }))?;
    let progress_csv = write_csv(progress.iter().map(|record| {
        let (roll_number, student) = lookup(&record.student_id);
        ProgressCsvRow {
            date: record.date.to_string(),
            roll_number,
            student,
            subject: &record.subject,
            assignment: &record.assignment_name,
            marks_obtained: record.marks_obtained,
            total_marks: record.total_marks,
            percentage: round_2dp(record.percentage),
            comments: record.comments.as_deref().unwrap_or_default(),
        }
    }))?;

    let mut contents = vec![];
    let mut zip = ZipWriter::new(Cursor::new(&mut contents));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("attendance.csv", options).context(ZipSnafu)?;
    zip.write_all(&attendance_csv).context(IoSnafu)?;
    zip.start_file("progress.csv", options).context(ZipSnafu)?;
    zip.write_all(&progress_csv).context(IoSnafu)?;
    zip.finish().context(ZipSnafu)?;

    Ok(contents)
}

pub async fn get_export(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Response> {
    let user = session.ensure_can(PermissionsTarget::EXPORT_CSVS, "/teacher/reports")?;
    let profile = teacher_profile(user)?;

    let mut conn = state.get_connection().await?;
    let students = User::get_students_in_class(&profile.class_name, &mut conn).await?;
    let attendance = AttendanceRecord::for_class(&profile.class_name, &mut conn).await?;
    let progress = ProgressRecord::for_class(&profile.class_name, None, &mut conn).await?;
    drop(conn);

    let contents = build_export(&students, &attendance, &progress)?;
    info!(teacher = %user.username, class = %profile.class_name, bytes = contents.len(), "Exported class records");

    let class_slug: String = profile
        .class_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let disposition = format!(
        "attachment; filename=\"rollcall_{class_slug}_{}.zip\"",
        state.today()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        contents,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        DataType,
        attendance::{AttendanceStatus, MarkAttendance},
        progress::AddProgress,
    };
    use crate::test_utils::{add_student, add_teacher, test_state};
    use jiff::civil::date;
    use std::io::Read;

    #[tokio::test]
    async fn reports_and_exports_cover_the_class() {
        let state = test_state().await;
        let teacher = add_teacher(&state, "ms_w", "8B").await;
        let ada = add_student(&state, "ada", "R-1", "8B").await;
        let bo = add_student(&state, "bo", "R-2", "8B").await;
        let today = date(2025, 6, 10);

        let mut conn = state.get_connection().await.unwrap();
        for (day, status) in [(9, AttendanceStatus::Present), (10, AttendanceStatus::Absent)] {
            AttendanceRecord::mark(
                MarkAttendance {
                    student_id: ada.id,
                    date: date(2025, 6, day),
                    status,
                    remarks: None,
                    marked_by: teacher.id,
                },
                &mut conn,
            )
            .await
            .unwrap();
        }
        ProgressRecord::insert_into_database(
            AddProgress {
                student_id: ada.id,
                teacher_id: teacher.id,
                subject: "Maths".into(),
                assignment_name: "Angles, part 1".into(),
                marks_obtained: 2.0,
                total_marks: 3.0,
                comments: Some("good \"effort\"".into()),
                date: date(2025, 6, 9),
            },
            &mut conn,
        )
        .await
        .unwrap();

        let students = User::get_students_in_class("8B", &mut conn).await.unwrap();
        let attendance = AttendanceRecord::for_class("8B", &mut conn).await.unwrap();
        let progress = ProgressRecord::for_class("8B", None, &mut conn).await.unwrap();
        drop(conn);

        let report = class_report(&students, &attendance, &progress, today);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].roll_number, "R-1");
        assert!((report[0].attendance_percentage - 50.0).abs() < 1e-9);
        assert!((report[0].average_mark - 66.67).abs() < 1e-9);
        assert_eq!(report[1].name, bo.full_name);
        assert!(report[1].attendance_percentage.abs() < f64::EPSILON);

        let zipped = build_export(&students, &attendance, &progress).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut attendance_csv = String::new();
        archive
            .by_name("attendance.csv")
            .unwrap()
            .read_to_string(&mut attendance_csv)
            .unwrap();
        assert!(attendance_csv.starts_with("date,roll_number,student,status,remarks"));
        assert!(attendance_csv.contains("2025-06-10,R-1,"));
        assert!(attendance_csv.contains("absent"));

        let mut progress_csv = String::new();
        archive
            .by_name("progress.csv")
            .unwrap()
            .read_to_string(&mut progress_csv)
            .unwrap();
        assert!(progress_csv.contains("\"Angles, part 1\""));
        assert!(progress_csv.contains("66.67"));
    }
}
