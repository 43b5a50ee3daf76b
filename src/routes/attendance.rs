use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{
        attendance::{AttendanceRecord, AttendanceStatus, MarkAttendance},
        empty_to_none, parse_date,
        user::User,
    },
    error::{CommitTransactionSnafu, RollcallError, RollcallResult},
    maud_conveniences::{form_submit_button, title},
    notify::{Absence, notify_absences},
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
use snafu::ResultExt;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct AttendanceQuery {
    date: Option<String>,
    saved: Option<usize>,
}

fn pick_date(date: Option<String>, today: Date) -> RollcallResult<Date> {
    let date = match date.and_then(empty_to_none) {
        Some(date) => parse_date(date)?,
        None => today,
    };
    if date > today {
        return Err(RollcallError::FutureAttendanceDate { date });
    }
    Ok(date)
}

pub async fn get_mark_attendance(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Query(AttendanceQuery { date, saved }): Query<AttendanceQuery>,
) -> RollcallResult<Markup> {
    let user = session
        .ensure_can(PermissionsTarget::MARK_ATTENDANCE, "/teacher/attendance")?
        .clone();
    let profile = teacher_profile(&user)?;
    let today = state.today();
    let date = pick_date(date, today)?;

    let mut conn = state.get_connection().await?;
    let students = User::get_students_in_class(&profile.class_name, &mut conn).await?;
    let existing = AttendanceRecord::for_class_on(&profile.class_name, date, &mut conn).await?;
    drop(conn);

    Ok(state.render(session, html! {
        div class="container mx-auto max-w-4xl bg-gray-800 p-8 rounded shadow-md" {
            (title(html!{"Attendance for " (profile.class_name)}))

            @if let Some(saved) = saved {
                div role="alert" class="bg-green-100 border border-green-400 text-green-700 px-4 py-3 rounded mb-4" {
                    "Saved attendance for " (saved) " student(s)."
                }
            }

            form method="get" class="flex flex-row items-end space-x-2 mb-4" {
                div {
                    label for="date_picker" class="block text-sm font-bold mb-2 text-gray-300" {"Date"}
                    input type="date" id="date_picker" name="date" value=(date) max=(today) class="shadow border rounded py-2 px-3 bg-gray-700 border-gray-600";
                }
                button type="submit" class="bg-slate-600 hover:bg-slate-800 font-bold py-2 px-4 rounded" {"Change date"}
            }

            @if students.is_empty() {
                p class="text-gray-400" {"There are no students in this class yet."}
            } @else {
                form method="post" {
                    input type="hidden" name="date" value=(date);
                    table class="min-w-full mb-4" {
                        thead class="bg-gray-700" {
                            tr {
                                th class="py-2 px-4 text-left" {"Roll"}
                                th class="py-2 px-4 text-left" {"Name"}
                                th class="py-2 px-4 text-left" {"Present"}
                                th class="py-2 px-4 text-left" {"Absent"}
                                th class="py-2 px-4 text-left" {"Remarks"}
                            }
                        }
                        tbody {
                            @for student in &students {
                                @let record = existing.get(&student.id);
                                @let status = record.map(|r| r.status);
                                tr class="border-b border-gray-600" {
                                    td class="py-2 px-4" {(student.student_profile().map(|p| p.roll_number.as_str()).unwrap_or_default())}
                                    td class="py-2 px-4" {(student)}
                                    td class="py-2 px-4" {
                                        input type="radio" name={"status_" (student.id)} value="present" checked[status == Some(AttendanceStatus::Present)];
                                    }
                                    td class="py-2 px-4" {
                                        input type="radio" name={"status_" (student.id)} value="absent" checked[status == Some(AttendanceStatus::Absent)];
                                    }
                                    td class="py-2 px-4" {
                                        input type="text" name={"remarks_" (student.id)} value=[record.and_then(|r| r.remarks.as_deref())] class="shadow border rounded w-full py-1 px-2 bg-gray-700 border-gray-600";
                                    }
                                }
                            }
                        }
                    }
                    (form_submit_button(Some("Save Attendance")))
                }
            }
        }
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RegisterEntry {
    student_id: Uuid,
    status: AttendanceStatus,
    remarks: Option<String>,
}

///pulls the date and the `status_<id>`/`remarks_<id>` pairs out of a submitted register.
///students left without a status aren't recorded.
fn parse_register(fields: Vec<(String, String)>) -> RollcallResult<(Option<String>, Vec<RegisterEntry>)> {
    let mut date = None;
    let mut statuses = Vec::new();
    let mut remarks = HashMap::new();

    for (key, value) in fields {
        if key == "date" {
            date = Some(value);
        } else if let Some(id) = key.strip_prefix("status_") {
            let student_id = Uuid::parse_str(id).map_err(|_| RollcallError::IncompleteForm)?;
            statuses.push((student_id, value.parse::<AttendanceStatus>()?));
        } else if let Some(id) = key.strip_prefix("remarks_") {
            let student_id = Uuid::parse_str(id).map_err(|_| RollcallError::IncompleteForm)?;
            if let Some(value) = empty_to_none(value) {
                remarks.insert(student_id, value);
            }
        }
    }

    let entries = statuses
        .into_iter()
        .map(|(student_id, status)| RegisterEntry {
            student_id,
            status,
            remarks: remarks.remove(&student_id),
        })
        .collect();

    Ok((date, entries))
}

pub async fn post_mark_attendance(
    State(state): State<RollcallState>,
    session: RollcallSession,
    Form(fields): Form<Vec<(String, String)>>,
) -> RollcallResult<Redirect> {
    let user = session.ensure_can(PermissionsTarget::MARK_ATTENDANCE, "/teacher/attendance")?;
    let profile = teacher_profile(user)?;

    let (date, entries) = parse_register(fields)?;
    let date = pick_date(date, state.today())?;

    let mut conn = state.get_transaction().await?;
    let class: HashMap<Uuid, User> =
        User::get_students_in_class(&profile.class_name, &mut conn)
            .await?
            .into_iter()
            .map(|student| (student.id, student))
            .collect();

    //nothing gets written unless every student is in this teacher's class
    if let Some(stranger) = entries.iter().find(|e| !class.contains_key(&e.student_id)) {
        warn!(teacher = %user.username, student_id = %stranger.student_id, "Tried to mark attendance outside own class");
        return Err(RollcallError::NotInClass {
            student_id: stranger.student_id,
            class_name: profile.class_name.clone(),
        });
    }

    let mut newly_absent = vec![];
    for entry in &entries {
        let outcome = AttendanceRecord::mark(
            MarkAttendance {
                student_id: entry.student_id,
                date,
                status: entry.status,
                remarks: entry.remarks.clone(),
                marked_by: user.id,
            },
            &mut conn,
        )
        .await?;

        if outcome.became_absent() {
            newly_absent.push((outcome.record_id, entry));
        }
    }
    conn.commit().await.context(CommitTransactionSnafu)?;

    info!(teacher = %user.username, %date, marked = entries.len(), absent = newly_absent.len(), "Saved attendance");
    state.send_sse_event(SseEvent::AttendanceMarked);

    //attendance is already saved, so the texts go out on their own and failures only get logged
    let absences: Vec<_> = newly_absent
        .into_iter()
        .filter_map(|(attendance_id, entry)| {
            class.get(&entry.student_id).map(|student| Absence {
                attendance_id,
                student: student.clone(),
                remarks: entry.remarks.clone(),
            })
        })
        .collect();
    if !absences.is_empty() {
        tokio::spawn(notify_absences(state.clone(), date, absences));
    }

    Ok(Redirect::to(&format!(
        "/teacher/attendance?date={date}&saved={}",
        entries.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;

    #[test]
    fn registers_pair_statuses_with_remarks() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let fields = vec![
            ("date".to_string(), "2025-03-07".to_string()),
            (format!("status_{a}"), "absent".to_string()),
            (format!("remarks_{a}"), " dentist ".to_string()),
            (format!("status_{b}"), "present".to_string()),
            (format!("remarks_{b}"), String::new()),
            (format!("remarks_{c}"), "no status given".to_string()),
        ];

        let (date, entries) = parse_register(fields).unwrap();
        assert_eq!(date.as_deref(), Some("2025-03-07"));
        assert_eq!(
            entries,
            vec![
                RegisterEntry {
                    student_id: a,
                    status: AttendanceStatus::Absent,
                    remarks: Some("dentist".into())
                },
                RegisterEntry {
                    student_id: b,
                    status: AttendanceStatus::Present,
                    remarks: None
                },
            ]
        );
    }

    #[test]
    fn unknown_statuses_are_rejected() {
        let fields = vec![(format!("status_{}", Uuid::new_v4()), "late".to_string())];
        assert!(matches!(
            parse_register(fields),
            Err(RollcallError::InvalidAttendanceStatus { .. })
        ));
    }

    #[test]
    fn future_dates_cannot_be_marked() {
        let today = date(2025, 3, 7);
        assert_eq!(pick_date(None, today).unwrap(), today);
        assert_eq!(
            pick_date(Some("2025-03-01".into()), today).unwrap(),
            date(2025, 3, 1)
        );
        assert!(matches!(
            pick_date(Some("2025-03-08".into()), today),
            Err(RollcallError::FutureAttendanceDate { .. })
        ));
    }
}
