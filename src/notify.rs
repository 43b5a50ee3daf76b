use crate::{
    data::{
        notification::{NewSmsNotification, NotificationStatus, SmsNotification},
        user::User,
    },
    error::RollcallResult,
    state::RollcallState,
};
use async_trait::async_trait;
use futures::future::join_all;
use jiff::civil::Date;
use std::fmt::Debug;
use uuid::Uuid;

pub mod twilio;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsDelivery {
    Delivered { provider_id: Option<String> },
    LoggedOnly,
}

#[async_trait]
pub trait SmsGateway: Send + Sync + Debug {
    async fn send(&self, to: &str, body: &str) -> RollcallResult<SmsDelivery>;
}

///used when no SMS provider is configured
#[derive(Debug, Default)]
pub struct LogOnlyGateway;

#[async_trait]
impl SmsGateway for LogOnlyGateway {
    async fn send(&self, to: &str, body: &str) -> RollcallResult<SmsDelivery> {
        info!(%to, %body, "SMS provider not configured, logging message instead");
        Ok(SmsDelivery::LoggedOnly)
    }
}

pub fn absence_message(
    school_name: &str,
    student_name: &str,
    date: Date,
    remarks: Option<&str>,
) -> String {
    let mut body = format!("{school_name}: {student_name} was marked absent on {date}.");
    if let Some(remarks) = remarks.map(str::trim).filter(|r| !r.is_empty()) {
        body.push_str(" Remarks: ");
        body.push_str(remarks);
    }
    body
}

///a student who has just been marked absent
#[derive(Debug, Clone)]
pub struct Absence {
    pub attendance_id: Uuid,
    pub student: User,
    pub remarks: Option<String>,
}

///texts the parents of every student in `absences` at once. meant to be spawned, so it
///outlives the request that marked the register.
pub async fn notify_absences(state: RollcallState, date: Date, absences: Vec<Absence>) {
    let notifications = absences.iter().map(|absence| {
        let state = &state;
        async move {
            if let Err(e) = notify_parents_of_absence(
                state,
                absence.attendance_id,
                &absence.student,
                date,
                absence.remarks.as_deref(),
            )
            .await
            {
                error!(?e, student = %absence.student.username, "Unable to notify parents of absence");
            }
        }
    });
    join_all(notifications).await;
}

///sends one SMS to each linked parent with a phone number and records every attempt.
///gateway failures end up in the log table rather than in the returned error.
pub async fn notify_parents_of_absence(
    state: &RollcallState,
    attendance_id: Uuid,
    student: &User,
    date: Date,
    remarks: Option<&str>,
) -> RollcallResult<Vec<NotificationStatus>> {
    let parents = User::get_parents_of(student.id, &mut *state.get_connection().await?).await?;
    if parents.is_empty() {
        debug!(student = %student.username, "No linked parents to notify");
        return Ok(vec![]);
    }

    let body = absence_message(
        &state.config().school_config().name,
        &student.full_name,
        date,
        remarks,
    );
    let gateway = state.sms_gateway();

    let sends = parents.into_iter().filter_map(|parent| {
        let Some(phone) = parent.phone.clone() else {
            warn!(parent = %parent.username, student = %student.username, "Parent has no phone number, skipping absence SMS");
            return None;
        };
        let gateway = gateway.clone();
        let body = &body;

        Some(async move {
            let result = gateway.send(&phone, body).await;
            (parent, phone, result)
        })
    });
    let results = join_all(sends).await;

    let mut conn = state.get_connection().await?;
    let mut statuses = Vec::with_capacity(results.len());
    for (parent, phone, result) in results {
        let (status, provider_id, error) = match result {
            Ok(SmsDelivery::Delivered { provider_id }) => {
                info!(parent = %parent.username, ?provider_id, "Sent absence SMS");
                (NotificationStatus::Sent, provider_id, None)
            }
            Ok(SmsDelivery::LoggedOnly) => (NotificationStatus::Logged, None, None),
            Err(e) => {
                error!(?e, parent = %parent.username, "Unable to send absence SMS");
                (NotificationStatus::Failed, None, Some(e.to_string()))
            }
        };

        SmsNotification::record(
            NewSmsNotification {
                attendance_id,
                parent_id: parent.id,
                student_id: student.id,
                phone,
                body: body.clone(),
                status,
                provider_id,
                error,
            },
            &mut conn,
        )
        .await?;
        statuses.push(status);
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::attendance::{AttendanceRecord, AttendanceStatus, MarkAttendance},
        test_utils::{TestApp, add_parent, add_student, add_teacher, link},
    };
    use jiff::civil::date;

    #[test]
    fn message_mentions_school_student_and_date() {
        assert_eq!(
            absence_message("Hill College", "Ada Lovelace", date(2025, 3, 7), None),
            "Hill College: Ada Lovelace was marked absent on 2025-03-07."
        );
        assert_eq!(
            absence_message("Hill College", "Ada", date(2025, 3, 7), Some("  sick ")),
            "Hill College: Ada was marked absent on 2025-03-07. Remarks: sick"
        );
        assert_eq!(
            absence_message("Hill College", "Ada", date(2025, 3, 7), Some("   ")),
            "Hill College: Ada was marked absent on 2025-03-07."
        );
    }

    async fn absent_record(app: &TestApp, student: &User) -> Uuid {
        let teacher = add_teacher(&app.state, "mrs_t", "7A").await;
        AttendanceRecord::mark(
            MarkAttendance {
                student_id: student.id,
                date: date(2025, 3, 7),
                status: AttendanceStatus::Absent,
                remarks: None,
                marked_by: teacher.id,
            },
            &mut *app.state.get_connection().await.unwrap(),
        )
        .await
        .unwrap()
        .record_id
    }

    #[tokio::test]
    async fn every_parent_with_a_phone_gets_exactly_one_message() {
        let app = TestApp::new().await;
        let student = add_student(&app.state, "ada", "R-1", "7A").await;
        let mum = add_parent(&app.state, "mum", Some("+447700900001")).await;
        let dad = add_parent(&app.state, "dad", Some("+447700900002")).await;
        let no_phone = add_parent(&app.state, "gran", None).await;
        for parent in [&mum, &dad, &no_phone] {
            link(&app.state, parent, &student).await;
        }
        let attendance_id = absent_record(&app, &student).await;

        let statuses =
            notify_parents_of_absence(&app.state, attendance_id, &student, date(2025, 3, 7), None)
                .await
                .unwrap();
        assert_eq!(statuses, vec![NotificationStatus::Sent; 2]);

        let mut recipients = app.sms.recipients();
        recipients.sort();
        assert_eq!(recipients, vec!["+447700900001", "+447700900002"]);

        let logged =
            SmsNotification::for_attendance(attendance_id, &mut *app.state.get_connection().await.unwrap())
                .await
                .unwrap();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|n| n.body.contains("was marked absent on 2025-03-07")));
    }

    #[tokio::test]
    async fn gateway_failures_are_recorded_not_returned() {
        let app = TestApp::new().await;
        app.sms.fail_sends(true);
        let student = add_student(&app.state, "ada", "R-1", "7A").await;
        let mum = add_parent(&app.state, "mum", Some("+447700900001")).await;
        link(&app.state, &mum, &student).await;
        let attendance_id = absent_record(&app, &student).await;

        let statuses =
            notify_parents_of_absence(&app.state, attendance_id, &student, date(2025, 3, 7), None)
                .await
                .unwrap();
        assert_eq!(statuses, vec![NotificationStatus::Failed]);

        let logged = SmsNotification::for_parent_and_student(
            mum.id,
            student.id,
            &mut *app.state.get_connection().await.unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(logged.len(), 1);
        assert!(logged[0].error.is_some());
    }

    #[tokio::test]
    async fn every_absent_student_is_covered() {
        let app = TestApp::new().await;
        let teacher = add_teacher(&app.state, "mrs_t", "7A").await;
        let mut absences = vec![];
        for (name, roll, phone) in [("ada", "R-1", "+447700900001"), ("alan", "R-2", "+447700900002")] {
            let student = add_student(&app.state, name, roll, "7A").await;
            let parent = add_parent(&app.state, &format!("{name}_parent"), Some(phone)).await;
            link(&app.state, &parent, &student).await;
            let outcome = AttendanceRecord::mark(
                MarkAttendance {
                    student_id: student.id,
                    date: date(2025, 3, 7),
                    status: AttendanceStatus::Absent,
                    remarks: None,
                    marked_by: teacher.id,
                },
                &mut *app.state.get_connection().await.unwrap(),
            )
            .await
            .unwrap();
            absences.push(Absence {
                attendance_id: outcome.record_id,
                student,
                remarks: Some("dentist".into()),
            });
        }

        notify_absences(app.state.clone(), date(2025, 3, 7), absences).await;

        let mut recipients = app.sms.recipients();
        recipients.sort();
        assert_eq!(recipients, vec!["+447700900001", "+447700900002"]);
    }

    #[tokio::test]
    async fn log_only_gateway_never_fails() {
        let delivery = LogOnlyGateway.send("+447700900001", "hello").await.unwrap();
        assert_eq!(delivery, SmsDelivery::LoggedOnly);
    }
}
