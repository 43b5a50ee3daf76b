use crate::{
    data::parse_timestamp,
    error::{MakeQuerySnafu, RollcallResult},
};
use jiff::Timestamp;
use snafu::ResultExt;
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    ///accepted by the SMS provider
    Sent,
    ///no provider configured, so the message only went to the logs
    Logged,
    Failed,
}

impl NotificationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Logged => "logged",
            Self::Failed => "failed",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "logged" => Self::Logged,
            _ => Self::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmsNotification {
    pub id: Uuid,
    pub attendance_id: Uuid,
    pub parent_id: Uuid,
    pub student_id: Uuid,
    pub phone: String,
    pub body: String,
    pub status: NotificationStatus,
    pub provider_id: Option<String>,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    attendance_id: Uuid,
    parent_id: Uuid,
    student_id: Uuid,
    phone: String,
    body: String,
    status: String,
    provider_id: Option<String>,
    error: Option<String>,
    created_at: String,
}

pub struct NewSmsNotification {
    pub attendance_id: Uuid,
    pub parent_id: Uuid,
    pub student_id: Uuid,
    pub phone: String,
    pub body: String,
    pub status: NotificationStatus,
    pub provider_id: Option<String>,
    pub error: Option<String>,
}

impl SmsNotification {
    pub async fn record(
        new: NewSmsNotification,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO sms_notifications (id, attendance_id, parent_id, student_id, phone, body, status, provider_id, error, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")
            .bind(id)
            .bind(new.attendance_id)
            .bind(new.parent_id)
            .bind(new.student_id)
            .bind(new.phone)
            .bind(new.body)
            .bind(new.status.as_str())
            .bind(new.provider_id)
            .bind(new.error)
            .bind(Timestamp::now().to_string())
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(id)
    }

    ///the alerts a given parent has had about a given student, newest first
    pub async fn for_parent_and_student(
        parent_id: Uuid,
        student_id: Uuid,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM sms_notifications WHERE parent_id = ? AND student_id = ? ORDER BY created_at DESC",
        )
        .bind(parent_id)
        .bind(student_id)
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?
        .into_iter()
        .map(Self::try_from_row)
        .collect()
    }

    #[cfg(test)]
    pub async fn for_attendance(
        attendance_id: Uuid,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM sms_notifications WHERE attendance_id = ? ORDER BY created_at ASC",
        )
        .bind(attendance_id)
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?
        .into_iter()
        .map(Self::try_from_row)
        .collect()
    }

    fn try_from_row(row: NotificationRow) -> RollcallResult<Self> {
        Ok(Self {
            id: row.id,
            attendance_id: row.attendance_id,
            parent_id: row.parent_id,
            student_id: row.student_id,
            phone: row.phone,
            body: row.body,
            status: NotificationStatus::from_db(&row.status),
            provider_id: row.provider_id,
            error: row.error,
            created_at: parse_timestamp(row.created_at)?,
        })
    }
}
