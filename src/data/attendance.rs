use crate::{
    data::{parse_date, parse_timestamp},
    error::{MakeQuerySnafu, RollcallError, RollcallResult},
};
use jiff::{Timestamp, civil::Date};
use serde::Serialize;
use snafu::ResultExt;
use sqlx::{FromRow, SqliteConnection};
use std::{collections::HashMap, fmt::Display, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub const fn from_present(present: bool) -> Self {
        if present { Self::Present } else { Self::Absent }
    }

    pub const fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            _ => Err(RollcallError::InvalidAttendanceStatus {
                provided: s.to_string(),
            }),
        }
    }
}

impl Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: Date,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub marked_by: Option<Uuid>,
    pub marked_at: Timestamp,
}

#[derive(FromRow)]
struct AttendanceRow {
    id: Uuid,
    student_id: Uuid,
    date: String,
    present: bool,
    remarks: Option<String>,
    marked_by: Option<Uuid>,
    marked_at: String,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = RollcallError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            student_id: row.student_id,
            date: parse_date(row.date)?,
            status: AttendanceStatus::from_present(row.present),
            remarks: row.remarks,
            marked_by: row.marked_by,
            marked_at: parse_timestamp(row.marked_at)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MarkAttendance {
    pub student_id: Uuid,
    pub date: Date,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub marked_by: Uuid,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MarkOutcome {
    pub record_id: Uuid,
    pub previous: Option<AttendanceStatus>,
    pub status: AttendanceStatus,
}

impl MarkOutcome {
    ///true when this marking is the one that made the student absent, which is when parents get told
    pub fn became_absent(&self) -> bool {
        self.status == AttendanceStatus::Absent && self.previous != Some(AttendanceStatus::Absent)
    }
}

const SELECT_ATTENDANCE: &str =
    "SELECT id, student_id, date, present, remarks, marked_by, marked_at FROM attendance";

fn convert_all(rows: Vec<AttendanceRow>) -> RollcallResult<Vec<AttendanceRecord>> {
    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

impl AttendanceRecord {
    ///inserts or replaces the single record for that student on that date
    pub async fn mark(
        form: MarkAttendance,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<MarkOutcome> {
        let MarkAttendance {
            student_id,
            date,
            status,
            remarks,
            marked_by,
        } = form;
        let date_str = date.to_string();
        let marked_at = Timestamp::now().to_string();

        let existing = sqlx::query_as::<_, (Uuid, bool)>(
            "SELECT id, present FROM attendance WHERE student_id = ? AND date = ?",
        )
        .bind(student_id)
        .bind(&date_str)
        .fetch_optional(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        let (record_id, previous) = if let Some((id, was_present)) = existing {
            sqlx::query(
                "UPDATE attendance SET present = ?, remarks = ?, marked_by = ?, marked_at = ? WHERE id = ?",
            )
            .bind(status.is_present())
            .bind(remarks)
            .bind(marked_by)
            .bind(marked_at)
            .bind(id)
            .execute(&mut *conn)
            .await
            .context(MakeQuerySnafu)?;

            (id, Some(AttendanceStatus::from_present(was_present)))
        } else {
            let id = Uuid::new_v4();
            sqlx::query("INSERT INTO attendance (id, student_id, date, present, remarks, marked_by, marked_at) VALUES (?, ?, ?, ?, ?, ?, ?)")
                .bind(id)
                .bind(student_id)
                .bind(&date_str)
                .bind(status.is_present())
                .bind(remarks)
                .bind(marked_by)
                .bind(marked_at)
                .execute(&mut *conn)
                .await
                .context(MakeQuerySnafu)?;

            (id, None)
        };

        Ok(MarkOutcome {
            record_id,
            previous,
            status,
        })
    }

    ///most recent first
    pub async fn for_student(
        student_id: Uuid,
        limit: Option<u32>,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "{SELECT_ATTENDANCE} WHERE student_id = ? ORDER BY date DESC LIMIT ?"
        ))
        .bind(student_id)
        .bind(limit.map_or(-1, i64::from))
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        convert_all(rows)
    }

    ///records on or after `since`, oldest first
    pub async fn for_student_since(
        student_id: Uuid,
        since: Date,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "{SELECT_ATTENDANCE} WHERE student_id = ? AND date >= ? ORDER BY date ASC"
        ))
        .bind(student_id)
        .bind(since.to_string())
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        convert_all(rows)
    }

    ///keyed by student, used to pre-fill the register
    pub async fn for_class_on(
        class_name: &str,
        date: Date,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<HashMap<Uuid, Self>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(
            "SELECT a.id, a.student_id, a.date, a.present, a.remarks, a.marked_by, a.marked_at FROM attendance a INNER JOIN students s ON s.user_id = a.student_id WHERE s.class_name = ? AND a.date = ?",
        )
        .bind(class_name)
        .bind(date.to_string())
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        Ok(convert_all(rows)?
            .into_iter()
            .map(|record| (record.student_id, record))
            .collect())
    }

    pub async fn for_class(
        class_name: &str,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, AttendanceRow>(
            "SELECT a.id, a.student_id, a.date, a.present, a.remarks, a.marked_by, a.marked_at FROM attendance a INNER JOIN students s ON s.user_id = a.student_id WHERE s.class_name = ? ORDER BY a.date DESC, s.roll_number ASC",
        )
        .bind(class_name)
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        convert_all(rows)
    }

    pub async fn count_for_class_on(
        class_name: &str,
        date: Date,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<(i64, i64)> {
        let (present, absent) = sqlx::query_as::<_, (Option<i64>, Option<i64>)>(
            "SELECT SUM(a.present = 1), SUM(a.present = 0) FROM attendance a INNER JOIN students s ON s.user_id = a.student_id WHERE s.class_name = ? AND a.date = ?",
        )
        .bind(class_name)
        .bind(date.to_string())
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        Ok((present.unwrap_or(0), absent.unwrap_or(0)))
    }
}
