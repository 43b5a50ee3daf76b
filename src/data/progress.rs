use crate::{
    data::{DataType, parse_date, parse_timestamp},
    error::{MakeQuerySnafu, RollcallError, RollcallResult},
};
use bitflags::bitflags;
use jiff::{Timestamp, civil::Date};
use snafu::ResultExt;
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub subject: String,
    pub assignment_name: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub comments: Option<String>,
    pub date: Date,
    pub created_at: Timestamp,
}

#[derive(FromRow)]
struct ProgressRow {
    id: Uuid,
    student_id: Uuid,
    teacher_id: Option<Uuid>,
    subject: String,
    assignment_name: String,
    marks_obtained: f64,
    total_marks: f64,
    percentage: f64,
    comments: Option<String>,
    date: String,
    created_at: String,
}

impl TryFrom<ProgressRow> for ProgressRecord {
    type Error = RollcallError;

    fn try_from(row: ProgressRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            student_id: row.student_id,
            teacher_id: row.teacher_id,
            subject: row.subject,
            assignment_name: row.assignment_name,
            marks_obtained: row.marks_obtained,
            total_marks: row.total_marks,
            percentage: row.percentage,
            comments: row.comments,
            date: parse_date(row.date)?,
            created_at: parse_timestamp(row.created_at)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AddProgress {
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub subject: String,
    pub assignment_name: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub comments: Option<String>,
    pub date: Date,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ProgressValidationError: u8 {
        const MISSING_SUBJECT =     0b0000_0001;
        const MISSING_ASSIGNMENT =  0b0000_0010;
        const NEGATIVE_MARKS =      0b0000_0100;
        const NON_POSITIVE_TOTAL =  0b0000_1000;
        const MARKS_OVER_TOTAL =    0b0001_0000;
        const NOT_A_NUMBER =        0b0010_0000;
        const UNKNOWN_STUDENT =     0b0100_0000;
        const BAD_DATE =            0b1000_0000;
    }
}

impl ProgressValidationError {
    pub fn messages(self) -> Vec<&'static str> {
        self.iter()
            .map(|flag| {
                if flag == Self::MISSING_SUBJECT {
                    "A subject is required"
                } else if flag == Self::MISSING_ASSIGNMENT {
                    "An assignment name is required"
                } else if flag == Self::NEGATIVE_MARKS {
                    "Marks obtained cannot be negative"
                } else if flag == Self::NON_POSITIVE_TOTAL {
                    "Total marks must be greater than zero"
                } else if flag == Self::MARKS_OVER_TOTAL {
                    "Marks obtained cannot be more than the total"
                } else if flag == Self::UNKNOWN_STUDENT {
                    "That student isn't in your class"
                } else if flag == Self::BAD_DATE {
                    "The date wasn't valid, or was in the future"
                } else {
                    "Marks must be numbers"
                }
            })
            .collect()
    }
}

///`marks_obtained / total_marks * 100`, or 0 if the total isn't positive
pub fn calculate_percentage(marks_obtained: f64, total_marks: f64) -> f64 {
    if total_marks > 0.0 {
        marks_obtained / total_marks * 100.0
    } else {
        0.0
    }
}

impl AddProgress {
    pub fn validate(&self) -> ProgressValidationError {
        let mut errors = ProgressValidationError::empty();

        if self.subject.trim().is_empty() {
            errors |= ProgressValidationError::MISSING_SUBJECT;
        }
        if self.assignment_name.trim().is_empty() {
            errors |= ProgressValidationError::MISSING_ASSIGNMENT;
        }
        if !self.marks_obtained.is_finite() || !self.total_marks.is_finite() {
            errors |= ProgressValidationError::NOT_A_NUMBER;
            return errors;
        }
        if self.marks_obtained < 0.0 {
            errors |= ProgressValidationError::NEGATIVE_MARKS;
        }
        if self.total_marks <= 0.0 {
            errors |= ProgressValidationError::NON_POSITIVE_TOTAL;
        } else if self.marks_obtained > self.total_marks {
            errors |= ProgressValidationError::MARKS_OVER_TOTAL;
        }

        errors
    }
}

const SELECT_PROGRESS: &str = "SELECT id, student_id, teacher_id, subject, assignment_name, marks_obtained, total_marks, percentage, comments, date, created_at FROM progress";

fn convert_all(rows: Vec<ProgressRow>) -> RollcallResult<Vec<ProgressRecord>> {
    rows.into_iter().map(ProgressRecord::try_from).collect()
}

impl DataType for ProgressRecord {
    type Id = Uuid;
    type FormForAdding = AddProgress;

    async fn get_from_db_by_id(
        id: Self::Id,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Option<Self>> {
        sqlx::query_as::<_, ProgressRow>(&format!("{SELECT_PROGRESS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)?
            .map(Self::try_from)
            .transpose()
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Self::Id> {
        let AddProgress {
            student_id,
            teacher_id,
            subject,
            assignment_name,
            marks_obtained,
            total_marks,
            comments,
            date,
        } = to_be_added;

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO progress (id, student_id, teacher_id, subject, assignment_name, marks_obtained, total_marks, percentage, comments, date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")
            .bind(id)
            .bind(student_id)
            .bind(teacher_id)
            .bind(subject.trim())
            .bind(assignment_name.trim())
            .bind(marks_obtained)
            .bind(total_marks)
            .bind(calculate_percentage(marks_obtained, total_marks))
            .bind(comments)
            .bind(date.to_string())
            .bind(Timestamp::now().to_string())
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;

        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut SqliteConnection) -> RollcallResult<()> {
        sqlx::query("DELETE FROM progress WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }
}

impl ProgressRecord {
    ///most recent first
    pub async fn for_student(
        student_id: Uuid,
        limit: Option<u32>,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "{SELECT_PROGRESS} WHERE student_id = ? ORDER BY date DESC, created_at DESC LIMIT ?"
        ))
        .bind(student_id)
        .bind(limit.map_or(-1, i64::from))
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        convert_all(rows)
    }

    pub async fn for_class(
        class_name: &str,
        limit: Option<u32>,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, ProgressRow>(
            "SELECT p.id, p.student_id, p.teacher_id, p.subject, p.assignment_name, p.marks_obtained, p.total_marks, p.percentage, p.comments, p.date, p.created_at FROM progress p INNER JOIN students s ON s.user_id = p.student_id WHERE s.class_name = ? ORDER BY p.date DESC, p.created_at DESC LIMIT ?",
        )
        .bind(class_name)
        .bind(limit.map_or(-1, i64::from))
        .fetch_all(conn)
        .await
        .context(MakeQuerySnafu)?;

        convert_all(rows)
    }
}
