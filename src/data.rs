use crate::error::{ParseDateSnafu, ParseTimestampSnafu, RollcallResult};
use jiff::{Timestamp, civil::Date};
use serde::Deserialize;
use snafu::ResultExt;
use sqlx::SqliteConnection;
use uuid::Uuid;

pub mod attendance;
pub mod notification;
pub mod progress;
pub mod user;

#[derive(Deserialize)]
pub struct IdForm {
    pub id: Uuid,
}

#[allow(async_fn_in_trait)]
pub trait DataType: Sized {
    type Id;
    type FormForAdding;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut SqliteConnection)
    -> RollcallResult<Option<Self>>;
    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Self::Id>;
    async fn remove_from_database(id: Self::Id, conn: &mut SqliteConnection) -> RollcallResult<()>;
}

//dates are stored as ISO-8601 text, so they sort the same way in SQL as they do here
pub fn parse_date(original: String) -> RollcallResult<Date> {
    original.trim().parse().context(ParseDateSnafu { original })
}

pub fn parse_timestamp(original: String) -> RollcallResult<Timestamp> {
    original.parse().context(ParseTimestampSnafu { original })
}

pub fn empty_to_none(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}
