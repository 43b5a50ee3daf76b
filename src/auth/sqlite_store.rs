use crate::{
    error::{
        InvalidSessionExpirySnafu, MakeQuerySnafu, RmpSerdeDecodeSnafu, RmpSerdeEncodeSnafu,
        RollcallError,
    },
    state::RollcallState,
};
use async_trait::async_trait;
use axum_login::tower_sessions::{
    ExpiredDeletion, SessionStore,
    cookie::time::OffsetDateTime,
    session::{Id, Record},
    session_store::Error as SSError,
};
use snafu::ResultExt;
use sqlx::{FromRow, SqliteConnection};

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    state: RollcallState,
}

#[derive(FromRow)]
struct SessionRow {
    data: Vec<u8>,
    expiry_date: i64,
}

impl SqliteSessionStore {
    pub const fn new(state: RollcallState) -> Self {
        Self { state }
    }

    async fn id_exists(id: Id, conn: &mut SqliteConnection) -> Result<bool, RollcallError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM sessions WHERE id = ?)")
            .bind(id.to_string())
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn save_session(record: &Record, conn: &mut SqliteConnection) -> Result<(), RollcallError> {
        let serialised_data = rmp_serde::to_vec(&record.data).context(RmpSerdeEncodeSnafu)?;

        sqlx::query("INSERT INTO sessions (id, data, expiry_date) VALUES (?, ?, ?) ON CONFLICT (id) DO UPDATE SET data = excluded.data, expiry_date = excluded.expiry_date")
            .bind(record.id.to_string())
            .bind(serialised_data)
            .bind(record.expiry_date.unix_timestamp())
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, session_record: &mut Record) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        while Self::id_exists(session_record.id, &mut connection)
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?
        {
            session_record.id = Id::default();
        }

        Self::save_session(session_record, &mut connection)
            .await
            .map_err(|e| SSError::Encode(e.to_string()))?;

        Ok(())
    }

    async fn save(&self, session_record: &Record) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        Self::save_session(session_record, &mut connection)
            .await
            .map_err(|e| SSError::Encode(e.to_string()))?;

        Ok(())
    }

    async fn load(&self, session_id: &Id) -> Result<Option<Record>, SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        let Some(sql_record) = sqlx::query_as::<_, SessionRow>(
            "SELECT data, expiry_date FROM sessions WHERE id = ? AND expiry_date > unixepoch()",
        )
        .bind(session_id.to_string())
        .fetch_optional(&mut *connection)
        .await
        .context(MakeQuerySnafu)
        .map_err(|e| SSError::Decode(e.to_string()))?
        else {
            return Ok(None);
        };

        let data = rmp_serde::from_slice(&sql_record.data)
            .context(RmpSerdeDecodeSnafu)
            .map_err(|e| SSError::Decode(e.to_string()))?;

        let expiry_date = OffsetDateTime::from_unix_timestamp(sql_record.expiry_date)
            .context(InvalidSessionExpirySnafu {
                timestamp: sql_record.expiry_date,
            })
            .map_err(|e| SSError::Decode(e.to_string()))?;

        Ok(Some(Record {
            id: *session_id,
            data,
            expiry_date,
        }))
    }

    async fn delete(&self, session_id: &Id) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&mut *connection)
            .await
            .context(MakeQuerySnafu)
            .map_err(|e| SSError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for SqliteSessionStore {
    async fn delete_expired(&self) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        let deleted = sqlx::query("DELETE FROM sessions WHERE expiry_date <= unixepoch()")
            .execute(&mut *connection)
            .await
            .context(MakeQuerySnafu)
            .map_err(|e| SSError::Backend(e.to_string()))?
            .rows_affected();

        if deleted > 0 {
            debug!(deleted, "Removed expired sessions");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_state;
    use std::collections::HashMap;

    fn record(expiry_date: OffsetDateTime) -> Record {
        let mut data = HashMap::new();
        data.insert("greeting".to_string(), serde_json::json!("hello"));
        Record {
            id: Id::default(),
            data,
            expiry_date,
        }
    }

    #[tokio::test]
    async fn saved_sessions_load_back() {
        let state = test_state().await;
        let store = SqliteSessionStore::new(state.clone());

        let mut rec = record(OffsetDateTime::now_utc() + std::time::Duration::from_secs(600));
        store.create(&mut rec).await.unwrap();

        let loaded = store.load(&rec.id).await.unwrap().expect("session was saved");
        assert_eq!(loaded.data, rec.data);
        assert_eq!(
            loaded.expiry_date.unix_timestamp(),
            rec.expiry_date.unix_timestamp()
        );

        store.delete(&rec.id).await.unwrap();
        assert!(store.load(&rec.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible_and_deleted() {
        let state = test_state().await;
        let store = SqliteSessionStore::new(state.clone());

        let mut rec = record(OffsetDateTime::now_utc() - std::time::Duration::from_secs(60));
        store.create(&mut rec).await.unwrap();

        assert!(store.load(&rec.id).await.unwrap().is_none());

        store.delete_expired().await.unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&**state)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
