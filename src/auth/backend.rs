use crate::{
    auth::verify_password,
    data::{DataType, user::User},
    error::{MakeQuerySnafu, RollcallError},
    state::RollcallState,
};
use async_trait::async_trait;
use axum_login::{AuthnBackend, UserId};
use secrecy::SecretString;
use snafu::ResultExt;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RollcallAuthBackend {
    state: RollcallState,
}

impl RollcallAuthBackend {
    pub const fn new(state: RollcallState) -> Self {
        Self { state }
    }
}

pub enum RollcallAuthCredentials {
    ///`login` can be either the username or the email address
    LoginPassword {
        login: String,
        password: SecretString,
    },
}

#[async_trait]
impl AuthnBackend for RollcallAuthBackend {
    type User = User;
    type Credentials = RollcallAuthCredentials;
    type Error = RollcallError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let mut conn = self.state.get_connection().await?;

        match creds {
            RollcallAuthCredentials::LoginPassword { login, password } => {
                let login = login.trim();
                let Some(id) = sqlx::query_scalar::<_, Uuid>(
                    "SELECT id FROM users WHERE username = ? OR email = ? COLLATE NOCASE",
                )
                .bind(login)
                .bind(login)
                .fetch_optional(&mut *conn)
                .await
                .context(MakeQuerySnafu)?
                else {
                    debug!(?login, "Login attempt for unknown account");
                    return Ok(None);
                };

                let Some(user) = User::get_from_db_by_id(id, &mut *conn).await? else {
                    return Ok(None);
                };
                drop(conn);

                let Some(hash) = user.bcrypt_hashed_password.clone() else {
                    return Ok(None);
                };

                Ok(if verify_password(password, hash).await? {
                    Some(user)
                } else {
                    debug!(username = %user.username, "Incorrect password");
                    None
                })
            }
        }
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        User::get_from_db_by_id(*user_id, &mut *self.state.get_connection().await?).await
    }
}
