use crate::{
    auth::backend::RollcallAuthBackend,
    data::user::User,
    error::{BcryptSnafu, JoinTaskSnafu, MakeQuerySnafu, RollcallError, RollcallResult},
};
use axum_login::AuthSession;
use bitflags::bitflags;
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use sqlx::SqliteConnection;
use uuid::Uuid;

pub mod backend;
pub mod sqlite_store;

pub type RollcallSession = AuthSession<RollcallAuthBackend>;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PermissionsTarget: u8 {
        const VIEW_OWN_RECORDS =   0b0000_0001;
        const VIEW_CHILD_RECORDS = 0b0000_0010;

        const MARK_ATTENDANCE =    0b0000_0100;
        const RECORD_PROGRESS =    0b0000_1000;
        const VIEW_CLASS_REPORTS = 0b0001_0000;
        const EXPORT_CSVS =        0b0010_0000;
        const CRUD_USERS =         0b0100_0000;
    }
}

pub trait AuthUtilities {
    fn permissions(&self) -> PermissionsTarget;
    fn can(&self, needed: PermissionsTarget) -> bool;
    ///`next` is where to send the user back to after they log in
    fn ensure_can(&self, needed: PermissionsTarget, next: &str) -> RollcallResult<&User>;
}

impl AuthUtilities for RollcallSession {
    fn permissions(&self) -> PermissionsTarget {
        self.user
            .as_ref()
            .map_or_else(PermissionsTarget::empty, User::get_permissions)
    }

    fn can(&self, needed: PermissionsTarget) -> bool {
        self.permissions().contains(needed)
    }

    fn ensure_can(&self, needed: PermissionsTarget, next: &str) -> RollcallResult<&User> {
        let Some(user) = self.user.as_ref() else {
            return Err(RollcallError::NotLoggedIn {
                next: next.to_string(),
            });
        };

        let found = user.get_permissions();
        if found.contains(needed) {
            Ok(user)
        } else {
            warn!(user = %user.username, ?needed, ?found, "Rejected request without permissions");
            Err(RollcallError::IncorrectPermissions { needed, found })
        }
    }
}

pub async fn hash_password(password: SecretString, cost: u32) -> RollcallResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password.expose_secret(), cost))
        .await
        .context(JoinTaskSnafu)?
        .context(BcryptSnafu)
}

pub async fn verify_password(password: SecretString, hash: SecretString) -> RollcallResult<bool> {
    tokio::task::spawn_blocking(move || {
        bcrypt::verify(password.expose_secret(), hash.expose_secret())
    })
    .await
    .context(JoinTaskSnafu)?
    .context(BcryptSnafu)
}

pub async fn add_password(
    id: Uuid,
    password: SecretString,
    cost: u32,
    conn: &mut SqliteConnection,
    is_default: bool,
) -> RollcallResult<()> {
    let hashed = hash_password(password, cost).await?;

    sqlx::query(
        "UPDATE users SET bcrypt_hashed_password = ?, current_password_is_default = ? WHERE id = ?",
    )
    .bind(hashed)
    .bind(is_default)
    .bind(id)
    .execute(&mut *conn)
    .await
    .context(MakeQuerySnafu)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::user::Role;

    #[test]
    fn each_role_gets_only_its_own_permissions() {
        let student = Role::Student.permissions();
        let teacher = Role::Teacher.permissions();
        let parent = Role::Parent.permissions();

        assert_eq!(student, PermissionsTarget::VIEW_OWN_RECORDS);
        assert_eq!(parent, PermissionsTarget::VIEW_CHILD_RECORDS);
        assert!(teacher.contains(PermissionsTarget::MARK_ATTENDANCE));
        assert!(teacher.contains(PermissionsTarget::CRUD_USERS));

        assert!(!student.contains(PermissionsTarget::MARK_ATTENDANCE));
        assert!(!parent.contains(PermissionsTarget::MARK_ATTENDANCE));
        assert!(!teacher.contains(PermissionsTarget::VIEW_CHILD_RECORDS));
    }

    #[tokio::test]
    async fn hashing_roundtrips_through_verification() {
        let hash = hash_password(SecretString::from("hunter22"), 4)
            .await
            .unwrap();

        assert!(
            verify_password(SecretString::from("hunter22"), SecretString::from(hash.clone()))
                .await
                .unwrap()
        );
        assert!(
            !verify_password(SecretString::from("hunter23"), SecretString::from(hash))
                .await
                .unwrap()
        );
    }
}
