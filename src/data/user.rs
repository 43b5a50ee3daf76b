use crate::{
    auth::{PermissionsTarget, hash_password},
    data::{DataType, parse_timestamp},
    error::{
        EmailSnafu, MakeQuerySnafu, MissingParentSnafu, MissingStudentSnafu, MissingTeacherSnafu,
        RollcallError, RollcallResult,
    },
};
use axum_login::AuthUser;
use email_address::EmailAddress;
use jiff::Timestamp;
use maud::Render;
use secrecy::{ExposeSecret, SecretString};
use snafu::{OptionExt, ResultExt};
use sqlx::{FromRow, SqliteConnection};
use std::{fmt::Display, str::FromStr, sync::LazyLock};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Student,
    Teacher,
    Parent,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Parent => "parent",
        }
    }

    pub fn permissions(self) -> PermissionsTarget {
        match self {
            Self::Student => PermissionsTarget::VIEW_OWN_RECORDS,
            Self::Parent => PermissionsTarget::VIEW_CHILD_RECORDS,
            Self::Teacher => {
                PermissionsTarget::MARK_ATTENDANCE
                    | PermissionsTarget::RECORD_PROGRESS
                    | PermissionsTarget::VIEW_CLASS_REPORTS
                    | PermissionsTarget::EXPORT_CSVS
                    | PermissionsTarget::CRUD_USERS
            }
        }
    }

    ///where this role lands after logging in
    pub const fn dashboard(self) -> &'static str {
        match self {
            Self::Student => "/student/dashboard",
            Self::Teacher => "/teacher/dashboard",
            Self::Parent => "/parent/dashboard",
        }
    }
}

impl FromStr for Role {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "parent" => Ok(Self::Parent),
            _ => Err(RollcallError::UnknownRole {
                found: s.to_string(),
            }),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Student => "Student",
            Self::Teacher => "Teacher",
            Self::Parent => "Parent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub roll_number: String,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherProfile {
    pub class_name: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub enum UserKind {
    Student(StudentProfile),
    Teacher(TeacherProfile),
    Parent { children: Vec<Uuid> },
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: EmailAddress,
    pub full_name: String,
    pub phone: Option<String>,
    pub bcrypt_hashed_password: Option<SecretString>,
    pub current_password_is_default: bool,
    pub created_at: Timestamp,
    pub kind: UserKind,
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    full_name: String,
    phone: Option<String>,
    role: String,
    bcrypt_hashed_password: Option<String>,
    current_password_is_default: bool,
    created_at: String,
}

pub struct AddPerson {
    pub username: String,
    pub email: EmailAddress,
    pub full_name: String,
    pub phone: Option<String>,
    pub password: Option<SecretString>,
    pub current_password_is_default: bool,
    pub bcrypt_cost: u32,
    pub kind: AddUserKind,
}

pub enum AddUserKind {
    Student(StudentProfile),
    Teacher(TeacherProfile),
    Parent,
}

impl AddUserKind {
    pub const fn role(&self) -> Role {
        match self {
            Self::Student(_) => Role::Student,
            Self::Teacher(_) => Role::Teacher,
            Self::Parent => Role::Parent,
        }
    }
}

///a UNIQUE failure that got past the existence checks, e.g. from two accounts being added at once
fn duplicate_or_query_error(source: sqlx::Error) -> RollcallError {
    let field = source
        .as_database_error()
        .filter(|e| e.is_unique_violation())
        .map(|e| {
            let message = e.message();
            if message.contains("users.username") {
                "username"
            } else if message.contains("users.email") {
                "email"
            } else {
                "roll number"
            }
        });

    match field {
        Some(field) => RollcallError::DuplicateAccount { field },
        None => RollcallError::MakeQuery { source },
    }
}

impl DataType for User {
    type Id = Uuid;
    type FormForAdding = AddPerson;

    async fn get_from_db_by_id(
        id: Self::Id,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Option<Self>> {
        let Some(row) = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context(MakeQuerySnafu)?
        else {
            return Ok(None);
        };

        let kind = match row.role.parse::<Role>()? {
            Role::Student => {
                let (roll_number, class_name) = sqlx::query_as::<_, (String, String)>(
                    "SELECT roll_number, class_name FROM students WHERE user_id = ?",
                )
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
                .context(MakeQuerySnafu)?
                .context(MissingStudentSnafu { id })?;

                UserKind::Student(StudentProfile {
                    roll_number,
                    class_name,
                })
            }
            Role::Teacher => {
                let (class_name, subject) = sqlx::query_as::<_, (String, String)>(
                    "SELECT class_name, subject FROM teachers WHERE user_id = ?",
                )
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
                .context(MakeQuerySnafu)?
                .context(MissingTeacherSnafu { id })?;

                UserKind::Teacher(TeacherProfile {
                    class_name,
                    subject,
                })
            }
            Role::Parent => {
                let children = sqlx::query_scalar::<_, Uuid>(
                    "SELECT student_id FROM parent_links WHERE parent_id = ?",
                )
                .bind(id)
                .fetch_all(&mut *conn)
                .await
                .context(MakeQuerySnafu)?;

                UserKind::Parent { children }
            }
        };

        let email = EmailAddress::from_str(&row.email).context(EmailSnafu)?;

        Ok(Some(Self {
            id: row.id,
            username: row.username,
            email,
            full_name: row.full_name,
            phone: row.phone,
            bcrypt_hashed_password: row.bcrypt_hashed_password.map(SecretString::from),
            current_password_is_default: row.current_password_is_default,
            created_at: parse_timestamp(row.created_at)?,
            kind,
        }))
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Self::Id> {
        let AddPerson {
            username,
            email,
            full_name,
            phone,
            password,
            current_password_is_default,
            bcrypt_cost,
            kind,
        } = to_be_added;

        //hashed up front so the checks below sit right next to the inserts
        let bcrypt_hashed_password = match password {
            Some(password) => Some(hash_password(password, bcrypt_cost).await?),
            None => None,
        };

        if sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
            .bind(&username)
            .fetch_one(&mut *conn)
            .await
            .context(MakeQuerySnafu)?
        {
            return Err(RollcallError::DuplicateAccount { field: "username" });
        }
        if sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? COLLATE NOCASE)",
        )
        .bind(email.as_str())
        .fetch_one(&mut *conn)
        .await
        .context(MakeQuerySnafu)?
        {
            return Err(RollcallError::DuplicateAccount { field: "email" });
        }
        if let AddUserKind::Student(StudentProfile { roll_number, .. }) = &kind
            && sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM students WHERE roll_number = ?)",
            )
            .bind(roll_number)
            .fetch_one(&mut *conn)
            .await
            .context(MakeQuerySnafu)?
        {
            return Err(RollcallError::DuplicateAccount {
                field: "roll number",
            });
        }

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, email, full_name, phone, role, bcrypt_hashed_password, current_password_is_default, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)")
            .bind(id)
            .bind(&username)
            .bind(email.as_str())
            .bind(full_name)
            .bind(phone)
            .bind(kind.role().as_str())
            .bind(bcrypt_hashed_password)
            .bind(current_password_is_default)
            .bind(Timestamp::now().to_string())
            .execute(&mut *conn)
            .await
            .map_err(duplicate_or_query_error)?;

        match kind {
            AddUserKind::Student(StudentProfile {
                roll_number,
                class_name,
            }) => {
                sqlx::query(
                    "INSERT INTO students (user_id, roll_number, class_name) VALUES (?, ?, ?)",
                )
                .bind(id)
                .bind(roll_number)
                .bind(class_name)
                .execute(&mut *conn)
                .await
                .map_err(duplicate_or_query_error)?;
            }
            AddUserKind::Teacher(TeacherProfile {
                class_name,
                subject,
            }) => {
                sqlx::query("INSERT INTO teachers (user_id, class_name, subject) VALUES (?, ?, ?)")
                    .bind(id)
                    .bind(class_name)
                    .bind(subject)
                    .execute(&mut *conn)
                    .await
                    .context(MakeQuerySnafu)?;
            }
            AddUserKind::Parent => {}
        }

        info!(%id, %username, "Added new user");

        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut SqliteConnection) -> RollcallResult<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }
}

impl User {
    pub const fn role(&self) -> Role {
        match self.kind {
            UserKind::Student(_) => Role::Student,
            UserKind::Teacher(_) => Role::Teacher,
            UserKind::Parent { .. } => Role::Parent,
        }
    }

    pub fn get_permissions(&self) -> PermissionsTarget {
        self.role().permissions()
    }

    pub const fn student_profile(&self) -> Option<&StudentProfile> {
        match &self.kind {
            UserKind::Student(profile) => Some(profile),
            _ => None,
        }
    }

    pub const fn teacher_profile(&self) -> Option<&TeacherProfile> {
        match &self.kind {
            UserKind::Teacher(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Uuid] {
        match &self.kind {
            UserKind::Parent { children } => children,
            _ => &[],
        }
    }

    pub fn is_parent_of(&self, student_id: Uuid) -> bool {
        self.children().contains(&student_id)
    }

    async fn get_from_ids(
        ids: Vec<Uuid>,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = Self::get_from_db_by_id(id, &mut *conn).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub async fn get_all_with_role(
        role: Role,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE role = ? ORDER BY full_name COLLATE NOCASE",
        )
        .bind(role.as_str())
        .fetch_all(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        Self::get_from_ids(ids, conn).await
    }

    pub async fn get_students_in_class(
        class_name: &str,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM students WHERE class_name = ? ORDER BY roll_number",
        )
        .bind(class_name)
        .fetch_all(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        Self::get_from_ids(ids, conn).await
    }

    pub async fn get_children(&self, conn: &mut SqliteConnection) -> RollcallResult<Vec<Self>> {
        Self::get_from_ids(self.children().to_vec(), conn).await
    }

    pub async fn get_parents_of(
        student_id: Uuid,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<Vec<Self>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT parent_id FROM parent_links WHERE student_id = ?",
        )
        .bind(student_id)
        .fetch_all(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        Self::get_from_ids(ids, conn).await
    }

    ///links are idempotent, linking twice is not an error
    pub async fn link_parent_to_student(
        parent_id: Uuid,
        student_id: Uuid,
        conn: &mut SqliteConnection,
    ) -> RollcallResult<()> {
        let parent = Self::get_from_db_by_id(parent_id, &mut *conn)
            .await?
            .filter(|user| user.role() == Role::Parent)
            .context(MissingParentSnafu { id: parent_id })?;
        let student = Self::get_from_db_by_id(student_id, &mut *conn)
            .await?
            .filter(|user| user.role() == Role::Student)
            .context(MissingStudentSnafu { id: student_id })?;

        sqlx::query("INSERT OR IGNORE INTO parent_links (parent_id, student_id) VALUES (?, ?)")
            .bind(parent.id)
            .bind(student.id)
            .execute(&mut *conn)
            .await
            .context(MakeQuerySnafu)?;

        info!(parent = %parent.username, student = %student.username, "Linked parent to student");
        Ok(())
    }

    pub async fn count(conn: &mut SqliteConnection) -> RollcallResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }
}

impl Render for User {
    fn render_to(&self, buffer: &mut String) {
        self.full_name.render_to(buffer);
    }
}

impl AuthUser for User {
    type Id = Uuid;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        static EMPTY_SECRET_STRING: LazyLock<SecretString> =
            LazyLock::new(|| SecretString::from(""));

        self.bcrypt_hashed_password
            .as_ref()
            .unwrap_or(&EMPTY_SECRET_STRING)
            .expose_secret()
            .as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_state;

    fn add_person(username: &str, kind: AddUserKind) -> AddPerson {
        AddPerson {
            username: username.to_string(),
            email: EmailAddress::from_str(&format!("{username}@school.test")).unwrap(),
            full_name: format!("{username} Example"),
            phone: None,
            password: Some(SecretString::from("password123")),
            current_password_is_default: false,
            bcrypt_cost: 4,
            kind,
        }
    }

    fn student(roll_number: &str, class_name: &str) -> AddUserKind {
        AddUserKind::Student(StudentProfile {
            roll_number: roll_number.to_string(),
            class_name: class_name.to_string(),
        })
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" parent ".parse::<Role>().unwrap(), Role::Parent);
        assert!("admin".parse::<Role>().is_err());
    }

    #[tokio::test]
    async fn users_load_back_with_their_profiles() {
        let state = test_state().await;
        let mut conn = state.get_connection().await.unwrap();

        let id = User::insert_into_database(add_person("ada", student("R-1", "7A")), &mut conn)
            .await
            .unwrap();
        let user = User::get_from_db_by_id(id, &mut conn).await.unwrap().unwrap();

        assert_eq!(user.role(), Role::Student);
        assert_eq!(
            user.student_profile(),
            Some(&StudentProfile {
                roll_number: "R-1".into(),
                class_name: "7A".into()
            })
        );
        assert!(user.bcrypt_hashed_password.is_some());
    }

    #[tokio::test]
    async fn duplicate_usernames_emails_and_roll_numbers_are_rejected() {
        let state = test_state().await;
        let mut conn = state.get_connection().await.unwrap();

        User::insert_into_database(add_person("ada", student("R-1", "7A")), &mut conn)
            .await
            .unwrap();

        let same_username =
            User::insert_into_database(add_person("ada", AddUserKind::Parent), &mut conn).await;
        assert!(matches!(
            same_username,
            Err(RollcallError::DuplicateAccount { field: "username" })
        ));

        let mut same_email = add_person("grace", AddUserKind::Parent);
        same_email.email = EmailAddress::from_str("ADA@school.test").unwrap();
        assert!(matches!(
            User::insert_into_database(same_email, &mut conn).await,
            Err(RollcallError::DuplicateAccount { field: "email" })
        ));

        assert!(matches!(
            User::insert_into_database(add_person("alan", student("R-1", "7B")), &mut conn).await,
            Err(RollcallError::DuplicateAccount {
                field: "roll number"
            })
        ));
        assert_eq!(User::count(&mut conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unique_failures_on_insert_are_duplicates() {
        let state = test_state().await;
        let mut conn = state.get_connection().await.unwrap();
        User::insert_into_database(add_person("ada", student("R-1", "7A")), &mut conn)
            .await
            .unwrap();

        let clash = sqlx::query("INSERT INTO users (id, username, email, full_name, role, created_at) VALUES (?, 'ada', 'other@school.test', 'Other', 'parent', '2025-01-01T00:00:00Z')")
            .bind(Uuid::new_v4())
            .execute(&mut *conn)
            .await
            .unwrap_err();
        assert!(matches!(
            duplicate_or_query_error(clash),
            RollcallError::DuplicateAccount { field: "username" }
        ));

        let clash = sqlx::query("INSERT INTO users (id, username, email, full_name, role, created_at) VALUES (?, 'other', 'ada@school.test', 'Other', 'parent', '2025-01-01T00:00:00Z')")
            .bind(Uuid::new_v4())
            .execute(&mut *conn)
            .await
            .unwrap_err();
        assert!(matches!(
            duplicate_or_query_error(clash),
            RollcallError::DuplicateAccount { field: "email" }
        ));

        let broken = sqlx::query("SELECT * FROM no_such_table")
            .execute(&mut *conn)
            .await
            .unwrap_err();
        assert!(matches!(
            duplicate_or_query_error(broken),
            RollcallError::MakeQuery { .. }
        ));
    }

    #[tokio::test]
    async fn teachers_without_a_profile_are_an_error() {
        let state = test_state().await;
        let mut conn = state.get_connection().await.unwrap();
        let id = User::insert_into_database(
            add_person(
                "mrs_t",
                AddUserKind::Teacher(TeacherProfile {
                    class_name: "7A".into(),
                    subject: "Maths".into(),
                }),
            ),
            &mut conn,
        )
        .await
        .unwrap();

        sqlx::query("DELETE FROM teachers WHERE user_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .unwrap();

        assert!(matches!(
            User::get_from_db_by_id(id, &mut conn).await,
            Err(RollcallError::MissingTeacher { id: missing }) if missing == id
        ));
    }

    #[tokio::test]
    async fn parents_can_be_linked_to_several_students() {
        let state = test_state().await;
        let mut conn = state.get_connection().await.unwrap();

        let first = User::insert_into_database(add_person("ada", student("R-1", "7A")), &mut conn)
            .await
            .unwrap();
        let second =
            User::insert_into_database(add_person("alan", student("R-2", "7A")), &mut conn)
                .await
                .unwrap();
        let parent = User::insert_into_database(add_person("mum", AddUserKind::Parent), &mut conn)
            .await
            .unwrap();

        User::link_parent_to_student(parent, first, &mut conn)
            .await
            .unwrap();
        User::link_parent_to_student(parent, second, &mut conn)
            .await
            .unwrap();
        User::link_parent_to_student(parent, second, &mut conn)
            .await
            .unwrap();

        let parent = User::get_from_db_by_id(parent, &mut conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent.children().len(), 2);
        assert!(parent.is_parent_of(first) && parent.is_parent_of(second));

        let parents = User::get_parents_of(first, &mut conn).await.unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, parent.id);
    }

    #[tokio::test]
    async fn linking_requires_a_parent_and_a_student() {
        let state = test_state().await;
        let mut conn = state.get_connection().await.unwrap();

        let student_id =
            User::insert_into_database(add_person("ada", student("R-1", "7A")), &mut conn)
                .await
                .unwrap();
        let other_student =
            User::insert_into_database(add_person("alan", student("R-2", "7A")), &mut conn)
                .await
                .unwrap();

        assert!(matches!(
            User::link_parent_to_student(other_student, student_id, &mut conn).await,
            Err(RollcallError::MissingParent { .. })
        ));
    }

    #[tokio::test]
    async fn class_rosters_are_ordered_by_roll_number() {
        let state = test_state().await;
        let mut conn = state.get_connection().await.unwrap();

        for (name, roll, class) in [("c", "R-3", "7A"), ("a", "R-1", "7A"), ("b", "R-2", "7B")] {
            User::insert_into_database(add_person(name, student(roll, class)), &mut conn)
                .await
                .unwrap();
        }

        let roster = User::get_students_in_class("7A", &mut conn).await.unwrap();
        let rolls: Vec<_> = roster
            .iter()
            .filter_map(|u| u.student_profile().map(|p| p.roll_number.clone()))
            .collect();
        assert_eq!(rolls, vec!["R-1", "R-3"]);
    }
}
