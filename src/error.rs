use crate::{
    auth::{PermissionsTarget, backend::RollcallAuthBackend},
    routes::encode_query,
};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_login::tower_sessions::cookie::time::error::ComponentRange;
use jiff::civil::Date;
use maud::html;
use snafu::Snafu;
use std::num::ParseIntError;
use uuid::Uuid;

pub type RollcallResult<T> = Result<T, RollcallError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RollcallError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error getting db connection"))]
    GetDatabaseConnection { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error commiting SQL transaction"))]
    CommitTransaction { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    Migrate { source: sqlx::migrate::MigrateError },
    #[snafu(display("Error converting unix timestamp {} to `time::OffsetDateTime`", timestamp))]
    InvalidSessionExpiry {
        source: ComponentRange,
        timestamp: i64,
    },
    #[snafu(display("Error serialising with rmp_serde"))]
    RmpSerdeEncode { source: rmp_serde::encode::Error },
    #[snafu(display("Error deserialising with rmp_serde"))]
    RmpSerdeDecode { source: rmp_serde::decode::Error },
    #[snafu(display("Unable to retrieve env var `{}`", name))]
    BadEnvVar {
        source: dotenvy::Error,
        name: &'static str,
    },
    #[snafu(display("Unable to parse env var `{}` as a number", name))]
    ParseEnvNumber {
        source: ParseIntError,
        name: &'static str,
    },
    #[snafu(display("Unable to parse env var `{}` as a boolean, found {:?}", name, found))]
    ParseEnvBool { name: &'static str, found: String },
    #[snafu(display("Unknown timezone {:?}", tz))]
    InvalidTimezone { source: jiff::Error, tz: String },
    #[snafu(display("Unable to parse date {:?}", original))]
    ParseDate {
        source: jiff::Error,
        original: String,
    },
    #[snafu(display("Unable to parse timestamp {:?}", original))]
    ParseTimestamp {
        source: jiff::Error,
        original: String,
    },
    #[snafu(display("Unable to find user with UUID: {}", id))]
    MissingUser { id: Uuid },
    #[snafu(display("Unable to find student with UUID: {}", id))]
    MissingStudent { id: Uuid },
    #[snafu(display("Unable to find teacher with UUID: {}", id))]
    MissingTeacher { id: Uuid },
    #[snafu(display("Unable to find parent with UUID: {}", id))]
    MissingParent { id: Uuid },
    #[snafu(display("Unable to find progress record with UUID: {}", id))]
    MissingProgressRecord { id: Uuid },
    #[snafu(display("Found unknown role {:?} in the database", found))]
    UnknownRole { found: String },
    #[snafu(display("Error with hashing/password verification"))]
    Bcrypt { source: bcrypt::BcryptError },
    #[snafu(display("Error joining blocking task"))]
    JoinTask { source: tokio::task::JoinError },
    #[snafu(display("Error with sessions"))]
    TowerSession {
        source: axum_login::tower_sessions::session::Error,
    },
    #[snafu(display(
        "Tried to get user information, found either no user or the incorrect kind of user"
    ))]
    UnableToFindUserInfo,
    #[snafu(display("You need to be logged in to see {}", next))]
    NotLoggedIn { next: String },
    #[snafu(display("Tried to {:?}, only had {:?}", needed.iter_names().collect::<Vec<_>>(), found.iter_names().collect::<Vec<_>>()))]
    IncorrectPermissions {
        needed: PermissionsTarget,
        found: PermissionsTarget,
    },
    #[snafu(display("You are not linked to the student with UUID: {}", student_id))]
    NotLinkedToStudent { student_id: Uuid },
    #[snafu(display("Student with UUID {} is not in class {:?}", student_id, class_name))]
    NotInClass {
        student_id: Uuid,
        class_name: String,
    },
    #[snafu(display("Progress record {} was recorded by another teacher", id))]
    NotRecordedByYou { id: Uuid },
    #[snafu(display("Cannot mark attendance for {}, which is in the future", date))]
    FutureAttendanceDate { date: Date },
    #[snafu(display("Unknown attendance status {:?}, expected `present` or `absent`", provided))]
    InvalidAttendanceStatus { provided: String },
    #[snafu(display("An account with that {} already exists", field))]
    DuplicateAccount { field: &'static str },
    #[snafu(display("Provided form was missing required details"))]
    IncompleteForm,
    #[snafu(display("Error parsing email address"))]
    Email { source: email_address::Error },
    #[snafu(display("Error building HTTP client"))]
    BuildHttpClient { source: reqwest::Error },
    #[snafu(display("Error sending SMS request"))]
    SmsRequest { source: reqwest::Error },
    #[snafu(display("SMS gateway rejected message with HTTP {}: {}", status, body))]
    SmsRejected { status: u16, body: String },
    #[snafu(display("Error with ZIPs"))]
    Zip { source: zip::result::ZipError },
    #[snafu(display("Error with CSVs"))]
    Csv { source: csv::Error },
    #[snafu(display("Error writing export"))]
    Io { source: std::io::Error },
}

impl From<axum_login::Error<RollcallAuthBackend>> for RollcallError {
    fn from(value: axum_login::Error<RollcallAuthBackend>) -> Self {
        match value {
            axum_login::Error::Session(source) => Self::TowerSession { source },
            axum_login::Error::Backend(backend) => backend,
        }
    }
}

impl IntoResponse for RollcallError {
    #[allow(clippy::match_same_arms)]
    fn into_response(self) -> Response {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const NA: StatusCode = StatusCode::FORBIDDEN; //not allowed
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input

        if let Self::NotLoggedIn { next } = &self {
            info!(?next, "Redirecting to login");
            return Redirect::to(&format!("/login?next={}", encode_query(next))).into_response();
        }

        let basic_error = |desc| {
            html! {
                div class="bg-red-100 border border-red-400 text-red-700 px-4 py-3 rounded relative mb-4" role="alert" {
                    strong class="font-bold" {"Rollcall Error: "}
                    span {(desc)}
                }
            }
        };

        let status_code = match &self {
            Self::OpenDatabase { .. } | Self::GetDatabaseConnection { .. } => ISE,
            Self::MakeQuery { source } => match source {
                sqlx::Error::RowNotFound => NF,
                _ => ISE,
            },
            Self::CommitTransaction { .. } | Self::Migrate { .. } => ISE,
            Self::InvalidSessionExpiry { .. } => ISE,
            Self::RmpSerdeEncode { .. } => ISE,
            Self::RmpSerdeDecode { .. } => BI,
            Self::BadEnvVar { .. } | Self::ParseEnvNumber { .. } | Self::ParseEnvBool { .. } => {
                ISE
            }
            Self::InvalidTimezone { .. } => ISE,
            Self::ParseDate { .. } => BI,
            Self::ParseTimestamp { .. } => ISE,
            Self::MissingUser { .. }
            | Self::MissingStudent { .. }
            | Self::MissingTeacher { .. }
            | Self::MissingParent { .. }
            | Self::MissingProgressRecord { .. } => NF,
            Self::UnknownRole { .. } => ISE,
            Self::Bcrypt { .. } | Self::JoinTask { .. } => ISE,
            Self::TowerSession { .. } => ISE,
            Self::UnableToFindUserInfo => NF,
            Self::NotLoggedIn { .. } => StatusCode::UNAUTHORIZED,
            Self::IncorrectPermissions { .. } => NA,
            Self::NotLinkedToStudent { .. }
            | Self::NotInClass { .. }
            | Self::NotRecordedByYou { .. } => NA,
            Self::FutureAttendanceDate { .. } | Self::InvalidAttendanceStatus { .. } => BI,
            Self::DuplicateAccount { .. } | Self::IncompleteForm => BI,
            Self::Email { .. } => BI,
            Self::BuildHttpClient { .. } | Self::SmsRequest { .. } | Self::SmsRejected { .. } => {
                ISE
            }
            Self::Zip { .. } | Self::Csv { .. } | Self::Io { .. } => ISE,
        };

        error!(?self, "Error!");
        (status_code, Html(basic_error(self.to_string()).into_string())).into_response()
    }
}
