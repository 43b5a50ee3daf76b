use crate::{
    auth::{backend::RollcallAuthBackend, sqlite_store::SqliteSessionStore},
    data::user::{StudentProfile, TeacherProfile, User},
    error::{RollcallResult, UnableToFindUserInfoSnafu},
    state::RollcallState,
};
use axum::{
    Router,
    routing::{get, post},
};
use axum_login::{
    AuthManagerLayerBuilder,
    tower_sessions::{Expiry, SessionManagerLayer, cookie::time::Duration},
};
use snafu::OptionExt;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod attendance;
pub mod charts;
pub mod index;
pub mod login;
pub mod onboarding;
pub mod parent;
pub mod people;
pub mod progress;
pub mod reports;
pub mod set_new_password;
pub mod sse;
pub mod student;
pub mod teacher;

pub fn router(state: RollcallState) -> Router {
    let auth_config = state.config().auth_config();
    let server_config = state.config().server_config();

    let session_store = SqliteSessionStore::new(state.clone());
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(auth_config.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            auth_config.session_lifetime_secs,
        )));
    let auth_backend = RollcallAuthBackend::new(state.clone());
    let auth_layer = AuthManagerLayerBuilder::new(auth_backend, session_layer).build();

    Router::new()
        .route("/", get(index::get_index_route))
        .route("/login", get(login::get_login).post(login::post_login))
        .route("/logout", post(login::post_logout))
        .route(
            "/replace_default_password",
            get(set_new_password::get_replace_default_password)
                .post(set_new_password::post_replace_default_password),
        )
        .route(
            "/onboarding",
            get(onboarding::get_onboarding).post(onboarding::post_onboarding),
        )
        .route("/student/dashboard", get(student::get_student_dashboard))
        .route("/parent/dashboard", get(parent::get_parent_dashboard))
        .route("/parent/student/{id}", get(parent::get_parent_view_student))
        .route("/teacher/dashboard", get(teacher::get_teacher_dashboard))
        .route(
            "/internal/teacher/today_summary",
            get(teacher::internal_get_today_summary),
        )
        .route(
            "/teacher/attendance",
            get(attendance::get_mark_attendance).post(attendance::post_mark_attendance),
        )
        .route(
            "/teacher/progress",
            get(progress::get_progress)
                .post(progress::post_progress)
                .delete(progress::delete_progress),
        )
        .route("/teacher/reports", get(reports::get_reports))
        .route("/teacher/reports/export", get(reports::get_export))
        .route(
            "/people",
            get(people::get_people).delete(people::delete_person),
        )
        .route("/internal/get_people", get(people::internal_get_people))
        .route(
            "/internal/get_person",
            get(people::internal_get_person_in_detail),
        )
        .route(
            "/internal/people/new_student_form",
            get(people::internal_get_add_student_form).put(people::internal_put_new_student),
        )
        .route(
            "/internal/people/new_parent_form",
            get(people::internal_get_add_parent_form).put(people::internal_put_new_parent),
        )
        .route(
            "/internal/people/new_teacher_form",
            get(people::internal_get_add_teacher_form).put(people::internal_put_new_teacher),
        )
        .route("/internal/people/link", post(people::internal_post_link))
        .route(
            "/api/student-attendance-chart",
            get(charts::get_attendance_chart),
        )
        .route("/api/progress-marks-chart", get(charts::get_progress_chart))
        .route("/sse_feed", get(sse::sse_feed))
        .fallback(index::not_found)
        .layer(auth_layer)
        .layer(RequestBodyLimitLayer::new(server_config.max_content_length))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

///only same-site absolute paths are followed after logging in
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|next| next.starts_with('/') && !next.starts_with("//"))
}

pub fn encode_query(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

pub fn teacher_profile(user: &User) -> RollcallResult<&TeacherProfile> {
    user.teacher_profile().context(UnableToFindUserInfoSnafu)
}

pub fn student_profile(user: &User) -> RollcallResult<&StudentProfile> {
    user.student_profile().context(UnableToFindUserInfoSnafu)
}
