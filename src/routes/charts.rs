use crate::{
    auth::{AuthUtilities, PermissionsTarget, RollcallSession},
    data::{attendance::AttendanceRecord, progress::ProgressRecord},
    error::RollcallResult,
    state::RollcallState,
    stats::{SHORT_WINDOW_DAYS, attendance_series, progress_series, window_start},
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

fn unauthorised() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Unauthorized"})),
    )
        .into_response()
}

///only students get charts, and only of themselves
pub async fn get_attendance_chart(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Response> {
    let Some(user) = session
        .user
        .as_ref()
        .filter(|_| session.can(PermissionsTarget::VIEW_OWN_RECORDS))
    else {
        return Ok(unauthorised());
    };
    let today = state.today();

    let records = AttendanceRecord::for_student_since(
        user.id,
        window_start(today, SHORT_WINDOW_DAYS),
        &mut *state.get_connection().await?,
    )
    .await?;

    Ok(Json(attendance_series(&records, today)).into_response())
}

pub async fn get_progress_chart(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Response> {
    let Some(user) = session
        .user
        .as_ref()
        .filter(|_| session.can(PermissionsTarget::VIEW_OWN_RECORDS))
    else {
        return Ok(unauthorised());
    };

    let records =
        ProgressRecord::for_student(user.id, None, &mut *state.get_connection().await?).await?;

    Ok(Json(progress_series(&records)).into_response())
}
