use crate::{
    auth::RollcallSession,
    error::{RollcallError, RollcallResult},
    state::RollcallState,
};
use axum::{
    extract::State,
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::Stream;
use std::convert::Infallible;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SseEvent {
    AttendanceMarked,
    ProgressRecorded,
    PeopleChanged,
}

impl SseEvent {
    ///the name htmx listens for, eg. `hx-trigger="sse:attendance_marked"`
    pub const fn name(self) -> &'static str {
        match self {
            Self::AttendanceMarked => "attendance_marked",
            Self::ProgressRecorded => "progress_recorded",
            Self::PeopleChanged => "people_changed",
        }
    }
}

pub async fn sse_feed(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> RollcallResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if session.user.is_none() {
        return Err(RollcallError::NotLoggedIn {
            next: "/".to_string(),
        });
    }

    //lagged receivers just miss a refresh
    let stream = BroadcastStream::new(state.subscribe_to_sse_feed()).filter_map(|msg| {
        msg.ok()
            .map(|event| Ok(Event::default().event(event.name()).data(event.name())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
