use crate::{auth::RollcallSession, maud_conveniences::title, state::RollcallState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use maud::html;

pub async fn get_index_route(session: RollcallSession) -> Redirect {
    match session.user.as_ref() {
        Some(user) if user.current_password_is_default => {
            Redirect::to("/replace_default_password")
        }
        Some(user) => Redirect::to(user.role().dashboard()),
        None => Redirect::to("/login"),
    }
}

pub async fn not_found(
    State(state): State<RollcallState>,
    session: RollcallSession,
) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        state.render(session, html! {
            div class="bg-gray-800 p-8 rounded shadow-md max-w-md w-full text-center" {
                (title("Page not found"))
                p class="mb-4 text-gray-300" {"We couldn't find what you were looking for."}
                a href="/" class="bg-slate-600 hover:bg-slate-800 font-bold py-2 px-4 rounded" {"Go home"}
            }
        }),
    )
}
