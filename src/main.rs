#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::single_match_else)]

use crate::{
    auth::sqlite_store::SqliteSessionStore,
    config::RuntimeConfiguration,
    notify::{LogOnlyGateway, SmsGateway, twilio::TwilioGateway},
    state::RollcallState,
};
use axum_login::tower_sessions::ExpiredDeletion;
use sqlx::sqlite::SqlitePoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[macro_use]
extern crate tracing;

mod auth;
mod config;
mod data;
mod error;
mod maud_conveniences;
mod notify;
mod routes;
mod state;
mod stats;
#[cfg(test)]
mod test_utils;

const EXPIRED_SESSION_SWEEP: Duration = Duration::from_secs(60);

async fn shutdown_signal(state: RollcallState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!("signal received, starting graceful shutdown");
    state.sensible_shutdown().await;
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        panic!("unable to load env vars: {e}");
    }

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .expect("unable to set tracing subscriber");

    info!("`tracing` online");

    let config = RuntimeConfiguration::new().expect("unable to create config");

    let sms_gateway: Arc<dyn SmsGateway> = match config.sms_config() {
        Some(sms_config) => {
            info!(from = %sms_config.from_number, "Sending absence texts via Twilio");
            Arc::new(TwilioGateway::new(sms_config).expect("unable to create SMS client"))
        }
        None => {
            warn!("No SMS provider configured, absence texts will only be logged");
            Arc::new(LogOnlyGateway)
        }
    };

    let options = SqlitePoolOptions::new().max_connections(15);
    let state = RollcallState::new(options, config.clone(), sms_gateway)
        .await
        .expect("unable to create state");

    let session_store = SqliteSessionStore::new(state.clone());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EXPIRED_SESSION_SWEEP);
        loop {
            interval.tick().await;
            if let Err(e) = session_store.delete_expired().await {
                error!(?e, "Unable to delete expired sessions");
            }
        }
    });

    let app = routes::router(state.clone());

    let server_ip = config.server_config().server_ip.clone();
    let listener = TcpListener::bind(&server_ip)
        .await
        .expect("unable to listen on server ip");

    info!(?server_ip, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("unable to serve app");
}
