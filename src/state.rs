use crate::{
    auth::RollcallSession,
    config::RuntimeConfiguration,
    error::{GetDatabaseConnectionSnafu, MigrateSnafu, OpenDatabaseSnafu, RollcallResult},
    maud_conveniences::render_nav,
    notify::SmsGateway,
    routes::sse::SseEvent,
};
use jiff::civil::Date;
use maud::{DOCTYPE, Markup, html};
use snafu::ResultExt;
use sqlx::{
    Pool, Sqlite, Transaction,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{ops::Deref, str::FromStr, sync::Arc};
use tokio::sync::broadcast::{Receiver, Sender, channel};

#[derive(Clone, Debug)]
pub struct RollcallState {
    pool: Pool<Sqlite>,
    config: RuntimeConfiguration,
    sse_events_sender: Sender<SseEvent>,
    sms_gateway: Arc<dyn SmsGateway>,
}

impl RollcallState {
    pub async fn new(
        options: SqlitePoolOptions,
        config: RuntimeConfiguration,
        sms_gateway: Arc<dyn SmsGateway>,
    ) -> RollcallResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(config.db_config().get_db_path())
            .context(OpenDatabaseSnafu)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = options
            .connect_with(connect_options)
            .await
            .context(OpenDatabaseSnafu)?;

        sqlx::migrate!().run(&pool).await.context(MigrateSnafu)?;

        let (tx, _rx) = channel(16);

        Ok(Self {
            pool,
            config,
            sse_events_sender: tx,
            sms_gateway,
        })
    }

    #[allow(clippy::unused_self, clippy::needless_pass_by_value)] //in case self is ever needed :), and to allow direct html! usage
    pub fn render(&self, auth_session: RollcallSession, markup: Markup) -> Markup {
        let school = self.config.school_config();
        let nav = render_nav(auth_session.user.as_ref(), &school.name);

        html! {
            (DOCTYPE)
            html {
                head {
                    meta charset="UTF-8" {}
                    meta name="viewport" content="width=device-width, initial-scale=1.0" {}
                    script src="https://unpkg.com/htmx.org@2.0.4" integrity="sha384-HGfztofotfshcF7+8n44JQL2oJmowVChPTg48S+jvZoztPfvwD79OC/LTtG6dMp+" crossorigin="anonymous" {}
                    script src="https://unpkg.com/htmx-ext-sse@2.2.3" integrity="sha384-Y4gc0CK6Kg+hmulDc6rZPJu0tqvk7EWlih0Oh+2OkAi1ZDlCbBDCQEE2uVk472Ky" crossorigin="anonymous" {}
                    script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4" {}
                    title { (school.name) ", " (school.city) " - Attendance" }
                }
                body hx-ext="sse" class="bg-gray-900 min-h-screen flex flex-col items-center text-white" {
                    (nav)
                    main class="w-full flex flex-col items-center p-4" {
                        (markup)
                    }
                }
            }
        }
    }

    pub fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub fn today(&self) -> Date {
        self.config.school_config().today()
    }

    pub fn sms_gateway(&self) -> Arc<dyn SmsGateway> {
        self.sms_gateway.clone()
    }

    pub async fn get_connection(&self) -> RollcallResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context(GetDatabaseConnectionSnafu)
    }

    pub async fn get_transaction(&self) -> RollcallResult<Transaction<'static, Sqlite>> {
        self.pool.begin().await.context(GetDatabaseConnectionSnafu)
    }

    pub fn subscribe_to_sse_feed(&self) -> Receiver<SseEvent> {
        self.sse_events_sender.subscribe()
    }

    pub fn send_sse_event(&self, event: SseEvent) {
        let _ = self.sse_events_sender.send(event);
    }

    pub async fn sensible_shutdown(&self) {
        self.pool.close().await;
    }
}

impl Deref for RollcallState {
    type Target = Pool<Sqlite>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
