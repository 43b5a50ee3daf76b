use crate::{
    config::sms::SmsConfig,
    error::{BuildHttpClientSnafu, RollcallError, RollcallResult, SmsRequestSnafu},
    notify::{SmsDelivery, SmsGateway},
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use snafu::ResultExt;
use std::{sync::Arc, time::Duration};

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct TwilioMessage {
    sid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwilioGateway {
    client: reqwest::Client,
    config: Arc<SmsConfig>,
    retry_delays: Vec<Duration>,
}

impl TwilioGateway {
    pub fn new(config: Arc<SmsConfig>) -> RollcallResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(BuildHttpClientSnafu)?;

        Ok(Self {
            client,
            config,
            retry_delays: RETRY_DELAYS.to_vec(),
        })
    }

    #[must_use]
    pub fn with_retry_delays(mut self, retry_delays: Vec<Duration>) -> Self {
        self.retry_delays = retry_delays;
        self
    }

    async fn try_send(&self, to: &str, body: &str) -> RollcallResult<SmsDelivery> {
        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .context(SmsRequestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RollcallError::SmsRejected {
                status: status.as_u16(),
                body,
            });
        }

        let message: TwilioMessage = response.json().await.context(SmsRequestSnafu)?;
        Ok(SmsDelivery::Delivered {
            provider_id: message.sid,
        })
    }
}

//4xx means the request itself was bad (eg. an invalid number), so sending it again won't help
fn is_permanent(error: &RollcallError) -> bool {
    matches!(error, RollcallError::SmsRejected { status, .. } if (400..500).contains(status) && *status != 429)
}

#[async_trait]
impl SmsGateway for TwilioGateway {
    async fn send(&self, to: &str, body: &str) -> RollcallResult<SmsDelivery> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(to, body).await {
                Ok(delivery) => return Ok(delivery),
                Err(e) if is_permanent(&e) => {
                    error!(?e, %to, "SMS rejected by provider");
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, %to, error = %e, "SMS attempt failed, retrying");
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        self.try_send(to, body).await.inspect_err(|e| {
            error!(?e, %to, "SMS failed after all retries");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Form, Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
    };
    use secrecy::SecretString;
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct FakeTwilio {
        failures_before_success: usize,
        status_when_failing: u16,
        calls: AtomicUsize,
        forms: Mutex<Vec<HashMap<String, String>>>,
        auth_headers: Mutex<Vec<String>>,
    }

    async fn fake_messages(
        State(fake): State<Arc<FakeTwilio>>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> impl IntoResponse {
        let call = fake.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(auth) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
            fake.auth_headers.lock().unwrap().push(auth.to_string());
        }
        fake.forms.lock().unwrap().push(form);

        if call < fake.failures_before_success {
            let status = StatusCode::from_u16(fake.status_when_failing).unwrap();
            (status, Json(json!({"message": "nope"}))).into_response()
        } else {
            (StatusCode::CREATED, Json(json!({"sid": "SM123"}))).into_response()
        }
    }

    async fn spawn_fake(fake: Arc<FakeTwilio>) -> TwilioGateway {
        let app = Router::new()
            .route(
                "/2010-04-01/Accounts/{sid}/Messages.json",
                post(fake_messages),
            )
            .with_state(fake);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let config = SmsConfig {
            account_sid: "AC123".into(),
            auth_token: SecretString::from("token"),
            from_number: "+15550001111".into(),
            api_base: format!("http://{addr}"),
        };
        let mut gateway = TwilioGateway::new(Arc::new(config))
            .unwrap()
            .with_retry_delays(vec![Duration::ZERO; 3]);
        gateway.client = reqwest::Client::builder().no_proxy().build().unwrap();
        gateway
    }

    #[tokio::test]
    async fn sends_form_with_basic_auth_and_reads_sid() {
        let fake = Arc::new(FakeTwilio::default());
        let gateway = spawn_fake(fake.clone()).await;

        let delivery = gateway.send("+447700900001", "hello").await.unwrap();
        assert_eq!(
            delivery,
            SmsDelivery::Delivered {
                provider_id: Some("SM123".into())
            }
        );

        let forms = fake.forms.lock().unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0]["To"], "+447700900001");
        assert_eq!(forms[0]["From"], "+15550001111");
        assert_eq!(forms[0]["Body"], "hello");
        assert!(fake.auth_headers.lock().unwrap()[0].starts_with("Basic "));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let fake = Arc::new(FakeTwilio {
            failures_before_success: 2,
            status_when_failing: 503,
            ..FakeTwilio::default()
        });
        let gateway = spawn_fake(fake.clone()).await;

        assert!(gateway.send("+447700900001", "hello").await.is_ok());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_last_retry() {
        let fake = Arc::new(FakeTwilio {
            failures_before_success: usize::MAX,
            status_when_failing: 500,
            ..FakeTwilio::default()
        });
        let gateway = spawn_fake(fake.clone()).await;

        let result = gateway.send("+447700900001", "hello").await;
        assert!(matches!(
            result,
            Err(RollcallError::SmsRejected { status: 500, .. })
        ));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let fake = Arc::new(FakeTwilio {
            failures_before_success: usize::MAX,
            status_when_failing: 400,
            ..FakeTwilio::default()
        });
        let gateway = spawn_fake(fake.clone()).await;

        assert!(gateway.send("not-a-number", "hello").await.is_err());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }
}
