use crate::{
    config::{DbConfig, RuntimeConfiguration, SchoolConfig, ServerConfig, auth::AuthConfig},
    data::{
        DataType,
        user::{AddPerson, AddUserKind, StudentProfile, TeacherProfile, User},
    },
    error::{RollcallError, RollcallResult},
    notify::{SmsDelivery, SmsGateway},
    routes::router,
    state::RollcallState,
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use email_address::EmailAddress;
use http_body_util::BodyExt;
use secrecy::SecretString;
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    ops::Deref,
    path::PathBuf,
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const TEST_SCHOOL: &str = "Hill College";
pub const TEST_CITY: &str = "Hillford";

///remembers every message instead of sending it
#[derive(Debug, Default)]
pub struct RecordingSmsGateway {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl RecordingSmsGateway {
    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, _)| to.clone())
            .collect()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    ///every send waits this long before doing anything
    pub fn slow_sends(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis().try_into().unwrap(), Ordering::SeqCst);
    }
}

#[async_trait]
impl SmsGateway for RecordingSmsGateway {
    async fn send(&self, to: &str, body: &str) -> RollcallResult<SmsDelivery> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(RollcallError::SmsRejected {
                status: 500,
                body: "test gateway told to fail".into(),
            });
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), body.to_string()));
        Ok(SmsDelivery::Delivered {
            provider_id: Some(format!("SM{}", sent.len())),
        })
    }
}

///a whole app on its own database file, which goes away with it
pub struct TestApp {
    pub state: RollcallState,
    pub sms: Arc<RecordingSmsGateway>,
    pub router: Router,
    db_path: PathBuf,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_path = std::env::temp_dir().join(format!("rollcall-test-{}.db", Uuid::new_v4()));
        let config = RuntimeConfiguration::from_parts(
            DbConfig::from_url(format!("sqlite://{}", db_path.display())),
            ServerConfig::default(),
            SchoolConfig {
                name: TEST_SCHOOL.into(),
                city: TEST_CITY.into(),
                ..SchoolConfig::default()
            },
            AuthConfig {
                bcrypt_cost: 4,
                secure_cookies: false,
                ..AuthConfig::default()
            },
            None,
        );

        let sms = Arc::new(RecordingSmsGateway::default());
        let state = RollcallState::new(
            SqlitePoolOptions::new().max_connections(5),
            config,
            sms.clone(),
        )
        .await
        .unwrap();
        let router = router(state.clone());

        Self {
            state,
            sms,
            router,
            db_path,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    ///logs in and hands back the session cookie
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .request(form_request(
                "POST",
                "/login",
                None,
                &[("login", username), ("password", TEST_PASSWORD)],
            ))
            .await;
        session_cookie(&response).expect("login should set a session cookie")
    }
}

impl Deref for TestApp {
    type Target = RollcallState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.db_path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

pub async fn test_state() -> TestApp {
    TestApp::new().await
}

///absence texts go out in the background, so this waits for `expected` rows to land in the log
pub async fn wait_for_notifications(state: &RollcallState, expected: i64) -> i64 {
    let mut logged = 0;
    for _ in 0..250 {
        logged = sqlx::query_scalar("SELECT COUNT(*) FROM sms_notifications")
            .fetch_one(&**state)
            .await
            .unwrap();
        if logged >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    logged
}

pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("id="))
        .and_then(|value| value.split(';').next())
        .map(ToString::to_string)
}

pub fn form_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    fields: &[(&str, &str)],
) -> Request<Body> {
    let body: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn add_person(
    state: &RollcallState,
    username: &str,
    phone: Option<&str>,
    kind: AddUserKind,
) -> User {
    let mut conn = state.get_connection().await.unwrap();
    let id = User::insert_into_database(
        AddPerson {
            username: username.to_string(),
            email: EmailAddress::from_str(&format!("{username}@school.test")).unwrap(),
            full_name: format!("{username} Testperson"),
            phone: phone.map(ToString::to_string),
            password: Some(SecretString::from(TEST_PASSWORD)),
            current_password_is_default: false,
            bcrypt_cost: 4,
            kind,
        },
        &mut conn,
    )
    .await
    .unwrap();

    User::get_from_db_by_id(id, &mut conn)
        .await
        .unwrap()
        .unwrap()
}

pub async fn add_student(
    state: &RollcallState,
    username: &str,
    roll_number: &str,
    class_name: &str,
) -> User {
    add_person(
        state,
        username,
        None,
        AddUserKind::Student(StudentProfile {
            roll_number: roll_number.into(),
            class_name: class_name.into(),
        }),
    )
    .await
}

pub async fn add_teacher(state: &RollcallState, username: &str, class_name: &str) -> User {
    add_person(
        state,
        username,
        None,
        AddUserKind::Teacher(TeacherProfile {
            class_name: class_name.into(),
            subject: "Maths".into(),
        }),
    )
    .await
}

pub async fn add_parent(state: &RollcallState, username: &str, phone: Option<&str>) -> User {
    add_person(state, username, phone, AddUserKind::Parent).await
}

pub async fn link(state: &RollcallState, parent: &User, student: &User) {
    User::link_parent_to_student(
        parent.id,
        student.id,
        &mut *state.get_connection().await.unwrap(),
    )
    .await
    .unwrap();
}
