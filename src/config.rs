use crate::{
    config::{auth::AuthConfig, sms::SmsConfig},
    error::{
        BadEnvVarSnafu, InvalidTimezoneSnafu, ParseEnvNumberSnafu, RollcallError, RollcallResult,
    },
};
use dotenvy::var;
use jiff::{Zoned, civil::Date, tz::TimeZone};
use snafu::ResultExt;
use std::{num::ParseIntError, str::FromStr, sync::Arc};

pub mod auth;
pub mod sms;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://attendance.db";
pub const DEFAULT_SERVER_IP: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct RuntimeConfiguration {
    db_config: Arc<DbConfig>,
    server_config: Arc<ServerConfig>,
    school_config: Arc<SchoolConfig>,
    auth_config: Arc<AuthConfig>,
    sms_config: Option<Arc<SmsConfig>>,
}

impl RuntimeConfiguration {
    pub fn new() -> RollcallResult<Self> {
        Ok(Self {
            db_config: Arc::new(DbConfig::new()?),
            server_config: Arc::new(ServerConfig::new()?),
            school_config: Arc::new(SchoolConfig::new()?),
            auth_config: Arc::new(AuthConfig::new()?),
            sms_config: SmsConfig::new()?.map(Arc::new),
        })
    }

    pub fn from_parts(
        db_config: DbConfig,
        server_config: ServerConfig,
        school_config: SchoolConfig,
        auth_config: AuthConfig,
        sms_config: Option<SmsConfig>,
    ) -> Self {
        Self {
            db_config: Arc::new(db_config),
            server_config: Arc::new(server_config),
            school_config: Arc::new(school_config),
            auth_config: Arc::new(auth_config),
            sms_config: sms_config.map(Arc::new),
        }
    }

    pub fn db_config(&self) -> Arc<DbConfig> {
        self.db_config.clone()
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }

    pub fn school_config(&self) -> Arc<SchoolConfig> {
        self.school_config.clone()
    }

    pub fn auth_config(&self) -> Arc<AuthConfig> {
        self.auth_config.clone()
    }

    pub fn sms_config(&self) -> Option<Arc<SmsConfig>> {
        self.sms_config.clone()
    }
}

///reads an optional numeric env var, falling back to `default` when it isn't set
pub(crate) fn env_number<T: FromStr<Err = ParseIntError>>(
    name: &'static str,
    default: T,
) -> RollcallResult<T> {
    match optional_env(name)? {
        Some(found) => found.trim().parse().context(ParseEnvNumberSnafu { name }),
        None => Ok(default),
    }
}

pub(crate) fn optional_env(name: &'static str) -> RollcallResult<Option<String>> {
    match var(name) {
        Ok(found) if found.trim().is_empty() => Ok(None),
        Ok(found) => Ok(Some(found)),
        Err(dotenvy::Error::EnvVar(std::env::VarError::NotPresent)) => Ok(None),
        Err(source) => Err(source).context(BadEnvVarSnafu { name }),
    }
}

pub(crate) fn env_bool(name: &'static str, default: bool) -> RollcallResult<bool> {
    let Some(found) = optional_env(name)? else {
        return Ok(default);
    };

    match found.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RollcallError::ParseEnvBool { name, found }),
    }
}

#[derive(Debug)]
pub struct DbConfig {
    url: String,
}

impl DbConfig {
    pub fn new() -> RollcallResult<Self> {
        Ok(Self {
            url: optional_env("DATABASE_URL")?.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
        })
    }

    pub const fn from_url(url: String) -> Self {
        Self { url }
    }

    pub fn get_db_path(&self) -> &str {
        &self.url
    }
}

#[derive(Debug)]
pub struct ServerConfig {
    pub server_ip: String,
    pub max_content_length: usize,
}

impl ServerConfig {
    pub fn new() -> RollcallResult<Self> {
        Ok(Self {
            server_ip: optional_env("ROLLCALL_SERVER_IP")?
                .unwrap_or_else(|| DEFAULT_SERVER_IP.to_string()),
            max_content_length: env_number("MAX_CONTENT_LENGTH", DEFAULT_MAX_CONTENT_LENGTH)?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_ip: DEFAULT_SERVER_IP.to_string(),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchoolConfig {
    pub name: String,
    pub city: String,
    pub timezone: TimeZone,
}

impl SchoolConfig {
    pub fn new() -> RollcallResult<Self> {
        let tz = optional_env("SCHOOL_TIMEZONE")?.unwrap_or_else(|| "UTC".to_string());
        let timezone = TimeZone::get(&tz).context(InvalidTimezoneSnafu { tz })?;

        Ok(Self {
            name: optional_env("COLLEGE_NAME")?.unwrap_or_else(|| "Your College Name".to_string()),
            city: optional_env("COLLEGE_CITY")?.unwrap_or_else(|| "Your City".to_string()),
            timezone,
        })
    }

    ///the current civil date at the school
    pub fn today(&self) -> Date {
        Zoned::now().with_time_zone(self.timezone.clone()).date()
    }
}

impl Default for SchoolConfig {
    fn default() -> Self {
        Self {
            name: "Your College Name".to_string(),
            city: "Your City".to_string(),
            timezone: TimeZone::UTC,
        }
    }
}
