use crate::{config::optional_env, error::RollcallResult};
use secrecy::SecretString;

pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

///Twilio credentials - when any of these are missing, absence messages are only logged
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
    pub api_base: String,
}

impl SmsConfig {
    pub fn new() -> RollcallResult<Option<Self>> {
        let (Some(account_sid), Some(auth_token), Some(from_number)) = (
            optional_env("TWILIO_ACCOUNT_SID")?,
            optional_env("TWILIO_AUTH_TOKEN")?,
            optional_env("TWILIO_PHONE_NUMBER")?,
        ) else {
            return Ok(None);
        };

        Ok(Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            from_number,
            api_base: optional_env("TWILIO_API_BASE")?
                .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string()),
        }))
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}
