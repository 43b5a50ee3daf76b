use crate::{
    config::{env_bool, env_number},
    error::RollcallResult,
};
use rand::{Rng, distr::Alphanumeric, rng};
use secrecy::SecretString;

pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 30 * 60;
pub const DEFAULT_GENERATED_PASSWORD_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
    pub generated_password_len: usize,
    pub session_lifetime_secs: i64,
    pub secure_cookies: bool,
}

impl AuthConfig {
    pub fn new() -> RollcallResult<Self> {
        Ok(Self {
            bcrypt_cost: env_number("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            generated_password_len: env_number(
                "GENERATED_PASSWORD_LEN",
                DEFAULT_GENERATED_PASSWORD_LEN,
            )?,
            session_lifetime_secs: env_number(
                "SESSION_LIFETIME_SECS",
                DEFAULT_SESSION_LIFETIME_SECS,
            )?,
            secure_cookies: env_bool("SESSION_SECURE_COOKIE", true)?,
        })
    }

    ///default passwords handed out when a teacher creates an account - these must be replaced on first login
    pub fn generate(&self) -> SecretString {
        let password: String = rng()
            .sample_iter(&Alphanumeric)
            .take(self.generated_password_len.max(8))
            .map(char::from)
            .collect();
        SecretString::from(password)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
            generated_password_len: DEFAULT_GENERATED_PASSWORD_LEN,
            session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            secure_cookies: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn generated_passwords_are_alphanumeric_and_sized() {
        let config = AuthConfig {
            generated_password_len: 12,
            ..AuthConfig::default()
        };

        let password = config.generate();
        assert_eq!(password.expose_secret().len(), 12);
        assert!(password.expose_secret().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_passwords_have_a_floor() {
        let config = AuthConfig {
            generated_password_len: 2,
            ..AuthConfig::default()
        };

        assert_eq!(config.generate().expose_secret().len(), 8);
    }

    #[test]
    fn generated_passwords_differ() {
        let config = AuthConfig::default();
        assert_ne!(
            config.generate().expose_secret(),
            config.generate().expose_secret()
        );
    }
}
