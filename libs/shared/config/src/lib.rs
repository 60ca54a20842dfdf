use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_REASON_LENGTH: usize = 500;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub port: u16,
    pub store_timeout_ms: u64,
    pub auto_confirm_appointments: bool,
    pub max_reason_length: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            port: DEFAULT_PORT,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            auto_confirm_appointments: false,
            max_reason_length: DEFAULT_MAX_REASON_LENGTH,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            port: parse_var("PORT", DEFAULT_PORT),
            store_timeout_ms: parse_var("STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS),
            auto_confirm_appointments: parse_var("AUTO_CONFIRM_APPOINTMENTS", false),
            max_reason_length: parse_var("MAX_REASON_LENGTH", DEFAULT_MAX_REASON_LENGTH),
        };

        if !config.is_configured() {
            warn!("Supabase not configured - appointments will be kept in memory");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_not_configured() {
        let config = AppConfig::default();

        assert!(!config.is_configured());
        assert_eq!(config.port, 3000);
        assert_eq!(config.store_timeout(), Duration::from_millis(5_000));
        assert!(!config.auto_confirm_appointments);
    }

    #[test]
    fn test_configured_requires_all_supabase_values() {
        let mut config = AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        assert!(!config.is_configured());

        config.supabase_service_role_key = "service".to_string();
        assert!(config.is_configured());
    }

    #[test]
    fn test_parse_var_falls_back_on_garbage() {
        env::set_var("SHARED_CONFIG_TEST_TIMEOUT", "soon");
        assert_eq!(parse_var("SHARED_CONFIG_TEST_TIMEOUT", 42u64), 42);

        env::set_var("SHARED_CONFIG_TEST_TIMEOUT", " 250 ");
        assert_eq!(parse_var("SHARED_CONFIG_TEST_TIMEOUT", 42u64), 250);
        env::remove_var("SHARED_CONFIG_TEST_TIMEOUT");
    }
}
