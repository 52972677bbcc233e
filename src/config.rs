use std::{env, fmt::Display, ops::RangeInclusive, path::PathBuf, str::FromStr};

use chrono::Duration;
use tracing::{info, warn};

use crate::commands::access_codes::MIN_CODE_LENGTH;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    /// Length of generated access codes.
    pub code_length: usize,
    /// Lifetime of sessions issued on access-code redemption.
    pub cashier_session_hours: i64,
    /// Lifetime of sessions issued on admin sign-in or sign-up.
    pub admin_session_hours: i64,
    /// Consecutive failed sign-ins before the account is locked.
    pub max_failed_logins: u32,
    pub lockout_minutes: i64,
    pub min_password_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("cafeteria.db"),
            code_length: 6,
            cashier_session_hours: 8,
            admin_session_hours: 24,
            max_failed_logins: 5,
            lockout_minutes: 15,
            min_password_length: 8,
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults.
    pub fn load() -> Self {
        let defaults = Self::default();

        let loaded = Self {
            database_path: try_load("CAFETERIA_DB_PATH", defaults.database_path),
            code_length: try_load("CAFETERIA_CODE_LENGTH", defaults.code_length),
            cashier_session_hours: try_load(
                "CAFETERIA_CASHIER_SESSION_HOURS",
                defaults.cashier_session_hours,
            ),
            admin_session_hours: try_load(
                "CAFETERIA_ADMIN_SESSION_HOURS",
                defaults.admin_session_hours,
            ),
            max_failed_logins: try_load("CAFETERIA_MAX_FAILED_LOGINS", defaults.max_failed_logins),
            lockout_minutes: try_load("CAFETERIA_LOCKOUT_MINUTES", defaults.lockout_minutes),
            min_password_length: try_load(
                "CAFETERIA_MIN_PASSWORD_LENGTH",
                defaults.min_password_length,
            ),
        };
        loaded.validated()
    }

    /// Replace out-of-range values with their defaults.
    pub fn validated(self) -> Self {
        let defaults = Self::default();

        Self {
            code_length: within(
                "CAFETERIA_CODE_LENGTH",
                self.code_length,
                MIN_CODE_LENGTH..=32,
                defaults.code_length,
            ),
            cashier_session_hours: within(
                "CAFETERIA_CASHIER_SESSION_HOURS",
                self.cashier_session_hours,
                1..=MAX_SESSION_HOURS,
                defaults.cashier_session_hours,
            ),
            admin_session_hours: within(
                "CAFETERIA_ADMIN_SESSION_HOURS",
                self.admin_session_hours,
                1..=MAX_SESSION_HOURS,
                defaults.admin_session_hours,
            ),
            max_failed_logins: within(
                "CAFETERIA_MAX_FAILED_LOGINS",
                self.max_failed_logins,
                1..=100,
                defaults.max_failed_logins,
            ),
            lockout_minutes: within(
                "CAFETERIA_LOCKOUT_MINUTES",
                self.lockout_minutes,
                1..=MAX_SESSION_HOURS * 60,
                defaults.lockout_minutes,
            ),
            min_password_length: within(
                "CAFETERIA_MIN_PASSWORD_LENGTH",
                self.min_password_length,
                1..=128,
                defaults.min_password_length,
            ),
            ..self
        }
    }

    pub fn cashier_session_ttl(&self) -> Duration {
        Duration::hours(self.cashier_session_hours)
    }

    pub fn admin_session_ttl(&self) -> Duration {
        Duration::hours(self.admin_session_hours)
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }
}

// One year
const MAX_SESSION_HOURS: i64 = 24 * 366;

fn within<T>(key: &str, value: T, range: RangeInclusive<T>, default: T) -> T
where
    T: PartialOrd + std::fmt::Debug,
{
    if range.contains(&value) {
        value
    } else {
        warn!("{key} value {value:?} outside {range:?}, using default: {default:?}");
        default
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default:?}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default:?}");
            default
        }
    }
}
