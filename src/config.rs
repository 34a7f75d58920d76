//! Token lifetime and last-access telemetry configuration.

use regex::Regex;

const DEFAULT_UNVERIFIED_SESSION_TTL_SECONDS: i64 = 28 * 24 * 60 * 60;
const DEFAULT_KEY_FETCH_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_PASSWORD_FORGOT_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_ACCOUNT_RESET_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_PASSWORD_FORGOT_TRIES: u32 = 3;
const DEFAULT_UNBLOCK_CODE_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_SIGNIN_CODE_TTL_SECONDS: i64 = 15 * 60;

/// Lifetimes for tokens and one-time codes.
///
/// Verified session tokens default to an infinite lifetime (`None`); every
/// other window is a fixed absolute span measured from creation.
#[derive(Clone, Debug)]
pub struct TokenConfig {
    session_lifetime_seconds: Option<i64>,
    unverified_session_ttl_seconds: i64,
    key_fetch_ttl_seconds: i64,
    password_forgot_ttl_seconds: i64,
    account_reset_ttl_seconds: i64,
    password_forgot_tries: u32,
    unblock_code_ttl_seconds: i64,
    signin_code_ttl_seconds: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_lifetime_seconds: None,
            unverified_session_ttl_seconds: DEFAULT_UNVERIFIED_SESSION_TTL_SECONDS,
            key_fetch_ttl_seconds: DEFAULT_KEY_FETCH_TTL_SECONDS,
            password_forgot_ttl_seconds: DEFAULT_PASSWORD_FORGOT_TTL_SECONDS,
            account_reset_ttl_seconds: DEFAULT_ACCOUNT_RESET_TTL_SECONDS,
            password_forgot_tries: DEFAULT_PASSWORD_FORGOT_TRIES,
            unblock_code_ttl_seconds: DEFAULT_UNBLOCK_CODE_TTL_SECONDS,
            signin_code_ttl_seconds: DEFAULT_SIGNIN_CODE_TTL_SECONDS,
        }
    }

    /// Lifetime for verified session tokens; `None` means they never expire.
    #[must_use]
    pub fn with_session_lifetime_seconds(mut self, seconds: Option<i64>) -> Self {
        self.session_lifetime_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_unverified_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.unverified_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_key_fetch_ttl_seconds(mut self, seconds: i64) -> Self {
        self.key_fetch_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_forgot_ttl_seconds(mut self, seconds: i64) -> Self {
        self.password_forgot_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_account_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.account_reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_forgot_tries(mut self, tries: u32) -> Self {
        self.password_forgot_tries = tries;
        self
    }

    #[must_use]
    pub fn with_unblock_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.unblock_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_signin_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.signin_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn session_lifetime_seconds(&self) -> Option<i64> {
        self.session_lifetime_seconds
    }

    #[must_use]
    pub fn unverified_session_ttl_seconds(&self) -> i64 {
        self.unverified_session_ttl_seconds
    }

    #[must_use]
    pub fn key_fetch_ttl_seconds(&self) -> i64 {
        self.key_fetch_ttl_seconds
    }

    #[must_use]
    pub fn password_forgot_ttl_seconds(&self) -> i64 {
        self.password_forgot_ttl_seconds
    }

    #[must_use]
    pub fn account_reset_ttl_seconds(&self) -> i64 {
        self.account_reset_ttl_seconds
    }

    #[must_use]
    pub fn password_forgot_tries(&self) -> u32 {
        self.password_forgot_tries
    }

    #[must_use]
    pub fn unblock_code_ttl_seconds(&self) -> i64 {
        self.unblock_code_ttl_seconds
    }

    #[must_use]
    pub fn signin_code_ttl_seconds(&self) -> i64 {
        self.signin_code_ttl_seconds
    }
}

/// Gating for last-access telemetry writes.
///
/// Injected into the session component at construction; there is no ambient
/// global state. `sample_rate` is the probability that an eligible call
/// records telemetry; `eligible_emails` optionally restricts updates to
/// accounts whose email matches the pattern.
#[derive(Clone, Debug)]
pub struct LastAccessConfig {
    enabled: bool,
    sample_rate: f64,
    eligible_emails: Option<String>,
}

impl Default for LastAccessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LastAccessConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            sample_rate: 1.0,
            eligible_emails: None,
        }
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_eligible_emails(mut self, pattern: impl Into<String>) -> Self {
        self.eligible_emails = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[must_use]
    pub fn eligible_emails(&self) -> Option<&str> {
        self.eligible_emails.as_deref()
    }

    /// Whether an account email is in scope for telemetry updates.
    /// An unparseable pattern matches nothing.
    pub(crate) fn email_eligible(&self, email: &str) -> bool {
        match &self.eligible_emails {
            None => true,
            Some(pattern) => Regex::new(pattern).is_ok_and(|regex| regex.is_match(email)),
        }
    }
}
