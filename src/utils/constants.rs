//! Shared constants and invariants

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_TOKEN_EXPIRY_TOLERANCE_SECS: u64 = 120;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_TOKEN_PATH: &str = "/token";

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 1000;

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

// Token endpoint client authentication methods
pub const AUTH_METHOD_CLIENT_SECRET_BASIC: &str = "client_secret_basic";
pub const AUTH_METHOD_CLIENT_SECRET_POST: &str = "client_secret_post";
pub const AUTH_METHOD_PRIVATE_KEY_JWT: &str = "private_key_jwt";

pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
