use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// A bearer token together with the instant it stops being served.
///
/// Never mutated after construction; a refresh replaces the whole value.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub token_type: String,
    /// issued-at + server lifetime - expiry tolerance
    pub expires_at: DateTime<Utc>,
    /// scope actually granted, when the server echoes it
    pub scope: Option<String>,
}

impl CachedToken {
    pub fn new(
        access_token: String,
        token_type: String,
        expires_at: DateTime<Utc>,
        scope: Option<String>,
    ) -> Self {
        Self {
            access_token,
            token_type,
            expires_at,
            scope,
        }
    }

    /// Computes the expiry from the server-reported lifetime.
    ///
    /// A tolerance larger than the lifetime yields an expiry at or before
    /// `issued_at`, i.e. a token that is stale as soon as it is stored.
    pub fn from_lifetime(
        access_token: String,
        token_type: String,
        issued_at: DateTime<Utc>,
        expires_in_seconds: u64,
        tolerance: Duration,
        scope: Option<String>,
    ) -> Self {
        let lifetime = i64::try_from(expires_in_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .checked_sub_signed(tolerance)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(access_token, token_type, expires_at, scope)
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// Time left before the token goes stale, zero when already stale.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"***")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}
