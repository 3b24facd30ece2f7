use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        AuthenticatedUser, Claims,
        jwt::{JwtKeys, decode_token, encode_token, make_access_claims},
    },
    config::SessionConfig,
    db::{
        dao::{NewRefreshToken, RefreshTokenDao, RotationOutcome},
        entities::refresh_token,
    },
};

use super::{
    clock::{Clock, SystemClock},
    crypto::{TokenHasher, constant_time_eq, generate_opaque_token},
    error::SessionError,
};

/// Lifetimes applied to every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub access_ttl_secs: u64,
    pub idle_ttl: TimeDelta,
    pub absolute_ttl: TimeDelta,
}

impl SessionPolicy {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            access_ttl_secs: cfg.access_token_ttl_secs,
            idle_ttl: secs(cfg.refresh_idle_ttl_secs),
            absolute_ttl: secs(cfg.refresh_abs_ttl_secs),
        }
    }
}

fn secs(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Everything the HTTP layer needs to hand a session to the client.
pub struct IssuedSession {
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    /// Plaintext refresh value; disclosed here once and never recoverable from storage.
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    /// Seconds the refresh cookie stays valid (time left until the absolute expiry).
    pub refresh_max_age: u64,
    pub csrf_token: String,
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("user_id", &self.user_id)
            .field("family_id", &self.family_id)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("refresh_max_age", &self.refresh_max_age)
            .finish_non_exhaustive()
    }
}

/// Issues access tokens and owns the lifecycle of refresh-token families.
///
/// The refresh-token table is the only source of truth. Nothing about token
/// validity is cached in-process, so any number of instances can share it.
#[derive(Clone)]
pub struct SessionAuthority {
    tokens: RefreshTokenDao,
    keys: JwtKeys,
    hasher: TokenHasher,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
}

impl SessionAuthority {
    pub fn new(
        tokens: RefreshTokenDao,
        keys: JwtKeys,
        hasher: TokenHasher,
        policy: SessionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            keys,
            hasher,
            policy,
            clock,
        }
    }

    pub fn from_config(tokens: RefreshTokenDao, cfg: &SessionConfig) -> Self {
        Self::new(
            tokens,
            JwtKeys::from_secret(cfg.jwt_secret.as_bytes()),
            TokenHasher::new(&cfg.token_pepper),
            SessionPolicy::from_config(cfg),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn hash_token(&self, token: &str) -> String {
        self.hasher.hash(token)
    }

    /// Starts a new session family for an already authenticated user.
    pub async fn login(&self, user: AuthenticatedUser) -> Result<IssuedSession, SessionError> {
        let now = self.clock.now();
        let issued_at = now.fixed_offset();
        let family_id = Uuid::new_v4();

        let access_token = self.sign_access_token(&user.id, now)?;
        let refresh_token = generate_opaque_token()?;
        let csrf_token = generate_opaque_token()?;

        let record = self
            .tokens
            .create(NewRefreshToken {
                user_id: user.id,
                token_hash: self.hasher.hash(&refresh_token),
                family_id,
                issued_at,
                absolute_expires_at: issued_at
                    .checked_add_signed(self.policy.absolute_ttl)
                    .unwrap_or_else(|| DateTime::<Utc>::MAX_UTC.fixed_offset()),
            })
            .await?;

        info!(user_id = %user.id, family_id = %family_id, "session started");

        Ok(self.bundle(
            user.id,
            family_id,
            access_token,
            refresh_token,
            csrf_token,
            record.absolute_expires_at,
            now,
        ))
    }

    /// Rotates the presented refresh token into a new one of the same family.
    ///
    /// Presenting a token that is already revoked, or losing a rotation race
    /// for it, revokes the whole family before returning
    /// [`SessionError::SessionReplayDetected`].
    pub async fn refresh(
        &self,
        presented_token: &str,
        csrf_header: Option<&str>,
        csrf_cookie: Option<&str>,
    ) -> Result<IssuedSession, SessionError> {
        if !csrf_matches(csrf_header, csrf_cookie) {
            return Err(SessionError::CsrfMismatch);
        }

        let now = self.clock.now();
        let at = now.fixed_offset();

        let record = self
            .tokens
            .find_by_hash(&self.hasher.hash(presented_token))
            .await?
            .ok_or(SessionError::NotFound)?;

        if record.is_revoked() {
            self.revoke_family_on_replay(&record, at).await?;
            return Err(SessionError::SessionReplayDetected);
        }

        if at - record.last_used_at > self.policy.idle_ttl {
            self.tokens.revoke(record.id, at).await?;
            info!(family_id = %record.family_id, "session ended after idle timeout");
            return Err(SessionError::IdleTimeout);
        }

        if at > record.absolute_expires_at {
            self.tokens.revoke(record.id, at).await?;
            info!(family_id = %record.family_id, "session ended after absolute timeout");
            return Err(SessionError::AbsoluteTimeout);
        }

        let access_token = self.sign_access_token(&record.user_id, now)?;
        let refresh_token = generate_opaque_token()?;
        let csrf_token = generate_opaque_token()?;

        let replacement = NewRefreshToken {
            user_id: record.user_id,
            token_hash: self.hasher.hash(&refresh_token),
            family_id: record.family_id,
            issued_at: at,
            absolute_expires_at: record.absolute_expires_at,
        };

        match self.tokens.rotate(&record, replacement, at).await? {
            RotationOutcome::Rotated(next) => {
                debug!(
                    family_id = %next.family_id,
                    previous_id = %record.id,
                    next_id = %next.id,
                    "refresh token rotated"
                );
                Ok(self.bundle(
                    next.user_id,
                    next.family_id,
                    access_token,
                    refresh_token,
                    csrf_token,
                    next.absolute_expires_at,
                    now,
                ))
            }
            RotationOutcome::Superseded => {
                self.revoke_family_on_replay(&record, at).await?;
                Err(SessionError::SessionReplayDetected)
            }
        }
    }

    /// Revokes every token of the presented token's family.
    ///
    /// A token that was already revoked still resolves, so a repeated logout
    /// succeeds without changing anything.
    pub async fn logout(&self, presented_token: &str) -> Result<(), SessionError> {
        let at = self.clock.now().fixed_offset();
        let record = self
            .tokens
            .find_by_hash(&self.hasher.hash(presented_token))
            .await?
            .ok_or(SessionError::NotFound)?;

        let revoked = self.tokens.revoke_family(record.family_id, at).await?;
        info!(
            user_id = %record.user_id,
            family_id = %record.family_id,
            revoked,
            "session logged out"
        );
        Ok(())
    }

    /// Signature and expiry check only; never touches the database.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, SessionError> {
        let claims =
            decode_token(&self.keys, token).map_err(|_| SessionError::InvalidSignature)?;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    /// Deletes rows whose family is past its absolute expiry.
    ///
    /// Revoked rows inside the window are kept so a replay of them is still detected.
    pub async fn sweep_expired(&self) -> Result<u64, SessionError> {
        let at = self.clock.now().fixed_offset();
        Ok(self.tokens.delete_expired(at).await?)
    }

    async fn revoke_family_on_replay(
        &self,
        presented: &refresh_token::Model,
        at: DateTime<FixedOffset>,
    ) -> Result<(), SessionError> {
        let revoked = self.tokens.revoke_family(presented.family_id, at).await?;
        warn!(
            user_id = %presented.user_id,
            family_id = %presented.family_id,
            token_id = %presented.id,
            was_rotated = presented.was_rotated(),
            revoked,
            "refresh token reuse detected; family revoked"
        );
        Ok(())
    }

    fn sign_access_token(&self, user_id: &Uuid, now: DateTime<Utc>) -> Result<String, SessionError> {
        let claims = make_access_claims(user_id, now, self.policy.access_ttl_secs);
        encode_token(&self.keys, &claims).map_err(SessionError::Signing)
    }

    #[allow(clippy::too_many_arguments)]
    fn bundle(
        &self,
        user_id: Uuid,
        family_id: Uuid,
        access_token: String,
        refresh_token: String,
        csrf_token: String,
        absolute_expires_at: DateTime<FixedOffset>,
        now: DateTime<Utc>,
    ) -> IssuedSession {
        let refresh_expires_at = absolute_expires_at.with_timezone(&Utc);
        let refresh_max_age = u64::try_from((refresh_expires_at - now).num_seconds()).unwrap_or(0);
        IssuedSession {
            user_id,
            family_id,
            access_token,
            token_type: "Bearer",
            expires_in: self.policy.access_ttl_secs,
            refresh_token,
            refresh_expires_at,
            refresh_max_age,
            csrf_token,
        }
    }
}

fn csrf_matches(header: Option<&str>, cookie: Option<&str>) -> bool {
    match (header, cookie) {
        (Some(header), Some(cookie)) if !header.is_empty() => {
            constant_time_eq(header.as_bytes(), cookie.as_bytes())
        }
        _ => false,
    }
}
