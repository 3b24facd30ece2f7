use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeDelta};
use sea_orm::EntityTrait;
use tempfile::TempDir;
use uuid::Uuid;

use zoo_tracker::{
    auth::AuthenticatedUser,
    db::{
        dao::{DaoContext, NewRefreshToken, RefreshTokenDao, RotationOutcome},
        entities::refresh_token,
    },
    session::{Clock, IssuedSession, ManualClock, SessionError},
    state::AppState,
    test_helpers::{sqlite_file_db, test_epoch, test_state, test_state_with_db},
};

struct Harness {
    clock: ManualClock,
    state: Arc<AppState>,
    user: AuthenticatedUser,
}

impl Harness {
    async fn new() -> Self {
        let clock = ManualClock::new(test_epoch());
        let state = test_state(&clock).await;
        Self::over(clock, state).await
    }

    async fn over(clock: ManualClock, state: Arc<AppState>) -> Self {
        let user = DaoContext::new(&state.db)
            .user()
            .create_user(
                "keeper@zoo.example",
                "not-a-real-hash",
                test_epoch().fixed_offset(),
            )
            .await
            .expect("user should insert");
        Self {
            clock,
            state,
            user: AuthenticatedUser { id: user.id },
        }
    }

    fn clock_now(&self) -> DateTime<FixedOffset> {
        self.clock.now().fixed_offset()
    }

    fn tokens(&self) -> RefreshTokenDao {
        DaoContext::new(&self.state.db).refresh_token()
    }

    async fn login(&self) -> IssuedSession {
        self.state
            .sessions
            .login(self.user)
            .await
            .expect("login should succeed")
    }

    async fn refresh(&self, session: &IssuedSession) -> Result<IssuedSession, SessionError> {
        self.state
            .sessions
            .refresh(
                &session.refresh_token,
                Some(&session.csrf_token),
                Some(&session.csrf_token),
            )
            .await
    }

    async fn record_for(&self, session: &IssuedSession) -> refresh_token::Model {
        self.tokens()
            .find_by_hash(&self.state.sessions.hash_token(&session.refresh_token))
            .await
            .expect("lookup should succeed")
            .expect("record should exist")
    }
}

#[tokio::test]
async fn login_persists_an_active_record_for_the_returned_token() {
    let h = Harness::new().await;

    let session = h.login().await;
    let record = h.record_for(&session).await;

    assert!(record.revoked_at.is_none());
    assert!(record.replaced_by_id.is_none());
    assert_eq!(record.user_id, h.user.id);
    assert_eq!(record.family_id, session.family_id);
    assert_eq!(record.issued_at, record.last_used_at);
    assert_eq!(
        record.absolute_expires_at,
        test_epoch().fixed_offset() + TimeDelta::days(1)
    );
    assert_ne!(record.token_hash, session.refresh_token);
}

#[tokio::test]
async fn refresh_rotates_once_within_the_same_family() {
    let h = Harness::new().await;
    let first = h.login().await;

    h.clock.advance(TimeDelta::minutes(5));
    let second = h.refresh(&first).await.expect("refresh should succeed");

    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.access_token, first.access_token);
    assert_eq!(second.family_id, first.family_id);

    let old = h.record_for(&first).await;
    let new = h.record_for(&second).await;
    assert!(old.is_revoked() && old.was_rotated());
    assert_eq!(old.replaced_by_id, Some(new.id));
    assert!(new.revoked_at.is_none());
    assert_eq!(new.family_id, old.family_id);
    assert_eq!(new.issued_at, h.clock_now());
}

#[tokio::test]
async fn replaying_a_rotated_token_kills_the_whole_family() {
    let h = Harness::new().await;
    let a = h.login().await;
    let b = h.refresh(&a).await.expect("first refresh should succeed");

    let err = h.refresh(&a).await.expect_err("replay should fail");
    assert!(matches!(err, SessionError::SessionReplayDetected));

    let family = h
        .tokens()
        .find_family(a.family_id)
        .await
        .expect("family lookup should succeed");
    assert_eq!(family.len(), 2);
    assert!(family.iter().all(|row| row.revoked_at.is_some()));

    let err = h.refresh(&b).await.expect_err("successor should be dead too");
    assert!(matches!(err, SessionError::SessionReplayDetected));
}

#[tokio::test]
async fn replay_leaves_other_families_alone() {
    let h = Harness::new().await;
    let laptop = h.login().await;
    let phone = h.login().await;
    h.refresh(&laptop).await.expect("refresh should succeed");

    h.refresh(&laptop).await.expect_err("replay should fail");

    assert!(h.record_for(&phone).await.revoked_at.is_none());
    h.refresh(&phone)
        .await
        .expect("unrelated family should still refresh");
}

#[tokio::test]
async fn csrf_mismatch_does_not_rotate() {
    let h = Harness::new().await;
    let session = h.login().await;

    let err = h
        .state
        .sessions
        .refresh(&session.refresh_token, None, Some(&session.csrf_token))
        .await
        .expect_err("missing header should fail");
    assert!(matches!(err, SessionError::CsrfMismatch));

    let err = h
        .state
        .sessions
        .refresh(
            &session.refresh_token,
            Some("forged"),
            Some(&session.csrf_token),
        )
        .await
        .expect_err("mismatched header should fail");
    assert!(matches!(err, SessionError::CsrfMismatch));

    assert!(h.record_for(&session).await.revoked_at.is_none());
    h.refresh(&session)
        .await
        .expect("token should still be usable");
}

#[tokio::test]
async fn unknown_refresh_token_is_not_found() {
    let h = Harness::new().await;

    let err = h
        .state
        .sessions
        .refresh("never-issued", Some("c"), Some("c"))
        .await
        .expect_err("refresh should fail");
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn logout_revokes_family_and_is_repeatable() {
    let h = Harness::new().await;
    let a = h.login().await;
    let b = h.refresh(&a).await.expect("refresh should succeed");

    h.state
        .sessions
        .logout(&b.refresh_token)
        .await
        .expect("logout should succeed");
    let revoked = h.record_for(&b).await;
    assert!(revoked.is_revoked() && !revoked.was_rotated());

    h.state
        .sessions
        .logout(&b.refresh_token)
        .await
        .expect("second logout should be a no-op");

    let err = h
        .state
        .sessions
        .logout("never-issued")
        .await
        .expect_err("unknown token should fail");
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn access_token_expires_after_its_ttl() {
    let h = Harness::new().await;
    let session = h.login().await;

    let claims = h
        .state
        .sessions
        .verify_access_token(&session.access_token)
        .expect("fresh token should verify");
    assert_eq!(claims.user_id(), Some(h.user.id));

    h.clock.advance(TimeDelta::seconds(15 * 60 - 1));
    assert!(h
        .state
        .sessions
        .verify_access_token(&session.access_token)
        .is_ok());

    h.clock.advance(TimeDelta::seconds(1));
    let err = h
        .state
        .sessions
        .verify_access_token(&session.access_token)
        .expect_err("token should have expired");
    assert!(matches!(err, SessionError::Expired));
}

#[tokio::test]
async fn idle_gap_times_out_before_absolute_limit() {
    let h = Harness::new().await;
    let first = h.login().await;

    h.clock.advance(TimeDelta::minutes(30));
    let second = h.refresh(&first).await.expect("refresh should succeed");

    h.clock.advance(TimeDelta::hours(1) + TimeDelta::seconds(1));
    let err = h.refresh(&second).await.expect_err("idle gap should fail");
    assert!(matches!(err, SessionError::IdleTimeout));
    assert!(h.record_for(&second).await.revoked_at.is_some());
}

#[tokio::test]
async fn absolute_expiry_is_inherited_not_extended() {
    let h = Harness::new().await;
    let mut session = h.login().await;
    let origin_expiry = session.refresh_expires_at;

    // Keep the session busy so the idle limit never triggers.
    for _ in 0..24 {
        h.clock.advance(TimeDelta::minutes(59));
        session = h.refresh(&session).await.expect("refresh should succeed");
        assert_eq!(session.refresh_expires_at, origin_expiry);
        assert_eq!(
            h.record_for(&session).await.absolute_expires_at,
            origin_expiry.fixed_offset()
        );
    }

    h.clock.set(origin_expiry + TimeDelta::seconds(1));
    let last = h.record_for(&session).await;
    assert!(h.clock_now() - last.last_used_at <= TimeDelta::hours(1));

    let err = h
        .refresh(&session)
        .await
        .expect_err("family should be past its absolute limit");
    assert!(matches!(err, SessionError::AbsoluteTimeout));
}

#[tokio::test]
async fn refresh_cookie_lifetime_shrinks_with_the_family() {
    let h = Harness::new().await;
    let first = h.login().await;
    assert_eq!(first.refresh_max_age, 24 * 60 * 60);

    h.clock.advance(TimeDelta::minutes(10));
    let second = h.refresh(&first).await.expect("refresh should succeed");
    assert_eq!(second.refresh_max_age, 24 * 60 * 60 - 10 * 60);
}

#[tokio::test]
async fn second_rotation_of_the_same_row_is_superseded() {
    let h = Harness::new().await;
    let session = h.login().await;
    let current = h.record_for(&session).await;
    let tokens = h.tokens();
    let now = h.clock_now();

    let replacement = |hash: &str| NewRefreshToken {
        user_id: current.user_id,
        token_hash: hash.to_string(),
        family_id: current.family_id,
        issued_at: now,
        absolute_expires_at: current.absolute_expires_at,
    };

    let first = tokens
        .rotate(&current, replacement("winner"), now)
        .await
        .expect("first rotation should run");
    assert!(matches!(first, RotationOutcome::Rotated(_)));

    // Same stale snapshot, as a concurrent request would hold it.
    let second = tokens
        .rotate(&current, replacement("loser"), now)
        .await
        .expect("second rotation should run");
    assert!(matches!(second, RotationOutcome::Superseded));

    assert!(
        tokens
            .find_by_hash("loser")
            .await
            .expect("lookup should succeed")
            .is_none()
    );
    let family = tokens
        .find_family(current.family_id)
        .await
        .expect("family lookup should succeed");
    assert_eq!(family.len(), 2);
}

#[tokio::test]
async fn sweep_deletes_only_families_past_absolute_expiry() {
    let h = Harness::new().await;
    let old = h.login().await;

    h.clock.advance(TimeDelta::hours(12));
    let young = h.login().await;
    h.refresh(&young).await.expect("refresh should succeed");

    h.clock.advance(TimeDelta::hours(12) + TimeDelta::seconds(1));
    let deleted = h
        .state
        .sessions
        .sweep_expired()
        .await
        .expect("sweep should succeed");
    assert_eq!(deleted, 1);

    let remaining = refresh_token::Entity::find()
        .all(&h.state.db)
        .await
        .expect("query should succeed");
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|row| row.family_id == young.family_id));
    assert!(
        h.tokens()
            .find_by_hash(&h.state.sessions.hash_token(&old.refresh_token))
            .await
            .expect("lookup should succeed")
            .is_none()
    );
}

#[tokio::test]
async fn tokens_are_unique_per_session() {
    let h = Harness::new().await;

    let a = h.login().await;
    let b = h.login().await;

    assert_ne!(a.family_id, b.family_id);
    assert_ne!(a.refresh_token, b.refresh_token);
    assert_ne!(a.csrf_token, b.csrf_token);
    assert_ne!(a.family_id, Uuid::nil());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_refreshes_of_one_token_admit_a_single_winner() {
    let dir = TempDir::new().expect("temp dir should be created");
    let clock = ManualClock::new(test_epoch());
    let db = sqlite_file_db(&dir.path().join("sessions.db"), 4).await;
    let h = Harness::over(clock.clone(), test_state_with_db(&clock, db)).await;

    for _ in 0..10 {
        let session = h.login().await;
        let spawn_refresh = || {
            let state = Arc::clone(&h.state);
            let refresh = session.refresh_token.clone();
            let csrf = session.csrf_token.clone();
            tokio::spawn(async move {
                state
                    .sessions
                    .refresh(&refresh, Some(&csrf), Some(&csrf))
                    .await
            })
        };

        let (a, b) = tokio::join!(spawn_refresh(), spawn_refresh());
        let outcomes = [
            a.expect("refresh task should not panic"),
            b.expect("refresh task should not panic"),
        ];

        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let replays = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(SessionError::SessionReplayDetected)))
            .count();
        let errors = outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().err().map(ToString::to_string))
            .collect::<Vec<_>>();
        assert_eq!((winners, replays), (1, 1), "errors: {errors:?}");

        // The loser revokes the family, including the winner's fresh token.
        let family = refresh_token::Entity::find()
            .all(&h.state.db)
            .await
            .expect("rows should load")
            .into_iter()
            .filter(|row| row.family_id == session.family_id)
            .collect::<Vec<_>>();
        assert_eq!(family.len(), 2);
        assert!(family.iter().all(|row| row.revoked_at.is_some()));
    }
}
