//! Integration tests for the silent authentication service.

mod test_helpers;

use chrono::{Duration as ChronoDuration, Utc};
use silent_auth::testing::MockUserDirectory;
use silent_auth::tokens::SessionTokenProvider;
use silent_auth::{AuditEventType, AuthConfig, AuthErrorCode, UserDirectory};
use std::time::Duration;
use test_helpers::{bound_user, harness, harness_with};

#[tokio::test]
async fn first_login_creates_user_then_resolves_same_user() {
    let h = harness();

    let first = h.auth.get_or_create_default_user("M1").await;
    assert!(first.success);
    assert!(first.is_new_user);
    assert!(first.session_token.is_some());
    let created_id = first.user_id().unwrap().to_string();

    let second = h.auth.get_or_create_default_user("M1").await;
    assert!(second.success);
    assert!(!second.is_new_user);
    assert_eq!(second.user_id().unwrap(), created_id);

    assert_eq!(h.directory.user_count(), 1);
    assert_eq!(h.audit.count_of(AuditEventType::UserCreated), 1);
    assert_eq!(h.audit.count_of(AuditEventType::LoginSuccess), 1);
}

#[tokio::test]
async fn distinct_machines_get_distinct_users() {
    let h = harness();

    let a = h.auth.get_or_create_default_user("M1").await;
    let b = h.auth.get_or_create_default_user("M2").await;
    assert!(a.success && b.success);
    assert_ne!(a.user_id(), b.user_id());

    let user_a = a.user.unwrap();
    let user_b = b.user.unwrap();
    assert_eq!(user_a.machine_id(), Some("M1"));
    assert_eq!(user_b.machine_id(), Some("M2"));
    assert_ne!(user_a.username, user_b.username);
}

#[tokio::test]
async fn empty_machine_id_fails_without_side_effects() {
    let h = harness();

    let result = h.auth.get_or_create_default_user("").await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AuthErrorCode::InvalidMachineId));

    assert_eq!(h.directory.user_count(), 0);
    assert!(h.audit.records().is_empty());
}

#[tokio::test]
async fn default_flagged_user_is_preferred() {
    let plain = bound_user("aaa", "M1");
    let mut preferred = bound_user("zzz", "M1");
    preferred.is_default = true;
    let preferred_id = preferred.id.clone();

    let h = harness_with(
        AuthConfig::default(),
        MockUserDirectory::new().with_user(plain).with_user(preferred),
    );

    let result = h.auth.get_or_create_default_user("M1").await;
    assert!(result.success);
    assert!(!result.is_new_user);
    assert_eq!(result.user_id().unwrap(), preferred_id);
}

#[tokio::test]
async fn generated_usernames_increment_until_unique() {
    let mut taken = bound_user("user", "M-other");
    taken.is_default = true;
    let h = harness_with(AuthConfig::default(), MockUserDirectory::new().with_user(taken));

    let result = h.auth.get_or_create_default_user("M1").await;
    assert!(result.success);
    assert_eq!(result.user.unwrap().username, "user1");
}

#[tokio::test]
async fn username_generation_is_bounded() {
    let directory = MockUserDirectory::new()
        .with_user(bound_user("user", "M-a"))
        .with_user(bound_user("user1", "M-b"));
    let h = harness_with(
        AuthConfig::default().max_username_attempts(2),
        directory,
    );

    let result = h.auth.get_or_create_default_user("M1").await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AuthErrorCode::UserCreationFailed));

    // The exhaustion is recorded as a failed-login event with the cap.
    assert_eq!(h.audit.count_of(AuditEventType::LoginFailure), 1);
    let record = h
        .audit
        .records()
        .into_iter()
        .find(|r| r.event_type == AuditEventType::LoginFailure)
        .unwrap();
    assert!(!record.success);
    assert_eq!(record.error_code, Some(AuthErrorCode::UserCreationFailed));
    assert_eq!(record.extra.get("attempts").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn failed_machine_binding_does_not_leave_live_orphan() {
    let h = harness();
    h.directory.fail_metadata_writes();

    let result = h.auth.get_or_create_default_user("M1").await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AuthErrorCode::UserCreationFailed));

    // The orphaned profile is deactivated and never resolvable again.
    let available = h.auth.get_available_users("M1").await.unwrap();
    assert!(available.is_empty());
    let page = h.directory.list_users(0, 10).await.unwrap();
    assert!(page.users.iter().all(|u| !u.is_active));
}

#[tokio::test]
async fn directory_outage_maps_to_internal_error() {
    let h = harness_with(AuthConfig::default(), MockUserDirectory::new_failing());

    let result = h.auth.get_or_create_default_user("M1").await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AuthErrorCode::InternalError));
}

#[tokio::test]
async fn audit_outage_does_not_block_login() {
    use silent_auth::testing::MemoryAuditSink;
    use silent_auth::{JwtSessionTokens, SilentAuthService};
    use std::sync::Arc;

    let auth = SilentAuthService::new(
        AuthConfig::default(),
        Arc::new(MockUserDirectory::new()),
        Arc::new(JwtSessionTokens::new_hmac(b"k", "silent-auth")),
        Arc::new(MemoryAuditSink::new_failing()),
    )
    .unwrap();

    let result = auth.get_or_create_default_user("M1").await;
    assert!(result.success);
}

#[tokio::test]
async fn switch_to_unknown_user_fails() {
    let h = harness();
    h.auth.get_or_create_default_user("M1").await;

    let result = h.auth.switch_user("nope", "M1").await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AuthErrorCode::UserNotFound));
}

#[tokio::test]
async fn switch_to_inactive_user_fails() {
    let mut inactive = bound_user("bob", "M1");
    inactive.is_active = false;
    let inactive_id = inactive.id.clone();
    let h = harness_with(AuthConfig::default(), MockUserDirectory::new().with_user(inactive));

    let result = h.auth.switch_user(&inactive_id, "M1").await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AuthErrorCode::UserInactive));
}

#[tokio::test]
async fn switch_with_wrong_machine_fails_and_mutates_nothing() {
    let user = bound_user("bob", "M1");
    let user_id = user.id.clone();
    let h = harness_with(AuthConfig::default(), MockUserDirectory::new().with_user(user));

    let result = h.auth.switch_user(&user_id, "M2").await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AuthErrorCode::MachineIdMismatch));

    // No session or profile state was touched; the rejection itself is
    // recorded as a failed-login event.
    assert_eq!(h.audit.count_of(AuditEventType::UserSwitched), 0);
    let stored = h.directory.get_user(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.last_login_at, None);

    let record = h
        .audit
        .records()
        .into_iter()
        .find(|r| r.event_type == AuditEventType::LoginFailure)
        .unwrap();
    assert!(!record.success);
    assert_eq!(record.error_code, Some(AuthErrorCode::MachineIdMismatch));
    assert_eq!(record.user_id.as_deref(), Some(user_id.as_str()));
}

#[tokio::test]
async fn switch_issues_a_distinct_token() {
    let user = bound_user("bob", "M1");
    let user_id = user.id.clone();
    let h = harness_with(AuthConfig::default(), MockUserDirectory::new().with_user(user));

    let first = h.auth.create_user_session(&user_id, "M1").await;
    assert!(first.success);

    let switched = h.auth.switch_user(&user_id, "M1").await;
    assert!(switched.success);
    assert_ne!(first.session_token, switched.session_token);
    assert_eq!(h.audit.count_of(AuditEventType::UserSwitched), 1);
}

#[tokio::test]
async fn validate_rejects_empty_inputs_with_reasons() {
    let h = harness();

    let missing_token = h.auth.validate_session("", "M1").await;
    assert!(!missing_token.is_valid);
    assert!(missing_token.failure_reason.unwrap().contains("token"));

    let missing_machine = h.auth.validate_session("some-token", "").await;
    assert!(!missing_machine.is_valid);
    assert!(missing_machine.failure_reason.unwrap().contains("machine"));
}

#[tokio::test]
async fn validate_resolves_user_and_expiry() {
    let h = harness();
    let login = h.auth.get_or_create_default_user("M1").await;
    let token = login.session_token.clone().unwrap();

    let validation = h.auth.validate_session(&token, "M1").await;
    assert!(validation.is_valid);
    assert_eq!(validation.user_id.as_deref(), login.user_id());
    assert_eq!(
        validation.expires_at.unwrap().timestamp(),
        login.expires_at.unwrap().timestamp()
    );
}

#[tokio::test]
async fn validate_fails_for_deactivated_user() {
    let h = harness();
    let login = h.auth.get_or_create_default_user("M1").await;
    let token = login.session_token.clone().unwrap();

    let mut user = login.user.unwrap();
    user.is_active = false;
    h.directory.update_user(&user).await.unwrap();

    let validation = h.auth.validate_session(&token, "M1").await;
    assert!(!validation.is_valid);
    assert!(!validation.is_expired);
    assert_eq!(
        validation.failure_reason.as_deref(),
        Some("user not found or disabled")
    );
}

#[tokio::test]
async fn validate_reports_expiry_distinctly() {
    let h = harness();
    let login = h.auth.get_or_create_default_user("M1").await;
    let user_id = login.user_id().unwrap().to_string();

    let stale = h
        .tokens
        .generate_token(&user_id, "M1", Utc::now() - ChronoDuration::minutes(1))
        .await
        .unwrap();

    let validation = h.auth.validate_session(&stale, "M1").await;
    assert!(!validation.is_valid);
    assert!(validation.is_expired);
    assert_eq!(validation.failure_reason.as_deref(), Some("session expired"));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_validations_agree() {
    let h = harness();
    let login = h.auth.get_or_create_default_user("M1").await;
    let token = login.session_token.clone().unwrap();
    let expected_user = login.user_id().unwrap().to_string();
    let expected_expiry = login.expires_at.unwrap().timestamp();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let auth = h.auth.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            auth.validate_session(&token, "M1").await
        }));
    }

    for handle in handles {
        let validation = handle.await.unwrap();
        assert!(validation.is_valid);
        assert_eq!(validation.user_id.as_deref(), Some(expected_user.as_str()));
        assert_eq!(validation.expires_at.unwrap().timestamp(), expected_expiry);
    }
}

#[tokio::test]
async fn refresh_keeps_token_far_from_expiry() {
    let h = harness();
    let login = h.auth.get_or_create_default_user("M1").await;
    let token = login.session_token.clone().unwrap();

    let refresh = h.auth.refresh_session(&token, "M1").await;
    assert!(refresh.success);
    assert!(!refresh.renewed);
    assert_eq!(refresh.session_token.as_deref(), Some(token.as_str()));
    assert_eq!(
        refresh.expires_at.unwrap().timestamp(),
        login.expires_at.unwrap().timestamp()
    );
    assert_eq!(h.audit.count_of(AuditEventType::SessionRefreshed), 0);
}

#[tokio::test]
async fn refresh_renews_near_expiry_token() {
    let h = harness();
    let login = h.auth.get_or_create_default_user("M1").await;
    let user_id = login.user_id().unwrap().to_string();

    // 30 minutes remaining, threshold 2 hours: a renewal is due.
    let near_expiry = h
        .tokens
        .generate_token(&user_id, "M1", Utc::now() + ChronoDuration::minutes(30))
        .await
        .unwrap();

    let refresh = h.auth.refresh_session(&near_expiry, "M1").await;
    assert!(refresh.success);
    assert!(refresh.renewed);
    assert_ne!(refresh.session_token.as_deref(), Some(near_expiry.as_str()));

    let remaining = refresh.expires_at.unwrap() - Utc::now();
    assert!(remaining > ChronoDuration::hours(23));
    assert_eq!(h.audit.count_of(AuditEventType::SessionRefreshed), 1);
}

#[tokio::test]
async fn refresh_of_invalid_token_carries_validation_reason() {
    let h = harness();

    let refresh = h.auth.refresh_session("", "M1").await;
    assert!(!refresh.success);
    assert!(refresh.failure_reason.unwrap().contains("token"));
}

#[tokio::test]
async fn refresh_threshold_is_configurable() {
    let h = harness_with(
        AuthConfig::default()
            .session_lifetime(Duration::from_secs(60 * 60))
            .near_expiry_threshold(Duration::from_secs(10 * 60)),
        MockUserDirectory::new(),
    );
    let login = h.auth.get_or_create_default_user("M1").await;
    let user_id = login.user_id().unwrap().to_string();

    // 30 minutes remaining is comfortably above a 10-minute threshold.
    let token = h
        .tokens
        .generate_token(&user_id, "M1", Utc::now() + ChronoDuration::minutes(30))
        .await
        .unwrap();
    let refresh = h.auth.refresh_session(&token, "M1").await;
    assert!(refresh.success);
    assert!(!refresh.renewed);
}

#[tokio::test]
async fn create_session_validates_user_state() {
    let mut inactive = bound_user("bob", "M1");
    inactive.is_active = false;
    let inactive_id = inactive.id.clone();
    let h = harness_with(AuthConfig::default(), MockUserDirectory::new().with_user(inactive));

    let missing = h.auth.create_user_session("nope", "M1").await;
    assert_eq!(missing.error_code, Some(AuthErrorCode::UserNotFound));

    let disabled = h.auth.create_user_session(&inactive_id, "M1").await;
    assert_eq!(disabled.error_code, Some(AuthErrorCode::UserInactive));
}

#[tokio::test]
async fn create_and_end_session_round_trip() {
    let user = bound_user("bob", "M1");
    let user_id = user.id.clone();
    let h = harness_with(AuthConfig::default(), MockUserDirectory::new().with_user(user));

    let created = h.auth.create_user_session(&user_id, "M1").await;
    assert!(created.success);
    assert_eq!(h.audit.count_of(AuditEventType::SessionCreated), 1);

    let token = created.session_token.unwrap();
    assert!(h.auth.end_user_session(&token, "M1").await);
    assert_eq!(h.audit.count_of(AuditEventType::Logout), 1);

    assert!(!h.auth.end_user_session("garbage", "M1").await);
}

#[tokio::test]
async fn available_users_are_scoped_to_machine() {
    let h = harness();
    h.auth.get_or_create_default_user("M1").await;
    h.auth.get_or_create_default_user("M2").await;

    let on_m1 = h.auth.get_available_users("M1").await.unwrap();
    assert_eq!(on_m1.len(), 1);
    assert_eq!(on_m1[0].machine_id(), Some("M1"));

    let none = h.auth.get_available_users("").await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn active_sessions_listing_is_always_empty() {
    let h = harness();
    h.auth.get_or_create_default_user("M1").await;
    assert!(h.auth.get_active_sessions().await.is_empty());
}
