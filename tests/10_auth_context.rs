mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use realty_insight::backend::{ProfileStore, SessionEvent};
use realty_insight::context::{AuthStatus, NotificationLevel};
use realty_insight::error::AuthError;
use realty_insight::profile::ProfileResolver;
use realty_insight::types::{Role, RoleFlags};

use common::PASSWORD;

#[tokio::test]
async fn missing_profile_resolves_to_tenant_without_name() -> Result<()> {
    let (backend, ctx) = common::context();
    let id = backend.add_account_without_profile("ghost@example.com", PASSWORD);

    let resolver = ProfileResolver::new(backend.clone() as Arc<dyn ProfileStore>);
    let session = backend.issue_session(&id, Some("ghost@example.com"))?;
    let user = resolver.resolve_user(&session).await;
    assert_eq!(user.id, id);
    assert_eq!(user.role, Role::Tenant);
    assert_eq!(user.full_name, None);

    ctx.init().await;
    let user = ctx.login("ghost@example.com", PASSWORD).await?;
    assert_eq!(user.role, Role::Tenant);
    assert!(ctx.flags().is_tenant);
    Ok(())
}

#[tokio::test]
async fn failed_profile_fetch_still_yields_a_user() -> Result<()> {
    let (backend, ctx) = common::context();
    common::seed(&backend);
    backend.set_profile_fetch_failure(true);
    ctx.init().await;

    let user = ctx.login("landlord@example.com", PASSWORD).await?;
    assert_eq!(user.role, Role::Tenant);
    assert_eq!(user.full_name, None);
    Ok(())
}

#[tokio::test]
async fn exactly_one_flag_while_authenticated() -> Result<()> {
    for (email, role) in [
        ("admin@example.com", Role::SuperAdmin),
        ("landlord@example.com", Role::Landlord),
        ("tenant@example.com", Role::Tenant),
    ] {
        let (_backend, ctx) = common::signed_in(email).await?;
        let flags = ctx.flags();
        let set = [flags.is_admin, flags.is_landlord, flags.is_tenant]
            .iter()
            .filter(|f| **f)
            .count();
        assert_eq!(set, 1, "{} should hold exactly one flag", email);
        assert_eq!(flags.role(), Some(role));

        ctx.logout().await;
        assert_eq!(ctx.flags(), RoleFlags::default());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn no_flags_while_loading() -> Result<()> {
    let (backend, ctx) = common::context();
    let accounts = common::seed(&backend);
    backend.set_profile_delay(&accounts.admin, Duration::from_millis(50));
    ctx.init().await;

    backend.emit(SessionEvent::SignedIn(backend.issue_session(&accounts.admin, None)?));
    let mut rx = ctx.watch();
    let loading = rx.wait_for(|s| s.status == AuthStatus::Loading).await?.clone();
    assert_eq!(loading.flags(), RoleFlags::default());
    assert!(loading.user().is_none());

    rx.wait_for(|s| s.status == AuthStatus::Authenticated).await?;
    assert!(ctx.flags().is_admin);
    Ok(())
}

#[tokio::test]
async fn logout_twice_transitions_once() -> Result<()> {
    let (backend, ctx) = common::signed_in("tenant@example.com").await?;
    let mut rx = ctx.watch();
    rx.borrow_and_update();

    assert!(ctx.logout().await);
    assert_eq!(ctx.state().status, AuthStatus::Anonymous);
    assert!(rx.has_changed()?);
    rx.borrow_and_update();

    assert!(!ctx.logout().await);
    assert_eq!(backend.sign_out_calls(), 1);
    assert_eq!(ctx.state().status, AuthStatus::Anonymous);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stale_profile_never_overwrites_newer_session() -> Result<()> {
    let (backend, ctx) = common::context();
    let accounts = common::seed(&backend);
    backend.set_profile_delay(&accounts.landlord, Duration::from_millis(100));
    backend.set_profile_delay(&accounts.tenant, Duration::from_millis(10));
    ctx.init().await;

    let mut rx = ctx.watch();
    backend.emit(SessionEvent::SignedIn(backend.issue_session(&accounts.landlord, None)?));
    rx.wait_for(|s| s.status == AuthStatus::Loading).await?;

    // The first subject's fetch is now in flight
    backend.emit(SessionEvent::SignedOut);
    backend.emit(SessionEvent::SignedIn(backend.issue_session(&accounts.tenant, None)?));
    rx.wait_for(|s| s.status == AuthStatus::Authenticated).await?;
    assert_eq!(ctx.user().map(|u| u.id), Some(accounts.tenant.clone()));

    // Let the slow fetch for the first subject land
    tokio::time::sleep(Duration::from_millis(200)).await;

    let state = ctx.state();
    assert_eq!(state.user().map(|u| u.id.clone()), Some(accounts.tenant));
    assert!(state.flags().is_tenant);
    assert_eq!(backend.profile_fetches(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn logout_during_fetch_leaves_no_ghost_user() -> Result<()> {
    let (backend, ctx) = common::context();
    let accounts = common::seed(&backend);
    backend.set_profile_delay(&accounts.admin, Duration::from_millis(100));
    ctx.init().await;

    backend.emit(SessionEvent::SignedIn(backend.issue_session(&accounts.admin, None)?));
    let mut rx = ctx.watch();
    rx.wait_for(|s| s.status == AuthStatus::Loading).await?;

    assert!(ctx.logout().await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let state = ctx.state();
    assert_eq!(state.status, AuthStatus::Anonymous);
    assert!(state.user.is_none());
    assert!(!state.flags().is_admin);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn logout_reports_its_own_transition_across_threads() -> Result<()> {
    for _ in 0..100 {
        let (backend, ctx) = common::signed_in("tenant@example.com").await?;
        assert!(ctx.logout().await);
        assert!(!ctx.logout().await);
        assert_eq!(backend.sign_out_calls(), 1);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn login_right_after_logout_is_not_undone_by_queued_events() -> Result<()> {
    for _ in 0..100 {
        let (_backend, ctx) = common::signed_in("tenant@example.com").await?;
        assert!(ctx.logout().await);

        let user = ctx.login("landlord@example.com", common::PASSWORD).await?;
        assert_eq!(user.role, Role::Landlord);

        // Give the queued sign-in and sign-out events time to drain
        tokio::time::sleep(Duration::from_millis(5)).await;
        let state = ctx.state();
        assert_eq!(state.status, AuthStatus::Authenticated);
        assert_eq!(state.user().map(|u| u.id.clone()), Some(user.id));
    }
    Ok(())
}

#[tokio::test]
async fn signup_defaults_to_tenant() -> Result<()> {
    let (backend, ctx) = common::context();
    ctx.init().await;

    let user = ctx.signup("new@x.com", "pw123456", "New User").await?.expect("session issued");
    assert_eq!(user.role, Role::Tenant);
    assert_eq!(user.full_name.as_deref(), Some("New User"));
    assert_eq!(user.email.as_deref(), Some("new@x.com"));
    assert!(backend.account_id("new@x.com").is_some());
    assert!(ctx.flags().is_tenant);
    Ok(())
}

#[tokio::test]
async fn signup_as_landlord_and_duplicate_rejected() -> Result<()> {
    let (_backend, ctx) = common::context();
    ctx.init().await;

    let user = ctx
        .signup_as("owner@x.com", "pw123456", "Owner", Role::Landlord)
        .await?
        .expect("session issued");
    assert_eq!(user.role, Role::Landlord);
    ctx.logout().await;

    let err = ctx.signup("owner@x.com", "pw123456", "Owner").await.unwrap_err();
    assert_eq!(err.user_message(), "User already registered");
    assert_eq!(ctx.state().error.as_deref(), Some("User already registered"));
    assert_eq!(ctx.state().status, AuthStatus::Anonymous);
    Ok(())
}

#[tokio::test]
async fn signup_validation_reports_fields() -> Result<()> {
    let (backend, ctx) = common::context();
    ctx.init().await;

    let err = ctx.signup("not-an-email", "123", "").await.unwrap_err();
    match err {
        AuthError::Validation { field_errors, .. } => {
            assert_eq!(field_errors.get("name").map(String::as_str), Some("Name is required"));
            assert_eq!(field_errors.get("email").map(String::as_str), Some("Email is invalid"));
            assert_eq!(
                field_errors.get("password").map(String::as_str),
                Some("Password must be at least 6 characters")
            );
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(backend.account_id("not-an-email").is_none());
    Ok(())
}

#[tokio::test]
async fn update_profile_refetches_committed_user() -> Result<()> {
    let (_backend, ctx) = common::signed_in("landlord@example.com").await?;
    let mut toasts = ctx.notifier().subscribe();

    ctx.update_profile(Some("Lee Renamed".to_string())).await?;

    let user = ctx.user().expect("still signed in");
    assert_eq!(user.full_name.as_deref(), Some("Lee Renamed"));
    assert_eq!(user.role, Role::Landlord);

    let toast = toasts.recv().await?;
    assert_eq!(toast.level, NotificationLevel::Success);
    assert_eq!(toast.title, "Profile updated");
    Ok(())
}

#[tokio::test]
async fn update_profile_requires_session() -> Result<()> {
    let (_backend, ctx) = common::context();
    ctx.init().await;

    let err = ctx.update_profile(Some("Nobody".to_string())).await.unwrap_err();
    assert_eq!(err.user_message(), "You are not signed in");
    Ok(())
}

#[tokio::test]
async fn init_is_idempotent_and_dispose_unsubscribes() -> Result<()> {
    let (backend, ctx) = common::context();
    ctx.init().await;
    ctx.init().await;
    assert_eq!(backend.subscriber_count(), 1);

    ctx.dispose();
    // The aborted task drops its stream once the runtime polls it
    tokio::time::sleep(Duration::from_millis(10)).await;
    backend.emit(SessionEvent::SignedOut);
    assert_eq!(backend.subscriber_count(), 0);
    assert!(ctx.is_disposed());
    Ok(())
}
