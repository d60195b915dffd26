mod support;

use std::sync::Arc;

use anyhow::Result;
use common_auth::AuthError;
use support::{default_principals, test_app, SERVICE_AUDIENCE};

#[tokio::test]
async fn valid_credentials_yield_verifiable_access_token() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let state = &app.state;

    let principal = state
        .credentials
        .authenticate("svc-a", "s3cr3t")
        .await?
        .expect("svc-a authenticates");
    let access = state
        .issuer
        .issue_access_token(&principal.id, None, principal.scope.as_deref())?;

    let verified = state.guard.verify_access(&access.token, None)?;
    assert_eq!(verified.principal_id, "svc-a");
    assert_eq!(verified.scope.as_deref(), Some("orders:read"));
    Ok(())
}

#[tokio::test]
async fn wrong_secret_yields_no_principal() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let credentials = &app.state.credentials;

    assert!(credentials.authenticate("svc-a", "guess").await?.is_none());
    assert!(credentials.authenticate("nobody", "s3cr3t").await?.is_none());
    assert!(app.ledger.is_empty());
    Ok(())
}

#[tokio::test]
async fn access_token_expires_after_its_lifetime() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let access = app.state.issuer.issue_access_token("svc-a", None, None)?;
    assert_eq!(access.expires_in, 300);

    app.clock.advance(299);
    assert!(app.state.guard.verify_access(&access.token, None).is_ok());

    app.clock.advance(2);
    assert!(matches!(
        app.state.guard.verify_access(&access.token, None),
        Err(AuthError::InvalidToken)
    ));
    Ok(())
}

#[tokio::test]
async fn rotation_supersedes_previous_refresh_token() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let state = &app.state;
    let principal = state.credentials.principal("svc-a").await?.expect("svc-a");

    let first = state.issuer.issue_session(&principal).await?;
    app.clock.advance(1);
    let second = state
        .issuer
        .rotate_session(&principal, &first.refresh.token)
        .await?;
    assert_ne!(first.refresh.token, second.refresh.token);

    assert!(matches!(
        state.guard.verify_refresh(&first.refresh.token).await,
        Err(AuthError::TokenSuperseded)
    ));
    assert_eq!(state.guard.verify_refresh(&second.refresh.token).await?, "svc-a");

    // Replaying the superseded token cannot rotate again.
    assert!(matches!(
        state
            .issuer
            .rotate_session(&principal, &first.refresh.token)
            .await,
        Err(AuthError::TokenSuperseded)
    ));
    Ok(())
}

#[tokio::test]
async fn reissuing_refresh_token_supersedes_the_first() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let r1 = app.state.issuer.issue_refresh_token("svc-a").await?;
    let r2 = app.state.issuer.issue_refresh_token("svc-a").await?;
    assert_ne!(r1.token, r2.token);

    assert!(matches!(
        app.state.guard.verify_refresh(&r1.token).await,
        Err(AuthError::TokenSuperseded)
    ));
    assert_eq!(app.state.guard.verify_refresh(&r2.token).await?, "svc-a");
    Ok(())
}

#[tokio::test]
async fn refresh_tokens_expire_even_when_active() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let refresh = app.state.issuer.issue_refresh_token("svc-a").await?;

    app.clock.advance(7 * 86_400 - 1);
    assert!(app.state.guard.verify_refresh(&refresh.token).await.is_ok());

    app.clock.advance(1);
    assert!(matches!(
        app.state.guard.verify_refresh(&refresh.token).await,
        Err(AuthError::InvalidToken)
    ));
    Ok(())
}

#[tokio::test]
async fn token_kinds_are_not_interchangeable() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let access = app.state.issuer.issue_access_token("svc-a", None, None)?;
    let refresh = app.state.issuer.issue_refresh_token("svc-a").await?;

    assert!(matches!(
        app.state.guard.verify_refresh(&access.token).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        app.state.guard.verify_access(&refresh.token, None),
        Err(AuthError::InvalidToken)
    ));
    Ok(())
}

#[tokio::test]
async fn audience_bound_token_is_rejected_elsewhere() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let access = app
        .state
        .issuer
        .issue_access_token("svc-a", Some(SERVICE_AUDIENCE), Some("orders:read"))?;

    assert!(app
        .state
        .guard
        .verify_access(&access.token, Some(SERVICE_AUDIENCE))
        .is_ok());
    assert!(matches!(
        app.state.guard.verify_access(&access.token, Some("service-c")),
        Err(AuthError::AudienceMismatch)
    ));
    Ok(())
}

#[tokio::test]
async fn revoked_session_rejects_outstanding_refresh_token() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let refresh = app.state.issuer.issue_refresh_token("svc-a").await?;

    assert!(app.state.issuer.revoke_session("svc-a").await?);
    assert!(!app.state.issuer.revoke_session("svc-a").await?);
    assert!(matches!(
        app.state.guard.verify_refresh(&refresh.token).await,
        Err(AuthError::TokenSuperseded)
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rotation_with_one_token_has_single_winner() -> Result<()> {
    let app = test_app(default_principals()).await?;
    let principal = app.state.credentials.principal("svc-a").await?.expect("svc-a");
    let initial = app.state.issuer.issue_session(&principal).await?;
    let presented = Arc::new(initial.refresh.token);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let issuer = app.state.issuer.clone();
        let principal = principal.clone();
        let presented = presented.clone();
        handles.push(tokio::spawn(async move {
            issuer.rotate_session(&principal, &presented).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await? {
            Ok(tokens) => winners.push(tokens),
            Err(err) => assert!(matches!(err, AuthError::TokenSuperseded)),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(
        app.state.guard.verify_refresh(&winners[0].refresh.token).await?,
        "svc-a"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_leaves_one_active_token() -> Result<()> {
    let app = test_app(default_principals()).await?;

    let mut handles = Vec::new();
    for _ in 0..24 {
        let issuer = app.state.issuer.clone();
        handles.push(tokio::spawn(async move {
            issuer.issue_refresh_token("svc-a").await
        }));
    }

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await??.token);
    }

    let mut active = 0;
    for token in &tokens {
        if app.state.guard.verify_refresh(token).await.is_ok() {
            active += 1;
        }
    }
    assert_eq!(active, 1);
    assert_eq!(app.ledger.len(), 1);
    Ok(())
}
