//! End-to-end authentication flows against the in-memory store.

use chrono::{Duration, Utc};
use podium_auth::{
    Account, AccountId, Authenticator, CredentialStore, DirectoryStore, MemoryStore, Permission,
    PermissionSet, Scope, TeamId,
};
use std::sync::Arc;

fn account(id: AccountId, team: Option<TeamId>, permissions: PermissionSet) -> Account {
    Account {
        id,
        name: "member".to_string(),
        discriminator: "0001".to_string(),
        avatar_url: None,
        team,
        permissions,
        created_at: Utc::now(),
    }
}

fn harness() -> (Arc<MemoryStore>, Authenticator) {
    let store = Arc::new(MemoryStore::new());
    let authenticator = Authenticator::new(store.clone(), store.clone());
    (store, authenticator)
}

#[tokio::test]
async fn malformed_identifiers_resolve_anonymous() {
    let (_store, authenticator) = harness();

    for identifier in ["", "A", "S", "X12", "12", "Atwelve", "A 12", "⚙12"] {
        let scope = authenticator
            .authenticate(identifier, "whatever")
            .await
            .unwrap();
        assert!(scope.is_anonymous(), "identifier {:?}", identifier);
    }
}

#[tokio::test]
async fn service_credentials_resolve_with_their_own_permissions() {
    let (store, authenticator) = harness();
    let permissions = PermissionSet::of(&[
        Permission::ManagePermissions,
        Permission::AuthenticateUsers,
    ]);
    let credential = store.create_service("registrar", permissions).await.unwrap();

    let scope = authenticator
        .authenticate(&credential.identifier(), credential.secret.expose())
        .await
        .unwrap();

    assert!(scope.service().is_some());
    assert_eq!(scope.permissions(), permissions);

    // The tag is case-insensitive.
    let scope = authenticator
        .authenticate(
            &credential.identifier().to_lowercase(),
            credential.secret.expose(),
        )
        .await
        .unwrap();
    assert!(scope.service().is_some());
}

#[tokio::test]
async fn wrong_secret_resolves_anonymous() {
    let (store, authenticator) = harness();
    let credential = store
        .create_service("registrar", PermissionSet::EMPTY)
        .await
        .unwrap();

    let scope = authenticator
        .authenticate(&credential.identifier(), "not the secret")
        .await
        .unwrap();
    assert!(scope.is_anonymous());

    // Unknown id looks exactly the same.
    let scope = authenticator
        .authenticate("A999", "not the secret")
        .await
        .unwrap();
    assert!(scope.is_anonymous());
}

#[tokio::test]
async fn sessions_snapshot_the_accounts_current_permissions() {
    let (store, authenticator) = harness();
    store
        .create_account(&account(50, None, Permission::ManageAwards.into()))
        .await
        .unwrap();
    let session = store
        .create_session(50, Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    let scope = authenticator
        .authenticate(&session.identifier(), session.secret.expose())
        .await
        .unwrap();
    assert!(scope.has(Permission::ManageAwards));
    assert_eq!(scope.session_id(), Some(session.id));

    // Changing the stored permissions is visible to the *next*
    // resolution, not to the snapshot already taken.
    store
        .set_account_permissions(50, PermissionSet::EMPTY)
        .await
        .unwrap();
    assert!(scope.has(Permission::ManageAwards));

    let fresh = authenticator
        .authenticate(&session.identifier(), session.secret.expose())
        .await
        .unwrap();
    assert!(!fresh.has(Permission::ManageAwards));
}

#[tokio::test]
async fn expired_sessions_are_reaped_on_sight() {
    let (store, authenticator) = harness();
    store
        .create_account(&account(50, None, PermissionSet::EMPTY))
        .await
        .unwrap();
    let session = store
        .create_session(50, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    let scope = authenticator
        .authenticate(&session.identifier(), session.secret.expose())
        .await
        .unwrap();
    assert!(scope.is_anonymous());

    // The lazy reap removed the row: even the correct secret no longer
    // finds it.
    assert!(store
        .find_session(session.id, &session.secret)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rotation_leaves_exactly_one_secret_valid() {
    let (store, authenticator) = harness();
    let credential = store
        .create_service("registrar", PermissionSet::EMPTY)
        .await
        .unwrap();
    let identifier = credential.identifier();
    let original = credential.secret.clone();

    let first = store.rotate_service_secret(credential.id).await.unwrap();
    let second = store.rotate_service_secret(credential.id).await.unwrap();

    for dead in [original.expose(), first.expose()] {
        let scope = authenticator.authenticate(&identifier, dead).await.unwrap();
        assert!(scope.is_anonymous());
    }
    let scope = authenticator
        .authenticate(&identifier, second.expose())
        .await
        .unwrap();
    assert!(!scope.is_anonymous());
}

#[tokio::test]
async fn anonymous_scope_holds_nothing() {
    let scope = Scope::anonymous();
    for flag in Permission::ALL {
        assert!(!scope.has(flag));
    }
    assert!(scope.account().is_none());
    assert!(scope.service().is_none());
}
