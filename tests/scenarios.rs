use std::sync::Arc;

use sourcevault::{
    AccessLevel, AccessPolicy, AeadProvider, Cipher, SecurityContext, Source, SourceStore, VaultError,
};

fn store() -> SourceStore {
    let provider = AeadProvider::with_salt(Cipher::Aes256Gcm, sourcevault::generate_salt().unwrap(), 1_000).unwrap();
    SourceStore::new(Arc::new(provider))
}

fn alice_policy() -> AccessPolicy {
    AccessPolicy::new(AccessLevel::Confidential, ["alice"], "default")
}

#[test]
fn test_allowed_user_reads_back_content() {
    // Scenario A: store for alice, alice reads it back.
    let store = store();
    let source = Source::new(b"secret".to_vec()).with_metadata("title", "x");

    let id = store.store(&source, &alice_policy()).unwrap();
    let retrieved = store.retrieve(&id, &SecurityContext::for_user("alice")).unwrap();

    assert_eq!(retrieved.content, b"secret");
    assert_eq!(retrieved.metadata.get("title").map(String::as_str), Some("x"));
    assert_eq!(retrieved.version, 1);
    assert_eq!(retrieved.created_at, retrieved.last_modified);
}

#[test]
fn test_other_user_is_denied() {
    // Scenario B: bob is not on the allow-list.
    let store = store();
    let id = store
        .store(&Source::new(b"secret".to_vec()).with_metadata("title", "x"), &alice_policy())
        .unwrap();

    let err = store.retrieve(&id, &SecurityContext::for_user("bob")).unwrap_err();
    assert!(matches!(err, VaultError::PermissionDenied));
}

#[test]
fn test_second_factor_required() {
    // Scenario C: 2FA policy rejects a bare context and accepts evidence.
    let store = store();
    let id = store
        .store(&Source::new(b"secret".to_vec()), &alice_policy().requiring_2fa())
        .unwrap();

    let bare = SecurityContext::for_user("alice");
    let err = store.retrieve(&id, &bare).unwrap_err();
    assert!(matches!(err, VaultError::MissingSecondFactor));

    let proven = SecurityContext::for_user("alice").with_second_factor("otp:492817");
    assert_eq!(store.retrieve(&id, &proven).unwrap().content, b"secret");
}

#[test]
fn test_custom_verifier_rejects_bad_codes() {
    let store = store().with_second_factor_verifier(|user: &str, code: &str| user == "alice" && code == "492817");
    let id = store
        .store(&Source::new(b"secret".to_vec()), &alice_policy().requiring_2fa())
        .unwrap();

    let wrong = SecurityContext::for_user("alice").with_second_factor("111111");
    assert!(matches!(store.retrieve(&id, &wrong), Err(VaultError::MissingSecondFactor)));

    let right = SecurityContext::for_user("alice").with_second_factor("492817");
    assert!(store.retrieve(&id, &right).is_ok());
}

#[test]
fn test_unknown_identifier() {
    // Scenario D.
    let store = store();
    let err = store
        .retrieve("nonexistent-id", &SecurityContext::for_user("alice"))
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound(id) if id == "nonexistent-id"));
}

#[test]
fn test_identical_sources_get_distinct_ids_and_ciphertexts() {
    let store = store();
    let source = Source::new(b"same words".to_vec());
    let a = store.store(&source, &alice_policy()).unwrap();
    let b = store.store(&source, &alice_policy()).unwrap();

    assert_ne!(a, b);
    assert_eq!(store.len(), 2);
    assert_eq!(store.ids().len(), 2);

    let alice = SecurityContext::for_user("alice");
    assert_eq!(store.retrieve(&a, &alice).unwrap().content, store.retrieve(&b, &alice).unwrap().content);
}

#[test]
fn test_identifiers_are_v4_uuids() {
    let store = store();
    let id = store.store(&Source::new(b"x".to_vec()), &alice_policy()).unwrap();
    let parsed = uuid::Uuid::parse_str(id.as_str()).unwrap();
    assert_eq!(parsed.get_version_num(), 4);
}
