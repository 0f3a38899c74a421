//! tests/identity_tests.rs
//!
//! File-backed visitor identity across client restarts.

use std::sync::Arc;

use tempfile::TempDir;

use footfall_common::models::visitor::SameSite;
use footfall_common::traits::identity_traits::CookieJar;
use footfall_core::identity::{CookieIdentityStore, FileCookieJar};

#[tokio::test]
async fn identity_survives_a_restart() {
    let dir = TempDir::new().unwrap();

    // First run mints and persists.
    let first = {
        let jar = Arc::new(FileCookieJar::new(dir.path()));
        let store = CookieIdentityStore::new(jar, "visitor_id", 365);
        store.get_or_create().await
    };

    // A fresh jar over the same directory reads the same id back.
    let second = {
        let jar = Arc::new(FileCookieJar::new(dir.path()));
        let store = CookieIdentityStore::new(jar, "visitor_id", 365);
        store.get_or_create().await
    };

    assert_eq!(first, second);
}

#[tokio::test]
async fn distinct_profiles_get_distinct_ids() {
    let profile_a = TempDir::new().unwrap();
    let profile_b = TempDir::new().unwrap();

    let id_a = CookieIdentityStore::new(
        Arc::new(FileCookieJar::new(profile_a.path())),
        "visitor_id",
        365,
    )
    .get_or_create()
    .await;
    let id_b = CookieIdentityStore::new(
        Arc::new(FileCookieJar::new(profile_b.path())),
        "visitor_id",
        365,
    )
    .get_or_create()
    .await;

    assert_ne!(id_a, id_b);
}

#[tokio::test]
async fn removing_the_cookie_resets_identity() {
    let dir = TempDir::new().unwrap();
    let jar = Arc::new(FileCookieJar::new(dir.path()));
    let store = CookieIdentityStore::new(jar.clone(), "visitor_id", 365);

    let first = store.get_or_create().await;
    jar.remove("visitor_id").await.unwrap();
    let second = store.get_or_create().await;

    assert_ne!(first, second);
}

#[tokio::test]
async fn stored_record_carries_the_cookie_policy() {
    let dir = TempDir::new().unwrap();
    let jar = Arc::new(FileCookieJar::new(dir.path()));
    let store = CookieIdentityStore::new(jar.clone(), "visitor_id", 365);

    let id = store.get_or_create().await;

    let record = jar.load("visitor_id").await.unwrap().unwrap();
    assert_eq!(record.value, id.visitor_id);
    assert_eq!(record.same_site, SameSite::Lax);
    let days_left = (record.expires_at - chrono::Utc::now()).num_days();
    assert!((360..=365).contains(&days_left), "ttl was {} days", days_left);
}
