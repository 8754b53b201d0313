//! Background update check, cache freshness and the post-command banner.

use chrono::Utc;
use push_validator_cli::config::OutputMode;
use push_validator_cli::test_utils::{TestServer, script_binary};
use push_validator_cli::upgrade::version_check::background_check;
use push_validator_cli::upgrade::{GithubFetcher, Notifier, UpdateCache, UpdateCacheEntry};
use std::sync::Arc;
use tempfile::TempDir;

use crate::harness::{REPO, publish};

fn fetcher(server: &TestServer) -> Arc<GithubFetcher> {
    Arc::new(GithubFetcher::new(&server.base_url(), REPO).unwrap())
}

#[tokio::test]
async fn test_fresh_cache_skips_network() {
    let server = TestServer::start().await;
    let dir = TempDir::new().unwrap();
    let cache = UpdateCache::new(dir.path().join(".update-cache.json"));
    cache.save(&UpdateCacheEntry::new("v2.0.0", true));

    let notifier = Notifier::new();
    background_check(fetcher(&server), cache, "1.0.0".to_string(), notifier.clone()).await;

    assert!(server.hits().is_empty());
    let notice = notifier.get().unwrap();
    assert_eq!(notice.latest_version, "v2.0.0");
    assert!(notice.update_available);
}

#[tokio::test]
async fn test_stale_cache_is_refreshed_from_network() {
    let server = TestServer::start().await;
    publish(&server, "v2.1.0", &script_binary("2.1.0"), Some(true));
    let dir = TempDir::new().unwrap();
    let cache = UpdateCache::new(dir.path().join(".update-cache.json"));
    cache.save(&UpdateCacheEntry {
        checked_at: Utc::now() - chrono::Duration::minutes(11),
        latest_version: "v2.0.0".to_string(),
        update_available: true,
    });

    let notifier = Notifier::new();
    background_check(fetcher(&server), cache.clone(), "2.1.0".to_string(), notifier.clone())
        .await;

    assert_eq!(server.hit_count(&format!("/repos/{REPO}/releases/latest")), 1);
    let entry = cache.load().unwrap();
    assert_eq!(entry.latest_version, "v2.1.0");
    assert!(!entry.update_available);
    assert!(entry.is_valid());
    assert!(!notifier.get().unwrap().update_available);
}

#[tokio::test]
async fn test_failed_check_is_silent() {
    let server = TestServer::start().await;
    let dir = TempDir::new().unwrap();
    let cache = UpdateCache::new(dir.path().join(".update-cache.json"));

    let notifier = Notifier::new();
    background_check(fetcher(&server), cache.clone(), "1.0.0".to_string(), notifier.clone())
        .await;

    assert!(notifier.get().is_none());
    assert!(cache.load().is_none());
    assert!(!cache.path().exists());
}

#[tokio::test]
async fn test_banner_rendered_at_most_once() {
    let server = TestServer::start().await;
    publish(&server, "v2.0.0", &script_binary("2.0.0"), Some(true));
    let dir = TempDir::new().unwrap();
    let cache = UpdateCache::new(dir.path().join(".update-cache.json"));

    let notifier = Notifier::new();
    background_check(fetcher(&server), cache, "1.0.0".to_string(), notifier.clone()).await;

    let mut suppressed = Vec::new();
    assert!(!notifier.render_to(&mut suppressed, &["status"], OutputMode::Json, false).unwrap());
    assert!(!notifier.render_to(&mut suppressed, &["update"], OutputMode::Text, false).unwrap());
    assert!(!notifier.render_to(&mut suppressed, &["status"], OutputMode::Text, true).unwrap());
    assert!(suppressed.is_empty());

    let mut out = Vec::new();
    assert!(notifier.render_to(&mut out, &["status"], OutputMode::Text, false).unwrap());
    assert!(!notifier.render_to(&mut out, &["peers", "refresh"], OutputMode::Text, false).unwrap());

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("Update available").count(), 1);
    assert!(text.contains("v2.0.0"));
}
