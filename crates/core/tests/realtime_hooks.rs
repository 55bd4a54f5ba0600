use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use salesflow_core::cache::RecordingQueryCache;
use salesflow_core::hooks::{gamification_hook, leads_hook};
use salesflow_core::stream::InMemoryChangeStream;
use salesflow_core::{CacheKey, ChangeEvent, DebounceConfig, HookState, MountedHook};

fn lead(id: i64, status: &str) -> serde_json::Value {
    json!({ "id": id, "status": status, "owner_id": "u-1" })
}

fn mount_leads(
    stream: &InMemoryChangeStream,
    scope: Option<CacheKey>,
) -> (MountedHook, RecordingQueryCache) {
    let cache = RecordingQueryCache::new();
    let hook = leads_hook(scope).mount(stream, Arc::new(cache.clone()), DebounceConfig::default());
    (hook, cache)
}

#[tokio::test(start_paused = true)]
async fn lead_insert_invalidates_lead_views() {
    let stream = InMemoryChangeStream::new();
    let (_hook, cache) = mount_leads(&stream, None);

    stream.publish(ChangeEvent::insert("leads", lead(1, "new")));
    sleep(Duration::from_millis(501)).await;

    assert_eq!(
        cache.calls(),
        vec![vec![
            CacheKey::root("leads"),
            CacheKey::root("lead-stats"),
            CacheKey::root("kanban-leads"),
            CacheKey::root("dashboard-stats"),
        ]]
    );
}

#[tokio::test(start_paused = true)]
async fn ten_rapid_updates_invalidate_once() {
    let stream = InMemoryChangeStream::new();
    let (_hook, cache) = mount_leads(&stream, None);

    for id in 0..10 {
        stream.publish(ChangeEvent::update("leads", lead(id, "won"), lead(id, "open")));
        sleep(Duration::from_millis(10)).await;
    }
    sleep(Duration::from_millis(500)).await;

    assert_eq!(cache.call_count(), 1);
    assert_eq!(cache.calls()[0].len(), 4);
}

#[tokio::test(start_paused = true)]
async fn unmount_before_window_closes_drops_batch() {
    let stream = InMemoryChangeStream::new();
    let (hook, cache) = mount_leads(&stream, None);

    stream.publish(ChangeEvent::delete("leads", json!({ "id": 4 })));
    sleep(Duration::from_millis(50)).await;
    hook.unmount();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(cache.call_count(), 0);
    assert_eq!(hook.state(), HookState::Unmounted);
    assert_eq!(stream.subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn scoped_hook_replaces_primary_key() {
    let stream = InMemoryChangeStream::new();
    let scope = CacheKey::new(["leads", "team-7"]);
    let (_hook, cache) = mount_leads(&stream, Some(scope.clone()));

    stream.publish(ChangeEvent::insert("leads", lead(1, "new")));
    sleep(Duration::from_millis(600)).await;

    let keys = &cache.calls()[0];
    assert_eq!(keys[0], scope);
    assert!(!keys.contains(&CacheKey::root("leads")));
    assert!(keys.contains(&CacheKey::root("kanban-leads")));
}

#[tokio::test(start_paused = true)]
async fn other_tables_are_ignored() {
    let stream = InMemoryChangeStream::new();
    let (_hook, cache) = mount_leads(&stream, None);

    assert_eq!(stream.publish(ChangeEvent::insert("tasks", json!({ "id": 1 }))), 0);
    sleep(Duration::from_secs(1)).await;

    assert_eq!(cache.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn two_mounted_views_invalidate_independently() {
    let stream = InMemoryChangeStream::new();
    let (board, board_cache) = mount_leads(&stream, None);
    let (_list, list_cache) = mount_leads(&stream, None);

    stream.publish(ChangeEvent::insert("leads", lead(1, "new")));
    sleep(Duration::from_millis(20)).await;
    board.unmount();
    sleep(Duration::from_millis(600)).await;

    assert_eq!(board_cache.call_count(), 0);
    assert_eq!(list_cache.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn gamification_hook_watches_filtered_inserts() {
    let stream = InMemoryChangeStream::new();
    let cache = RecordingQueryCache::new();
    let _hook = gamification_hook(None, Some("event_type=eq.sale_closed".parse().unwrap()))
        .mount(&stream, Arc::new(cache.clone()), DebounceConfig::default());

    stream.publish(ChangeEvent::insert(
        "gamification_events",
        json!({ "event_type": "call_logged", "points": 1 }),
    ));
    sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.call_count(), 0);

    stream.publish(ChangeEvent::insert(
        "gamification_events",
        json!({ "event_type": "sale_closed", "points": 50 }),
    ));
    sleep(Duration::from_secs(1)).await;

    assert_eq!(
        cache.calls(),
        vec![vec![
            CacheKey::root("gamification-events"),
            CacheKey::root("leaderboard"),
            CacheKey::root("dashboard-stats"),
        ]]
    );
}
