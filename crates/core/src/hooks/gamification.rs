use crate::cache::CacheKey;
use crate::constants::{
    DASHBOARD_STATS_KEY, GAMIFICATION_EVENTS_KEY, GAMIFICATION_EVENTS_TABLE, LEADERBOARD_KEY,
};
use crate::events::{ChangeKind, EventFilter, RowFilter};
use crate::stream::SubscriptionSpec;

use super::RealtimeHook;

pub const GAMIFICATION_HOOK: &str = "realtime-gamification";
pub const GAMIFICATION_CHANNEL: &str = "gamification-events";

/// New gamification events (points awarded, sales closed, ...) invalidate
/// the event feed, the leaderboard and the dashboard counters.
///
/// The event log is append-only, so only inserts are watched. `filter`
/// narrows further, e.g. `event_type=eq.sale_closed`.
pub fn gamification_hook(scope: Option<CacheKey>, filter: Option<RowFilter>) -> RealtimeHook {
    let primary = scope.unwrap_or_else(|| CacheKey::root(GAMIFICATION_EVENTS_KEY));

    let mut events = EventFilter::kind(ChangeKind::Insert);
    if let Some(row) = filter {
        events = events.with_row(row);
    }

    RealtimeHook::new(GAMIFICATION_HOOK).bind(
        SubscriptionSpec::new(GAMIFICATION_CHANNEL, GAMIFICATION_EVENTS_TABLE).with_filter(events),
        [
            primary,
            CacheKey::root(LEADERBOARD_KEY),
            CacheKey::root(DASHBOARD_STATS_KEY),
        ],
    )
}
