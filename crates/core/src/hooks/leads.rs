use crate::cache::CacheKey;
use crate::constants::{
    DASHBOARD_STATS_KEY, KANBAN_LEADS_KEY, LEADS_KEY, LEADS_TABLE, LEAD_STATS_KEY,
};
use crate::stream::SubscriptionSpec;

use super::RealtimeHook;

pub const LEADS_HOOK: &str = "realtime-leads";
pub const LEADS_CHANNEL: &str = "leads-changes";

/// Any change on `leads` invalidates the lead lists, lead statistics, the
/// kanban board and the dashboard counters.
///
/// `scope` replaces the `["leads"]` key, for views that only care about
/// their own slice of the lead list.
pub fn leads_hook(scope: Option<CacheKey>) -> RealtimeHook {
    let primary = scope.unwrap_or_else(|| CacheKey::root(LEADS_KEY));

    RealtimeHook::new(LEADS_HOOK).bind(
        SubscriptionSpec::new(LEADS_CHANNEL, LEADS_TABLE),
        [
            primary,
            CacheKey::root(LEAD_STATS_KEY),
            CacheKey::root(KANBAN_LEADS_KEY),
            CacheKey::root(DASHBOARD_STATS_KEY),
        ],
    )
}
