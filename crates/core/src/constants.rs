use std::time::Duration;

/// Default debounce window for coalescing change notifications
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Database schema the CRM tables live in
pub const DEFAULT_SCHEMA: &str = "public";

/// Leads table
pub const LEADS_TABLE: &str = "leads";

/// Gamification event log table
pub const GAMIFICATION_EVENTS_TABLE: &str = "gamification_events";

// Cache key roots shared with the frontend query cache.
pub const LEADS_KEY: &str = "leads";
pub const LEAD_STATS_KEY: &str = "lead-stats";
pub const KANBAN_LEADS_KEY: &str = "kanban-leads";
pub const DASHBOARD_STATS_KEY: &str = "dashboard-stats";
pub const GAMIFICATION_EVENTS_KEY: &str = "gamification-events";
pub const LEADERBOARD_KEY: &str = "leaderboard";
