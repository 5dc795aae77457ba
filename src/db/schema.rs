//! Table names and the unique keys declared in `migrations/001_init.sql`.

pub const USERS: &str = "users";
pub const REFLECTION_SPACES: &str = "reflection_spaces";
pub const SPACE_MEMBERS: &str = "space_members";
pub const REFLECTIONS: &str = "reflections";
pub const MICRO_LOGS: &str = "micro_logs";
pub const LOGS: &str = "logs";
pub const PROJECTS: &str = "projects";
pub const TEAM_MEMBERS: &str = "team_members";
pub const ACTIVITIES: &str = "activities";
pub const USER_BOOKMARKS: &str = "user_bookmarks";
pub const USER_APPLICATIONS: &str = "user_activity_applications";
pub const USER_PREFERENCES: &str = "user_preferences";
pub const NOTIFICATIONS: &str = "notifications";
pub const KEYWORDS: &str = "keywords";
pub const USER_KEYWORDS: &str = "user_keywords";
pub const LOG_KEYWORDS: &str = "log_keywords";
pub const PORTFOLIOS: &str = "portfolios";
pub const PORTFOLIO_PROJECTS: &str = "portfolio_projects";
pub const EVIDENCE: &str = "evidence";
pub const PEER_ENDORSEMENTS: &str = "peer_endorsements";
pub const ENDORSEMENT_KEYWORDS: &str = "endorsement_keywords";
pub const REFLECTION_TEMPLATES: &str = "reflection_templates";
pub const HEALTH_CHECKS: &str = "health_checks";
pub const GROWTH_METRICS: &str = "growth_metrics";
pub const REFLECTION_AI_ANALYSIS: &str = "reflection_ai_analysis";

/// Column sets that must be unique per table.
pub const UNIQUE_KEYS: &[(&str, &[&str])] = &[
    (USERS, &["email"]),
    (USER_KEYWORDS, &["user_id", "keyword_id"]),
    (USER_BOOKMARKS, &["user_id", "activity_id"]),
    (USER_APPLICATIONS, &["user_id", "activity_id"]),
    (USER_PREFERENCES, &["user_id"]),
    (LOG_KEYWORDS, &["log_id", "keyword_id"]),
    (HEALTH_CHECKS, &["user_id", "date"]),
    (GROWTH_METRICS, &["user_id", "date"]),
    (KEYWORDS, &["name"]),
    (ACTIVITIES, &["url"]),
    (SPACE_MEMBERS, &["space_id", "user_id"]),
];

pub fn unique_keys(table: &str) -> impl Iterator<Item = &'static [&'static str]> + '_ {
    UNIQUE_KEYS
        .iter()
        .filter(move |(t, _)| *t == table)
        .map(|(_, cols)| *cols)
}
