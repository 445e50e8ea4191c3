use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Per-user proactive expression settings, written through the frequency
/// endpoints. Absent users get the (disabled) default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserFrequencySettings {
    /// Master switch; nothing is ever pushed to a user who has not opted in.
    #[serde(default)]
    pub enabled: bool,
    /// Override of the server-wide quiet window, in minutes.
    #[serde(default)]
    pub min_quiet_minutes: Option<u32>,
    /// Override of the per-stage daily cap.
    #[serde(default)]
    pub max_per_day: Option<u32>,
    /// Offset from UTC used to derive the user's local hour.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    /// Local-hour window `[start, end)` during which the tick loop stays
    /// silent; wraps past midnight when `start > end` (e.g. `[23, 7]`).
    #[serde(default)]
    pub quiet_hours: Option<[u8; 2]>,
}

impl UserFrequencySettings {
    /// Whether `local_hour` falls inside the configured quiet window.
    pub fn in_quiet_hours(&self, local_hour: u8) -> bool {
        match self.quiet_hours {
            Some([start, end]) if start <= end => (start..end).contains(&local_hour),
            Some([start, end]) => local_hour >= start || local_hour < end,
            None => false,
        }
    }
}

/// Process-wide owner of the per-user settings map.
#[derive(Default)]
pub struct FrequencySettings {
    map: DashMap<String, UserFrequencySettings>,
}

impl FrequencySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> UserFrequencySettings {
        self.map
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn set(&self, user_id: &str, settings: UserFrequencySettings) {
        self.map.insert(user_id.to_string(), settings);
    }

    /// Users the tick loop should evaluate.
    pub fn enabled_users(&self) -> Vec<String> {
        self.map
            .iter()
            .filter(|e| e.value().enabled)
            .map(|e| e.key().clone())
            .collect()
    }
}
