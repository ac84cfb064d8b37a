//! Open-hours gate for new lobby joins and new invitations
//!
//! Existing chats and invitations are never affected by the gate; only the
//! creation of new lobby presence or new invitations is refused outside the
//! configured window. A process-wide debug override disables the gate.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Configured open window, in local service hours. The window may wrap
/// past midnight (e.g. 20 → 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenHours {
    /// Hour of day (0-23) at which the service opens
    pub open_hour: u32,
    /// Hour of day (0-23) at which the service closes
    pub close_hour: u32,
    /// Offset applied to UTC before extracting the hour, in seconds
    pub tz_offset_secs: i64,
    /// Debug override: disables the gate entirely
    pub always_open: bool,
}

impl Default for OpenHours {
    fn default() -> Self {
        Self {
            open_hour: 20,
            close_hour: 8,
            tz_offset_secs: 8 * 3600,
            always_open: false,
        }
    }
}

impl OpenHours {
    /// A gate that never refuses; used by tests and debug runs
    pub fn disabled() -> Self {
        Self {
            always_open: true,
            ..Self::default()
        }
    }

    /// Whether the service accepts new joins/invitations at `now`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if self.always_open {
            return true;
        }
        let local_secs = now.timestamp() + self.tz_offset_secs;
        let hour = DateTime::from_timestamp(local_secs, 0)
            .map(|t| t.hour())
            .unwrap_or(0);
        if self.open_hour == self.close_hour {
            // Degenerate window means always open
            true
        } else if self.open_hour < self.close_hour {
            hour >= self.open_hour && hour < self.close_hour
        } else {
            // Wraps past midnight
            hour >= self.open_hour || hour < self.close_hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 30, 0).unwrap()
    }

    fn gate(open: u32, close: u32) -> OpenHours {
        OpenHours {
            open_hour: open,
            close_hour: close,
            tz_offset_secs: 0,
            always_open: false,
        }
    }

    #[test]
    fn test_plain_window() {
        let g = gate(9, 17);
        assert!(!g.is_open(at(8)));
        assert!(g.is_open(at(9)));
        assert!(g.is_open(at(16)));
        assert!(!g.is_open(at(17)));
    }

    #[test]
    fn test_wrapping_window() {
        let g = gate(20, 8);
        assert!(g.is_open(at(23)));
        assert!(g.is_open(at(3)));
        assert!(!g.is_open(at(12)));
        assert!(g.is_open(at(20)));
        assert!(!g.is_open(at(8)));
    }

    #[test]
    fn test_override_disables_gate() {
        let mut g = gate(20, 8);
        g.always_open = true;
        assert!(g.is_open(at(12)));
    }

    #[test]
    fn test_tz_offset_applies() {
        let mut g = gate(9, 17);
        g.tz_offset_secs = 3 * 3600;
        // 07:30 UTC is 10:30 local
        assert!(g.is_open(at(7)));
        // 15:30 UTC is 18:30 local
        assert!(!g.is_open(at(15)));
    }

    #[test]
    fn test_degenerate_window_always_open() {
        let g = gate(0, 0);
        assert!(g.is_open(at(12)));
    }
}
