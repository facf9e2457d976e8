//! Feature extraction from login history.
//!
//! Turns a batch of login events into the four model-ready columns. Each
//! user's history is replayed in login-time order so every feature only looks
//! at the current and earlier logins of the same user.

use crate::error::{PipelineError, Result};
use crate::types::{FeatureRow, LoginEvent, User, FEATURE_NAMES, FIRST_LOGIN_SENTINEL};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Transforms login events into feature rows.
///
/// Rows come back in the same order as the input events.
pub struct FeatureExtractor {
    velocity_window: Duration,
}

impl FeatureExtractor {
    /// Create a new feature extractor with a 24 hour velocity window.
    pub fn new() -> Self {
        Self {
            velocity_window: Duration::hours(24),
        }
    }

    /// Extract one feature row per event.
    ///
    /// Fails if an event references a user outside `users`.
    pub fn extract(&self, users: &[User], events: &[LoginEvent]) -> Result<Vec<FeatureRow>> {
        let home: HashMap<Uuid, &str> = users
            .iter()
            .map(|u| (u.user_id(), u.home_country()))
            .collect();

        let mut by_user: HashMap<Uuid, Vec<usize>> = HashMap::new();
        for (idx, event) in events.iter().enumerate() {
            if !home.contains_key(&event.user_id()) {
                return Err(PipelineError::DataIntegrity(format!(
                    "login event {idx} references unknown user {}",
                    event.user_id()
                )));
            }
            by_user.entry(event.user_id()).or_default().push(idx);
        }

        let mut rows: Vec<Option<FeatureRow>> = vec![None; events.len()];
        for (user_id, mut indices) in by_user {
            indices.sort_by_key(|&i| events[i].login_time());
            let home_country = home[&user_id];

            let mut devices: HashSet<&str> = HashSet::new();
            let mut recent: VecDeque<DateTime<Utc>> = VecDeque::new();
            let mut previous: Option<DateTime<Utc>> = None;

            for idx in indices {
                let event = &events[idx];
                let t = event.login_time();

                devices.insert(event.device_id());

                let secs_since_prev = match previous {
                    Some(prev) => (t - prev).num_milliseconds() as f64 / 1000.0,
                    None => FIRST_LOGIN_SENTINEL,
                };

                while recent.front().is_some_and(|&seen| t - seen > self.velocity_window) {
                    recent.pop_front();
                }

                rows[idx] = Some(FeatureRow::new(
                    devices.len() as u32,
                    secs_since_prev,
                    event.country() != home_country,
                    recent.len() as u32,
                    event.label(),
                )?);

                recent.push_back(t);
                previous = Some(t);
            }
        }

        rows.into_iter()
            .enumerate()
            .map(|(idx, row)| {
                row.ok_or_else(|| {
                    PipelineError::DataIntegrity(format!("no features produced for event {idx}"))
                })
            })
            .collect()
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_NAMES.len()
    }

    /// Get feature names in matrix column order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        FEATURE_NAMES.to_vec()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn login(user: &User, time: &str, device: &str, country: &str) -> LoginEvent {
        LoginEvent::new(
            user.user_id(),
            at(time),
            device,
            country,
            Ipv4Addr::new(10, 0, 0, 1),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_feature_extraction() {
        let alice = User::new(Uuid::from_u128(1), "CA", at("2025-01-01T00:00:00Z")).unwrap();
        let bob = User::new(Uuid::from_u128(2), "US", at("2025-01-01T00:00:00Z")).unwrap();

        // deliberately out of time order
        let events = vec![
            login(&alice, "2025-06-02T10:00:00Z", "dev_00002", "CA"),
            login(&alice, "2025-06-01T10:00:00Z", "dev_00001", "CA"),
            login(&bob, "2025-06-01T12:00:00Z", "dev_00009", "BR"),
            login(&alice, "2025-06-02T10:05:00Z", "dev_00001", "RU"),
            login(&alice, "2025-06-05T00:00:00Z", "new_dev_00003", "CA"),
        ];

        let rows = FeatureExtractor::new()
            .extract(&[alice, bob], &events)
            .unwrap();
        assert_eq!(rows.len(), events.len());

        // alice, first login
        assert_eq!(rows[1].values(), [1.0, FIRST_LOGIN_SENTINEL, 0.0, 0.0]);
        // alice, a day later on a second device: the first login is exactly 24h back
        assert_eq!(rows[0].values(), [2.0, 86_400.0, 0.0, 1.0]);
        // alice, five minutes later from abroad; the first login has left the window
        assert_eq!(rows[3].values(), [2.0, 300.0, 1.0, 1.0]);
        // alice, days later on a new device
        assert_eq!(rows[4].user_unique_devices_to_date(), 3);
        assert_eq!(rows[4].logins_last_24h(), 0);
        // bob, first login from outside home
        assert_eq!(rows[2].values(), [1.0, FIRST_LOGIN_SENTINEL, 1.0, 0.0]);
    }

    #[test]
    fn test_unknown_user_rejected() {
        let alice = User::new(Uuid::from_u128(1), "CA", at("2025-01-01T00:00:00Z")).unwrap();
        let stranger = User::new(Uuid::from_u128(7), "CA", at("2025-01-01T00:00:00Z")).unwrap();
        let events = vec![login(&stranger, "2025-06-01T10:00:00Z", "dev_00001", "CA")];

        let err = FeatureExtractor::new().extract(&[alice], &events).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 4);
        assert_eq!(extractor.feature_names()[1], "secs_since_prev_login");
    }
}
