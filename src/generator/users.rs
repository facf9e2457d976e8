//! Synthetic user population

use crate::error::{PipelineError, Result};
use crate::types::region::HOME_COUNTRIES;
use crate::types::User;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashSet;
use tracing::info;
use uuid::{Builder, Uuid};

/// Earliest signup, in days before the reference time
const SIGNUP_WINDOW_START_DAYS: i64 = 730;
/// Signups end this many days before the reference time (exclusive)
const SIGNUP_WINDOW_END_DAYS: i64 = 180;

/// Draws users with uniform home countries and signup times
#[derive(Debug, Clone)]
pub struct UserPopulationGenerator {
    reference_time: DateTime<Utc>,
}

impl UserPopulationGenerator {
    /// `reference_time` plays the role of "now" for the signup window
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self { reference_time }
    }

    /// Generate `n_users` users with unique ids
    ///
    /// Signup times are uniform over `[now - 2y, now - 6mo)` at one-second
    /// resolution. The output is fully determined by the RNG state.
    pub fn generate<R: Rng + ?Sized>(&self, n_users: usize, rng: &mut R) -> Result<Vec<User>> {
        if n_users == 0 {
            return Err(PipelineError::InvalidParameter(
                "n_users must be positive".to_string(),
            ));
        }

        let window_start = self.reference_time - Duration::days(SIGNUP_WINDOW_START_DAYS);
        let window_secs = (SIGNUP_WINDOW_START_DAYS - SIGNUP_WINDOW_END_DAYS) * 86_400;

        let mut seen = HashSet::with_capacity(n_users);
        let mut users = Vec::with_capacity(n_users);

        for _ in 0..n_users {
            let user_id = loop {
                let id = random_uuid(rng);
                if seen.insert(id) {
                    break id;
                }
            };
            let home_country = HOME_COUNTRIES[rng.gen_range(0..HOME_COUNTRIES.len())];
            let signup_ts = window_start + Duration::seconds(rng.gen_range(0..window_secs));
            users.push(User::new(user_id, home_country, signup_ts)?);
        }

        info!(users = users.len(), "Generated user population");
        Ok(users)
    }
}

/// Version 4 UUID built from RNG bytes so seeded runs repeat
fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    Builder::from_random_bytes(rng.gen()).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn reference() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_deterministic_for_seed() {
        let generator = UserPopulationGenerator::new(reference());
        let a = generator
            .generate(100, &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = generator
            .generate(100, &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);

        let c = generator
            .generate(100, &mut StdRng::seed_from_u64(43))
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_ids_unique_and_fields_in_range() {
        let now = reference();
        let users = UserPopulationGenerator::new(now)
            .generate(2_000, &mut StdRng::seed_from_u64(1))
            .unwrap();

        let ids: HashSet<_> = users.iter().map(|u| u.user_id()).collect();
        assert_eq!(ids.len(), users.len());

        for user in &users {
            assert!(HOME_COUNTRIES.contains(&user.home_country()));
            assert!(user.signup_ts() >= now - Duration::days(730));
            assert!(user.signup_ts() < now - Duration::days(180));
            assert_eq!(user.user_id().get_version_num(), 4);
        }

        let countries: HashSet<_> = users.iter().map(|u| u.home_country()).collect();
        assert_eq!(countries.len(), HOME_COUNTRIES.len());
    }

    #[test]
    fn test_zero_users_rejected() {
        let err = UserPopulationGenerator::new(reference())
            .generate(0, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));
    }
}
