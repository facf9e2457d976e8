//! Login event simulation with anomaly injection

use crate::error::{PipelineError, Result};
use crate::generator::anomaly::{self, AnomalyMix, EventDraft};
use crate::types::region::{device_id, DEVICE_POOL_SIZE, NOMINAL_REGIONS};
use crate::types::{AnomalyKind, LoginEvent, User};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Default fraction of anomalous events
pub const DEFAULT_ANOMALY_RATE: f64 = 0.06;

/// Probability that a login comes from the user's home country
const HOME_COUNTRY_WEIGHT: f64 = 0.6;

/// Login times are drawn from the trailing window of this many days
const LOGIN_WINDOW_DAYS: i64 = 180;

/// Emits login batches for a user population
#[derive(Debug, Clone)]
pub struct LoginEventSimulator {
    reference_time: DateTime<Utc>,
    mix: AnomalyMix,
}

impl LoginEventSimulator {
    /// Simulator using the default anomaly mix
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self {
            reference_time,
            mix: AnomalyMix::default(),
        }
    }

    /// Replace the anomaly mix
    pub fn with_mix(mut self, mix: AnomalyMix) -> Self {
        self.mix = mix;
        self
    }

    pub fn mix(&self) -> &AnomalyMix {
        &self.mix
    }

    /// Generate `n_logins` events in generation order
    ///
    /// All parameters are checked before the first draw. Per event the RNG is
    /// consumed in a fixed order: user, time, device, country, IP octets,
    /// anomaly decision, then band and mechanism draws for anomalous events.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        users: &[User],
        n_logins: usize,
        anomaly_rate: f64,
        rng: &mut R,
    ) -> Result<Vec<LoginEvent>> {
        self.validate(users, n_logins, anomaly_rate)?;

        let window_start = self.reference_time - Duration::days(LOGIN_WINDOW_DAYS);
        let window_secs = LOGIN_WINDOW_DAYS * 86_400;

        let mut events = Vec::with_capacity(n_logins);
        for _ in 0..n_logins {
            let user = &users[rng.gen_range(0..users.len())];

            let mut draft = EventDraft {
                login_time: window_start + Duration::seconds(rng.gen_range(0..window_secs)),
                device_id: device_id(rng.gen_range(0..DEVICE_POOL_SIZE)),
                country: self.draw_country(user, rng),
            };
            let ip_address = random_ip(rng);

            let mut applied = None;
            if rng.gen::<f64>() < anomaly_rate {
                let kind = self.mix.select(rng.gen::<f64>());
                anomaly::apply(kind, &mut draft, rng);
                applied = Some(kind);
            }

            let event = LoginEvent::new(
                user.user_id(),
                draft.login_time,
                draft.device_id,
                draft.country,
                ip_address,
                0,
            )?;
            events.push(match applied {
                Some(kind) => event.with_anomaly(kind),
                None => event,
            });
        }

        let counts = anomaly_counts(&events);
        let anomalous: usize = counts.values().sum();
        debug!(?counts, "Anomaly mechanism counts");
        info!(
            events = events.len(),
            anomalous = anomalous,
            positive_rate = anomalous as f64 / events.len() as f64,
            "Generated login events"
        );

        Ok(events)
    }

    fn validate(&self, users: &[User], n_logins: usize, anomaly_rate: f64) -> Result<()> {
        if users.is_empty() {
            return Err(PipelineError::InvalidParameter(
                "user population must not be empty".to_string(),
            ));
        }
        if n_logins == 0 {
            return Err(PipelineError::InvalidParameter(
                "n_logins must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&anomaly_rate) {
            return Err(PipelineError::InvalidParameter(format!(
                "anomaly_rate must lie in [0, 1], got {anomaly_rate}"
            )));
        }
        self.mix.validate()
    }

    fn draw_country<R: Rng + ?Sized>(&self, user: &User, rng: &mut R) -> String {
        if rng.gen::<f64>() < HOME_COUNTRY_WEIGHT {
            user.home_country().to_string()
        } else {
            NOMINAL_REGIONS[rng.gen_range(0..NOMINAL_REGIONS.len())].to_string()
        }
    }
}

fn random_ip<R: Rng + ?Sized>(rng: &mut R) -> Ipv4Addr {
    let mut octets = [0u8; 4];
    for octet in &mut octets {
        *octet = rng.gen_range(1..=254);
    }
    Ipv4Addr::from(octets)
}

/// Number of generated events per applied mechanism
pub fn anomaly_counts(events: &[LoginEvent]) -> HashMap<AnomalyKind, usize> {
    let mut counts = HashMap::new();
    for kind in events.iter().filter_map(LoginEvent::anomaly) {
        *counts.entry(kind).or_insert(0) += 1;
    }
    counts
}
