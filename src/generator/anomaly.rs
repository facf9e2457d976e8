//! Anomaly injection policy
//!
//! An anomalous login gets exactly one mechanism. Which one is decided by
//! mapping a uniform draw in [0, 1) onto contiguous bands whose widths are the
//! weights of [`AnomalyMix`], in [`AnomalyKind::ALL`] order.

use crate::error::{PipelineError, Result};
use crate::types::region::{unregistered_device_id, DEVICE_POOL_SIZE, HIGH_RISK_COUNTRIES};
use crate::types::AnomalyKind;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Smallest and largest forward shift of a rapid-succession login, in minutes
pub const RAPID_SHIFT_MINUTES: (i64, i64) = (1, 10);

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Discrete distribution over anomaly mechanisms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyMix {
    pub new_device: f64,
    pub improbable_geo: f64,
    pub rapid_succession: f64,
}

impl Default for AnomalyMix {
    fn default() -> Self {
        Self {
            new_device: 0.34,
            improbable_geo: 0.34,
            rapid_succession: 0.32,
        }
    }
}

impl AnomalyMix {
    /// A mix that always picks `kind`
    pub fn only(kind: AnomalyKind) -> Self {
        let mut mix = Self {
            new_device: 0.0,
            improbable_geo: 0.0,
            rapid_succession: 0.0,
        };
        match kind {
            AnomalyKind::NewDevice => mix.new_device = 1.0,
            AnomalyKind::ImprobableGeo => mix.improbable_geo = 1.0,
            AnomalyKind::RapidSuccession => mix.rapid_succession = 1.0,
        }
        mix
    }

    pub fn weight(&self, kind: AnomalyKind) -> f64 {
        match kind {
            AnomalyKind::NewDevice => self.new_device,
            AnomalyKind::ImprobableGeo => self.improbable_geo,
            AnomalyKind::RapidSuccession => self.rapid_succession,
        }
    }

    /// Weights must be finite, non-negative and sum to one
    pub fn validate(&self) -> Result<()> {
        let mut total = 0.0;
        for kind in AnomalyKind::ALL {
            let w = self.weight(kind);
            if !w.is_finite() || w < 0.0 {
                return Err(PipelineError::InvalidParameter(format!(
                    "anomaly weight for {kind} must be a non-negative number, got {w}"
                )));
            }
            total += w;
        }
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PipelineError::InvalidParameter(format!(
                "anomaly weights must sum to 1, got {total}"
            )));
        }
        Ok(())
    }

    /// Band lookup for a uniform draw `u` in [0, 1)
    pub fn select(&self, u: f64) -> AnomalyKind {
        let mut upper = 0.0;
        for kind in AnomalyKind::ALL {
            let w = self.weight(kind);
            upper += w;
            if w > 0.0 && u < upper {
                return kind;
            }
        }
        // rounding left u above the last cumulative bound
        AnomalyKind::ALL
            .into_iter()
            .rev()
            .find(|k| self.weight(*k) > 0.0)
            .unwrap_or(AnomalyKind::RapidSuccession)
    }
}

/// Mutable view of the three fields an anomaly may alter
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub login_time: DateTime<Utc>,
    pub device_id: String,
    pub country: String,
}

/// Apply one mechanism to the draft, touching only the field it owns
pub fn apply<R: Rng + ?Sized>(kind: AnomalyKind, draft: &mut EventDraft, rng: &mut R) {
    match kind {
        AnomalyKind::NewDevice => {
            draft.device_id = unregistered_device_id(rng.gen_range(0..DEVICE_POOL_SIZE));
        }
        AnomalyKind::ImprobableGeo => {
            let idx = rng.gen_range(0..HIGH_RISK_COUNTRIES.len());
            draft.country = HIGH_RISK_COUNTRIES[idx].to_string();
        }
        AnomalyKind::RapidSuccession => {
            let (lo, hi) = RAPID_SHIFT_MINUTES;
            draft.login_time += Duration::minutes(rng.gen_range(lo..=hi));
        }
    }
}
