//! Model-ready feature rows

use crate::error::{PipelineError, Result};
use serde::Serialize;

/// Column order used to build every training and scoring matrix
pub const FEATURE_NAMES: [&str; 4] = [
    "user_unique_devices_to_date",
    "secs_since_prev_login",
    "is_geo_mismatch",
    "logins_last_24h",
];

/// Value of `secs_since_prev_login` for a user's first login
pub const FIRST_LOGIN_SENTINEL: f64 = -1.0;

/// Features and label for one login event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRow {
    user_unique_devices_to_date: u32,
    secs_since_prev_login: f64,
    is_geo_mismatch: bool,
    logins_last_24h: u32,
    label: u8,
}

impl FeatureRow {
    pub fn new(
        user_unique_devices_to_date: u32,
        secs_since_prev_login: f64,
        is_geo_mismatch: bool,
        logins_last_24h: u32,
        label: u8,
    ) -> Result<Self> {
        let secs_ok = secs_since_prev_login == FIRST_LOGIN_SENTINEL
            || (secs_since_prev_login.is_finite() && secs_since_prev_login >= 0.0);
        if !secs_ok {
            return Err(PipelineError::DataIntegrity(format!(
                "secs_since_prev_login must be >= 0 or {FIRST_LOGIN_SENTINEL}, got {secs_since_prev_login}"
            )));
        }
        if label > 1 {
            return Err(PipelineError::DataIntegrity(format!(
                "label must be 0 or 1, got {label}"
            )));
        }
        Ok(Self {
            user_unique_devices_to_date,
            secs_since_prev_login,
            is_geo_mismatch,
            logins_last_24h,
            label,
        })
    }

    /// Feature values in `FEATURE_NAMES` order
    pub fn values(&self) -> [f64; 4] {
        [
            self.user_unique_devices_to_date as f64,
            self.secs_since_prev_login,
            if self.is_geo_mismatch { 1.0 } else { 0.0 },
            self.logins_last_24h as f64,
        ]
    }

    /// Look up a feature by column name
    pub fn value(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.values()[idx])
    }

    pub fn user_unique_devices_to_date(&self) -> u32 {
        self.user_unique_devices_to_date
    }

    pub fn secs_since_prev_login(&self) -> f64 {
        self.secs_since_prev_login
    }

    pub fn is_geo_mismatch(&self) -> bool {
        self.is_geo_mismatch
    }

    pub fn logins_last_24h(&self) -> u32 {
        self.logins_last_24h
    }

    pub fn label(&self) -> u8 {
        self.label
    }
}
