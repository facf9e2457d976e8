//! Login event records

use crate::error::{PipelineError, Result};
use crate::types::region::{is_known_country, is_pool_device, is_unregistered_device};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// The perturbation applied to an anomalous login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Device replaced with an unregistered variant
    NewDevice,
    /// Country replaced with a high-risk country
    ImprobableGeo,
    /// Login time pushed forward by a few minutes
    RapidSuccession,
}

impl AnomalyKind {
    pub const ALL: [AnomalyKind; 3] = [
        AnomalyKind::NewDevice,
        AnomalyKind::ImprobableGeo,
        AnomalyKind::RapidSuccession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::NewDevice => "new_device",
            AnomalyKind::ImprobableGeo => "improbable_geo",
            AnomalyKind::RapidSuccession => "rapid_succession",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single simulated login
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginEvent {
    /// Owning user
    user_id: Uuid,

    /// Login timestamp (UTC)
    login_time: DateTime<Utc>,

    /// Pool device id, or its unregistered variant
    device_id: String,

    /// Region the login came from
    country: String,

    /// Source address, every octet in [1, 254]
    ip_address: Ipv4Addr,

    /// 1 iff an anomaly mechanism was applied
    label: u8,

    /// Mechanism applied at generation time; not part of the flat table
    #[serde(skip)]
    anomaly: Option<AnomalyKind>,
}

impl LoginEvent {
    /// Create a login event, validating every field
    pub fn new(
        user_id: Uuid,
        login_time: DateTime<Utc>,
        device_id: impl Into<String>,
        country: impl Into<String>,
        ip_address: Ipv4Addr,
        label: u8,
    ) -> Result<Self> {
        let device_id = device_id.into();
        let country = country.into();

        if !is_pool_device(&device_id) && !is_unregistered_device(&device_id) {
            return Err(PipelineError::DataIntegrity(format!(
                "device_id {device_id:?} is not a pool device"
            )));
        }
        if !is_known_country(&country) {
            return Err(PipelineError::DataIntegrity(format!(
                "country {country:?} is not a known region"
            )));
        }
        if ip_address.octets().iter().any(|&o| o == 0 || o == 255) {
            return Err(PipelineError::DataIntegrity(format!(
                "ip_address {ip_address} has an octet outside [1, 254]"
            )));
        }
        if label > 1 {
            return Err(PipelineError::DataIntegrity(format!(
                "label must be 0 or 1, got {label}"
            )));
        }

        Ok(Self {
            user_id,
            login_time,
            device_id,
            country,
            ip_address,
            label,
            anomaly: None,
        })
    }

    /// Mark the event as produced by the given anomaly mechanism
    pub fn with_anomaly(mut self, kind: AnomalyKind) -> Self {
        self.label = 1;
        self.anomaly = Some(kind);
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn login_time(&self) -> DateTime<Utc> {
        self.login_time
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn ip_address(&self) -> Ipv4Addr {
        self.ip_address
    }

    pub fn label(&self) -> u8 {
        self.label
    }

    pub fn is_anomalous(&self) -> bool {
        self.label == 1
    }

    /// Known only for events that were generated in this process
    pub fn anomaly(&self) -> Option<AnomalyKind> {
        self.anomaly
    }
}
