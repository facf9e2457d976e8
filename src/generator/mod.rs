//! Synthetic user and login generation

pub mod anomaly;
pub mod logins;
pub mod users;

pub use anomaly::AnomalyMix;
pub use logins::{anomaly_counts, LoginEventSimulator, DEFAULT_ANOMALY_RATE};
pub use users::UserPopulationGenerator;
