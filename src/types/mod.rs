//! Record types for users, login events and feature rows

pub mod features;
pub mod login;
pub mod region;
pub mod user;

pub use features::{FeatureRow, FEATURE_NAMES, FIRST_LOGIN_SENTINEL};
pub use login::{AnomalyKind, LoginEvent};
pub use user::User;
