//! Synthetic user records

use crate::error::{PipelineError, Result};
use crate::types::region::{is_home_country, HOME_COUNTRIES};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A simulated account holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Globally unique identifier
    user_id: Uuid,

    /// Country the user normally logs in from
    home_country: String,

    /// Account creation time (UTC)
    signup_ts: DateTime<Utc>,
}

impl User {
    /// Create a user, rejecting home countries outside the fixed set
    pub fn new(
        user_id: Uuid,
        home_country: impl Into<String>,
        signup_ts: DateTime<Utc>,
    ) -> Result<Self> {
        let home_country = home_country.into();
        if !is_home_country(&home_country) {
            return Err(PipelineError::DataIntegrity(format!(
                "home_country {home_country:?} is not one of {HOME_COUNTRIES:?}"
            )));
        }
        Ok(Self {
            user_id,
            home_country,
            signup_ts,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn home_country(&self) -> &str {
        &self.home_country
    }

    pub fn signup_ts(&self) -> DateTime<Utc> {
        self.signup_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejects_unknown_country() {
        let err = User::new(Uuid::nil(), "ZZ", Utc::now()).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }

    #[test]
    fn test_user_serialization() {
        let user = User::new(Uuid::new_v4(), "CA", Utc::now()).unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["home_country"], "CA");
        assert_eq!(json["user_id"], user.user_id().to_string());
    }
}
