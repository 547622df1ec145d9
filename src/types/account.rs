use serde::{Deserialize, Serialize};

/// Risk appetite of an account, selecting a sizing profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    #[default]
    Conservative,
    Aggressive,
}

impl RiskProfile {
    /// Parse from string. Unknown values fall back to conservative.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "aggressive" => Self::Aggressive,
            _ => Self::Conservative,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Aggressive => "aggressive",
        }
    }
}

/// A trading account served by one execution client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    /// Display name.
    pub name: String,
    /// Last known balance in account currency.
    pub balance: f64,
    pub risk_profile: RiskProfile,
    /// Inactive accounts never receive commands.
    pub active: bool,
    /// Unix timestamp (milliseconds) of the last poll, if any.
    pub last_seen: Option<i64>,
    /// Unix timestamp (milliseconds) of registration.
    pub created_at: i64,
}

impl Account {
    /// Create a new active account.
    pub fn new(name: impl Into<String>, balance: f64, risk_profile: RiskProfile) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            balance,
            risk_profile,
            active: true,
            last_seen: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_profile_falls_back_to_conservative() {
        assert_eq!(RiskProfile::from_str_lossy("aggressive"), RiskProfile::Aggressive);
        assert_eq!(RiskProfile::from_str_lossy("yolo"), RiskProfile::Conservative);
        assert_eq!(RiskProfile::from_str_lossy(""), RiskProfile::Conservative);
    }

    #[test]
    fn test_new_account_is_active() {
        let account = Account::new("demo", 1000.0, RiskProfile::Aggressive);
        assert!(account.active);
        assert!(account.last_seen.is_none());
        assert_eq!(account.balance, 1000.0);
    }
}
