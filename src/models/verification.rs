//! Phone verification codes kept in the session store
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How often a password reset code may be requested
pub const RESET_REQUEST_INTERVAL_S: u64 = 60;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    Verify,
    PasswordReset,
}

impl VerificationPurpose {
    pub fn as_str(&self) -> &'static str {
        match *self {
            VerificationPurpose::Verify => "verify",
            VerificationPurpose::PasswordReset => "password_reset",
        }
    }

    /// Codes older than this are rejected
    pub fn code_ttl(&self) -> Duration {
        match *self {
            VerificationPurpose::Verify => Duration::from_secs(10 * 60),
            VerificationPurpose::PasswordReset => Duration::from_secs(5 * 60),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        *self == VerificationPurpose::PasswordReset
    }

    pub fn code_key(&self, phone: &str) -> String {
        format!("sms_code:{}:{}", self.as_str(), phone)
    }

    pub fn throttle_key(&self, phone: &str) -> String {
        format!("sms_throttle:{}:{}", self.as_str(), phone)
    }
}

impl fmt::Display for VerificationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Code with the moment it was sent, stored as `code|unix_seconds`
#[derive(Clone, Debug, PartialEq)]
pub struct StoredCode {
    pub code: String,
    pub sent_at: SystemTime,
}

impl StoredCode {
    pub fn encode(&self) -> String {
        let secs = self
            .sent_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("{}|{}", self.code, secs)
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.rsplitn(2, '|');
        let secs = parts.next()?.parse::<u64>().ok()?;
        let code = parts.next()?.to_string();
        Some(Self {
            code,
            sent_at: UNIX_EPOCH + Duration::from_secs(secs),
        })
    }

    /// Trimmed exact match within the purpose window
    pub fn matches(&self, candidate: &str, purpose: VerificationPurpose, now: SystemTime) -> bool {
        let age = now.duration_since(self.sent_at).unwrap_or_else(|_| Duration::from_secs(0));
        age <= purpose.code_ttl() && self.code.trim() == candidate.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_code_decodes_what_it_encodes() {
        let stored = StoredCode {
            code: "123456".to_string(),
            sent_at: UNIX_EPOCH + Duration::from_secs(1_500_000_000),
        };
        assert_eq!(StoredCode::decode(&stored.encode()), Some(stored));
        assert_eq!(StoredCode::decode("garbage"), None);
    }

    #[test]
    fn test_code_windows_differ_by_purpose() {
        let sent_at = UNIX_EPOCH + Duration::from_secs(1_000);
        let stored = StoredCode {
            code: "4242".to_string(),
            sent_at,
        };
        let after_seven_minutes = sent_at + Duration::from_secs(7 * 60);
        assert!(stored.matches(" 4242 ", VerificationPurpose::Verify, after_seven_minutes));
        assert!(!stored.matches("4242", VerificationPurpose::PasswordReset, after_seven_minutes));
        assert!(!stored.matches("4243", VerificationPurpose::Verify, sent_at));
    }
}
