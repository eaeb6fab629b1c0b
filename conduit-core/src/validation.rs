//! Exit code validation policy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule deciding whether a non-zero exit code is a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Any exit code other than zero becomes a validation error
    #[default]
    ZeroExitCode,
    /// The exit code is reported but never treated as a failure
    None,
}

impl ValidationPolicy {
    /// Check whether the given exit code satisfies this policy
    pub fn accepts(&self, exit_code: i32) -> bool {
        match self {
            ValidationPolicy::ZeroExitCode => exit_code == 0,
            ValidationPolicy::None => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationPolicy::ZeroExitCode => "zero_exit_code",
            ValidationPolicy::None => "none",
        }
    }
}

impl fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zero_exit_code" | "zero-exit-code" | "zero" => Ok(ValidationPolicy::ZeroExitCode),
            "none" | "off" => Ok(ValidationPolicy::None),
            _ => Err(format!("Invalid validation policy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_accepts() {
        assert!(ValidationPolicy::ZeroExitCode.accepts(0));
        assert!(!ValidationPolicy::ZeroExitCode.accepts(7));
        assert!(ValidationPolicy::None.accepts(7));
        assert!(ValidationPolicy::None.accepts(-1));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("none".parse::<ValidationPolicy>(), Ok(ValidationPolicy::None));
        assert_eq!(
            "Zero_Exit_Code".parse::<ValidationPolicy>(),
            Ok(ValidationPolicy::ZeroExitCode)
        );
        assert!("sometimes".parse::<ValidationPolicy>().is_err());
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&ValidationPolicy::ZeroExitCode).unwrap();
        assert_eq!(json, "\"zero_exit_code\"");
        assert_eq!(ValidationPolicy::default(), ValidationPolicy::ZeroExitCode);
    }
}
