// Capability-tag security policy

use crate::error::ToolError;
use crate::types::ToolSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Security level, ordered from most permissive to most restrictive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Unrestricted,
    #[default]
    Safe,
    Sandboxed,
    Restricted,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Unrestricted,
        SecurityLevel::Safe,
        SecurityLevel::Sandboxed,
        SecurityLevel::Restricted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unrestricted => "unrestricted",
            Self::Safe => "safe",
            Self::Sandboxed => "sandboxed",
            Self::Restricted => "restricted",
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unrestricted,
            1 => Self::Safe,
            2 => Self::Sandboxed,
            _ => Self::Restricted,
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unrestricted" => Ok(Self::Unrestricted),
            "safe" => Ok(Self::Safe),
            "sandboxed" => Ok(Self::Sandboxed),
            "restricted" => Ok(Self::Restricted),
            other => Err(format!("unknown security level: {other}")),
        }
    }
}

/// Level -> denied capability tags.
///
/// Tables are normalised on construction so a level denies everything any
/// lower level denies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyTable {
    denied: BTreeMap<SecurityLevel, BTreeSet<String>>,
}

impl DenyTable {
    pub fn new<I, S>(entries: impl IntoIterator<Item = (SecurityLevel, I)>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut raw: BTreeMap<SecurityLevel, BTreeSet<String>> = BTreeMap::new();
        for (level, tags) in entries {
            raw.entry(level)
                .or_default()
                .extend(tags.into_iter().map(Into::into));
        }

        let mut denied = BTreeMap::new();
        let mut acc = BTreeSet::new();
        for level in SecurityLevel::ALL {
            if let Some(tags) = raw.remove(&level) {
                acc.extend(tags);
            }
            denied.insert(level, acc.clone());
        }
        Self { denied }
    }

    pub fn denied(&self, level: SecurityLevel) -> &BTreeSet<String> {
        // Every level is populated by `new`.
        &self.denied[&level]
    }
}

impl Default for DenyTable {
    fn default() -> Self {
        Self::new([
            (SecurityLevel::Unrestricted, vec![]),
            (
                SecurityLevel::Safe,
                vec!["system", "network", "dangerous", "process"],
            ),
            (SecurityLevel::Sandboxed, vec!["file_write"]),
            (SecurityLevel::Restricted, vec!["file_read", "filesystem"]),
        ])
    }
}

/// Policy gate consulted before every execution.
///
/// The level is a single atomic value; changing it affects subsequent
/// checks only.
#[derive(Debug)]
pub struct SecurityPolicy {
    level: AtomicU8,
    table: DenyTable,
}

impl SecurityPolicy {
    pub fn new(level: SecurityLevel) -> Self {
        Self::with_table(level, DenyTable::default())
    }

    pub fn with_table(level: SecurityLevel, table: DenyTable) -> Self {
        Self {
            level: AtomicU8::new(level.to_u8()),
            table,
        }
    }

    pub fn level(&self) -> SecurityLevel {
        SecurityLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn set_level(&self, level: SecurityLevel) {
        let previous = SecurityLevel::from_u8(self.level.swap(level.to_u8(), Ordering::AcqRel));
        if previous != level {
            tracing::info!(from = %previous, to = %level, "Security level changed");
        }
    }

    pub fn denied_tags(&self, level: SecurityLevel) -> &BTreeSet<String> {
        self.table.denied(level)
    }

    /// Tags from `tags` that the current level denies.
    pub fn violations<'a, I>(&self, tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let denied = self.denied_tags(self.level());
        tags.into_iter()
            .filter(|tag| denied.contains(*tag))
            .cloned()
            .collect()
    }

    pub fn allows<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.violations(tags).is_empty()
    }

    /// Gate a tool against the current level.
    pub fn check(&self, spec: &ToolSpec) -> Result<(), ToolError> {
        let level = self.level();
        let denied = self.violations(&spec.tags);
        if denied.is_empty() {
            Ok(())
        } else {
            tracing::warn!(tool = %spec.name, level = %level, ?denied, "Tool blocked by security policy");
            Err(ToolError::SecurityDenied {
                tool: spec.name.clone(),
                level,
                denied,
            })
        }
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::new(SecurityLevel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering_and_parsing() {
        assert!(SecurityLevel::Unrestricted < SecurityLevel::Safe);
        assert!(SecurityLevel::Safe < SecurityLevel::Sandboxed);
        assert!(SecurityLevel::Sandboxed < SecurityLevel::Restricted);
        assert_eq!("SANDBOXED".parse::<SecurityLevel>(), Ok(SecurityLevel::Sandboxed));
        assert!("paranoid".parse::<SecurityLevel>().is_err());
        assert_eq!(
            serde_json::to_string(&SecurityLevel::Restricted).unwrap(),
            "\"restricted\""
        );
    }

    #[test]
    fn test_denied_tags_are_monotonic() {
        let policy = SecurityPolicy::default();
        for (i, low) in SecurityLevel::ALL.iter().enumerate() {
            for high in &SecurityLevel::ALL[i..] {
                assert!(
                    policy.denied_tags(*low).is_subset(policy.denied_tags(*high)),
                    "{low} should deny a subset of {high}"
                );
            }
        }
        assert!(policy.denied_tags(SecurityLevel::Unrestricted).is_empty());
    }

    #[test]
    fn test_custom_table_is_normalised() {
        // Restricted lists nothing itself but must still inherit Safe's denials.
        let table = DenyTable::new([
            (SecurityLevel::Safe, vec!["network"]),
            (SecurityLevel::Restricted, vec![]),
        ]);
        assert!(table.denied(SecurityLevel::Sandboxed).contains("network"));
        assert!(table.denied(SecurityLevel::Restricted).contains("network"));
        assert!(table.denied(SecurityLevel::Unrestricted).is_empty());
    }

    #[test]
    fn test_dangerous_tool_gated_by_level() {
        let spec = ToolSpec::new("nuke", "Delete everything").tag("dangerous");
        let policy = SecurityPolicy::new(SecurityLevel::Safe);

        match policy.check(&spec) {
            Err(ToolError::SecurityDenied { tool, level, denied }) => {
                assert_eq!(tool, "nuke");
                assert_eq!(level, SecurityLevel::Safe);
                assert_eq!(denied, vec!["dangerous".to_string()]);
            }
            other => panic!("expected SecurityDenied, got {other:?}"),
        }

        policy.set_level(SecurityLevel::Unrestricted);
        assert!(policy.check(&spec).is_ok());
    }

    #[test]
    fn test_untagged_tools_always_allowed() {
        let spec = ToolSpec::new("echo", "Echo");
        for level in SecurityLevel::ALL {
            assert!(SecurityPolicy::new(level).check(&spec).is_ok());
        }
    }

    #[test]
    fn test_file_tags_by_level() {
        let read = ["file_read".to_string()];
        let write = ["file_write".to_string()];
        let policy = SecurityPolicy::new(SecurityLevel::Safe);
        assert!(policy.allows(&read));
        assert!(policy.allows(&write));

        policy.set_level(SecurityLevel::Sandboxed);
        assert!(policy.allows(&read));
        assert!(!policy.allows(&write));

        policy.set_level(SecurityLevel::Restricted);
        assert!(!policy.allows(&read));
    }
}
