//! Engine configuration: defaults, overridden from the environment
use super::error::ConfigError;
use super::policy::Roster;
use super::proposal::PreservationPolicy;
use super::templates::Mailboxes;
use super::types::UserId;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// How many times a commit that lost a race is re-applied before giving up.
    pub commit_retries: u32,
    pub preservation: PreservationPolicy,
    pub roster: Roster,
    pub mailboxes: Mailboxes,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("procurement.db"),
            commit_retries: 8,
            preservation: PreservationPolicy::PreserveMatching,
            roster: Roster::default(),
            mailboxes: Mailboxes::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = read("PROCUREMENT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(value) = read("PROCUREMENT_COMMIT_RETRIES") {
            config.commit_retries = parse_u32("PROCUREMENT_COMMIT_RETRIES", &value)?;
        }
        if let Some(value) = read("PROCUREMENT_PRESERVE_DECISIONS") {
            config.preservation = if parse_bool("PROCUREMENT_PRESERVE_DECISIONS", &value)? {
                PreservationPolicy::PreserveMatching
            } else {
                PreservationPolicy::Discard
            };
        }
        if let Some(value) = read("PROCUREMENT_ADMINS") {
            config.roster.admins = split_list(&value).map(UserId::new).collect();
        }
        if let Some(value) = read("PROCUREMENT_CLIENT_ADMINS") {
            config.roster.client_admins = split_list(&value)
                .map(|entry| parse_client_admin("PROCUREMENT_CLIENT_ADMINS", entry))
                .collect::<Result<_, _>>()?;
        }

        let mailboxes = &mut config.mailboxes;
        for (key, slot) in [
            ("NCR_BA61_TIER1_BUDGET_MAILBOX", &mut mailboxes.ba61_tier1_budget),
            ("NCR_BA61_TIER2_BUDGET_MAILBOX", &mut mailboxes.ba61_tier2_budget),
            ("NCR_BA80_BUDGET_MAILBOX", &mut mailboxes.ba80_budget),
            ("NCR_OOL_BA80_BUDGET_MAILBOX", &mut mailboxes.ool_ba80_budget),
        ] {
            if let Some(value) = read(key) {
                *slot = UserId::new(value);
            }
        }
        mailboxes.gsa18f_approver = read("GSA18F_APPROVER_EMAIL").map(UserId::new);
        mailboxes.gsa18f_purchaser = read("GSA18F_PURCHASER_EMAIL").map(UserId::new);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=64).contains(&self.commit_retries) {
            return Err(ConfigError::Validation(
                "commit_retries must be in range 1..=64".to_string(),
            ));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("db_path must not be empty".to_string()));
        }
        Ok(())
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|entry| !entry.is_empty())
}

fn parse_client_admin(key: &str, entry: &str) -> Result<(UserId, String), ConfigError> {
    // `user@domain@slug`, the slug follows the last `@`
    match entry.rsplit_once('@') {
        Some((user, slug)) if user.contains('@') && !slug.is_empty() => {
            Ok((UserId::new(user), slug.to_string()))
        }
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: entry.to_string(),
        }),
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config, EngineConfig::default());
        assert_eq!(
            config.mailboxes.ba61_tier2_budget,
            UserId::new("communicart.ofm.approver@gmail.com")
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("PROCUREMENT_DB_PATH", "/tmp/approvals.db"),
            ("PROCUREMENT_COMMIT_RETRIES", "3"),
            ("PROCUREMENT_PRESERVE_DECISIONS", "false"),
            ("PROCUREMENT_ADMINS", "root@example.gov, ops@example.gov"),
            ("PROCUREMENT_CLIENT_ADMINS", "admin@some-dot-gov.gov@abc_company"),
            ("NCR_BA61_TIER1_BUDGET_MAILBOX", "foo@example.gov"),
            ("NCR_BA80_BUDGET_MAILBOX", "   "),
            ("GSA18F_APPROVER_EMAIL", "approver@gsa.gov"),
        ])
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/approvals.db"));
        assert_eq!(config.commit_retries, 3);
        assert_eq!(config.preservation, PreservationPolicy::Discard);
        assert_eq!(config.roster.admins.len(), 2);
        assert_eq!(
            config.roster.client_admins,
            vec![(UserId::new("admin@some-dot-gov.gov"), "abc_company".to_string())]
        );
        assert_eq!(config.mailboxes.ba61_tier1_budget, UserId::new("foo@example.gov"));
        // blank means unset
        assert_eq!(config.mailboxes.ba80_budget, Mailboxes::default().ba80_budget);
        assert_eq!(config.mailboxes.gsa18f_approver, Some(UserId::new("approver@gsa.gov")));
    }

    #[test]
    fn bad_overrides_are_reported() {
        assert!(matches!(
            config_from(&[("PROCUREMENT_COMMIT_RETRIES", "many")]),
            Err(ConfigError::InvalidEnvOverride { .. })
        ));
        assert!(matches!(
            config_from(&[("PROCUREMENT_PRESERVE_DECISIONS", "sometimes")]),
            Err(ConfigError::InvalidEnvOverride { .. })
        ));
        assert!(matches!(
            config_from(&[("PROCUREMENT_CLIENT_ADMINS", "no-slug@example.gov")]),
            Err(ConfigError::InvalidEnvOverride { .. })
        ));
        assert!(matches!(
            config_from(&[("PROCUREMENT_COMMIT_RETRIES", "0")]),
            Err(ConfigError::Validation(_))
        ));
    }
}
