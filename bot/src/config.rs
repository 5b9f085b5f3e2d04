use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::chat::{ChannelId, RoleId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Display labels for the event currency ("gift"/"gifts" by default).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Currency {
    pub singular: String,
    pub plural: String,
}

impl Default for Currency {
    fn default() -> Self {
        Self {
            singular: "gift".to_string(),
            plural: "gifts".to_string(),
        }
    }
}

/// Tunables for the gift minigame.
///
/// `gift_strings` templates use `{sender}` and `{recipient}` placeholders.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    /// Channels where public messages can trigger a drop.
    pub drop_channels: HashSet<ChannelId>,
    /// Probability that an eligible message drops a gift.
    pub drop_chance: f64,
    /// Seconds before a user can receive another drop.
    pub cooldown_time: u64,
    /// Seconds a give-up/reset confirmation stays pending.
    pub confirm_timeout: u64,
    /// Channel receiving public delivery announcements.
    pub announce_channel: ChannelId,
    /// `(gifts_sent, role_id)` pairs granted when the count is reached.
    pub reward_roles: Vec<(i64, RoleId)>,
    pub gift_colors: Vec<String>,
    pub gift_strings: Vec<String>,
    pub try_again: Vec<String>,
    pub currency: Currency,
    pub embed_url: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            drop_channels: HashSet::new(),
            drop_chance: 0.1,
            cooldown_time: 30,
            confirm_timeout: 30,
            announce_channel: 0,
            reward_roles: Vec::new(),
            gift_colors: vec![
                "red".to_string(),
                "green".to_string(),
                "gold".to_string(),
            ],
            gift_strings: vec!["{sender} sent a gift to {recipient}!".to_string()],
            try_again: vec![
                "The present came back! Let's try that label again.".to_string(),
            ],
            currency: Currency::default(),
            embed_url: String::new(),
        }
    }
}

impl BotConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn reward_for(&self, gifts_sent: i64) -> Option<RoleId> {
        self.reward_roles
            .iter()
            .find(|(count, _)| *count == gifts_sent)
            .map(|(_, role)| *role)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_time as i64)
    }

    pub fn confirm_window(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tuning() {
        let config = BotConfig::default();
        assert_eq!(config.drop_chance, 0.1);
        assert_eq!(config.cooldown_time, 30);
        assert_eq!(config.confirm_timeout, 30);
        assert_eq!(config.currency.plural, "gifts");
        assert!(config.reward_roles.is_empty());
    }

    #[test]
    fn parses_toml_with_partial_overrides() {
        let raw = r#"
            drop_channels = [100, 101]
            drop_chance = 0.25
            announce_channel = 200
            reward_roles = [[5, 555], [10, 556]]
            gift_colors = ["blue"]

            [currency]
            singular = "coin"
            plural = "coins"
        "#;
        let config: BotConfig = toml::from_str(raw).unwrap();
        assert!(config.drop_channels.contains(&101));
        assert_eq!(config.drop_chance, 0.25);
        assert_eq!(config.cooldown_time, 30); // default survives
        assert_eq!(config.reward_for(10), Some(556));
        assert_eq!(config.reward_for(7), None);
        assert_eq!(config.currency.singular, "coin");
    }
}
