//! Server and game configuration.

use crate::clock::Millis;
use crate::special_action::StalenessPolicy;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use go_engine::{EvaluationOptions, PlayMode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Largest supported board.
pub const MAX_BOARD_SIZE: usize = 25;

/// Longest per-side time bank, one day.
pub const MAX_TIME_LIMIT_SECS: u64 = 86_400;

/// Longest selection window, animation or staleness ceiling.
pub const MAX_WINDOW_MS: Millis = 600_000;

/// Rules and timings of one match.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize, JsonSchema)]
#[setters(prefix = "with_")]
pub struct GameSettings {
    /// Side length of the board.
    #[serde(default = "default_board_size")]
    board_size: usize,

    /// Per-side time bank in seconds; `0` disables the clock.
    #[serde(default = "default_time_limit_secs")]
    time_limit_secs: u64,

    /// Missiles per seat.
    #[serde(default = "default_missile_count")]
    missile_count: u32,

    /// Hidden placements per seat.
    #[serde(default = "default_hidden_stone_count")]
    hidden_stone_count: u32,

    /// Length of the missile selection window.
    #[serde(default = "default_selection_window_ms")]
    selection_window_ms: Millis,

    /// Planned missile animation length.
    #[serde(default = "default_animation_ms")]
    animation_ms: Millis,

    /// Multiple of the animation length after which it is stale.
    #[serde(default = "default_stale_factor")]
    stale_factor: i64,

    /// Upper bound on the staleness threshold.
    #[serde(default = "default_stale_ceiling_ms")]
    stale_ceiling_ms: Millis,

    /// Accept self-capturing placements.
    #[serde(default)]
    allow_suicide: bool,

    /// Versus or single player. Kept last so TOML output stays valid.
    #[serde(default)]
    mode: PlayMode,
}

fn default_board_size() -> usize {
    19
}

fn default_time_limit_secs() -> u64 {
    600
}

fn default_missile_count() -> u32 {
    2
}

fn default_hidden_stone_count() -> u32 {
    1
}

fn default_selection_window_ms() -> Millis {
    30_000
}

fn default_animation_ms() -> Millis {
    2_000
}

fn default_stale_factor() -> i64 {
    5
}

fn default_stale_ceiling_ms() -> Millis {
    15_000
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            board_size: default_board_size(),
            mode: PlayMode::default(),
            time_limit_secs: default_time_limit_secs(),
            missile_count: default_missile_count(),
            hidden_stone_count: default_hidden_stone_count(),
            selection_window_ms: default_selection_window_ms(),
            animation_ms: default_animation_ms(),
            stale_factor: default_stale_factor(),
            stale_ceiling_ms: default_stale_ceiling_ms(),
            allow_suicide: false,
        }
    }
}

impl GameSettings {
    /// Per-side time bank, `None` when untimed.
    pub fn time_limit(&self) -> Option<Millis> {
        let secs = Millis::try_from(self.time_limit_secs).unwrap_or(Millis::MAX);
        (secs > 0).then(|| secs.saturating_mul(1_000))
    }

    /// Engine options derived from these settings.
    pub fn evaluation_options(&self) -> EvaluationOptions {
        EvaluationOptions {
            ignore_suicide: self.allow_suicide,
            mode: self.mode,
        }
    }

    /// When lingering animations are forced to commit.
    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.stale_factor, self.stale_ceiling_ms)
    }

    /// Checks the settings for values no match can run with.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=MAX_BOARD_SIZE).contains(&self.board_size) {
            return Err(ConfigError::new(format!(
                "board_size must be between 2 and {MAX_BOARD_SIZE}, got {}",
                self.board_size
            )));
        }
        if self.time_limit_secs > MAX_TIME_LIMIT_SECS {
            return Err(ConfigError::new(format!(
                "time_limit_secs must be at most {MAX_TIME_LIMIT_SECS}, got {}",
                self.time_limit_secs
            )));
        }
        for (field, value) in [
            ("selection_window_ms", self.selection_window_ms),
            ("animation_ms", self.animation_ms),
            ("stale_ceiling_ms", self.stale_ceiling_ms),
        ] {
            if !(1..=MAX_WINDOW_MS).contains(&value) {
                return Err(ConfigError::new(format!(
                    "{field} must be between 1 and {MAX_WINDOW_MS}, got {value}"
                )));
            }
        }
        if self.stale_factor < 1 {
            return Err(ConfigError::new("stale_factor must be at least 1".to_string()));
        }
        if self.stale_ceiling_ms < self.animation_ms {
            return Err(ConfigError::new(
                "stale_ceiling_ms must not be shorter than animation_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize, JsonSchema)]
#[setters(prefix = "with_")]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    port: u16,

    /// Period of the deadline sweep.
    #[serde(default = "default_sweep_interval_ms")]
    sweep_interval_ms: u64,

    /// Settings for newly created sessions.
    #[serde(default)]
    game: GameSettings,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sweep_interval_ms: default_sweep_interval_ms(),
            game: GameSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Loads and validates configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_toml(&content)?;
        info!(
            host = %config.host,
            port = config.port,
            board_size = config.game.board_size,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::new(
                "sweep_interval_ms must be positive".to_string(),
            ));
        }
        self.game.validate()
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use go_engine::Stone;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.game().time_limit(), Some(600_000));
    }

    #[test]
    fn test_partial_game_section() {
        let config = ServerConfig::from_toml(
            r#"
            port = 8080

            [game]
            board_size = 9
            time_limit_secs = 0
            mode = { kind = "single_player", bot = "white" }
            "#,
        )
        .unwrap();
        assert_eq!(*config.port(), 8080);
        assert_eq!(*config.game().board_size(), 9);
        assert_eq!(config.game().time_limit(), None);
        assert_eq!(
            *config.game().mode(),
            PlayMode::SinglePlayer { bot: Stone::White }
        );
        assert_eq!(*config.game().missile_count(), 2);
    }

    #[test]
    fn test_invalid_board_size_is_rejected() {
        let err = ServerConfig::from_toml("[game]\nboard_size = 1\n").unwrap_err();
        assert!(err.message.contains("board_size"));
    }

    #[test]
    fn test_setters_chain() {
        let settings = GameSettings::default()
            .with_board_size(5)
            .with_missile_count(0);
        assert_eq!(*settings.board_size(), 5);
        assert_eq!(*settings.missile_count(), 0);
        assert!(settings.validate().is_ok());
    }
}
