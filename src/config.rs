use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::prefetch::Prefetcher;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub default_volume: u8,
    #[serde(with = "humantime_serde_compat")]
    pub idle_timeout: Duration,
    pub auto_timeout_default: bool,
    pub prefetch_window: usize,
    pub title_history_len: usize,
    pub history_limit: Option<usize>,
    pub max_playlist_size: usize,

    // Extracción
    pub ytdlp_binary: String,
    pub cookie_path: Option<PathBuf>,
    #[serde(with = "humantime_serde_compat")]
    pub resolve_timeout: Duration,
    #[serde(with = "humantime_serde_compat")]
    pub stream_ttl: Duration,

    // Spotify (opcional)
    pub spotify_id: Option<String>,
    #[serde(skip_serializing)]
    pub spotify_secret: Option<String>,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("no se pudo crear {}", config.data_dir.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Construye la configuración a partir de cualquier fuente clave/valor.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .trim()
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Reproducción
            default_volume: var("DEFAULT_VOLUME")
                .unwrap_or_else(|| defaults.default_volume.to_string())
                .trim()
                .parse()
                .context("DEFAULT_VOLUME debe ser un entero 0-100")?,
            idle_timeout: parse_duration(var("VC_TIMEOUT"), defaults.idle_timeout)
                .context("VC_TIMEOUT inválido")?,
            auto_timeout_default: parse_bool(var("VC_TIMEOUT_DEFAULT"), defaults.auto_timeout_default)
                .context("VC_TIMEOUT_DEFAULT inválido")?,
            prefetch_window: var("MAX_SONG_PRELOAD")
                .unwrap_or_else(|| defaults.prefetch_window.to_string())
                .trim()
                .parse()
                .context("MAX_SONG_PRELOAD inválido")?,
            title_history_len: var("MAX_TRACKNAME_HISTORY_LENGTH")
                .unwrap_or_else(|| defaults.title_history_len.to_string())
                .trim()
                .parse()
                .context("MAX_TRACKNAME_HISTORY_LENGTH inválido")?,
            // 0 = sin límite
            history_limit: match var("MAX_HISTORY_LENGTH") {
                Some(value) => Some(value.trim().parse::<usize>().context("MAX_HISTORY_LENGTH inválido")?)
                    .filter(|limit| *limit > 0),
                None => defaults.history_limit,
            },
            max_playlist_size: var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|| defaults.max_playlist_size.to_string())
                .trim()
                .parse()
                .context("MAX_PLAYLIST_SIZE inválido")?,

            // Extracción
            ytdlp_binary: var("YTDLP_BINARY").unwrap_or(defaults.ytdlp_binary),
            cookie_path: var("COOKIE_PATH").map(PathBuf::from),
            resolve_timeout: parse_duration(var("RESOLVE_TIMEOUT"), defaults.resolve_timeout)
                .context("RESOLVE_TIMEOUT inválido")?,
            stream_ttl: parse_duration(var("STREAM_TTL"), defaults.stream_ttl)
                .context("STREAM_TTL inválido")?,

            // Spotify
            spotify_id: var("SPOTIFY_ID"),
            spotify_secret: var("SPOTIFY_SECRET"),

            // Paths
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - The prefetch window cannot exceed [`Prefetcher::MAX_WINDOW`]
    /// - Idle timeout and resolve timeout must be non-zero
    /// - Playlists must allow at least one track
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.prefetch_window > Prefetcher::MAX_WINDOW {
            anyhow::bail!(
                "Prefetch window cannot exceed {}, got: {}",
                Prefetcher::MAX_WINDOW,
                self.prefetch_window
            );
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Credenciales de la API de Spotify, solo si están las dos.
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        Some((self.spotify_id.clone()?, self.spotify_secret.clone()?))
    }

    /// Secrets (Discord token, Spotify secret) are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {}% vol, idle {} (auto={}), preload {}\n  \
            History: {} titles, {} tracks\n  \
            Extraction: {} (timeout {}, stream ttl {}, cookies={})\n  \
            Playlists: up to {} tracks (Spotify API={})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            humantime::format_duration(self.idle_timeout),
            self.auto_timeout_default,
            self.prefetch_window,
            self.title_history_len,
            self.history_limit.map_or("unlimited".to_string(), |limit| limit.to_string()),
            self.ytdlp_binary,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.stream_ttl),
            self.cookie_path.is_some(),
            self.max_playlist_size,
            self.spotify_credentials().is_some(),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 100,
            idle_timeout: Duration::from_secs(600),
            auto_timeout_default: true,
            prefetch_window: 5,
            title_history_len: 15,
            history_limit: None,
            max_playlist_size: 100,

            ytdlp_binary: "yt-dlp".to_string(),
            cookie_path: None,
            resolve_timeout: Duration::from_secs(60),
            stream_ttl: Duration::from_secs(5 * 60 * 60),

            spotify_id: None,
            spotify_secret: None,

            data_dir: "/app/data".into(),
        }
    }
}

/// Segundos a secas (`600`) o formato humano (`10m`, `1h 30m`).
fn parse_duration(value: Option<String>, default: Duration) -> Result<Duration> {
    let Some(value) = value else {
        return Ok(default);
    };
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    Ok(humantime::parse_duration(value)?)
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => anyhow::bail!("valor booleano inválido: {}", v),
    }
}

/// Serializa duraciones como texto legible (`10m`).
mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [("DISCORD_TOKEN", "token"), ("APPLICATION_ID", "42")];

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.application_id, 42);
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.prefetch_window, 5);
        assert_eq!(config.title_history_len, 15);
        assert_eq!(config.history_limit, None);
        assert!(config.auto_timeout_default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(Config::from_lookup(lookup(&[("APPLICATION_ID", "42")])).is_err());
    }

    #[test]
    fn timeouts_accept_seconds_or_human_format() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("VC_TIMEOUT", "90"));
        vars.push(("STREAM_TTL", "2h 30m"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
        assert_eq!(config.stream_ttl, Duration::from_secs(9000));
    }

    #[test]
    fn zero_history_length_means_unbounded() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_HISTORY_LENGTH", "0"));
        assert_eq!(Config::from_lookup(lookup(&vars)).unwrap().history_limit, None);

        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_HISTORY_LENGTH", "50"));
        assert_eq!(Config::from_lookup(lookup(&vars)).unwrap().history_limit, Some(50));
    }

    #[test]
    fn booleans_are_lenient() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("VC_TIMEOUT_DEFAULT", "False"));
        assert!(!Config::from_lookup(lookup(&vars)).unwrap().auto_timeout_default);

        let mut vars = REQUIRED.to_vec();
        vars.push(("VC_TIMEOUT_DEFAULT", "maybe"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn validate_rejects_oversized_window() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_SONG_PRELOAD", "30"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }

    #[test]
    fn spotify_api_needs_both_credentials() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.spotify_credentials(), None);

        let mut vars = REQUIRED.to_vec();
        vars.push(("SPOTIFY_ID", "id"));
        assert_eq!(Config::from_lookup(lookup(&vars)).unwrap().spotify_credentials(), None);

        vars.push(("SPOTIFY_SECRET", "secret"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(
            config.spotify_credentials(),
            Some(("id".to_string(), "secret".to_string()))
        );
        assert!(!config.summary().contains("secret"));
    }
}
