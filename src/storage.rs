use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::audio::SessionSettings;
use crate::config::Config;

/// Configuración de servidor almacenada en JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildSettings {
    pub guild_id: u64,
    /// `None` usa el volumen global
    pub default_volume: Option<u8>,
    /// Desconectar por inactividad aunque haya oyentes; `None` usa el global
    pub vc_timeout: Option<bool>,
    /// Canal de texto al que se restringen los comandos
    pub command_channel: Option<u64>,
    pub announce_songs: bool,
    pub user_must_be_in_vc: bool,
    /// Canal de voz al que conectarse si el usuario no está en ninguno
    pub start_voice_channel: Option<u64>,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            guild_id: 0,
            default_volume: None,
            vc_timeout: None,
            command_channel: None,
            announce_songs: false,
            user_must_be_in_vc: true,
            start_voice_channel: None,
        }
    }
}

impl GuildSettings {
    pub fn for_guild(guild_id: u64) -> Self {
        Self {
            guild_id,
            ..Default::default()
        }
    }

    /// Ajustes efectivos de sesión: lo del guild pisa lo global.
    pub fn session_settings(&self, config: &Config) -> SessionSettings {
        SessionSettings {
            idle_timeout: config.idle_timeout,
            auto_timeout: self.vc_timeout.unwrap_or(config.auto_timeout_default),
            prefetch_window: config.prefetch_window,
            default_volume: self.default_volume.unwrap_or(config.default_volume).min(100),
            title_log_len: config.title_history_len,
            history_limit: config.history_limit,
            stream_ttl: Some(config.stream_ttl).filter(|ttl| *ttl > Duration::ZERO),
        }
    }

    /// `true` si el comando puede usarse desde `channel_id`.
    pub fn allows_channel(&self, channel_id: u64) -> bool {
        self.command_channel.map_or(true, |allowed| allowed == channel_id)
    }
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    servers_cache: HashMap<u64, GuildSettings>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            servers_cache: HashMap::new(),
        };
        storage.load_all_servers().await?;

        Ok(storage)
    }

    /// Obtiene la configuración de un servidor; sin archivo, los valores por defecto.
    pub fn guild(&self, guild_id: u64) -> GuildSettings {
        self.servers_cache
            .get(&guild_id)
            .cloned()
            .unwrap_or_else(|| GuildSettings::for_guild(guild_id))
    }

    /// Aplica `change` y persiste el resultado.
    pub async fn update_guild(
        &mut self,
        guild_id: u64,
        change: impl FnOnce(&mut GuildSettings),
    ) -> Result<GuildSettings> {
        let mut settings = self.guild(guild_id);
        change(&mut settings);
        settings.guild_id = guild_id;

        self.save_server_config(&settings).await?;
        self.servers_cache.insert(guild_id, settings.clone());

        info!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(settings)
    }

    pub fn list_servers(&self) -> Vec<u64> {
        self.servers_cache.keys().copied().collect()
    }

    // Métodos privados

    async fn load_server_config(&self, guild_id: u64) -> Result<GuildSettings> {
        let content = fs::read_to_string(self.server_file_path(guild_id)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_server_config(&self, settings: &GuildSettings) -> Result<()> {
        let file_path = self.server_file_path(settings.guild_id);
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&file_path, content).await?;
        Ok(())
    }

    async fn load_all_servers(&mut self) -> Result<()> {
        let mut files = fs::read_dir(self.data_dir.join("servers")).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Some(guild_id) = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };

            match self.load_server_config(guild_id).await {
                Ok(mut settings) => {
                    settings.guild_id = guild_id;
                    self.servers_cache.insert(guild_id, settings);
                    loaded_count += 1;
                }
                Err(e) => {
                    warn!("Error cargando configuración para guild {}: {}", guild_id, e);
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {} configuraciones de servidor", loaded_count);
        }

        Ok(())
    }

    fn server_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("servers").join(format!("guild_{}.json", guild_id))
    }
}
