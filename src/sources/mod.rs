//! # Sources Module
//!
//! Resolution of queued tracks into playable streams.
//!
//! - [`links`]: classifies user input (site, playlist or free-text search)
//! - [`ytdlp`]: provider clients backed by the `yt-dlp` executable
//! - [`spotify`]: Spotify links through the catalog API, with page scraping as fallback
//!
//! Every provider call goes through a single process-wide [`Extractor`],
//! which caches one client per exact option set and serializes calls
//! behind one gate. [`SourceResolver`] layers the per-site strategy on
//! top of it and is what the playback core sees through [`TrackResolver`].

pub mod links;
pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::audio::track::{Origin, PlaylistKind, ResolvedTrack, SiteKind, Track, TrackMetadata};
use crate::error::ResolveError;

pub use spotify::SpotifyClient;
pub use ytdlp::YtDlpFactory;

/// Lo que el núcleo de reproducción necesita de la resolución.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Obtiene metadatos y stream para un track
    async fn resolve(&self, track: &Track) -> Result<ResolvedTrack, ResolveError>;

    /// Expande una playlist en tracks sin resolver
    async fn expand_playlist(
        &self,
        kind: PlaylistKind,
        url: &str,
    ) -> Result<Vec<Track>, ResolveError>;
}

/// Opciones de extracción; son la clave exacta del caché de clientes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ExtractOptions {
    pub format: Option<String>,
    pub cookie_file: Option<PathBuf>,
    pub flat_playlist: bool,
    pub default_search: Option<String>,
    pub no_playlist: bool,
}

impl ExtractOptions {
    /// Mejor audio disponible, para reproducir.
    pub fn stream(cookie_file: Option<PathBuf>) -> Self {
        Self {
            format: Some("bestaudio".to_string()),
            cookie_file,
            ..Default::default()
        }
    }

    /// Sin selector de formato; segundo intento tras un fallo inesperado.
    pub fn lenient(cookie_file: Option<PathBuf>) -> Self {
        Self {
            cookie_file,
            ..Default::default()
        }
    }

    pub fn search(cookie_file: Option<PathBuf>) -> Self {
        Self {
            format: Some("bestaudio/best".to_string()),
            cookie_file,
            default_search: Some("auto".to_string()),
            no_playlist: true,
            ..Default::default()
        }
    }

    pub fn flat_playlist(cookie_file: Option<PathBuf>) -> Self {
        Self {
            format: Some("bestaudio/best".to_string()),
            cookie_file,
            flat_playlist: true,
            ..Default::default()
        }
    }
}

/// Subconjunto del JSON de yt-dlp que usamos.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub requested_formats: Vec<ExtractedFormat>,
    #[serde(default)]
    pub entries: Vec<ExtractedInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedFormat {
    pub url: Option<String>,
    pub acodec: Option<String>,
}

impl ExtractedInfo {
    /// Stream directo; si yt-dlp combinó formatos se usa el que trae audio.
    pub fn stream_url(&self) -> Option<String> {
        self.url.clone().or_else(|| {
            self.requested_formats
                .iter()
                .find(|format| format.acodec.as_deref().is_some_and(|codec| codec != "none"))
                .and_then(|format| format.url.clone())
        })
    }

    pub fn into_resolved(self) -> ResolvedTrack {
        let stream_url = self.stream_url();
        ResolvedTrack {
            metadata: TrackMetadata {
                title: self.title,
                uploader: self.uploader,
                duration: self
                    .duration
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64),
                thumbnail: self.thumbnail,
                webpage_url: self.webpage_url,
            },
            stream_url,
        }
    }
}

/// Un cliente del proveedor configurado con un conjunto de opciones.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractorClient: Send + Sync {
    async fn extract(&self, target: &str) -> Result<ExtractedInfo, ResolveError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait ClientFactory: Send + Sync {
    fn build(&self, options: &ExtractOptions) -> Arc<dyn ExtractorClient>;
}

/// Punto único de acceso al proveedor, compartido por todas las sesiones.
pub struct Extractor {
    factory: Arc<dyn ClientFactory>,
    clients: DashMap<ExtractOptions, Arc<dyn ExtractorClient>>,
    gate: tokio::sync::Mutex<()>,
}

impl Extractor {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Cliente cacheado para estas opciones; se crea en el primer uso.
    pub fn client_for(&self, options: &ExtractOptions) -> Arc<dyn ExtractorClient> {
        if let Some(client) = self.clients.get(options) {
            return client.clone();
        }
        self.clients
            .entry(options.clone())
            .or_insert_with(|| {
                debug!("🧰 Nuevo cliente de extracción: {:?}", options);
                self.factory.build(options)
            })
            .clone()
    }

    /// Ejecuta una extracción; las llamadas de todo el proceso van de a una.
    pub async fn extract_info(
        &self,
        target: &str,
        options: &ExtractOptions,
    ) -> Result<ExtractedInfo, ResolveError> {
        let client = self.client_for(options);
        let _permit = self.gate.lock().await;
        client.extract(target).await
    }

    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Estrategia de resolución por sitio sobre el [`Extractor`].
pub struct SourceResolver {
    extractor: Arc<Extractor>,
    spotify: SpotifyClient,
    cookie_file: Option<PathBuf>,
    max_playlist_size: usize,
}

impl SourceResolver {
    pub fn new(
        extractor: Arc<Extractor>,
        spotify: SpotifyClient,
        cookie_file: Option<PathBuf>,
        max_playlist_size: usize,
    ) -> Self {
        Self {
            extractor,
            spotify,
            cookie_file,
            max_playlist_size,
        }
    }

    async fn search(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        debug!("🔍 Buscando en YouTube: {}", query);
        let info = self
            .extractor
            .extract_info(
                &format!("ytsearch:{query}"),
                &ExtractOptions::search(self.cookie_file.clone()),
            )
            .await?;

        info.entries
            .into_iter()
            .next()
            .map(ExtractedInfo::into_resolved)
            .ok_or_else(|| ResolveError::expected(format!("sin resultados para `{query}`")))
    }

    async fn fetch(&self, url: &str) -> Result<ResolvedTrack, ResolveError> {
        match self
            .extractor
            .extract_info(url, &ExtractOptions::stream(self.cookie_file.clone()))
            .await
        {
            Ok(info) => Ok(info.into_resolved()),
            Err(e) if e.expected => Err(e),
            Err(e) => {
                debug!("🔄 Reintentando sin selector de formato ({}): {}", e, url);
                self.extractor
                    .extract_info(url, &ExtractOptions::lenient(self.cookie_file.clone()))
                    .await
                    .map(ExtractedInfo::into_resolved)
            }
        }
    }

    async fn flat_entries(&self, url: &str) -> Result<Vec<ExtractedInfo>, ResolveError> {
        let info = self
            .extractor
            .extract_info(url, &ExtractOptions::flat_playlist(self.cookie_file.clone()))
            .await?;
        Ok(info.entries)
    }
}

#[async_trait]
impl TrackResolver for SourceResolver {
    async fn resolve(&self, track: &Track) -> Result<ResolvedTrack, ResolveError> {
        match track.site() {
            SiteKind::Spotify => {
                let title = self.spotify.track_title(track.locator()).await?;
                self.search(&title).await
            }
            _ if track.is_search() => self.search(track.locator()).await,
            _ => self.fetch(track.locator()).await,
        }
    }

    async fn expand_playlist(
        &self,
        kind: PlaylistKind,
        url: &str,
    ) -> Result<Vec<Track>, ResolveError> {
        let tracks: Vec<Track> = match kind {
            PlaylistKind::YouTube => self
                .flat_entries(url)
                .await?
                .into_iter()
                .filter_map(|entry| {
                    let id = entry.id?;
                    let track = Track::new(
                        format!("https://www.youtube.com/watch?v={id}"),
                        Origin::Playlist,
                        SiteKind::YouTube,
                    );
                    Some(match entry.title {
                        Some(title) => track.with_title(title),
                        None => track,
                    })
                })
                .collect(),
            PlaylistKind::Spotify => self
                .spotify
                .playlist_links(url)
                .await?
                .into_iter()
                .map(|link| Track::new(link, Origin::Playlist, SiteKind::Spotify))
                .collect(),
            PlaylistKind::Bandcamp => self
                .flat_entries(url)
                .await?
                .into_iter()
                .filter_map(|entry| entry.url)
                .map(|link| Track::new(link, Origin::Playlist, SiteKind::Bandcamp))
                .collect(),
            PlaylistKind::Unknown => Vec::new(),
        };

        info!("🎵 Playlist expandida con {} tracks: {}", tracks.len(), url);
        Ok(tracks.into_iter().take(self.max_playlist_size).collect())
    }
}
