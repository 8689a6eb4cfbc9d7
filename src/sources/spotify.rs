use async_trait::async_trait;
use regex::Regex;
use rspotify::{
    model::{AlbumId, PlayableItem, PlaylistId, TrackId},
    prelude::*,
    ClientCredsSpotify, Credentials,
};
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ResolveError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36";

static PAGE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex is valid"));

static SONG_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.*) - song( and lyrics)? by (.*) \| Spotify").expect("song regex is valid")
});

static META_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<meta\s[^>]*>").expect("meta regex is valid"));

static CONTENT_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"content="([^"]+)""#).expect("content regex is valid"));

/// Origen de datos de Spotify.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpotifyCatalog: Send + Sync {
    /// "Título Artista" de una canción, listo para buscar en YouTube
    async fn track_query(&self, url: &str) -> Result<String, ResolveError>;

    /// Enlaces de las canciones de un álbum o playlist
    async fn collection_links(&self, url: &str) -> Result<Vec<String>, ResolveError>;
}

/// Convierte enlaces de Spotify en algo que YouTube pueda buscar.
///
/// With `SPOTIFY_ID`/`SPOTIFY_SECRET` configured the catalog API is asked
/// first; it pages through whole albums and playlists. The public page is
/// the fallback when there are no credentials or the API call fails, and
/// only carries the songs it embeds.
pub struct SpotifyClient {
    api: Option<Arc<dyn SpotifyCatalog>>,
    pages: Arc<dyn SpotifyCatalog>,
}

impl SpotifyClient {
    /// Cliente sin credenciales: solo la página pública.
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self::with_catalogs(None, Arc::new(SpotifyPages::new()?)))
    }

    /// Intenta autenticarse con la API; si falla, sigue solo con la página.
    pub async fn connect(credentials: Option<(String, String)>) -> reqwest::Result<Self> {
        let pages: Arc<dyn SpotifyCatalog> = Arc::new(SpotifyPages::new()?);
        let Some((client_id, client_secret)) = credentials else {
            info!("🎧 Spotify sin credenciales, usando la página pública");
            return Ok(Self::with_catalogs(None, pages));
        };

        match SpotifyApi::connect(&client_id, &client_secret).await {
            Ok(api) => {
                info!("✅ API de Spotify autenticada");
                Ok(Self::with_catalogs(Some(Arc::new(api)), pages))
            }
            Err(e) => {
                warn!("⚠️ Revisa SPOTIFY_ID y SPOTIFY_SECRET, usando la página pública: {}", e);
                Ok(Self::with_catalogs(None, pages))
            }
        }
    }

    pub fn with_catalogs(api: Option<Arc<dyn SpotifyCatalog>>, pages: Arc<dyn SpotifyCatalog>) -> Self {
        Self { api, pages }
    }

    pub fn has_api(&self) -> bool {
        self.api.is_some()
    }

    /// "Título Artista" de una canción de Spotify.
    pub async fn track_title(&self, url: &str) -> Result<String, ResolveError> {
        if let Some(api) = &self.api {
            match api.track_query(url).await {
                Ok(query) => return Ok(query),
                Err(e) => warn!("⚠️ API de Spotify falló para {}, probando la página: {}", url, e),
            }
        }
        self.pages.track_query(url).await
    }

    /// Enlaces de canciones de una playlist o álbum.
    pub async fn playlist_links(&self, url: &str) -> Result<Vec<String>, ResolveError> {
        if let Some(api) = &self.api {
            match api.collection_links(url).await {
                Ok(links) => return Ok(links),
                Err(e) => warn!("⚠️ API de Spotify falló para {}, probando la página: {}", url, e),
            }
        }
        self.pages.collection_links(url).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Track,
    Album,
    Playlist,
}

/// Tipo e id de un enlace `open.spotify.com`, con o sin prefijo `intl-xx`.
pub fn catalog_target(url: &str) -> Option<(CatalogKind, String)> {
    let url = Url::parse(url).ok()?;
    let mut segments = url.path_segments()?.filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        let kind = match segment {
            "track" => CatalogKind::Track,
            "album" => CatalogKind::Album,
            "playlist" => CatalogKind::Playlist,
            _ => continue,
        };
        return segments.next().map(|id| (kind, id.to_string()));
    }
    None
}

/// Máximo que acepta la API por página.
const PAGE_LIMIT: u32 = 50;

fn api_error(e: impl std::fmt::Display) -> ResolveError {
    ResolveError::unexpected(format!("API de Spotify: {e}"))
}

fn spotify_link(urls: &std::collections::HashMap<String, String>) -> Option<String> {
    urls.get("spotify").cloned()
}

/// API de catálogo con credenciales de cliente.
pub struct SpotifyApi {
    client: ClientCredsSpotify,
}

impl SpotifyApi {
    pub async fn connect(client_id: &str, client_secret: &str) -> Result<Self, ResolveError> {
        let config = rspotify::Config {
            token_refreshing: true,
            ..Default::default()
        };
        let client = ClientCredsSpotify::with_config(Credentials::new(client_id, client_secret), config);
        client.request_token().await.map_err(api_error)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SpotifyCatalog for SpotifyApi {
    async fn track_query(&self, url: &str) -> Result<String, ResolveError> {
        let id = match catalog_target(url) {
            Some((CatalogKind::Track, id)) => id,
            _ => return Err(ResolveError::expected(format!("no es una canción de Spotify: {url}"))),
        };
        let track_id = TrackId::from_id(id.as_str()).map_err(api_error)?;
        let track = self.client.track(track_id, None).await.map_err(api_error)?;

        let query = match track.artists.first() {
            Some(artist) => format!("{} {}", track.name, artist.name),
            None => track.name,
        };
        debug!("🎧 Spotify API → búsqueda: {}", query);
        Ok(query)
    }

    async fn collection_links(&self, url: &str) -> Result<Vec<String>, ResolveError> {
        let links: Vec<String> = match catalog_target(url) {
            Some((CatalogKind::Album, id)) => {
                let album_id = AlbumId::from_id(id.as_str()).map_err(api_error)?;
                let mut links = Vec::new();
                let mut offset = 0;
                loop {
                    let page = self
                        .client
                        .album_track_manual(album_id.clone(), None, Some(PAGE_LIMIT), Some(offset))
                        .await
                        .map_err(api_error)?;
                    offset += page.items.len() as u32;
                    links.extend(
                        page.items
                            .iter()
                            .filter_map(|track| spotify_link(&track.external_urls)),
                    );
                    if page.next.is_none() || page.items.is_empty() {
                        break links;
                    }
                }
            }
            Some((CatalogKind::Playlist, id)) => {
                let playlist_id = PlaylistId::from_id(id.as_str()).map_err(api_error)?;
                let mut links = Vec::new();
                let mut offset = 0;
                loop {
                    let page = self
                        .client
                        .playlist_items_manual(playlist_id.clone(), None, None, Some(PAGE_LIMIT), Some(offset))
                        .await
                        .map_err(api_error)?;
                    offset += page.items.len() as u32;
                    links.extend(page.items.iter().filter_map(|item| match &item.track {
                        Some(PlayableItem::Track(track)) => spotify_link(&track.external_urls),
                        _ => None,
                    }));
                    if page.next.is_none() || page.items.is_empty() {
                        break links;
                    }
                }
            }
            _ => return Err(ResolveError::expected(format!("no es un álbum ni playlist: {url}"))),
        };

        debug!("📜 Spotify API: {} canciones en {}", links.len(), url);
        Ok(links)
    }
}

/// Lectura de la página pública, sin credenciales.
///
/// The page already carries the song title and artist and, for playlists
/// and albums, `music:song` links.
pub struct SpotifyPages {
    http: reqwest::Client,
}

impl SpotifyPages {
    pub fn new() -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { http })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ResolveError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::unexpected(format!("Spotify no responde: {e}")))?;

        if !response.status().is_success() {
            return Err(ResolveError::expected(format!(
                "Spotify devolvió {} para {url}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ResolveError::unexpected(format!("respuesta de Spotify ilegible: {e}")))
    }
}

#[async_trait]
impl SpotifyCatalog for SpotifyPages {
    async fn track_query(&self, url: &str) -> Result<String, ResolveError> {
        let page_url = if url.contains("?si=") {
            with_nd_flag(url)
        } else {
            url.to_string()
        };
        let page = self.fetch_page(&page_url).await?;
        let title = parse_track_title(&page)
            .ok_or_else(|| ResolveError::unexpected(format!("página de Spotify sin título: {url}")))?;
        debug!("🎧 Spotify → búsqueda: {}", title);
        Ok(title)
    }

    async fn collection_links(&self, url: &str) -> Result<Vec<String>, ResolveError> {
        let page = self.fetch_page(&with_nd_flag(url)).await?;
        Ok(parse_song_links(&page))
    }
}

fn with_nd_flag(url: &str) -> String {
    if url.contains('?') {
        format!("{url}&nd=1")
    } else {
        format!("{url}?nd=1")
    }
}

pub fn parse_track_title(page: &str) -> Option<String> {
    let raw = PAGE_TITLE.captures(page)?.get(1)?.as_str();
    let title = unescape(raw.trim());
    if title.is_empty() {
        return None;
    }
    Some(SONG_TITLE.replace(&title, "$1 $3").into_owned())
}

pub fn parse_song_links(page: &str) -> Vec<String> {
    META_TAG
        .find_iter(page)
        .map(|tag| tag.as_str())
        .filter(|tag| tag.contains(r#"name="music:song""#))
        .filter_map(|tag| CONTENT_ATTR.captures(tag))
        .filter_map(|caps| caps.get(1).map(|m| unescape(m.as_str())))
        .collect()
}

fn unescape(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn track_page_title_becomes_query() {
        let page = "<html><head><title>Blinding Lights - song and lyrics by The Weeknd | Spotify</title></head></html>";
        assert_eq!(parse_track_title(page).as_deref(), Some("Blinding Lights The Weeknd"));

        let old = "<title>Hey Jude - song by The Beatles | Spotify</title>";
        assert_eq!(parse_track_title(old).as_deref(), Some("Hey Jude The Beatles"));
    }

    #[test]
    fn unknown_title_format_is_kept() {
        let page = "<title>Rock &amp; Roll</title>";
        assert_eq!(parse_track_title(page).as_deref(), Some("Rock & Roll"));
        assert_eq!(parse_track_title("<html></html>"), None);
    }

    #[test]
    fn playlist_page_song_links() {
        let page = r#"
            <meta property="og:title" content="Mix"/>
            <meta name="music:song" content="https://open.spotify.com/track/1"/>
            <meta content="https://open.spotify.com/track/2" name="music:song"/>
        "#;
        assert_eq!(
            parse_song_links(page),
            vec![
                "https://open.spotify.com/track/1".to_string(),
                "https://open.spotify.com/track/2".to_string()
            ]
        );
    }

    #[test]
    fn catalog_target_reads_kind_and_id() {
        assert_eq!(
            catalog_target("https://open.spotify.com/playlist/37i9dQZF1DX0XUsuxWHRQd?si=abc"),
            Some((CatalogKind::Playlist, "37i9dQZF1DX0XUsuxWHRQd".to_string()))
        );
        assert_eq!(
            catalog_target("https://open.spotify.com/intl-es/album/4aawyAB9vmqN3uQ7FjRGTy"),
            Some((CatalogKind::Album, "4aawyAB9vmqN3uQ7FjRGTy".to_string()))
        );
        assert_eq!(catalog_target("https://open.spotify.com/artist/1"), None);
        assert_eq!(catalog_target("not a url"), None);
    }

    const PLAYLIST: &str = "https://open.spotify.com/playlist/abc";

    fn links(ids: &[&str]) -> Vec<String> {
        ids.iter()
            .map(|id| format!("https://open.spotify.com/track/{id}"))
            .collect()
    }

    #[tokio::test]
    async fn api_result_skips_the_page() {
        let mut api = MockSpotifyCatalog::new();
        api.expect_collection_links()
            .times(1)
            .returning(|_| Ok(links(&["1", "2", "3"])));
        let pages = MockSpotifyCatalog::new();

        let client = SpotifyClient::with_catalogs(Some(Arc::new(api)), Arc::new(pages));
        assert_eq!(client.playlist_links(PLAYLIST).await.unwrap(), links(&["1", "2", "3"]));
    }

    #[tokio::test]
    async fn api_failure_falls_back_to_page() {
        let mut api = MockSpotifyCatalog::new();
        api.expect_collection_links()
            .times(1)
            .returning(|_| Err(ResolveError::unexpected("invalid_client")));
        api.expect_track_query()
            .times(1)
            .returning(|_| Err(ResolveError::unexpected("invalid_client")));
        let mut pages = MockSpotifyCatalog::new();
        pages
            .expect_collection_links()
            .times(1)
            .returning(|_| Ok(links(&["1"])));
        pages
            .expect_track_query()
            .times(1)
            .returning(|_| Ok("Hey Jude The Beatles".to_string()));

        let client = SpotifyClient::with_catalogs(Some(Arc::new(api)), Arc::new(pages));
        assert_eq!(client.playlist_links(PLAYLIST).await.unwrap(), links(&["1"]));
        assert_eq!(
            client.track_title("https://open.spotify.com/track/1").await.unwrap(),
            "Hey Jude The Beatles"
        );
    }

    #[tokio::test]
    async fn without_credentials_only_the_page_is_used() {
        let mut pages = MockSpotifyCatalog::new();
        pages
            .expect_collection_links()
            .withf(|url| url.ends_with("/playlist/abc"))
            .times(1)
            .returning(|_| Ok(links(&["9"])));

        let client = SpotifyClient::with_catalogs(None, Arc::new(pages));
        assert!(!client.has_api());
        assert_eq!(client.playlist_links(PLAYLIST).await.unwrap(), links(&["9"]));
    }

    #[tokio::test]
    async fn missing_credentials_skip_authentication() {
        let client = SpotifyClient::connect(None).await.unwrap();
        assert!(!client.has_api());
    }

    #[test]
    fn nd_flag_respects_existing_query() {
        assert_eq!(with_nd_flag("https://x/track/1?si=a"), "https://x/track/1?si=a&nd=1");
        assert_eq!(with_nd_flag("https://x/album/1"), "https://x/album/1?nd=1");
    }
}
