use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Handle compartido entre la cola, el historial y las tareas de prefetch.
pub type TrackRef = Arc<Track>;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Identidad de un elemento encolado. Dos envíos de la misma URL son dos tracks distintos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Resolved,
    Failed,
}

/// Cómo llegó el track a la cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Direct,
    Playlist,
}

/// Sitio de origen detectado a partir del localizador.
///
/// `Unknown` is what a free-text search query classifies as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    YouTube,
    Spotify,
    SpotifyPlaylist,
    SoundCloud,
    Bandcamp,
    Twitter,
    Custom,
    Unknown,
}

impl SiteKind {
    pub fn label(&self) -> &'static str {
        match self {
            SiteKind::YouTube => "YouTube",
            SiteKind::Spotify | SiteKind::SpotifyPlaylist => "Spotify",
            SiteKind::SoundCloud => "SoundCloud",
            SiteKind::Bandcamp => "Bandcamp",
            SiteKind::Twitter => "Twitter",
            SiteKind::Custom => "Archivo directo",
            SiteKind::Unknown => "Búsqueda",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaylistKind {
    YouTube,
    Spotify,
    Bandcamp,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
}

impl TrackMetadata {
    /// Completa los campos vacíos con los de `other`.
    fn merge(&mut self, other: TrackMetadata) {
        self.title = other.title.or(self.title.take());
        self.uploader = other.uploader.or(self.uploader.take());
        self.duration = other.duration.or(self.duration);
        self.thumbnail = other.thumbnail.or(self.thumbnail.take());
        self.webpage_url = other.webpage_url.or(self.webpage_url.take());
    }
}

/// Resultado de una resolución exitosa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub metadata: TrackMetadata,
    pub stream_url: Option<String>,
}

#[derive(Debug)]
struct TrackState {
    resolution: ResolutionState,
    metadata: TrackMetadata,
    stream_url: Option<String>,
    resolved_at: Option<Instant>,
}

/// Un elemento de la cola, resuelto de forma perezosa.
///
/// Identity and provenance are immutable. Resolution data lives behind a
/// lock so that the prefetcher, the controller and the UI can share the
/// same `Arc<Track>` without copying it around the queue and history.
#[derive(Debug)]
pub struct Track {
    id: TrackId,
    locator: String,
    origin: Origin,
    site: SiteKind,
    requested_by: Option<u64>,
    added_at: DateTime<Utc>,
    state: RwLock<TrackState>,
}

impl Track {
    pub fn new(locator: impl Into<String>, origin: Origin, site: SiteKind) -> Self {
        Self {
            id: TrackId::next(),
            locator: locator.into(),
            origin,
            site,
            requested_by: None,
            added_at: Utc::now(),
            state: RwLock::new(TrackState {
                resolution: ResolutionState::Unresolved,
                metadata: TrackMetadata::default(),
                stream_url: None,
                resolved_at: None,
            }),
        }
    }

    pub fn with_requester(mut self, user_id: Option<u64>) -> Self {
        self.requested_by = user_id;
        self
    }

    /// Pre-carga un título conocido (p. ej. desde una playlist plana).
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.state.write().metadata.title = Some(title.into());
        self
    }

    pub fn into_ref(self) -> TrackRef {
        Arc::new(self)
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn site(&self) -> SiteKind {
        self.site
    }

    pub fn is_search(&self) -> bool {
        self.site == SiteKind::Unknown
    }

    pub fn requested_by(&self) -> Option<u64> {
        self.requested_by
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    pub fn resolution(&self) -> ResolutionState {
        self.state.read().resolution
    }

    /// Listo para reproducir sin volver a consultar al proveedor.
    pub fn is_prepared(&self) -> bool {
        self.state.read().resolution == ResolutionState::Resolved
    }

    pub fn title(&self) -> Option<String> {
        self.state.read().metadata.title.clone()
    }

    pub fn display_title(&self) -> String {
        self.title().unwrap_or_else(|| self.locator.clone())
    }

    pub fn metadata(&self) -> TrackMetadata {
        self.state.read().metadata.clone()
    }

    pub fn stream_url(&self) -> Option<String> {
        self.state.read().stream_url.clone()
    }

    /// URL pública del track; para búsquedas sin resolver es la consulta misma.
    pub fn webpage_url(&self) -> String {
        self.state
            .read()
            .metadata
            .webpage_url
            .clone()
            .unwrap_or_else(|| self.locator.clone())
    }

    /// Stream URLs handed out by providers are signed and short-lived.
    pub fn stream_expired(&self, ttl: Option<Duration>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        self.state
            .read()
            .resolved_at
            .map_or(true, |at| at.elapsed() >= ttl)
    }

    /// Returns `false` if another attempt already owns the transition.
    pub(crate) fn begin_resolution(&self) -> bool {
        let mut state = self.state.write();
        if state.resolution == ResolutionState::Resolving {
            return false;
        }
        state.resolution = ResolutionState::Resolving;
        true
    }

    pub(crate) fn complete(&self, resolved: ResolvedTrack) {
        let mut state = self.state.write();
        state.metadata.merge(resolved.metadata);
        state.stream_url = resolved.stream_url;
        state.resolved_at = Some(Instant::now());
        state.resolution = ResolutionState::Resolved;
    }

    pub(crate) fn fail(&self) {
        let mut state = self.state.write();
        state.stream_url = None;
        state.resolution = ResolutionState::Failed;
    }

    /// Descarta el endpoint para forzar una nueva resolución.
    pub fn invalidate_stream(&self) {
        let mut state = self.state.write();
        state.stream_url = None;
        state.resolved_at = None;
        if state.resolution == ResolutionState::Resolved {
            state.resolution = ResolutionState::Unresolved;
        }
    }

    pub fn view(&self) -> TrackView {
        let state = self.state.read();
        TrackView {
            id: self.id,
            title: state
                .metadata
                .title
                .clone()
                .unwrap_or_else(|| self.locator.clone()),
            uploader: state.metadata.uploader.clone(),
            duration: state.metadata.duration,
            thumbnail: state.metadata.thumbnail.clone(),
            url: state
                .metadata
                .webpage_url
                .clone()
                .unwrap_or_else(|| self.locator.clone()),
            site: self.site,
            origin: self.origin,
            requested_by: self.requested_by,
        }
    }
}

/// Copia inmutable para la capa de presentación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackView {
    pub id: TrackId,
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub url: String,
    pub site: SiteKind,
    pub origin: Origin,
    pub requested_by: Option<u64>,
}
