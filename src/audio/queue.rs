use rand::seq::SliceRandom;
use std::{collections::VecDeque, fmt, str::FromStr, time::Duration};
use tracing::{debug, info};

use crate::audio::track::{TrackId, TrackRef, TrackView};
use crate::error::PlayerError;

/// Política de `pop_next` al terminar una canción.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    All,
    Single,
}

impl LoopMode {
    pub fn emoji(&self) -> &'static str {
        match self {
            LoopMode::Off => "➡️",
            LoopMode::All => "🔁",
            LoopMode::Single => "🔂",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopMode::Off => "off",
            LoopMode::All => "all",
            LoopMode::Single => "single",
        })
    }
}

impl FromStr for LoopMode {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "all" => Ok(LoopMode::All),
            "single" => Ok(LoopMode::Single),
            other => Err(PlayerError::InvalidMode(other.to_string())),
        }
    }
}

/// Cola, canción actual e historial de una sesión.
///
/// A track is either ahead of playback (queue or `current`) or behind it
/// (`history`). Positions taken by `remove` and `move_track` are 1-based
/// and validated before anything is mutated.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<TrackRef>,
    current: Option<TrackRef>,
    history: VecDeque<TrackRef>,
    titles: VecDeque<String>,
    loop_mode: LoopMode,
    max_titles: usize,
    max_history: Option<usize>,
}

impl MusicQueue {
    pub fn new(max_titles: usize, max_history: Option<usize>) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            history: VecDeque::new(),
            titles: VecDeque::new(),
            loop_mode: LoopMode::Off,
            max_titles,
            max_history,
        }
    }

    /// Agrega un track al final y devuelve su posición (1-based).
    pub fn enqueue(&mut self, track: TrackRef) -> usize {
        debug!("➕ Agregado a la cola: {}", track.display_title());
        self.items.push_back(track);
        self.items.len()
    }

    /// Agrega un track al frente de la cola
    pub fn enqueue_front(&mut self, track: TrackRef) {
        self.items.push_front(track);
    }

    /// Avanza a la siguiente canción según el modo de repetición.
    pub fn pop_next(&mut self) -> Option<TrackRef> {
        if self.loop_mode == LoopMode::Single {
            if let Some(current) = &self.current {
                debug!("🔂 Repitiendo: {}", current.display_title());
                return Some(current.clone());
            }
        }

        self.retire_current();

        if self.items.is_empty() && self.loop_mode == LoopMode::All && !self.history.is_empty() {
            info!("🔁 Rellenando la cola con {} canciones del historial", self.history.len());
            self.items.extend(self.history.drain(..));
        }

        let next = self.items.pop_front();
        if next.is_none() {
            debug!("📭 Cola vacía, no hay siguiente track");
        }
        self.current = next.clone();
        next
    }

    /// Saca la canción más reciente del historial.
    pub fn pop_prev(&mut self) -> Option<TrackRef> {
        self.history.pop_back()
    }

    /// Mueve la canción actual al historial sin avanzar.
    pub fn retire_current(&mut self) {
        if let Some(previous) = self.current.take() {
            self.history.push_back(previous);
            if let Some(max) = self.max_history {
                while self.history.len() > max {
                    self.history.pop_front();
                }
            }
        }
    }

    /// Descarta la canción actual sin registrarla en el historial.
    pub fn discard_current(&mut self) -> Option<TrackRef> {
        self.current.take()
    }

    pub fn take_current(&mut self) -> Option<TrackRef> {
        self.current.take()
    }

    pub fn set_current(&mut self, track: Option<TrackRef>) {
        self.current = track;
    }

    pub fn current(&self) -> Option<&TrackRef> {
        self.current.as_ref()
    }

    /// Elimina la canción en `position` (1-based).
    pub fn remove(&mut self, position: usize) -> Result<TrackRef, PlayerError> {
        let index = self.index_of(position)?;
        let removed = self.items.remove(index).ok_or(PlayerError::OutOfRange {
            position,
            len: self.items.len(),
        })?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(removed)
    }

    /// Elimina por identidad; usado cuando falla la resolución.
    pub fn remove_track(&mut self, id: TrackId) -> Option<TrackRef> {
        let index = self.items.iter().position(|track| track.id() == id)?;
        self.items.remove(index)
    }

    /// Mueve un track de `from` a `to` (ambos 1-based).
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), PlayerError> {
        let src = self.index_of(from)?;
        let dst = self.index_of(to)?;

        if src != dst {
            if let Some(track) = self.items.remove(src) {
                self.items.insert(dst, track);
            }
            debug!("📍 Track movido de posición {} a {}", from, to);
        }
        Ok(())
    }

    /// Mezcla la cola; el historial no se toca.
    pub fn shuffle(&mut self) {
        let mut items: Vec<_> = self.items.drain(..).collect();
        items.shuffle(&mut rand::thread_rng());
        self.items.extend(items);
        info!("🔀 Cola mezclada");
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn record_played_title(&mut self, title: String) {
        self.titles.push_back(title);
        while self.titles.len() > self.max_titles {
            self.titles.pop_front();
        }
    }

    pub fn title_log(&self) -> Vec<String> {
        self.titles.iter().cloned().collect()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::All => info!("🔁 Repetir cola activado"),
            LoopMode::Single => info!("🔂 Repetir canción activado"),
        }
    }

    /// Los primeros `limit` tracks pendientes.
    pub fn upcoming(&self, limit: usize) -> Vec<TrackRef> {
        self.items.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn has_prev(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn has_next(&self) -> bool {
        !self.items.is_empty()
    }

    /// Foto de la cola para la capa de presentación.
    pub fn snapshot(&self, limit: usize) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.as_ref().map(|track| track.view()),
            items: self.items.iter().take(limit).map(|track| track.view()).collect(),
            total_items: self.items.len(),
            loop_mode: self.loop_mode,
            total_duration: self
                .items
                .iter()
                .filter_map(|track| track.metadata().duration)
                .sum(),
        }
    }

    fn index_of(&self, position: usize) -> Result<usize, PlayerError> {
        if position == 0 || position > self.items.len() {
            return Err(PlayerError::OutOfRange {
                position,
                len: self.items.len(),
            });
        }
        Ok(position - 1)
    }
}

#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<TrackView>,
    pub items: Vec<TrackView>,
    pub total_items: usize,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

impl QueueSnapshot {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let per_page = items_per_page.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1) * per_page;
        let end = (start + per_page).min(self.items.len());
        let total_pages = self.total_items.max(1).div_ceil(per_page);

        QueuePage {
            items: if start < self.items.len() {
                self.items[start..end].to_vec()
            } else {
                Vec::new()
            },
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<TrackView>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
