//! # Audio Module
//!
//! Per-guild playback core for Encore.
//!
//! This module owns everything that decides *what* plays and *when*:
//! - Track records and their lazy resolution state
//! - Queue, history and loop modes
//! - Background prefetching of upcoming tracks
//! - The session state machine and its inactivity timer
//!
//! ## Architecture
//!
//! ### [`session`] - Session Controller
//! - One [`SessionController`] per connected guild
//! - Serializes navigation and end-of-track handling
//! - Emits [`SessionEvent`]s for the presentation layer
//!
//! ### [`queue`] - Queue Management
//! - Upcoming tracks, history and the current slot
//! - Loop modes and the bounded log of played titles
//!
//! ### [`prefetch`] - Prefetcher
//! - Resolves the next few tracks before they are needed
//! - Deduplicates concurrent resolutions of the same track
//!
//! ### [`transport`] - Voice Transport
//! - The seam between the session and the actual voice connection
//! - Implemented over songbird in [`crate::bot::voice`]
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use encore::audio::{SessionManager, SessionSettings};
//! # use std::sync::Arc;
//! # async fn example(
//! #     resolver: Arc<dyn encore::sources::TrackResolver>,
//! #     connector: &dyn encore::audio::transport::Connector,
//! # ) -> anyhow::Result<()> {
//! let manager = SessionManager::new(resolver);
//! let session = manager
//!     .connect(123456789, 987654321, SessionSettings::default(), connector)
//!     .await?;
//!
//! session.submit("never gonna give you up", None).await;
//! session.skip().await;
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod prefetch;
pub mod queue;
pub mod session;
pub mod timer;
pub mod track;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::SessionManager;
pub use queue::{LoopMode, QueueSnapshot};
pub use session::{PauseState, SessionController, SessionEvent, SessionSettings, SessionState, SubmitOutcome};
pub use track::{Track, TrackRef, TrackView};
