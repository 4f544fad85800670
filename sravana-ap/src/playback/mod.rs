//! Playback core
//!
//! - `chapters`: time → chapter resolution
//! - `controller`: transport state machine
//! - `media`: media backends (decoded audio, virtual clock)
//! - `sleep_timer`: countdown / end-of-chapter timer
//! - `checkpoint`: periodic progress persistence
//! - `ambient_follower`: ambient sound tied to `is_playing`
//! - `session`: the `Player` and its per-track session

pub mod ambient_follower;
pub mod chapters;
pub mod checkpoint;
pub mod controller;
pub mod media;
pub mod session;
pub mod sleep_timer;
pub mod state;

pub use controller::PlaybackController;
pub use session::{AmbientStatus, Player, PlayerSession};
pub use sleep_timer::{SleepTimer, SleepTimerRequest};
pub use state::{PlaybackRate, PlaybackSnapshot};
