// cloudpipe - terminal streaming player
// Search a catalog, pick a track, control playback from the keyboard

pub mod audio;   // fetch, decode, output device, playback handles
pub mod catalog; // track search (SoundCloud)
pub mod config;  // settings file + env overrides
pub mod player;  // the playback state machine
pub mod ui;      // console output, key events, raw mode

// Export the stuff the binary actually uses
pub use audio::{AudioPipeline, HttpFetcher, LoadError, OutputDevice, RodioBackend};
pub use catalog::{CatalogError, SoundCloudClient, Track, TrackCatalog};
pub use config::Config;
pub use player::{Outcome, PlaybackController, PlayerSettings};
