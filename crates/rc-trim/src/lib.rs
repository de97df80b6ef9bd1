//! rc-trim: lossless in-place trimming.
//!
//! [`Trimmer`] performs one trim synchronously: inspect the source, copy the
//! requested window into a temp file, validate it, and swap it over the
//! original. [`TrimJobs`] runs trims on blocking workers, keeps at most one
//! trim per source path, and notifies playback, the project store, and the
//! event bus.

pub mod collaborators;
pub mod jobs;
pub mod request;
pub mod trimmer;
pub mod workspace;

pub use collaborators::{NoPlayback, NoProjectStore, PlaybackSurface, ProjectStore};
pub use jobs::{JobState, TrimJob, TrimJobs};
pub use request::{Destination, TrimRequest};
pub use trimmer::{TrimOutcome, Trimmer};
pub use workspace::TrimWorkspace;
