//! rc-media: sample-level MP4 reading and writing.
//!
//! - [`inspect`] enumerates the tracks of a container.
//! - [`SampleReader`] streams the samples of one track inside a time window.
//! - [`Mp4Writer`] writes samples into a new progressive MP4.
//!
//! All filesystem access goes through [`fs::FileSystem`].

pub mod fs;
pub mod inspect;
pub mod mp4;
pub mod reader;
pub mod sample;
pub mod track;
pub mod writer;

#[cfg(any(test, feature = "test-util"))]
pub mod fixture;

pub use fs::{FileSystem, StdFileSystem};
pub use inspect::{inspect, Inspection};
pub use reader::SampleReader;
pub use sample::SampleView;
pub use track::{FourCc, Track, TrackFormat};
pub use writer::{Mp4Writer, OutputTrackId};
