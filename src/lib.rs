//! echotools: converters between MIDI/TFI/VGI/PNG/MML source formats
//! and the Echo Mega Drive sound driver's ESF/EIF/EWF/VGM binary
//! formats, plus the SLZ and UFTC codecs Echo data relies on.
//!
//! Each format lives in its own module and exposes plain `parse`/`write`
//! or `compress`/`decompress` functions over [`error::Result`]; nothing
//! here holds a file handle open past the call that needed it.

#![allow(dead_code)]

#[macro_use]
mod error;
#[macro_use]
mod clamp;

mod byte_iter;
mod vlq;

pub mod blob;
pub mod cli;
pub mod esf;
pub mod event;
pub mod ewf;
pub mod instruments;
pub mod midi;
pub mod mml;
pub mod rom;
pub mod slz;
pub mod tiles;
pub mod uftc;
pub mod vgm;

pub use blob::Blob;
pub use error::{Error, Result};
pub use event::{Channel, Event, EventKind, FmChannel, Pan, PsgChannel, Volume};
