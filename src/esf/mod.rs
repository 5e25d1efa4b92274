//! ESF (Echo Sound Format) assembly: the compact opcode stream the Echo
//! sound driver replays directly, built from a driver-ready event
//! stream produced by a front end (MIDI or MML).

mod emitter;
pub(crate) mod tables;

pub use emitter::assemble;
pub(crate) use emitter::hw_channel as hw_channel_index;
