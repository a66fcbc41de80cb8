//! The wire codec and its optional RLE compression.

pub mod frame;
pub mod opcode;
pub mod rle;

pub use frame::{read_packet, write_packet, Packet};
pub use opcode::{Opcode, OpenFlags};
