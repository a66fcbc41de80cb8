//! The closed opcode set, a dense 1-byte tag.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum Opcode {
    /// Never legally sent on the wire; a zeroed/corrupt frame header
    /// decodes to this rather than aliasing `Comp`.
    Nil = 0,
    Comp = 1,
    Ack = 2,
    Error = 3,
    CloseConn = 4,
    Data = 5,
    FileP = 6,
    FileSequence = 7,
    OpenFile = 8,
    CloseFile = 9,
    WriteFile = 10,
    ReadFile = 11,
    ReadNFiles = 12,
    AppendFile = 13,
    LockFile = 14,
    UnlockFile = 15,
    RemoveFile = 16,
}

bitflags::bitflags! {
    /// `OPEN_FILE` flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u8 {
        const CREATE = 0x01;
        const LOCK = 0x02;
    }
}
