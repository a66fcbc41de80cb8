//! Protocol-visible error codes and the internal disconnect signal.
//!
//! Three tiers of failure are modeled separately rather than as one flat
//! enum: [`ErrorCode`] is sent to clients on the wire, [`Disconnected`] unwinds a
//! worker out of request handling into the cleanup path, and fatal
//! invariant violations are not a `Result` variant at all (see
//! [`crate::fatal`]).

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// A protocol error, as sent back to the client in an `ERROR` packet.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum ErrorCode {
    FileAlreadyExists = 0,
    FileDoesNotExist = 1,
    FileAlreadyLocked = 2,
    FileIsLockedByAnotherClient = 3,
    FileIsNotOpened = 4,
    FileWasAlreadyWritten = 5,
    FileIsTooBig = 6,
    FileIsNotLocked = 7,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorCode::FileAlreadyExists => "file already exists",
            ErrorCode::FileDoesNotExist => "file does not exist",
            ErrorCode::FileAlreadyLocked => "file already locked",
            ErrorCode::FileIsLockedByAnotherClient => "file is locked by another client",
            ErrorCode::FileIsNotOpened => "file is not opened",
            ErrorCode::FileWasAlreadyWritten => "file was already written",
            ErrorCode::FileIsTooBig => "file is too big",
            ErrorCode::FileIsNotLocked => "file is not locked",
        };
        f.write_str(msg)
    }
}

/// Sentinel propagated internally when a client's fd has gone away
/// (clean close or reset) while a worker was reading or writing. Never sent
/// on the wire; it unwinds the request handler into the disconnect/cleanup
/// path.
#[derive(Debug)]
pub struct Disconnected;

impl fmt::Display for Disconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("client disconnected")
    }
}

impl std::error::Error for Disconnected {}

impl From<std::io::Error> for Disconnected {
    fn from(_: std::io::Error) -> Self {
        Disconnected
    }
}

/// Log a fatal internal-invariant violation and abort the process.
///
/// Used for conditions considered unrecoverable: allocation
/// failure, lock-primitive failure, an unexpected opcode reaching a point
/// the codec should have rejected, or corruption of storage invariants.
/// The server holds no durable state worth protecting through a partial
/// failure, so there is no sensible recovery path.
#[cold]
#[track_caller]
pub fn fatal(context: &str) -> ! {
    log::error!("fatal: {context}");
    std::process::abort()
}
