//! Packet framing: length-prefixed binary packets over a
//! byte stream, with no short reads or writes. A partial read against a
//! closed socket surfaces as [`Disconnected`]; any other partial is
//! retried internally until complete.

use std::io::{self, Read, Write};

use crate::error::{fatal, Disconnected};

use super::opcode::{Opcode, OpenFlags};
use super::rle::{decode as rle_decode, encode as rle_encode};

/// A decoded packet, covering both client requests and server responses —
/// the opcode set is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Comp,
    Ack,
    Error(crate::error::ErrorCode),
    CloseConn,
    Data(Vec<u8>),
    FileP { name: Vec<u8>, data: Vec<u8> },
    FileSequence(u64),
    OpenFile { name: Vec<u8>, flags: OpenFlags },
    CloseFile(Vec<u8>),
    WriteFile { name: Vec<u8>, data: Vec<u8> },
    ReadFile(Vec<u8>),
    ReadNFiles(u64),
    AppendFile { name: Vec<u8>, data: Vec<u8> },
    LockFile(Vec<u8>),
    UnlockFile(Vec<u8>),
    RemoveFile(Vec<u8>),
}

/// Read exactly `buf.len()` bytes, or report the peer as disconnected.
/// A zero-byte read at a message boundary is a clean close; a zero-byte
/// read mid-message (peer went away while we were framing) is treated
/// identically.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), Disconnected> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(Disconnected),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(Disconnected),
        }
    }
    Ok(())
}

fn write_full<W: Write>(writer: &mut W, buf: &[u8]) -> Result<(), Disconnected> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => return Err(Disconnected),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(Disconnected),
        }
    }
    Ok(())
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, Disconnected> {
    let mut buf = [0u8; 1];
    read_full(reader, &mut buf)?;
    Ok(buf[0])
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, Disconnected> {
    let mut buf = [0u8; 8];
    read_full(reader, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<(), Disconnected> {
    write_full(writer, &[value])
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), Disconnected> {
    write_full(writer, &value.to_le_bytes())
}

fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, Disconnected> {
    let len = read_u64(reader)? as usize;
    let mut buf = vec![0u8; len];
    read_full(reader, &mut buf)?;
    Ok(buf)
}

fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), Disconnected> {
    write_u64(writer, bytes.len() as u64)?;
    write_full(writer, bytes)
}

/// `0` = raw bytes follow; `1` = run-length encoded bytes follow. Always
/// present ahead of a `DATA`/`FILE_P` payload, independent of whether the
/// sender's `enable_compression` config is on — a disabled-compression
/// sender always writes flag `0`, so the framing never depends on the
/// reader knowing the sender's configuration.
const PAYLOAD_RAW: u8 = 0;
const PAYLOAD_RLE: u8 = 1;

fn read_payload<R: Read>(reader: &mut R) -> Result<Vec<u8>, Disconnected> {
    let flag = read_u8(reader)?;
    let bytes = read_bytes(reader)?;
    match flag {
        PAYLOAD_RAW => Ok(bytes),
        PAYLOAD_RLE => Ok(rle_decode(&bytes)),
        _ => fatal("unrecognized payload compression flag"),
    }
}

fn write_payload<W: Write>(
    writer: &mut W,
    payload: &[u8],
    compression: bool,
) -> Result<(), Disconnected> {
    if compression {
        if let Some(encoded) = rle_encode(payload) {
            write_u8(writer, PAYLOAD_RLE)?;
            return write_bytes(writer, &encoded);
        }
    }
    write_u8(writer, PAYLOAD_RAW)?;
    write_bytes(writer, payload)
}

/// Read exactly one packet. `compression` only affects nothing on the
/// read side (payload framing is self-describing); it exists so the call
/// site shape matches [`write_packet`].
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Packet, Disconnected> {
    let op = read_u8(reader)?;
    let opcode = Opcode::try_from(op).unwrap_or_else(|_| fatal("unrecognized opcode on wire"));
    match opcode {
        Opcode::Nil => fatal("NIL opcode received on wire"),
        Opcode::Comp => Ok(Packet::Comp),
        Opcode::Ack => Ok(Packet::Ack),
        Opcode::Error => {
            let code = read_u8(reader)?;
            let code = crate::error::ErrorCode::try_from(code)
                .unwrap_or_else(|_| fatal("unrecognized error code on wire"));
            Ok(Packet::Error(code))
        }
        Opcode::CloseConn => Ok(Packet::CloseConn),
        Opcode::Data => Ok(Packet::Data(read_payload(reader)?)),
        Opcode::FileP => {
            let name = read_bytes(reader)?;
            let data = read_payload(reader)?;
            Ok(Packet::FileP { name, data })
        }
        Opcode::FileSequence => Ok(Packet::FileSequence(read_u64(reader)?)),
        Opcode::OpenFile => {
            let name = read_bytes(reader)?;
            let flags = read_u8(reader)?;
            let flags = OpenFlags::from_bits_truncate(flags);
            Ok(Packet::OpenFile { name, flags })
        }
        Opcode::CloseFile => Ok(Packet::CloseFile(read_bytes(reader)?)),
        Opcode::WriteFile => {
            let name = read_bytes(reader)?;
            let data = read_payload(reader)?;
            Ok(Packet::WriteFile { name, data })
        }
        Opcode::ReadFile => Ok(Packet::ReadFile(read_bytes(reader)?)),
        Opcode::ReadNFiles => Ok(Packet::ReadNFiles(read_u64(reader)?)),
        Opcode::AppendFile => {
            let name = read_bytes(reader)?;
            let data = read_payload(reader)?;
            Ok(Packet::AppendFile { name, data })
        }
        Opcode::LockFile => Ok(Packet::LockFile(read_bytes(reader)?)),
        Opcode::UnlockFile => Ok(Packet::UnlockFile(read_bytes(reader)?)),
        Opcode::RemoveFile => Ok(Packet::RemoveFile(read_bytes(reader)?)),
    }
}

/// Write exactly one packet. `compression` gates whether payloads
/// (`DATA`/`FILE_P`) are opportunistically RLE-encoded.
pub fn write_packet<W: Write>(
    writer: &mut W,
    packet: &Packet,
    compression: bool,
) -> Result<(), Disconnected> {
    match packet {
        Packet::Comp => write_u8(writer, Opcode::Comp.into()),
        Packet::Ack => write_u8(writer, Opcode::Ack.into()),
        Packet::Error(code) => {
            write_u8(writer, Opcode::Error.into())?;
            write_u8(writer, (*code).into())
        }
        Packet::CloseConn => write_u8(writer, Opcode::CloseConn.into()),
        Packet::Data(bytes) => {
            write_u8(writer, Opcode::Data.into())?;
            write_payload(writer, bytes, compression)
        }
        Packet::FileP { name, data } => {
            write_u8(writer, Opcode::FileP.into())?;
            write_bytes(writer, name)?;
            write_payload(writer, data, compression)
        }
        Packet::FileSequence(count) => {
            write_u8(writer, Opcode::FileSequence.into())?;
            write_u64(writer, *count)
        }
        Packet::OpenFile { name, flags } => {
            write_u8(writer, Opcode::OpenFile.into())?;
            write_bytes(writer, name)?;
            write_u8(writer, flags.bits())
        }
        Packet::CloseFile(name) => {
            write_u8(writer, Opcode::CloseFile.into())?;
            write_bytes(writer, name)
        }
        Packet::WriteFile { name, data } => {
            write_u8(writer, Opcode::WriteFile.into())?;
            write_bytes(writer, name)?;
            write_payload(writer, data, compression)
        }
        Packet::ReadFile(name) => {
            write_u8(writer, Opcode::ReadFile.into())?;
            write_bytes(writer, name)
        }
        Packet::ReadNFiles(count) => {
            write_u8(writer, Opcode::ReadNFiles.into())?;
            write_u64(writer, *count)
        }
        Packet::AppendFile { name, data } => {
            write_u8(writer, Opcode::AppendFile.into())?;
            write_bytes(writer, name)?;
            write_payload(writer, data, compression)
        }
        Packet::LockFile(name) => {
            write_u8(writer, Opcode::LockFile.into())?;
            write_bytes(writer, name)
        }
        Packet::UnlockFile(name) => {
            write_u8(writer, Opcode::UnlockFile.into())?;
            write_bytes(writer, name)
        }
        Packet::RemoveFile(name) => {
            write_u8(writer, Opcode::RemoveFile.into())?;
            write_bytes(writer, name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(packet: Packet, compression: bool) {
        let mut buf = Vec::new();
        write_packet(&mut buf, &packet, compression).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = read_packet(&mut cursor).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn round_trips_every_shape() {
        round_trip(Packet::Comp, false);
        round_trip(Packet::Ack, false);
        round_trip(Packet::Error(crate::error::ErrorCode::FileIsTooBig), false);
        round_trip(Packet::CloseConn, false);
        round_trip(Packet::Data(vec![1, 2, 3]), false);
        round_trip(
            Packet::FileP {
                name: b"a".to_vec(),
                data: vec![9; 10],
            },
            false,
        );
        round_trip(Packet::FileSequence(3), false);
        round_trip(
            Packet::OpenFile {
                name: b"a".to_vec(),
                flags: OpenFlags::CREATE | OpenFlags::LOCK,
            },
            false,
        );
        round_trip(Packet::CloseFile(b"a".to_vec()), false);
        round_trip(
            Packet::WriteFile {
                name: b"a".to_vec(),
                data: b"hello".to_vec(),
            },
            false,
        );
        round_trip(Packet::ReadFile(b"a".to_vec()), false);
        round_trip(Packet::ReadNFiles(0), false);
        round_trip(
            Packet::AppendFile {
                name: b"a".to_vec(),
                data: b"more".to_vec(),
            },
            false,
        );
        round_trip(Packet::LockFile(b"a".to_vec()), false);
        round_trip(Packet::UnlockFile(b"a".to_vec()), false);
        round_trip(Packet::RemoveFile(b"a".to_vec()), false);
    }

    #[test]
    fn round_trips_with_compression_on_repetitive_payload() {
        round_trip(Packet::Data(vec![b'Z'; 500]), true);
        round_trip(Packet::Data(vec![1, 2, 3, 4, 5]), true);
    }

    #[test]
    fn clean_close_before_any_bytes_is_disconnect() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_packet(&mut cursor).is_err());
    }

    #[test]
    fn partial_frame_then_close_is_disconnect() {
        // opcode + half of a length prefix, then EOF
        let mut cursor = Cursor::new(vec![Opcode::ReadFile.into(), 0, 0, 0]);
        assert!(read_packet(&mut cursor).is_err());
    }
}
