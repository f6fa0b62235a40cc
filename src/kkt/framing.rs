//! Wire framing for the two transport variants.
//!
//! Serial request: `STX | LEN_LE(2) | PAYLOAD | ETX | LRC`, LRC is the XOR of
//! every byte from STX to ETX inclusive.
//!
//! Serial response: `PAYLOAD | ETX | LRC`. There is no STX and no length, so
//! the reader scans byte by byte for ETX. The LRC is recomputed over
//! `PAYLOAD | ETX`. The device documentation does not pin this convention
//! down, so a mismatch is only logged unless strict mode is requested.
//!
//! TCP: no envelope in either direction. A response is whatever one bounded
//! read returns.

use crate::kkt::error::{KktError, Result};
use std::io::{self, Read};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// Upper bound for a serial response before ETX is seen.
pub const MAX_SERIAL_RESPONSE: usize = 64 * 1024;

/// Buffer size for the single TCP read.
pub const TCP_READ_BUFFER: usize = 4096;

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// Longitudinal redundancy check: XOR fold of all bytes.
pub fn lrc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

// ---------------------------------------------------------------------------
// Serial request
// ---------------------------------------------------------------------------

/// Build a serial request packet around an already encoded payload.
pub fn wrap_serial_request(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| {
        KktError::Encoding(format!(
            "command of {} bytes exceeds the {}-byte frame limit",
            payload.len(),
            u16::MAX
        ))
    })?;
    let mut packet = Vec::with_capacity(payload.len() + 5);
    packet.push(STX);
    packet.extend_from_slice(&len.to_le_bytes());
    packet.extend_from_slice(payload);
    packet.push(ETX);
    let checksum = lrc(&packet);
    packet.push(checksum);
    Ok(packet)
}

/// Parse a serial request packet back into its payload.
///
/// This is the device side of the exchange; emulators and tests use it to
/// check what the host put on the wire.
pub fn unwrap_serial_request(packet: &[u8]) -> Result<Vec<u8>> {
    if packet.len() < 5 {
        return Err(invalid_frame(format!(
            "request packet too short ({} bytes)",
            packet.len()
        )));
    }
    if packet[0] != STX {
        return Err(invalid_frame(format!(
            "request does not start with STX (0x{:02X})",
            packet[0]
        )));
    }
    let len = u16::from_le_bytes([packet[1], packet[2]]) as usize;
    if packet.len() != len + 5 {
        return Err(invalid_frame(format!(
            "declared length {len} does not match packet of {} bytes",
            packet.len()
        )));
    }
    let etx_at = 3 + len;
    if packet[etx_at] != ETX {
        return Err(invalid_frame("ETX missing after payload".into()));
    }
    let expected = lrc(&packet[..=etx_at]);
    let received = packet[etx_at + 1];
    if expected != received {
        return Err(KktError::Checksum { expected, received });
    }
    Ok(packet[3..etx_at].to_vec())
}

// ---------------------------------------------------------------------------
// Serial response
// ---------------------------------------------------------------------------

/// Build a serial response frame (`PAYLOAD | ETX | LRC`).
pub fn wrap_serial_response(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.extend_from_slice(payload);
    frame.push(ETX);
    let checksum = lrc(&frame);
    frame.push(checksum);
    frame
}

/// Read one serial response and return its payload.
///
/// Reads a byte at a time until ETX, then exactly one checksum byte. Each
/// read is bounded by the reader's own timeout, so a device that never sends
/// ETX surfaces as a `TimedOut` I/O error.
pub fn read_serial_response<R: Read + ?Sized>(reader: &mut R, strict_checksum: bool) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(KktError::io(
                    "serial read",
                    io::Error::new(io::ErrorKind::UnexpectedEof, "channel closed before ETX"),
                ))
            }
            Ok(_) => {
                frame.push(byte[0]);
                if byte[0] == ETX {
                    break;
                }
                if frame.len() >= MAX_SERIAL_RESPONSE {
                    return Err(KktError::io(
                        "serial read",
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("no ETX within {MAX_SERIAL_RESPONSE} bytes"),
                        ),
                    ));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(KktError::io("serial read", e)),
        }
    }

    let mut checksum = [0u8; 1];
    reader
        .read_exact(&mut checksum)
        .map_err(|e| KktError::io("serial read checksum", e))?;

    let expected = lrc(&frame);
    let received = checksum[0];
    if expected != received {
        if strict_checksum {
            return Err(KktError::Checksum { expected, received });
        }
        warn!(
            "Response LRC mismatch (expected 0x{expected:02X}, received 0x{received:02X}), accepting payload"
        );
    }

    frame.pop(); // ETX
    debug!("Serial frame payload: {} bytes", frame.len());
    Ok(frame)
}

// ---------------------------------------------------------------------------
// TCP response
// ---------------------------------------------------------------------------

/// Perform the single bounded TCP read. An orderly close by the peer before
/// any byte arrives is an error.
pub fn read_tcp_response<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; TCP_READ_BUFFER];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                return Err(KktError::io(
                    "tcp read",
                    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed by peer"),
                ))
            }
            Ok(n) => {
                buf.truncate(n);
                return Ok(buf);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(KktError::io("tcp read", e)),
        }
    }
}

fn invalid_frame(msg: String) -> KktError {
    KktError::io("frame", io::Error::new(io::ErrorKind::InvalidData, msg))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
