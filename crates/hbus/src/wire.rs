// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire formats
//!
//! Two fixed layouts, no implicit padding, explicit little-endian:
//! - routing header: dest(1) + src(1) + port(1) + len(1), payload follows
//! - mailbox message: command(1) + value(4)
//!
//! Raw buffers are never aliased as typed structs; everything goes through
//! explicit encode/decode.

use crate::config::{FRAME_HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::error::{Error, Result};

// ============================================================================
// ROUTING HEADER
// ============================================================================

/// Frame routing header (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Destination device address
    pub dest: u8,
    /// Source device address
    pub src: u8,
    /// Destination port (service slot)
    pub port: u8,
    /// Payload length in bytes
    pub len: u8,
}

impl FrameHeader {
    /// Size of the routing header in bytes
    pub const SIZE: usize = FRAME_HEADER_LEN;

    /// Create a new routing header
    pub const fn new(dest: u8, src: u8, port: u8, len: u8) -> Self {
        Self {
            dest,
            src,
            port,
            len,
        }
    }

    /// Total frame length described by this header
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        Self::SIZE + self.len as usize
    }

    /// Encode header to bytes (4 bytes)
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall);
        }

        buf[0] = self.dest;
        buf[1] = self.src;
        buf[2] = self.port;
        buf[3] = self.len;

        Ok(Self::SIZE)
    }

    /// Decode header from bytes
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::ShortFrame);
        }

        Ok(Self {
            dest: buf[0],
            src: buf[1],
            port: buf[2],
            len: buf[3],
        })
    }
}

/// Assemble a complete frame (header + payload) into `buf`.
///
/// Returns the total frame length written.
pub fn build_frame(dest: u8, src: u8, port: u8, payload: &[u8], buf: &mut [u8]) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::FrameTooLarge);
    }
    let total = FrameHeader::SIZE + payload.len();
    if buf.len() < total {
        return Err(Error::BufferTooSmall);
    }

    let header = FrameHeader::new(dest, src, port, payload.len() as u8);
    header.encode(buf)?;
    buf[FrameHeader::SIZE..total].copy_from_slice(payload);

    Ok(total)
}

// ============================================================================
// MAILBOX MESSAGE
// ============================================================================

/// Mailbox command (1 byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MailboxCommand {
    /// Routine resynchronization carrying the current value (0x00)
    SendValue = 0x00,
    /// Acknowledgment carrying the acknowledged value (0x01)
    AckValue = 0x01,
    /// Fresh local change notification (0x02)
    SendValueChange = 0x02,
}

impl MailboxCommand {
    /// Parse from byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::SendValue),
            0x01 => Some(Self::AckValue),
            0x02 => Some(Self::SendValueChange),
            _ => None,
        }
    }
}

// Compile-time assertion to ensure enum discriminants are correct
const _: () = {
    assert!(
        MailboxCommand::SendValue as u8 == 0x00,
        "SEND_VALUE command must be 0x00"
    );
    assert!(
        MailboxCommand::AckValue as u8 == 0x01,
        "ACK_VALUE command must be 0x01"
    );
    assert!(
        MailboxCommand::SendValueChange as u8 == 0x02,
        "SEND_VALUE_CHANGE command must be 0x02"
    );
};

/// Scalar mailbox wire message (5 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxMsg {
    /// Command byte
    pub command: MailboxCommand,
    /// Replicated 32-bit value
    pub value: u32,
}

impl MailboxMsg {
    /// Size of a mailbox message in bytes
    pub const SIZE: usize = 5;

    /// Create a new mailbox message
    pub const fn new(command: MailboxCommand, value: u32) -> Self {
        Self { command, value }
    }

    /// Encode to bytes (5 bytes, value little-endian)
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall);
        }

        buf[0] = self.command as u8;
        buf[1..5].copy_from_slice(&self.value.to_le_bytes());

        Ok(Self::SIZE)
    }

    /// Decode from bytes. `None` for a short buffer or an unknown command
    /// byte (protocol anomaly at the caller's discretion, not an error).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }

        let command = MailboxCommand::from_u8(buf[0])?;
        let value = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);

        Some(Self { command, value })
    }
}

// ============================================================================
// TESTS
// ============================================================================
