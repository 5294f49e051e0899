// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for hbus

use std::fmt;

/// Result type for hbus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hbus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Buffer and frame sizing
    // ========================================================================
    /// Output buffer too small for the message being written
    BufferTooSmall,

    /// Inbound frame shorter than its header requires
    ShortFrame,

    /// Frame exceeds the fixed maximum frame length
    FrameTooLarge,

    // ========================================================================
    // Port table
    // ========================================================================
    /// Port outside the valid range
    InvalidPort(u8),

    /// Port already bound to a service (conflict policy is reject)
    PortInUse(u8),

    /// Port reserved for the control plane
    PortReserved(u8),

    // ========================================================================
    // Transport
    // ========================================================================
    /// Inbound queue at capacity, frame dropped
    QueueFull,

    /// Datalink failed to move the frame
    TransportError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BufferTooSmall => write!(f, "Buffer too small"),
            Error::ShortFrame => write!(f, "Frame shorter than header"),
            Error::FrameTooLarge => write!(f, "Frame exceeds maximum length"),
            Error::InvalidPort(p) => write!(f, "Port {p} outside valid range"),
            Error::PortInUse(p) => write!(f, "Port {p} already bound"),
            Error::PortReserved(p) => write!(f, "Port {p} reserved for control plane"),
            Error::QueueFull => write!(f, "Inbound queue full"),
            Error::TransportError => write!(f, "Transport error"),
        }
    }
}

impl std::error::Error for Error {}
