//! Packet framing and the send/receive path

use super::VirtualInterface;
use crate::config::{Field, MIN_MTU, Rule, ValidationError};
use crate::link::LinkBackend;
use crate::{Error, Result};
use std::fmt;
use std::io;
use std::os::fd::AsRawFd;
use tracing::trace;

/// Largest payload the one-byte length prefix can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// A packet in wire form: `[len:1][payload:len]`.
#[derive(Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    wire: Vec<u8>,
}

impl PacketBuffer {
    /// Zero-length payload; what `receive` returns when nothing is pending.
    pub fn empty() -> Self {
        Self { wire: vec![0] }
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(packet_error(payload.len(), Rule::PacketTooLarge));
        }
        let mut wire = Vec::with_capacity(payload.len() + 1);
        wire.push(payload.len() as u8);
        wire.extend_from_slice(payload);
        Ok(Self { wire })
    }

    /// Takes ownership of a framed buffer after checking its length prefix.
    pub fn from_wire(wire: Vec<u8>) -> Result<Self> {
        match wire.first() {
            Some(&len) if len as usize == wire.len() - 1 => Ok(Self { wire }),
            _ => Err(packet_error(
                wire.len().saturating_sub(1),
                Rule::LengthPrefixMismatch,
            )),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.wire[1..]
    }

    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn into_wire(self) -> Vec<u8> {
        self.wire
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.wire.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.len())
            .finish()
    }
}

fn packet_error(len: usize, rule: Rule) -> Error {
    Error::from(ValidationError::new(Field::Packet, format!("{} bytes", len), rule))
}

impl<B: LinkBackend> VirtualInterface<B> {
    /// Writes one packet to the link.
    ///
    /// The payload must hold at least a minimal IP datagram and fit the MTU.
    pub fn send(&mut self, packet: &PacketBuffer) -> Result<()> {
        let fd = match self.pool.queues() {
            Some(queues) if self.up => queues.tx.as_raw_fd(),
            _ => return Err(self.state_error("send")),
        };

        let payload = packet.payload();
        if payload.len() < MIN_MTU as usize {
            return Err(packet_error(payload.len(), Rule::PacketTooSmall));
        }
        if payload.len() > self.settings.mtu as usize {
            return Err(packet_error(payload.len(), Rule::PacketTooLarge));
        }

        let n = unsafe { libc::write(fd, payload.as_ptr() as *const libc::c_void, payload.len()) };
        if n < 0 {
            return Err(Error::os(
                "write packet",
                &self.name,
                io::Error::last_os_error(),
            ));
        }
        if n as usize != payload.len() {
            return Err(Error::ShortWrite {
                name: self.name.clone(),
                written: n as usize,
                len: payload.len(),
            });
        }

        trace!("Sent {} bytes on {}", payload.len(), self.name);
        Ok(())
    }

    /// Reads one pending packet without blocking.
    ///
    /// Returns an empty buffer when nothing is waiting.
    pub fn receive(&mut self) -> Result<PacketBuffer> {
        let fd = match self.pool.queues() {
            Some(queues) if self.up => queues.rx.as_raw_fd(),
            _ => return Err(self.state_error("receive")),
        };

        let buf = self.pool.scratch_mut();
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(PacketBuffer::empty());
            }
            return Err(Error::os("read packet", &self.name, err));
        }

        let n = n as usize;
        if n > MAX_PAYLOAD {
            return Err(Error::FrameTooLarge { len: n });
        }

        trace!("Received {} bytes on {}", n, self.name);
        PacketBuffer::from_payload(&buf[..n])
    }
}
