//! Binary datagram codec for the client protocol.
//!
//! Every datagram is a one-byte message type followed by fixed-width
//! little-endian fields. There is no framing beyond the datagram itself:
//! a message is exactly as long as its fields, and trailing bytes are
//! rejected.
//!
//! The same `CheckVersion` type byte serves two purposes. On the handshake
//! endpoint a client sends its version and the body kind it wants
//! ([`ClientMessage::Handshake`]); on a dedicated endpoint it sends its
//! version and the session token it was given
//! ([`ClientMessage::CheckVersion`]). The two are told apart by length.

use thiserror::Error;

use crate::color::Rgba;
use crate::geometry::Vec3;
use crate::ids::SessionToken;
use crate::kinds::ObserverKind;

/// Protocol version spoken with observer clients.
pub const CLIENT_PROTOCOL_VERSION: u64 = 1;

/// Protocol version reported on the admin channel.
pub const ADMIN_PROTOCOL_VERSION: u64 = 1;

/// Largest number of worker timings a statistics response can carry.
pub const MAX_REPORTED_WORKERS: usize = 255;

/// Wire type bytes for client-to-server messages.
pub mod client_type {
    /// Version check / handshake.
    pub const CHECK_VERSION: u8 = 1;
    /// Request pending photons and the current time.
    pub const GET_STATE: u8 = 2;
    /// Request position and orientation details.
    pub const GET_STATE_EXT: u8 = 3;
    /// Accumulate forward movement.
    pub const MOVE_FORWARD: u8 = 4;
    /// Accumulate backward movement.
    pub const MOVE_BACKWARD: u8 = 5;
    /// Accumulate leftward rotation.
    pub const ROTATE_LEFT: u8 = 6;
    /// Accumulate rightward rotation.
    pub const ROTATE_RIGHT: u8 = 7;
    /// Accumulate upward rotation.
    pub const ROTATE_UP: u8 = 8;
    /// Accumulate downward rotation.
    pub const ROTATE_DOWN: u8 = 9;
    /// Request server statistics.
    pub const GET_STATISTICS: u8 = 10;
}

/// Wire type bytes for server-to-client messages.
pub mod server_type {
    /// Answer to a version check or handshake.
    pub const CHECK_VERSION_RESPONSE: u8 = 101;
    /// Current time, sent after the photons for a `GetState`.
    pub const GET_STATE_RESPONSE: u8 = 102;
    /// One received photon.
    pub const SEND_PHOTON: u8 = 103;
    /// Position and orientation details.
    pub const GET_STATE_EXT_RESPONSE: u8 = 104;
    /// Server statistics.
    pub const GET_STATISTICS_RESPONSE: u8 = 105;
    /// The endpoint is bound to another client.
    pub const SOCKET_BUSY: u8 = 106;
    /// Position broadcast to the admin observer.
    pub const OBSERVER_POSITION: u8 = 107;
}

/// Errors produced while decoding a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The datagram had no bytes.
    #[error("empty datagram")]
    Empty,

    /// The leading type byte is not a known message.
    #[error("unknown message type {type_byte}")]
    UnknownType {
        /// The offending type byte.
        type_byte: u8,
    },

    /// The datagram length does not match the message layout.
    #[error("message type {type_byte} has length {actual}, expected {expected}")]
    BadLength {
        /// Message type byte.
        type_byte: u8,
        /// Length required by the layout.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// The datagram ended before all fields were read.
    #[error("datagram truncated while reading message type {type_byte}")]
    Truncated {
        /// Message type byte.
        type_byte: u8,
    },

    /// Bytes were left over after the last field.
    #[error("message type {type_byte} has {extra} trailing bytes")]
    TrailingBytes {
        /// Message type byte.
        type_byte: u8,
        /// Number of unread bytes.
        extra: usize,
    },

    /// The handshake named an unknown observer body kind.
    #[error("unknown observer kind {byte}")]
    UnknownObserverKind {
        /// The offending byte.
        byte: u8,
    },

    /// The client speaks another protocol version.
    #[error("protocol version mismatch: server {expected}, client {actual}")]
    VersionMismatch {
        /// Version spoken by the server.
        expected: u64,
        /// Version sent by the client.
        actual: u64,
    },
}

/// A message sent by an observer client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Request a new observer (handshake endpoint only).
    Handshake {
        /// Protocol version spoken by the client.
        client_version: u64,
        /// Requested body kind.
        observer_kind: ObserverKind,
    },
    /// Re-check the version of an established session.
    CheckVersion {
        /// Protocol version spoken by the client.
        client_version: u64,
        /// Token the client was given at handshake.
        observer_id: SessionToken,
    },
    /// Drain received photons and report the time.
    GetState,
    /// Report position and orientation details.
    GetStateExt,
    /// Add to the movement accumulator.
    MoveForward(u8),
    /// Subtract from the movement accumulator.
    MoveBackward(u8),
    /// Subtract from the longitude accumulator.
    RotateLeft(u8),
    /// Add to the longitude accumulator.
    RotateRight(u8),
    /// Add to the latitude accumulator.
    RotateUp(u8),
    /// Subtract from the latitude accumulator.
    RotateDown(u8),
    /// Report server statistics.
    GetStatistics,
}

impl ClientMessage {
    /// The leading type byte; also the key for per-tick deduplication.
    pub const fn type_byte(&self) -> u8 {
        match self {
            Self::Handshake { .. } | Self::CheckVersion { .. } => client_type::CHECK_VERSION,
            Self::GetState => client_type::GET_STATE,
            Self::GetStateExt => client_type::GET_STATE_EXT,
            Self::MoveForward(_) => client_type::MOVE_FORWARD,
            Self::MoveBackward(_) => client_type::MOVE_BACKWARD,
            Self::RotateLeft(_) => client_type::ROTATE_LEFT,
            Self::RotateRight(_) => client_type::ROTATE_RIGHT,
            Self::RotateUp(_) => client_type::ROTATE_UP,
            Self::RotateDown(_) => client_type::ROTATE_DOWN,
            Self::GetStatistics => client_type::GET_STATISTICS,
        }
    }

    /// Encode into a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(self.type_byte());
        match *self {
            Self::Handshake {
                client_version,
                observer_kind,
            } => {
                w.u64(client_version);
                w.u8(observer_kind.as_byte());
            }
            Self::CheckVersion {
                client_version,
                observer_id,
            } => {
                w.u64(client_version);
                w.u64(observer_id.0);
            }
            Self::MoveForward(v)
            | Self::MoveBackward(v)
            | Self::RotateLeft(v)
            | Self::RotateRight(v)
            | Self::RotateUp(v)
            | Self::RotateDown(v) => w.u8(v),
            Self::GetState | Self::GetStateExt | Self::GetStatistics => {}
        }
        w.finish()
    }

    /// Decode a datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (&type_byte, body) = bytes.split_first().ok_or(ProtocolError::Empty)?;
        let mut r = Reader::new(type_byte, body);
        let message = match type_byte {
            client_type::CHECK_VERSION => match body.len() {
                9 => {
                    let client_version = r.u64()?;
                    let byte = r.u8()?;
                    let observer_kind = ObserverKind::from_byte(byte)
                        .ok_or(ProtocolError::UnknownObserverKind { byte })?;
                    Self::Handshake {
                        client_version,
                        observer_kind,
                    }
                }
                16 => Self::CheckVersion {
                    client_version: r.u64()?,
                    observer_id: SessionToken(r.u64()?),
                },
                other => {
                    return Err(ProtocolError::BadLength {
                        type_byte,
                        expected: 17,
                        actual: other.saturating_add(1),
                    });
                }
            },
            client_type::GET_STATE => Self::GetState,
            client_type::GET_STATE_EXT => Self::GetStateExt,
            client_type::MOVE_FORWARD => Self::MoveForward(r.u8()?),
            client_type::MOVE_BACKWARD => Self::MoveBackward(r.u8()?),
            client_type::ROTATE_LEFT => Self::RotateLeft(r.u8()?),
            client_type::ROTATE_RIGHT => Self::RotateRight(r.u8()?),
            client_type::ROTATE_UP => Self::RotateUp(r.u8()?),
            client_type::ROTATE_DOWN => Self::RotateDown(r.u8()?),
            client_type::GET_STATISTICS => Self::GetStatistics,
            _ => return Err(ProtocolError::UnknownType { type_byte }),
        };
        r.finish()?;
        Ok(message)
    }
}

/// A message sent by the server to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Answer to a handshake or version check.
    CheckVersionResponse {
        /// Protocol version spoken by the server.
        server_version: u64,
        /// Assigned session token, or [`SessionToken::REJECTED`].
        observer_id: SessionToken,
    },
    /// Current time; terminates a `GetState` reply.
    GetStateResponse {
        /// Global clock value.
        time: u64,
    },
    /// One photon that reached the observer's eye.
    SendPhoton {
        /// Photon color; alpha is the remaining energy.
        color: Rgba,
        /// Eye pixel column.
        pixel_x: u8,
        /// Eye pixel row.
        pixel_y: u8,
    },
    /// Position and orientation details.
    GetStateExtResponse {
        /// Latitude in degrees.
        latitude: i16,
        /// Longitude in degrees.
        longitude: i16,
        /// Current position.
        position: Vec3,
        /// Movement accumulator value.
        moving_progress: u8,
        /// Number of crumb clusters eaten.
        eaten_crumbs: u32,
        /// Minimum corner of the last eaten cluster.
        last_eaten_crumb: Vec3,
    },
    /// Server statistics.
    GetStatisticsResponse {
        /// Ticks per second over the last statistics window.
        fps: u64,
        /// Average driver time per tick in nanoseconds.
        driver_tick_ns: u64,
        /// Average time per tick for each worker in nanoseconds.
        worker_tick_ns: Vec<u64>,
        /// `GetState` calls per tick, times 1000.
        client_server_ratio: u32,
        /// Skipped duplicates per honored call, times 1000.
        server_client_ratio: u32,
    },
    /// The endpoint already belongs to another client.
    SocketBusy,
    /// An observer moved or turned (admin broadcast).
    ObserverPosition {
        /// Session token of the observer.
        observer_id: SessionToken,
        /// Current position.
        position: Vec3,
        /// Latitude in degrees.
        latitude: i16,
        /// Longitude in degrees.
        longitude: i16,
    },
}

impl ServerMessage {
    /// The leading type byte.
    pub const fn type_byte(&self) -> u8 {
        match self {
            Self::CheckVersionResponse { .. } => server_type::CHECK_VERSION_RESPONSE,
            Self::GetStateResponse { .. } => server_type::GET_STATE_RESPONSE,
            Self::SendPhoton { .. } => server_type::SEND_PHOTON,
            Self::GetStateExtResponse { .. } => server_type::GET_STATE_EXT_RESPONSE,
            Self::GetStatisticsResponse { .. } => server_type::GET_STATISTICS_RESPONSE,
            Self::SocketBusy => server_type::SOCKET_BUSY,
            Self::ObserverPosition { .. } => server_type::OBSERVER_POSITION,
        }
    }

    /// Encode into a datagram.
    ///
    /// Worker timings beyond [`MAX_REPORTED_WORKERS`] are not sent.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(self.type_byte());
        match self {
            Self::CheckVersionResponse {
                server_version,
                observer_id,
            } => {
                w.u64(*server_version);
                w.u64(observer_id.0);
            }
            Self::GetStateResponse { time } => w.u64(*time),
            Self::SendPhoton {
                color,
                pixel_x,
                pixel_y,
            } => {
                w.u8(color.r);
                w.u8(color.g);
                w.u8(color.b);
                w.u8(color.a);
                w.u8(*pixel_x);
                w.u8(*pixel_y);
            }
            Self::GetStateExtResponse {
                latitude,
                longitude,
                position,
                moving_progress,
                eaten_crumbs,
                last_eaten_crumb,
            } => {
                w.i16(*latitude);
                w.i16(*longitude);
                w.vec3(*position);
                w.u8(*moving_progress);
                w.u32(*eaten_crumbs);
                w.vec3(*last_eaten_crumb);
            }
            Self::GetStatisticsResponse {
                fps,
                driver_tick_ns,
                worker_tick_ns,
                client_server_ratio,
                server_client_ratio,
            } => {
                w.u64(*fps);
                w.u64(*driver_tick_ns);
                let reported = worker_tick_ns.iter().take(MAX_REPORTED_WORKERS);
                w.u8(u8::try_from(reported.len()).unwrap_or(u8::MAX));
                for ns in reported {
                    w.u64(*ns);
                }
                w.u32(*client_server_ratio);
                w.u32(*server_client_ratio);
            }
            Self::SocketBusy => {}
            Self::ObserverPosition {
                observer_id,
                position,
                latitude,
                longitude,
            } => {
                w.u64(observer_id.0);
                w.vec3(*position);
                w.i16(*latitude);
                w.i16(*longitude);
            }
        }
        w.finish()
    }

    /// Decode a datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (&type_byte, body) = bytes.split_first().ok_or(ProtocolError::Empty)?;
        let mut r = Reader::new(type_byte, body);
        let message = match type_byte {
            server_type::CHECK_VERSION_RESPONSE => Self::CheckVersionResponse {
                server_version: r.u64()?,
                observer_id: SessionToken(r.u64()?),
            },
            server_type::GET_STATE_RESPONSE => Self::GetStateResponse { time: r.u64()? },
            server_type::SEND_PHOTON => {
                let color = Rgba::new(r.u8()?, r.u8()?, r.u8()?, r.u8()?);
                Self::SendPhoton {
                    color,
                    pixel_x: r.u8()?,
                    pixel_y: r.u8()?,
                }
            }
            server_type::GET_STATE_EXT_RESPONSE => Self::GetStateExtResponse {
                latitude: r.i16()?,
                longitude: r.i16()?,
                position: r.vec3()?,
                moving_progress: r.u8()?,
                eaten_crumbs: r.u32()?,
                last_eaten_crumb: r.vec3()?,
            },
            server_type::GET_STATISTICS_RESPONSE => {
                let fps = r.u64()?;
                let driver_tick_ns = r.u64()?;
                let count = r.u8()?;
                let worker_tick_ns = (0..count).map(|_| r.u64()).collect::<Result<_, _>>()?;
                Self::GetStatisticsResponse {
                    fps,
                    driver_tick_ns,
                    worker_tick_ns,
                    client_server_ratio: r.u32()?,
                    server_client_ratio: r.u32()?,
                }
            }
            server_type::SOCKET_BUSY => Self::SocketBusy,
            server_type::OBSERVER_POSITION => Self::ObserverPosition {
                observer_id: SessionToken(r.u64()?),
                position: r.vec3()?,
                latitude: r.i16()?,
                longitude: r.i16()?,
            },
            _ => return Err(ProtocolError::UnknownType { type_byte }),
        };
        r.finish()?;
        Ok(message)
    }
}

/// Check a client's version against [`CLIENT_PROTOCOL_VERSION`].
pub const fn check_client_version(client_version: u64) -> Result<(), ProtocolError> {
    if client_version == CLIENT_PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(ProtocolError::VersionMismatch {
            expected: CLIENT_PROTOCOL_VERSION,
            actual: client_version,
        })
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(type_byte: u8) -> Self {
        let mut buf = Vec::with_capacity(32);
        buf.push(type_byte);
        Self { buf }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn vec3(&mut self, v: Vec3) {
        self.i32(v.x);
        self.i32(v.y);
        self.i32(v.z);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    type_byte: u8,
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    const fn new(type_byte: u8, rest: &'a [u8]) -> Self {
        Self { type_byte, rest }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let (head, tail) = self
            .rest
            .split_first_chunk::<N>()
            .ok_or(ProtocolError::Truncated {
                type_byte: self.type_byte,
            })?;
        self.rest = tail;
        Ok(*head)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(u8::from_le_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn vec3(&mut self) -> Result<Vec3, ProtocolError> {
        Ok(Vec3::new(self.i32()?, self.i32()?, self.i32()?))
    }

    fn finish(self) -> Result<(), ProtocolError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::TrailingBytes {
                type_byte: self.type_byte,
                extra: self.rest.len(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn handshake_and_check_version_share_type_byte() {
        let hs = ClientMessage::Handshake {
            client_version: CLIENT_PROTOCOL_VERSION,
            observer_kind: ObserverKind::Big,
        };
        let cv = ClientMessage::CheckVersion {
            client_version: CLIENT_PROTOCOL_VERSION,
            observer_id: SessionToken(99),
        };
        let hs_bytes = hs.encode();
        let cv_bytes = cv.encode();
        assert_eq!(hs_bytes.len(), 10);
        assert_eq!(cv_bytes.len(), 17);
        assert_eq!(hs_bytes.first(), cv_bytes.first());
        assert_eq!(ClientMessage::decode(&hs_bytes).unwrap(), hs);
        assert_eq!(ClientMessage::decode(&cv_bytes).unwrap(), cv);
    }

    #[test]
    fn move_forward_layout() {
        let bytes = ClientMessage::MoveForward(200).encode();
        assert_eq!(bytes, vec![client_type::MOVE_FORWARD, 200]);
    }

    #[test]
    fn truncated_and_trailing_bytes_rejected() {
        assert_eq!(
            ClientMessage::decode(&[client_type::MOVE_FORWARD]),
            Err(ProtocolError::Truncated {
                type_byte: client_type::MOVE_FORWARD
            })
        );
        assert!(matches!(
            ClientMessage::decode(&[client_type::GET_STATE, 0]),
            Err(ProtocolError::TrailingBytes { extra: 1, .. })
        ));
        assert_eq!(ClientMessage::decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(
            ClientMessage::decode(&[77]),
            Err(ProtocolError::UnknownType { type_byte: 77 })
        );
    }

    #[test]
    fn unknown_observer_kind_rejected() {
        let mut bytes = ClientMessage::Handshake {
            client_version: 1,
            observer_kind: ObserverKind::Small,
        }
        .encode();
        if let Some(last) = bytes.last_mut() {
            *last = 7;
        }
        assert_eq!(
            ClientMessage::decode(&bytes),
            Err(ProtocolError::UnknownObserverKind { byte: 7 })
        );
    }

    #[test]
    fn statistics_response_carries_worker_list() {
        let msg = ServerMessage::GetStatisticsResponse {
            fps: 60,
            driver_tick_ns: 1_500,
            worker_tick_ns: vec![10, 20, 30],
            client_server_ratio: 1000,
            server_client_ratio: 250,
        };
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 1 + 8 + 8 + 1 + 3 * 8 + 4 + 4);
        assert_eq!(ServerMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn state_ext_is_little_endian() {
        let msg = ServerMessage::GetStateExtResponse {
            latitude: -1,
            longitude: 2,
            position: Vec3::new(1, 0, 0),
            moving_progress: 3,
            eaten_crumbs: 4,
            last_eaten_crumb: Vec3::ZERO,
        };
        let bytes = msg.encode();
        assert_eq!(bytes.get(1..3), Some(&[0xFF, 0xFF][..]));
        assert_eq!(bytes.get(3..5), Some(&[2, 0][..]));
        assert_eq!(ServerMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn version_check() {
        assert!(check_client_version(CLIENT_PROTOCOL_VERSION).is_ok());
        assert!(matches!(
            check_client_version(CLIENT_PROTOCOL_VERSION + 1),
            Err(ProtocolError::VersionMismatch { .. })
        ));
    }
}
