//! WebSocket frame codec (RFC 6455 subset, client role).
//!
//! Wire layout handled here:
//!
//! ```text
//! byte0: FIN(1) RSV(3) OPCODE(4)
//! byte1: MASK(1) LEN7(7)
//! [if LEN7==126: 2 bytes big-endian extended length]
//! [if MASK: 4 bytes mask key]
//! payload: LEN bytes, XOR-masked with mask key (cyclic) if MASK set
//! ```
//!
//! Outbound frames are always masked (client role). Inbound frames must be
//! unmasked; LEN7==127 (64-bit lengths) and non-zero RSV bits are rejected
//! rather than negotiated.

use crate::error::{FrameSockError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest payload encodable with the 16-bit extended length field.
pub const MAX_FRAME_PAYLOAD: usize = 65535;

/// WebSocket frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation frame (fragmented message).
    Continuation = 0x0,
    /// Text data frame.
    Text = 0x1,
    /// Binary data frame.
    Binary = 0x2,
    /// Connection close control frame.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xA,
}

impl Opcode {
    /// Returns true for Close, Ping and Pong.
    #[inline]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Try to parse an opcode from the low nibble of byte 0.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameSockError::InvalidOpcode(other)),
        }
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Final fragment flag (FIN bit).
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Payload data (already unmasked; inbound frames arrive unmasked).
    pub payload: Bytes,
}

/// Encode one outbound frame, masked for client-to-server transmission.
///
/// Payloads of 65536 bytes or more need the 64-bit length field and are
/// rejected with `FrameTooLarge`.
pub fn encode_frame(fin: bool, opcode: Opcode, payload: &[u8]) -> Result<Bytes> {
    if opcode.is_control() {
        if !fin {
            return Err(FrameSockError::Protocol("fragmented control frame"));
        }
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(FrameSockError::Protocol("control frame payload too large"));
        }
    }

    let len = payload.len();
    if len > MAX_FRAME_PAYLOAD {
        return Err(FrameSockError::FrameTooLarge(len));
    }

    let mut buf = BytesMut::with_capacity(len + 8);

    let mut byte0 = opcode as u8;
    if fin {
        byte0 |= 0x80;
    }
    buf.put_u8(byte0);

    // Mask bit is always set on client frames.
    if len <= MAX_CONTROL_PAYLOAD {
        buf.put_u8(0x80 | len as u8);
    } else {
        buf.put_u8(0x80 | 126);
        buf.put_u16(len as u16);
    }

    let key = generate_mask_key()?;
    buf.put_slice(&key);

    let mut masked = payload.to_vec();
    mask_payload(&mut masked, key);
    buf.put_slice(&masked);

    Ok(buf.freeze())
}

/// Apply XOR masking to payload data in place.
///
/// Masking is an involution: applying the same key twice recovers the input.
pub fn mask_payload(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Generate a 4-byte mask key.
///
/// The mask exists to satisfy the protocol, not to provide secrecy; the OS
/// entropy source still gives the unpredictability RFC 6455 §5.3 asks for.
fn generate_mask_key() -> Result<[u8; 4]> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key)
        .map_err(|e| FrameSockError::Other(format!("entropy source failed: {e}")))?;
    Ok(key)
}

/// Build the payload of an outbound close frame.
pub fn encode_close_payload(code: Option<u16>, reason: Option<&str>) -> Bytes {
    match (code, reason) {
        (Some(c), Some(r)) => {
            let mut buf = BytesMut::with_capacity(2 + r.len());
            buf.put_u16(c);
            buf.put_slice(r.as_bytes());
            buf.freeze()
        }
        (Some(c), None) => {
            let mut buf = BytesMut::with_capacity(2);
            buf.put_u16(c);
            buf.freeze()
        }
        _ => Bytes::new(),
    }
}

/// Split a close-frame payload into its optional code and reason.
///
/// The code is absent when the payload is shorter than 2 bytes; the reason
/// when it is 2 bytes or shorter. Reasons decode lossily so a peer sending a
/// mangled reason still closes gracefully.
pub fn parse_close_payload(payload: &[u8]) -> (Option<u16>, Option<String>) {
    let code = if payload.len() >= 2 {
        Some(u16::from_be_bytes([payload[0], payload[1]]))
    } else {
        None
    };
    let reason = if payload.len() > 2 {
        Some(String::from_utf8_lossy(&payload[2..]).into_owned())
    } else {
        None
    };
    (code, reason)
}

/// Decode state for the incremental frame parser.
#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Waiting for the first 2 header bytes.
    Header,
    /// Reading the 2-byte extended payload length.
    ExtendedLength { fin: bool, opcode: Opcode },
    /// Reading payload data.
    Payload {
        fin: bool,
        opcode: Opcode,
        len: usize,
    },
}

/// Incremental decoder for frames received from the server.
///
/// `feed` consumes at most one complete frame from the buffer and leaves any
/// remainder in place, so partial frames spanning multiple transport reads
/// resume where they left off instead of rescanning from the start.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }

    /// Discard any partially parsed frame state.
    pub fn reset(&mut self) {
        self.state = DecodeState::Header;
    }

    /// Try to decode one frame from `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; the consumed prefix is
    /// retained in the decoder state and `src` keeps the unread remainder.
    pub fn feed(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < 2 {
                        return Ok(None);
                    }

                    let byte0 = src[0];
                    let byte1 = src[1];

                    let fin = byte0 & 0x80 != 0;
                    let rsv = byte0 & 0x70;
                    let masked = byte1 & 0x80 != 0;
                    let len7 = byte1 & 0x7F;

                    if rsv != 0 {
                        return Err(FrameSockError::Protocol("reserved bits set"));
                    }

                    let opcode = Opcode::from_u8(byte0 & 0x0F)?;

                    // Server-to-client frames must arrive unmasked.
                    if masked {
                        return Err(FrameSockError::Protocol("masked server frame"));
                    }

                    if opcode.is_control() && (!fin || len7 as usize > MAX_CONTROL_PAYLOAD) {
                        return Err(FrameSockError::Protocol("malformed control frame"));
                    }

                    if len7 == 127 {
                        return Err(FrameSockError::Protocol(
                            "frame too large (64-bit length unsupported)",
                        ));
                    }

                    src.advance(2);

                    if len7 == 126 {
                        self.state = DecodeState::ExtendedLength { fin, opcode };
                    } else {
                        self.state = DecodeState::Payload {
                            fin,
                            opcode,
                            len: len7 as usize,
                        };
                    }
                }

                DecodeState::ExtendedLength { fin, opcode } => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    let len = u16::from_be_bytes([src[0], src[1]]) as usize;
                    src.advance(2);
                    self.state = DecodeState::Payload { fin, opcode, len };
                }

                DecodeState::Payload { fin, opcode, len } => {
                    if src.len() < len {
                        return Ok(None);
                    }
                    let payload = src.split_to(len).freeze();
                    self.state = DecodeState::Header;
                    return Ok(Some(Frame {
                        fin,
                        opcode,
                        payload,
                    }));
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
