use thiserror::Error;

/// Tag byte identifying a wire message. Values below `0x10` flow
/// agent -> viewer; values at or above `0x10` flow viewer -> agent.
pub mod tag {
    pub const CONFIG: u8 = 0x01;
    pub const IMAGE: u8 = 0x02;
    pub const VIDEO_INIT: u8 = 0x03;
    pub const VIDEO_FRAME: u8 = 0x04;
    pub const POINTER_MOVE: u8 = 0x10;
    pub const POINTER_BUTTON: u8 = 0x11;
    pub const KEY: u8 = 0x20;
}

/// Bit 0 of a video frame's flags byte.
const FLAG_KEYFRAME: u8 = 0b0000_0001;

/// `tag(1) + reserved(1) + width(2) + height(2) + fps(4) + quality(4)`.
const CONFIG_LEN: usize = 14;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("unknown message tag: {0:#04x}")]
    UnknownTag(u8),
    #[error("declared payload length {declared} exceeds available {available} bytes")]
    IncompletePayload { declared: usize, available: usize },
}

/// Stream configuration announced to a viewer right after it attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigMessage {
    pub width: u16,
    pub height: u16,
    pub fps: u32,
    pub quality: u32,
}

impl ConfigMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CONFIG_LEN);
        buf.push(tag::CONFIG);
        buf.push(0); // reserved
        buf.extend_from_slice(&self.width.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.fps.to_be_bytes());
        buf.extend_from_slice(&self.quality.to_be_bytes());
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, MessageError> {
        if buf.len() < CONFIG_LEN {
            return Err(MessageError::TooShort {
                need: CONFIG_LEN,
                got: buf.len(),
            });
        }
        Ok(ConfigMessage {
            width: u16::from_be_bytes([buf[2], buf[3]]),
            height: u16::from_be_bytes([buf[4], buf[5]]),
            fps: u32::from_be_bytes(buf[6..10].try_into().unwrap()),
            quality: u32::from_be_bytes(buf[10..14].try_into().unwrap()),
        })
    }
}

/// Still-image fallback frame, sent while no H.264 init has fired yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMessage {
    pub payload: Vec<u8>,
}

impl ImageMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5 + self.payload.len());
        buf.push(tag::IMAGE);
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, MessageError> {
        if buf.len() < 5 {
            return Err(MessageError::TooShort {
                need: 5,
                got: buf.len(),
            });
        }
        let size = u32::from_be_bytes(buf[1..5].try_into().unwrap()) as usize;
        let available = buf.len() - 5;
        if size > available {
            return Err(MessageError::IncompletePayload {
                declared: size,
                available,
            });
        }
        Ok(ImageMessage {
            payload: buf[5..5 + size].to_vec(),
        })
    }
}

/// One-shot H.264 stream init: raw SPS/PPS NAL payloads (no start codes)
/// plus the dimensions recovered from the SPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInitMessage {
    pub width: u16,
    pub height: u16,
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

impl VideoInitMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(13 + self.sps.len() + self.pps.len());
        buf.push(tag::VIDEO_INIT);
        buf.extend_from_slice(&self.width.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&(self.sps.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.sps);
        buf.extend_from_slice(&(self.pps.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.pps);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, MessageError> {
        if buf.len() < 9 {
            return Err(MessageError::TooShort {
                need: 9,
                got: buf.len(),
            });
        }
        let width = u16::from_be_bytes([buf[1], buf[2]]);
        let height = u16::from_be_bytes([buf[3], buf[4]]);
        let sps_len = u32::from_be_bytes(buf[5..9].try_into().unwrap()) as usize;
        let mut offset = 9;
        if buf.len() < offset + sps_len + 4 {
            return Err(MessageError::IncompletePayload {
                declared: sps_len,
                available: buf.len().saturating_sub(offset),
            });
        }
        let sps = buf[offset..offset + sps_len].to_vec();
        offset += sps_len;
        let pps_len = u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if buf.len() < offset + pps_len {
            return Err(MessageError::IncompletePayload {
                declared: pps_len,
                available: buf.len().saturating_sub(offset),
            });
        }
        let pps = buf[offset..offset + pps_len].to_vec();
        Ok(VideoInitMessage {
            width,
            height,
            sps,
            pps,
        })
    }
}

/// One access unit of Annex-B H.264 (NAL units still carry their start codes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrameMessage {
    pub is_keyframe: bool,
    pub payload: Vec<u8>,
}

impl VideoFrameMessage {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10 + self.payload.len());
        buf.push(tag::VIDEO_FRAME);
        buf.push(if self.is_keyframe { FLAG_KEYFRAME } else { 0 });
        buf.extend_from_slice(&(self.payload.len() as u64).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, MessageError> {
        if buf.len() < 10 {
            return Err(MessageError::TooShort {
                need: 10,
                got: buf.len(),
            });
        }
        let flags = buf[1];
        let size = u64::from_be_bytes(buf[2..10].try_into().unwrap()) as usize;
        let available = buf.len() - 10;
        if size > available {
            return Err(MessageError::IncompletePayload {
                declared: size,
                available,
            });
        }
        Ok(VideoFrameMessage {
            is_keyframe: flags & FLAG_KEYFRAME != 0,
            payload: buf[10..10 + size].to_vec(),
        })
    }
}

/// Events decoded from inbound viewer messages. Injection is out of
/// scope; the agent only logs these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove { x: u16, y: u16 },
    PointerButton { button: u8 },
    Key { key: u16, pressed: bool },
}

impl InputEvent {
    /// Decodes one inbound message. Unknown tags or short payloads
    /// return an error; callers should drop the message and keep the
    /// connection open rather than propagate it.
    pub fn deserialize(buf: &[u8]) -> Result<Self, MessageError> {
        if buf.is_empty() {
            return Err(MessageError::TooShort { need: 1, got: 0 });
        }
        match buf[0] {
            tag::POINTER_MOVE => {
                if buf.len() < 5 {
                    return Err(MessageError::TooShort {
                        need: 5,
                        got: buf.len(),
                    });
                }
                Ok(InputEvent::PointerMove {
                    x: u16::from_be_bytes([buf[1], buf[2]]),
                    y: u16::from_be_bytes([buf[3], buf[4]]),
                })
            }
            tag::POINTER_BUTTON => {
                if buf.len() < 2 {
                    return Err(MessageError::TooShort {
                        need: 2,
                        got: buf.len(),
                    });
                }
                Ok(InputEvent::PointerButton { button: buf[1] })
            }
            tag::KEY => {
                if buf.len() < 4 {
                    return Err(MessageError::TooShort {
                        need: 4,
                        got: buf.len(),
                    });
                }
                Ok(InputEvent::Key {
                    key: u16::from_be_bytes([buf[1], buf[2]]),
                    pressed: buf[3] != 0,
                })
            }
            other => Err(MessageError::UnknownTag(other)),
        }
    }
}
