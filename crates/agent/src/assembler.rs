use crate::error::PipelineError;
use crate::sps;

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

const NAL_SLICE_NON_IDR: u8 = 1;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_IDR: u8 = 5;

/// Something the Frame Assembler hands to the Broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// Fires at most once per encoder session, as soon as both an SPS
    /// and a PPS have been observed.
    Init {
        sps: Vec<u8>,
        pps: Vec<u8>,
        width: u16,
        height: u16,
    },
    /// One access unit, NAL units rejoined with 4-byte start codes.
    Frame { packet: Vec<u8>, is_key: bool },
}

/// Groups a stream of classified NAL units into access units and fires
/// a one-shot stream-init event once SPS and PPS are both known.
pub struct Assembler {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    width: u16,
    height: u16,
    init_fired: bool,
    current: Vec<Vec<u8>>,
    current_is_key: bool,
    has_open_unit: bool,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            sps: None,
            pps: None,
            width: 0,
            height: 0,
            init_fired: false,
            current: Vec::new(),
            current_is_key: false,
            has_open_unit: false,
        }
    }

    /// Feeds one NAL unit (payload includes its header byte, as
    /// produced by the Bitstream Scanner). Returns zero or more events
    /// in emission order.
    pub fn push_nal(&mut self, nal_type: u8, payload: Vec<u8>) -> Vec<AssemblerEvent> {
        let mut events = Vec::new();

        match nal_type {
            NAL_SPS => {
                let (w, h) = sps::parse_sps_dimensions(&payload);
                if w != 0 && h != 0 {
                    self.width = w;
                    self.height = h;
                } else {
                    tracing::debug!(error = %PipelineError::SpsParseFailed, "continuing with prior dimensions");
                }
                self.sps = Some(payload);
                if let Some(event) = self.maybe_fire_init() {
                    events.push(event);
                }
            }
            NAL_PPS => {
                self.pps = Some(payload);
                if let Some(event) = self.maybe_fire_init() {
                    events.push(event);
                }
            }
            NAL_IDR | NAL_SLICE_NON_IDR => {
                if let Some(event) = self.close_unit() {
                    events.push(event);
                }
                self.current.push(payload);
                self.current_is_key = nal_type == NAL_IDR;
                self.has_open_unit = true;
            }
            _ => {
                if self.has_open_unit {
                    self.current.push(payload);
                }
            }
        }

        events
    }

    fn maybe_fire_init(&mut self) -> Option<AssemblerEvent> {
        if self.init_fired {
            return None;
        }
        let (sps, pps) = (self.sps.clone()?, self.pps.clone()?);
        self.init_fired = true;
        Some(AssemblerEvent::Init {
            sps,
            pps,
            width: self.width,
            height: self.height,
        })
    }

    fn close_unit(&mut self) -> Option<AssemblerEvent> {
        if !self.has_open_unit {
            return None;
        }
        let mut packet = Vec::new();
        for nal in self.current.drain(..) {
            packet.extend_from_slice(&START_CODE);
            packet.extend_from_slice(&nal);
        }
        self.has_open_unit = false;
        Some(AssemblerEvent::Frame {
            packet,
            is_key: self.current_is_key,
        })
    }

    /// Flushes any access unit still open. Call once the encoder's
    /// stream ends, if a final partial unit should still be delivered.
    pub fn flush(&mut self) -> Vec<AssemblerEvent> {
        self.close_unit().into_iter().collect()
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS_BYTES: [u8; 27] = [
        0x67, 0x4d, 0x00, 0x28, 0xac, 0xd9, 0x40, 0x78, 0x02, 0x27, 0xe5, 0xc0, 0x44, 0x00, 0x00,
        0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0xf0, 0x3c, 0x60, 0xc6, 0x58,
    ];
    const PPS_BYTES: [u8; 4] = [0x68, 0xce, 0x06, 0xe2];

    #[test]
    fn sps_then_pps_fires_init_exactly_once() {
        let mut asm = Assembler::new();
        let events_sps = asm.push_nal(NAL_SPS, SPS_BYTES.to_vec());
        assert!(events_sps.is_empty(), "init should wait for PPS too");

        let events_pps = asm.push_nal(NAL_PPS, PPS_BYTES.to_vec());
        assert_eq!(events_pps.len(), 1);
        match &events_pps[0] {
            AssemblerEvent::Init { width, height, .. } => {
                assert_eq!(*width, 1920);
                assert_eq!(*height, 1080);
            }
            other => panic!("expected Init, got {other:?}"),
        }

        // A later SPS/PPS repeat must not refire Init.
        let repeat = asm.push_nal(NAL_SPS, SPS_BYTES.to_vec());
        assert!(repeat.is_empty());
    }

    #[test]
    fn full_sequence_produces_one_init_and_three_frames() {
        let mut asm = Assembler::new();
        let mut events = Vec::new();
        events.extend(asm.push_nal(NAL_SPS, SPS_BYTES.to_vec()));
        events.extend(asm.push_nal(NAL_PPS, PPS_BYTES.to_vec()));
        events.extend(asm.push_nal(NAL_IDR, vec![0x65, 0xaa]));
        events.extend(asm.push_nal(NAL_SLICE_NON_IDR, vec![0x41, 0xbb]));
        events.extend(asm.push_nal(NAL_SLICE_NON_IDR, vec![0x41, 0xcc]));
        events.extend(asm.flush());

        let inits = events
            .iter()
            .filter(|e| matches!(e, AssemblerEvent::Init { .. }))
            .count();
        assert_eq!(inits, 1);

        let frames: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AssemblerEvent::Frame { is_key, .. } => Some(*is_key),
                _ => None,
            })
            .collect();
        assert_eq!(frames, vec![true, false, false]);
    }

    #[test]
    fn access_unit_includes_start_codes_and_auxiliary_nals() {
        let mut asm = Assembler::new();
        asm.push_nal(NAL_IDR, vec![0x65, 0xaa]);
        // AUD-like auxiliary NAL (type 9) belongs to the currently open unit.
        asm.push_nal(9, vec![0x09, 0x10]);
        let events = asm.flush();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AssemblerEvent::Frame { packet, is_key } => {
                assert!(*is_key);
                assert_eq!(
                    packet,
                    &[0, 0, 0, 1, 0x65, 0xaa, 0, 0, 0, 1, 0x09, 0x10]
                );
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn auxiliary_nal_before_any_slice_is_discarded() {
        let mut asm = Assembler::new();
        let events = asm.push_nal(9, vec![0x09, 0x10]);
        assert!(events.is_empty());
        assert!(asm.flush().is_empty());
    }

    #[test]
    fn malformed_sps_still_allows_stream_to_continue() {
        let mut asm = Assembler::new();
        // Too short to parse dimensions from, but still a valid cache-worthy SPS tag.
        asm.push_nal(NAL_SPS, vec![0x67, 0x4d]);
        let events = asm.push_nal(NAL_PPS, PPS_BYTES.to_vec());
        assert_eq!(events.len(), 1);
        match &events[0] {
            AssemblerEvent::Init { width, height, .. } => {
                assert_eq!(*width, 0);
                assert_eq!(*height, 0);
            }
            other => panic!("expected Init, got {other:?}"),
        }
    }
}
