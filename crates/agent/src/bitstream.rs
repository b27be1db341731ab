//! Annex-B H.264 bitstream framing.
//!
//! Locates start codes in a byte buffer and slices out NAL unit
//! payloads. The stateful `Scanner` is fed chunks as they arrive from
//! the encoder's stdout pipe and only yields NAL units once a
//! subsequent start code confirms they are complete, leaving any
//! trailing bytes buffered for the next feed.

use crate::error::PipelineError;

/// Where a start code begins, and whether it was the 3-byte or 4-byte
/// form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    pub offset: usize,
    pub len: usize,
}

/// Finds the next Annex-B start code at or after `from`. Recognizes
/// both `00 00 01` and `00 00 00 01`; the 4-byte form is reported
/// whenever a zero precedes the 3-byte triplet.
pub fn find_start_code(data: &[u8], from: usize) -> Option<StartCode> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if i > from && data[i - 1] == 0 {
                return Some(StartCode {
                    offset: i - 1,
                    len: 4,
                });
            }
            return Some(StartCode { offset: i, len: 3 });
        }
        i += 1;
    }
    None
}

fn find_all_start_codes(data: &[u8]) -> Vec<StartCode> {
    let mut codes = Vec::new();
    let mut i = 0;
    while let Some(sc) = find_start_code(data, i) {
        i = sc.offset + sc.len;
        codes.push(sc);
    }
    codes
}

/// One-shot extraction over a buffer assumed to be complete (the last
/// NAL ends at `data.len()`). Useful for tests and for flushing
/// whatever remains once the encoder process exits.
pub fn scan_all(data: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let starts = find_all_start_codes(data);
    let mut nals = Vec::with_capacity(starts.len());
    for (idx, sc) in starts.iter().enumerate() {
        let payload_start = sc.offset + sc.len;
        if payload_start >= data.len() {
            continue;
        }
        let payload_end = starts
            .get(idx + 1)
            .map(|next| next.offset)
            .unwrap_or(data.len());
        if payload_end <= payload_start {
            continue;
        }
        let nal_type = data[payload_start] & 0x1f;
        nals.push((nal_type, data[payload_start..payload_end].to_vec()));
    }
    nals
}

/// Incremental scanner over an append-only byte stream.
pub struct Scanner {
    buf: Vec<u8>,
}

impl Scanner {
    pub fn new() -> Self {
        Scanner { buf: Vec::new() }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns every NAL unit that is now provably complete (bounded by
    /// a following start code), and compacts the internal buffer down
    /// to the unconfirmed tail.
    pub fn drain(&mut self) -> Vec<(u8, Vec<u8>)> {
        let starts = find_all_start_codes(&self.buf);
        if starts.len() < 2 {
            return Vec::new();
        }
        let mut nals = Vec::with_capacity(starts.len() - 1);
        for pair in starts.windows(2) {
            let (sc, next) = (pair[0], pair[1]);
            let payload_start = sc.offset + sc.len;
            let payload_end = next.offset;
            if payload_end > payload_start {
                let nal_type = self.buf[payload_start] & 0x1f;
                nals.push((nal_type, self.buf[payload_start..payload_end].to_vec()));
            }
        }
        let tail_from = starts[starts.len() - 1].offset;
        self.buf.drain(0..tail_from);
        nals
    }

    /// Flushes whatever remains in the buffer, treating it as complete.
    /// Call once when the encoder's stdout reaches EOF.
    pub fn flush(&mut self) -> Vec<(u8, Vec<u8>)> {
        if !self.buf.is_empty() && find_start_code(&self.buf, 0).is_none() {
            let err = PipelineError::BitstreamTruncated {
                len: self.buf.len(),
            };
            tracing::debug!(error = %err, "discarding unparseable tail at flush");
        }
        let nals = scan_all(&self.buf);
        self.buf.clear();
        nals
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_3byte_start_code() {
        let data = [0x00, 0x00, 0x01, 0x67];
        let sc = find_start_code(&data, 0).unwrap();
        assert_eq!(sc, StartCode { offset: 0, len: 3 });
    }

    #[test]
    fn finds_4byte_start_code() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x67];
        let sc = find_start_code(&data, 0).unwrap();
        assert_eq!(sc, StartCode { offset: 0, len: 4 });
    }

    #[test]
    fn empty_buffer_not_found() {
        assert!(find_start_code(&[], 0).is_none());
    }

    #[test]
    fn scan_all_recovers_sps_and_pps() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1f, 0x00, 0x00, 0x00, 0x01, 0x68, 0xce,
            0x06, 0xe2,
        ];
        let nals = scan_all(&data);
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0], (7, vec![0x67, 0x42, 0x00, 0x1f]));
        assert_eq!(nals[1], (8, vec![0x68, 0xce, 0x06, 0xe2]));
    }

    #[test]
    fn scan_all_mixed_start_code_lengths() {
        let data = [
            0x00, 0x00, 0x01, 0x67, 0x4d, 0x40, 0x00, 0x00, 0x00, 0x01, 0x68, 0xee, 0x3c,
        ];
        let nals = scan_all(&data);
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0].0, 7);
        assert_eq!(nals[1].0, 8);
    }

    #[test]
    fn scanner_holds_back_unconfirmed_tail() {
        let mut scanner = Scanner::new();
        scanner.feed(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1f]);
        // Only one start code seen so far: nothing is confirmed complete.
        assert!(scanner.drain().is_empty());

        scanner.feed(&[0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x06, 0xe2]);
        let nals = scanner.drain();
        assert_eq!(nals, vec![(7, vec![0x67, 0x42, 0x00, 0x1f])]);
    }

    #[test]
    fn scanner_yields_nals_as_more_data_streams_in() {
        let mut scanner = Scanner::new();
        scanner.feed(&[
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1f, 0x00, 0x00, 0x00, 0x01, 0x68, 0xce,
            0x06, 0xe2, 0x00, 0x00, 0x00, 0x01, 0x65, 0xaa, 0xbb,
        ]);
        let first = scanner.drain();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].0, 7);
        assert_eq!(first[1].0, 8);

        scanner.feed(&[0x00, 0x00, 0x00, 0x01, 0x41, 0xcc]);
        let second = scanner.drain();
        assert_eq!(second, vec![(5, vec![0x65, 0xaa, 0xbb])]);
    }

    #[test]
    fn flush_emits_trailing_unterminated_nal() {
        let mut scanner = Scanner::new();
        scanner.feed(&[0x00, 0x00, 0x00, 0x01, 0x65, 0xaa, 0xbb]);
        assert!(scanner.drain().is_empty());
        let flushed = scanner.flush();
        assert_eq!(flushed, vec![(5, vec![0x65, 0xaa, 0xbb])]);
    }

    #[test]
    fn flush_discards_garbage_with_no_start_code() {
        let mut scanner = Scanner::new();
        scanner.feed(&[0xaa, 0xbb, 0xcc]);
        assert_eq!(scanner.flush(), Vec::new());
    }
}
