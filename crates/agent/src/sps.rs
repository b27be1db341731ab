/// Sequence Parameter Set parsing: just enough Exp-Golomb bit-walking
/// to recover coded picture dimensions.

struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    fn read_bit(&mut self) -> Option<u8> {
        if self.byte_offset >= self.data.len() {
            return None;
        }
        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;
        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
        Some(bit)
    }

    fn read_bits(&mut self, n: u8) -> Option<u32> {
        let mut val = 0u32;
        for _ in 0..n {
            val = (val << 1) | self.read_bit()? as u32;
        }
        Some(val)
    }

    fn read_ue(&mut self) -> Option<u32> {
        let mut leading_zeros = 0u32;
        loop {
            let bit = self.read_bit()?;
            if bit == 1 {
                break;
            }
            leading_zeros += 1;
            if leading_zeros > 31 {
                return None;
            }
        }
        if leading_zeros == 0 {
            return Some(0);
        }
        let suffix = self.read_bits(leading_zeros as u8)?;
        Some((1 << leading_zeros) - 1 + suffix)
    }

    fn read_se(&mut self) -> Option<i32> {
        let val = self.read_ue()?;
        if val == 0 {
            Some(0)
        } else if val % 2 == 1 {
            Some((val / 2 + 1) as i32)
        } else {
            Some(-(val as i32 / 2))
        }
    }
}

/// Profiles that carry the chroma-format / bit-depth / scaling-matrix
/// block before `log2_max_frame_num_minus4`.
fn has_chroma_format_block(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        44 | 83 | 86 | 100 | 110 | 118 | 122 | 128 | 134 | 135 | 138 | 139 | 244
    )
}

fn skip_scaling_lists(reader: &mut BitReader, chroma_format_idc: u32) -> Option<()> {
    let count = if chroma_format_idc != 3 { 8 } else { 12 };
    for idx in 0..count {
        let present = reader.read_bits(1)?;
        if present == 1 {
            let size = if idx < 6 { 16 } else { 64 };
            let mut last_scale = 8i32;
            let mut next_scale = 8i32;
            for _ in 0..size {
                if next_scale != 0 {
                    let delta = reader.read_se()?;
                    next_scale = (last_scale + delta + 256) % 256;
                }
                last_scale = if next_scale == 0 {
                    last_scale
                } else {
                    next_scale
                };
            }
        }
    }
    Some(())
}

/// Parses an SPS NAL unit (including its one-byte NAL header) and
/// returns `(width, height)` in pixels, rounded up to the nearest
/// macroblock (16px). Cropping is not applied. Returns `(0, 0)` if the
/// payload is not an SPS or parsing runs past the end of the buffer.
pub fn parse_sps_dimensions(nal_data: &[u8]) -> (u16, u16) {
    parse_sps_dimensions_inner(nal_data).unwrap_or((0, 0))
}

fn parse_sps_dimensions_inner(nal_data: &[u8]) -> Option<(u16, u16)> {
    if nal_data.is_empty() {
        return None;
    }
    let nal_type = nal_data[0] & 0x1f;
    if nal_type != 7 || nal_data.len() < 4 {
        return None;
    }
    let profile_idc = nal_data[1];

    let mut reader = BitReader::new(&nal_data[4..]);
    reader.read_ue()?; // seq_parameter_set_id

    if has_chroma_format_block(profile_idc) {
        let chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc == 3 {
            reader.read_bits(1)?; // separate_colour_plane_flag
        }
        reader.read_ue()?; // bit_depth_luma_minus8
        reader.read_ue()?; // bit_depth_chroma_minus8
        reader.read_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if reader.read_bits(1)? == 1 {
            skip_scaling_lists(&mut reader, chroma_format_idc)?;
        }
    }

    reader.read_ue()?; // log2_max_frame_num_minus4
    let poc_type = reader.read_ue()?;
    if poc_type == 0 {
        reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
    } else if poc_type == 1 {
        reader.read_bits(1)?; // delta_pic_order_always_zero_flag
        reader.read_se()?; // offset_for_non_ref_pic
        reader.read_se()?; // offset_for_top_to_bottom_field
        let num_ref_frames_in_poc_cycle = reader.read_ue()?;
        for _ in 0..num_ref_frames_in_poc_cycle {
            reader.read_se()?;
        }
    }

    reader.read_ue()?; // max_num_ref_frames
    reader.read_bits(1)?; // gaps_in_frame_num_value_allowed_flag

    let width_in_mbs = reader.read_ue()? + 1;
    let height_in_map_units = reader.read_ue()? + 1;
    let frame_mbs_only = reader.read_bits(1)?;

    let width = (width_in_mbs * 16) as u16;
    let height_multiplier = if frame_mbs_only == 1 { 1 } else { 2 };
    let height = (height_in_map_units * 16 * height_multiplier) as u16;

    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_sps_nal() {
        let pps = [0x68, 0xee, 0x3c, 0x80];
        assert_eq!(parse_sps_dimensions(&pps), (0, 0));
    }

    #[test]
    fn rejects_empty_and_truncated() {
        assert_eq!(parse_sps_dimensions(&[]), (0, 0));
        assert_eq!(parse_sps_dimensions(&[0x67, 0x42]), (0, 0));
    }

    #[test]
    fn parses_real_nvenc_main_profile_1920x1080() {
        let sps = [
            0x67, 0x4d, 0x00, 0x28, 0xac, 0xd9, 0x40, 0x78, 0x02, 0x27, 0xe5, 0xc0, 0x44, 0x00,
            0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0xf0, 0x3c, 0x60, 0xc6, 0x58,
        ];
        let (w, h) = parse_sps_dimensions(&sps);
        assert_eq!(w, 1920);
        assert_eq!(h, 1080);
    }

    #[test]
    fn dimensions_are_macroblock_aligned() {
        let sps = [
            0x67, 0x4d, 0x00, 0x28, 0xac, 0xd9, 0x40, 0x78, 0x02, 0x27, 0xe5, 0xc0, 0x44, 0x00,
            0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0xf0, 0x3c, 0x60, 0xc6, 0x58,
        ];
        let (w, h) = parse_sps_dimensions(&sps);
        assert_eq!(w % 16, 0);
        assert_eq!(h % 16, 0);
    }

    #[test]
    fn truncated_high_profile_sps_fails_closed() {
        // High profile (100) requires the chroma-format block; this
        // payload is cut short before it, so parsing must bail to (0,0)
        // rather than panic or read garbage.
        let sps = [0x67, 100, 0x00, 0x1f, 0x80];
        assert_eq!(parse_sps_dimensions(&sps), (0, 0));
    }
}
