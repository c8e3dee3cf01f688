//! Synthetic H.264 / HEVC units for test fixtures.
//!
//! The generated parameter sets and slice headers are syntactically valid;
//! slice data after the header is filler and does not decode to an image.

use bitstream_io::{BigEndian, BitWrite, BitWriter};

use crate::codec::rbsp::add_emulation_prevention;
use crate::types::{Codec, CropWindow, DisplayOrientation};

/// Bit writer for RBSP payloads. Writes go to a `Vec`, which cannot fail,
/// so write errors are discarded.
struct RbspWriter {
    bits: BitWriter<Vec<u8>, BigEndian>,
    written: u64,
}

impl RbspWriter {
    fn new() -> Self {
        Self {
            bits: BitWriter::endian(Vec::new(), BigEndian),
            written: 0,
        }
    }

    fn u(&mut self, n: u32, value: u64) -> &mut Self {
        if n > 0 {
            let _ = self.bits.write(n, value);
            self.written += n as u64;
        }
        self
    }

    fn flag(&mut self, value: bool) -> &mut Self {
        let _ = self.bits.write_bit(value);
        self.written += 1;
        self
    }

    fn ue(&mut self, value: u32) -> &mut Self {
        let code = value as u64 + 1;
        let len = 64 - code.leading_zeros();
        self.u(len - 1, 0).u(len, code)
    }

    fn se(&mut self, value: i32) -> &mut Self {
        let mapped = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.ue(mapped)
    }

    /// Deterministic filler bytes standing in for slice data.
    fn filler(&mut self, len: usize) -> &mut Self {
        for i in 0..len {
            self.u(8, ((i * 37 + 11) % 251) as u64 + 1);
        }
        self
    }

    /// Pad to a byte boundary with a one bit then zeros (SEI payloads).
    fn align_with_one(&mut self) -> &mut Self {
        if self.written % 8 != 0 {
            self.flag(true);
            while self.written % 8 != 0 {
                self.flag(false);
            }
        }
        self
    }

    /// `rbsp_trailing_bits()` and the finished bytes.
    fn finish(mut self) -> Vec<u8> {
        self.flag(true);
        let _ = self.bits.byte_align();
        self.bits.into_writer()
    }

    /// Raw bytes without trailing bits; the writer must be aligned.
    fn into_bytes(mut self) -> Vec<u8> {
        let _ = self.bits.byte_align();
        self.bits.into_writer()
    }
}

fn nal(header: &[u8], rbsp: &[u8]) -> Vec<u8> {
    let mut out = header.to_vec();
    out.extend_from_slice(&add_emulation_prevention(rbsp));
    out
}

/// Length-prefix each unit with `size` bytes.
pub fn length_prefixed(units: &[Vec<u8>], size: u8) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        let len = unit.len() as u64;
        for i in (0..size as u32).rev() {
            out.push((len >> (8 * i)) as u8);
        }
        out.extend_from_slice(unit);
    }
    out
}

/// Join units with four-byte start codes.
pub fn annex_b(units: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(unit);
    }
    out
}

/// Parameters of a synthetic H.264 stream.
#[derive(Debug, Clone)]
pub struct AvcStream {
    /// Output (cropped) size; must be even.
    pub width: u32,
    pub height: u32,
    /// Crop beyond macroblock padding, in luma samples; must be even.
    pub crop: CropWindow,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub pic_order_cnt_type: u32,
    /// Bytes of filler after each slice header.
    pub slice_payload: usize,
}

impl AvcStream {
    /// High profile, 4:2:0, POC type 0 with 8-bit LSB, 4-bit frame_num.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            crop: CropWindow::default(),
            profile_idc: 100,
            level_idc: 40,
            pic_order_cnt_type: 0,
            slice_payload: 48,
        }
    }

    fn coded(&self) -> (u32, u32) {
        let w = (self.width + self.crop.left + self.crop.right).div_ceil(16) * 16;
        let h = (self.height + self.crop.top + self.crop.bottom).div_ceil(16) * 16;
        (w, h)
    }

    pub fn sps(&self) -> Vec<u8> {
        let (coded_w, coded_h) = self.coded();
        let mut w = RbspWriter::new();
        w.u(8, self.profile_idc as u64).u(8, 0).u(8, self.level_idc as u64).ue(0);
        if matches!(self.profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128) {
            // chroma_format_idc, bit depths, bypass, no scaling matrix
            w.ue(1).ue(0).ue(0).flag(false).flag(false);
        }
        w.ue(0); // log2_max_frame_num_minus4
        w.ue(self.pic_order_cnt_type);
        if self.pic_order_cnt_type == 0 {
            w.ue(4);
        }
        w.ue(1).flag(false);
        w.ue(coded_w / 16 - 1).ue(coded_h / 16 - 1);
        w.flag(true).flag(true); // frame_mbs_only, direct_8x8_inference

        let right = coded_w - self.width - self.crop.left;
        let bottom = coded_h - self.height - self.crop.top;
        let cropping = self.crop.left + right + self.crop.top + bottom > 0;
        w.flag(cropping);
        if cropping {
            w.ue(self.crop.left / 2)
                .ue(right / 2)
                .ue(self.crop.top / 2)
                .ue(bottom / 2);
        }
        w.flag(false); // vui_parameters_present_flag
        nal(&[0x67], &w.finish())
    }

    pub fn pps(&self) -> Vec<u8> {
        let mut w = RbspWriter::new();
        w.ue(0).ue(0).flag(true).flag(false).ue(0);
        w.ue(0).ue(0).flag(false).u(2, 0);
        w.se(0).se(0).se(0);
        w.flag(true).flag(false).flag(false);
        nal(&[0x68], &w.finish())
    }

    /// A single-slice picture. IDR pictures are I slices, others P slices.
    pub fn slice(&self, idr: bool, frame_num: u32, pic_order_cnt_lsb: u32) -> Vec<u8> {
        let mut w = RbspWriter::new();
        w.ue(0).ue(if idr { 7 } else { 5 }).ue(0);
        w.u(4, (frame_num & 0xF) as u64);
        if idr {
            w.ue(0);
        }
        if self.pic_order_cnt_type == 0 {
            w.u(8, (pic_order_cnt_lsb & 0xFF) as u64);
        }
        w.filler(self.slice_payload);
        let header = if idr { 0x65 } else { 0x41 };
        nal(&[header], &w.finish())
    }

    /// `avcC` payload with one SPS and one PPS and 4-byte lengths.
    pub fn avcc(&self) -> Vec<u8> {
        let sps = self.sps();
        let pps = self.pps();
        let mut out = vec![1, self.profile_idc, 0, self.level_idc, 0xFF, 0xE1];
        out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        out.extend_from_slice(&sps);
        out.push(1);
        out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        out.extend_from_slice(&pps);
        out
    }
}

/// Parameters of a synthetic HEVC stream.
#[derive(Debug, Clone)]
pub struct HevcStream {
    /// Output (cropped) size; must be even.
    pub width: u32,
    pub height: u32,
    pub level_idc: u8,
    pub slice_payload: usize,
}

impl HevcStream {
    /// Main profile, 4:2:0, 8x8 minimum CB, 64x64 CTB, 8-bit POC LSB.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            level_idc: 120,
            slice_payload: 48,
        }
    }

    fn header(nal_type: u8) -> [u8; 2] {
        [nal_type << 1, 0x01]
    }

    fn profile_tier_level(&self, w: &mut RbspWriter) {
        w.u(2, 0).flag(false).u(5, 1);
        w.u(32, 0x6000_0000);
        w.flag(true).flag(false).flag(false).flag(true);
        w.u(32, 0).u(12, 0);
        w.u(8, self.level_idc as u64);
    }

    pub fn vps(&self) -> Vec<u8> {
        let mut w = RbspWriter::new();
        w.u(4, 0).flag(true).flag(true).u(6, 0).u(3, 0).flag(true);
        w.u(16, 0xFFFF);
        self.profile_tier_level(&mut w);
        w.flag(true).ue(4).ue(2).ue(0);
        w.u(6, 0).ue(0).flag(false).flag(false);
        nal(&Self::header(32), &w.finish())
    }

    pub fn sps(&self) -> Vec<u8> {
        let coded_w = self.width.div_ceil(8) * 8;
        let coded_h = self.height.div_ceil(8) * 8;
        let mut w = RbspWriter::new();
        w.u(4, 0).u(3, 0).flag(true);
        self.profile_tier_level(&mut w);
        w.ue(0).ue(1).ue(coded_w).ue(coded_h);
        let window = coded_w != self.width || coded_h != self.height;
        w.flag(window);
        if window {
            w.ue(0)
                .ue((coded_w - self.width) / 2)
                .ue(0)
                .ue((coded_h - self.height) / 2);
        }
        w.ue(0).ue(0).ue(4);
        w.flag(true).ue(4).ue(2).ue(0);
        // min CB 8, CTB 64, TB 4..32, hierarchy depths
        w.ue(0).ue(3).ue(0).ue(3).ue(0).ue(0);
        w.flag(false); // scaling_list_enabled_flag
        w.flag(true).flag(true).flag(false); // amp, sao, pcm
        w.ue(0); // num_short_term_ref_pic_sets
        w.flag(false); // long_term_ref_pics_present_flag
        w.flag(true).flag(true); // temporal mvp, strong intra smoothing
        w.flag(false).flag(false); // vui, sps extension
        nal(&Self::header(33), &w.finish())
    }

    pub fn pps(&self) -> Vec<u8> {
        let mut w = RbspWriter::new();
        w.ue(0).ue(0).flag(false).flag(false).u(3, 0);
        w.flag(false).flag(false).ue(0).ue(0).se(0);
        w.flag(false).flag(false).flag(false);
        w.se(0).se(0);
        w.flag(false).flag(false).flag(false).flag(false);
        w.flag(false).flag(false); // tiles, entropy sync
        w.flag(true).flag(false); // loop filter across slices, deblocking control
        w.flag(false).flag(false).ue(0).flag(false).flag(false);
        nal(&Self::header(34), &w.finish())
    }

    /// A single-segment picture of `nal_type`. IRAP types are I slices,
    /// others P slices.
    pub fn slice(&self, nal_type: u8, pic_order_cnt_lsb: u32) -> Vec<u8> {
        let irap = (16..=23).contains(&nal_type);
        let mut w = RbspWriter::new();
        w.flag(true);
        if irap {
            w.flag(false);
        }
        w.ue(0);
        w.ue(if irap { 2 } else { 1 });
        if !matches!(nal_type, 19 | 20) {
            w.u(8, (pic_order_cnt_lsb & 0xFF) as u64);
        }
        w.filler(self.slice_payload);
        nal(&Self::header(nal_type), &w.finish())
    }

    /// `hvcC` payload with VPS, SPS and PPS arrays and 4-byte lengths.
    pub fn hvcc(&self) -> Vec<u8> {
        let mut out = vec![1, 0x01, 0x60, 0, 0, 0, 0x90, 0, 0, 0, 0, 0, self.level_idc];
        out.extend_from_slice(&[0xF0, 0x00, 0xFC, 0xFD, 0xF8, 0xF8, 0x00, 0x00, 0x0F, 3]);
        for (nal_type, unit) in [(32u8, self.vps()), (33, self.sps()), (34, self.pps())] {
            out.push(0x80 | nal_type);
            out.extend_from_slice(&1u16.to_be_bytes());
            out.extend_from_slice(&(unit.len() as u16).to_be_bytes());
            out.extend_from_slice(&unit);
        }
        out
    }
}

fn sei_nal(codec: Codec, payload_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut rbsp = vec![payload_type, payload.len() as u8];
    rbsp.extend_from_slice(payload);
    rbsp.push(0x80);
    match codec {
        Codec::H264 => nal(&[0x06], &rbsp),
        Codec::Hevc => nal(&HevcStream::header(39), &rbsp),
    }
}

/// A display orientation SEI unit (payload type 47).
pub fn sei_display_orientation(codec: Codec, o: DisplayOrientation) -> Vec<u8> {
    let mut w = RbspWriter::new();
    w.flag(o.cancel);
    if !o.cancel {
        w.flag(o.horizontal_flip)
            .flag(o.vertical_flip)
            .u(16, o.anticlockwise_rotation as u64);
        match codec {
            Codec::H264 => w.ue(0),
            Codec::Hevc => w.flag(true),
        };
        w.flag(false);
    }
    w.align_with_one();
    sei_nal(codec, 47, &w.into_bytes())
}

/// A recovery point SEI unit (payload type 6) with exact match set.
pub fn sei_recovery_point(codec: Codec, count: i32) -> Vec<u8> {
    let mut w = RbspWriter::new();
    match codec {
        Codec::H264 => w.ue(count.max(0) as u32).flag(true).flag(false).u(2, 0),
        Codec::Hevc => w.se(count).flag(true).flag(false),
    };
    w.align_with_one();
    sei_nal(codec, 6, &w.into_bytes())
}
