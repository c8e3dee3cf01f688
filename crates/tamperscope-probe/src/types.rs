//! Core types for bitstream analysis results

use std::fmt;

use serde::Serialize;

/// Video codec handled by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    Hevc,
}

impl Codec {
    /// Map a sample-entry format code to a codec.
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"avc1" | b"avc2" | b"avc3" | b"avc4" | b"dva1" | b"dvav" => Some(Self::H264),
            b"hvc1" | b"hev1" | b"dvh1" | b"dvhe" => Some(Self::Hevc),
            _ => None,
        }
    }

    /// File extension for Annex-B elementary streams.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "h265",
        }
    }

    /// Name understood by `ffmpeg -f`.
    pub fn ffmpeg_format(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
        }
    }

    /// Size of the NAL unit header in bytes.
    pub fn nal_header_size(&self) -> usize {
        match self {
            Self::H264 => 1,
            Self::Hevc => 2,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "H.264/AVC"),
            Self::Hevc => write!(f, "H.265/HEVC"),
        }
    }
}

/// Broad class of a NAL unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NalClass {
    ParameterSet,
    Slice,
    Sei,
    Other,
}

/// One NAL unit located in a byte range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitstreamUnit {
    /// Codec-specific `nal_unit_type`.
    pub nal_type: u8,
    pub class: NalClass,
    /// Absolute offset of the unit's header (after any length prefix).
    pub offset: u64,
    /// Unit length in bytes, header included.
    pub length: u64,
    /// `nal_ref_idc != 0` (H.264) or a non sub-layer-non-reference type (HEVC).
    pub is_reference: bool,
    /// Cropped picture size, for SPS units.
    pub dimensions: Option<Dimensions>,
}

/// Picture size in luma samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width and height exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Samples removed from each edge by frame cropping / conformance window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CropWindow {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropWindow {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

/// Slice coding type, normalized across codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

/// Sequence-level parameters shared by both codecs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceInfo {
    pub codec: Codec,
    pub sps_id: u32,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    /// Decoded size before cropping.
    pub coded: Dimensions,
    /// Output size after cropping.
    pub cropped: Dimensions,
    /// Crop in luma samples.
    pub crop: CropWindow,
    /// Block size the coded size is aligned to (16 for AVC macroblocks,
    /// minimum coding block for HEVC).
    pub alignment: u32,
}

impl SequenceInfo {
    /// Whether cropping removes more than the padding needed to reach the
    /// coded block alignment.
    pub fn crops_beyond_alignment(&self) -> bool {
        let pad = |coded: u32, cropped: u32| -> bool {
            let aligned = cropped.div_ceil(self.alignment.max(1)) * self.alignment.max(1);
            coded > aligned
        };
        self.crop.left != 0
            || self.crop.top != 0
            || pad(self.coded.width, self.cropped.width)
            || pad(self.coded.height, self.cropped.height)
    }
}

/// Display orientation SEI (payload type 47).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayOrientation {
    pub cancel: bool,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    /// Anticlockwise rotation in units of 360/65536 degrees.
    pub anticlockwise_rotation: u16,
}

impl DisplayOrientation {
    /// Rotation converted to clockwise degrees, rounded.
    pub fn clockwise_degrees(&self) -> u16 {
        let acw = (self.anticlockwise_rotation as u32 * 360 + 32768) / 65536;
        ((360 - acw % 360) % 360) as u16
    }
}

/// Recovery point SEI (payload type 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryPoint {
    /// `recovery_frame_cnt` (H.264) or `recovery_poc_cnt` (HEVC).
    pub count: i32,
    pub exact_match: bool,
    pub broken_link: bool,
}

/// First-slice facts about one coded picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PictureInfo {
    pub codec: Codec,
    /// NAL type of the first slice.
    pub nal_type: u8,
    pub slice_type: SliceType,
    /// IDR (H.264) or IRAP (HEVC).
    pub is_sync: bool,
    pub is_reference: bool,
    pub pps_id: u32,
    pub sps_id: u32,
    /// The first slice has `first_mb_in_slice == 0` /
    /// `first_slice_segment_in_pic_flag`.
    pub first_slice: bool,
    /// `frame_num` (H.264 only).
    pub frame_num: Option<u32>,
    /// `pic_order_cnt_type` (H.264 only).
    pub pic_order_cnt_type: Option<u32>,
    /// `pic_order_cnt_lsb`, when present in the slice header.
    pub pic_order_cnt_lsb: Option<u32>,
    pub sequence: SequenceInfo,
}

impl PictureInfo {
    pub fn dimensions(&self) -> Dimensions {
        self.sequence.cropped
    }

    /// The picture carries a non-zero picture order / frame number, so it is
    /// not the first picture of a coded video sequence.
    pub fn starts_mid_sequence(&self) -> bool {
        match (self.codec, self.pic_order_cnt_type) {
            (Codec::H264, Some(2)) => self.frame_num.unwrap_or(0) != 0,
            (Codec::H264, Some(0)) => self.pic_order_cnt_lsb.unwrap_or(0) != 0,
            (Codec::H264, _) => self.frame_num.unwrap_or(0) != 0,
            (Codec::Hevc, _) => self.pic_order_cnt_lsb.unwrap_or(0) != 0,
        }
    }
}
