//! Box tree definitions.
//!
//! Every node keeps its absolute offset and total size so that byte ranges can
//! be reconciled against sample tables later. Leaf payloads are referenced by
//! range and read on demand.

use serde::{Serialize, Serializer};

use crate::error::StructuralError;

/// Four-character box type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STZ2: Self = Self(*b"stz2");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");
    pub const WIDE: Self = Self(*b"wide");
    pub const UDTA: Self = Self(*b"udta");
    pub const META: Self = Self(*b"meta");
    pub const KEYS: Self = Self(*b"keys");
    pub const ILST: Self = Self(*b"ilst");
    pub const DATA: Self = Self(*b"data");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MFRA: Self = Self(*b"mfra");
    pub const SINF: Self = Self(*b"sinf");
    pub const SCHI: Self = Self(*b"schi");
    pub const UUID: Self = Self(*b"uuid");
    pub const AVCC: Self = Self(*b"avcC");
    pub const HVCC: Self = Self(*b"hvcC");
    pub const CLAP: Self = Self(*b"clap");
    pub const PASP: Self = Self(*b"pasp");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Printable form. Bytes are mapped as Latin-1 so QuickTime `©xyz` tags
    /// render as written.
    pub fn to_display_string(&self) -> String {
        self.0.iter().map(|&b| char::from(b)).collect()
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl std::fmt::Debug for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCc({})", self.to_display_string())
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_display_string())
    }
}

/// Absolute byte range within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ByteRange {
    /// First byte.
    pub offset: u64,
    /// Number of bytes.
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Build from a half-open `[start, end)` pair.
    pub fn from_bounds(start: u64, end: u64) -> Self {
        Self {
            offset: start,
            length: end.saturating_sub(start),
        }
    }

    /// One past the last byte.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.offset && pos < self.end()
    }

    /// Whether `other` lies entirely within this range.
    pub fn encloses(&self, other: &ByteRange) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// Overlapping part of two ranges, if any.
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.offset.max(other.offset);
        let end = self.end().min(other.end());
        (start < end).then(|| ByteRange::from_bounds(start, end))
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{})", self.offset, self.end())
    }
}

/// Parsed body of a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoxBody {
    /// Children directly follow the header.
    Container { children: Vec<Mp4Box> },
    /// A version/flags word (and for `stsd`/`dref` an entry count) precedes
    /// the children.
    FullContainer {
        version: u8,
        flags: u32,
        children: Vec<Mp4Box>,
    },
    /// Sample description entry: fixed codec-independent fields, then
    /// child boxes such as `avcC`.
    SampleEntry {
        fields: ByteRange,
        children: Vec<Mp4Box>,
    },
    /// A recognized leaf; payload read on demand.
    Data { payload: ByteRange },
    /// An unrecognized tag, preserved as-is.
    Opaque { payload: ByteRange },
}

/// A node in the box tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mp4Box {
    /// Box type code.
    #[serde(rename = "type")]
    pub box_type: FourCc,
    /// Absolute offset of the size field.
    pub offset: u64,
    /// Size including header.
    pub size: u64,
    /// Header length (8, 16, or +16 for `uuid`).
    pub header_size: u8,
    /// Parsed body.
    pub body: BoxBody,
}

impl Mp4Box {
    /// Full byte range of the box including its header.
    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.offset, self.size)
    }

    /// Byte range after the header.
    pub fn payload(&self) -> ByteRange {
        let header = self.header_size as u64;
        ByteRange::new(self.offset + header, self.size.saturating_sub(header))
    }

    /// Child boxes (empty for leaves).
    pub fn children(&self) -> &[Mp4Box] {
        match &self.body {
            BoxBody::Container { children }
            | BoxBody::FullContainer { children, .. }
            | BoxBody::SampleEntry { children, .. } => children,
            BoxBody::Data { .. } | BoxBody::Opaque { .. } => &[],
        }
    }

    /// Whether the box was parsed as having children.
    pub fn is_container(&self) -> bool {
        matches!(
            self.body,
            BoxBody::Container { .. } | BoxBody::FullContainer { .. } | BoxBody::SampleEntry { .. }
        )
    }

    /// First direct child of the given type.
    pub fn child(&self, box_type: FourCc) -> Option<&Mp4Box> {
        self.children().iter().find(|b| b.box_type == box_type)
    }

    /// All direct children of the given type.
    pub fn children_of(&self, box_type: FourCc) -> impl Iterator<Item = &Mp4Box> {
        self.children().iter().filter(move |b| b.box_type == box_type)
    }

    /// Follow a path of first-matching children.
    pub fn find(&self, path: &[FourCc]) -> Option<&Mp4Box> {
        path.iter().try_fold(self, |node, t| node.child(*t))
    }

    /// Depth-first walk over this box and its descendants.
    pub fn walk(&self) -> BoxWalk<'_> {
        BoxWalk {
            stack: vec![(0, self)],
        }
    }
}

/// Depth-first pre-order iterator over a box subtree.
pub struct BoxWalk<'a> {
    stack: Vec<(u32, &'a Mp4Box)>,
}

impl<'a> Iterator for BoxWalk<'a> {
    type Item = (u32, &'a Mp4Box);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        for child in node.children().iter().rev() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, node))
    }
}

/// Whole-file box structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoxTree {
    /// Total length of the byte source.
    pub file_size: u64,
    /// Top-level boxes in file order.
    pub boxes: Vec<Mp4Box>,
    /// Structural problems found while parsing, in discovery order.
    pub errors: Vec<StructuralError>,
}

impl BoxTree {
    /// The root-level error that ended parsing, if any.
    pub fn fatal_error(&self) -> Option<&StructuralError> {
        self.errors.iter().find(|e| e.is_fatal())
    }

    /// Errors below the top level that were tolerated.
    pub fn nested_errors(&self) -> impl Iterator<Item = &StructuralError> {
        self.errors.iter().filter(|e| !e.is_fatal())
    }

    /// First top-level box of the given type.
    pub fn top(&self, box_type: FourCc) -> Option<&Mp4Box> {
        self.boxes.iter().find(|b| b.box_type == box_type)
    }

    /// All top-level boxes of the given type.
    pub fn top_all(&self, box_type: FourCc) -> impl Iterator<Item = &Mp4Box> {
        self.boxes.iter().filter(move |b| b.box_type == box_type)
    }

    /// Follow a path starting at the top level.
    pub fn find(&self, path: &[FourCc]) -> Option<&Mp4Box> {
        let (first, rest) = path.split_first()?;
        self.top(*first)?.find(rest)
    }

    /// Sum of top-level box sizes.
    pub fn covered_bytes(&self) -> u64 {
        self.boxes.iter().map(|b| b.size).sum()
    }

    /// Depth-first walk over every box in the file.
    pub fn walk(&self) -> impl Iterator<Item = (u32, &Mp4Box)> {
        self.boxes.iter().flat_map(|b| b.walk())
    }

    /// Payload ranges of every top-level `mdat`.
    pub fn media_data_regions(&self) -> Vec<ByteRange> {
        self.top_all(FourCc::MDAT).map(|b| b.payload()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(t: &[u8; 4], offset: u64, size: u64) -> Mp4Box {
        Mp4Box {
            box_type: FourCc(*t),
            offset,
            size,
            header_size: 8,
            body: BoxBody::Data {
                payload: ByteRange::new(offset + 8, size - 8),
            },
        }
    }

    #[test]
    fn test_fourcc_display_latin1() {
        assert_eq!(FourCc(*b"moov").to_string(), "moov");
        assert_eq!(FourCc([0xA9, b'x', b'y', b'z']).to_string(), "©xyz");
    }

    #[test]
    fn test_byte_range_ops() {
        let a = ByteRange::new(100, 50);
        let b = ByteRange::from_bounds(140, 200);
        assert_eq!(a.end(), 150);
        assert!(a.overlaps(&b));
        assert_eq!(a.intersect(&b), Some(ByteRange::new(140, 10)));
        assert!(!a.overlaps(&ByteRange::new(150, 10)));
        assert!(a.encloses(&ByteRange::new(120, 30)));
        assert!(!a.encloses(&ByteRange::new(120, 31)));
    }

    #[test]
    fn test_find_and_walk() {
        let stbl = leaf(b"stbl", 24, 8);
        let trak = Mp4Box {
            box_type: FourCc::TRAK,
            offset: 16,
            size: 16,
            header_size: 8,
            body: BoxBody::Container {
                children: vec![stbl],
            },
        };
        let moov = Mp4Box {
            box_type: FourCc::MOOV,
            offset: 8,
            size: 24,
            header_size: 8,
            body: BoxBody::Container {
                children: vec![trak],
            },
        };
        let tree = BoxTree {
            file_size: 32,
            boxes: vec![leaf(b"free", 0, 8), moov],
            errors: vec![],
        };

        assert_eq!(tree.covered_bytes(), 32);
        let found = tree.find(&[FourCc::MOOV, FourCc::TRAK, FourCc::STBL]);
        assert_eq!(found.map(|b| b.offset), Some(24));

        let order: Vec<(u32, String)> = tree
            .walk()
            .map(|(d, b)| (d, b.box_type.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "free".to_string()),
                (0, "moov".to_string()),
                (1, "trak".to_string()),
                (2, "stbl".to_string()),
            ]
        );
    }
}
