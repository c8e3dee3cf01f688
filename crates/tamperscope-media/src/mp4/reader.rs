//! Box tree reader.

use std::io::{Read, Seek, SeekFrom};

use tracing::{trace, warn};

use super::boxes::{BoxBody, BoxTree, ByteRange, FourCc, Mp4Box};
use crate::error::{Error, Result, StructuralError, StructuralErrorKind};

/// Maximum payload size (64 MB) loaded into memory for a single read.
pub const MAX_PAYLOAD_SIZE: u64 = 64 * 1024 * 1024;

/// Nesting limit; deeper containers are kept as opaque leaves.
const MAX_DEPTH: u32 = 32;

/// Boxes whose payload is a plain list of child boxes.
const CONTAINERS: &[&[u8; 4]] = &[
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"edts", b"dinf", b"udta", b"mvex", b"moof",
    b"traf", b"mfra", b"sinf", b"schi", b"tref", b"ilst", b"gmhd", b"tapt", b"wave",
];

/// Full boxes whose version/flags and entry count precede their children.
const ENTRY_CONTAINERS: &[&[u8; 4]] = &[b"stsd", b"dref"];

/// Visual sample entries: 78 bytes of fixed fields before child boxes.
const VISUAL_ENTRIES: &[&[u8; 4]] = &[
    b"avc1", b"avc2", b"avc3", b"avc4", b"hvc1", b"hev1", b"dvh1", b"dvhe", b"dva1", b"dvav",
    b"encv", b"mp4v", b"apcn", b"apch", b"apcs", b"ap4h",
];

/// Audio sample entries: 28 bytes of fixed fields (version 0).
const AUDIO_ENTRIES: &[&[u8; 4]] = &[
    b"mp4a", b"enca", b"ac-3", b"ec-3", b"alac", b"lpcm", b"sowt", b"twos", b"Opus", b"fLaC",
];

/// Leaves with a known layout.
const KNOWN_LEAVES: &[&[u8; 4]] = &[
    b"ftyp", b"mdat", b"free", b"skip", b"wide", b"pdin", b"mvhd", b"tkhd", b"mdhd", b"hdlr",
    b"vmhd", b"smhd", b"nmhd", b"gmin", b"elst", b"stts", b"stss", b"stsc", b"stsz", b"stz2",
    b"stco", b"co64", b"ctts", b"cslg", b"sdtp", b"sgpd", b"sbgp", b"stps", b"url ", b"urn ",
    b"alis", b"mfhd", b"tfhd", b"tfdt", b"trun", b"trex", b"mehd", b"tfra", b"mfro", b"keys",
    b"data", b"avcC", b"hvcC", b"esds", b"dac3", b"dec3", b"colr", b"pasp", b"clap", b"btrt",
    b"fiel", b"frma", b"schm", b"tenc", b"pssh", b"saiz", b"saio", b"senc", b"chan", b"clef",
    b"prof", b"enof", b"load", b"tmcd", b"name",
];

/// Shape of a box body, decided from its type and parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Container,
    Meta,
    EntryContainer,
    SampleEntry { fixed: u64 },
    AudioEntry,
    Data,
    Opaque,
}

fn shape_of(box_type: FourCc, parent: Option<FourCc>) -> Shape {
    let t = &box_type.0;
    if parent == Some(FourCc::STSD) {
        if VISUAL_ENTRIES.contains(&t) {
            return Shape::SampleEntry { fixed: 78 };
        }
        if AUDIO_ENTRIES.contains(&t) {
            return Shape::AudioEntry;
        }
        return Shape::Opaque;
    }
    // Items of an ilst are typed by key index or tag and hold `data` boxes.
    if parent == Some(FourCc::ILST) {
        return Shape::Container;
    }
    if box_type == FourCc::META {
        return Shape::Meta;
    }
    if CONTAINERS.contains(&t) {
        return Shape::Container;
    }
    if ENTRY_CONTAINERS.contains(&t) {
        return Shape::EntryContainer;
    }
    // QuickTime udta text atoms (©xyz, ©day, ...).
    if parent == Some(FourCc::UDTA) && t[0] == 0xA9 {
        return Shape::Data;
    }
    if KNOWN_LEAVES.contains(&t) {
        return Shape::Data;
    }
    Shape::Opaque
}

/// Reads a byte source into a [`BoxTree`] and serves payload reads.
pub struct BoxReader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> BoxReader<R> {
    /// Create a reader over a source of known length.
    pub fn new(reader: R, file_size: u64) -> Self {
        Self { reader, file_size }
    }

    /// Create a reader, measuring the source length by seeking to its end.
    pub fn from_seekable(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, file_size })
    }

    /// Total length of the source.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Parse the whole source into a box tree.
    ///
    /// A root-level structural error stops parsing; boxes read before it are
    /// kept and the error is recorded. Nested errors are recorded and the
    /// enclosing box is kept with a shortened child list.
    pub fn read_tree(&mut self) -> Result<BoxTree> {
        let mut errors = Vec::new();
        let boxes = self.read_boxes(0, self.file_size, 0, None, "/", &mut errors)?;
        if let Some(fatal) = errors.iter().find(|e| e.is_fatal()) {
            warn!("{}", fatal);
        }
        Ok(BoxTree {
            file_size: self.file_size,
            boxes,
            errors,
        })
    }

    /// Read a byte range, refusing ranges above [`MAX_PAYLOAD_SIZE`].
    pub fn read_range(&mut self, range: ByteRange) -> Result<Vec<u8>> {
        self.read_range_limited(range, MAX_PAYLOAD_SIZE)
    }

    /// Read a byte range with an explicit size limit.
    pub fn read_range_limited(&mut self, range: ByteRange, limit: u64) -> Result<Vec<u8>> {
        if range.length > limit {
            return Err(Error::RangeTooLarge {
                offset: range.offset,
                size: range.length,
                limit,
            });
        }
        self.reader.seek(SeekFrom::Start(range.offset))?;
        let mut data = vec![0u8; range.length as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Read the payload of a box (everything after its header).
    pub fn read_payload(&mut self, b: &Mp4Box) -> Result<Vec<u8>> {
        let payload = b.payload();
        if payload.length > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                box_type: b.box_type,
                offset: b.offset,
                size: payload.length,
                limit: MAX_PAYLOAD_SIZE,
            });
        }
        self.read_range(payload)
    }

    fn read_boxes(
        &mut self,
        start: u64,
        end: u64,
        depth: u32,
        parent: Option<FourCc>,
        path: &str,
        errors: &mut Vec<StructuralError>,
    ) -> Result<Vec<Mp4Box>> {
        let mut boxes = Vec::new();
        let mut pos = start;

        let record = |errors: &mut Vec<StructuralError>, offset: u64, kind: StructuralErrorKind| {
            let err = StructuralError {
                offset,
                depth,
                parent: path.to_string(),
                kind,
            };
            if depth > 0 {
                warn!("{}", err);
            }
            errors.push(err);
        };

        while pos < end {
            let remaining = end - pos;
            if remaining < 8 {
                // QuickTime terminates some containers with a zero word.
                if depth > 0 && self.is_zero_padding(pos, remaining)? {
                    break;
                }
                record(errors, pos, StructuralErrorKind::TruncatedHeader { available: remaining });
                break;
            }

            self.reader.seek(SeekFrom::Start(pos))?;
            let mut header = [0u8; 8];
            self.reader.read_exact(&mut header)?;

            let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let box_type = FourCc::from_bytes([header[4], header[5], header[6], header[7]]);

            let (size, mut header_size) = match size {
                1 => {
                    if remaining < 16 {
                        record(errors, pos, StructuralErrorKind::TruncatedLargeSize);
                        break;
                    }
                    let mut ext = [0u8; 8];
                    self.reader.read_exact(&mut ext)?;
                    (u64::from_be_bytes(ext), 16u8)
                }
                0 if depth == 0 => (remaining, 8u8),
                0 => {
                    record(
                        errors,
                        pos,
                        StructuralErrorKind::ZeroSizeNotAtEnd {
                            box_type: box_type.to_string(),
                        },
                    );
                    break;
                }
                n => (n, 8u8),
            };

            if size < header_size as u64 {
                record(
                    errors,
                    pos,
                    StructuralErrorKind::SizeTooSmall {
                        box_type: box_type.to_string(),
                        declared: size,
                    },
                );
                break;
            }
            if size > remaining {
                record(
                    errors,
                    pos,
                    StructuralErrorKind::SizeExceedsParent {
                        box_type: box_type.to_string(),
                        declared: size,
                        available: remaining,
                    },
                );
                break;
            }
            if box_type == FourCc::UUID && size >= header_size as u64 + 16 {
                header_size += 16;
            }

            trace!(offset = pos, size, depth, "box {}", box_type);

            let mut node = Mp4Box {
                box_type,
                offset: pos,
                size,
                header_size,
                body: BoxBody::Opaque {
                    payload: ByteRange::new(pos + header_size as u64, size - header_size as u64),
                },
            };
            node.body = self.read_body(&node, depth, parent, path, errors)?;
            boxes.push(node);

            pos += size;
        }

        Ok(boxes)
    }

    fn read_body(
        &mut self,
        node: &Mp4Box,
        depth: u32,
        parent: Option<FourCc>,
        path: &str,
        errors: &mut Vec<StructuralError>,
    ) -> Result<BoxBody> {
        let payload = node.payload();
        let shape = if depth + 1 >= MAX_DEPTH {
            Shape::Opaque
        } else {
            shape_of(node.box_type, parent)
        };
        let child_path = if path == "/" {
            format!("/{}", node.box_type)
        } else {
            format!("{}/{}", path, node.box_type)
        };
        let end = payload.end();
        let mut children_from = |me: &mut Self, start: u64| {
            me.read_boxes(start, end, depth + 1, Some(node.box_type), &child_path, errors)
        };

        let body = match shape {
            Shape::Container => BoxBody::Container {
                children: children_from(self, payload.offset)?,
            },
            Shape::Meta => {
                // QuickTime `meta` starts directly with `hdlr`; ISO `meta` is a
                // full box.
                let peek = self.peek(payload.offset, payload.length.min(8))?;
                if peek.len() == 8 && &peek[4..8] == b"hdlr" {
                    BoxBody::Container {
                        children: children_from(self, payload.offset)?,
                    }
                } else if peek.len() >= 4 {
                    BoxBody::FullContainer {
                        version: peek[0],
                        flags: u32::from_be_bytes([0, peek[1], peek[2], peek[3]]),
                        children: children_from(self, payload.offset + 4)?,
                    }
                } else {
                    BoxBody::Data { payload }
                }
            }
            Shape::EntryContainer => {
                let peek = self.peek(payload.offset, payload.length.min(8))?;
                if peek.len() < 8 {
                    BoxBody::Data { payload }
                } else {
                    BoxBody::FullContainer {
                        version: peek[0],
                        flags: u32::from_be_bytes([0, peek[1], peek[2], peek[3]]),
                        children: children_from(self, payload.offset + 8)?,
                    }
                }
            }
            Shape::SampleEntry { fixed } => self.sample_entry(payload, fixed, &mut children_from)?,
            Shape::AudioEntry => {
                // Sound description version at offset 8 extends the fixed part.
                let peek = self.peek(payload.offset, payload.length.min(10))?;
                let version = if peek.len() == 10 {
                    u16::from_be_bytes([peek[8], peek[9]])
                } else {
                    0
                };
                let fixed = match version {
                    1 => 44,
                    2 => 64,
                    _ => 28,
                };
                self.sample_entry(payload, fixed, &mut children_from)?
            }
            Shape::Data => BoxBody::Data { payload },
            Shape::Opaque => BoxBody::Opaque { payload },
        };
        Ok(body)
    }

    fn sample_entry<F>(&mut self, payload: ByteRange, fixed: u64, children_from: &mut F) -> Result<BoxBody>
    where
        F: FnMut(&mut Self, u64) -> Result<Vec<Mp4Box>>,
    {
        if payload.length < fixed {
            return Ok(BoxBody::Data { payload });
        }
        Ok(BoxBody::SampleEntry {
            fields: ByteRange::new(payload.offset, fixed),
            children: children_from(self, payload.offset + fixed)?,
        })
    }

    fn peek(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.read_range(ByteRange::new(offset, len))
    }

    fn is_zero_padding(&mut self, offset: u64, len: u64) -> Result<bool> {
        Ok(self.peek(offset, len)?.iter().all(|&b| b == 0))
    }
}
