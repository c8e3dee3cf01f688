//! NAL unit framing: length-prefixed (MP4 samples) and Annex-B byte streams.

use serde::Serialize;

use crate::error::BitstreamErrorKind;

/// How NAL units are delimited in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NalFormat {
    /// Start-code delimited (`00 00 01`).
    AnnexB,
    /// Big-endian length prefix of 1, 2 or 4 bytes.
    LengthPrefixed(u8),
}

/// Byte range of one NAL unit (header included, prefix excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalRange {
    pub start: usize,
    pub end: usize,
}

impl NalRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }
}

/// Units found in a buffer, and where framing stopped if it did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NalSplit {
    pub units: Vec<NalRange>,
    /// Position and cause of the first framing error. Units after it are
    /// not listed.
    pub error: Option<(usize, BitstreamErrorKind)>,
}

impl NalSplit {
    /// Framing stopped because a unit or prefix runs past the buffer end.
    pub fn is_truncated(&self) -> bool {
        matches!(self.error, Some((_, BitstreamErrorKind::LengthOverrun { .. })))
    }
}

/// Read a big-endian length prefix of `size` bytes.
pub fn read_length(data: &[u8], size: u8) -> Option<u64> {
    let size = size as usize;
    if !matches!(size, 1 | 2 | 4) || data.len() < size {
        return None;
    }
    Some(
        data[..size]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64),
    )
}

/// Split length-prefixed units.
pub fn split_length_prefixed(data: &[u8], length_size: u8) -> NalSplit {
    let mut split = NalSplit::default();
    let prefix = length_size as usize;
    if !matches!(prefix, 1 | 2 | 4) {
        split.error = Some((0, BitstreamErrorKind::Unsupported("NAL length size")));
        return split;
    }

    let mut pos = 0usize;
    while pos < data.len() {
        let Some(length) = read_length(&data[pos..], length_size) else {
            split.error = Some((
                pos,
                BitstreamErrorKind::LengthOverrun {
                    declared: prefix as u64,
                    available: (data.len() - pos) as u64,
                },
            ));
            break;
        };
        let start = pos + prefix;
        let available = (data.len() - start) as u64;
        if length == 0 {
            split.error = Some((pos, BitstreamErrorKind::EmptyUnit));
            break;
        }
        if length > available {
            split.error = Some((
                pos,
                BitstreamErrorKind::LengthOverrun {
                    declared: length,
                    available,
                },
            ));
            break;
        }
        let end = start + length as usize;
        split.units.push(NalRange { start, end });
        pos = end;
    }
    split
}

/// Position just after each start code in `data`.
fn start_codes(data: &[u8]) -> Vec<usize> {
    let mut found = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            found.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }
    found
}

/// Split an Annex-B byte stream. Bytes before the first start code are
/// ignored; trailing zero bytes of each unit belong to the next start code.
pub fn split_annex_b(data: &[u8]) -> NalSplit {
    let starts = start_codes(data);
    let mut split = NalSplit::default();
    for (i, &start) in starts.iter().enumerate() {
        let mut end = match starts.get(i + 1) {
            Some(&next) => next - 3,
            None => data.len(),
        };
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            split.units.push(NalRange { start, end });
        }
    }
    split
}

/// Split `data` according to `format`.
pub fn split(data: &[u8], format: NalFormat) -> NalSplit {
    match format {
        NalFormat::AnnexB => split_annex_b(data),
        NalFormat::LengthPrefixed(size) => split_length_prefixed(data, size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefixed() {
        let data = [0, 0, 0, 2, 0x65, 0x88, 0, 0, 0, 1, 0x06];
        let split = split_length_prefixed(&data, 4);
        assert_eq!(split.error, None);
        assert_eq!(
            split.units,
            vec![NalRange { start: 4, end: 6 }, NalRange { start: 10, end: 11 }]
        );
    }

    #[test]
    fn test_length_overrun() {
        let data = [0, 0, 0, 2, 0x65, 0x88, 0, 0, 0, 9, 0x41, 0x9A];
        let split = split_length_prefixed(&data, 4);
        assert_eq!(split.units.len(), 1);
        assert!(split.is_truncated());
        assert_eq!(
            split.error,
            Some((
                6,
                BitstreamErrorKind::LengthOverrun {
                    declared: 9,
                    available: 2
                }
            ))
        );
    }

    #[test]
    fn test_empty_unit() {
        let split = split_length_prefixed(&[0, 0, 0, 0, 0, 0], 2);
        assert_eq!(split.error, Some((0, BitstreamErrorKind::EmptyUnit)));
        assert!(!split.is_truncated());
    }

    #[test]
    fn test_annex_b() {
        let data = [
            0xFF, 0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68, 0xCE, 0, 0, 0, 1, 0x65, 0x88, 0x80,
        ];
        let split = split_annex_b(&data);
        let units: Vec<&[u8]> = split.units.iter().map(|u| u.slice(&data)).collect();
        assert_eq!(units, vec![&[0x67, 0x42][..], &[0x68, 0xCE], &[0x65, 0x88, 0x80]]);
    }

    #[test]
    fn test_read_length() {
        assert_eq!(read_length(&[0x01, 0x02], 2), Some(0x0102));
        assert_eq!(read_length(&[0x01], 2), None);
        assert_eq!(read_length(&[0x01, 0x02, 0x03], 3), None);
    }
}
