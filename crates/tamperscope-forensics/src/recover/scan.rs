//! Finding NAL unit chains in unframed bytes.
//!
//! A gap has no sample table, so unit boundaries are guessed: at each
//! position the bytes are read as a length prefix followed by a NAL header,
//! and accepted only when both are plausible for the codec. Anything else is
//! skipped one byte at a time and reported as a rejected run.

use std::ops::Range;

use tamperscope_probe::codec::nal::{read_length, split_annex_b, NalRange};
use tamperscope_probe::codec::{begins_picture, h264, hevc, precedes_picture, unit_header};
use tamperscope_probe::{Codec, NalClass, NalFormat};

/// Units of one contiguous run of plausible NAL units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    pub units: Vec<NalRange>,
    /// The last unit's declared length runs past the end of the data.
    pub truncated: bool,
}

/// Result of scanning one buffer with one framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub codec: Codec,
    pub format: NalFormat,
    pub chains: Vec<Chain>,
    /// Byte runs with no plausible unit, with a reason.
    pub rejected: Vec<(Range<usize>, &'static str)>,
    /// Bytes covered by accepted units and their prefixes.
    pub matched: usize,
}

/// Whether a NAL header could start a unit of a recoverable stream.
pub fn plausible_header(codec: Codec, unit: &[u8]) -> bool {
    match codec {
        Codec::H264 => {
            let Ok(h) = h264::NalHeader::parse(unit) else {
                return false;
            };
            match h.nal_type {
                1 => true,
                // IDR slices and parameter sets are always reference units.
                5 | 7 | 8 => h.nal_ref_idc != 0,
                // SEI, delimiters and end markers never are.
                6 | 9..=12 => h.nal_ref_idc == 0,
                _ => false,
            }
        }
        Codec::Hevc => {
            let Ok(h) = hevc::NalHeader::parse(unit) else {
                return false;
            };
            h.nuh_layer_id == 0 && matches!(h.nal_type, 0..=9 | 16..=21 | 32..=40)
        }
    }
}

/// Scan for length-prefixed units.
pub fn scan_length_prefixed(data: &[u8], codec: Codec, length_size: u8) -> Scan {
    let prefix = length_size as usize;
    let header = codec.nal_header_size();
    let mut scan = Scan {
        codec,
        format: NalFormat::LengthPrefixed(length_size),
        chains: Vec::new(),
        rejected: Vec::new(),
        matched: 0,
    };
    let mut chain = Chain::default();
    let mut unmatched: Option<usize> = None;
    let mut pos = 0usize;

    while pos < data.len() {
        let found = read_length(&data[pos..], length_size)
            .filter(|&length| length as usize > header)
            .and_then(|length| {
                let start = pos + prefix;
                let unit = data.get(start..(start + header).min(data.len()))?;
                if unit.len() < header || !plausible_header(codec, unit) {
                    return None;
                }
                let end = start.saturating_add(length as usize);
                Some((start, end))
            });

        let Some((start, end)) = found else {
            if unmatched.is_none() {
                close_chain(&mut scan, &mut chain);
                unmatched = Some(pos);
            }
            pos += 1;
            continue;
        };

        if let Some(from) = unmatched.take() {
            reject(&mut scan, data, from..pos);
        }
        if end > data.len() {
            chain.units.push(NalRange {
                start,
                end: data.len(),
            });
            chain.truncated = true;
            scan.matched += data.len() - pos;
            pos = data.len();
        } else {
            chain.units.push(NalRange { start, end });
            scan.matched += end - pos;
            pos = end;
        }
    }

    if let Some(from) = unmatched {
        reject(&mut scan, data, from..data.len());
    }
    close_chain(&mut scan, &mut chain);
    scan
}

/// Scan for start-code delimited units.
pub fn scan_annex_b(data: &[u8], codec: Codec) -> Scan {
    let mut scan = Scan {
        codec,
        format: NalFormat::AnnexB,
        chains: Vec::new(),
        rejected: Vec::new(),
        matched: 0,
    };
    let mut chain = Chain::default();
    let mut covered = 0usize;

    for unit in split_annex_b(data).units {
        if unit.len() <= codec.nal_header_size() || !plausible_header(codec, unit.slice(data)) {
            continue;
        }
        let from = unit.start.saturating_sub(3);
        // Zero bytes between units are start code padding.
        if from > covered && data[covered..from].iter().any(|&b| b != 0) {
            close_chain(&mut scan, &mut chain);
            reject(&mut scan, data, covered..from);
        }
        chain.units.push(unit);
        scan.matched += unit.end - from;
        covered = unit.end;
    }
    if covered < data.len() {
        close_chain(&mut scan, &mut chain);
        let trailing = &data[covered..];
        // Trailing zeros of the last unit belong to the stream.
        if trailing.iter().any(|&b| b != 0) || scan.chains.is_empty() {
            reject(&mut scan, data, covered..data.len());
        }
    }
    close_chain(&mut scan, &mut chain);
    scan
}

fn close_chain(scan: &mut Scan, chain: &mut Chain) {
    if !chain.units.is_empty() {
        scan.chains.push(std::mem::take(chain));
    }
}

fn reject(scan: &mut Scan, data: &[u8], run: Range<usize>) {
    if run.is_empty() {
        return;
    }
    let reason = if data[run.clone()].iter().all(|&b| b == 0) {
        "zero fill"
    } else {
        "no plausible NAL unit"
    };
    scan.rejected.push((run, reason));
}

/// Units of one access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub units: Vec<NalRange>,
    pub truncated: bool,
}

/// Split a chain into access units: a new one starts at the first
/// prefix unit or first slice of a picture after a slice has been seen.
pub fn access_units(data: &[u8], codec: Codec, chain: &Chain) -> Vec<AccessUnit> {
    let mut out = Vec::new();
    let mut current: Vec<NalRange> = Vec::new();
    let mut seen_slice = false;

    for unit in &chain.units {
        let bytes = unit.slice(data);
        if seen_slice && (precedes_picture(codec, bytes) || begins_picture(codec, bytes)) {
            out.push(AccessUnit {
                units: std::mem::take(&mut current),
                truncated: false,
            });
            seen_slice = false;
        }
        if unit_header(codec, bytes).is_ok_and(|h| h.class == NalClass::Slice) {
            seen_slice = true;
        }
        current.push(*unit);
    }
    if !current.is_empty() {
        out.push(AccessUnit {
            units: current,
            truncated: chain.truncated,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamperscope_probe::synth::{annex_b, length_prefixed, AvcStream};

    #[test]
    fn test_plausible_header() {
        assert!(plausible_header(Codec::H264, &[0x65]));
        assert!(plausible_header(Codec::H264, &[0x41]));
        assert!(!plausible_header(Codec::H264, &[0x05]));
        assert!(!plausible_header(Codec::H264, &[0x00]));
        assert!(!plausible_header(Codec::H264, &[0xE5]));
        assert!(plausible_header(Codec::Hevc, &[0x26, 0x01]));
        // nuh_layer_id 1
        assert!(!plausible_header(Codec::Hevc, &[0x26, 0x09]));
        // temporal id zero
        assert!(!plausible_header(Codec::Hevc, &[0x26, 0x00]));
    }

    #[test]
    fn test_length_prefixed_chain_with_junk() {
        let avc = AvcStream::new(320, 240);
        let frame = length_prefixed(&[avc.slice(true, 0, 0)], 4);
        let mut data = vec![0u8; 16];
        data.extend_from_slice(&frame);
        data.extend_from_slice(&[0xFF; 5]);

        let scan = scan_length_prefixed(&data, Codec::H264, 4);
        assert_eq!(scan.chains.len(), 1);
        assert_eq!(scan.chains[0].units.len(), 1);
        assert!(!scan.chains[0].truncated);
        assert_eq!(scan.matched, frame.len());
        assert_eq!(scan.rejected.len(), 2);
        assert_eq!(scan.rejected[0], (0..16, "zero fill"));
        assert_eq!(scan.rejected[1].1, "no plausible NAL unit");
        assert_eq!(scan.rejected[1].0.end, data.len());
    }

    #[test]
    fn test_truncated_tail() {
        let avc = AvcStream::new(320, 240);
        let mut data = length_prefixed(&[avc.slice(true, 0, 0)], 4);
        data.truncate(data.len() - 10);

        let scan = scan_length_prefixed(&data, Codec::H264, 4);
        assert_eq!(scan.chains.len(), 1);
        assert!(scan.chains[0].truncated);
        assert_eq!(scan.chains[0].units[0].end, data.len());
        assert!(scan.rejected.is_empty());
    }

    #[test]
    fn test_access_units() {
        let avc = AvcStream::new(320, 240);
        let units = vec![
            avc.sps(),
            avc.pps(),
            avc.slice(true, 0, 0),
            avc.slice(false, 1, 2),
            avc.slice(false, 2, 4),
        ];
        let data = length_prefixed(&units, 4);
        let scan = scan_length_prefixed(&data, Codec::H264, 4);
        assert_eq!(scan.chains.len(), 1);

        let aus = access_units(&data, Codec::H264, &scan.chains[0]);
        assert_eq!(aus.len(), 3);
        assert_eq!(aus[0].units.len(), 3);
        assert_eq!(aus[1].units.len(), 1);
    }

    #[test]
    fn test_annex_b_scan() {
        let avc = AvcStream::new(320, 240);
        let mut data = vec![0xAB; 7];
        data.extend(annex_b(&[avc.slice(true, 0, 0), avc.slice(false, 1, 2)]));

        let scan = scan_annex_b(&data, Codec::H264);
        assert_eq!(scan.format, NalFormat::AnnexB);
        assert_eq!(scan.chains.len(), 1);
        assert_eq!(scan.chains[0].units.len(), 2);
        assert_eq!(scan.rejected.len(), 1);
        assert_eq!(scan.rejected[0].1, "no plausible NAL unit");
    }
}
