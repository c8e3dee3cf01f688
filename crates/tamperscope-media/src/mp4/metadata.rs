//! QuickTime and iTunes-style metadata.
//!
//! Editing applications leave their names and settings behind in `udta`
//! text atoms and in `meta/keys` + `ilst` items (for example
//! `com.apple.quicktime.software`). These values are reported verbatim.

use std::io::{Read, Seek};

use serde::Serialize;

use super::boxes::{BoxBody, FourCc, Mp4Box};
use super::fields::Fields;
use super::reader::BoxReader;
use crate::error::Result;

/// Where an item was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// `udta` text atom (`©xyz`, `©too`, ...).
    UserData,
    /// `udta/meta/ilst` item keyed by atom type.
    ItemList,
    /// `meta/keys` + `ilst` item keyed by reverse-DNS name.
    Keys,
}

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataItem {
    pub source: MetadataSource,
    pub key: String,
    pub value: String,
}

/// Collect movie-level metadata from a `moov` box.
pub fn read_metadata<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    moov: &Mp4Box,
) -> Result<Vec<MetadataItem>> {
    let mut items = Vec::new();

    if let Some(udta) = moov.child(FourCc::UDTA) {
        for child in udta.children() {
            if child.box_type.0[0] == 0xA9 {
                let data = reader.read_payload(child)?;
                if let Some(value) = parse_text_atom(&data) {
                    items.push(MetadataItem {
                        source: MetadataSource::UserData,
                        key: child.box_type.to_string(),
                        value,
                    });
                }
            }
        }
        if let Some(ilst) = udta.find(&[FourCc::META, FourCc::ILST]) {
            for item in ilst.children() {
                if let Some(value) = read_data_value(reader, item)? {
                    items.push(MetadataItem {
                        source: MetadataSource::ItemList,
                        key: item.box_type.to_string(),
                        value,
                    });
                }
            }
        }
    }

    if let Some(meta) = moov.child(FourCc::META) {
        let keys = match meta.child(FourCc::KEYS) {
            Some(keys) => parse_keys(&reader.read_payload(keys)?),
            None => Vec::new(),
        };
        if let Some(ilst) = meta.child(FourCc::ILST) {
            for item in ilst.children() {
                let index = u32::from_be_bytes(item.box_type.0) as usize;
                let key = match index.checked_sub(1).and_then(|i| keys.get(i)) {
                    Some(name) => name.clone(),
                    None => item.box_type.to_string(),
                };
                if let Some(value) = read_data_value(reader, item)? {
                    items.push(MetadataItem {
                        source: MetadataSource::Keys,
                        key,
                        value,
                    });
                }
            }
        }
    }

    Ok(items)
}

fn read_data_value<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    item: &Mp4Box,
) -> Result<Option<String>> {
    let Some(data_box) = item.child(FourCc::DATA) else {
        return Ok(None);
    };
    if !matches!(data_box.body, BoxBody::Data { .. }) {
        return Ok(None);
    }
    let data = reader.read_payload(data_box)?;
    Ok(parse_data_payload(&data))
}

/// Decode a `©xyz` text atom: 16-bit length, 16-bit language, text.
pub fn parse_text_atom(data: &[u8]) -> Option<String> {
    // Some writers nest an iTunes `data` box instead.
    if data.len() >= 16 && &data[4..8] == b"data" {
        return parse_data_payload(&data[8..]);
    }
    let mut f = Fields::new(data);
    let len = f.u16()? as usize;
    f.skip(2)?;
    let text = f.bytes(len.min(f.remaining()))?;
    Some(String::from_utf8_lossy(text).trim_end_matches('\0').to_string())
}

/// Decode the payload of a `data` box according to its well-known type.
pub fn parse_data_payload(data: &[u8]) -> Option<String> {
    let mut f = Fields::new(data);
    let type_code = f.u32()? & 0x00FF_FFFF;
    f.skip(4)?;
    let value = f.rest();
    let text = match type_code {
        1 => String::from_utf8_lossy(value).into_owned(),
        2 => {
            let units: Vec<u16> = value
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        21 => match value.len() {
            1 => (value[0] as i8).to_string(),
            2 => i16::from_be_bytes([value[0], value[1]]).to_string(),
            4 => i32::from_be_bytes(value.try_into().ok()?).to_string(),
            8 => i64::from_be_bytes(value.try_into().ok()?).to_string(),
            _ => hex(value),
        },
        22 => match value.len() {
            1 => value[0].to_string(),
            2 => u16::from_be_bytes([value[0], value[1]]).to_string(),
            4 => u32::from_be_bytes(value.try_into().ok()?).to_string(),
            8 => u64::from_be_bytes(value.try_into().ok()?).to_string(),
            _ => hex(value),
        },
        23 if value.len() == 4 => f32::from_be_bytes(value.try_into().ok()?).to_string(),
        24 if value.len() == 8 => f64::from_be_bytes(value.try_into().ok()?).to_string(),
        _ => hex(value),
    };
    Some(text)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().take(64).map(|b| format!("{:02x}", b)).collect()
}

/// Parse a `keys` payload into key names (1-based in `ilst`).
pub fn parse_keys(data: &[u8]) -> Vec<String> {
    let mut f = Fields::new(data);
    let mut keys = Vec::new();
    if f.version_flags().is_none() {
        return keys;
    }
    let Some(count) = f.u32() else {
        return keys;
    };
    for _ in 0..count {
        let Some(size) = f.u32() else { break };
        let Some(_namespace) = f.bytes(4) else { break };
        let Some(name) = (size as usize).checked_sub(8).and_then(|n| f.bytes(n)) else {
            break;
        };
        keys.push(String::from_utf8_lossy(name).into_owned());
    }
    keys
}
