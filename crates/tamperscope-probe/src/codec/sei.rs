//! SEI (Supplemental Enhancement Information) parsing

use crate::codec::rbsp::{ParseResult, RbspReader};
use crate::error::BitstreamErrorKind;
use crate::types::{Codec, DisplayOrientation, RecoveryPoint};

/// SEI payload types we care about
pub const SEI_RECOVERY_POINT: u32 = 6;
pub const SEI_DISPLAY_ORIENTATION: u32 = 47;

/// SEI message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeiMessage {
    RecoveryPoint(RecoveryPoint),
    DisplayOrientation(DisplayOrientation),
    /// Unknown or unhandled payload type
    Other(u32),
}

/// Read a `0xFF`-accumulated value (payload type or size).
fn read_accumulated(rbsp: &[u8], pos: &mut usize, field: &'static str) -> ParseResult<u32> {
    let mut value = 0u32;
    loop {
        let &byte = rbsp
            .get(*pos)
            .ok_or(BitstreamErrorKind::Truncated { field })?;
        *pos += 1;
        value = value.saturating_add(byte as u32);
        if byte != 0xFF {
            return Ok(value);
        }
    }
}

/// Parse the messages of an SEI RBSP (NAL header removed).
pub fn parse_sei(rbsp: &[u8], codec: Codec) -> ParseResult<Vec<SeiMessage>> {
    let mut messages = Vec::new();
    let mut pos = 0;

    // Stop at rbsp_trailing_bits.
    while pos < rbsp.len() && rbsp[pos] != 0x80 {
        let payload_type = read_accumulated(rbsp, &mut pos, "last_payload_type_byte")?;
        let payload_size = read_accumulated(rbsp, &mut pos, "last_payload_size_byte")? as usize;
        let payload = rbsp
            .get(pos..pos + payload_size)
            .ok_or(BitstreamErrorKind::Truncated {
                field: "sei_payload",
            })?;
        pos += payload_size;

        let message = match payload_type {
            SEI_DISPLAY_ORIENTATION => {
                SeiMessage::DisplayOrientation(parse_display_orientation(payload)?)
            }
            SEI_RECOVERY_POINT => SeiMessage::RecoveryPoint(parse_recovery_point(payload, codec)?),
            other => SeiMessage::Other(other),
        };
        messages.push(message);
    }

    Ok(messages)
}

/// Display orientation: a cancel flag, flips, and a 16-bit anticlockwise rotation.
fn parse_display_orientation(payload: &[u8]) -> ParseResult<DisplayOrientation> {
    let mut r = RbspReader::new(payload);
    let cancel = r.flag("display_orientation_cancel_flag")?;
    if cancel {
        return Ok(DisplayOrientation {
            cancel,
            horizontal_flip: false,
            vertical_flip: false,
            anticlockwise_rotation: 0,
        });
    }
    Ok(DisplayOrientation {
        cancel,
        horizontal_flip: r.flag("hor_flip")?,
        vertical_flip: r.flag("ver_flip")?,
        anticlockwise_rotation: r.u(16, "anticlockwise_rotation")? as u16,
    })
}

fn parse_recovery_point(payload: &[u8], codec: Codec) -> ParseResult<RecoveryPoint> {
    let mut r = RbspReader::new(payload);
    let count = match codec {
        Codec::H264 => {
            let frames = r.ue_max("recovery_frame_cnt", i32::MAX as u32)?;
            frames as i32
        }
        Codec::Hevc => r.se("recovery_poc_cnt")?,
    };
    Ok(RecoveryPoint {
        count,
        exact_match: r.flag("exact_match_flag")?,
        broken_link: r.flag("broken_link_flag")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rbsp::remove_emulation_prevention;
    use crate::synth;

    #[test]
    fn test_display_orientation_message() {
        let orientation = DisplayOrientation {
            cancel: false,
            horizontal_flip: true,
            vertical_flip: false,
            anticlockwise_rotation: 0x4000,
        };
        let nal = synth::sei_display_orientation(Codec::Hevc, orientation);
        let messages = parse_sei(&remove_emulation_prevention(&nal[2..]), Codec::Hevc).unwrap();
        assert_eq!(messages, vec![SeiMessage::DisplayOrientation(orientation)]);
    }

    #[test]
    fn test_recovery_point_h264() {
        let nal = synth::sei_recovery_point(Codec::H264, 3);
        let messages = parse_sei(&remove_emulation_prevention(&nal[1..]), Codec::H264).unwrap();
        assert_eq!(
            messages,
            vec![SeiMessage::RecoveryPoint(RecoveryPoint {
                count: 3,
                exact_match: true,
                broken_link: false,
            })]
        );
    }

    #[test]
    fn test_unknown_and_truncated_payloads() {
        // type 5 (user data unregistered), size 2, two bytes, trailing bits
        let rbsp = [5, 2, 0xAA, 0xBB, 0x80];
        assert_eq!(
            parse_sei(&rbsp, Codec::H264).unwrap(),
            vec![SeiMessage::Other(5)]
        );
        // size says 4, only 1 byte follows
        let rbsp = [5, 4, 0xAA];
        assert_eq!(
            parse_sei(&rbsp, Codec::H264),
            Err(BitstreamErrorKind::Truncated {
                field: "sei_payload"
            })
        );
    }

    #[test]
    fn test_accumulated_payload_type() {
        // 0xFF + 0x30 = 303
        let rbsp = [0xFF, 0x30, 0x00, 0x80];
        assert_eq!(
            parse_sei(&rbsp, Codec::Hevc).unwrap(),
            vec![SeiMessage::Other(303)]
        );
    }
}
