//! HEVC NAL unit header

use crate::error::BitstreamErrorKind;
use crate::types::NalClass;

/// HEVC NAL unit types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of trailing picture
    TrailN,
    TrailR,
    /// Coded slice of TSA picture
    TsaN,
    TsaR,
    /// Coded slice of STSA picture
    StsaN,
    StsaR,
    /// Coded slice of RADL picture
    RadlN,
    RadlR,
    /// Coded slice of RASL picture
    RaslN,
    RaslR,
    /// Coded slice of BLA picture
    BlaWLp,
    BlaWRadl,
    BlaNLp,
    /// Coded slice of IDR picture
    IdrWRadl,
    IdrNLp,
    /// Coded slice of CRA picture
    CraNut,
    /// Video Parameter Set
    VpsNut,
    /// Sequence Parameter Set
    SpsNut,
    /// Picture Parameter Set
    PpsNut,
    /// Access Unit Delimiter
    AudNut,
    /// End of Sequence
    EosNut,
    /// End of Bitstream
    EobNut,
    /// Filler Data
    FdNut,
    /// SEI Prefix
    PrefixSeiNut,
    /// SEI Suffix
    SuffixSeiNut,
    /// Reserved or unspecified
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            0 => NalUnitType::TrailN,
            1 => NalUnitType::TrailR,
            2 => NalUnitType::TsaN,
            3 => NalUnitType::TsaR,
            4 => NalUnitType::StsaN,
            5 => NalUnitType::StsaR,
            6 => NalUnitType::RadlN,
            7 => NalUnitType::RadlR,
            8 => NalUnitType::RaslN,
            9 => NalUnitType::RaslR,
            16 => NalUnitType::BlaWLp,
            17 => NalUnitType::BlaWRadl,
            18 => NalUnitType::BlaNLp,
            19 => NalUnitType::IdrWRadl,
            20 => NalUnitType::IdrNLp,
            21 => NalUnitType::CraNut,
            32 => NalUnitType::VpsNut,
            33 => NalUnitType::SpsNut,
            34 => NalUnitType::PpsNut,
            35 => NalUnitType::AudNut,
            36 => NalUnitType::EosNut,
            37 => NalUnitType::EobNut,
            38 => NalUnitType::FdNut,
            39 => NalUnitType::PrefixSeiNut,
            40 => NalUnitType::SuffixSeiNut,
            v => NalUnitType::Other(v),
        }
    }
}

/// Two-byte HEVC NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// Raw `nal_unit_type`.
    pub nal_type: u8,
    pub nuh_layer_id: u8,
    pub nuh_temporal_id_plus1: u8,
}

impl NalHeader {
    pub fn parse(data: &[u8]) -> Result<Self, BitstreamErrorKind> {
        match data {
            [] => Err(BitstreamErrorKind::EmptyUnit),
            [_] => Err(BitstreamErrorKind::Truncated {
                field: "nal_unit_header",
            }),
            [b0, b1, ..] => {
                if b0 & 0x80 != 0 {
                    return Err(BitstreamErrorKind::ForbiddenBit);
                }
                let nuh_temporal_id_plus1 = b1 & 0x07;
                if nuh_temporal_id_plus1 == 0 {
                    return Err(BitstreamErrorKind::OutOfRange {
                        field: "nuh_temporal_id_plus1",
                        value: 0,
                    });
                }
                Ok(Self {
                    nal_type: (b0 >> 1) & 0x3F,
                    nuh_layer_id: ((b0 & 0x01) << 5) | (b1 >> 3),
                    nuh_temporal_id_plus1,
                })
            }
        }
    }

    pub fn unit_type(&self) -> NalUnitType {
        NalUnitType::from(self.nal_type)
    }

    /// Coded slice segment of a known VCL type.
    pub fn is_slice(&self) -> bool {
        matches!(self.nal_type, 0..=9 | 16..=21)
    }

    /// Intra random access point (BLA, IDR, CRA and reserved IRAP types).
    pub fn is_irap(&self) -> bool {
        (16..=23).contains(&self.nal_type)
    }

    pub fn is_idr(&self) -> bool {
        matches!(
            self.unit_type(),
            NalUnitType::IdrWRadl | NalUnitType::IdrNLp
        )
    }

    /// Sub-layer non-reference pictures are the even VCL types below 16.
    pub fn is_reference(&self) -> bool {
        !(self.nal_type <= 14 && self.nal_type % 2 == 0)
    }

    pub fn class(&self) -> NalClass {
        match self.unit_type() {
            NalUnitType::VpsNut | NalUnitType::SpsNut | NalUnitType::PpsNut => {
                NalClass::ParameterSet
            }
            NalUnitType::PrefixSeiNut | NalUnitType::SuffixSeiNut => NalClass::Sei,
            _ if self.is_slice() => NalClass::Slice,
            _ => NalClass::Other,
        }
    }
}
