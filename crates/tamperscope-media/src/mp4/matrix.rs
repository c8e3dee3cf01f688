//! Display transformation matrices from `mvhd` / `tkhd`.

use serde::Serialize;

const FIXED_16_16: f64 = 65536.0;
const ONE_16_16: i32 = 0x0001_0000;
const ONE_2_30: i32 = 0x4000_0000;

/// The 3x3 matrix stored in movie and track headers.
///
/// Values are stored row-major as `[a, b, u, c, d, v, x, y, w]`; `u`, `v` and
/// `w` are 2.30 fixed point, everything else is 16.16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransformMatrix(pub [i32; 9]);

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Orientation implied by a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Orientation {
    /// Clockwise rotation in whole degrees, normalized to `0..360`.
    pub rotation: u16,
    /// Whether the image is mirrored.
    pub mirrored: bool,
    /// Whether the rotation is an exact multiple of 90 degrees.
    pub axis_aligned: bool,
}

impl TransformMatrix {
    pub const IDENTITY: Self = Self([ONE_16_16, 0, 0, 0, ONE_16_16, 0, 0, 0, ONE_2_30]);

    /// Parse 36 big-endian bytes.
    pub fn from_be_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 36 {
            return None;
        }
        let mut values = [0i32; 9];
        for (i, v) in values.iter_mut().enumerate() {
            let at = i * 4;
            *v = i32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        }
        Some(Self(values))
    }

    /// Matrix for a clockwise rotation by a multiple of 90 degrees.
    pub fn rotation(degrees: u16) -> Self {
        let (a, b, c, d) = match degrees % 360 {
            90 => (0, ONE_16_16, -ONE_16_16, 0),
            180 => (-ONE_16_16, 0, 0, -ONE_16_16),
            270 => (0, -ONE_16_16, ONE_16_16, 0),
            _ => (ONE_16_16, 0, 0, ONE_16_16),
        };
        Self([a, b, 0, c, d, 0, 0, 0, ONE_2_30])
    }

    /// Serialize back to 36 bytes.
    pub fn to_be_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        for (i, v) in self.0.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_be_bytes());
        }
        out
    }

    pub fn a(&self) -> f64 {
        self.0[0] as f64 / FIXED_16_16
    }

    pub fn b(&self) -> f64 {
        self.0[1] as f64 / FIXED_16_16
    }

    pub fn c(&self) -> f64 {
        self.0[3] as f64 / FIXED_16_16
    }

    pub fn d(&self) -> f64 {
        self.0[4] as f64 / FIXED_16_16
    }

    /// Translation in pixels.
    pub fn translation(&self) -> (f64, f64) {
        (self.0[6] as f64 / FIXED_16_16, self.0[7] as f64 / FIXED_16_16)
    }

    /// Exactly the identity matrix.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Whether the linear part is the identity (translation ignored).
    pub fn is_unrotated(&self) -> bool {
        self.0[0] == ONE_16_16 && self.0[1] == 0 && self.0[3] == 0 && self.0[4] == ONE_16_16
    }

    /// Rotation and mirroring encoded by the linear part.
    pub fn orientation(&self) -> Orientation {
        let (a, b, c, d) = (self.a(), self.b(), self.c(), self.d());
        let mirrored = a * d - b * c < 0.0;
        // Row-vector convention: a mirrored matrix is flip(x) followed by rotation.
        let radians = if mirrored { (-b).atan2(-a) } else { b.atan2(a) };
        let degrees = radians.to_degrees().round().rem_euclid(360.0);
        let rotation = degrees as u16 % 360;
        Orientation {
            rotation,
            mirrored,
            axis_aligned: rotation % 90 == 0,
        }
    }

    /// Whether the matrix turns width into height.
    pub fn swaps_dimensions(&self) -> bool {
        let o = self.orientation();
        o.rotation == 90 || o.rotation == 270
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = TransformMatrix::IDENTITY;
        assert!(m.is_identity());
        let o = m.orientation();
        assert_eq!(o.rotation, 0);
        assert!(!o.mirrored);
        assert!(!m.swaps_dimensions());
    }

    #[test]
    fn test_quarter_turns() {
        for deg in [90u16, 180, 270] {
            let m = TransformMatrix::rotation(deg);
            assert!(!m.is_identity());
            assert_eq!(m.orientation().rotation, deg);
            assert_eq!(m.swaps_dimensions(), deg != 180);
        }
    }

    #[test]
    fn test_horizontal_flip() {
        let m = TransformMatrix([-ONE_16_16, 0, 0, 0, ONE_16_16, 0, 0, 0, ONE_2_30]);
        let o = m.orientation();
        assert!(o.mirrored);
        assert_eq!(o.rotation, 0);
    }

    #[test]
    fn test_byte_round_trip() {
        let m = TransformMatrix::rotation(90);
        assert_eq!(TransformMatrix::from_be_bytes(&m.to_be_bytes()), Some(m));
        assert_eq!(TransformMatrix::from_be_bytes(&[0; 35]), None);
    }

    #[test]
    fn test_translation_only_is_unrotated() {
        let mut m = TransformMatrix::IDENTITY;
        m.0[6] = 1080 * ONE_16_16;
        assert!(!m.is_identity());
        assert!(m.is_unrotated());
        assert_eq!(m.translation(), (1080.0, 0.0));
    }
}
