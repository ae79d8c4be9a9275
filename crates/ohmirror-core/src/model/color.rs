// ── HSB color state ──
//
// Color items carry hue (degrees), saturation and brightness (percent)
// as a comma-joined triple on the wire.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hsb {
    pub hue: f64,
    pub saturation: f64,
    pub brightness: f64,
}

/// Why an HSB or hex string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color '{0}'")]
pub struct ColorParseError(pub String);

impl Hsb {
    pub fn new(hue: f64, saturation: f64, brightness: f64) -> Self {
        Self {
            hue,
            saturation,
            brightness,
        }
    }

    /// Convert to an `#rrggbb` string.
    pub fn to_rgb_hex(&self) -> String {
        let (r, g, b) = self.to_rgb();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    pub fn to_rgb(&self) -> (u8, u8, u8) {
        let s = (self.saturation / 100.0).clamp(0.0, 1.0);
        let v = (self.brightness / 100.0).clamp(0.0, 1.0);
        let h = self.hue.rem_euclid(360.0) / 60.0;

        let c = v * s;
        let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
        let (r1, g1, b1) = if h < 1.0 {
            (c, x, 0.0)
        } else if h < 2.0 {
            (x, c, 0.0)
        } else if h < 3.0 {
            (0.0, c, x)
        } else if h < 4.0 {
            (0.0, x, c)
        } else if h < 5.0 {
            (x, 0.0, c)
        } else {
            (c, 0.0, x)
        };
        let m = v - c;
        (channel(r1 + m), channel(g1 + m), channel(b1 + m))
    }

    /// Parse `#rrggbb` (leading `#` optional).
    pub fn from_rgb_hex(hex: &str) -> Result<Self, ColorParseError> {
        let digits = hex.trim().trim_start_matches('#');
        let err = || ColorParseError(hex.to_owned());
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(err());
        }
        let byte = |i: usize| {
            digits
                .get(i..i + 2)
                .and_then(|d| u8::from_str_radix(d, 16).ok())
                .ok_or_else(err)
        };
        Ok(Self::from_rgb(byte(0)?, byte(2)?, byte(4)?))
    }

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let r = f64::from(r) / 255.0;
        let g = f64::from(g) / 255.0;
        let b = f64::from(b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if (max - r).abs() < f64::EPSILON {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if (max - g).abs() < f64::EPSILON {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max * 100.0 };

        Self::new(hue, saturation, max * 100.0)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl fmt::Display for Hsb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.hue, self.saturation, self.brightness)
    }
}

impl FromStr for Hsb {
    type Err = ColorParseError;

    /// Parse the `h,s,b` wire format. Exactly three components.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ColorParseError(s.to_owned()))?;
        match parts.as_slice() {
            [h, sat, b] => Ok(Self::new(*h, *sat, *b)),
            _ => Err(ColorParseError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_round_trips() {
        let c: Hsb = "120,100,50".parse().unwrap();
        assert_eq!(c, Hsb::new(120.0, 100.0, 50.0));
        assert_eq!(c.to_string(), "120,100,50");
        assert_eq!(c.to_string().parse::<Hsb>().unwrap(), c);
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!("1,2".parse::<Hsb>().is_err());
        assert!("1,2,3,4".parse::<Hsb>().is_err());
        assert!("a,b,c".parse::<Hsb>().is_err());
    }

    #[test]
    fn rgb_hex_conversion() {
        assert_eq!(Hsb::new(0.0, 100.0, 100.0).to_rgb_hex(), "#ff0000");
        assert_eq!(Hsb::new(120.0, 100.0, 50.0).to_rgb_hex(), "#008000");
        assert_eq!(Hsb::new(240.0, 0.0, 100.0).to_rgb_hex(), "#ffffff");

        let blue = Hsb::from_rgb_hex("#0000ff").unwrap();
        assert!((blue.hue - 240.0).abs() < 1e-9);
        assert!((blue.saturation - 100.0).abs() < 1e-9);
        assert!((blue.brightness - 100.0).abs() < 1e-9);

        assert!(Hsb::from_rgb_hex("#12345").is_err());
    }
}
