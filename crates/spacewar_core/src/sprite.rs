//! Sprite bounds and alpha masks used by pixel-accurate collision.
//!
//! A sprite has one mask per rotation frame. Frames are spread evenly over a
//! full turn, frame 0 facing `+x`. Masks are written in data files as rows of
//! `#` (opaque) and `.` (transparent):
//!
//! ```ron
//! SpriteDef(
//!     width: 5,
//!     height: 3,
//!     frames: [
//!         [".###.", "#####", ".###."],
//!     ],
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::math::{tau, Fixed};

/// Per-pixel opacity of one sprite frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AlphaMask {
    width: u32,
    height: u32,
    opaque: Vec<bool>,
}

impl AlphaMask {
    /// A fully opaque mask.
    #[must_use]
    pub fn solid(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            opaque: vec![true; (width * height) as usize],
        }
    }

    /// Parse a mask from `#`/`.` rows of equal length.
    ///
    /// # Errors
    ///
    /// Returns a message if rows differ in length or contain other characters.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, String> {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |r| r.as_ref().chars().count()) as u32;
        let mut opaque = Vec::with_capacity((width * height) as usize);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() as u32 != width {
                return Err(format!(
                    "mask row {y} has {} pixels, expected {width}",
                    row.chars().count()
                ));
            }
            for c in row.chars() {
                match c {
                    '#' => opaque.push(true),
                    '.' => opaque.push(false),
                    other => return Err(format!("invalid mask pixel '{other}' in row {y}")),
                }
            }
        }
        Ok(Self {
            width,
            height,
            opaque,
        })
    }

    /// Mask width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel at `(x, y)` is opaque. Out-of-range pixels are not.
    #[must_use]
    pub fn is_opaque(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return false;
        }
        self.opaque[(y as u32 * self.width + x as u32) as usize]
    }
}

impl TryFrom<Vec<String>> for AlphaMask {
    type Error = String;

    fn try_from(rows: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl From<AlphaMask> for Vec<String> {
    fn from(mask: AlphaMask) -> Self {
        (0..mask.height as i32)
            .map(|y| {
                (0..mask.width as i32)
                    .map(|x| if mask.is_opaque(x, y) { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }
}

/// Sprite bounds and rotation frames of a space entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteDef {
    /// Bounding box width in battle-space units.
    pub width: u32,
    /// Bounding box height in battle-space units.
    pub height: u32,
    /// Rotation frames; empty means the whole bounding box is solid.
    #[serde(default)]
    pub frames: Vec<AlphaMask>,
}

impl Default for SpriteDef {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            frames: Vec::new(),
        }
    }
}

impl SpriteDef {
    /// Frame closest to the given facing angle.
    #[must_use]
    pub fn frame_for_angle(&self, angle: Fixed) -> Option<&AlphaMask> {
        if self.frames.is_empty() {
            return None;
        }
        let n = self.frames.len();
        let turns = crate::math::normalize_angle(angle) / tau();
        let index = (turns * Fixed::from_num(n)).round().to_num::<usize>() % n;
        self.frames.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::pi;

    #[test]
    fn test_parse_rows() {
        let mask = AlphaMask::from_rows(&[".#.", "###"]).unwrap();
        assert_eq!(mask.width(), 3);
        assert_eq!(mask.height(), 2);
        assert!(!mask.is_opaque(0, 0));
        assert!(mask.is_opaque(1, 0));
        assert!(mask.is_opaque(2, 1));
        assert!(!mask.is_opaque(3, 1));
        assert!(!mask.is_opaque(-1, 0));
    }

    #[test]
    fn test_rejects_ragged_rows() {
        assert!(AlphaMask::from_rows(&["##", "#"]).is_err());
        assert!(AlphaMask::from_rows(&["#x"]).is_err());
    }

    #[test]
    fn test_ron_roundtrip_uses_rows() {
        let sprite = SpriteDef {
            width: 2,
            height: 2,
            frames: vec![AlphaMask::from_rows(&["#.", ".#"]).unwrap()],
        };
        let text = ron::to_string(&sprite).unwrap();
        assert!(text.contains("\"#.\""));
        let back: SpriteDef = ron::from_str(&text).unwrap();
        assert_eq!(back, sprite);
    }

    #[test]
    fn test_frame_for_angle_wraps() {
        let sprite = SpriteDef {
            width: 1,
            height: 1,
            frames: vec![
                AlphaMask::solid(1, 1),
                AlphaMask::from_rows(&["."]).unwrap(),
            ],
        };
        assert!(sprite.frame_for_angle(Fixed::ZERO).unwrap().is_opaque(0, 0));
        assert!(!sprite.frame_for_angle(pi()).unwrap().is_opaque(0, 0));
        // Almost a full turn rounds back to frame 0
        let almost = tau() - Fixed::from_num(0.01);
        assert!(sprite.frame_for_angle(almost).unwrap().is_opaque(0, 0));
        assert!(SpriteDef::default().frame_for_angle(Fixed::ZERO).is_none());
    }
}
