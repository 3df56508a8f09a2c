//! Track data model shared across the HTTP boundary
//!
//! `EnrichedTrack` is produced once by the server-side enricher and never
//! mutated afterwards; the carousel only reads it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Number of colors in every palette
pub const PALETTE_LEN: usize = 5;

/// One RGB color
///
/// Travels as the CSS string `rgb(r,g,b)` so the rendering layer can use it
/// verbatim in a gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(level: u8) -> Self {
        Self::new(level, level, level)
    }

    /// Euclidean length of the color as a point in RGB space
    pub fn norm(&self) -> f64 {
        let (r, g, b) = (f64::from(self.r), f64::from(self.g), f64::from(self.b));
        (r * r + g * g + b * b).sqrt()
    }

    /// Per-channel linear interpolation; `t` is clamped to [0, 1]
    pub fn lerp(self, target: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |from: u8, to: u8| -> u8 {
            let from = f64::from(from);
            let to = f64::from(to);
            (from + (to - from) * t).round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(mix(self.r, target.r), mix(self.g, target.g), mix(self.b, target.b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| Error::Parse(format!("not an rgb() color: {s:?}")))?;

        let channels = inner
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Parse(format!("bad channel in {s:?}: {e}")))?;

        match channels.as_slice() {
            [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
            _ => Err(Error::Parse(format!("expected 3 channels in {s:?}"))),
        }
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_string()
    }
}

impl TryFrom<String> for Rgb {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Five representative colors of a piece of album art, most prominent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorPalette([Rgb; PALETTE_LEN]);

impl ColorPalette {
    /// Grayscale ramp used whenever extraction yields nothing usable
    pub const DEFAULT: ColorPalette = ColorPalette([
        Rgb::gray(58),
        Rgb::gray(78),
        Rgb::gray(98),
        Rgb::gray(118),
        Rgb::gray(138),
    ]);

    pub const fn new(colors: [Rgb; PALETTE_LEN]) -> Self {
        Self(colors)
    }

    pub fn colors(&self) -> &[Rgb; PALETTE_LEN] {
        &self.0
    }

    pub fn primary(&self) -> Rgb {
        self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rgb> {
        self.0.iter()
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    /// Blend every color towards the matching color of `target`
    pub fn lerp(&self, target: &ColorPalette, t: f64) -> ColorPalette {
        let mut blended = self.0;
        for (color, to) in blended.iter_mut().zip(target.0.iter()) {
            *color = color.lerp(*to, t);
        }
        ColorPalette(blended)
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A scrobble combined with its art reference, extracted colors and an
/// optional inlined thumbnail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTrack {
    pub name: String,
    pub artist: String,
    /// Track page on the listening-history service
    pub url: String,
    pub album_art_url: String,
    /// `data:` URI carrying the art itself when it was small enough to inline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_image: Option<String>,
    pub colors: ColorPalette,
    /// Unix seconds; absent while the track is playing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub is_now_playing: bool,
}

impl EnrichedTrack {
    /// Whether both records describe the same play event
    pub fn is_same_play(&self, other: &EnrichedTrack) -> bool {
        self.name == other.name
            && self.artist == other.artist
            && self.timestamp == other.timestamp
            && self.is_now_playing == other.is_now_playing
    }

    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> EnrichedTrack {
        EnrichedTrack {
            name: "Windowlicker".to_string(),
            artist: "Aphex Twin".to_string(),
            url: "https://www.last.fm/music/Aphex+Twin/_/Windowlicker".to_string(),
            album_art_url: "https://lastfm.freetls.fastly.net/i/u/300x300/a.jpg".to_string(),
            inline_image: None,
            colors: ColorPalette::DEFAULT,
            timestamp: Some(1_700_000_000),
            is_now_playing: false,
        }
    }

    #[test]
    fn test_rgb_display_matches_css() {
        assert_eq!(Rgb::new(58, 58, 58).to_string(), "rgb(58,58,58)");
    }

    #[test]
    fn test_rgb_parse_accepts_spaces() {
        let color: Rgb = "rgb(12, 200 ,7)".parse().unwrap();
        assert_eq!(color, Rgb::new(12, 200, 7));
    }

    #[test]
    fn test_rgb_parse_rejects_garbage() {
        assert!("#ffffff".parse::<Rgb>().is_err());
        assert!("rgb(1,2)".parse::<Rgb>().is_err());
        assert!("rgb(1,2,300)".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_rgb_lerp_endpoints_and_midpoint() {
        let from = Rgb::new(0, 100, 200);
        let to = Rgb::new(100, 100, 0);
        assert_eq!(from.lerp(to, 0.0), from);
        assert_eq!(from.lerp(to, 1.0), to);
        assert_eq!(from.lerp(to, 0.5), Rgb::new(50, 100, 100));
        // Out-of-range progress clamps instead of overshooting
        assert_eq!(from.lerp(to, 3.0), to);
    }

    #[test]
    fn test_default_palette_is_grayscale_ramp() {
        let levels: Vec<u8> = ColorPalette::DEFAULT.iter().map(|c| c.r).collect();
        assert_eq!(levels, vec![58, 78, 98, 118, 138]);
        assert!(ColorPalette::default().is_default());
    }

    #[test]
    fn test_palette_serializes_as_five_css_strings() {
        let json = serde_json::to_value(ColorPalette::DEFAULT).unwrap();
        let arr = json.as_array().unwrap();
        assert_eq!(arr.len(), PALETTE_LEN);
        assert_eq!(arr[0], "rgb(58,58,58)");
    }

    #[test]
    fn test_palette_rejects_wrong_length() {
        let four = r#"["rgb(1,1,1)","rgb(2,2,2)","rgb(3,3,3)","rgb(4,4,4)"]"#;
        assert!(serde_json::from_str::<ColorPalette>(four).is_err());
    }

    #[test]
    fn test_track_uses_camel_case_fields() {
        let json = serde_json::to_value(sample_track()).unwrap();
        assert!(json.get("albumArtUrl").is_some());
        assert_eq!(json["isNowPlaying"], false);
        // Absent inline image is omitted rather than null
        assert!(json.get("inlineImage").is_none());

        let back: EnrichedTrack = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample_track());
    }

    #[test]
    fn test_same_play_ignores_art_and_colors() {
        let a = sample_track();
        let mut b = sample_track();
        b.album_art_url = "elsewhere".to_string();
        b.colors = ColorPalette::new([Rgb::gray(1); PALETTE_LEN]);
        assert!(a.is_same_play(&b));

        b.timestamp = Some(1_700_000_100);
        assert!(!a.is_same_play(&b));
    }

    #[test]
    fn test_played_at_converts_unix_seconds() {
        let played = sample_track().played_at().unwrap();
        assert_eq!(played.timestamp(), 1_700_000_000);
    }
}
