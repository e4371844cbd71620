//! Title flag word.
//!
//! ```text
//! 15-12  parental rating
//! 11     widescreen
//! 10     HD
//!  9-8   audio (0 mono, 1 stereo, 2 surround, 3 Dolby Digital)
//!  7     audio description
//!  6     subtitles
//!  5     signed
//! ```

use serde::Serialize;

use super::repair::tidy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioQuality {
    #[default]
    Mono,
    Stereo,
    Surround,
    DolbyDigital,
}

/// Decoded content flags of a title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentFlags {
    pub rating: u8,
    pub widescreen: bool,
    pub hd: bool,
    pub audio: AudioQuality,
    pub audio_description: bool,
    pub subtitles: bool,
    pub signed: bool,
}

impl ContentFlags {
    pub fn from_word(word: u16) -> Self {
        Self {
            rating: (word >> 12) as u8,
            widescreen: word & 0x0800 != 0,
            hd: word & 0x0400 != 0,
            audio: match (word >> 8) & 0x03 {
                0 => AudioQuality::Mono,
                1 => AudioQuality::Stereo,
                2 => AudioQuality::Surround,
                _ => AudioQuality::DolbyDigital,
            },
            audio_description: word & 0x0080 != 0,
            subtitles: word & 0x0040 != 0,
            signed: word & 0x0020 != 0,
        }
    }

    /// Remove the description markers that duplicate set flags.
    pub fn strip_markers(&self, text: &str) -> String {
        let mut out = text.to_string();
        let mut changed = false;
        let mut remove = |out: &mut String, marker: &str| {
            if out.contains(marker) {
                *out = out.replace(marker, " ");
                changed = true;
            }
        };

        if self.widescreen {
            remove(&mut out, "(WS)");
        }
        if self.hd {
            remove(&mut out, "[HD]");
        }
        if self.audio_description {
            remove(&mut out, "(AD)");
        }
        if self.signed {
            remove(&mut out, "(SL)");
            remove(&mut out, "[SL]");
        }
        if self.subtitles {
            remove(&mut out, "(S)");
            remove(&mut out, "[S]");
        }
        if self.hd {
            let trimmed = out.trim_end();
            if let Some(head) = trimmed.strip_suffix(" HD") {
                out = head.to_string();
                changed = true;
            }
        }

        if changed {
            tidy(&out)
        } else {
            out
        }
    }
}
