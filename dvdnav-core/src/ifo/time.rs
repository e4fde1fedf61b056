//! Playback time stamps (`dvd_time_t`).
//!
//! Hours, minutes and seconds are two BCD digits each. The last byte holds
//! the frame rate in its top two bits and two BCD frame digits below.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 90 kHz MPEG system clock.
pub const PTS_HZ: u64 = 90_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameRate {
    /// Rate bits 0 (or the reserved value 2).
    Unspecified,
    /// Rate bits 1.
    Fps25,
    /// Rate bits 3.
    Fps2997,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DvdTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Rate in bits 7-6, BCD frames in bits 5-0.
    pub frame_u: u8,
}

fn bcd(v: u8) -> u64 {
    ((v >> 4) as u64) * 10 + (v & 0x0F) as u64
}

impl DvdTime {
    pub fn from_bytes(b: [u8; 4]) -> Self {
        Self {
            hour: b[0],
            minute: b[1],
            second: b[2],
            frame_u: b[3],
        }
    }

    pub fn frame_rate(&self) -> FrameRate {
        match self.frame_u >> 6 {
            1 => FrameRate::Fps25,
            3 => FrameRate::Fps2997,
            _ => FrameRate::Unspecified,
        }
    }

    pub fn frames(&self) -> u64 {
        (((self.frame_u & 0x30) >> 4) as u64) * 10 + (self.frame_u & 0x0F) as u64
    }

    /// Duration in 90 kHz ticks. Frames count 3000 ticks when the 30 fps
    /// bit is set, 3600 otherwise.
    pub fn to_pts(&self) -> u64 {
        let seconds = bcd(self.hour) * 3600 + bcd(self.minute) * 60 + bcd(self.second);
        let per_frame = if self.frame_u & 0x80 != 0 { 3000 } else { 3600 };
        seconds * PTS_HZ + self.frames() * per_frame
    }

    pub fn to_millis(&self) -> u64 {
        self.to_pts() / 90
    }

    /// Whether every digit is a valid BCD digit.
    pub fn is_valid_bcd(&self) -> bool {
        let ok = |v: u8| (v >> 4) < 10 && (v & 0x0F) < 10;
        ok(self.hour) && ok(self.minute) && ok(self.second) && ok(self.frame_u & 0x3F)
    }
}

impl fmt::Display for DvdTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = match self.frame_rate() {
            FrameRate::Fps25 => "25",
            FrameRate::Fps2997 => "29.97",
            FrameRate::Unspecified => "?",
        };
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02} @ {}fps",
            bcd(self.hour),
            bcd(self.minute),
            bcd(self.second),
            self.frames(),
            rate
        )
    }
}

/// `HH:MM:SS.mmm` for a tick count.
pub fn format_pts(pts: u64) -> String {
    let millis = pts / 90;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        (millis / 60_000) % 60,
        (millis / 1000) % 60,
        millis % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_bcd_to_ticks() {
        // 01:23:45, 12 frames at 25 fps
        let t = DvdTime::from_bytes([0x01, 0x23, 0x45, 0x40 | 0x12]);
        assert_eq!(t.frame_rate(), FrameRate::Fps25);
        assert_eq!(t.to_pts(), (3600 + 23 * 60 + 45) * PTS_HZ + 12 * 3600);
        assert_eq!(t.to_millis(), 5_025_480);
    }

    #[test]
    fn classifies_rate_bits() {
        assert_eq!(DvdTime::from_bytes([0, 0, 0, 0x00]).frame_rate(), FrameRate::Unspecified);
        assert_eq!(DvdTime::from_bytes([0, 0, 0, 0x40]).frame_rate(), FrameRate::Fps25);
        assert_eq!(DvdTime::from_bytes([0, 0, 0, 0xC0]).frame_rate(), FrameRate::Fps2997);
        assert_eq!(DvdTime::from_bytes([0, 0, 0, 0x80]).frame_rate(), FrameRate::Unspecified);
    }

    #[test]
    fn ntsc_frames_use_3000_ticks() {
        let t = DvdTime::from_bytes([0x00, 0x00, 0x01, 0xC0 | 0x29]);
        assert_eq!(t.to_pts(), PTS_HZ + 29 * 3000);
    }

    #[test]
    fn formatting_is_stable() {
        let t = DvdTime::from_bytes([0x02, 0x05, 0x09, 0xC0 | 0x15]);
        let first = format_pts(t.to_pts());
        for _ in 0..3 {
            assert_eq!(format_pts(t.to_pts()), first);
            assert_eq!(t.to_string(), "02:05:09.15 @ 29.97fps");
        }
        assert_eq!(first, "02:05:09.500");
    }

    #[test]
    fn rejects_non_bcd_digits() {
        assert!(DvdTime::from_bytes([0x00, 0x59, 0x59, 0x40 | 0x24]).is_valid_bcd());
        assert!(!DvdTime::from_bytes([0x0A, 0x00, 0x00, 0x40]).is_valid_bcd());
    }
}
