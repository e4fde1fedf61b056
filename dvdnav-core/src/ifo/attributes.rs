//! Video, audio and sub-picture stream attributes.
//!
//! These are dense bitfield records, so they are described with the schema
//! decoder and then lifted into typed structs.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::bits::ByteCursor;
use crate::schema::{Field, Record, Schema};

use super::IfoError;

pub const VIDEO_ATTR_SIZE: usize = 2;
pub const AUDIO_ATTR_SIZE: usize = 8;
pub const SUBP_ATTR_SIZE: usize = 6;
pub const MULTICHANNEL_EXT_SIZE: usize = 24;

fn video_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("video_attr")
            .field("mpeg_version", Field::Bits(2))
            .field("video_format", Field::Bits(2))
            .field("display_aspect_ratio", Field::Bits(2))
            .field("permitted_df", Field::Bits(2))
            .field("line21_cc_1", Field::Bits(1))
            .field("line21_cc_2", Field::Bits(1))
            .field("unknown1", Field::Bits(1))
            .field("bit_rate", Field::Bits(1))
            .field("picture_size", Field::Bits(2))
            .field("letterboxed", Field::Bits(1))
            .field("film_mode", Field::Bits(1))
    })
}

fn audio_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("audio_attr")
            .field("audio_format", Field::Bits(3))
            .field("multichannel_extension", Field::Bits(1))
            .field("lang_type", Field::Bits(2))
            .field("application_mode", Field::Bits(2))
            .field("quantization", Field::Bits(2))
            .field("sample_frequency", Field::Bits(2))
            .field("unknown1", Field::Bits(1))
            .field("channels", Field::Bits(3))
            .field("lang_code", Field::U16)
            .field("lang_extension", Field::U8)
            .field("code_extension", Field::U8)
            .field("unknown3", Field::U8)
            .field("app_info", Field::U8)
    })
}

fn subp_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new("subp_attr")
            .field("code_mode", Field::Bits(3))
            .field("zero1", Field::Bits(3))
            .field("type", Field::Bits(2))
            .field("zero2", Field::U8)
            .field("lang_code", Field::U16)
            .field("lang_extension", Field::U8)
            .field("code_extension", Field::U8)
    })
}

/// Two character ISO 639 code packed big-endian into a u16.
pub fn lang_to_string(code: u16) -> String {
    let [a, b] = code.to_be_bytes();
    if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() {
        format!("{}{}", a as char, b as char)
    } else {
        String::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAttr {
    pub mpeg_version: u8,
    /// 0 = NTSC, 1 = PAL.
    pub video_format: u8,
    /// 0 = 4:3, 3 = 16:9.
    pub display_aspect_ratio: u8,
    pub permitted_df: u8,
    pub line21_cc_1: bool,
    pub line21_cc_2: bool,
    pub bit_rate: u8,
    pub picture_size: u8,
    pub letterboxed: bool,
    pub film_mode: bool,
}

impl VideoAttr {
    pub(crate) fn from_record(r: &Record) -> Self {
        Self {
            mpeg_version: r.uint("mpeg_version") as u8,
            video_format: r.uint("video_format") as u8,
            display_aspect_ratio: r.uint("display_aspect_ratio") as u8,
            permitted_df: r.uint("permitted_df") as u8,
            line21_cc_1: r.uint("line21_cc_1") != 0,
            line21_cc_2: r.uint("line21_cc_2") != 0,
            bit_rate: r.uint("bit_rate") as u8,
            picture_size: r.uint("picture_size") as u8,
            letterboxed: r.uint("letterboxed") != 0,
            film_mode: r.uint("film_mode") != 0,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        let height = if self.video_format == 0 { 480 } else { 576 };
        let width = match self.picture_size {
            0 => 720,
            1 => 704,
            2 => 352,
            _ => 352,
        };
        let height = if self.picture_size == 3 { height / 2 } else { height };
        (width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Ac3,
    Mpeg1,
    Mpeg2Ext,
    Lpcm,
    Dts,
    Sdds,
    Unknown(u8),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioAttr {
    pub audio_format: u8,
    pub multichannel_extension: bool,
    pub lang_type: u8,
    pub application_mode: u8,
    pub quantization: u8,
    pub sample_frequency: u8,
    /// Channel count minus one.
    pub channels: u8,
    pub lang_code: u16,
    pub lang_extension: u8,
    pub code_extension: u8,
    pub app_info: u8,
}

impl AudioAttr {
    pub(crate) fn from_record(r: &Record) -> Self {
        Self {
            audio_format: r.uint("audio_format") as u8,
            multichannel_extension: r.uint("multichannel_extension") != 0,
            lang_type: r.uint("lang_type") as u8,
            application_mode: r.uint("application_mode") as u8,
            quantization: r.uint("quantization") as u8,
            sample_frequency: r.uint("sample_frequency") as u8,
            channels: r.uint("channels") as u8,
            lang_code: r.uint("lang_code") as u16,
            lang_extension: r.uint("lang_extension") as u8,
            code_extension: r.uint("code_extension") as u8,
            app_info: r.uint("app_info") as u8,
        }
    }

    pub fn format(&self) -> AudioFormat {
        match self.audio_format {
            0 => AudioFormat::Ac3,
            2 => AudioFormat::Mpeg1,
            3 => AudioFormat::Mpeg2Ext,
            4 => AudioFormat::Lpcm,
            6 => AudioFormat::Dts,
            7 => AudioFormat::Sdds,
            other => AudioFormat::Unknown(other),
        }
    }

    pub fn language(&self) -> String {
        if self.lang_type == 1 {
            lang_to_string(self.lang_code)
        } else {
            String::new()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubpAttr {
    pub code_mode: u8,
    pub subp_type: u8,
    pub lang_code: u16,
    pub lang_extension: u8,
    pub code_extension: u8,
}

impl SubpAttr {
    pub(crate) fn from_record(r: &Record) -> Self {
        Self {
            code_mode: r.uint("code_mode") as u8,
            subp_type: r.uint("type") as u8,
            lang_code: r.uint("lang_code") as u16,
            lang_extension: r.uint("lang_extension") as u8,
            code_extension: r.uint("code_extension") as u8,
        }
    }

    pub fn language(&self) -> String {
        if self.subp_type == 1 {
            lang_to_string(self.lang_code)
        } else {
            String::new()
        }
    }
}

pub fn read_video_attr(cursor: &mut ByteCursor) -> Result<VideoAttr, IfoError> {
    Ok(VideoAttr::from_record(&video_schema().decode(cursor)?))
}

pub fn read_audio_attr(cursor: &mut ByteCursor) -> Result<AudioAttr, IfoError> {
    Ok(AudioAttr::from_record(&audio_schema().decode(cursor)?))
}

pub fn read_subp_attr(cursor: &mut ByteCursor) -> Result<SubpAttr, IfoError> {
    Ok(SubpAttr::from_record(&subp_schema().decode(cursor)?))
}

/// Reads `count` consecutive audio attributes.
pub fn read_audio_attrs(cursor: &mut ByteCursor, count: usize) -> Result<Vec<AudioAttr>, IfoError> {
    (0..count).map(|_| read_audio_attr(cursor)).collect()
}

pub fn read_subp_attrs(cursor: &mut ByteCursor, count: usize) -> Result<Vec<SubpAttr>, IfoError> {
    (0..count).map(|_| read_subp_attr(cursor)).collect()
}

/// Schema for a table of `n` audio attributes, used by the VTS attribute table.
pub(crate) fn audio_table_schema(n: usize) -> Arc<Schema> {
    Arc::new(Schema::new("audio_attr_table").field(
        "attrs",
        Field::Array(
            Box::new(Field::Nested(Arc::new(audio_schema().clone()))),
            crate::schema::Count::Fixed(n),
        ),
    ))
}
