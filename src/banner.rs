//! Banner file (`opening.bnr`) codec.
//!
//! A banner is a 96×32 image in big-endian RGB5A1, stored as 4×4 pixel
//! tiles, followed by one (`BNR1`, NTSC) or more (`BNR2`, PAL — one per
//! language) 0x140-byte metadata records of null-terminated strings.

use crate::cursor::cstr_at;
use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;
use thiserror::Error;

pub const BANNER_WIDTH: usize = 96;
pub const BANNER_HEIGHT: usize = 32;
const TILE: usize = 4;

pub const PIXEL_DATA_OFFSET: usize = 0x20;
pub const PIXEL_DATA_SIZE: usize = 0x1800;
pub const META_OFFSET: usize = 0x1820;
pub const META_SIZE: usize = 0x140;

#[derive(Error, Debug)]
pub enum BannerError {
    #[error("banner file too small: {0} bytes")]
    Truncated(usize),
    #[error("bad banner magic: {0:?}")]
    BadMagic([u8; 4]),
    #[error("metadata field {field} exceeds {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("pixel buffer must be {expected} bytes, got {actual}")]
    BadPixelBuffer { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerRegion {
    /// `BNR1` — NTSC, a single metadata record.
    Ntsc,
    /// `BNR2` — PAL, one record per language.
    Pal,
}

impl BannerRegion {
    pub fn magic(self) -> &'static [u8; 4] {
        match self {
            BannerRegion::Ntsc => b"BNR1",
            BannerRegion::Pal => b"BNR2",
        }
    }
}

/// One 0x140-byte metadata record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BannerMeta {
    pub game_name: String,
    pub developer: String,
    pub full_game_title: String,
    pub full_developer: String,
    pub description: String,
}

// (field, record offset, capacity incl. terminator)
const META_FIELDS: [(&str, usize, usize); 5] = [
    ("game_name", 0x00, 0x20),
    ("developer", 0x20, 0x20),
    ("full_game_title", 0x40, 0x40),
    ("full_developer", 0x80, 0x40),
    ("description", 0xC0, 0x80),
];

impl BannerMeta {
    fn parse(record: &[u8]) -> Self {
        let field = |off: usize, cap: usize| -> String {
            let bytes = cstr_at(&record[..off + cap], off).unwrap_or(&record[off..off + cap]);
            String::from_utf8_lossy(bytes).into_owned()
        };
        Self {
            game_name: field(0x00, 0x20),
            developer: field(0x20, 0x20),
            full_game_title: field(0x40, 0x40),
            full_developer: field(0x80, 0x40),
            description: field(0xC0, 0x80),
        }
    }

    fn write(&self, record: &mut [u8]) -> Result<(), BannerError> {
        let values = [
            &self.game_name,
            &self.developer,
            &self.full_game_title,
            &self.full_developer,
            &self.description,
        ];
        for (&(field, off, cap), value) in META_FIELDS.iter().zip(values) {
            // Leave room for the terminator.
            if value.len() >= cap {
                return Err(BannerError::FieldTooLong { field, max: cap - 1 });
            }
            record[off..off + value.len()].copy_from_slice(value.as_bytes());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Banner {
    pub region: BannerRegion,
    /// Raw tiled RGB5A1 pixel data, 0x1800 bytes.
    pub pixel_data: Vec<u8>,
    pub meta: Vec<BannerMeta>,
}

impl Banner {
    pub fn parse(data: &[u8]) -> Result<Self, BannerError> {
        if data.len() < META_OFFSET {
            return Err(BannerError::Truncated(data.len()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        let region = match &magic {
            b"BNR1" => BannerRegion::Ntsc,
            b"BNR2" => BannerRegion::Pal,
            _ => return Err(BannerError::BadMagic(magic)),
        };

        let pixel_data = data[PIXEL_DATA_OFFSET..PIXEL_DATA_OFFSET + PIXEL_DATA_SIZE].to_vec();

        let meta_count = (data.len() - META_OFFSET) / META_SIZE;
        let meta = (0..meta_count)
            .map(|i| {
                let off = META_OFFSET + i * META_SIZE;
                BannerMeta::parse(&data[off..off + META_SIZE])
            })
            .collect();

        Ok(Self { region, pixel_data, meta })
    }

    /// Decode the tiled RGB5A1 data into a row-major 96×32 RGBA buffer.
    pub fn decode_pixels(&self) -> Vec<u8> {
        decode_pixels(&self.pixel_data)
    }

    /// Assemble a complete banner file from metadata and a row-major RGBA
    /// pixel buffer (`96 * 32 * 4` bytes).
    pub fn build(region: BannerRegion, meta: &BannerMeta, rgba: &[u8]) -> Result<Vec<u8>, BannerError> {
        let pixel_data = encode_pixels(rgba)?;
        let mut out = vec![0u8; META_OFFSET + META_SIZE];
        out[..4].copy_from_slice(region.magic());
        out[PIXEL_DATA_OFFSET..PIXEL_DATA_OFFSET + PIXEL_DATA_SIZE].copy_from_slice(&pixel_data);
        meta.write(&mut out[META_OFFSET..META_OFFSET + META_SIZE])?;
        Ok(out)
    }
}

/// RGB5A1 tiled → RGBA row-major. 5-bit channels scale to 0..255, the alpha
/// bit maps to 0 or 255.
pub fn decode_pixels(pixel_data: &[u8]) -> Vec<u8> {
    const TILES_X: usize = BANNER_WIDTH / TILE;

    let mut out = vec![0u8; BANNER_WIDTH * BANNER_HEIGHT * 4];
    let pairs = pixel_data.chunks_exact(2).take(BANNER_WIDTH * BANNER_HEIGHT);
    for (pixel, pair) in pairs.enumerate() {
        let v = BigEndian::read_u16(pair);
        let a = (v >> 15) as u8;
        let r = ((v >> 10) & 0x1F) as u8;
        let g = ((v >> 5) & 0x1F) as u8;
        let b = (v & 0x1F) as u8;

        let tile = pixel / (TILE * TILE);
        let tile_pixel = pixel % (TILE * TILE);
        let x = (tile % TILES_X) * TILE + tile_pixel % TILE;
        let y = (tile / TILES_X) * TILE + tile_pixel / TILE;

        let o = (y * BANNER_WIDTH + x) * 4;
        out[o] = expand5(r);
        out[o + 1] = expand5(g);
        out[o + 2] = expand5(b);
        out[o + 3] = if a != 0 { 0xFF } else { 0 };
    }
    out
}

/// RGBA row-major → RGB5A1 tiled. Alpha ≥ 128 becomes opaque.
pub fn encode_pixels(rgba: &[u8]) -> Result<Vec<u8>, BannerError> {
    const TILES_X: usize = BANNER_WIDTH / TILE;
    let expected = BANNER_WIDTH * BANNER_HEIGHT * 4;
    if rgba.len() != expected {
        return Err(BannerError::BadPixelBuffer { expected, actual: rgba.len() });
    }

    let mut out = vec![0u8; PIXEL_DATA_SIZE];
    for pixel in 0..BANNER_WIDTH * BANNER_HEIGHT {
        let tile = pixel / (TILE * TILE);
        let tile_pixel = pixel % (TILE * TILE);
        let x = (tile % TILES_X) * TILE + tile_pixel % TILE;
        let y = (tile / TILES_X) * TILE + tile_pixel / TILE;

        let i = (y * BANNER_WIDTH + x) * 4;
        let (r, g, b, a) = (rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]);
        let v = (u16::from(a >> 7) << 15)
            | (u16::from(r >> 3) << 10)
            | (u16::from(g >> 3) << 5)
            | u16::from(b >> 3);
        BigEndian::write_u16(&mut out[pixel * 2..pixel * 2 + 2], v);
    }
    Ok(out)
}

// 5-bit channel to 8-bit, full range.
fn expand5(v: u8) -> u8 {
    (u16::from(v) * 255 / 31) as u8
}
