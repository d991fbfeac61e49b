//! Disc header (boot.bin) and apploader metadata.
//!
//! The first 0x2440 bytes of a GameCube image are a fixed system area:
//!
//! | range            | contents                    |
//! |------------------|-----------------------------|
//! | 0x0000 .. 0x0440 | boot.bin (disc header)      |
//! | 0x0440 .. 0x2440 | bi2.bin (disc information)  |
//! | 0x2440 .. ...    | apploader header + code     |
//!
//! The four layout fields at 0x420 (DOL offset, FST offset/size/max size)
//! are the only header bytes this crate ever rewrites.

use crate::cursor::{cstr_at, ByteReader};
use thiserror::Error;

pub const BOOT_SIZE: usize = 0x440;
pub const BI2_OFFSET: usize = 0x440;
pub const BI2_SIZE: usize = 0x2000;
pub const APPLOADER_OFFSET: usize = 0x2440;
pub const APPLOADER_HEADER_SIZE: usize = 0x20;

/// Offset of the dol/fst layout block inside boot.bin.
pub const LAYOUT_OFFSET: usize = 0x420;

/// GameCube disc magic word at offset 0x1C.
pub const GCN_MAGIC: u32 = 0xC233_9F3D;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("image too small for the system area: {0} bytes")]
    Truncated(usize),
    #[error("missing GameCube magic word at 0x1c (found {0:#010x})")]
    BadMagic(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct DiscHeader {
    pub game_code:    [u8; 4],
    pub maker_code:   [u8; 2],
    pub disc_id:      u8,
    pub version:      u8,
    pub game_name:    String,
    pub dol_offset:   u32,
    pub fst_offset:   u32,
    pub fst_size:     u32,
    pub max_fst_size: u32,
}

impl DiscHeader {
    pub fn parse(image: &[u8]) -> Result<Self, HeaderError> {
        if image.len() < BOOT_SIZE {
            return Err(HeaderError::Truncated(image.len()));
        }

        let mut r = ByteReader::new(image);
        let game_code: [u8; 4] = r.read_array()?;
        let maker_code: [u8; 2] = r.read_array()?;
        let disc_id = r.read_u8()?;
        let version = r.read_u8()?;

        r.seek(0x1C);
        let magic = r.read_u32()?;
        if magic != GCN_MAGIC {
            return Err(HeaderError::BadMagic(magic));
        }

        // Game name: null-terminated ASCII, field runs to 0x400.
        let name_bytes = cstr_at(&image[..0x400], 0x20).unwrap_or(&image[0x20..0x400]);
        let game_name = String::from_utf8_lossy(name_bytes).into_owned();

        r.seek(LAYOUT_OFFSET);
        let dol_offset = r.read_u32()?;
        let fst_offset = r.read_u32()?;
        let fst_size = r.read_u32()?;
        let max_fst_size = r.read_u32()?;

        Ok(Self {
            game_code,
            maker_code,
            disc_id,
            version,
            game_name,
            dol_offset,
            fst_offset,
            fst_size,
            max_fst_size,
        })
    }

    pub fn game_code_str(&self) -> String {
        String::from_utf8_lossy(&self.game_code).into_owned()
    }

    pub fn maker_code_str(&self) -> String {
        String::from_utf8_lossy(&self.maker_code).into_owned()
    }
}

/// Overwrite the layout block at 0x420. `image` must cover boot.bin.
pub fn patch_layout(image: &mut [u8], dol_offset: u32, fst_offset: u32, fst_size: u32, max_fst_size: u32) {
    image[LAYOUT_OFFSET..LAYOUT_OFFSET + 4].copy_from_slice(&dol_offset.to_be_bytes());
    image[LAYOUT_OFFSET + 4..LAYOUT_OFFSET + 8].copy_from_slice(&fst_offset.to_be_bytes());
    image[LAYOUT_OFFSET + 8..LAYOUT_OFFSET + 12].copy_from_slice(&fst_size.to_be_bytes());
    image[LAYOUT_OFFSET + 12..LAYOUT_OFFSET + 16].copy_from_slice(&max_fst_size.to_be_bytes());
}

#[derive(Debug, Clone)]
pub struct ApploaderInfo {
    /// Build date of the apploader, ASCII `YYYY/MM/DD`.
    pub date:         [u8; 10],
    pub entry_point:  u32,
    pub code_size:    u32,
    pub trailer_size: u32,
}

impl ApploaderInfo {
    pub fn parse(image: &[u8]) -> Result<Self, HeaderError> {
        if image.len() < APPLOADER_OFFSET + APPLOADER_HEADER_SIZE {
            return Err(HeaderError::Truncated(image.len()));
        }
        let mut r = ByteReader::new(image);
        r.seek(APPLOADER_OFFSET);
        let date: [u8; 10] = r.read_array()?;
        r.skip(6)?;
        let entry_point = r.read_u32()?;
        let code_size = r.read_u32()?;
        let trailer_size = r.read_u32()?;
        Ok(Self { date, entry_point, code_size, trailer_size })
    }

    pub fn date_str(&self) -> String {
        String::from_utf8_lossy(&self.date).trim_end_matches('\0').to_owned()
    }

    /// Offset of the apploader code, right after the 0x20-byte header.
    pub fn code_offset(&self) -> usize {
        APPLOADER_OFFSET + APPLOADER_HEADER_SIZE
    }
}
