//! DOL executable parsing.
//!
//! The main executable (`start.dol`) has a fixed 0x100-byte header: 7 text
//! and 11 data section slots, each a (file offset, load address, size)
//! triple split across three tables, then the BSS address/size and the entry
//! point. The apploader loads sections one by one; sections are contiguous
//! in the file but may land with gaps in memory.

use crate::cursor::ByteReader;
use thiserror::Error;

pub const TEXT_SECTION_COUNT: usize = 7;
pub const DATA_SECTION_COUNT: usize = 11;
pub const HEADER_SIZE: usize = 0x100;

#[derive(Error, Debug)]
pub enum DolError {
    #[error("DOL header truncated: {0} bytes")]
    Truncated(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Text,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub index: usize,
    pub offset: u32,
    pub address: u32,
    pub size: u32,
}

impl Section {
    pub fn end_offset(&self) -> u32 {
        self.offset + self.size
    }

    pub fn end_address(&self) -> u32 {
        self.address + self.size
    }
}

#[derive(Debug, Clone)]
pub struct Dol {
    pub text_sections: Vec<Section>,
    pub data_sections: Vec<Section>,
    pub bss_address: u32,
    pub bss_size: u32,
    pub entry_point: u32,
    size: u32,
}

impl Dol {
    pub fn parse(data: &[u8]) -> Result<Self, DolError> {
        if data.len() < HEADER_SIZE {
            return Err(DolError::Truncated(data.len()));
        }

        let mut r = ByteReader::new(data);
        let mut offsets = [0u32; TEXT_SECTION_COUNT + DATA_SECTION_COUNT];
        let mut addresses = [0u32; TEXT_SECTION_COUNT + DATA_SECTION_COUNT];
        let mut sizes = [0u32; TEXT_SECTION_COUNT + DATA_SECTION_COUNT];
        for v in offsets.iter_mut() {
            *v = r.read_u32()?;
        }
        for v in addresses.iter_mut() {
            *v = r.read_u32()?;
        }
        for v in sizes.iter_mut() {
            *v = r.read_u32()?;
        }
        let bss_address = r.read_u32()?;
        let bss_size = r.read_u32()?;
        let entry_point = r.read_u32()?;

        let text_sections = zip_sections(
            SectionKind::Text,
            &offsets[..TEXT_SECTION_COUNT],
            &addresses[..TEXT_SECTION_COUNT],
            &sizes[..TEXT_SECTION_COUNT],
        );
        let data_sections = zip_sections(
            SectionKind::Data,
            &offsets[TEXT_SECTION_COUNT..],
            &addresses[TEXT_SECTION_COUNT..],
            &sizes[TEXT_SECTION_COUNT..],
        );

        // Total file size from every populated slot, not just the ones that
        // survive the termination rule above.
        let mut size = HEADER_SIZE as u32;
        for i in 0..offsets.len() {
            if sizes[i] != 0 {
                size = size.max(offsets[i].saturating_add(sizes[i]));
            }
        }

        Ok(Self { text_sections, data_sections, bss_address, bss_size, entry_point, size })
    }

    /// Size of the DOL file, from the section table alone.
    pub fn total_size(&self) -> u32 {
        self.size
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.text_sections.iter().chain(self.data_sections.iter())
    }

    pub fn section_by_address(&self, address: u32) -> Option<&Section> {
        self.sections()
            .find(|s| address >= s.address && address < s.end_address())
    }

    pub fn section_by_offset(&self, offset: u32) -> Option<&Section> {
        self.sections()
            .find(|s| offset >= s.offset && offset < s.end_offset())
    }

    /// Map a load address back to its offset in the DOL file.
    pub fn address_to_offset(&self, address: u32) -> Option<u32> {
        let s = self.section_by_address(address)?;
        Some(s.offset + (address - s.address))
    }

    /// Map a DOL file offset to the address it is loaded at.
    pub fn offset_to_address(&self, offset: u32) -> Option<u32> {
        let s = self.section_by_offset(offset)?;
        Some(s.address + (offset - s.offset))
    }
}

// A zero offset, address or size terminates the slot list.
fn zip_sections(kind: SectionKind, offsets: &[u32], addresses: &[u32], sizes: &[u32]) -> Vec<Section> {
    let mut out = Vec::new();
    for (i, ((&offset, &address), &size)) in offsets.iter().zip(addresses).zip(sizes).enumerate() {
        if offset == 0 || address == 0 || size == 0 {
            break;
        }
        out.push(Section { kind, index: i, offset, address, size });
    }
    out
}
