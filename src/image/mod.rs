//! Disc image reading and rebuilding.
//!
//! # Reader
//! [`IsoReader`] borrows a complete image, validates the header and the FST
//! bounds up front, and decodes the FST into a [`DiscTree`] whose file nodes
//! point back into the image. Extraction is a bounds-checked slice — a
//! corrupt or adversarial FST referencing data past the end of the image
//! fails that one extraction without poisoning the rest of the tree.
//!
//! # Rebuild
//! [`rebuild`] lays out a brand-new image from a (possibly mutated) tree and
//! the original bytes: the untouched system area is copied verbatim, the FST
//! is re-encoded and placed on the first segment boundary after the DOL, and
//! every file is re-homed to an alignment boundary in pre-order — the same
//! order the FST lists them, so output images stay diffable against the
//! tools that established that convention. Rebuilding is all-or-nothing; no
//! partially laid-out image is ever returned.

use crate::dol::{Dol, DolError};
use crate::fst::{self, FstError};
use crate::header::{
    self, ApploaderInfo, DiscHeader, HeaderError, APPLOADER_HEADER_SIZE, APPLOADER_OFFSET,
    BI2_OFFSET, BI2_SIZE, BOOT_SIZE,
};
use crate::tree::{DiscTree, FileNode, FileSource};
use serde::Serialize;
use thiserror::Error;

/// Default start-offset alignment for file data, the GameCube convention.
pub const FILE_ALIGNMENT: u32 = 0x8000;

/// Boundary the FST itself is placed on.
pub const SEGMENT_ALIGNMENT: u32 = 0x100;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("header: {0}")]
    Header(#[from] HeaderError),
    #[error("corrupt FST: {0}")]
    CorruptFst(#[from] FstError),
    #[error("FST region {offset:#x}+{size:#x} exceeds the image ({image} bytes)")]
    FstOutOfBounds { offset: u32, size: u32, image: usize },
    #[error("data range {offset:#x}+{length:#x} exceeds the image ({image} bytes)")]
    OutOfBounds { offset: u32, length: u32, image: usize },
    #[error("DOL: {0}")]
    Dol(#[from] DolError),
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("file too large for a 32-bit length: {name} ({length} bytes)")]
    FileTooLarge { name: String, length: u64 },
    #[error("layout overflow: {0}")]
    LayoutOverflow(String),
    #[error("source data {offset:#x}+{length:#x} exceeds the original image ({image} bytes)")]
    OutOfBounds { offset: u32, length: u32, image: usize },
    #[error("header: {0}")]
    Header(#[from] HeaderError),
    #[error("FST encode: {0}")]
    Encode(#[from] FstError),
    #[error("DOL: {0}")]
    Dol(#[from] DolError),
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// A pseudo-file of the system area, addressed by convention rather than by
/// an FST entry.
#[derive(Debug, Clone, Serialize)]
pub struct SystemFile {
    pub name: &'static str,
    pub offset: u32,
    pub size: u32,
}

pub struct IsoReader<'a> {
    data: &'a [u8],
    pub header: DiscHeader,
    pub apploader: ApploaderInfo,
}

impl<'a> IsoReader<'a> {
    /// Parse the header and validate that the FST lies inside the image.
    pub fn new(data: &'a [u8]) -> Result<Self, ImageError> {
        let header = DiscHeader::parse(data)?;
        let apploader = ApploaderInfo::parse(data)?;

        let fst_end = u64::from(header.fst_offset) + u64::from(header.fst_size);
        if fst_end > data.len() as u64 {
            return Err(ImageError::FstOutOfBounds {
                offset: header.fst_offset,
                size: header.fst_size,
                image: data.len(),
            });
        }

        Ok(Self { data, header, apploader })
    }

    pub fn image(&self) -> &'a [u8] {
        self.data
    }

    pub fn fst_bytes(&self) -> &'a [u8] {
        let start = self.header.fst_offset as usize;
        &self.data[start..start + self.header.fst_size as usize]
    }

    /// Decode the FST into a tree of `Borrowed` file nodes.
    pub fn read_tree(&self) -> Result<DiscTree, ImageError> {
        Ok(fst::decode(self.fst_bytes())?)
    }

    /// Bounds-checked slice of the image.
    pub fn slice(&self, offset: u32, length: u32) -> Result<&'a [u8], ImageError> {
        let end = u64::from(offset) + u64::from(length);
        if end > self.data.len() as u64 {
            return Err(ImageError::OutOfBounds { offset, length, image: self.data.len() });
        }
        Ok(&self.data[offset as usize..end as usize])
    }

    /// The content of one file node.
    pub fn extract<'f>(&self, file: &'f FileNode) -> Result<&'f [u8], ImageError>
    where
        'a: 'f,
    {
        match &file.source {
            FileSource::Borrowed { offset, length } => self.slice(*offset, *length),
            FileSource::Owned(bytes) => Ok(bytes),
        }
    }

    /// Parse the main executable at the header's DOL offset.
    pub fn dol(&self) -> Result<Dol, ImageError> {
        let start = self.header.dol_offset as usize;
        if start >= self.data.len() {
            return Err(ImageError::OutOfBounds {
                offset: self.header.dol_offset,
                length: crate::dol::HEADER_SIZE as u32,
                image: self.data.len(),
            });
        }
        Ok(Dol::parse(&self.data[start..])?)
    }

    /// The system-area pseudo-files: boot.bin, bi2.bin, appldr.bin,
    /// start.dol and fst.bin.
    pub fn system_files(&self) -> Result<Vec<SystemFile>, ImageError> {
        let dol = self.dol()?;
        Ok(vec![
            SystemFile { name: "boot.bin", offset: 0, size: BOOT_SIZE as u32 },
            SystemFile { name: "bi2.bin", offset: BI2_OFFSET as u32, size: BI2_SIZE as u32 },
            SystemFile {
                name: "appldr.bin",
                offset: self.apploader.code_offset() as u32,
                size: self.apploader.code_size,
            },
            SystemFile { name: "start.dol", offset: self.header.dol_offset, size: dol.total_size() },
            SystemFile { name: "fst.bin", offset: self.header.fst_offset, size: self.header.fst_size },
        ])
    }
}

// ── Rebuild ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Start-offset alignment for every file. Must be a power of two.
    pub alignment: u32,
    /// Fix the FST location instead of placing it after the DOL.
    pub fst_offset: Option<u32>,
    /// Pad the output up to this size (e.g. the full 1.4 GB disc).
    pub min_image_size: Option<u64>,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self { alignment: FILE_ALIGNMENT, fst_offset: None, min_image_size: None }
    }
}

/// Lay out and serialize a new image from `tree`, pulling unmodified file
/// content out of `original`.
///
/// The tree is walked read-only; offsets recorded in `Borrowed` sources
/// always refer to `original`, never to the image being produced.
pub fn rebuild(tree: &DiscTree, original: &[u8], opts: &RebuildOptions) -> Result<Vec<u8>, BuildError> {
    if !opts.alignment.is_power_of_two() {
        return Err(BuildError::LayoutOverflow(format!(
            "alignment {:#x} is not a power of two",
            opts.alignment
        )));
    }

    let header = DiscHeader::parse(original)?;

    // Collect files in pre-order — the exact order fst::encode assigns
    // their entries.
    let mut files: Vec<&FileNode> = Vec::new();
    tree.visit(|_, node| {
        if let crate::tree::Node::File(f) = node {
            files.push(f);
        }
    });
    for f in &files {
        let length = f.source.len();
        if length > u64::from(u32::MAX) {
            return Err(BuildError::FileTooLarge { name: f.name.clone(), length });
        }
        // Validate borrowed ranges now so serialization below cannot fail.
        if let FileSource::Borrowed { offset, length } = f.source {
            if u64::from(offset) + u64::from(length) > original.len() as u64 {
                return Err(BuildError::OutOfBounds { offset, length, image: original.len() });
            }
        }
    }

    let mut layout = fst::encode(tree)?;
    let fst_size = layout.size();
    if fst_size > u32::MAX as usize {
        return Err(BuildError::LayoutOverflow(format!("FST of {fst_size} bytes")));
    }

    // End of the fixed system area: boot.bin + bi2.bin + apploader + DOL.
    let dol_start = header.dol_offset as usize;
    if dol_start >= original.len() {
        return Err(BuildError::OutOfBounds {
            offset: header.dol_offset,
            length: crate::dol::HEADER_SIZE as u32,
            image: original.len(),
        });
    }
    let dol = Dol::parse(&original[dol_start..])?;
    let dol_end = u64::from(header.dol_offset) + u64::from(dol.total_size());
    let system_end = dol_end.max((APPLOADER_OFFSET + APPLOADER_HEADER_SIZE) as u64);
    if system_end > original.len() as u64 {
        return Err(BuildError::OutOfBounds {
            offset: header.dol_offset,
            length: dol.total_size(),
            image: original.len(),
        });
    }

    let fst_offset = match opts.fst_offset {
        Some(fixed) => {
            if u64::from(fixed) < system_end {
                return Err(BuildError::LayoutOverflow(format!(
                    "FST at {fixed:#x} overlaps the system area ending at {system_end:#x}"
                )));
            }
            u64::from(fixed)
        }
        None => align_up(system_end, SEGMENT_ALIGNMENT),
    };
    if fst_offset > u64::from(u32::MAX) {
        return Err(BuildError::LayoutOverflow(format!("FST offset {fst_offset:#x}")));
    }

    // Assign every file its aligned offset, advancing a single cursor in
    // pre-order. Offsets are patched into the already-built flat array.
    let mut cursor = fst_offset + fst_size as u64;
    let mut placements: Vec<u64> = Vec::with_capacity(files.len());
    for nth in 0..files.len() {
        let offset = align_up(cursor, opts.alignment);
        if offset > u64::from(u32::MAX) {
            return Err(BuildError::LayoutOverflow(format!(
                "file {} placed past the 32-bit offset range",
                files[nth].name
            )));
        }
        layout.set_file_offset(nth, offset as u32);
        placements.push(offset);
        cursor = offset + u64::from(layout.file_length(nth));
    }

    let mut total = cursor;
    if let Some(min) = opts.min_image_size {
        total = total.max(min);
    }

    // Serialize: system area, patched header, FST, then file data with the
    // zero padding implied by the pre-sized buffer.
    let mut out = vec![0u8; total as usize];
    out[..system_end as usize].copy_from_slice(&original[..system_end as usize]);
    header::patch_layout(
        &mut out,
        header.dol_offset,
        fst_offset as u32,
        fst_size as u32,
        header.max_fst_size.max(fst_size as u32),
    );

    let fst_bytes = layout.to_bytes();
    out[fst_offset as usize..fst_offset as usize + fst_bytes.len()].copy_from_slice(&fst_bytes);

    for (f, &offset) in files.iter().zip(&placements) {
        let dest = &mut out[offset as usize..];
        match &f.source {
            FileSource::Borrowed { offset: src, length } => {
                let src = *src as usize;
                dest[..*length as usize].copy_from_slice(&original[src..src + *length as usize]);
            }
            FileSource::Owned(bytes) => {
                dest[..bytes.len()].copy_from_slice(bytes);
            }
        }
    }

    Ok(out)
}

fn align_up(v: u64, alignment: u32) -> u64 {
    let a = u64::from(alignment);
    (v + a - 1) & !(a - 1)
}
