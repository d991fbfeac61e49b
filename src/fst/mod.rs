//! File System Table codec — the binary directory index of a disc image.
//!
//! # On-disc format
//! The FST is a flat array of 12-byte entries followed by a string table of
//! null-terminated names. Entry 0 is the root directory; its `next_index`
//! field holds the total entry count. Each entry packs a directory flag into
//! the top byte of a 24-bit name offset, then two 32-bit words: data
//! offset/length for files, parent index/one-past-subtree index for
//! directories. Subtrees are contiguous and stored in pre-order, so a single
//! forward pass with a directory stack reconstructs the whole tree.
//!
//! The flag/offset bit packing stays inside this module; everywhere else a
//! node is an explicit [`Node::Dir`]/[`Node::File`] variant.
//!
//! # Corruption
//! Decoding is all-or-nothing: any structural violation (a `next_index` that
//! does not advance or escapes its parent, a parent index that does not name
//! the enclosing directory, a name offset past the string table) aborts with
//! a typed [`FstError`] and no partial tree is returned.

use crate::cursor::{cstr_at, ByteReader, ByteWriter};
use crate::tree::{DirNode, DiscTree, FileNode, FileSource, Node};
use thiserror::Error;

/// Size of one FST entry.
pub const ENTRY_SIZE: usize = 0xC;

/// Name offsets are 24-bit.
pub const MAX_NAME_OFFSET: u32 = 0xFF_FFFF;

#[derive(Error, Debug)]
pub enum FstError {
    #[error("FST region too small: {0} bytes")]
    Truncated(usize),
    #[error("entry table needs {need} bytes for {count} entries but the FST region is {len} bytes")]
    EntryTableOverrun { count: u32, need: u64, len: usize },
    #[error("entry 0 is not a directory")]
    RootNotDirectory,
    #[error("root parent index is {0}, expected 0")]
    BadRootParent(u32),
    #[error("directory entry {index}: next index {next} does not advance past the entry")]
    NextIndexTooSmall { index: u32, next: u32 },
    #[error("directory entry {index}: next index {next} escapes the enclosing directory (ends at {end})")]
    NextIndexEscapes { index: u32, next: u32, end: u32 },
    #[error("entry {index}: parent index {parent} does not name the enclosing directory ({expected})")]
    ParentMismatch { index: u32, parent: u32, expected: u32 },
    #[error("entry {index}: name offset {offset:#x} has no terminated string in the string table")]
    NameOutOfBounds { index: u32, offset: u32 },
    #[error("entry {index}: name is not valid UTF-8")]
    InvalidName { index: u32 },
    #[error("string table exceeds the 24-bit name offset range")]
    StringTableOverflow,
    #[error("file too large for a 32-bit length: {name} ({length} bytes)")]
    FileTooLarge { name: String, length: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// One flat entry, flag already unpacked. `offset`/`length` double as
// parent index/next index for directories, as on disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawEntry {
    dir: bool,
    name_offset: u32,
    offset: u32,
    length: u32,
}

impl RawEntry {
    fn parse(r: &mut ByteReader<'_>) -> Result<Self, FstError> {
        let flag = r.read_u8()?;
        let name_offset = r.read_u24()?;
        let offset = r.read_u32()?;
        let length = r.read_u32()?;
        Ok(Self { dir: flag != 0, name_offset, offset, length })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.write_u8(self.dir as u8);
        w.write_u24(self.name_offset);
        w.write_u32(self.offset);
        w.write_u32(self.length);
    }
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Decode the FST region of an image into a [`DiscTree`].
///
/// All file nodes come out as [`FileSource::Borrowed`]; the bytes themselves
/// stay in the source image.
pub fn decode(fst: &[u8]) -> Result<DiscTree, FstError> {
    if fst.len() < ENTRY_SIZE {
        return Err(FstError::Truncated(fst.len()));
    }

    let mut r = ByteReader::new(fst);
    let root_entry = RawEntry::parse(&mut r)?;
    if !root_entry.dir {
        return Err(FstError::RootNotDirectory);
    }
    if root_entry.offset != 0 {
        return Err(FstError::BadRootParent(root_entry.offset));
    }

    let count = root_entry.length;
    let table_len = u64::from(count) * ENTRY_SIZE as u64;
    if count == 0 || table_len > fst.len() as u64 {
        return Err(FstError::EntryTableOverrun { count, need: table_len, len: fst.len() });
    }
    let strings = &fst[table_len as usize..];

    // Directories whose subtrees are still open, innermost last. The root
    // lives outside the stack: its subtree closes at `count`, past the loop.
    struct Open {
        node: DirNode,
        index: u32,
        end: u32,
    }
    let mut root = DirNode::new("");
    let mut stack: Vec<Open> = Vec::new();

    fn close_one(root: &mut DirNode, stack: &mut Vec<Open>) {
        if let Some(done) = stack.pop() {
            match stack.last_mut() {
                Some(parent) => parent.node.children.push(Node::Dir(done.node)),
                None => root.children.push(Node::Dir(done.node)),
            }
        }
    }

    for index in 1..count {
        while stack.last().is_some_and(|top| index >= top.end) {
            close_one(&mut root, &mut stack);
        }

        r.seek(index as usize * ENTRY_SIZE);
        let entry = RawEntry::parse(&mut r)?;

        let name_bytes = cstr_at(strings, entry.name_offset as usize)
            .ok_or(FstError::NameOutOfBounds { index, offset: entry.name_offset })?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| FstError::InvalidName { index })?
            .to_owned();

        let parent_index = stack.last().map_or(0, |top| top.index);
        let parent_end = stack.last().map_or(count, |top| top.end);
        if entry.dir {
            if entry.offset != parent_index {
                return Err(FstError::ParentMismatch {
                    index,
                    parent: entry.offset,
                    expected: parent_index,
                });
            }
            if entry.length <= index {
                return Err(FstError::NextIndexTooSmall { index, next: entry.length });
            }
            if entry.length > parent_end {
                return Err(FstError::NextIndexEscapes { index, next: entry.length, end: parent_end });
            }
            stack.push(Open { node: DirNode { name, children: Vec::new() }, index, end: entry.length });
        } else {
            let file = Node::File(FileNode {
                name,
                source: FileSource::Borrowed { offset: entry.offset, length: entry.length },
            });
            match stack.last_mut() {
                Some(top) => top.node.children.push(file),
                None => root.children.push(file),
            }
        }
    }

    while !stack.is_empty() {
        close_one(&mut root, &mut stack);
    }

    Ok(DiscTree { root })
}

// ── Encode ───────────────────────────────────────────────────────────────────

/// The serialized shape of a tree: entry array plus string table, with file
/// data offsets still unassigned. The writer patches those in once the image
/// layout is known, then calls [`FstLayout::to_bytes`].
pub struct FstLayout {
    entries: Vec<RawEntry>,
    strings: Vec<u8>,
    // Entry indices of file entries, in the pre-order the tree was walked.
    file_entries: Vec<usize>,
}

impl FstLayout {
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn file_count(&self) -> usize {
        self.file_entries.len()
    }

    /// Total serialized size: entry table plus string table.
    pub fn size(&self) -> usize {
        self.entries.len() * ENTRY_SIZE + self.strings.len()
    }

    /// Length recorded for the `nth` file (pre-order).
    pub fn file_length(&self, nth: usize) -> u32 {
        self.entries[self.file_entries[nth]].length
    }

    /// Assign the disc offset of the `nth` file (pre-order).
    pub fn set_file_offset(&mut self, nth: usize, offset: u32) {
        let idx = self.file_entries[nth];
        self.entries[idx].offset = offset;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(self.size());
        for entry in &self.entries {
            entry.write(&mut w);
        }
        w.write_bytes(&self.strings);
        w.into_inner()
    }
}

/// Encode a tree into the flat entry array + string table.
///
/// The walk is pre-order, matching decode, so re-encoding an unmodified
/// decoded tree reproduces the original FST byte for byte once the file
/// offsets are restored. Names are appended to the string table in walk
/// order with no deduplication — the on-disc convention.
pub fn encode(tree: &DiscTree) -> Result<FstLayout, FstError> {
    let mut layout = FstLayout {
        entries: vec![RawEntry { dir: true, name_offset: 0, offset: 0, length: 0 }],
        strings: Vec::new(),
        file_entries: Vec::new(),
    };

    for child in &tree.root.children {
        emit(&mut layout, child, 0)?;
    }

    let count = layout.entries.len() as u32;
    layout.entries[0].length = count;
    Ok(layout)
}

fn emit(layout: &mut FstLayout, node: &Node, parent: u32) -> Result<(), FstError> {
    let index = layout.entries.len();

    let name_offset = layout.strings.len() as u64;
    if name_offset > u64::from(MAX_NAME_OFFSET) {
        return Err(FstError::StringTableOverflow);
    }
    layout.strings.extend_from_slice(node.name().as_bytes());
    layout.strings.push(0);

    match node {
        Node::File(f) => {
            let length = f.source.len();
            if length > u64::from(u32::MAX) {
                return Err(FstError::FileTooLarge { name: f.name.clone(), length });
            }
            layout.entries.push(RawEntry {
                dir: false,
                name_offset: name_offset as u32,
                offset: 0,
                length: length as u32,
            });
            layout.file_entries.push(index);
        }
        Node::Dir(d) => {
            layout.entries.push(RawEntry {
                dir: true,
                name_offset: name_offset as u32,
                offset: parent,
                length: 0,
            });
            for child in &d.children {
                emit(layout, child, index as u32)?;
            }
            // One past the last descendant, known only now.
            layout.entries[index].length = layout.entries.len() as u32;
        }
    }
    Ok(())
}
