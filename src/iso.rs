//! High-level [`IsoFile`] API — the primary embedding surface.
//!
//! ```no_run
//! use gcdisc::iso::IsoFile;
//!
//! let mut iso = IsoFile::open("game.iso")?;
//! let banner = iso.banner("opening.bnr")?;
//! println!("{}", banner.meta[0].game_name);
//!
//! iso.insert_file("audio", "extra.hps", std::fs::read("extra.hps")?)?;
//! let rebuilt = iso.rebuild(&Default::default())?;
//! std::fs::write("modded.iso", rebuilt)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::banner::{Banner, BannerError};
use crate::dol::Dol;
use crate::header::{ApploaderInfo, DiscHeader};
use crate::image::{self, BuildError, ImageError, IsoReader, RebuildOptions, SystemFile};
use crate::tree::{DiscTree, FileNode, FileSource, Node, TreeError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IsoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("banner: {0}")]
    Banner(#[from] BannerError),
}

/// Lightweight descriptor returned by [`IsoFile::list`].
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Offset in the source image; `None` for directories and injected
    /// content that has no disc location until the next rebuild.
    pub offset: Option<u32>,
}

/// Outcome of [`IsoFile::extract_all`]. Out-of-range files are reported
/// individually instead of aborting the remaining extractions.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub written: usize,
    pub failed: Vec<(String, ImageError)>,
}

/// An owned disc image plus its decoded filesystem tree.
#[derive(Debug)]
pub struct IsoFile {
    data: Vec<u8>,
    pub tree: DiscTree,
    pub header: DiscHeader,
    pub apploader: ApploaderInfo,
}

impl IsoFile {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IsoError> {
        Self::load(std::fs::read(path)?)
    }

    pub fn load(data: Vec<u8>) -> Result<Self, IsoError> {
        let reader = IsoReader::new(&data)?;
        let tree = reader.read_tree()?;
        let header = reader.header.clone();
        let apploader = reader.apploader.clone();
        Ok(Self { data, tree, header, apploader })
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.data
    }

    // ── Listing and reading ──────────────────────────────────────────────────

    pub fn list(&self) -> Vec<FileInfo> {
        let mut out = Vec::new();
        self.tree.visit(|path, node| {
            out.push(match node {
                Node::Dir(_) => FileInfo {
                    path: path.to_owned(),
                    is_dir: true,
                    size: 0,
                    offset: None,
                },
                Node::File(f) => FileInfo {
                    path: path.to_owned(),
                    is_dir: false,
                    size: f.source.len(),
                    offset: match f.source {
                        FileSource::Borrowed { offset, .. } => Some(offset),
                        FileSource::Owned(_) => None,
                    },
                },
            });
        });
        out
    }

    fn content_of<'f>(&'f self, file: &'f FileNode) -> Result<&'f [u8], ImageError> {
        match &file.source {
            FileSource::Borrowed { offset, length } => {
                let end = u64::from(*offset) + u64::from(*length);
                if end > self.data.len() as u64 {
                    return Err(ImageError::OutOfBounds {
                        offset: *offset,
                        length: *length,
                        image: self.data.len(),
                    });
                }
                Ok(&self.data[*offset as usize..end as usize])
            }
            FileSource::Owned(bytes) => Ok(bytes),
        }
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, IsoError> {
        let file = self.tree.find_file(path)?;
        Ok(self.content_of(file)?.to_vec())
    }

    /// The ordered children of one directory; the empty path is the root.
    pub fn list_dir(&self, path: &str) -> Result<&[Node], IsoError> {
        Ok(&self.tree.find_dir(path)?.children)
    }

    /// Extract every file into `dest`, recreating the directory layout.
    pub fn extract_all<P: AsRef<Path>>(&self, dest: P) -> Result<ExtractReport, IsoError> {
        let dest = dest.as_ref();
        let mut report = ExtractReport::default();
        let mut io_err: Option<io::Error> = None;

        self.tree.visit(|path, node| {
            if io_err.is_some() {
                return;
            }
            let target = dest.join(path);
            let result = match node {
                Node::Dir(_) => std::fs::create_dir_all(&target),
                Node::File(f) => match self.content_of(f) {
                    Ok(bytes) => (|| {
                        if let Some(parent) = target.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        File::create(&target)?.write_all(bytes)?;
                        report.written += 1;
                        Ok(())
                    })(),
                    Err(e) => {
                        // A bad range fails this file only.
                        report.failed.push((path.to_owned(), e));
                        Ok(())
                    }
                },
            };
            if let Err(e) = result {
                io_err = Some(e);
            }
        });

        match io_err {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    // ── System area ──────────────────────────────────────────────────────────

    pub fn system_files(&self) -> Result<Vec<SystemFile>, IsoError> {
        Ok(IsoReader::new(&self.data)?.system_files()?)
    }

    pub fn read_system_file(&self, name: &str) -> Result<Vec<u8>, IsoError> {
        let reader = IsoReader::new(&self.data)?;
        let files = reader.system_files()?;
        let entry = files
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| TreeError::NotFound(name.to_owned()))?;
        Ok(reader.slice(entry.offset, entry.size)?.to_vec())
    }

    pub fn banner(&self, path: &str) -> Result<Banner, IsoError> {
        let bytes = self.read_file(path)?;
        Ok(Banner::parse(&bytes)?)
    }

    pub fn dol(&self) -> Result<Dol, IsoError> {
        Ok(IsoReader::new(&self.data)?.dol()?)
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    pub fn insert_file(&mut self, dir_path: &str, name: &str, content: Vec<u8>) -> Result<(), IsoError> {
        Ok(self.tree.insert_file(dir_path, name, content)?)
    }

    pub fn insert_dir(&mut self, dir_path: &str, name: &str) -> Result<(), IsoError> {
        Ok(self.tree.insert_dir(dir_path, name)?)
    }

    pub fn remove(&mut self, path: &str) -> Result<(), IsoError> {
        self.tree.remove(path)?;
        Ok(())
    }

    pub fn replace_file_content(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), IsoError> {
        Ok(self.tree.replace_file_content(path, bytes)?)
    }

    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<(), IsoError> {
        Ok(self.tree.rename(path, new_name)?)
    }

    // ── Rebuild ──────────────────────────────────────────────────────────────

    /// Serialize a new image reflecting the current tree.
    pub fn rebuild(&self, opts: &RebuildOptions) -> Result<Vec<u8>, IsoError> {
        Ok(image::rebuild(&self.tree, &self.data, opts)?)
    }

    pub fn rebuild_to<P: AsRef<Path>>(&self, path: P, opts: &RebuildOptions) -> Result<(), IsoError> {
        let bytes = self.rebuild(opts)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
