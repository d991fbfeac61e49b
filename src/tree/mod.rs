//! In-memory disc filesystem tree.
//!
//! The flat on-disc FST is reconstructed as an explicit owned tree: every
//! directory owns its children in disc order (insertion order is encoding
//! order, which in turn fixes the file layout of a rebuilt image). File
//! content is kept lazy — a node either still points into the source image
//! ([`FileSource::Borrowed`]) or carries injected bytes
//! ([`FileSource::Owned`]); nothing is copied until rebuild time.
//!
//! Path and name comparisons are case-sensitive exact byte matches. Disc
//! names are ASCII in practice and the on-disc format only requires
//! uniqueness among siblings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("no such path: {0}")]
    NotFound(String),
    #[error("name already exists in this directory: {0}")]
    NameCollision(String),
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
}

/// Where a file's bytes live until the image is rebuilt.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Still resident in the source image at `offset`.
    Borrowed { offset: u32, length: u32 },
    /// Injected or replaced content.
    Owned(Vec<u8>),
}

impl FileSource {
    pub fn len(&self) -> u64 {
        match self {
            FileSource::Borrowed { length, .. } => u64::from(*length),
            FileSource::Owned(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: String,
    pub source: FileSource,
}

#[derive(Debug, Clone, Default)]
pub struct DirNode {
    pub name: String,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Dir(DirNode),
    File(FileNode),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Dir(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(f) => Some(f),
            Node::Dir(_) => None,
        }
    }

    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Node::Dir(d) => Some(d),
            Node::File(_) => None,
        }
    }
}

impl DirNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), children: Vec::new() }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name() == name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name() == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }
}

fn check_name(name: &str) -> Result<(), TreeError> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(TreeError::InvalidName(name.to_owned()));
    }
    Ok(())
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// The decoded filesystem of one disc image.
///
/// The root directory is unnamed and is not addressable as a node itself;
/// the empty path (or `"/"`) refers to it in directory-taking operations.
#[derive(Debug, Clone, Default)]
pub struct DiscTree {
    pub root: DirNode,
}

impl DiscTree {
    pub fn new() -> Self {
        Self { root: DirNode::new("") }
    }

    pub fn find(&self, path: &str) -> Result<&Node, TreeError> {
        let segs: Vec<&str> = segments(path).collect();
        let (last, dirs) = segs.split_last().ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
        let mut dir = &self.root;
        for seg in dirs {
            let node = dir.child(seg).ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
            dir = node.as_dir().ok_or_else(|| TreeError::NotADirectory(path.to_owned()))?;
        }
        dir.child(last).ok_or_else(|| TreeError::NotFound(path.to_owned()))
    }

    /// Resolve a directory path; the empty path is the root.
    pub fn find_dir(&self, path: &str) -> Result<&DirNode, TreeError> {
        let mut dir = &self.root;
        for seg in segments(path) {
            let node = dir.child(seg).ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
            dir = node.as_dir().ok_or_else(|| TreeError::NotADirectory(path.to_owned()))?;
        }
        Ok(dir)
    }

    fn find_dir_mut(&mut self, path: &str) -> Result<&mut DirNode, TreeError> {
        let mut dir = &mut self.root;
        for seg in segments(path) {
            let node = dir.child_mut(seg).ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
            dir = match node {
                Node::Dir(d) => d,
                Node::File(_) => return Err(TreeError::NotADirectory(path.to_owned())),
            };
        }
        Ok(dir)
    }

    pub fn find_file(&self, path: &str) -> Result<&FileNode, TreeError> {
        self.find(path)?.as_file().ok_or_else(|| TreeError::NotAFile(path.to_owned()))
    }

    /// Append a file to `dir_path`. Fails on a sibling with the same name.
    pub fn insert_file(
        &mut self,
        dir_path: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<(), TreeError> {
        check_name(name)?;
        let dir = self.find_dir_mut(dir_path)?;
        if dir.has_child(name) {
            return Err(TreeError::NameCollision(name.to_owned()));
        }
        dir.children.push(Node::File(FileNode {
            name: name.to_owned(),
            source: FileSource::Owned(content),
        }));
        Ok(())
    }

    pub fn insert_dir(&mut self, dir_path: &str, name: &str) -> Result<(), TreeError> {
        check_name(name)?;
        let dir = self.find_dir_mut(dir_path)?;
        if dir.has_child(name) {
            return Err(TreeError::NameCollision(name.to_owned()));
        }
        dir.children.push(Node::Dir(DirNode::new(name)));
        Ok(())
    }

    /// Detach the node at `path` from its parent and return it.
    pub fn remove(&mut self, path: &str) -> Result<Node, TreeError> {
        let (parent_path, name) = split_parent(path).ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
        let dir = self.find_dir_mut(parent_path)?;
        let idx = dir
            .children
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
        Ok(dir.children.remove(idx))
    }

    /// Swap in new content for the file at `path`. Disc offsets are not
    /// touched; layout is recomputed wholesale at rebuild time.
    pub fn replace_file_content(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), TreeError> {
        let (parent_path, name) = split_parent(path).ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
        let dir = self.find_dir_mut(parent_path)?;
        match dir.child_mut(name) {
            Some(Node::File(f)) => {
                f.source = FileSource::Owned(bytes);
                Ok(())
            }
            Some(Node::Dir(_)) => Err(TreeError::NotAFile(path.to_owned())),
            None => Err(TreeError::NotFound(path.to_owned())),
        }
    }

    /// Rename the node at `path`, keeping its position among its siblings.
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<(), TreeError> {
        check_name(new_name)?;
        let (parent_path, name) = split_parent(path).ok_or_else(|| TreeError::NotFound(path.to_owned()))?;
        let dir = self.find_dir_mut(parent_path)?;
        if name != new_name && dir.has_child(new_name) {
            return Err(TreeError::NameCollision(new_name.to_owned()));
        }
        match dir.child_mut(name) {
            Some(Node::Dir(d)) => {
                d.name = new_name.to_owned();
                Ok(())
            }
            Some(Node::File(f)) => {
                f.name = new_name.to_owned();
                Ok(())
            }
            None => Err(TreeError::NotFound(path.to_owned())),
        }
    }

    /// Visit every node in pre-order with its full path.
    pub fn visit<'a>(&'a self, mut f: impl FnMut(&str, &'a Node)) {
        fn walk<'a>(dir: &'a DirNode, prefix: &str, f: &mut impl FnMut(&str, &'a Node)) {
            for child in &dir.children {
                let path = if prefix.is_empty() {
                    child.name().to_owned()
                } else {
                    format!("{}/{}", prefix, child.name())
                };
                f(&path, child);
                if let Node::Dir(d) = child {
                    walk(d, &path, f);
                }
            }
        }
        walk(&self.root, "", &mut f);
    }

    pub fn file_count(&self) -> usize {
        let mut n = 0;
        self.visit(|_, node| {
            if !node.is_dir() {
                n += 1;
            }
        });
        n
    }

    /// Total entry count the FST will carry, root included.
    pub fn entry_count(&self) -> usize {
        let mut n = 1;
        self.visit(|_, _| n += 1);
        n
    }
}

fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(i) => Some((&trimmed[..i], &trimmed[i + 1..])),
        None => Some(("", trimmed)),
    }
}
