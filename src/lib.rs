pub mod cursor;
pub mod header;
pub mod fst;
pub mod tree;
pub mod dol;
pub mod banner;
pub mod image;
pub mod iso;

pub use banner::{Banner, BannerMeta};
pub use header::{ApploaderInfo, DiscHeader};
pub use image::{rebuild, IsoReader, RebuildOptions};
pub use iso::{FileInfo, IsoFile};
pub use tree::{DiscTree, Node};
