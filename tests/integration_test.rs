use gcdisc::banner::{Banner, BannerMeta, BannerRegion};
use gcdisc::dol::Dol;
use gcdisc::fst::FstError;
use gcdisc::header::{DiscHeader, GCN_MAGIC};
use gcdisc::image::{BuildError, ImageError, RebuildOptions};
use gcdisc::iso::{IsoError, IsoFile};
use gcdisc::tree::TreeError;
use tempfile::tempdir;

fn write_u32(buf: &mut [u8], offset: usize, v: u32) {
    buf[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
}

/// A minimal valid image: boot.bin + bi2.bin + apploader header, a tiny DOL
/// at 0x2600 (one 0x40-byte text section at 0x100, so the DOL ends at
/// 0x2740), and an empty FST at 0x2800.
fn skeleton_image() -> Vec<u8> {
    let mut img = vec![0u8; 0x3000];
    img[..4].copy_from_slice(b"GTST");
    img[4..6].copy_from_slice(b"01");
    img[6] = 0;
    img[7] = 1;
    write_u32(&mut img, 0x1C, GCN_MAGIC);
    img[0x20..0x2A].copy_from_slice(b"Test Title");

    // apploader header
    img[0x2440..0x244A].copy_from_slice(b"2026/01/01");
    write_u32(&mut img, 0x2450, 0x8120_0000);
    write_u32(&mut img, 0x2454, 0x20);
    write_u32(&mut img, 0x2458, 0);

    // DOL
    let dol = 0x2600;
    write_u32(&mut img, dol, 0x100); // text0 offset
    write_u32(&mut img, dol + 0x48, 0x8000_3100); // text0 address
    write_u32(&mut img, dol + 0x90, 0x40); // text0 size
    write_u32(&mut img, dol + 0xE0, 0x8000_3100); // entry point

    // empty FST: the root entry alone
    let fst = 0x2800;
    img[fst] = 1;
    write_u32(&mut img, fst + 8, 1);

    // layout block
    write_u32(&mut img, 0x420, dol as u32);
    write_u32(&mut img, 0x424, fst as u32);
    write_u32(&mut img, 0x428, 12);
    write_u32(&mut img, 0x42C, 12);

    img
}

fn b_bin_content() -> Vec<u8> {
    (0..40_000).map(|i| (i % 251) as u8).collect()
}

/// Sample layout: `files/a.txt` (4 bytes) plus a sibling `b.bin`
/// (40000 bytes), rebuilt at the default 0x8000 alignment.
fn sample_iso() -> Vec<u8> {
    let mut iso = IsoFile::load(skeleton_image()).unwrap();
    iso.insert_dir("", "files").unwrap();
    iso.insert_file("files", "a.txt", b"abcd".to_vec()).unwrap();
    iso.insert_file("", "b.bin", b_bin_content()).unwrap();
    iso.rebuild(&RebuildOptions::default()).unwrap()
}

#[test]
fn test_header_parse() {
    let img = skeleton_image();
    let header = DiscHeader::parse(&img).unwrap();
    assert_eq!(header.game_code_str(), "GTST");
    assert_eq!(header.maker_code_str(), "01");
    assert_eq!(header.disc_id, 0);
    assert_eq!(header.version, 1);
    assert_eq!(header.game_name, "Test Title");
    assert_eq!(header.dol_offset, 0x2600);
    assert_eq!(header.fst_offset, 0x2800);
    assert_eq!(header.fst_size, 12);

    let iso = IsoFile::load(img).unwrap();
    assert_eq!(iso.apploader.date_str(), "2026/01/01");
    assert_eq!(iso.tree.entry_count(), 1);
    assert_eq!(iso.tree.file_count(), 0);
}

#[test]
fn test_header_rejects_bad_magic() {
    let mut img = skeleton_image();
    write_u32(&mut img, 0x1C, 0xDEAD_BEEF);
    assert!(matches!(
        DiscHeader::parse(&img),
        Err(gcdisc::header::HeaderError::BadMagic(0xDEAD_BEEF))
    ));
}

#[test]
fn test_rebuild_assigns_aligned_offsets() {
    let rebuilt = sample_iso();
    let iso = IsoFile::load(rebuilt.clone()).unwrap();

    // DOL ends at 0x2740, so the FST lands on the next 0x100 boundary.
    assert_eq!(iso.header.fst_offset, 0x2800);
    // root + files/ + a.txt + b.bin entries, then three 6-byte names
    assert_eq!(iso.header.fst_size, 4 * 12 + 18);

    let files = iso.list();
    let a = files.iter().find(|f| f.path == "files/a.txt").unwrap();
    let b = files.iter().find(|f| f.path == "b.bin").unwrap();

    // First aligned boundary after the FST, then the next one after a.txt.
    assert_eq!(a.offset, Some(0x8000));
    assert_eq!(b.offset, Some(0x10000));
    for f in &files {
        if let Some(offset) = f.offset {
            assert_eq!(offset % 0x8000, 0);
        }
    }

    assert_eq!(iso.read_file("files/a.txt").unwrap(), b"abcd");
    assert_eq!(iso.read_file("b.bin").unwrap(), b_bin_content());
    assert_eq!(rebuilt.len(), 0x10000 + 40_000);

    // Disc order: the directory first, then its sibling file.
    let root = iso.list_dir("").unwrap();
    assert_eq!(root.len(), 2);
    assert_eq!(root[0].name(), "files");
    assert_eq!(root[1].name(), "b.bin");
    assert_eq!(iso.list_dir("files").unwrap().len(), 1);
}

#[test]
fn test_rebuild_no_overlap() {
    let iso = IsoFile::load(sample_iso()).unwrap();
    let mut ranges: Vec<(u64, u64)> = iso
        .list()
        .iter()
        .filter(|f| !f.is_dir)
        .map(|f| (u64::from(f.offset.unwrap()), u64::from(f.offset.unwrap()) + f.size))
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "files overlap: {pair:?}");
    }
}

#[test]
fn test_rebuild_untouched_is_byte_identical() {
    let rebuilt = sample_iso();
    let iso = IsoFile::load(rebuilt.clone()).unwrap();
    let again = iso.rebuild(&RebuildOptions::default()).unwrap();
    assert_eq!(rebuilt, again);
}

#[test]
fn test_rename_moves_path() {
    let mut iso = IsoFile::load(sample_iso()).unwrap();
    iso.rename("files/a.txt", "c.txt").unwrap();
    assert!(iso.tree.find("files/c.txt").is_ok());
    assert!(matches!(iso.tree.find("files/a.txt"), Err(TreeError::NotFound(_))));

    // Survives a rebuild round trip.
    let reloaded = IsoFile::load(iso.rebuild(&RebuildOptions::default()).unwrap()).unwrap();
    assert_eq!(reloaded.read_file("files/c.txt").unwrap(), b"abcd");
    assert!(reloaded.read_file("files/a.txt").is_err());
}

#[test]
fn test_insert_collision_leaves_tree_unchanged() {
    let mut iso = IsoFile::load(sample_iso()).unwrap();
    let before = iso.tree.entry_count();
    let err = iso.insert_file("files", "a.txt", b"xx".to_vec()).unwrap_err();
    assert!(matches!(err, IsoError::Tree(TreeError::NameCollision(_))));
    assert_eq!(iso.tree.entry_count(), before);
}

#[test]
fn test_replace_content_relayouts() {
    let mut iso = IsoFile::load(sample_iso()).unwrap();
    iso.replace_file_content("b.bin", b"tiny".to_vec()).unwrap();
    let rebuilt = IsoFile::load(iso.rebuild(&RebuildOptions::default()).unwrap()).unwrap();
    assert_eq!(rebuilt.read_file("b.bin").unwrap(), b"tiny");
    assert_eq!(rebuilt.read_file("files/a.txt").unwrap(), b"abcd");
    // b.bin still starts on the boundary right after a.txt.
    let files = rebuilt.list();
    let b = files.iter().find(|f| f.path == "b.bin").unwrap();
    assert_eq!(b.offset, Some(0x10000));
}

#[test]
fn test_remove_directory() {
    let mut iso = IsoFile::load(sample_iso()).unwrap();
    iso.remove("files").unwrap();
    let rebuilt = IsoFile::load(iso.rebuild(&RebuildOptions::default()).unwrap()).unwrap();
    assert!(rebuilt.read_file("files/a.txt").is_err());
    assert_eq!(rebuilt.tree.file_count(), 1);
    assert_eq!(rebuilt.read_file("b.bin").unwrap(), b_bin_content());
}

#[test]
fn test_corrupt_fst_next_index_rejected() {
    // Three entries; entry 1 is a directory whose next index does not
    // advance past itself.
    let mut fst = Vec::new();
    fst.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3]);
    fst.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    fst.extend_from_slice(&[0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
    fst.extend_from_slice(b"d\0f\0");

    let err = gcdisc::fst::decode(&fst).unwrap_err();
    assert!(matches!(err, FstError::NextIndexTooSmall { index: 1, next: 1 }));
}

#[test]
fn test_corrupt_fst_in_image_fails_load() {
    let mut img = skeleton_image();
    // Root entry claiming more entries than the region holds.
    write_u32(&mut img, 0x2800 + 8, 500);
    let err = IsoFile::load(img).unwrap_err();
    assert!(matches!(
        err,
        IsoError::Image(ImageError::CorruptFst(FstError::EntryTableOverrun { .. }))
    ));
}

#[test]
fn test_fst_region_must_fit_image() {
    let mut img = skeleton_image();
    write_u32(&mut img, 0x428, 0x10000); // fst_size past the image end
    assert!(matches!(
        IsoFile::load(img),
        Err(IsoError::Image(ImageError::FstOutOfBounds { .. }))
    ));
}

#[test]
fn test_out_of_bounds_extraction_is_isolated() {
    let mut rebuilt = sample_iso();
    // Point b.bin (entry 3) past the end of the image.
    let fst_offset = 0x2800;
    write_u32(&mut rebuilt, fst_offset + 3 * 12 + 4, 0x0F00_0000);

    let iso = IsoFile::load(rebuilt).unwrap();
    assert!(matches!(
        iso.read_file("b.bin"),
        Err(IsoError::Image(ImageError::OutOfBounds { .. }))
    ));
    // The bad range does not poison other files.
    assert_eq!(iso.read_file("files/a.txt").unwrap(), b"abcd");
}

#[test]
fn test_fixed_fst_offset_overlapping_dol_is_rejected() {
    let iso = IsoFile::load(sample_iso()).unwrap();
    let opts = RebuildOptions { fst_offset: Some(0x2000), ..Default::default() };
    assert!(matches!(iso.rebuild(&opts), Err(IsoError::Build(BuildError::LayoutOverflow(_)))));
}

#[test]
fn test_alignment_must_be_power_of_two() {
    let iso = IsoFile::load(sample_iso()).unwrap();
    let opts = RebuildOptions { alignment: 0x3000, ..Default::default() };
    assert!(matches!(iso.rebuild(&opts), Err(IsoError::Build(BuildError::LayoutOverflow(_)))));
}

#[test]
fn test_empty_tree_rebuilds() {
    let iso = IsoFile::load(skeleton_image()).unwrap();
    let rebuilt = iso.rebuild(&RebuildOptions::default()).unwrap();
    let reloaded = IsoFile::load(rebuilt).unwrap();
    assert_eq!(reloaded.tree.file_count(), 0);
    assert_eq!(reloaded.header.fst_size, 12);
}

#[test]
fn test_min_image_size_pads_output() {
    let iso = IsoFile::load(skeleton_image()).unwrap();
    let opts = RebuildOptions { min_image_size: Some(0x100000), ..Default::default() };
    let rebuilt = iso.rebuild(&opts).unwrap();
    assert_eq!(rebuilt.len(), 0x100000);
}

#[test]
fn test_system_files() {
    let iso = IsoFile::load(sample_iso()).unwrap();
    let sys = iso.system_files().unwrap();
    let find = |name: &str| sys.iter().find(|f| f.name == name).unwrap();

    assert_eq!((find("boot.bin").offset, find("boot.bin").size), (0, 0x440));
    assert_eq!((find("bi2.bin").offset, find("bi2.bin").size), (0x440, 0x2000));
    assert_eq!((find("appldr.bin").offset, find("appldr.bin").size), (0x2460, 0x20));
    assert_eq!(find("start.dol").offset, 0x2600);
    assert_eq!(find("start.dol").size, 0x140);
    assert_eq!(find("fst.bin").offset, 0x2800);

    let boot = iso.read_system_file("boot.bin").unwrap();
    assert_eq!(boot.len(), 0x440);
    assert_eq!(&boot[..4], b"GTST");
}

#[test]
fn test_dol_sections() {
    let mut dol = vec![0u8; 0x200];
    // text0 at 0x100 -> 0x80003100, 0x40 bytes; data0 at 0x140 -> 0x80004000
    write_u32(&mut dol, 0x00, 0x100);
    write_u32(&mut dol, 0x48, 0x8000_3100);
    write_u32(&mut dol, 0x90, 0x40);
    write_u32(&mut dol, 0x1C, 0x140);
    write_u32(&mut dol, 0x64, 0x8000_4000);
    write_u32(&mut dol, 0xAC, 0x80);
    write_u32(&mut dol, 0xE0, 0x8000_3100);

    let dol = Dol::parse(&dol).unwrap();
    assert_eq!(dol.text_sections.len(), 1);
    assert_eq!(dol.data_sections.len(), 1);
    assert_eq!(dol.entry_point, 0x8000_3100);
    assert_eq!(dol.total_size(), 0x1C0);

    assert_eq!(dol.address_to_offset(0x8000_3110), Some(0x110));
    assert_eq!(dol.offset_to_address(0x150), Some(0x8000_4010));
    assert_eq!(dol.address_to_offset(0x8000_0000), None);
    assert!(dol.section_by_offset(0x40).is_none());
}

#[test]
fn test_banner_roundtrip() {
    let meta = BannerMeta {
        game_name: "Sample".into(),
        developer: "Dev".into(),
        full_game_title: "Sample: The Full Title".into(),
        full_developer: "Dev Inc.".into(),
        description: "Two lines\nof description".into(),
    };

    // Checkerboard of opaque white and transparent black: every channel
    // value survives 5-bit quantization exactly.
    let mut rgba = vec![0u8; 96 * 32 * 4];
    for p in 0..96 * 32 {
        if (p / 96 + p % 96) % 2 == 0 {
            rgba[p * 4..p * 4 + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
    }

    let file = Banner::build(BannerRegion::Ntsc, &meta, &rgba).unwrap();
    assert_eq!(file.len(), 0x1960);
    assert_eq!(&file[..4], b"BNR1");

    let banner = Banner::parse(&file).unwrap();
    assert_eq!(banner.region, BannerRegion::Ntsc);
    assert_eq!(banner.meta.len(), 1);
    assert_eq!(banner.meta[0].game_name, "Sample");
    assert_eq!(banner.meta[0].description, "Two lines\nof description");
    assert_eq!(banner.decode_pixels(), rgba);
}

#[test]
fn test_banner_field_too_long() {
    let meta = BannerMeta { game_name: "x".repeat(0x20), ..Default::default() };
    let rgba = vec![0u8; 96 * 32 * 4];
    assert!(matches!(
        Banner::build(BannerRegion::Ntsc, &meta, &rgba),
        Err(gcdisc::banner::BannerError::FieldTooLong { field: "game_name", .. })
    ));
}

#[test]
fn test_banner_in_image() {
    let meta = BannerMeta { game_name: "Sample".into(), ..Default::default() };
    let rgba = vec![0u8; 96 * 32 * 4];
    let bnr = Banner::build(BannerRegion::Ntsc, &meta, &rgba).unwrap();

    let mut iso = IsoFile::load(skeleton_image()).unwrap();
    iso.insert_file("", "opening.bnr", bnr).unwrap();
    let rebuilt = IsoFile::load(iso.rebuild(&RebuildOptions::default()).unwrap()).unwrap();

    let banner = rebuilt.banner("opening.bnr").unwrap();
    assert_eq!(banner.meta[0].game_name, "Sample");
}

#[test]
fn test_file_round_trip_on_disk() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src.iso");
    let dst = dir.path().join("dst.iso");
    std::fs::write(&src, skeleton_image()).unwrap();

    let mut iso = IsoFile::open(&src).unwrap();
    iso.insert_file("", "readme.txt", b"hello disc".to_vec()).unwrap();
    iso.rebuild_to(&dst, &RebuildOptions::default()).unwrap();

    let reloaded = IsoFile::open(&dst).unwrap();
    assert_eq!(reloaded.read_file("readme.txt").unwrap(), b"hello disc");

    let out = dir.path().join("out");
    let report = reloaded.extract_all(&out).unwrap();
    assert_eq!(report.written, 1);
    assert!(report.failed.is_empty());
    assert_eq!(std::fs::read(out.join("readme.txt")).unwrap(), b"hello disc");
}
