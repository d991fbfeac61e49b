use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gcdisc::fst;
use gcdisc::image::{rebuild, RebuildOptions};
use gcdisc::tree::DiscTree;

fn wide_tree() -> DiscTree {
    let mut tree = DiscTree::new();
    for d in 0..20 {
        let dir = format!("dir{d}");
        tree.insert_dir("", &dir).unwrap();
        for f in 0..25 {
            tree.insert_file(&dir, &format!("file{f}.dat"), vec![0x5A; 256]).unwrap();
        }
    }
    tree
}

fn skeleton_image() -> Vec<u8> {
    let mut img = vec![0u8; 0x3000];
    img[..4].copy_from_slice(b"GBEN");
    img[0x1C..0x20].copy_from_slice(&gcdisc::header::GCN_MAGIC.to_be_bytes());
    // DOL at 0x2600 with an all-zero section table: minimum 0x100-byte size.
    img[0x420..0x424].copy_from_slice(&0x2600u32.to_be_bytes());
    img[0x424..0x428].copy_from_slice(&0x2800u32.to_be_bytes());
    img[0x428..0x42C].copy_from_slice(&12u32.to_be_bytes());
    img[0x42C..0x430].copy_from_slice(&12u32.to_be_bytes());
    img[0x2800] = 1;
    img[0x2808..0x280C].copy_from_slice(&1u32.to_be_bytes());
    img
}

fn bench_fst_codec(c: &mut Criterion) {
    let tree = wide_tree();
    let bytes = fst::encode(&tree).unwrap().to_bytes();

    c.bench_function("fst_encode_500_files", |b| b.iter(|| fst::encode(black_box(&tree))));
    c.bench_function("fst_decode_500_files", |b| b.iter(|| fst::decode(black_box(&bytes))));
}

fn bench_rebuild(c: &mut Criterion) {
    let tree = wide_tree();
    let original = skeleton_image();
    let opts = RebuildOptions { alignment: 0x800, ..Default::default() };

    c.bench_function("rebuild_500_files", |b| {
        b.iter(|| rebuild(black_box(&tree), black_box(&original), &opts))
    });
}

criterion_group!(benches, bench_fst_codec, bench_rebuild);
criterion_main!(benches);
