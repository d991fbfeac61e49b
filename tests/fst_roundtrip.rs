use gcdisc::fst::{self, FstLayout};
use gcdisc::tree::{DiscTree, Node};
use proptest::prelude::*;

// Abstract tree shape; names are assigned while building so siblings are
// always unique.
#[derive(Debug, Clone)]
enum Shape {
    File(u16),
    Dir(Vec<Shape>),
}

fn arb_children() -> impl Strategy<Value = Vec<Shape>> {
    let leaf = (0u16..512).prop_map(Shape::File);
    let node = leaf.prop_recursive(4, 32, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Shape::Dir)
    });
    prop::collection::vec(node, 0..8)
}

fn build_tree(children: &[Shape]) -> DiscTree {
    fn add(tree: &mut DiscTree, dir_path: &str, shapes: &[Shape], counter: &mut u32) {
        for shape in shapes {
            *counter += 1;
            match shape {
                Shape::File(len) => {
                    let name = format!("f{counter}");
                    tree.insert_file(dir_path, &name, vec![0xAB; *len as usize]).unwrap();
                }
                Shape::Dir(kids) => {
                    let name = format!("d{counter}");
                    tree.insert_dir(dir_path, &name).unwrap();
                    let sub = if dir_path.is_empty() {
                        name
                    } else {
                        format!("{dir_path}/{name}")
                    };
                    add(tree, &sub, kids, counter);
                }
            }
        }
    }
    let mut tree = DiscTree::new();
    add(&mut tree, "", children, &mut 0);
    tree
}

// Walk files exactly the way the image writer does, recording the spans.
fn assign_offsets(layout: &mut FstLayout, base: u64, alignment: u64) -> Vec<(u64, u64)> {
    let mut cursor = base + layout.size() as u64;
    let mut spans = Vec::new();
    for nth in 0..layout.file_count() {
        let offset = (cursor + alignment - 1) & !(alignment - 1);
        layout.set_file_offset(nth, offset as u32);
        cursor = offset + u64::from(layout.file_length(nth));
        spans.push((offset, cursor));
    }
    spans
}

fn structure(tree: &DiscTree) -> Vec<(String, bool, u64)> {
    let mut out = Vec::new();
    tree.visit(|path, node| {
        let len = match node {
            Node::Dir(_) => 0,
            Node::File(f) => f.source.len(),
        };
        out.push((path.to_owned(), node.is_dir(), len));
    });
    out
}

proptest! {
    #[test]
    fn roundtrip_is_byte_identical(children in arb_children()) {
        let tree = build_tree(&children);

        let mut layout = fst::encode(&tree).unwrap();
        assign_offsets(&mut layout, 0x2800, 0x8000);
        let bytes = layout.to_bytes();

        let decoded = fst::decode(&bytes).unwrap();
        prop_assert_eq!(structure(&tree), structure(&decoded));

        let mut layout2 = fst::encode(&decoded).unwrap();
        assign_offsets(&mut layout2, 0x2800, 0x8000);
        prop_assert_eq!(bytes, layout2.to_bytes());
    }

    #[test]
    fn directory_spans_nest_and_advance(children in arb_children()) {
        let tree = build_tree(&children);
        let mut layout = fst::encode(&tree).unwrap();
        assign_offsets(&mut layout, 0x2800, 0x8000);
        let bytes = layout.to_bytes();

        let count = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        prop_assert_eq!(count as usize, tree.entry_count());

        // Every directory's next index must move past the entry and stay
        // inside the enclosing directory; subtrees close in LIFO order,
        // which is exactly pre-order contiguity.
        let mut stack: Vec<u32> = vec![count];
        for index in 1..count {
            while index >= *stack.last().unwrap() {
                stack.pop();
            }
            let e = &bytes[index as usize * 12..index as usize * 12 + 12];
            if e[0] != 0 {
                let next = u32::from_be_bytes(e[8..12].try_into().unwrap());
                prop_assert!(next > index);
                prop_assert!(next <= *stack.last().unwrap());
                stack.push(next);
            }
        }
    }

    #[test]
    fn assigned_spans_are_aligned_and_disjoint(children in arb_children()) {
        let tree = build_tree(&children);
        let mut layout = fst::encode(&tree).unwrap();
        let spans = assign_offsets(&mut layout, 0x2800, 0x8000);

        for pair in spans.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0);
        }
        for (start, _) in &spans {
            prop_assert_eq!(start % 0x8000, 0);
        }
    }
}

#[test]
fn empty_tree_encodes_to_the_root_entry() {
    let layout = fst::encode(&DiscTree::new()).unwrap();
    assert_eq!(layout.entry_count(), 1);
    assert_eq!(layout.size(), 12);
    let bytes = layout.to_bytes();
    assert_eq!(bytes, [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
}

#[test]
fn next_index_points_past_each_subtree() {
    let mut tree = DiscTree::new();
    tree.insert_dir("", "d1").unwrap();
    tree.insert_file("d1", "f", vec![1, 2, 3]).unwrap();
    tree.insert_dir("d1", "d2").unwrap();
    tree.insert_file("", "f2", vec![4]).unwrap();

    // Pre-order: root(0), d1(1), f(2), d2(3), f2(4).
    let bytes = fst::encode(&tree).unwrap().to_bytes();
    let next = |i: usize| u32::from_be_bytes(bytes[i * 12 + 8..i * 12 + 12].try_into().unwrap());
    assert_eq!(next(0), 5);
    assert_eq!(next(1), 4);
    assert_eq!(next(3), 4);
}
