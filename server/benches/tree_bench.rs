use criterion::{black_box, criterion_group, criterion_main, Criterion};
use notes_tree_server::build_tree;
use notes_tree_server::tree::count_notes;

fn seed(root: &std::path::Path, folders: usize, notes_per_folder: usize) {
    for f in 0..folders {
        let dir = root.join(format!("folder-{f:03}")).join("nested");
        std::fs::create_dir_all(&dir).unwrap();
        for n in 0..notes_per_folder {
            std::fs::write(dir.join(format!("note-{n:03}.md")), "body").unwrap();
            std::fs::write(dir.join(format!("attachment-{n:03}.png")), [0u8]).unwrap();
        }
    }
}

fn bench_build_tree(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), 50, 40);
    c.bench_function("build_tree_50x40", |b| {
        b.iter(|| {
            let tree = build_tree(dir.path()).unwrap();
            black_box(count_notes(&tree))
        });
    });

    let order: Vec<String> = (0..50).rev().map(|f| format!("folder-{f:03}")).collect();
    std::fs::write(dir.path().join(".metadata.json"), serde_json::json!({ "order": order }).to_string()).unwrap();
    c.bench_function("build_tree_50x40_sidecar", |b| {
        b.iter(|| black_box(build_tree(dir.path()).unwrap().len()));
    });
}

criterion_group!(benches, bench_build_tree);
criterion_main!(benches);
