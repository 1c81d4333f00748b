//! Performance benchmarks for torrent-vfs.
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Inode management performance
//! - Concurrent inode table access

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use torrent_vfs::fs::inode_manager::InodeManager;
use torrent_vfs::vfs::VPath;

/// Benchmark the FUSE export's path-keyed inode table.
fn bench_inode_management(c: &mut Criterion) {
    let mut group = c.benchmark_group("inode_management");

    group.bench_function("allocate_inodes", |b| {
        b.iter(|| {
            let manager = InodeManager::new();
            for i in 0..1000 {
                let path = VPath::clean(&format!("/file_{i}.txt"));
                let _ = manager.ensure_inode(&path);
            }
            black_box(manager);
        });
    });

    group.bench_function("lookup_inodes", |b| {
        let manager = InodeManager::new();
        let mut inos = Vec::new();
        for i in 0..1000 {
            let path = VPath::clean(&format!("/file_{i}.txt"));
            inos.push(manager.ensure_inode(&path));
        }

        b.iter(|| {
            for ino in &inos {
                let _ = manager.path_for(*ino);
            }
        });
    });

    group.bench_function("directory_listing_allocation", |b| {
        b.iter(|| {
            let manager = InodeManager::new();
            let root = manager.ensure_inode(&VPath::root());
            for dir in 0..20 {
                let dir_path = VPath::clean(&format!("/dir_{dir}"));
                let dir_ino = manager.ensure_inode(&dir_path);
                for file in 0..50 {
                    let file_path = VPath::clean(&format!("/dir_{dir}/file_{file}.txt"));
                    let _ = manager.ensure_inode(&file_path);
                }
                black_box((root, dir_ino));
            }
            black_box(manager);
        });
    });

    group.finish();
}

/// Benchmark concurrent access to the inode table, the shared structure
/// every FUSE dispatch thread touches on lookup.
fn bench_concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_operations");

    for num_threads in [2, 4, 8, 16].iter() {
        let thread_count = *num_threads;

        group.bench_with_input(
            BenchmarkId::new("concurrent_inode_lookup", thread_count),
            &thread_count,
            |b, &threads| {
                let manager = Arc::new(InodeManager::new());
                for i in 0..1000 {
                    let path = VPath::clean(&format!("/file_{i}.txt"));
                    manager.ensure_inode(&path);
                }

                b.iter(|| {
                    let mut handles = Vec::new();
                    for t in 0..threads {
                        let manager_clone = Arc::clone(&manager);
                        handles.push(std::thread::spawn(move || {
                            let start = t * 100;
                            for i in start..start + 100 {
                                let path = VPath::clean(&format!("/file_{}.txt", i % 1000));
                                let ino = manager_clone.ensure_inode(&path);
                                let _ = manager_clone.path_for(ino);
                            }
                        }));
                    }
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_inode_management, bench_concurrent_reads);
criterion_main!(benches);
