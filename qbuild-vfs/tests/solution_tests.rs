//! 集成测试 - solution mapping over real and in-memory trees

use qbuild_vfs::middleware::{CachedLayer, VfsBuilder};
use qbuild_vfs::solution::{FileKind, FileMode, Lookup, SolutionDir, SolutionProject, SolutionRegistry};
use qbuild_vfs::{MemoryFileSystem, NativeFileSystem, VirtualFileSystem};
use std::path::Path;
use std::sync::Arc;

fn two_entry_registry(fs: Arc<dyn VirtualFileSystem>, build: &str, src: &str) -> Arc<SolutionRegistry> {
    let registry = SolutionRegistry::new(fs, "qbuild.pro");
    registry.create(
        "default",
        vec![SolutionDir::new("", build), SolutionDir::new("/src", src)],
    );
    registry
}

#[test]
fn test_existing_lookup_through_cache() {
    let memory = MemoryFileSystem::with_files([("/real/src/x.h", b"#pragma once".to_vec())]);
    let vfs = VfsBuilder::new(memory.clone()).with(CachedLayer::new()).build();
    let registry = two_entry_registry(Arc::new(vfs), "/build", "/real/src");
    let sln = registry.default_solution().unwrap();

    let found = sln.find_file("/src/x.h", FileMode::Existing, None).unwrap();
    assert_eq!(found.fs_path(), "/real/src/x.h");

    // Deleted behind the cache: still visible until invalidated
    memory.remove(Path::new("/real/src/x.h")).unwrap();
    assert!(sln.find_file("/src/x.h", FileMode::Existing, None).is_some());
    sln.fs().invalidate(None);
    assert!(sln.find_file("/src/x.h", FileMode::Existing, None).is_none());
}

#[test]
fn test_native_tree_glob_and_projects() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().into_owned();
    let fs = NativeFileSystem::new();
    for file in ["src/qbuild.pro", "src/app/qbuild.pro", "src/app/main.cpp", "src/lib/core/qbuild.pro"] {
        let path = dir.path().join(file);
        fs.create_dir_all(path.parent().unwrap()).unwrap();
        fs.write_file(&path, b"").unwrap();
    }
    fs.create_dir_all(&dir.path().join("build")).unwrap();

    let registry = two_entry_registry(
        Arc::new(fs),
        &format!("{root}/build"),
        &format!("{root}/src"),
    );
    let sln = registry.default_solution().unwrap();

    let pros = sln.files("/src/*/qbuild.pro", Lookup::PROJECT | Lookup::WILDCARD, None);
    let requests: Vec<&str> = pros.iter().map(|f| f.solution_path()).collect();
    assert_eq!(requests, vec!["/src/app/qbuild.pro"]);
    assert_eq!(pros[0].kind(), FileKind::Project);

    let main = sln.find_file("/src/app/main.cpp", FileMode::Project, None).unwrap();
    assert_eq!(main.fs_path(), format!("{root}/src/app/main.cpp"));

    let top = SolutionProject::from_node(&registry, "/src", None).unwrap();
    assert_eq!(top.sub_projects(), &["app".to_string(), "lib".to_string()]);

    let generated = sln.find_file("/src/app/moc_main.cpp", FileMode::Generated, None).unwrap();
    assert_eq!(generated.fs_path(), format!("{root}/build/src/app/moc_main.cpp"));
    assert_eq!(
        sln.real_to_solution(&format!("{root}/src/app")).unwrap().solution_path(),
        "/src/app"
    );
}

#[cfg(unix)]
#[test]
fn test_native_symlink_canonicalizes_into_solution() {
    let dir = tempfile::tempdir().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap().to_string_lossy().into_owned();
    let fs = NativeFileSystem::new();
    fs.create_dir_all(Path::new(&format!("{root}/src/real"))).unwrap();
    fs.write_file(Path::new(&format!("{root}/src/real/qbuild.pro")), b"").unwrap();
    std::os::unix::fs::symlink(format!("{root}/src/real"), format!("{root}/src/alias")).unwrap();

    let registry = two_entry_registry(Arc::new(fs), &format!("{root}/build"), &format!("{root}/src"));
    let project = SolutionProject::from_node(&registry, "/src/alias", None).unwrap();
    assert_eq!(project.node(), "/src/real/");
}
