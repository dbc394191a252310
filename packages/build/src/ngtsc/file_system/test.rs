use super::testing::MockFileSystem;
use super::*;

#[test]
fn should_compute_relative_paths() {
    assert_eq!(relative("/src/app", "/src/app/comp.html"), "./comp.html");
    assert_eq!(relative("/src/app", "/src/styles/a.css"), "../styles/a.css");
    assert_eq!(relative_to_file("/src/app/comp.ts", "/src/app/comp.css"), "./comp.css");
}

#[test]
fn should_read_extensions() {
    assert_eq!(extname("/src/app/comp.component.html"), ".html");
    assert_eq!(extname("/src/.gitignore"), "");
    assert_eq!(extname("/src/README"), "");
}

#[test]
fn mock_should_share_tree_between_clones() {
    let fs = MockFileSystem::new();
    let handle = fs.clone();
    handle.set("/src/a.ts", "export const a = 1;");
    assert!(fs.is_file("/src/a.ts"));
    assert!(fs.exists("/src"));
    assert_eq!(fs.read_file("/src/a.ts").unwrap(), "export const a = 1;");

    handle.remove("/src/a.ts");
    assert!(!fs.exists("/src/a.ts"));
    assert!(fs.read_file("/src/a.ts").is_err());
}

#[test]
fn mock_should_list_files_skipping_dependencies() {
    let fs = MockFileSystem::new();
    fs.init_with_files(vec![
        ("/project/src/main.ts", ""),
        ("/project/src/app/comp.ts", ""),
        ("/project/node_modules/lib/index.ts", ""),
        ("/project/.cache/state.bin", ""),
    ]);
    assert_eq!(
        fs.list_files("/project"),
        vec!["/project/src/app/comp.ts", "/project/src/main.ts"]
    );
}

#[test]
fn local_should_round_trip_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = ts::normalize_path(&dir.path().to_string_lossy());
    let fs = LocalFileSystem::new();
    let file = format!("{}/nested/out.js", root);
    fs.write_file(&file, b"export {};").unwrap();
    assert!(fs.is_file(&file));
    assert_eq!(fs.list_files(&root), vec![file.clone()]);
    fs.remove_file(&file).unwrap();
    assert!(!fs.exists(&file));
}
