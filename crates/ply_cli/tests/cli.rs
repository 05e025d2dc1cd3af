use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn ply(args: &[&Path]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ply"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run ply")
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
    fs::write(path, contents).expect("write file");
}

#[test]
fn builds_a_site() {
    let temp = TempDir::new().expect("tempdir");
    let source = temp.path().join("site");
    let target = temp.path().join("out");
    write(&source.join("index.md"), "---\ntitle: Home\n---\nWelcome.\n");
    write(
        &source.join("ply.template"),
        "<title>{{ page.title }}</title>{{ page.content }}",
    );

    let output = ply(&[&source, &target]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let html = fs::read_to_string(target.join("index.html")).expect("index.html");
    assert!(html.contains("<title>Home</title>"));
    assert!(html.contains("Welcome."));
    assert!(!target.join("index.md").exists());
    assert!(!target.join("ply.template").exists());
}

#[test]
fn nested_target_fails() {
    let temp = TempDir::new().expect("tempdir");
    let source = temp.path().to_path_buf();
    let target = temp.path().join("out");
    write(&source.join("index.md"), "# Home\n");

    let output = ply(&[&source, &target]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("inside"), "stderr: {stderr}");
}

#[test]
fn template_errors_fail_the_build() {
    let temp = TempDir::new().expect("tempdir");
    let source = temp.path().join("site");
    let target = temp.path().join("out");
    write(&source.join("index.md"), "# Home\n");
    write(&source.join("ply.template"), "{{ include('../../etc/passwd') }}");

    let output = ply(&[&source, &target]);
    assert!(!output.status.success());
    assert!(!target.join("index.html").exists());
}
