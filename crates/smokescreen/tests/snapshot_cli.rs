use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn smokescreen(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_smokescreen"))
        .env("SMOKESCREEN_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run smokescreen")
}

fn snapshot(config_dir: &Path, output: &Path, extra: &[&str]) -> Output {
    let output = output.to_str().expect("utf-8 path");
    let mut args = vec![
        "snapshot", "--output", output, "--size", "64x48", "--frames", "8",
    ];
    args.extend_from_slice(extra);
    smokescreen(config_dir, &args)
}

#[test]
fn snapshot_writes_png_with_dye() {
    let root = TempDir::new().unwrap();
    let png = root.path().join("frame.png");

    let output = snapshot(root.path(), &png, &[]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("frame.png"));

    let image = image::open(&png).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (64, 48));
    assert!(image.pixels().any(|pixel| pixel[3] > 0));
}

#[test]
fn touch_only_snapshot_is_transparent() {
    let root = TempDir::new().unwrap();
    let png = root.path().join("touch.png");

    let output = snapshot(root.path(), &png, &["--touch-only"]);
    assert!(output.status.success());

    let image = image::open(&png).unwrap().to_rgba8();
    assert!(image.pixels().all(|pixel| pixel[3] == 0));
}

#[test]
fn reduced_motion_from_config_file_is_honoured() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("config.toml"),
        "version = 1\n\n[host]\nreduced_motion = true\n",
    )
    .unwrap();
    let png = root.path().join("still.png");

    let output = snapshot(root.path(), &png, &[]);
    assert!(output.status.success());

    let image = image::open(&png).unwrap().to_rgba8();
    assert!(image.pixels().all(|pixel| pixel[3] == 0));
}

#[test]
fn config_dump_prints_effective_configuration() {
    let root = TempDir::new().unwrap();

    let output = smokescreen(root.path(), &["config", "dump"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("version = 1"));
    assert!(stdout.contains("theme = \"dark\""));

    let output = smokescreen(root.path(), &["--theme", "light", "config", "dump"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("theme = \"light\""));
}

#[test]
fn config_where_reports_override_directory() {
    let root = TempDir::new().unwrap();

    let output = smokescreen(root.path(), &["config", "where"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&root.path().display().to_string()));
    assert!(stdout.contains("config.toml (not present)"));
}

#[test]
fn invalid_configuration_is_rejected() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("config.toml"),
        "version = 1\n\n[simulation]\npressure = 4.0\n",
    )
    .unwrap();

    let output = smokescreen(root.path(), &["config", "dump"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");
}

#[test]
fn snapshot_rejects_non_png_output() {
    let root = TempDir::new().unwrap();
    let output = smokescreen(root.path(), &["snapshot", "--output", "frame.jpg"]);
    assert!(!output.status.success());
}

#[test]
fn oversized_snapshot_is_rejected_by_the_parser() {
    let root = TempDir::new().unwrap();
    let png = root.path().join("huge.png");
    let output = smokescreen(
        root.path(),
        &[
            "snapshot",
            "--output",
            png.to_str().unwrap(),
            "--size",
            "65536x65537",
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("at most 16384"));
    assert!(!png.exists());
}
