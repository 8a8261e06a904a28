use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const FACES: [&str; 6] = [
    "panorama_0.png",
    "panorama_1.png",
    "panorama_2.png",
    "panorama_3.png",
    "panorama_4.png",
    "panorama_5.png",
];

fn write_face(dir: &Path, name: &str) {
    let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([50, 69, 104, 255]));
    image.save(dir.join(name)).expect("write panorama face");
}

fn build_assets() -> TempDir {
    let root = tempfile::tempdir().expect("temp assets");
    let background = root.path().join("background");
    fs::create_dir_all(&background).expect("background dir");
    for face in FACES {
        write_face(&background, face);
    }
    root
}

#[test]
fn headless_run_fades_in_every_face() {
    let assets = build_assets();
    let mut cmd = Command::cargo_bin("menu-backdrop").expect("binary exists");
    cmd.arg("--headless")
        .arg("--frames")
        .arg("30")
        .arg("--assets")
        .arg(assets.path());
    cmd.assert()
        .success()
        .stdout(contains("Backdrop started: 4 nodes, 1 meshes"))
        .stdout(contains("Rendered 30 frame(s) at 1280x720"))
        .stdout(contains("Face opacity: 1.00 1.00 1.00 1.00 1.00 1.00"))
        .stdout(contains("Camera aspect: 1.778"))
        .stdout(contains("Backdrop disposed"));
}

#[test]
fn early_frames_are_partially_faded() {
    let assets = build_assets();
    let mut cmd = Command::cargo_bin("menu-backdrop").expect("binary exists");
    cmd.arg("--headless")
        .arg("--frames")
        .arg("6")
        .arg("--assets")
        .arg(assets.path());
    cmd.assert()
        .success()
        .stdout(contains("Face opacity: 0.50 0.50 0.50 0.50 0.50 0.50"))
        .stdout(contains("Panorama rotation: 3.1422 rad"));
}

#[test]
fn decorative_flag_adds_twenty_creatures() {
    let assets = build_assets();
    let mut cmd = Command::cargo_bin("menu-backdrop").expect("binary exists");
    cmd.arg("--headless")
        .arg("--decorative")
        .arg("--frames")
        .arg("1")
        .arg("--assets")
        .arg(assets.path());
    cmd.assert()
        .success()
        .stdout(contains("Backdrop started: 24 nodes, 21 meshes"));
}

#[test]
fn config_file_sets_options() {
    let assets = build_assets();
    let config = assets.path().join("backdrop.xml");
    fs::write(
        &config,
        format!(
            "<backdrop><assetRoot>{}</assetRoot><enableDecorativeEntities>true</enableDecorativeEntities></backdrop>",
            assets.path().display()
        ),
    )
    .expect("write config");

    let mut cmd = Command::cargo_bin("menu-backdrop").expect("binary exists");
    cmd.arg("--headless")
        .arg("--frames")
        .arg("2")
        .arg("--width")
        .arg("800")
        .arg("--height")
        .arg("400")
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .success()
        .stdout(contains("21 meshes"))
        .stdout(contains("Camera aspect: 2.000"));
}

#[test]
fn missing_face_fails_to_start() {
    let assets = build_assets();
    fs::remove_file(assets.path().join("background/panorama_4.png")).expect("remove face");

    let mut cmd = Command::cargo_bin("menu-backdrop").expect("binary exists");
    cmd.arg("--headless").arg("--assets").arg(assets.path());
    cmd.assert()
        .failure()
        .stderr(contains("failed to start menu backdrop"))
        .stderr(contains("panorama_4.png"));
}
