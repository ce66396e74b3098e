use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("qrkit").unwrap();
    cmd.env_remove("QRKIT_CONFIG").env("RUST_LOG", "off");
    cmd
}

#[test]
fn encode_wifi_prints_payload() {
    cmd()
        .args(["encode", "wifi", "--ssid", "Home", "--password", "secret1"])
        .assert()
        .success()
        .stdout(contains("WIFI:T:WPA;S:Home;P:secret1;;"));
}

#[test]
fn encode_open_network_omits_password() {
    cmd()
        .args(["encode", "wifi", "--ssid", "X", "--encryption", "nopass"])
        .assert()
        .success()
        .stdout(contains("WIFI:T:nopass;S:X;;"));
}

#[test]
fn encode_email_json() {
    cmd()
        .args([
            "--json",
            "encode",
            "email",
            "a@b.com",
            "--subject",
            "Hi there",
            "--body",
            "Line1\nLine2",
        ])
        .assert()
        .success()
        .stdout(contains("mailto:a@b.com?subject=Hi%20there&body=Line1%0ALine2"))
        .stdout(contains("\"kind\": \"email\""));
}

#[test]
fn encode_then_decode_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("code.png");

    cmd()
        .args(["encode", "link", "https://example.com/docs", "--size", "320", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("saved"));

    cmd()
        .arg("decode")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("https://example.com/docs"))
        .stdout(contains("type: link"));
}

#[test]
fn svg_export_writes_markup() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("code.svg");

    cmd()
        .args(["encode", "text", "vector", "--corner-shape", "dot", "--out"])
        .arg(&out)
        .assert()
        .success();

    let svg = std::fs::read_to_string(&out).unwrap();
    assert!(svg.starts_with("<svg"));
}

#[test]
fn decode_rejects_non_images() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.png");
    std::fs::write(&path, "definitely not a png").unwrap();

    cmd()
        .arg("decode")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("failed to decode"));
}

#[test]
fn decode_blank_image_finds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.png");
    image::GrayImage::from_pixel(64, 64, image::Luma([255]))
        .save(&path)
        .unwrap();

    cmd()
        .arg("decode")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("no QR code"));
}

#[test]
fn scan_replays_frames_until_found() {
    let frames = tempfile::tempdir().unwrap();
    let code = frames.path().join("frame_01.png");

    cmd()
        .args(["encode", "phone", "+15551234567", "--size", "320", "--out"])
        .arg(&code)
        .assert()
        .success();

    cmd()
        .args(["scan", "--timeout-secs", "20", "--frames"])
        .arg(frames.path())
        .assert()
        .success()
        .stdout(contains("tel:+15551234567"));
}

#[test]
fn scan_without_camera_reports_environment() {
    cmd()
        .args(["scan", "--timeout-secs", "1"])
        .assert()
        .failure()
        .stderr(contains("not supported"));
}

#[test]
fn config_persists_saved_style() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("settings.json");

    cmd()
        .args(["encode", "text", "x", "--module-shape", "dots", "--save-style", "--config"])
        .arg(&config)
        .assert()
        .success();

    cmd()
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("\"moduleShape\": \"dots\""));

    cmd()
        .args(["config", "reset", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("settings reset"))
        .stdout(contains("\"moduleShape\": \"square\""));
}

#[test]
fn unknown_color_is_a_usage_error() {
    cmd()
        .args(["encode", "text", "x", "--fg", "purple"])
        .assert()
        .failure()
        .stderr(contains("invalid color").or(contains("invalid value")));
}
