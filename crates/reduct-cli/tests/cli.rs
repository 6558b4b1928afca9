use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const TRAIN: &str = "1 'a | x:1 y:0.5\n0 'b | y:1 z:2\n1 'c | x:0.5 z:1\n0 'd | y:2\n1 'e | x:1\n";

fn write_input(tmp: &TempDir, name: &str, body: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, body).expect("write input");
    p
}

fn reduct() -> Command {
    Command::cargo_bin("reduct").expect("binary exists")
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

#[test]
fn train_writes_model_and_predictions() {
    let tmp = TempDir::new().unwrap();
    let data = write_input(&tmp, "train.txt", TRAIN);
    let model = tmp.path().join("m.rdct");
    let preds = tmp.path().join("preds.txt");
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "3", "--bs-percentile", "0.9", "-b", "10"])
        .args(["-f", &path_arg(&model), "-p", &path_arg(&preds), "--quiet"])
        .assert()
        .success();

    assert!(model.is_file());
    let lines: Vec<String> = fs::read_to_string(&preds).unwrap().lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].ends_with(" a"));
    assert!(lines[4].ends_with(" e"));
}

#[test]
fn progress_goes_to_stderr_unless_quiet() {
    let tmp = TempDir::new().unwrap();
    let data = write_input(&tmp, "train.txt", TRAIN);
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "2", "-b", "8"])
        .assert()
        .success()
        .stderr(predicate::str::contains("average").and(predicate::str::contains("finished run")));
}

#[test]
fn evaluation_prints_interval_and_model_replicates_win() {
    let tmp = TempDir::new().unwrap();
    let data = write_input(&tmp, "train.txt", TRAIN);
    let model = tmp.path().join("m.rdct");
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "3", "--bs-percentile", "0.9", "-b", "10"])
        .args(["-f", &path_arg(&model), "--quiet"])
        .assert()
        .success();

    let test = write_input(&tmp, "test.txt", "1 'p | x:1\n0 'q | y:1 z:1\n");
    reduct()
        .args(["--data", &path_arg(&test), "-t", "-i", &path_arg(&model), "--bs", "5", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mean: ").and(predicate::str::contains("0.9 percentile: (")))
        .stderr(predicate::str::contains("loaded model has 3"));
}

#[test]
fn zero_replicates_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let data = write_input(&tmp, "train.txt", TRAIN);
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "0", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one replicate"));
}

#[test]
fn replicate_count_is_required_without_a_model() {
    let tmp = TempDir::new().unwrap();
    let data = write_input(&tmp, "train.txt", TRAIN);
    reduct()
        .args(["--data", &path_arg(&data), "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("replicate count is required"));
}

#[test]
fn cache_run_matches_text_run() {
    let tmp = TempDir::new().unwrap();
    let data = write_input(&tmp, "train.txt", TRAIN);
    let cache = tmp.path().join("train.cache");
    let first = tmp.path().join("first.txt");
    let second = tmp.path().join("second.txt");
    let common = ["--bs", "4", "-b", "9", "--seed", "11", "--quiet"];

    reduct()
        .args(["--data", &path_arg(&data), "--cache-file", &path_arg(&cache), "-p", &path_arg(&first)])
        .args(common)
        .assert()
        .success();
    assert!(cache.is_file());

    // the text input is gone; only the cache can produce the second run
    fs::remove_file(&data).unwrap();
    reduct()
        .args(["--data", &path_arg(&data), "--cache-file", &path_arg(&cache), "-p", &path_arg(&second)])
        .args(common)
        .assert()
        .success();

    let a = fs::read_to_string(&first).unwrap();
    assert_eq!(a.lines().count(), 5);
    assert_eq!(a, fs::read_to_string(&second).unwrap());
}

#[test]
fn save_record_writes_model_mid_stream() {
    let tmp = TempDir::new().unwrap();
    let saved = tmp.path().join("mid.rdct");
    let body = format!("1 'a | x:1\n0 'b | y:1\n'save_{}\n1 'c | x:1 y:1\n", saved.display());
    let data = write_input(&tmp, "train.txt", &body);
    let preds = tmp.path().join("preds.txt");
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "2", "-b", "8", "-p", &path_arg(&preds), "--quiet"])
        .assert()
        .success();

    assert!(saved.is_file());
    assert_eq!(fs::read_to_string(&preds).unwrap().lines().count(), 3);
}

#[test]
fn invalid_utf8_line_does_not_end_the_run() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("mixed.txt");
    fs::write(&data, b"1 'a | x:1\n0 'b | \xff\xfe y:1\n1 'c | x:2\n0 'd | y:2\n").unwrap();
    let preds = tmp.path().join("preds.txt");
    let model = tmp.path().join("m.rdct");
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "2", "-b", "8", "-p", &path_arg(&preds)])
        .args(["-f", &path_arg(&model), "--quiet"])
        .assert()
        .success()
        .stderr(predicate::str::contains("line 2: invalid UTF-8"));

    let tags: Vec<String> = fs::read_to_string(&preds)
        .unwrap()
        .lines()
        .map(|l| l.rsplit(' ').next().unwrap().to_string())
        .collect();
    assert_eq!(tags, vec!["a", "b", "c", "d"]);
    assert!(model.is_file());
}

#[test]
fn unreadable_input_fails_without_saving() {
    let tmp = TempDir::new().unwrap();
    // valid gzip header followed by a deflate block of reserved type
    let mut bytes = vec![0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];
    bytes.extend_from_slice(&[0xff; 16]);
    let data = tmp.path().join("corrupt.txt.gz");
    fs::write(&data, bytes).unwrap();
    let model = tmp.path().join("m.rdct");
    let cache = tmp.path().join("corrupt.cache");
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "2", "-b", "8", "--quiet"])
        .args(["-f", &path_arg(&model), "--cache-file", &path_arg(&cache)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read input").and(predicate::str::contains("model not saved")));
    assert!(!model.exists());
    assert!(!cache.exists());
}

#[test]
fn gzip_prediction_file_is_complete() {
    use std::io::Read;

    let tmp = TempDir::new().unwrap();
    let data = write_input(&tmp, "train.txt", TRAIN);
    let preds = tmp.path().join("preds.txt.gz");
    reduct()
        .args(["--data", &path_arg(&data), "--bs", "3", "-b", "8", "-p", &path_arg(&preds), "--quiet"])
        .assert()
        .success();

    let mut text = String::new();
    flate2::read::GzDecoder::new(fs::File::open(&preds).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text.lines().count(), 5);
    assert!(text.ends_with(" e\n"));
}
