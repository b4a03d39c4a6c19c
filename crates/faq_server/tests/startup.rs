use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn bin(dir: &std::path::Path) -> Command {
    let path = assert_cmd::cargo::cargo_bin!("faq-server");
    let mut cmd = Command::new(path);
    cmd.current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("FAQ_DATASET")
        .env_remove("FAQ_INDEX")
        .env_remove("FAQ_MODEL_PATH")
        .env_remove("FAQ_TOKENIZER_PATH")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn refuses_to_start_without_api_key() {
    let dir = tempfile::tempdir().unwrap();

    bin(dir.path())
        .args(["--bind", "127.0.0.1:0"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("OPENAI_API_KEY is missing or empty"));
}

#[test]
fn reads_api_key_from_dotenv_file() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("faqs.jsonl");
    fs::write(&dataset, "").unwrap();
    fs::write(dir.path().join(".env"), "OPENAI_API_KEY=sk-from-dotenv\n").unwrap();

    // The key check passes, so startup gets as far as the empty dataset.
    bin(dir.path())
        .args(["--bind", "127.0.0.1:0", "--dataset", dataset.to_str().unwrap()])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("loaded environment file"))
        .stdout(predicate::str::contains("Knowledge base is empty"))
        .stdout(predicate::str::contains("OPENAI_API_KEY").not());
}
