use assert_cmd::Command;
use predicates::prelude::*;

fn grimoireplot() -> Command {
    Command::cargo_bin("grimoireplot").expect("binary built")
}

#[test]
fn help_lists_every_command() {
    grimoireplot()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("serve")
                .and(predicate::str::contains("push"))
                .and(predicate::str::contains("tree"))
                .and(predicate::str::contains("show"))
                .and(predicate::str::contains("watch"))
                .and(predicate::str::contains("delete")),
        );
}

#[test]
fn unknown_mode_is_rejected_by_the_parser() {
    grimoireplot()
        .args(["push", "g", "c", "p", "--mode", "merge"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown plot mode"));
}

#[test]
fn watch_chapter_requires_grimoire() {
    grimoireplot()
        .args(["watch", "--chapter", "metrics"])
        .assert()
        .failure();
}

#[test]
fn invalid_figure_file_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("fig.json");
    std::fs::write(&file, "{not json").unwrap();

    grimoireplot()
        .args(["push", "g", "c", "p"])
        .arg(&file)
        .args(["--server", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("figure is not valid JSON"));
}

#[test]
fn unreachable_server_is_reported() {
    grimoireplot()
        .args(["push", "g", "c", "p", "-", "--server", "http://127.0.0.1:9"])
        .write_stdin("{\"y\": [1]}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not reach server"));
}

#[test]
fn delete_reports_unreachable_server() {
    grimoireplot()
        .args(["delete", "exp1"])
        .env("GRIMOIRE_SERVER", "http://127.0.0.1:9")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not reach server"));
}
