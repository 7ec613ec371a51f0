//! End-to-end tests driving the `sutools-demo` binary.
//!
//! Every test runs inside its own temporary working directory so the default
//! `logs/` root never leaks between runs.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn demo(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("sutools-demo");
    cmd.current_dir(dir.path()).env_remove("SUTOOLS_CONFIG").env_remove("SUTOOLS_LOG");
    cmd
}

fn module_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("logs").join("sutools-demo")
}

fn log_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
        .collect()
}

// ============================================
// Help and parse errors
// ============================================

mod help {
    use super::*;

    #[test]
    fn no_command_prints_help_and_succeeds() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .assert()
            .success()
            .stdout(predicate::str::contains("This module does random stuff."))
            .stdout(predicate::str::contains("echo a string"))
            .stdout(predicate::str::contains("execute minus function"));
    }

    #[test]
    fn subcommand_help_shows_the_signature() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .args(["add", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("add(x: int, y: int = 2) -> int"))
            .stdout(predicate::str::contains("--y"));
    }

    #[test]
    fn two_character_abbreviation_is_listed() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .args(["greet", "-h"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[-gr]"))
            .stdout(predicate::str::contains("[-lo]"));
    }

    #[test]
    fn bad_type_is_a_parse_error() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .args(["add", "three"])
            .assert()
            .code(2)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("invalid int value 'three'"));
    }

    #[test]
    fn missing_argument_is_a_parse_error() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .arg("minus")
            .arg("1")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("<y>"));
    }

    #[test]
    fn variadic_command_missing_its_declared_argument_shows_usage() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .arg("collect")
            .assert()
            .code(2)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("<first>"))
            .stderr(predicate::str::contains("Usage:"))
            .stderr(predicate::str::contains("collect"));
    }

    #[test]
    fn unknown_command_is_a_parse_error() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp).arg("nope").assert().code(2);
    }
}

// ============================================
// Dispatch
// ============================================

mod dispatch {
    use super::*;

    #[test]
    fn echo_prints_its_argument() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp).args(["echo", "hi"]).assert().success().stdout("hi\n");
    }

    #[test]
    fn defaults_and_flags() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp).args(["add", "3"]).assert().success().stdout("5\n");
        demo(&tmp).args(["add", "3", "--y", "4"]).assert().success().stdout("7\n");
        demo(&tmp).args(["add", "3", "-y", "10"]).assert().success().stdout("13\n");
    }

    #[test]
    fn two_character_abbreviation_is_accepted() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .args(["greet", "bob", "-gr", "hey"])
            .assert()
            .success()
            .stdout("hey, bob\n");
        demo(&tmp)
            .args(["greet", "bob", "-lo", "yes"])
            .assert()
            .success()
            .stdout("HELLO, BOB\n");
    }

    #[test]
    fn command_without_return_value_prints_nothing() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .args(["minus", "5", "3"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn async_command_prints_like_a_sync_one() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .args(["wait", "--ms", "1"])
            .assert()
            .success()
            .stdout("waited 1ms\n");
    }

    #[test]
    fn variadic_tokens_are_split_on_the_first_equals() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .args(["collect", "a", "b", "k=v", "eq=x=y"])
            .assert()
            .success()
            .stdout("first=a\narg b\nkw k=v\nkw eq=x=y\n");
    }

    #[test]
    fn handler_error_exits_non_zero() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp)
            .arg("fail")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("this command always fails"));
    }
}

// ============================================
// Log files
// ============================================

mod logs {
    use super::*;

    #[test]
    fn command_log_lines_land_in_the_run_file() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp).args(["echo", "hi"]).assert().success();

        let files = log_files(&module_dir(&tmp));
        assert_eq!(files.len(), 1);
        let contents = fs::read_to_string(&files[0]).expect("read log");
        assert!(contents.contains(" echo INFO this is a test"), "log was: {contents}");
    }

    #[test]
    fn empty_run_leaves_no_artifacts() {
        let tmp = TempDir::new().expect("tmp dir");
        demo(&tmp).arg("do").assert().success().stdout("do do\n");

        assert!(!tmp.path().join("logs").exists());
    }

    #[test]
    fn filecap_trims_old_runs() {
        let tmp = TempDir::new().expect("tmp dir");
        let dir = module_dir(&tmp);
        fs::create_dir_all(&dir).expect("module dir");
        for i in 0..6 {
            fs::write(dir.join(format!("old_{i}.log")), "old run\n").expect("seed log");
        }

        demo(&tmp)
            .args(["echo", "hi"])
            .assert()
            .success()
            .stdout(predicate::str::contains("filecap removed 2 logs"))
            .stdout(predicate::str::ends_with("hi\n"));

        assert_eq!(log_files(&dir).len(), 5);
    }

    #[test]
    fn invalid_timeout_unit_warns_once() {
        let tmp = TempDir::new().expect("tmp dir");
        let config = tmp.path().join("logger.toml");
        fs::write(&config, "filetimeout = \"1z\"\n").expect("write config");

        demo(&tmp)
            .env("SUTOOLS_CONFIG", &config)
            .args(["echo", "hi"])
            .assert()
            .success()
            .stdout("hi\n")
            .stderr(
                predicate::function(|err: &str| err.matches("Invalid time unit: z").count() == 1)
                    .from_utf8(),
            );
    }

    #[test]
    fn stream_sink_writes_to_stdout() {
        let tmp = TempDir::new().expect("tmp dir");
        let config = tmp.path().join("logger.toml");
        fs::write(
            &config,
            "file = false\nstream = true\nstream_target = \"stdout\"\n\n[stream_format]\ntime_format = \"\"\nmillis = false\n",
        )
        .expect("write config");

        demo(&tmp)
            .env("SUTOOLS_CONFIG", &config)
            .args(["add", "1", "--y", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("add INFO sum is 2"))
            .stdout(predicate::str::ends_with("2\n"));

        assert!(!tmp.path().join("logs").exists());
    }
}
