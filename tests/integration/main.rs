//! Integration tests for stickydisk

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::TempDir;

    fn stickydisk() -> Command {
        let mut cmd = cargo_bin_cmd!("stickydisk");
        cmd.env_remove("STICKYDISK_CONFIG")
            .env_remove("STICKYDISK_STATE_FILE")
            .env_remove("INPUT_KEY")
            .env_remove("INPUT_PATH")
            .env_remove("INPUT_VERSION")
            .env_remove("BLACKSMITH_CACHE_URL")
            .env_remove("PETNAME");
        cmd
    }

    /// Serve one HTTP response and return the request line
    fn one_shot_server(response: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).unwrap();
            request_line
        });

        (url, handle)
    }

    #[test]
    fn help_displays() {
        stickydisk()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Sticky disk lifecycle"));
    }

    #[test]
    fn version_displays() {
        stickydisk()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stickydisk"));
    }

    #[test]
    fn config_show_omits_secrets() {
        stickydisk()
            .args(["config", "show"])
            .env("BLACKSMITH_STICKYDISK_TOKEN", "s3cret-token")
            .env("BLACKSMITH_STICKY_DISK_GRPC_PORT", "6001")
            .assert()
            .success()
            .stdout(predicate::str::contains("[control_plane]"))
            .stdout(predicate::str::contains("port = 6001"))
            .stdout(predicate::str::contains("s3cret-token").not());
    }

    #[test]
    fn config_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stickydisk.toml");
        std::fs::write(&path, "[mount]\ninternal_root = \"/srv/sticky\"\n").unwrap();

        stickydisk()
            .args(["config", "show", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("/srv/sticky"));
    }

    #[test]
    fn delete_cache_rejects_empty_key() {
        stickydisk()
            .args(["delete-cache", "--key", ""])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "Cache key cannot be empty unless prefix is true",
            ));
    }

    #[test]
    fn delete_cache_not_found_is_success() {
        let (url, server) =
            one_shot_server("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");

        stickydisk()
            .args(["delete-cache", "--key", "npm-cache"])
            .env("BLACKSMITH_CACHE_URL", &url)
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache not found: npm-cache"));

        assert!(server.join().unwrap().starts_with("DELETE /caches/npm-cache "));
    }

    #[test]
    fn delete_cache_version_reports_count() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 14\r\nConnection: close\r\n\r\n{\"deleted\": 1}",
        );

        stickydisk()
            .args(["delete-cache", "--key", "npm-cache", "--cache-version", "v1"])
            .env("BLACKSMITH_CACHE_URL", &url)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Successfully deleted cache version: npm-cache@v1",
            ))
            .stdout(predicate::str::contains("Deleted 1 cache entries"));

        assert!(server.join().unwrap().starts_with("DELETE /caches/npm-cache/v1 "));
    }

    #[test]
    fn delete_cache_prefix_reports_both_lines() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 14\r\nConnection: close\r\n\r\n{\"deleted\": 5}",
        );

        stickydisk()
            .args(["delete-cache", "--key", "npm-", "--prefix"])
            .env("BLACKSMITH_CACHE_URL", &url)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Successfully deleted caches with prefix: npm-",
            ))
            .stdout(predicate::str::contains("Deleted 5 cache entries"));

        assert!(server.join().unwrap().starts_with("DELETE /caches/npm-?prefix "));
    }

    #[test]
    fn delete_cache_server_error_fails() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );

        stickydisk()
            .args(["delete-cache", "--key", "npm-", "--prefix"])
            .env("BLACKSMITH_CACHE_URL", &url)
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "Failed to delete cache: 500 Internal Server Error",
            ));

        assert!(server.join().unwrap().starts_with("DELETE /caches/npm-?prefix "));
    }

    #[test]
    fn teardown_without_state_succeeds() {
        let temp = TempDir::new().unwrap();

        stickydisk()
            .args(["teardown", "--path", "/tmp/no-such-sticky-disk", "--state-file"])
            .arg(temp.path().join("job.json"))
            .assert()
            .success()
            .stdout(predicate::str::contains("No sticky disk to tear down"));
    }

    #[test]
    fn setup_degrades_when_agent_unreachable() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join("job.json");

        stickydisk()
            .args(["setup", "--key", "npm", "--path"])
            .arg(temp.path().join("cache"))
            .arg("--state-file")
            .arg(&state)
            .env("BLACKSMITH_STICKY_DISK_GRPC_HOST", "127.0.0.1")
            .env("BLACKSMITH_STICKY_DISK_GRPC_PORT", "1")
            .assert()
            .success()
            .stdout(predicate::str::contains("Continuing without sticky disk"));

        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&state).unwrap()).unwrap();
        assert_eq!(record["error"], serde_json::Value::Bool(true));
        assert_eq!(record["sticky_disk_key"], "npm");
        assert!(record["expose_id"].is_null());
    }
}
