//! Integration tests for autopost-queue generate

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_ENV: &str = "AUTOPOST_QUEUE_TEST_LLM_KEY";
const IMAGE_KEY_ENV: &str = "AUTOPOST_QUEUE_TEST_IMAGE_KEY";

fn write_config(dir: &TempDir, endpoint: &str) -> String {
    let config_path = dir.path().join("config.toml");
    let db_path = dir.path().join("posts.db").to_str().unwrap().replace('\\', "/");
    fs::write(
        &config_path,
        format!(
            r#"
[storage]
path = "{}"

[generator]
endpoint = "{}"
model = "test-model"
api_key_env = "{}"
image_api_key_env = "{}"
"#,
            db_path, endpoint, KEY_ENV, IMAGE_KEY_ENV
        ),
    )
    .unwrap();
    config_path.to_str().unwrap().to_string()
}

fn queue(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("autopost-queue").unwrap();
    cmd.env("AUTOPOST_CONFIG", config_path)
        .env_remove("AUTOPOST_STORAGE")
        .env_remove("AUTOPOST_DB_PATH")
        .env_remove(IMAGE_KEY_ENV);
    cmd
}

fn completion(content: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }]
    }))
}

#[test]
fn test_generate_without_api_key_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, "http://127.0.0.1:9/v1/chat/completions");

    queue(&config_path)
        .env_remove(KEY_ENV)
        .args(["generate", "--topic", "tea", "--platforms", "instagram"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains(KEY_ENV));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generate_batch_stores_drafts_with_placeholder_images() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer llm-key"))
        .respond_with(completion(json!({
            "variations": [
                {
                    "caption": "Steep it slow.",
                    "hashtags": ["#tea", "#slowliving", "#ritual"],
                    "image_prompt": "steam over a clay cup",
                    "alt_text": "A clay cup",
                    "cta": "Read more"
                },
                {
                    "caption": "Green, black or oolong?",
                    "hashtags": "#tea #poll #morning",
                    "image_prompt": "three tea tins"
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &format!("{}/v1/chat/completions", server.uri()));

    let output = queue(&config_path)
        .env(KEY_ENV, "llm-key")
        .args([
            "generate",
            "--topic",
            "tea",
            "--count",
            "2",
            "--platforms",
            "instagram,youtube",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let ids: Vec<String> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(ids.len(), 2);

    let listing = queue(&config_path)
        .args(["list", "--status", "draft", "--format", "json"])
        .output()
        .unwrap();
    let posts: Vec<Value> = serde_json::from_slice(&listing.stdout).unwrap();
    assert_eq!(posts.len(), 2);
    for post in &posts {
        assert_eq!(post["topic"], "tea");
        assert_eq!(post["platforms"], "instagram,youtube");
        assert_eq!(post["approved"], false);
        assert!(post["image_url"]
            .as_str()
            .unwrap()
            .contains("Image+Generation+Failed"));
    }
    let hashtags: Vec<&str> = posts.iter().filter_map(|p| p["hashtags"].as_str()).collect();
    assert!(hashtags.contains(&"#tea #slowliving #ritual"));
    assert!(hashtags.contains(&"#tea #poll #morning"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generate_fails_cleanly_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &format!("{}/v1/chat/completions", server.uri()));

    queue(&config_path)
        .env(KEY_ENV, "llm-key")
        .args(["generate", "--topic", "tea", "--platforms", "instagram"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("503"));

    let listing = queue(&config_path).args(["list", "--format", "json"]).output().unwrap();
    let posts: Vec<Value> = serde_json::from_slice(&listing.stdout).unwrap();
    assert!(posts.is_empty());
}
