#![allow(dead_code)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use rest_starter::{build_app, config::AppConfig, database::StorageBackend};

pub const API: &str = "/api/v1";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub uploads: TempDir,
    client: reqwest::Client,
}

impl TestServer {
    /// Serves a fresh in-memory app on an ephemeral port inside the test runtime.
    pub async fn start() -> Result<Self> {
        Self::start_with(StorageBackend::Memory).await
    }

    pub async fn start_with(storage: StorageBackend) -> Result<Self> {
        let uploads = tempfile::tempdir().context("failed to create upload dir")?;

        let mut config = AppConfig::development();
        config.security.jwt_secret = Some("integration-test-secret".to_string());
        config.uploads.directory = uploads.path().to_path_buf();
        config.uploads.max_file_size = 1024;

        let app = build_app(&config, storage)?;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let port = listener.local_addr()?.port();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            port,
            base_url: format!("http://127.0.0.1:{}", port),
            uploads,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Registers `email` and returns `(user id, bearer token)`.
    pub async fn register(&self, email: &str) -> Result<(String, String)> {
        let credentials = json!({ "email": email, "password": "secret123" });

        let res = self.client.post(self.api("/session/signup")).json(&credentials).send().await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "signup failed: {}", res.status());

        let res = self.client.post(self.api("/session/login")).json(&credentials).send().await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login failed: {}", res.status());
        let body: Value = res.json().await?;

        let user_id = body["userId"].as_str().context("missing userId")?.to_string();
        let token = body["token"].as_str().context("missing token")?.to_string();
        Ok((user_id, token))
    }
}
