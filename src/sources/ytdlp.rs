use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::{ClientFactory, ExtractOptions, ExtractedInfo, ExtractorClient};
use crate::error::ResolveError;

/// Fragmentos de stderr que indican un problema del contenido, no del proveedor.
const EXPECTED_FAILURES: &[&str] = &[
    "Video unavailable",
    "Private video",
    "Sign in to confirm your age",
    "not available in your country",
    "This video has been removed",
    "members-only",
    "Unsupported URL",
    "This live event will begin",
];

/// Construye clientes `yt-dlp` para cada conjunto de opciones.
#[derive(Debug, Clone)]
pub struct YtDlpFactory {
    binary: String,
    timeout: Duration,
}

impl YtDlpFactory {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp no disponible ({})", self.binary);
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }
}

impl ClientFactory for YtDlpFactory {
    fn build(&self, options: &ExtractOptions) -> Arc<dyn ExtractorClient> {
        Arc::new(YtDlpClient {
            binary: self.binary.clone(),
            args: build_args(options),
            timeout: self.timeout,
        })
    }
}

/// Ejecuta `yt-dlp -J` con argumentos fijos.
#[derive(Debug)]
pub struct YtDlpClient {
    binary: String,
    args: Vec<String>,
    timeout: Duration,
}

#[async_trait]
impl ExtractorClient for YtDlpClient {
    async fn extract(&self, target: &str) -> Result<ExtractedInfo, ResolveError> {
        debug!("▶️ yt-dlp {} -- {}", self.args.join(" "), target);

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(&self.args).arg("--").arg(target).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                ResolveError::unexpected(format!(
                    "yt-dlp excedió {}s para {target}",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ResolveError::unexpected(format!("no se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let error = classify_failure(&stderr);
            if !error.expected {
                warn!("⚠️ yt-dlp falló para {}: {}", target, error);
            }
            return Err(error);
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolveError::unexpected(format!("JSON de yt-dlp inválido: {e}")))
    }
}

pub fn build_args(options: &ExtractOptions) -> Vec<String> {
    let mut args: Vec<String> = ["-J", "--no-warnings", "--socket-timeout", "15"]
        .into_iter()
        .map(String::from)
        .collect();

    if let Some(format) = &options.format {
        args.extend(["-f".to_string(), format.clone()]);
    }
    if let Some(cookies) = &options.cookie_file {
        args.extend(["--cookies".to_string(), cookies.display().to_string()]);
    }
    if options.flat_playlist {
        args.push("--flat-playlist".to_string());
    }
    if let Some(search) = &options.default_search {
        args.extend(["--default-search".to_string(), search.clone()]);
    }
    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }
    args
}

pub fn classify_failure(stderr: &str) -> ResolveError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .unwrap_or_else(|| stderr.trim())
        .to_string();

    if EXPECTED_FAILURES.iter().any(|marker| stderr.contains(marker)) {
        ResolveError::expected(message)
    } else {
        ResolveError::unexpected(message)
    }
}
