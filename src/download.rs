//! Model downloading
//!
//! Models are fetched from the upstream release assets on first use. The
//! body is streamed into a temporary file inside the model home, hashed while
//! streaming, and renamed into place only after the transfer completes, so
//! an interrupted download never leaves a truncated model behind.

use crate::cache::{format_size, CachedModelManifest, ModelCache};
use crate::error::{RembgError, Result};
use crate::models::ModelDescriptor;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// Downloads catalog models into a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RembgError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a model into the cache, replacing any existing file
    ///
    /// # Returns
    /// Path of the downloaded model file
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing or renaming
    pub async fn download_model(&self, model: &ModelDescriptor, show_progress: bool) -> Result<PathBuf> {
        let url = model.url();
        let final_path = self.cache.model_path(model);
        tracing::info!(model = model.name, url = %url, "Downloading model");

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(format!("Downloading {}", model.file_name()));

        let result = self.download_to_cache(model, &url, &progress).await;
        match &result {
            Ok(manifest) => {
                progress.finish_with_message(format!(
                    "Downloaded {} ({})",
                    model.file_name(),
                    format_size(manifest.size_bytes)
                ));
                tracing::info!(
                    model = model.name,
                    sha256 = %manifest.sha256,
                    path = %final_path.display(),
                    "Model downloaded"
                );
            },
            Err(e) => {
                progress.finish_with_message(format!("Download of {} failed", model.file_name()));
                tracing::error!(model = model.name, error = %e, "Model download failed");
            },
        }

        result.map(|_| final_path)
    }

    async fn download_to_cache(
        &self,
        model: &ModelDescriptor,
        url: &str,
        progress: &ProgressIndicator,
    ) -> Result<CachedModelManifest> {
        let home = self.cache.home();
        let final_path = self.cache.model_path(model);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RembgError::network_error(format!("Failed to download {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RembgError::network_error(
                format!("HTTP error {status} for {url}"),
                std::io::Error::new(std::io::ErrorKind::Other, "unexpected HTTP status"),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        // Temp file lives in the model home so the final rename stays on one filesystem
        let (std_file, temp_path) = tempfile::Builder::new()
            .prefix(&format!(".{}-", model.name))
            .suffix(".part")
            .tempfile_in(home)
            .map_err(|e| RembgError::file_io_error("create temporary model file", home, &e))?
            .into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| RembgError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| RembgError::file_io_error("write model file", &temp_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        if downloaded == 0 {
            return Err(RembgError::network_error(
                format!("Empty response body for {url}"),
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no bytes received"),
            ));
        }

        file.flush()
            .await
            .map_err(|e| RembgError::file_io_error("flush model file", &temp_path, &e))?;
        file.sync_all()
            .await
            .map_err(|e| RembgError::file_io_error("flush model file", &temp_path, &e))?;
        drop(file);
        temp_path
            .persist(&final_path)
            .map_err(|e| RembgError::file_io_error("move downloaded model", &final_path, &e.error))?;

        let manifest = CachedModelManifest {
            model: model.name.to_string(),
            url: url.to_string(),
            sha256: format!("{:x}", hasher.finalize()),
            size_bytes: downloaded,
            downloaded_at: chrono::Utc::now(),
        };
        self.cache.write_manifest(model, &manifest)?;

        tracing::debug!(
            bytes = downloaded,
            path = %final_path.display(),
            "Model file written"
        );
        Ok(manifest)
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
            match ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                Ok(style) => pb.set_style(style.progress_chars("#>-")),
                Err(e) => tracing::debug!(error = %e, "Invalid progress template, using default style"),
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// The cache this downloader writes into
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::file_sha256;
    use crate::models::find_model;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    /// Answer a single HTTP request with a fixed status and body
    async fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let header = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/model.onnx")
    }

    fn local_downloader(home: &Path) -> ModelDownloader {
        ModelDownloader {
            client: Client::builder().no_proxy().build().unwrap(),
            cache: ModelCache::with_custom_cache_dir(home).unwrap(),
        }
    }

    fn partial_files(home: &Path) -> Vec<String> {
        std::fs::read_dir(home)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".part"))
            .collect()
    }

    #[tokio::test]
    async fn test_download_writes_model_and_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let url = serve_once("200 OK", body.clone()).await;
        let downloader = local_downloader(temp_dir.path());
        let model = find_model("u2netp").unwrap();

        let manifest = downloader
            .download_to_cache(model, &url, &ProgressIndicator::NoOp)
            .await
            .unwrap();

        let model_path = downloader.cache().model_path(model);
        assert_eq!(std::fs::read(&model_path).unwrap(), body);
        assert_eq!(manifest.size_bytes, body.len() as u64);
        assert_eq!(manifest.sha256, file_sha256(&model_path).unwrap());
        assert_eq!(manifest.url, url);
        assert_eq!(downloader.cache().read_manifest(model).unwrap(), Some(manifest));
        assert!(downloader.cache().verify_cached_model(model).unwrap());
        assert!(partial_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_http_error_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let url = serve_once("404 Not Found", b"missing".to_vec()).await;
        let downloader = local_downloader(temp_dir.path());
        let model = find_model("u2net").unwrap();

        let err = downloader
            .download_to_cache(model, &url, &ProgressIndicator::NoOp)
            .await
            .unwrap_err();

        assert!(matches!(err, RembgError::Network { .. }));
        assert!(err.to_string().contains("404"));
        assert!(!downloader.cache().is_model_cached(model));
        assert!(partial_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let url = serve_once("200 OK", Vec::new()).await;
        let downloader = local_downloader(temp_dir.path());
        let model = find_model("silueta").unwrap();

        let err = downloader
            .download_to_cache(model, &url, &ProgressIndicator::NoOp)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Empty response body"));
        assert!(!downloader.cache().model_path(model).exists());
        assert!(downloader.cache().read_manifest(model).unwrap().is_none());
        assert!(partial_files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_progress_indicator_no_op() {
        let progress = ProgressIndicator::NoOp;

        progress.set_message("test message".to_string());
        progress.set_length(100);
        progress.set_position(50);
        progress.finish_with_message("finished".to_string());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_progress_indicator_with_indicatif() {
        let pb = ProgressBar::hidden();
        let progress = ProgressIndicator::Indicatif(pb);

        progress.set_message("test message".to_string());
        progress.set_length(100);
        progress.set_position(50);
        progress.finish_with_message("finished".to_string());
    }

    #[test]
    fn test_downloader_uses_given_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let downloader = ModelDownloader::new(cache).unwrap();

        assert_eq!(downloader.cache().home(), temp_dir.path());
        assert!(format!("{downloader:?}").contains("ModelDownloader"));
    }
}
