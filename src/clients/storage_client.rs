//! 存储 API 客户端
//!
//! 封装所有与存储服务相关的上传逻辑，是产物落库的出口。
//! 上传失败不致命：调用方把条目标记为"完成但未上传"，
//! 产物保留在本地等待人工跟进。

use crate::config::Config;
use crate::error::SinkError;
use crate::models::article::ArticleRecord;
use crate::services::ArtifactSink;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// 存储 API 客户端
pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl StorageClient {
    /// 创建新的存储客户端
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.storage_api_base_url.trim_end_matches('/').to_string(),
            token: config.storage_token.clone(),
        }
    }

    /// 上传单个本地文件
    ///
    /// # 参数
    /// - `local_path`: 本地文件路径
    /// - `remote_name`: 存储端的目标名称（含文件夹前缀）
    async fn upload_file(&self, local_path: &Path, remote_name: &str) -> Result<(), SinkError> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            SinkError::LocalFileUnreadable {
                path: local_path.display().to_string(),
                source: Box::new(e),
            }
        })?;

        let endpoint = format!("{}/files/{}", self.base_url, remote_name);
        debug!("上传文件: {} -> {}", local_path.display(), endpoint);

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| SinkError::UploadFailed {
                endpoint: endpoint.clone(),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            // 尽量从响应体里取出服务端的错误信息
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));
            return Err(SinkError::BadStatus {
                endpoint,
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for StorageClient {
    /// 上传一篇文章的全部产物
    ///
    /// 按产物种类逐个上传，任一失败即返回错误（产物保留在本地）。
    async fn upload_article_package(
        &self,
        article: &ArticleRecord,
        artifacts: &BTreeMap<String, String>,
    ) -> Result<(), SinkError> {
        for (kind, path) in artifacts {
            let local_path = Path::new(path);
            let file_name = local_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("{}-{}", article.article_id, kind));
            let remote_name = format!("{}/{}", article.article_id, file_name);

            self.upload_file(local_path, &remote_name).await?;
            debug!("[{}] 产物 {} 上传成功", article.article_id, kind);
        }

        info!(
            "[{}] ✓ {} 个产物全部上传完成",
            article.article_id,
            artifacts.len()
        );
        Ok(())
    }

    /// 上传批次级的账本导出文件
    async fn export_ledger(&self, export_path: &Path) -> Result<(), SinkError> {
        let file_name = export_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "validated_articles.csv".to_string());
        let remote_name = format!("master/{}", file_name);

        self.upload_file(export_path, &remote_name).await?;
        info!("✓ 账本导出已上传: {}", remote_name);
        Ok(())
    }
}
