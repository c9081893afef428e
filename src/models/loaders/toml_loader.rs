use crate::models::article::ArticleCandidate;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 候选列表文件的顶层结构（`[[candidates]]` 表数组）
#[derive(Debug, Deserialize)]
struct CandidateList {
    #[serde(default)]
    candidates: Vec<ArticleCandidate>,
}

/// 从 TOML 文件加载候选文章列表
pub async fn load_candidates(toml_file_path: &Path) -> Result<Vec<ArticleCandidate>> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取候选文件: {}", toml_file_path.display()))?;

    let list: CandidateList = toml::from_str(&content)
        .with_context(|| format!("无法解析候选文件: {}", toml_file_path.display()))?;

    Ok(list.candidates)
}

/// 在数据目录中查找最新的匹配文件（按文件名前缀和扩展名）
///
/// 候选文件名带时间戳后缀，文件名排序即时间排序。
pub async fn find_latest_file(
    folder_path: &str,
    prefix: &str,
    extension: &str,
) -> Result<Option<PathBuf>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut matches = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = match path.file_name().and_then(|s| s.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if name.starts_with(prefix)
            && path.extension().and_then(|s| s.to_str()) == Some(extension)
        {
            matches.push(path);
        }
    }

    matches.sort();
    Ok(matches.pop())
}
