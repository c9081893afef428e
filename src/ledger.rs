//! 文章状态账本
//!
//! ## 职责
//!
//! 单一持久化表，记录每篇文章的完整生命周期状态，是去重与
//! 断点续跑的唯一事实来源。
//!
//! ## 核心功能
//!
//! 1. **追加与更新**：按 `article_id` 键入，记录只增不删
//! 2. **去重**：历史上出现过的 URL 永不重复入账
//! 3. **序号延续**：新 ID 接着历史最大编号继续（C030 → C031）
//! 4. **单向推进**：阶段只沿成功路径前进，失败转入 error 态
//! 5. **立即落盘**：每次状态变更后整体重写账本文件
//!
//! ## 设计特点
//!
//! - **单写者**：只有编排进程修改账本，报表工具可随意读取
//! - **可人工检修**：TOML 格式，操作员可手动把某条记录的
//!   `license_status` 改回 `approved` 或回退 `pipeline_stage`
//!   来强制重跑——这是操作上的逃生口，不属于自动状态机
//! - **中断安全**：进程中断只会把部分条目留在最后到达的阶段，
//!   账本本身始终是合法的可续跑状态

use crate::error::{AppResult, LedgerError};
use crate::models::article::{
    normalize_url, ArticleCandidate, ArticleRecord, LicenseStatus, PipelineStage,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 账本文件的顶层结构（`[[articles]]` 表数组）
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    articles: Vec<ArticleRecord>,
}

/// 文章状态账本
pub struct Ledger {
    path: PathBuf,
    records: Vec<ArticleRecord>,
}

/// 账本的汇总统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub total: usize,
    pub validated: usize,
    pub rejected: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub errors: usize,
}

impl Ledger {
    /// 打开账本文件，不存在则从空账本开始
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();

        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| LedgerError::parse_failed(path.display().to_string(), e))?;
            let file: LedgerFile = toml::from_str(&content)
                .map_err(|e| LedgerError::parse_failed(path.display().to_string(), e))?;
            file.articles
        } else {
            Vec::new()
        };

        debug!("账本已打开: {} ({} 条记录)", path.display(), records.len());

        Ok(Self { path, records })
    }

    /// 把当前状态整体重写到账本文件
    ///
    /// 每次状态变更后立即调用，保证中断后可以续跑。
    fn save(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| LedgerError::persist_failed(self.path.display().to_string(), e))?;
            }
        }

        let file = LedgerFile {
            articles: self.records.clone(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| LedgerError::persist_failed(self.path.display().to_string(), e))?;
        fs::write(&self.path, content)
            .map_err(|e| LedgerError::persist_failed(self.path.display().to_string(), e))?;

        Ok(())
    }

    /// 账本文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 所有记录（报表与测试用）
    pub fn records(&self) -> &[ArticleRecord] {
        &self.records
    }

    /// 按 ID 查找记录
    pub fn get_article(&self, article_id: &str) -> Option<&ArticleRecord> {
        self.records.iter().find(|r| r.article_id == article_id)
    }

    /// 添加候选文章，返回与输入一一对应的 ID 列表
    ///
    /// 没有 `article_id` 的候选分配下一个序号；URL 已存在的候选
    /// 不会覆盖已有记录，返回已有记录的 ID。
    pub fn add_articles(&mut self, candidates: &[ArticleCandidate]) -> AppResult<Vec<String>> {
        let mut assigned = Vec::with_capacity(candidates.len());
        let mut next = self.next_sequence();
        let mut inserted = 0usize;

        for candidate in candidates {
            let normalized = normalize_url(&candidate.url);

            if let Some(existing) = self
                .records
                .iter()
                .find(|r| normalize_url(&r.url) == normalized)
            {
                debug!(
                    "候选已存在，跳过: {} ({})",
                    existing.article_id, candidate.url
                );
                assigned.push(existing.article_id.clone());
                continue;
            }

            let article_id = format!("C{:03}", next);
            next += 1;
            inserted += 1;

            self.records
                .push(ArticleRecord::from_candidate(candidate, article_id.clone()));
            assigned.push(article_id);
        }

        if inserted > 0 {
            self.save()?;
        }

        Ok(assigned)
    }

    /// 历史上出现过的全部 URL，用作检索阶段的排除列表
    pub fn get_excluded_urls(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut urls = Vec::new();
        for record in &self.records {
            if record.url.is_empty() {
                continue;
            }
            if seen.insert(normalize_url(&record.url)) {
                urls.push(record.url.clone());
            }
        }
        urls
    }

    /// 历史最大编号的 ID（用于序号延续）
    pub fn get_last_id(&self) -> Option<String> {
        let re = Regex::new(r"C(\d+)").unwrap();
        let mut max_num = 0u32;
        let mut max_id = None;

        for record in &self.records {
            if let Some(caps) = re.captures(&record.article_id) {
                if let Ok(num) = caps[1].parse::<u32>() {
                    if num > max_num {
                        max_num = num;
                        max_id = Some(record.article_id.clone());
                    }
                }
            }
        }

        max_id
    }

    fn next_sequence(&self) -> u32 {
        let re = Regex::new(r"C(\d+)").unwrap();
        let max = self
            .records
            .iter()
            .filter_map(|r| re.captures(&r.article_id))
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        max + 1
    }

    /// 记录法务审核结论
    ///
    /// 批准则推进到 `validated`；拒绝是终态（不是错误），
    /// 该记录永远不会进入出题阶段。
    pub fn update_license(
        &mut self,
        article_id: &str,
        status: LicenseStatus,
        license_type: &str,
        reason: &str,
    ) -> AppResult<()> {
        let record = self.find_mut(article_id)?;

        record.license_status = status;
        record.license_type = license_type.to_string();
        record.validation_reason = reason.to_string();

        if status == LicenseStatus::Approved
            && record.pipeline_stage == PipelineStage::Discovered
        {
            record.pipeline_stage = PipelineStage::Validated;
        }

        self.save()
    }

    /// 把记录推进到指定阶段（只进不退）
    ///
    /// 只接受当前阶段的直接后继；重复标记当前阶段被静默忽略，
    /// 以容忍同一阶段的 at-least-once 重试。其他目标只记日志、
    /// 不报错、不改动记录。
    pub fn mark_stage(&mut self, article_id: &str, stage: PipelineStage) -> AppResult<()> {
        let record = self.find_mut(article_id)?;

        if record.license_status == LicenseStatus::Rejected {
            warn!(
                "记录 {} 已被法务拒绝，忽略阶段推进到 {}",
                article_id,
                stage.name()
            );
            return Ok(());
        }

        if record.pipeline_stage == stage {
            debug!("记录 {} 已处于阶段 {}，忽略重复标记", article_id, stage.name());
            return Ok(());
        }

        if record.pipeline_stage.successor() != Some(stage) {
            warn!(
                "记录 {} 的阶段 {} 不能推进到 {}，忽略",
                article_id,
                record.pipeline_stage.name(),
                stage.name()
            );
            return Ok(());
        }

        record.pipeline_stage = stage;
        self.save()
    }

    /// 把记录标记为出错
    ///
    /// 保留之前已记录的产物与进度字段，只附加失败原因。
    pub fn mark_error(&mut self, article_id: &str, reason: &str) -> AppResult<()> {
        let record = self.find_mut(article_id)?;

        record.pipeline_stage = PipelineStage::Error;
        record.error_reason = Some(reason.to_string());
        record.processed_at =
            Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

        self.save()
    }

    /// 终态成功转换
    pub fn mark_completed(&mut self, article_id: &str, uploaded: bool) -> AppResult<()> {
        let record = self.find_mut(article_id)?;

        if record.pipeline_stage.is_terminal() {
            warn!(
                "记录 {} 已处于终态 {}，忽略完成标记",
                article_id,
                record.pipeline_stage.name()
            );
            return Ok(());
        }

        record.pipeline_stage = PipelineStage::Completed;
        record.uploaded = uploaded;
        record.processed_at =
            Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

        self.save()
    }

    /// 登记一个已生成的产物（立即落盘，后续阶段失败不丢产物）
    pub fn record_artifact(
        &mut self,
        article_id: &str,
        kind: &str,
        path: &str,
    ) -> AppResult<()> {
        let record = self.find_mut(article_id)?;
        record
            .local_artifacts
            .insert(kind.to_string(), path.to_string());
        self.save()
    }

    /// 所有法务批准的记录（账本导出用）
    pub fn approved_records(&self) -> Vec<ArticleRecord> {
        self.records
            .iter()
            .filter(|r| r.license_status == LicenseStatus::Approved)
            .cloned()
            .collect()
    }

    /// 全账本的汇总统计
    pub fn statistics(&self) -> Statistics {
        let mut stats = Statistics {
            total: self.records.len(),
            ..Default::default()
        };

        for record in &self.records {
            match record.license_status {
                LicenseStatus::Approved => stats.validated += 1,
                LicenseStatus::Rejected => stats.rejected += 1,
                LicenseStatus::Pending => {}
            }
            match record.pipeline_stage {
                PipelineStage::Completed => stats.completed += 1,
                PipelineStage::Error => stats.errors += 1,
                PipelineStage::Validated
                | PipelineStage::QuestionsGenerated
                | PipelineStage::Reviewed
                | PipelineStage::QuestionsImproved => stats.in_progress += 1,
                PipelineStage::Discovered => {}
            }
        }

        stats
    }

    fn find_mut(&mut self, article_id: &str) -> Result<&mut ArticleRecord, LedgerError> {
        self.records
            .iter_mut()
            .find(|r| r.article_id == article_id)
            .ok_or_else(|| LedgerError::RecordNotFound {
                article_id: article_id.to_string(),
            })
    }
}
