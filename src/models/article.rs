//! 文章记录与生命周期状态
//!
//! 账本中的每条记录对应一篇候选文章，从被检索到、法务审核、
//! 出题、审查、改进，直到完成或出错的完整生命周期。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 法务审核状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// 尚未审核
    Pending,
    /// 审核通过
    Approved,
    /// 审核拒绝（终态，不是错误）
    Rejected,
}

impl Default for LicenseStatus {
    fn default() -> Self {
        LicenseStatus::Pending
    }
}

/// 流水线阶段
///
/// 成功路径上严格单向推进：
/// discovered → validated → questions_generated → reviewed
/// → questions_improved → completed。
/// 任一非终态都可以转入 `Error`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Discovered,
    Validated,
    QuestionsGenerated,
    Reviewed,
    QuestionsImproved,
    Completed,
    Error,
}

impl PipelineStage {
    /// 成功路径上的下一个阶段
    pub fn successor(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Discovered => Some(PipelineStage::Validated),
            PipelineStage::Validated => Some(PipelineStage::QuestionsGenerated),
            PipelineStage::QuestionsGenerated => Some(PipelineStage::Reviewed),
            PipelineStage::Reviewed => Some(PipelineStage::QuestionsImproved),
            PipelineStage::QuestionsImproved => Some(PipelineStage::Completed),
            PipelineStage::Completed | PipelineStage::Error => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Error)
    }

    /// 获取阶段名称（用于日志）
    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Discovered => "discovered",
            PipelineStage::Validated => "validated",
            PipelineStage::QuestionsGenerated => "questions_generated",
            PipelineStage::Reviewed => "reviewed",
            PipelineStage::QuestionsImproved => "questions_improved",
            PipelineStage::Completed => "completed",
            PipelineStage::Error => "error",
        }
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        PipelineStage::Discovered
    }
}

/// 候选文章
///
/// 检索阶段的输出，或从候选列表文件加载的条目。
/// 尚未进入账本，因此没有 `article_id`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleCandidate {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub year: String,
    /// 文章体裁（noticia / crónica / ensayo ...）
    #[serde(default)]
    pub kind: String,
    /// 声明的许可类型（由法务审核确认）
    #[serde(default)]
    pub license: String,
    /// 本地源文本路径
    #[serde(default)]
    pub source_path: String,
    /// 预审批状态（generation 入口的列表文件使用，其余入口为空）
    #[serde(default)]
    pub status: String,
    /// 适配器自带的附加元数据，核心流程不解释
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ArticleCandidate {
    /// 预审批列表中的条目是否已批准
    pub fn is_pre_approved(&self) -> bool {
        matches!(
            self.status.trim().to_ascii_uppercase().as_str(),
            "APROBADO" | "APROBADO_CONDICION"
        )
    }
}

/// 账本中的文章记录
///
/// 注意字段顺序：标量字段在前，映射字段在后，
/// 保证 TOML 序列化时值先于子表输出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub article_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub license_status: LicenseStatus,
    #[serde(default)]
    pub license_type: String,
    /// 法务审核给出的机器可读理由
    #[serde(default)]
    pub validation_reason: String,
    #[serde(default)]
    pub pipeline_stage: PipelineStage,
    #[serde(default)]
    pub uploaded: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    /// 仅在 error 态设置；不清除之前已记录的进度字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// 产物种类 → 本地路径，逐个累积
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub local_artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ArticleRecord {
    /// 从候选文章创建新记录
    pub fn from_candidate(candidate: &ArticleCandidate, article_id: String) -> Self {
        Self {
            article_id,
            url: candidate.url.trim().to_string(),
            title: candidate.title.clone(),
            author: candidate.author.clone(),
            source: candidate.source.clone(),
            year: candidate.year.clone(),
            kind: candidate.kind.clone(),
            source_path: candidate.source_path.clone(),
            license_status: LicenseStatus::Pending,
            license_type: String::new(),
            validation_reason: String::new(),
            pipeline_stage: PipelineStage::Discovered,
            uploaded: false,
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            processed_at: None,
            error_reason: None,
            local_artifacts: BTreeMap::new(),
            extra: candidate.extra.clone(),
        }
    }
}

/// 法务审核的单条结论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub url: String,
    pub approved: bool,
    pub license_type: String,
    pub reason: String,
}

/// 法务审核结果：逐条结论 + 批准子集
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub audit: Vec<AuditEntry>,
    pub approved: Vec<ArticleCandidate>,
}

/// 规范化 URL 用于去重比较（修剪空白 + ASCII 小写）
pub fn normalize_url(url: &str) -> String {
    url.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_successor_chain() {
        let mut stage = PipelineStage::Discovered;
        let mut chain = vec![stage];
        while let Some(next) = stage.successor() {
            chain.push(next);
            stage = next;
        }
        assert_eq!(
            chain,
            vec![
                PipelineStage::Discovered,
                PipelineStage::Validated,
                PipelineStage::QuestionsGenerated,
                PipelineStage::Reviewed,
                PipelineStage::QuestionsImproved,
                PipelineStage::Completed,
            ]
        );
        assert!(PipelineStage::Error.successor().is_none());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("  https://Ejemplo.CL/Noticia-1 "),
            "https://ejemplo.cl/noticia-1"
        );
    }

    #[test]
    fn test_pre_approved_status() {
        let mut candidate = ArticleCandidate {
            url: "https://ejemplo.cl/a".to_string(),
            title: "A".to_string(),
            author: String::new(),
            source: String::new(),
            year: String::new(),
            kind: String::new(),
            license: String::new(),
            source_path: String::new(),
            status: "aprobado".to_string(),
            extra: BTreeMap::new(),
        };
        assert!(candidate.is_pre_approved());
        candidate.status = "APROBADO_CONDICION".to_string();
        assert!(candidate.is_pre_approved());
        candidate.status = "RECHAZADO".to_string();
        assert!(!candidate.is_pre_approved());
    }
}
