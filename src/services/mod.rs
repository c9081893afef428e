//! 业务能力层（Services）
//!
//! ## 职责
//!
//! 本层描述"我能做什么"，每个服务只提供一种能力，不关心流程顺序。
//! 四个流水线阶段各对应一个适配器 trait，由编排层在启动时显式
//! 构造具体实现并注入——没有全局单例，测试时可以用假实现替换。
//!
//! ## 模块划分
//!
//! - `research_service` - 候选文章检索能力（阶段 1）
//! - `validation_service` - 法务/许可审核能力（阶段 2）
//! - `question_service` - 出题与改题能力（阶段 3 / 5）
//! - `review_service` - 题目审查能力（阶段 4）
//! - `document_service` - 本地产物生成能力（文档 / 数据表 / 导出）
//!
//! 每个适配器调用返回显式的 `Result`，编排层按变体分支处理，
//! 单个条目的失败不会越过条目边界传播。

use crate::error::{AdapterError, SinkError};
use crate::models::article::{ArticleCandidate, ArticleRecord, ValidationOutcome};
use crate::models::question::{FeedbackRecord, GenerationResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

pub mod document_service;
pub mod question_service;
pub mod research_service;
pub mod review_service;
pub mod validation_service;

pub use document_service::DocumentService;
pub use question_service::QuestionService;
pub use research_service::ResearchService;
pub use review_service::ReviewService;
pub use validation_service::{LicenseKind, ValidationService};

/// 候选文章检索适配器（阶段 1）
#[async_trait]
pub trait DiscoveryAdapter: Send + Sync {
    /// 检索新的候选文章
    ///
    /// # 参数
    /// - `topic`: 检索主题（None 表示不限主题）
    /// - `count`: 期望的候选数量
    /// - `excluded_urls`: 账本中全部历史 URL，绝不允许重复提出
    /// - `last_id`: 历史最大编号的 ID，编号从它之后继续
    async fn discover(
        &self,
        topic: Option<&str>,
        count: usize,
        excluded_urls: &[String],
        last_id: Option<&str>,
    ) -> Result<Vec<ArticleCandidate>, AdapterError>;
}

/// 法务/许可审核适配器（阶段 2）
#[async_trait]
pub trait ValidationAdapter: Send + Sync {
    /// 审核候选文章，每条都给出批准/拒绝与机器可读理由
    async fn validate(
        &self,
        candidates: &[ArticleCandidate],
    ) -> Result<ValidationOutcome, AdapterError>;
}

/// 出题/改题适配器（阶段 3 / 5）
#[async_trait]
pub trait GenerationAdapter: Send + Sync {
    /// 为一篇文章生成题目
    ///
    /// 源文本缺失或不可用时返回 `AdapterError::SourceNotFound`，
    /// 调用方据此区分源错误与一般适配器错误。
    async fn generate(&self, article: &ArticleRecord)
        -> Result<GenerationResult, AdapterError>;

    /// 按审查反馈改进题目
    async fn improve(
        &self,
        questions: &GenerationResult,
        feedback: &FeedbackRecord,
        article: &ArticleRecord,
    ) -> Result<GenerationResult, AdapterError>;
}

/// 题目审查适配器（阶段 4）
#[async_trait]
pub trait ReviewAdapter: Send + Sync {
    /// 审查生成的题目，返回评分与逐题意见
    async fn review(
        &self,
        article: &ArticleRecord,
        questions: &GenerationResult,
    ) -> Result<FeedbackRecord, AdapterError>;
}

/// 产物上传出口
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// 上传一篇文章的全部产物
    async fn upload_article_package(
        &self,
        article: &ArticleRecord,
        artifacts: &BTreeMap<String, String>,
    ) -> Result<(), SinkError>;

    /// 上传批次级的账本导出文件
    async fn export_ledger(&self, export_path: &Path) -> Result<(), SinkError>;
}
