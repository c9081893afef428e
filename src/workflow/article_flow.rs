//! 文章处理流程 - 流程层
//!
//! 核心职责：定义"一篇文章"从出题到完成的完整处理流程
//!
//! 流程顺序：
//! 1. 出题（源缺失或空结果 → error，终止本条）
//! 2. 审查（失败 → error，终止本条）
//! 3. 改进（失败 → error，终止本条）
//! 4. 产物生成（按种类独立，单个失败只跳过该种类）
//! 5. 上传（失败 → 仍算完成，uploaded=false）
//!
//! 每次阶段转换都立即写入账本，中断后可以从最后到达的阶段续跑。

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::AdapterError;
use crate::ledger::Ledger;
use crate::models::article::{ArticleRecord, PipelineStage};
use crate::models::question::GenerationResult;
use crate::services::document_service::{
    data_improved_name, data_initial_name, document_improved_name, document_initial_name,
};
use crate::services::{ArtifactSink, DocumentService, GenerationAdapter, ReviewAdapter};
use crate::workflow::article_ctx::ArticleCtx;

/// 文章处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// 处理完成且已上传
    Completed,
    /// 处理完成但上传失败，产物保留在本地
    CompletedLocalOnly,
    /// 处理失败（原因已写入账本）
    Failed,
}

/// 文章处理流程
///
/// - 编排完整的单篇处理流程
/// - 决定何时出题、何时审查、何时放弃
/// - 不持有账本（由调用方传入，保持单写者）
/// - 只依赖业务能力（services）
pub struct ArticleFlow {
    generation: Arc<dyn GenerationAdapter>,
    review: Arc<dyn ReviewAdapter>,
    documents: DocumentService,
    sink: Arc<dyn ArtifactSink>,
}

impl ArticleFlow {
    /// 创建新的文章处理流程
    pub fn new(
        generation: Arc<dyn GenerationAdapter>,
        review: Arc<dyn ReviewAdapter>,
        documents: DocumentService,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            generation,
            review,
            documents,
            sink,
        }
    }

    pub async fn run(
        &self,
        ledger: &mut Ledger,
        article: &ArticleRecord,
        ctx: &ArticleCtx,
    ) -> Result<ProcessResult> {
        let article_id = &article.article_id;

        // ========== 阶段 3: 出题 ==========
        let generated = match self.generation.generate(article).await {
            Ok(result) => result,
            Err(e @ AdapterError::SourceNotFound { .. }) => {
                // 源错误：终止本条，不尝试后续阶段
                error!("{} ❌ {}", ctx, e);
                ledger.mark_error(article_id, &e.to_string())?;
                return Ok(ProcessResult::Failed);
            }
            Err(e) => {
                error!("{} ❌ 出题失败: {}", ctx, e);
                ledger.mark_error(article_id, &e.to_string())?;
                return Ok(ProcessResult::Failed);
            }
        };

        if generated.is_empty() {
            error!("{} ❌ 出题结果为空", ctx);
            ledger.mark_error(article_id, "no questions generated")?;
            return Ok(ProcessResult::Failed);
        }

        ledger.mark_stage(article_id, PipelineStage::QuestionsGenerated)?;

        // ========== 阶段 4: 审查 ==========
        // 没有审查结论就不做改进，也不生成产物
        let feedback = match self.review.review(article, &generated).await {
            Ok(feedback) => feedback,
            Err(e) => {
                error!("{} ❌ 审查失败: {}", ctx, e);
                ledger.mark_error(article_id, &format!("Review failed: {}", e))?;
                return Ok(ProcessResult::Failed);
            }
        };

        ledger.mark_stage(article_id, PipelineStage::Reviewed)?;

        // ========== 阶段 5: 改进 ==========
        let improved = match self.generation.improve(&generated, &feedback, article).await {
            Ok(improved) => improved,
            Err(e) => {
                error!("{} ❌ 改进失败: {}", ctx, e);
                ledger.mark_error(article_id, &format!("Improvement failed: {}", e))?;
                return Ok(ProcessResult::Failed);
            }
        };

        ledger.mark_stage(article_id, PipelineStage::QuestionsImproved)?;

        // ========== 阶段 6: 产物生成 ==========
        // 每个种类独立尝试，失败只跳过该种类；成功立即登记入账
        let artifacts = self
            .generate_artifacts(ledger, article, ctx, &generated, &improved)?;

        if artifacts.is_empty() {
            warn!("{} ⚠️ 没有任何产物生成成功", ctx);
        }

        // ========== 阶段 6b: 上传 ==========
        match self.sink.upload_article_package(article, &artifacts).await {
            Ok(()) => {
                ledger.mark_completed(article_id, true)?;
                info!("{} ✅ 处理完成并已上传", ctx);
                Ok(ProcessResult::Completed)
            }
            Err(e) => {
                // 上传失败不致命：条目仍算完成，产物留在本地
                warn!("{} ⚠️ 上传失败，产物保留在本地: {}", ctx, e);
                ledger.mark_completed(article_id, false)?;
                Ok(ProcessResult::CompletedLocalOnly)
            }
        }
    }

    /// 生成全部产物种类（初始/改进两版的文档与数据表）
    fn generate_artifacts(
        &self,
        ledger: &mut Ledger,
        article: &ArticleRecord,
        ctx: &ArticleCtx,
        initial: &GenerationResult,
        improved: &GenerationResult,
    ) -> Result<BTreeMap<String, String>> {
        let article_id = &article.article_id;
        let mut artifacts = BTreeMap::new();

        let attempts = [
            (
                "document_initial",
                self.documents.generate_merged_document(
                    article,
                    initial,
                    &document_initial_name(article_id),
                ),
            ),
            (
                "document_improved",
                self.documents.generate_merged_document(
                    article,
                    improved,
                    &document_improved_name(article_id),
                ),
            ),
            (
                "data_initial",
                self.documents
                    .generate_questions_data(initial, &data_initial_name(article_id)),
            ),
            (
                "data_improved",
                self.documents
                    .generate_questions_data(improved, &data_improved_name(article_id)),
            ),
        ];

        for (kind, attempt) in attempts {
            match attempt {
                Ok(path) => {
                    ledger.record_artifact(article_id, kind, &path)?;
                    artifacts.insert(kind.to_string(), path);
                }
                Err(e) => {
                    error!("{} ⚠️ 产物 {} 生成失败，跳过: {}", ctx, kind, e);
                }
            }
        }

        Ok(artifacts)
    }
}
