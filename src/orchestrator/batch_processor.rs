//! 批量流水线处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批次循环和协作方的生命周期。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：构造 LLM 客户端、各阶段适配器、存储客户端，
//!    打开账本——所有协作方在启动时显式构造并注入，没有全局单例
//! 2. **入口点选择**：discovery（完整流水线）/ validation（加载候选
//!    列表）/ generation（加载预审批列表）三选一
//! 3. **批次循环**：顺序执行 N 个批次，批次之间互相独立，
//!    任何一批整体失败只记日志，不中止整个运行
//! 4. **逐篇分发**：把批准的文章逐篇交给 ArticleFlow，
//!    兜底捕获任何逃逸的错误
//! 5. **账本导出**：每批结束后导出全部批准记录并上传
//! 6. **全局统计**：运行结束输出账本汇总
//!
//! ## 设计特点
//!
//! - **严格串行**：没有任务并发，逐篇逐阶段阻塞执行；
//!   外部 API 的速率完全靠这种天然串行来尊重
//! - **失败隔离**：条目错误不出条目，批次错误不出批次
//! - **反向分片**：可选反转批内顺序，让两个实例从两端往中间处理；
//!   没有条目级锁，这是尽力而为的启发式

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{LlmClient, StorageClient};
use crate::config::{Config, EntryPoint};
use crate::ledger::{Ledger, Statistics};
use crate::models::article::{normalize_url, ArticleCandidate, ArticleRecord, LicenseStatus};
use crate::models::loaders;
use crate::services::{
    ArtifactSink, DiscoveryAdapter, DocumentService, GenerationAdapter, QuestionService,
    ResearchService, ReviewAdapter, ReviewService, ValidationAdapter, ValidationService,
};
use crate::utils::truncate_text;
use crate::workflow::{ArticleCtx, ArticleFlow, ProcessResult};

/// 账本导出文件名
const LEDGER_EXPORT_NAME: &str = "validated_articles.csv";

/// 应用主结构
pub struct App {
    config: Config,
    ledger: Ledger,
    discovery: Box<dyn DiscoveryAdapter>,
    validation: Box<dyn ValidationAdapter>,
    flow: ArticleFlow,
    documents: DocumentService,
    sink: Arc<dyn ArtifactSink>,
}

/// 单批处理结果
#[derive(Debug, Default)]
pub struct BatchStats {
    pub completed: usize,
    pub local_only: usize,
    pub failed: usize,
}

impl App {
    /// 初始化应用（构造全部具体协作方）
    pub fn initialize(config: Config) -> Result<Self> {
        let llm = Arc::new(LlmClient::new(&config));
        let sink: Arc<dyn ArtifactSink> = Arc::new(StorageClient::new(&config));

        Self::with_adapters(
            config,
            Box::new(ResearchService::new(llm.clone())),
            Box::new(ValidationService::new(llm.clone())),
            Arc::new(QuestionService::new(llm.clone())),
            Arc::new(ReviewService::new(llm)),
            sink,
        )
    }

    /// 用注入的适配器构造应用
    ///
    /// 测试时传入假实现即可驱动完整流程。
    pub fn with_adapters(
        config: Config,
        discovery: Box<dyn DiscoveryAdapter>,
        validation: Box<dyn ValidationAdapter>,
        generation: Arc<dyn GenerationAdapter>,
        review: Arc<dyn ReviewAdapter>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Result<Self> {
        let ledger = Ledger::open(&config.state_file)
            .with_context(|| format!("无法打开账本: {}", config.state_file))?;
        let documents = DocumentService::new(&config.data_dir);
        let flow = ArticleFlow::new(generation, review, documents.clone(), sink.clone());

        Ok(Self {
            config,
            ledger,
            discovery,
            validation,
            flow,
            documents,
            sink,
        })
    }

    /// 账本（报表与测试用）
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// 运行应用主逻辑
    pub async fn run(&mut self) -> Result<()> {
        log_startup(&self.config);

        for batch_num in 1..=self.config.num_batches {
            log_batch_start(batch_num, self.config.num_batches);

            // 批次之间互相独立：整批失败只记日志，继续下一批
            match self.run_batch().await {
                Ok(stats) => log_batch_complete(batch_num, &stats),
                Err(e) => {
                    error!("❌ 第 {} 批失败: {:#}", batch_num, e);
                    continue;
                }
            }
        }

        print_final_stats(&self.ledger.statistics());
        Ok(())
    }

    /// 执行一个完整批次
    pub async fn run_batch(&mut self) -> Result<BatchStats> {
        // 入口点决定如何得到本批的批准文章
        let approved = match self.config.start_from {
            EntryPoint::Discovery => self.discover_and_validate().await?,
            EntryPoint::Validation => self.load_and_validate().await?,
            EntryPoint::Generation => self.load_pre_approved().await?,
        };

        if approved.is_empty() {
            warn!("⚠️ 本批没有批准的文章");
            return Ok(BatchStats::default());
        }

        let mut articles = approved;
        if self.config.reverse_order {
            articles.reverse();
            info!("🔀 反向处理本批 {} 篇文章", articles.len());
        }

        let total = articles.len();
        let mut stats = BatchStats::default();

        for (idx, article) in articles.iter().enumerate() {
            let ctx = ArticleCtx::new(
                article.article_id.clone(),
                idx + 1,
                total,
                article.title.clone(),
            );
            log_article_start(&ctx);

            match self.flow.run(&mut self.ledger, article, &ctx).await {
                Ok(ProcessResult::Completed) => stats.completed += 1,
                Ok(ProcessResult::CompletedLocalOnly) => {
                    stats.completed += 1;
                    stats.local_only += 1;
                }
                Ok(ProcessResult::Failed) => stats.failed += 1,
                Err(e) => {
                    // 兜底安全网：流程内部已经按阶段处理错误，
                    // 逃逸到这里的也不允许中止整批
                    error!("{} ❌ 处理过程中发生未捕获错误: {:#}", ctx, e);
                    if let Err(mark_err) =
                        self.ledger.mark_error(&article.article_id, &e.to_string())
                    {
                        error!("{} 无法写入错误状态: {}", ctx, mark_err);
                    }
                    stats.failed += 1;
                }
            }
        }

        // 批次级账本导出：失败只记日志，绝不向上抛
        self.export_ledger().await;

        Ok(stats)
    }

    /// 完整流水线入口：检索 → 入账 → 法务审核
    async fn discover_and_validate(&mut self) -> Result<Vec<ArticleRecord>> {
        let excluded = self.ledger.get_excluded_urls();
        if !excluded.is_empty() {
            info!("排除 {} 个已处理 URL", excluded.len());
        }
        let last_id = self.ledger.get_last_id();

        let candidates = self
            .discovery
            .discover(
                self.config.topic.as_deref(),
                self.config.candidates_per_batch,
                &excluded,
                last_id.as_deref(),
            )
            .await?;

        if candidates.is_empty() {
            anyhow::bail!("检索没有返回任何候选");
        }

        let ids = self.ledger.add_articles(&candidates)?;
        self.validate_candidates(&candidates, &ids).await
    }

    /// validation 入口：加载候选列表文件 → 入账 → 法务审核
    async fn load_and_validate(&mut self) -> Result<Vec<ArticleRecord>> {
        let path = self
            .resolve_input_file("candidatos_")
            .await
            .context("没有可用的候选列表文件")?;
        info!("📁 使用候选文件: {}", path.display());

        let candidates = loaders::load_candidates(&path).await?;
        if candidates.is_empty() {
            anyhow::bail!("候选文件为空: {}", path.display());
        }
        info!("✓ 加载了 {} 个候选", candidates.len());

        let ids = self.ledger.add_articles(&candidates)?;
        self.validate_candidates(&candidates, &ids).await
    }

    /// generation 入口：加载预审批列表，跳过检索与审核
    ///
    /// 每条加载的记录直接在账本里标记为批准。
    async fn load_pre_approved(&mut self) -> Result<Vec<ArticleRecord>> {
        let path = self
            .resolve_input_file("aprobados_")
            .await
            .context("没有可用的预审批列表文件")?;
        info!("📁 使用预审批文件: {}", path.display());

        let loaded = loaders::load_candidates(&path).await?;
        let candidates: Vec<ArticleCandidate> = loaded
            .into_iter()
            .filter(|c| {
                if !c.is_pre_approved() {
                    warn!("⚠️ 跳过未批准的条目: {}", c.url);
                }
                c.is_pre_approved()
            })
            .collect();

        if candidates.is_empty() {
            anyhow::bail!("预审批文件中没有已批准的条目: {}", path.display());
        }
        info!("✓ 加载了 {} 个已批准的条目", candidates.len());

        let ids = self.ledger.add_articles(&candidates)?;

        let mut approved = Vec::with_capacity(candidates.len());
        for (candidate, id) in candidates.iter().zip(&ids) {
            self.ledger.update_license(
                id,
                LicenseStatus::Approved,
                &candidate.license,
                "pre-approved from input file",
            )?;
            if let Some(record) = self.ledger.get_article(id) {
                approved.push(record.clone());
            }
        }

        Ok(approved)
    }

    /// 法务审核并把结论写入账本，返回本批批准的记录
    async fn validate_candidates(
        &mut self,
        candidates: &[ArticleCandidate],
        ids: &[String],
    ) -> Result<Vec<ArticleRecord>> {
        let outcome = self.validation.validate(candidates).await?;

        let id_by_url: BTreeMap<String, String> = candidates
            .iter()
            .zip(ids)
            .map(|(c, id)| (normalize_url(&c.url), id.clone()))
            .collect();

        let mut approved_count = 0usize;
        for entry in &outcome.audit {
            if self.config.verbose_logging {
                info!(
                    "  {} -> {} ({})",
                    entry.url,
                    if entry.approved { "APROBADO" } else { "RECHAZADO" },
                    entry.reason
                );
            }
            let id = match id_by_url.get(&normalize_url(&entry.url)) {
                Some(id) => id,
                None => {
                    warn!("⚠️ 审计结论对应的 URL 不在本批中: {}", entry.url);
                    continue;
                }
            };

            let status = if entry.approved {
                approved_count += 1;
                LicenseStatus::Approved
            } else {
                LicenseStatus::Rejected
            };
            self.ledger
                .update_license(id, status, &entry.license_type, &entry.reason)?;
        }

        log_audit_summary(outcome.audit.len(), approved_count);

        let approved = outcome
            .approved
            .iter()
            .filter_map(|c| id_by_url.get(&normalize_url(&c.url)))
            .filter_map(|id| self.ledger.get_article(id).cloned())
            .collect();

        Ok(approved)
    }

    /// 批次级账本导出：生成已批准记录的 CSV 并上传
    async fn export_ledger(&self) {
        let approved = self.ledger.approved_records();
        if approved.is_empty() {
            return;
        }

        info!("📤 正在导出账本 ({} 条批准记录)...", approved.len());
        match self
            .documents
            .generate_ledger_export(&approved, LEDGER_EXPORT_NAME)
        {
            Ok(path) => {
                if let Err(e) = self.sink.export_ledger(&path).await {
                    warn!("⚠️ 账本导出上传失败: {}", e);
                }
            }
            Err(e) => warn!("⚠️ 账本导出生成失败: {}", e),
        }
    }

    /// 解析输入文件：显式配置优先，否则取数据目录中最新的匹配文件
    async fn resolve_input_file(&self, prefix: &str) -> Result<std::path::PathBuf> {
        if let Some(path) = &self.config.candidates_file {
            return Ok(std::path::PathBuf::from(path));
        }
        loaders::find_latest_file(&self.config.data_dir, prefix, "toml")
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "数据目录 {} 中没有 {}*.toml 文件",
                    self.config.data_dir,
                    prefix
                )
            })
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - PAES 出题流水线");
    info!("📋 入口点: {:?}", config.start_from);
    info!("📦 批次数: {}", config.num_batches);
    if let Some(topic) = &config.topic {
        info!("🏷️ 主题: {}", topic);
    }
    if config.reverse_order {
        info!("🔀 顺序: 反向（手动分片模式）");
    }
    info!("{}", "=".repeat(60));
}

fn log_batch_start(batch_num: usize, total_batches: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!(
        "🕒 开始时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
}

fn log_batch_complete(batch_num: usize, stats: &BatchStats) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 批完成: 完成 {} (其中 {} 篇未上传), 失败 {}",
        batch_num, stats.completed, stats.local_only, stats.failed
    );
    info!("{}", "─".repeat(60));
}

fn log_article_start(ctx: &ArticleCtx) {
    info!("\n{} {}", ctx, "─".repeat(30));
    info!("{} 开始处理: {}", ctx, truncate_text(&ctx.title, 60));
}

fn log_audit_summary(total: usize, approved: usize) {
    info!("⚖️ 审计汇总: 总计 {}, 批准 {}, 拒绝 {}", total, approved, total - approved);
}

fn print_final_stats(stats: &Statistics) {
    info!("\n{}", "=".repeat(60));
    info!("📊 流水线统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("文章总数:   {}", stats.total);
    info!("  已批准:   {}", stats.validated);
    info!("  已拒绝:   {}", stats.rejected);
    info!("  已完成:   {}", stats.completed);
    info!("  处理中:   {}", stats.in_progress);
    info!("  出错:     {}", stats.errors);
    info!("{}", "=".repeat(60));
}
