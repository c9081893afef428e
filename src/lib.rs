//! # PAES Question Pipeline
//!
//! 一个从新闻文章批量生成 PAES 阅读理解题的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Clients）
//! - `clients/` - 持有外部连接，只暴露能力
//! - `LlmClient` - LLM API 调用能力
//! - `StorageClient` - 产物上传能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务一种能力
//! - `ResearchService` - 候选文章检索（阶段 1）
//! - `ValidationService` - 法务/许可审核（阶段 2）
//! - `QuestionService` - 出题与改题（阶段 3 / 5）
//! - `ReviewService` - 题目审查（阶段 4）
//! - `DocumentService` - 本地产物生成
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇文章"的完整处理流程
//! - `ArticleCtx` - 上下文封装（article_id + 批内序号）
//! - `ArticleFlow` - 流程编排（出题 → 审查 → 改进 → 产物 → 上传）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批次循环、入口点选择、账本导出
//!
//! ## 状态账本
//!
//! `ledger` 模块是去重与断点续跑的唯一事实来源：每篇文章一条记录，
//! 每次阶段转换立即落盘，历史 URL 永不重复入账，编号接着历史最大值
//! 继续。账本文件是人类可读的 TOML，操作员可以手动改状态强制重跑。

pub mod clients;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, EntryPoint};
pub use error::{AdapterError, AppError, AppResult};
pub use ledger::{Ledger, Statistics};
pub use models::{ArticleCandidate, ArticleRecord, LicenseStatus, PipelineStage};
pub use orchestrator::App;
pub use workflow::{ArticleCtx, ArticleFlow, ProcessResult};
