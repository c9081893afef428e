//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次循环和流程调度，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (批次循环 + 入口点 + 账本导出)
//!     ↓
//! workflow::ArticleFlow (处理单篇文章的阶段流程)
//!     ↓
//! services (能力层：research / validation / question / review / document)
//!     ↓
//! clients (基础设施：LlmClient / StorageClient)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批次，ArticleFlow 管单篇
//! 2. **显式注入**：所有适配器在启动时构造并注入，没有全局单例
//! 3. **单写者**：账本只由本层（经 ArticleFlow）修改
//! 4. **失败隔离**：条目错误不出条目，批次错误不出批次

pub mod batch_processor;

// 重新导出主要类型
pub use batch_processor::{App, BatchStats};
