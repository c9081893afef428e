//! 文章处理上下文
//!
//! 封装"我正在处理本批第几篇文章"这一信息

use std::fmt::Display;

/// 文章处理上下文
///
/// 包含处理单篇文章时日志所需的全部上下文信息
#[derive(Debug, Clone)]
pub struct ArticleCtx {
    /// 文章ID
    pub article_id: String,

    /// 文章在本批中的序号（从1开始，仅用于日志显示）
    pub article_index: usize,

    /// 本批文章总数
    pub total: usize,

    /// 文章标题
    pub title: String,
}

impl ArticleCtx {
    /// 创建新的文章上下文
    pub fn new(article_id: String, article_index: usize, total: usize, title: String) -> Self {
        Self {
            article_id,
            article_index,
            total,
            title,
        }
    }
}

impl Display for ArticleCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[文章 {} {}/{}]",
            self.article_id, self.article_index, self.total
        )
    }
}
