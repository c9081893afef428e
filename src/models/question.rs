//! 题目与审查反馈的类型定义

use serde::{Deserialize, Serialize};

/// 选择题的一个选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// 选项字母（A-E）
    pub letter: String,
    pub text: String,
}

/// 一道 PAES 阅读理解题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub number: u32,
    pub stem: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// 正确答案字母，CLAVES 段解析后填入
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub justification: String,
}

impl Question {
    /// 按字母查找选项文本
    pub fn choice_text(&self, letter: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| c.letter.eq_ignore_ascii_case(letter))
            .map(|c| c.text.as_str())
    }
}

/// 出题阶段的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub questions: Vec<Question>,
    /// 适配器的原始响应文本，调试与产物生成时使用
    pub raw_text: String,
}

impl GenerationResult {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// 审查阶段针对单道题的意见
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionNote {
    pub number: u32,
    pub comment: String,
}

/// 审查阶段的反馈
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// 0-10 的评分（nota）
    pub score: f32,
    #[serde(default)]
    pub verdict: String,
    #[serde(default)]
    pub notes: Vec<QuestionNote>,
    #[serde(default)]
    pub raw_text: String,
}
