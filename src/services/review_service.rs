//! 题目审查服务 - 业务能力层
//!
//! 只负责"审查"能力：把题目集交给 LLM 按 DEMRE 标准审查，
//! 解析 0-10 的整体评分（nota）、总体判定与逐题意见。

use crate::clients::LlmClient;
use crate::error::AdapterError;
use crate::models::article::ArticleRecord;
use crate::models::question::{FeedbackRecord, GenerationResult, QuestionNote};
use crate::services::{question_service::format_questions, ReviewAdapter};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

/// 题目审查服务
pub struct ReviewService {
    llm: Arc<LlmClient>,
}

impl ReviewService {
    /// 创建新的审查服务
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// 构建审查提示词
    fn build_prompt(&self, article: &ArticleRecord, questions: &GenerationResult) -> String {
        format!(
            r#"ROL
Eres revisor/a senior de ítems PAES Competencia Lectora (estándar DEMRE).

Revisa el siguiente set de preguntas sobre el texto "{title}" ({source}).
Evalúa claridad del enunciado, plausibilidad de distractores, unicidad de
la clave y alineación con la habilidad declarada.

FORMATO DE SALIDA:
NOTA GLOBAL: x.x/10
VEREDICTO: APROBADO | APROBADO_CONDICION | RECHAZADO
DIAGNOSTICO:
1. observación sobre la pregunta 1
2. observación sobre la pregunta 2
...

SET A REVISAR:

{questions}"#,
            title = article.title,
            source = article.source,
            questions = format_questions(questions),
        )
    }
}

/// 从审查响应中提取 nota（形如 "Nota global: 8.5/10"，容忍逗号小数）
pub fn extract_nota(feedback_text: &str) -> Option<f32> {
    let re = Regex::new(r"(?i)nota\s*(?:global)?\s*:?\s*(\d+(?:[,.]\d+)?)\s*/\s*10").unwrap();
    re.captures(feedback_text)
        .and_then(|caps| caps[1].replace(',', ".").parse().ok())
}

/// 解析完整的审查反馈
pub fn parse_feedback(feedback_text: &str) -> FeedbackRecord {
    let score = match extract_nota(feedback_text) {
        Some(nota) => nota,
        None => {
            warn!("⚠️ 审查响应中没有 nota，按 0.0 记录");
            0.0
        }
    };

    let verdict_re = Regex::new(r"(?im)^\s*VEREDICTO\s*:?\s*([A-ZÁÉÍÓÚ_]+)").unwrap();
    let verdict = verdict_re
        .captures(feedback_text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();

    // DIAGNOSTICO 段之后的编号行是逐题意见
    let mut notes = Vec::new();
    let diagnostico_re = Regex::new(r"(?im)^\s*DIAGN[OÓ]STICO\s*:?\s*$").unwrap();
    let note_re = Regex::new(r"^(\d+)[.)]\s*(.+)$").unwrap();

    let section = match diagnostico_re.find(feedback_text) {
        Some(m) => &feedback_text[m.end()..],
        None => feedback_text,
    };

    for raw_line in section.lines() {
        let line = raw_line.trim();
        if let Some(caps) = note_re.captures(line) {
            if let Ok(number) = caps[1].parse::<u32>() {
                notes.push(QuestionNote {
                    number,
                    comment: caps[2].trim().to_string(),
                });
            }
        }
    }

    FeedbackRecord {
        score,
        verdict,
        notes,
        raw_text: feedback_text.to_string(),
    }
}

#[async_trait]
impl ReviewAdapter for ReviewService {
    async fn review(
        &self,
        article: &ArticleRecord,
        questions: &GenerationResult,
    ) -> Result<FeedbackRecord, AdapterError> {
        info!(
            "[{}] 🔎 开始审查 {} 道题目...",
            article.article_id,
            questions.questions.len()
        );

        let prompt = self.build_prompt(article, questions);
        let response = self
            .llm
            .simple_chat(&prompt)
            .await
            .map_err(|e| AdapterError::api_call_failed("review", e))?;

        let feedback = parse_feedback(&response);

        info!(
            "[{}] ✓ 审查完成: nota {:.1}/10, {} 条逐题意见",
            article.article_id,
            feedback.score,
            feedback.notes.len()
        );

        Ok(feedback)
    }
}
