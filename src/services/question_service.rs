//! 出题服务 - 业务能力层
//!
//! 只负责"出题"和"改题"两种能力，不关心流程：
//! - 读取本地源文本，构建提示词，调用 LLM 生成 PAES 题目
//! - 按审查反馈改进已有题目
//! - 解析 PAES 响应格式（PREGUNTAS / CLAVES 两段）

use crate::clients::LlmClient;
use crate::error::AdapterError;
use crate::models::article::ArticleRecord;
use crate::models::question::{Choice, FeedbackRecord, GenerationResult, Question};
use crate::services::GenerationAdapter;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 提示词中源文本的最大长度（字符）
const MAX_SOURCE_CHARS: usize = 20_000;

/// 出题服务
pub struct QuestionService {
    llm: Arc<LlmClient>,
}

impl QuestionService {
    /// 创建新的出题服务
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// 读取文章的本地源文本
    ///
    /// 文件不存在或不可读都算源错误，调用方据此跳过后续阶段。
    fn read_source_text(&self, article: &ArticleRecord) -> Result<String, AdapterError> {
        let path = Path::new(&article.source_path);
        if article.source_path.is_empty() || !path.exists() {
            return Err(AdapterError::source_not_found(&article.source_path));
        }

        let mut text = std::fs::read_to_string(path)
            .map_err(|_| AdapterError::source_not_found(&article.source_path))?;

        if text.chars().count() > MAX_SOURCE_CHARS {
            text = text.chars().take(MAX_SOURCE_CHARS).collect();
            warn!(
                "源文本过长，截断到 {} 字符: {}",
                MAX_SOURCE_CHARS, article.source_path
            );
        }

        Ok(text)
    }

    /// 文章元数据段（两种提示词共用）
    fn build_metadata_section(&self, article: &ArticleRecord) -> String {
        format!(
            "METADATOS DEL TEXTO:\n\
             - ID: {}\n\
             - Título: {}\n\
             - Autor: {}\n\
             - Fuente: {} ({})\n\
             - Tipo: {}\n",
            article.article_id, article.title, article.author, article.source, article.year,
            article.kind
        )
    }

    /// 构建出题提示词
    fn build_generation_prompt(&self, article: &ArticleRecord, source_text: &str) -> String {
        format!(
            r#"ROL
Eres elaborador/a senior de ítems PAES Competencia Lectora (estándar DEMRE).

{metadata}
Redacta exactamente 10 preguntas de selección múltiple sobre el texto
(distribución 2 localizar - 5 interpretar - 3 evaluar), cada una con
cuatro alternativas A-D y una única clave.

FORMATO DE SALIDA:
B) PREGUNTAS
1. [Habilidad-tarea]
¿Pregunta?
A) Alternativa A
B) Alternativa B
C) Alternativa C
D) Alternativa D

C) CLAVES
1) X. Justificación: texto. Microevidencia: "cita".

TEXTO:

{text}"#,
            metadata = self.build_metadata_section(article),
            text = source_text,
        )
    }

    /// 构建改题提示词
    fn build_improvement_prompt(
        &self,
        questions: &GenerationResult,
        feedback: &FeedbackRecord,
        article: &ArticleRecord,
    ) -> String {
        let mut notes = String::new();
        for note in &feedback.notes {
            notes.push_str(&format!("- Pregunta {}: {}\n", note.number, note.comment));
        }
        if notes.is_empty() {
            notes.push_str("(sin observaciones por pregunta)\n");
        }

        format!(
            r#"ROL
Eres elaborador/a senior de ítems PAES Competencia Lectora (estándar DEMRE).

{metadata}
El revisor calificó el set con nota {score:.1}/10. Aplica las observaciones
y devuelve el set completo corregido, mismo formato B) PREGUNTAS / C) CLAVES.

OBSERVACIONES DEL REVISOR:
{notes}
SET ACTUAL:

{current}"#,
            metadata = self.build_metadata_section(article),
            score = feedback.score,
            notes = notes,
            current = format_questions(questions),
        )
    }
}

/// 把题目集格式化成提示词里可引用的文本
pub fn format_questions(result: &GenerationResult) -> String {
    let mut out = String::new();
    for question in &result.questions {
        out.push_str(&format!("{}. {}\n", question.number, question.stem));
        for choice in &question.choices {
            out.push_str(&format!("{}) {}\n", choice.letter, choice.text));
        }
        if !question.answer.is_empty() {
            out.push_str(&format!("Respuesta correcta: {}\n", question.answer));
        }
        if !question.justification.is_empty() {
            out.push_str(&format!("Justificación: {}\n", question.justification));
        }
        out.push('\n');
    }
    out
}

/// 解析 PAES 响应格式
///
/// 期望的结构：
/// ```text
/// B) PREGUNTAS
/// 1. [Habilidad-tarea]
/// ¿Pregunta?
/// A) Alternativa A
/// ...
/// C) CLAVES
/// 1) B. Justificación: texto.
/// ```
/// CLAVES 段可选，用来补齐 PREGUNTAS 段缺失的答案与论证。
pub fn parse_paes_response(response_text: &str) -> Vec<Question> {
    let preguntas_re = Regex::new(r"(?im)^\s*(?:B\)\s*)?PREGUNTAS\b").unwrap();
    let claves_re = Regex::new(r"(?im)^\s*(?:C\)\s*)?CLAVES\b").unwrap();

    let preguntas_start = match preguntas_re.find(response_text) {
        Some(m) => m.end(),
        None => {
            warn!("⚠️ 响应中没有 PREGUNTAS 段");
            return Vec::new();
        }
    };

    let (preguntas_section, claves_section) =
        match claves_re.find_at(response_text, preguntas_start) {
            Some(m) => (
                &response_text[preguntas_start..m.start()],
                &response_text[m.end()..],
            ),
            None => (&response_text[preguntas_start..], ""),
        };

    let mut questions = parse_preguntas_section(preguntas_section);
    if !claves_section.is_empty() {
        parse_claves_section(claves_section, &mut questions);
    }

    debug!("解析出 {} 道题目", questions.len());
    questions
}

fn parse_preguntas_section(section_text: &str) -> Vec<Question> {
    let question_re = Regex::new(r"^(\d+)\.\s*(?:\[([^\]]+)\]\s*)?(.*)$").unwrap();
    let choice_re = Regex::new(r"^([A-E])\)\s*(.+)$").unwrap();
    let answer_re = Regex::new(r"(?i)^(?:Respuesta\s+correcta|Correcta)\s*:?\s*([A-E])").unwrap();
    let justification_re = Regex::new(r"(?i)^Justificaci[oó]n\s*:?\s*(.+)$").unwrap();

    let mut questions: Vec<Question> = Vec::new();
    let mut current: Option<Question> = None;

    for raw_line in section_text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = question_re.captures(line) {
            if let Some(q) = current.take() {
                questions.push(q);
            }
            current = Some(Question {
                number: caps[1].parse().unwrap_or(0),
                stem: caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                choices: Vec::new(),
                answer: String::new(),
                justification: String::new(),
            });
            continue;
        }

        let question = match current.as_mut() {
            Some(q) => q,
            None => continue,
        };

        if let Some(caps) = choice_re.captures(line) {
            question.choices.push(Choice {
                letter: caps[1].to_string(),
                text: caps[2].trim().to_string(),
            });
            continue;
        }

        if let Some(caps) = answer_re.captures(line) {
            question.answer = caps[1].to_ascii_uppercase();
            continue;
        }

        if let Some(caps) = justification_re.captures(line) {
            question.justification = caps[1].trim().to_string();
            continue;
        }

        // 选项出现之前的普通行都属于题干
        if question.choices.is_empty() {
            if question.stem.is_empty() {
                question.stem = line.to_string();
            } else {
                question.stem.push(' ');
                question.stem.push_str(line);
            }
        }
    }

    if let Some(q) = current.take() {
        questions.push(q);
    }

    questions
}

fn parse_claves_section(section_text: &str, questions: &mut [Question]) {
    // 形如 "1) B. Justificación: texto."
    let clave_re = Regex::new(r"(?m)^\s*(\d+)\)\s*\*{0,2}([A-E])\*{0,2}\.?\s*(.*)$").unwrap();

    for caps in clave_re.captures_iter(section_text) {
        let number: u32 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let answer = caps[2].to_ascii_uppercase();
        let justification = caps[3]
            .trim()
            .trim_start_matches("Justificación:")
            .trim_start_matches("Justificacion:")
            .trim()
            .to_string();

        if let Some(question) = questions.iter_mut().find(|q| q.number == number) {
            if question.answer.is_empty() {
                question.answer = answer;
            }
            if justification.len() > question.justification.len() {
                question.justification = justification;
            }
        }
    }
}

#[async_trait]
impl GenerationAdapter for QuestionService {
    async fn generate(
        &self,
        article: &ArticleRecord,
    ) -> Result<GenerationResult, AdapterError> {
        info!("[{}] 📝 开始出题...", article.article_id);

        let source_text = self.read_source_text(article)?;
        let prompt = self.build_generation_prompt(article, &source_text);

        let response = self
            .llm
            .simple_chat(&prompt)
            .await
            .map_err(|e| AdapterError::api_call_failed("generation", e))?;

        let questions = parse_paes_response(&response);
        info!(
            "[{}] ✓ 出题完成，解析出 {} 道题目",
            article.article_id,
            questions.len()
        );

        // 空结果不在这里报错：调用方按"空结果"语义处理
        Ok(GenerationResult {
            questions,
            raw_text: response,
        })
    }

    async fn improve(
        &self,
        questions: &GenerationResult,
        feedback: &FeedbackRecord,
        article: &ArticleRecord,
    ) -> Result<GenerationResult, AdapterError> {
        info!(
            "[{}] 🔧 按审查反馈改进题目 (nota {:.1})...",
            article.article_id, feedback.score
        );

        let prompt = self.build_improvement_prompt(questions, feedback, article);

        let response = self
            .llm
            .simple_chat(&prompt)
            .await
            .map_err(|e| AdapterError::api_call_failed("improvement", e))?;

        let improved = parse_paes_response(&response);
        if improved.is_empty() {
            // 改进响应完全不可解析时报错，让条目进入 error 态，
            // 而不是悄悄用空集覆盖已有题目
            return Err(AdapterError::response_parse_failed(
                "improvement",
                "respuesta sin preguntas reconocibles",
            ));
        }

        info!(
            "[{}] ✓ 改进完成，{} 道题目",
            article.article_id,
            improved.len()
        );

        Ok(GenerationResult {
            questions: improved,
            raw_text: response,
        })
    }
}
