//! 候选文章检索服务 - 业务能力层
//!
//! 只负责"找候选文章"能力：把排除列表与起始编号写进提示词，
//! 调用 LLM，把返回的 TSV 解析成候选列表。不关心流程。

use crate::clients::LlmClient;
use crate::error::AdapterError;
use crate::models::article::ArticleCandidate;
use crate::services::DiscoveryAdapter;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 检索提示词里最多列出的排除 URL 数量
const MAX_EXCLUDE_URLS_IN_PROMPT: usize = 100;

/// 候选文章检索服务
pub struct ResearchService {
    llm: Arc<LlmClient>,
}

impl ResearchService {
    /// 创建新的检索服务
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// 由历史最大 ID 计算起始编号（C030 → C031）
    fn next_start_id(last_id: Option<&str>) -> String {
        if let Some(last) = last_id {
            let re = Regex::new(r"(\d+)$").unwrap();
            if let Some(caps) = re.captures(last) {
                if let Ok(num) = caps[1].parse::<u32>() {
                    return format!("C{:03}", num + 1);
                }
            }
        }
        "C001".to_string()
    }

    /// 构建检索提示词
    fn build_prompt(
        &self,
        topic: Option<&str>,
        count: usize,
        excluded_urls: &[String],
        last_id: Option<&str>,
    ) -> String {
        let start_id = Self::next_start_id(last_id);

        let mut urls_section = String::new();
        if !excluded_urls.is_empty() {
            urls_section.push_str("\nURLs ya procesados (NO repetir ninguno de estos):\n");
            let tail_start = excluded_urls.len().saturating_sub(MAX_EXCLUDE_URLS_IN_PROMPT);
            for url in &excluded_urls[tail_start..] {
                urls_section.push_str(&format!("- {}\n", url));
            }
            if excluded_urls.len() > MAX_EXCLUDE_URLS_IN_PROMPT {
                urls_section.push_str(&format!(
                    "... y {} URLs más (total: {} URLs a excluir).\n",
                    excluded_urls.len() - MAX_EXCLUDE_URLS_IN_PROMPT,
                    excluded_urls.len()
                ));
            }
        }

        format!(
            r#"ROL
Eres curador/a senior de lecturas para PAES Competencia Lectora (Chile).

ENTRADAS PARA ESTA EJECUCIÓN:
A) CANTIDAD: {count} textos candidatos
B) ID_INICIAL: {start_id}
C) TEMAS_PRIORITARIOS: {topic}
D) MODO_SALIDA: TSV
{urls_section}
SALIDA
Devuelve exclusivamente una tabla TSV (tabulador como separador), con
encabezado y una fila por candidato, columnas:
ID	Titulo	Autor	URL	Fuente	Ano	Tipo	Licencia	Ruta
Solo textos con licencia abierta verificable. No inventes URLs."#,
            count = count,
            start_id = start_id,
            topic = topic.unwrap_or("diversidad temática"),
            urls_section = urls_section,
        )
    }

    /// 把 LLM 返回的 TSV 解析成候选列表
    ///
    /// 容忍代码块围栏、空行与列数不齐的行；列数不足的行补空，
    /// 超出的忽略尾部。
    pub fn parse_candidate_tsv(&self, tsv_data: &str) -> Vec<ArticleCandidate> {
        let mut candidates = Vec::new();
        let mut header: Option<Vec<String>> = None;

        for raw_line in tsv_data.lines() {
            let line = raw_line.trim_end();
            if line.trim().is_empty() || line.trim_start().starts_with("```") {
                continue;
            }
            if !line.contains('\t') {
                continue;
            }

            let values: Vec<String> = line.split('\t').map(|v| v.trim().to_string()).collect();

            // 第一行含 URL 列名的视为表头
            if header.is_none() {
                if values.iter().any(|v| v.eq_ignore_ascii_case("url")) {
                    header = Some(values.iter().map(|v| v.to_ascii_lowercase()).collect());
                    continue;
                }
                // 没有表头时按固定列序处理
                header = Some(
                    ["id", "titulo", "autor", "url", "fuente", "ano", "tipo", "licencia", "ruta"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                );
            }

            let header_ref = header.as_ref().unwrap();
            let mut row = BTreeMap::new();
            for (i, name) in header_ref.iter().enumerate() {
                row.insert(name.clone(), values.get(i).cloned().unwrap_or_default());
            }

            let url = row.get("url").cloned().unwrap_or_default();
            if url.is_empty() || !url.starts_with("http") {
                debug!("忽略无效候选行: {}", line);
                continue;
            }

            let mut extra = BTreeMap::new();
            if let Some(id) = row.get("id") {
                if !id.is_empty() {
                    extra.insert("proposed_id".to_string(), id.clone());
                }
            }

            candidates.push(ArticleCandidate {
                url,
                title: row.get("titulo").cloned().unwrap_or_default(),
                author: row.get("autor").cloned().unwrap_or_default(),
                source: row.get("fuente").cloned().unwrap_or_default(),
                year: row.get("ano").cloned().unwrap_or_default(),
                kind: row.get("tipo").cloned().unwrap_or_default(),
                license: row.get("licencia").cloned().unwrap_or_default(),
                source_path: row.get("ruta").cloned().unwrap_or_default(),
                status: String::new(),
                extra,
            });
        }

        candidates
    }
}

#[async_trait]
impl DiscoveryAdapter for ResearchService {
    async fn discover(
        &self,
        topic: Option<&str>,
        count: usize,
        excluded_urls: &[String],
        last_id: Option<&str>,
    ) -> Result<Vec<ArticleCandidate>, AdapterError> {
        if excluded_urls.is_empty() {
            info!("🔍 开始检索 {} 个候选文章...", count);
        } else {
            info!(
                "🔍 开始检索 {} 个候选文章（排除 {} 个已处理 URL）...",
                count,
                excluded_urls.len()
            );
        }

        let prompt = self.build_prompt(topic, count, excluded_urls, last_id);

        let response = self
            .llm
            .simple_chat(&prompt)
            .await
            .map_err(|e| AdapterError::api_call_failed("discovery", e))?;

        let candidates = self.parse_candidate_tsv(&response);

        if candidates.is_empty() {
            warn!("⚠️ 检索响应中没有可解析的候选");
        } else {
            info!("✓ 检索完成，解析出 {} 个候选", candidates.len());
        }

        Ok(candidates)
    }
}
