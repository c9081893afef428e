//! 产物生成服务 - 业务能力层
//!
//! 只负责"写本地产物文件"能力：
//! - 合并文档（源文本 + 题目，Markdown）
//! - 题目数据表（CSV）
//! - 账本导出表（已批准记录的 CSV）
//!
//! 每个产物独立生成，失败由调用方按种类单独处理。

use crate::error::ArtifactError;
use crate::models::article::ArticleRecord;
use crate::models::question::GenerationResult;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 产物生成服务
#[derive(Clone)]
pub struct DocumentService {
    output_dir: PathBuf,
}

impl DocumentService {
    /// 创建新的产物生成服务
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn ensure_output_dir(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| ArtifactError::write_failed(self.output_dir.display().to_string(), e))
    }

    /// 生成合并文档（源文本 + 题目，Markdown）
    ///
    /// # 参数
    /// - `article`: 文章记录（源文本从 `source_path` 读取）
    /// - `result`: 要并入的题目集
    /// - `file_name`: 输出文件名
    ///
    /// # 返回
    /// 返回写出的本地路径
    pub fn generate_merged_document(
        &self,
        article: &ArticleRecord,
        result: &GenerationResult,
        file_name: &str,
    ) -> Result<String, ArtifactError> {
        let source_path = Path::new(&article.source_path);
        if article.source_path.is_empty() || !source_path.exists() {
            return Err(ArtifactError::MissingInput {
                kind: "document".to_string(),
                detail: format!("fuente no disponible: {}", article.source_path),
            });
        }

        let source_text = fs::read_to_string(source_path)
            .map_err(|e| ArtifactError::write_failed(article.source_path.clone(), e))?;

        let mut content = String::new();
        content.push_str(&format!("# {}\n\n", article.title));
        content.push_str(&format!(
            "*{} — {} ({}). Licencia: {}.*\n\n",
            article.author, article.source, article.year, article.license_type
        ));
        content.push_str("---\n\n");
        content.push_str(source_text.trim());
        content.push_str("\n\n---\n\n## Preguntas\n\n");

        for question in &result.questions {
            content.push_str(&format!("**{}.** {}\n\n", question.number, question.stem));
            for choice in &question.choices {
                content.push_str(&format!("{}) {}\n", choice.letter, choice.text));
            }
            content.push('\n');
        }

        content.push_str("## Claves\n\n");
        for question in &result.questions {
            if question.answer.is_empty() {
                continue;
            }
            content.push_str(&format!(
                "{}) **{}**. {}\n",
                question.number, question.answer, question.justification
            ));
        }

        self.write_artifact(file_name, &content)
    }

    /// 生成题目数据表（CSV）
    pub fn generate_questions_data(
        &self,
        result: &GenerationResult,
        file_name: &str,
    ) -> Result<String, ArtifactError> {
        let mut content =
            String::from("Numero,Pregunta,A,B,C,D,Clave,Justificacion\n");

        for question in &result.questions {
            let row = [
                question.number.to_string(),
                question.stem.clone(),
                question.choice_text("A").unwrap_or_default().to_string(),
                question.choice_text("B").unwrap_or_default().to_string(),
                question.choice_text("C").unwrap_or_default().to_string(),
                question.choice_text("D").unwrap_or_default().to_string(),
                question.answer.clone(),
                question.justification.clone(),
            ];
            content.push_str(&join_csv_row(&row));
            content.push('\n');
        }

        self.write_artifact(file_name, &content)
    }

    /// 生成账本导出表（已批准记录的 CSV）
    pub fn generate_ledger_export(
        &self,
        records: &[ArticleRecord],
        file_name: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let mut content =
            String::from("ID,Titulo,Autor,URL,Fuente,Ano,Licencia,Etapa,Subido\n");

        for record in records {
            let row = [
                record.article_id.clone(),
                record.title.clone(),
                record.author.clone(),
                record.url.clone(),
                record.source.clone(),
                record.year.clone(),
                record.license_type.clone(),
                record.pipeline_stage.name().to_string(),
                record.uploaded.to_string(),
            ];
            content.push_str(&join_csv_row(&row));
            content.push('\n');
        }

        let path = self.write_artifact(file_name, &content)?;
        Ok(PathBuf::from(path))
    }

    fn write_artifact(&self, file_name: &str, content: &str) -> Result<String, ArtifactError> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join(file_name);
        fs::write(&path, content)
            .map_err(|e| ArtifactError::write_failed(path.display().to_string(), e))?;
        debug!("产物已写出: {}", path.display());
        Ok(path.display().to_string())
    }
}

/// 把一行字段拼成 CSV（逗号、引号、换行的字段加引号转义）
fn join_csv_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// 默认产物文件名（初始 / 改进两个版本各有文档与数据表）

/// 初始版合并文档文件名
pub fn document_initial_name(article_id: &str) -> String {
    format!("{}-preguntas_texto_inicial.md", article_id)
}

/// 改进版合并文档文件名
pub fn document_improved_name(article_id: &str) -> String {
    format!("{}-preguntas_texto.md", article_id)
}

/// 初始版数据表文件名
pub fn data_initial_name(article_id: &str) -> String {
    format!("{}-preguntas_datos_inicial.csv", article_id)
}

/// 改进版数据表文件名
pub fn data_improved_name(article_id: &str) -> String {
    format!("{}-preguntas_datos.csv", article_id)
}
