//! 法务/许可审核服务 - 业务能力层
//!
//! 只负责"许可审核"能力：把候选列表交给 LLM 做法务审计，
//! 解析逐条 APROBADO/RECHAZADO 结论，并用本地的许可分类表
//! 做一道保险：审计批准但许可类型明确禁止再利用的候选会被降级。

use crate::clients::LlmClient;
use crate::error::AdapterError;
use crate::models::article::{normalize_url, ArticleCandidate, AuditEntry, ValidationOutcome};
use crate::services::ValidationAdapter;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 许可类型分类
///
/// 审核结论的本地保险表；具体法务规则由审计适配器负责。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseKind {
    Cc0,
    CcBy,
    CcBySa,
    CcByNc,
    CcByNd,
    CcByNcSa,
    CcByNcNd,
    PublicDomain,
    Copyright,
    Unknown,
}

impl LicenseKind {
    /// 从自由文本分类许可类型
    pub fn classify(license: &str) -> Self {
        // Unicode 大写，保留重音字符
        let normalized = license.to_uppercase().replace(' ', "-").replace("--", "-");

        // 更长的变体要先匹配，否则 CC-BY-NC-SA 会被识别成 CC-BY
        if normalized.contains("CC-BY-NC-ND") {
            LicenseKind::CcByNcNd
        } else if normalized.contains("CC-BY-NC-SA") {
            LicenseKind::CcByNcSa
        } else if normalized.contains("CC-BY-NC") {
            LicenseKind::CcByNc
        } else if normalized.contains("CC-BY-ND") {
            LicenseKind::CcByNd
        } else if normalized.contains("CC-BY-SA") {
            LicenseKind::CcBySa
        } else if normalized.contains("CC-BY") {
            LicenseKind::CcBy
        } else if normalized.contains("CC0") {
            LicenseKind::Cc0
        } else if normalized.contains("DOMINIO-PÚBLICO")
            || normalized.contains("DOMINIO-PUBLICO")
            || normalized.contains("PUBLIC-DOMAIN")
        {
            LicenseKind::PublicDomain
        } else if normalized.contains("COPYRIGHT") || normalized.contains("TODOS-LOS-DERECHOS") {
            LicenseKind::Copyright
        } else {
            LicenseKind::Unknown
        }
    }

    /// 许可是否明确禁止本流水线的再利用
    ///
    /// ND 变体禁止衍生作品，版权保留禁止一切使用；
    /// 其余类型交给审计结论决定。
    pub fn forbids_reuse(self) -> bool {
        matches!(
            self,
            LicenseKind::CcByNd | LicenseKind::CcByNcNd | LicenseKind::Copyright
        )
    }

    /// 许可的标准名称
    pub fn name(self) -> &'static str {
        match self {
            LicenseKind::Cc0 => "CC0",
            LicenseKind::CcBy => "CC BY",
            LicenseKind::CcBySa => "CC BY-SA",
            LicenseKind::CcByNc => "CC BY-NC",
            LicenseKind::CcByNd => "CC BY-ND",
            LicenseKind::CcByNcSa => "CC BY-NC-SA",
            LicenseKind::CcByNcNd => "CC BY-NC-ND",
            LicenseKind::PublicDomain => "Dominio Público",
            LicenseKind::Copyright => "Copyright",
            LicenseKind::Unknown => "desconocida",
        }
    }
}

/// 法务/许可审核服务
pub struct ValidationService {
    llm: Arc<LlmClient>,
}

impl ValidationService {
    /// 创建新的审核服务
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// 构建审计提示词
    fn build_prompt(&self, candidates: &[ArticleCandidate]) -> String {
        let mut table = String::from("URL\tTitulo\tFuente\tLicencia_Declarada\n");
        for candidate in candidates {
            table.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                candidate.url, candidate.title, candidate.source, candidate.license
            ));
        }

        format!(
            r#"ROL
Eres auditor/a legal de derechos de autor para material PAES (estándar DEMRE).

Audita cada texto de la tabla y decide si su licencia permite reproducirlo
con fines educativos. Devuelve exclusivamente una tabla TSV con encabezado:
URL	Decision	Licencia	Motivo
donde Decision es APROBADO o RECHAZADO y Motivo es una razón concreta.

TABLA A VALIDAR:

{table}"#,
            table = table
        )
    }

    /// 解析审计响应中的逐条结论
    ///
    /// 没有出现在响应里的候选一律按拒绝处理（缺席不是默许）。
    pub fn parse_audit_response(
        &self,
        response: &str,
        candidates: &[ArticleCandidate],
    ) -> ValidationOutcome {
        // URL（规范化）→ 审计行
        let mut verdicts: BTreeMap<String, AuditEntry> = BTreeMap::new();

        for raw_line in response.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with("```") || !line.contains('\t') {
                continue;
            }

            let values: Vec<&str> = line.split('\t').map(|v| v.trim()).collect();
            if values.len() < 2 || !values[0].starts_with("http") {
                continue;
            }

            let decision = values[1].to_ascii_uppercase();
            let approved = decision.starts_with("APROBADO");
            if !approved && !decision.starts_with("RECHAZADO") {
                continue;
            }

            verdicts.insert(
                normalize_url(values[0]),
                AuditEntry {
                    url: values[0].to_string(),
                    approved,
                    license_type: values.get(2).unwrap_or(&"").to_string(),
                    reason: values.get(3).unwrap_or(&"").to_string(),
                },
            );
        }

        let mut outcome = ValidationOutcome::default();

        for candidate in candidates {
            let normalized = normalize_url(&candidate.url);
            let mut entry = match verdicts.remove(&normalized) {
                Some(entry) => entry,
                None => AuditEntry {
                    url: candidate.url.clone(),
                    approved: false,
                    license_type: candidate.license.clone(),
                    reason: "sin veredicto del auditor".to_string(),
                },
            };

            if entry.license_type.is_empty() {
                entry.license_type = candidate.license.clone();
            }

            // 本地保险：审计批准但许可类型明确禁止再利用时降级为拒绝
            let kind = LicenseKind::classify(&entry.license_type);
            if entry.approved && kind.forbids_reuse() {
                warn!(
                    "⚠️ 审计批准了 {} 但许可 {} 禁止再利用，降级为拒绝",
                    candidate.url,
                    kind.name()
                );
                entry.approved = false;
                entry.reason = format!("licencia {} no permite reutilización", kind.name());
            }

            if entry.approved {
                outcome.approved.push(candidate.clone());
            }
            outcome.audit.push(entry);
        }

        outcome
    }
}

#[async_trait]
impl ValidationAdapter for ValidationService {
    async fn validate(
        &self,
        candidates: &[ArticleCandidate],
    ) -> Result<ValidationOutcome, AdapterError> {
        if candidates.is_empty() {
            return Ok(ValidationOutcome::default());
        }

        info!("⚖️ 开始法务审计 {} 个候选...", candidates.len());

        let prompt = self.build_prompt(candidates);
        let response = self
            .llm
            .simple_chat(&prompt)
            .await
            .map_err(|e| AdapterError::api_call_failed("validation", e))?;

        let outcome = self.parse_audit_response(&response, candidates);

        info!(
            "✓ 审计完成: {}/{} 批准",
            outcome.approved.len(),
            candidates.len()
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn create_test_service() -> ValidationService {
        ValidationService::new(Arc::new(LlmClient::new(&Config::default())))
    }

    fn candidate(url: &str, license: &str) -> ArticleCandidate {
        ArticleCandidate {
            url: url.to_string(),
            title: "T".to_string(),
            author: String::new(),
            source: String::new(),
            year: String::new(),
            kind: String::new(),
            license: license.to_string(),
            source_path: String::new(),
            status: String::new(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_license_classification() {
        assert_eq!(LicenseKind::classify("CC BY"), LicenseKind::CcBy);
        assert_eq!(LicenseKind::classify("cc-by-sa 4.0"), LicenseKind::CcBySa);
        assert_eq!(LicenseKind::classify("CC BY-NC-ND"), LicenseKind::CcByNcNd);
        assert_eq!(LicenseKind::classify("CC0 1.0"), LicenseKind::Cc0);
        assert_eq!(LicenseKind::classify("dominio público"), LicenseKind::PublicDomain);
        assert_eq!(LicenseKind::classify("© Copyright 2025"), LicenseKind::Copyright);
        assert_eq!(LicenseKind::classify("algo raro"), LicenseKind::Unknown);
    }

    #[test]
    fn test_forbids_reuse() {
        assert!(LicenseKind::CcByNd.forbids_reuse());
        assert!(LicenseKind::CcByNcNd.forbids_reuse());
        assert!(LicenseKind::Copyright.forbids_reuse());
        assert!(!LicenseKind::CcBy.forbids_reuse());
        assert!(!LicenseKind::Unknown.forbids_reuse());
    }

    #[test]
    fn test_parse_audit_response() {
        let service = create_test_service();
        let candidates = vec![
            candidate("https://ejemplo.cl/a", "CC BY"),
            candidate("https://ejemplo.cl/b", "Copyright"),
            candidate("https://ejemplo.cl/c", "CC BY-SA"),
        ];
        let response = "URL\tDecision\tLicencia\tMotivo\n\
                        https://ejemplo.cl/a\tAPROBADO\tCC BY\tlicencia verificada\n\
                        https://ejemplo.cl/b\tRECHAZADO\tCopyright\ttodos los derechos reservados\n";

        let outcome = service.parse_audit_response(response, &candidates);

        assert_eq!(outcome.audit.len(), 3);
        assert_eq!(outcome.approved.len(), 1);
        assert_eq!(outcome.approved[0].url, "https://ejemplo.cl/a");
        // 响应中缺席的候选按拒绝处理
        let missing = outcome.audit.iter().find(|e| e.url.ends_with("/c")).unwrap();
        assert!(!missing.approved);
        assert_eq!(missing.reason, "sin veredicto del auditor");
    }

    #[test]
    fn test_audit_downgrades_forbidden_license() {
        let service = create_test_service();
        let candidates = vec![candidate("https://ejemplo.cl/nd", "CC BY-ND")];
        let response = "https://ejemplo.cl/nd\tAPROBADO\tCC BY-ND\tparece abierta\n";

        let outcome = service.parse_audit_response(response, &candidates);

        assert!(outcome.approved.is_empty());
        assert!(!outcome.audit[0].approved);
        assert!(outcome.audit[0].reason.contains("CC BY-ND"));
    }
}
