//! 流水线集成测试
//!
//! 用假适配器驱动完整的批次流程，验证账本状态机、去重、
//! 序号延续与失败隔离语义。

use async_trait::async_trait;
use paes_question_pipeline::error::{AdapterError, SinkError};
use paes_question_pipeline::models::article::{
    normalize_url, ArticleCandidate, ArticleRecord, AuditEntry, ValidationOutcome,
};
use paes_question_pipeline::models::question::{
    Choice, FeedbackRecord, GenerationResult, Question, QuestionNote,
};
use paes_question_pipeline::services::{
    ArtifactSink, DiscoveryAdapter, GenerationAdapter, ReviewAdapter, ValidationAdapter,
};
use paes_question_pipeline::{
    App, Config, EntryPoint, LicenseStatus, PipelineStage, Statistics,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ========== 假适配器 ==========

#[derive(Clone)]
struct FakeDiscovery {
    candidates: Arc<Mutex<Vec<ArticleCandidate>>>,
    seen_excluded: Arc<Mutex<Vec<String>>>,
    seen_last_id: Arc<Mutex<Option<String>>>,
}

impl FakeDiscovery {
    fn new(candidates: Vec<ArticleCandidate>) -> Self {
        Self {
            candidates: Arc::new(Mutex::new(candidates)),
            seen_excluded: Arc::new(Mutex::new(Vec::new())),
            seen_last_id: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl DiscoveryAdapter for FakeDiscovery {
    async fn discover(
        &self,
        _topic: Option<&str>,
        _count: usize,
        excluded_urls: &[String],
        last_id: Option<&str>,
    ) -> Result<Vec<ArticleCandidate>, AdapterError> {
        *self.seen_excluded.lock().unwrap() = excluded_urls.to_vec();
        *self.seen_last_id.lock().unwrap() = last_id.map(String::from);

        // 真实检索器拿到排除列表后不会再提出同样的 URL
        let excluded: BTreeSet<String> =
            excluded_urls.iter().map(|u| normalize_url(u)).collect();
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !excluded.contains(&normalize_url(&c.url)))
            .cloned()
            .collect())
    }
}

#[derive(Clone)]
struct FakeValidation {
    approve_urls: BTreeSet<String>,
}

impl FakeValidation {
    fn approving(urls: &[&str]) -> Self {
        Self {
            approve_urls: urls.iter().map(|u| normalize_url(u)).collect(),
        }
    }
}

#[async_trait]
impl ValidationAdapter for FakeValidation {
    async fn validate(
        &self,
        candidates: &[ArticleCandidate],
    ) -> Result<ValidationOutcome, AdapterError> {
        let mut outcome = ValidationOutcome::default();
        for candidate in candidates {
            let approved = self.approve_urls.contains(&normalize_url(&candidate.url));
            outcome.audit.push(AuditEntry {
                url: candidate.url.clone(),
                approved,
                license_type: candidate.license.clone(),
                reason: if approved {
                    "DEMRE legal audit".to_string()
                } else {
                    "licencia no verificable".to_string()
                },
            });
            if approved {
                outcome.approved.push(candidate.clone());
            }
        }
        Ok(outcome)
    }
}

#[derive(Clone)]
struct FakeGeneration {
    /// generate 调用顺序（按 article_id 记录）
    calls: Arc<Mutex<Vec<String>>>,
    empty_for: BTreeSet<String>,
}

impl FakeGeneration {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            empty_for: BTreeSet::new(),
        }
    }

    fn returning_empty_for(ids: &[&str]) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            empty_for: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn sample_questions() -> Vec<Question> {
    (1..=2)
        .map(|n| Question {
            number: n,
            stem: format!("¿Pregunta {}?", n),
            choices: vec![
                Choice {
                    letter: "A".to_string(),
                    text: "Alternativa A".to_string(),
                },
                Choice {
                    letter: "B".to_string(),
                    text: "Alternativa B".to_string(),
                },
            ],
            answer: "A".to_string(),
            justification: "Microevidencia en el texto.".to_string(),
        })
        .collect()
}

#[async_trait]
impl GenerationAdapter for FakeGeneration {
    async fn generate(
        &self,
        article: &ArticleRecord,
    ) -> Result<GenerationResult, AdapterError> {
        self.calls.lock().unwrap().push(article.article_id.clone());
        if self.empty_for.contains(&article.article_id) {
            return Ok(GenerationResult {
                questions: Vec::new(),
                raw_text: "B) PREGUNTAS\n(nada)".to_string(),
            });
        }
        Ok(GenerationResult {
            questions: sample_questions(),
            raw_text: "respuesta original".to_string(),
        })
    }

    async fn improve(
        &self,
        questions: &GenerationResult,
        _feedback: &FeedbackRecord,
        _article: &ArticleRecord,
    ) -> Result<GenerationResult, AdapterError> {
        Ok(GenerationResult {
            questions: questions.questions.clone(),
            raw_text: "respuesta mejorada".to_string(),
        })
    }
}

#[derive(Clone)]
struct FakeReview {
    fail_for: BTreeSet<String>,
}

impl FakeReview {
    fn new() -> Self {
        Self {
            fail_for: BTreeSet::new(),
        }
    }

    fn failing_for(ids: &[&str]) -> Self {
        Self {
            fail_for: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ReviewAdapter for FakeReview {
    async fn review(
        &self,
        article: &ArticleRecord,
        _questions: &GenerationResult,
    ) -> Result<FeedbackRecord, AdapterError> {
        if self.fail_for.contains(&article.article_id) {
            return Err(AdapterError::api_call_failed(
                "review",
                anyhow::anyhow!("timeout simulado"),
            ));
        }
        Ok(FeedbackRecord {
            score: 8.5,
            verdict: "APROBADO".to_string(),
            notes: vec![QuestionNote {
                number: 1,
                comment: "Distractor débil".to_string(),
            }],
            raw_text: String::new(),
        })
    }
}

#[derive(Clone)]
struct FakeSink {
    fail_upload: bool,
    uploads: Arc<Mutex<Vec<String>>>,
    exports: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeSink {
    fn new(fail_upload: bool) -> Self {
        Self {
            fail_upload,
            uploads: Arc::new(Mutex::new(Vec::new())),
            exports: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ArtifactSink for FakeSink {
    async fn upload_article_package(
        &self,
        article: &ArticleRecord,
        artifacts: &BTreeMap<String, String>,
    ) -> Result<(), SinkError> {
        if self.fail_upload {
            return Err(SinkError::BadStatus {
                endpoint: "fake".to_string(),
                status: 503,
                message: Some("almacenamiento no disponible".to_string()),
            });
        }
        let mut uploads = self.uploads.lock().unwrap();
        for kind in artifacts.keys() {
            uploads.push(format!("{}/{}", article.article_id, kind));
        }
        Ok(())
    }

    async fn export_ledger(&self, export_path: &Path) -> Result<(), SinkError> {
        self.exports.lock().unwrap().push(export_path.to_path_buf());
        Ok(())
    }
}

// ========== 测试辅助 ==========

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.join("data").display().to_string();
    config.state_file = dir.join("data/pipeline_state.toml").display().to_string();
    config
}

fn candidate_with_source(dir: &Path, slug: &str, license: &str) -> ArticleCandidate {
    let source_path = dir.join(format!("{}.txt", slug));
    std::fs::write(&source_path, format!("Texto fuente del artículo {}.", slug)).unwrap();
    ArticleCandidate {
        url: format!("https://ejemplo.cl/{}", slug),
        title: format!("Artículo {}", slug),
        author: "M. Rojas".to_string(),
        source: "Diario Ejemplo".to_string(),
        year: "2025".to_string(),
        kind: "noticia".to_string(),
        license: license.to_string(),
        source_path: source_path.display().to_string(),
        status: String::new(),
        extra: BTreeMap::new(),
    }
}

fn build_app(
    config: Config,
    discovery: FakeDiscovery,
    validation: FakeValidation,
    generation: FakeGeneration,
    review: FakeReview,
    sink: FakeSink,
) -> App {
    App::with_adapters(
        config,
        Box::new(discovery),
        Box::new(validation),
        Arc::new(generation),
        Arc::new(review),
        Arc::new(sink),
    )
    .unwrap()
}

// ========== 场景测试 ==========

/// 空账本 → 检索 3 条 → 批准 2 拒绝 1 → 两条全部完成
#[tokio::test]
async fn test_full_pipeline_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![
        candidate_with_source(dir.path(), "sequia", "CC BY"),
        candidate_with_source(dir.path(), "litoral", "Copyright"),
        candidate_with_source(dir.path(), "glaciares", "CC BY-SA"),
    ];

    let sink = FakeSink::new(false);
    let mut app = build_app(
        test_config(dir.path()),
        FakeDiscovery::new(candidates),
        FakeValidation::approving(&["https://ejemplo.cl/sequia", "https://ejemplo.cl/glaciares"]),
        FakeGeneration::new(),
        FakeReview::new(),
        sink.clone(),
    );

    app.run().await.unwrap();

    assert_eq!(
        app.ledger().statistics(),
        Statistics {
            total: 3,
            validated: 2,
            rejected: 1,
            completed: 2,
            in_progress: 0,
            errors: 0,
        }
    );

    // 两条批准的记录完整走完并上传
    for id in ["C001", "C003"] {
        let record = app.ledger().get_article(id).unwrap();
        assert_eq!(record.pipeline_stage, PipelineStage::Completed);
        assert!(record.uploaded);
        assert_eq!(record.local_artifacts.len(), 4);
        assert!(record.processed_at.is_some());
    }

    // 拒绝的记录停在 discovered，保留拒绝理由
    let rejected = app.ledger().get_article("C002").unwrap();
    assert_eq!(rejected.license_status, LicenseStatus::Rejected);
    assert_eq!(rejected.pipeline_stage, PipelineStage::Discovered);
    assert_eq!(rejected.validation_reason, "licencia no verificable");

    // 每篇 4 个产物都上传了，账本导出也执行了
    assert_eq!(sink.uploads.lock().unwrap().len(), 8);
    assert_eq!(sink.exports.lock().unwrap().len(), 1);
}

/// 同一账本重跑检索，不得重提历史 URL，编号接着 C004
#[tokio::test]
async fn test_rediscovery_excludes_history_and_continues_ids() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let first_batch = vec![
        candidate_with_source(dir.path(), "sequia", "CC BY"),
        candidate_with_source(dir.path(), "litoral", "CC BY"),
        candidate_with_source(dir.path(), "glaciares", "CC BY"),
    ];

    // 第一轮
    let mut app = build_app(
        config.clone(),
        FakeDiscovery::new(first_batch.clone()),
        FakeValidation::approving(&[]),
        FakeGeneration::new(),
        FakeReview::new(),
        FakeSink::new(false),
    );
    app.run().await.unwrap();
    assert_eq!(app.ledger().get_last_id(), Some("C003".to_string()));
    drop(app);

    // 第二轮：检索器收到全部历史 URL 作为排除列表
    let mut second_batch = first_batch;
    second_batch.push(candidate_with_source(dir.path(), "humedales", "CC BY"));
    let discovery = FakeDiscovery::new(second_batch);

    let mut app = build_app(
        config,
        discovery.clone(),
        FakeValidation::approving(&["https://ejemplo.cl/humedales"]),
        FakeGeneration::new(),
        FakeReview::new(),
        FakeSink::new(false),
    );
    app.run().await.unwrap();

    let excluded = discovery.seen_excluded.lock().unwrap().clone();
    assert_eq!(excluded.len(), 3);
    assert!(excluded.contains(&"https://ejemplo.cl/sequia".to_string()));
    assert_eq!(
        discovery.seen_last_id.lock().unwrap().as_deref(),
        Some("C003")
    );

    // 新候选拿到 C004，历史记录没有重复
    assert_eq!(app.ledger().records().len(), 4);
    let nuevo = app.ledger().get_article("C004").unwrap();
    assert_eq!(nuevo.url, "https://ejemplo.cl/humedales");
    assert_eq!(nuevo.pipeline_stage, PipelineStage::Completed);
}

/// 失败隔离：一篇文章的审查失败不影响同批的其他文章，也不中止批次
#[tokio::test]
async fn test_review_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![
        candidate_with_source(dir.path(), "sequia", "CC BY"),
        candidate_with_source(dir.path(), "glaciares", "CC BY"),
    ];

    let mut app = build_app(
        test_config(dir.path()),
        FakeDiscovery::new(candidates),
        FakeValidation::approving(&["https://ejemplo.cl/sequia", "https://ejemplo.cl/glaciares"]),
        FakeGeneration::new(),
        FakeReview::failing_for(&["C001"]),
        FakeSink::new(false),
    );

    // run_batch 不得向外抛错
    let stats = app.run_batch().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);

    let failed = app.ledger().get_article("C001").unwrap();
    assert_eq!(failed.pipeline_stage, PipelineStage::Error);
    assert!(failed
        .error_reason
        .as_deref()
        .unwrap()
        .starts_with("Review failed"));
    // 出题成功的进度没有被错误抹掉
    assert_eq!(failed.license_status, LicenseStatus::Approved);

    let ok = app.ledger().get_article("C002").unwrap();
    assert_eq!(ok.pipeline_stage, PipelineStage::Completed);
    assert!(ok.uploaded);
}

/// 部分产物容忍：源文件缺失导致文档产物失败，数据表产物照常生成，
/// 条目仍然完成并上传
#[tokio::test]
async fn test_partial_artifact_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let mut candidate = candidate_with_source(dir.path(), "sequia", "CC BY");
    // 源文件消失：假出题器不读盘仍能出题，但合并文档无法生成
    std::fs::remove_file(&candidate.source_path).unwrap();
    candidate.source_path = dir.path().join("no-existe.txt").display().to_string();

    let sink = FakeSink::new(false);
    let mut app = build_app(
        test_config(dir.path()),
        FakeDiscovery::new(vec![candidate]),
        FakeValidation::approving(&["https://ejemplo.cl/sequia"]),
        FakeGeneration::new(),
        FakeReview::new(),
        sink.clone(),
    );

    app.run().await.unwrap();

    let record = app.ledger().get_article("C001").unwrap();
    assert_eq!(record.pipeline_stage, PipelineStage::Completed);
    assert!(record.uploaded);

    // 只有两个数据表产物成功
    let kinds: Vec<&str> = record.local_artifacts.keys().map(String::as_str).collect();
    assert_eq!(kinds, vec!["data_improved", "data_initial"]);
    assert_eq!(sink.uploads.lock().unwrap().len(), 2);
}

/// 上传失败降级为"完成但未上传"，产物保留在本地
#[tokio::test]
async fn test_sink_failure_completes_without_upload() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![candidate_with_source(dir.path(), "sequia", "CC BY")];

    let mut app = build_app(
        test_config(dir.path()),
        FakeDiscovery::new(candidates),
        FakeValidation::approving(&["https://ejemplo.cl/sequia"]),
        FakeGeneration::new(),
        FakeReview::new(),
        FakeSink::new(true),
    );

    let stats = app.run_batch().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.local_only, 1);

    let record = app.ledger().get_article("C001").unwrap();
    assert_eq!(record.pipeline_stage, PipelineStage::Completed);
    assert!(!record.uploaded);
    assert_eq!(record.local_artifacts.len(), 4);
}

/// 空的出题结果标记为 "no questions generated"
#[tokio::test]
async fn test_empty_generation_marks_error() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![candidate_with_source(dir.path(), "sequia", "CC BY")];

    let mut app = build_app(
        test_config(dir.path()),
        FakeDiscovery::new(candidates),
        FakeValidation::approving(&["https://ejemplo.cl/sequia"]),
        FakeGeneration::returning_empty_for(&["C001"]),
        FakeReview::new(),
        FakeSink::new(false),
    );

    app.run().await.unwrap();

    let record = app.ledger().get_article("C001").unwrap();
    assert_eq!(record.pipeline_stage, PipelineStage::Error);
    assert_eq!(record.error_reason.as_deref(), Some("no questions generated"));
}

/// 反向顺序旋钮：批内文章从后往前分发
#[tokio::test]
async fn test_reverse_order_processing() {
    let dir = tempfile::tempdir().unwrap();
    let candidates = vec![
        candidate_with_source(dir.path(), "sequia", "CC BY"),
        candidate_with_source(dir.path(), "litoral", "CC BY"),
        candidate_with_source(dir.path(), "glaciares", "CC BY"),
    ];

    let mut config = test_config(dir.path());
    config.reverse_order = true;

    let generation = FakeGeneration::new();
    let mut app = build_app(
        config,
        FakeDiscovery::new(candidates),
        FakeValidation::approving(&[
            "https://ejemplo.cl/sequia",
            "https://ejemplo.cl/litoral",
            "https://ejemplo.cl/glaciares",
        ]),
        generation.clone(),
        FakeReview::new(),
        FakeSink::new(false),
    );

    app.run().await.unwrap();

    let calls = generation.calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["C003", "C002", "C001"]);
}

/// generation 入口：预审批列表直接进入出题，跳过检索与审核
#[tokio::test]
async fn test_generation_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();

    let approved = candidate_with_source(dir.path(), "sequia", "CC BY");
    let pending = candidate_with_source(dir.path(), "litoral", "CC BY");
    let list = format!(
        r#"
[[candidates]]
url = "{}"
title = "{}"
license = "CC BY"
source_path = "{}"
status = "APROBADO"

[[candidates]]
url = "{}"
title = "{}"
license = "CC BY"
source_path = "{}"
status = "RECHAZADO"
"#,
        approved.url,
        approved.title,
        approved.source_path,
        pending.url,
        pending.title,
        pending.source_path,
    );
    let list_path = data_dir.join("aprobados_20260807_120000.toml");
    std::fs::write(&list_path, list).unwrap();

    let mut config = test_config(dir.path());
    config.start_from = EntryPoint::Generation;

    let mut app = build_app(
        config,
        FakeDiscovery::new(Vec::new()),
        // 审核适配器不应被调用；给一个全拒绝的假实现确保如此
        FakeValidation::approving(&[]),
        FakeGeneration::new(),
        FakeReview::new(),
        FakeSink::new(false),
    );

    app.run().await.unwrap();

    // 只有预审批条目入账并完成
    assert_eq!(app.ledger().records().len(), 1);
    let record = app.ledger().get_article("C001").unwrap();
    assert_eq!(record.license_status, LicenseStatus::Approved);
    assert_eq!(record.validation_reason, "pre-approved from input file");
    assert_eq!(record.pipeline_stage, PipelineStage::Completed);
}

/// validation 入口：从候选文件加载并走正常审核
#[tokio::test]
async fn test_validation_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();

    let candidate = candidate_with_source(dir.path(), "sequia", "CC BY");
    let list = format!(
        r#"
[[candidates]]
url = "{}"
title = "{}"
license = "CC BY"
source_path = "{}"
"#,
        candidate.url, candidate.title, candidate.source_path,
    );
    std::fs::write(data_dir.join("candidatos_20260807_120000.toml"), list).unwrap();

    let mut config = test_config(dir.path());
    config.start_from = EntryPoint::Validation;

    let mut app = build_app(
        config,
        FakeDiscovery::new(Vec::new()),
        FakeValidation::approving(&["https://ejemplo.cl/sequia"]),
        FakeGeneration::new(),
        FakeReview::new(),
        FakeSink::new(false),
    );

    app.run().await.unwrap();

    let record = app.ledger().get_article("C001").unwrap();
    assert_eq!(record.pipeline_stage, PipelineStage::Completed);
    assert_eq!(record.validation_reason, "DEMRE legal audit");
}
