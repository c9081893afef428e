pub mod article;
pub mod loaders;
pub mod question;

pub use article::{
    normalize_url, ArticleCandidate, ArticleRecord, AuditEntry, LicenseStatus, PipelineStage,
    ValidationOutcome,
};
pub use loaders::{find_latest_file, load_candidates};
pub use question::{Choice, FeedbackRecord, GenerationResult, Question, QuestionNote};
