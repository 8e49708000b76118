//! Integration tests for the portal flows.
//!
//! PDFs are generated in memory with lopdf, the model is a scripted
//! in-process [`ChatModel`], and every session lives in a temp directory, so
//! these run offline and in parallel.

use async_trait::async_trait;
use edgequake_docportal::pipeline::ingest::DocumentHandler;
use edgequake_docportal::prompts::PromptMessage;
use edgequake_docportal::{
    analyze_upload_with, compare_uploads_with, extract_pdf, inspect_pdf, ChatModel, ErrorKind,
    ModelLoader, PageCount, PipelineProgressCallback, PortalConfig, PortalError, ProgressCallback,
    SessionStore, Stage, UploadedFile,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Build a PDF with one page per entry in `pages`, each showing its text.
fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 14.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Replies from a queue and records every request.
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request_text(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn label(&self) -> &str {
        "scripted/test"
    }

    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String, PortalError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl PipelineProgressCallback for RecordingProgress {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("start:{stage:?}"));
    }

    fn on_output_repair(&self, _error: &str) {
        self.events.lock().unwrap().push("repair".into());
    }
}

fn config_in(dir: &std::path::Path) -> PortalConfig {
    PortalConfig::builder().data_root(dir).build().unwrap()
}

const METADATA_JSON: &str = r#"{
    "Summary": ["Quarterly revenue grew."],
    "Title": "Quarterly Report",
    "Author": ["Finance Team"],
    "DateCreated": "2024-04-01",
    "LastModifiedDate": "2024-04-02",
    "Publisher": "ACME Corp",
    "Language": "English",
    "PageCount": 2,
    "SentimentTone": "positive"
}"#;

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_pdf_yields_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf");
    std::fs::write(&path, pdf_bytes(&["Revenue grew", "Costs fell"])).unwrap();

    let doc = extract_pdf(&path).await.unwrap();
    assert_eq!(doc.page_count(), 2);
    assert!(!doc.is_blank());
    assert!(doc.pages[0].contains("Revenue"), "page 1: {:?}", doc.pages[0]);
    assert!(doc.with_page_markers().contains(" --- Page 2 --- "));
}

#[tokio::test]
async fn inspect_needs_no_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.pdf");
    std::fs::write(&path, pdf_bytes(&["one", "two", "three"])).unwrap();

    let info = inspect_pdf(&path).await.unwrap();
    assert_eq!(info.page_count, 3);
    assert_eq!(info.pdf_version, "1.5");
    assert!(!info.is_encrypted);
}

#[tokio::test]
async fn document_handler_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let handler = DocumentHandler::new(&store, None).unwrap();
    let path = handler
        .save_data(&UploadedFile::new("notes.pdf", pdf_bytes(&["alpha", "beta"])))
        .await
        .unwrap();

    let reopened = DocumentHandler::new(&store, Some(handler.session_id().as_str())).unwrap();
    let text = reopened.read_data(&path).await.unwrap();
    assert!(text.contains("alpha") && text.contains("beta"), "got {text:?}");
}

// ── Analysis ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn analysis_stores_upload_and_returns_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let model = ScriptedModel::new(&[METADATA_JSON]);
    let upload = UploadedFile::new("report.pdf", pdf_bytes(&["Revenue grew", "Costs fell"]));

    let output = analyze_upload_with(model.clone(), &upload, &config).await.unwrap();

    assert_eq!(output.metadata.title, "Quarterly Report");
    assert_eq!(output.metadata.page_count, PageCount::Count(2));
    assert_eq!(output.page_count, 2);
    assert!(output.document_path.starts_with(config.data.analyzer_root()));
    assert!(output.document_path.is_file());
    assert_eq!(model.request_count(), 1);

    let prompt = model.request_text(0);
    assert!(prompt.contains("Revenue"));
    assert!(prompt.contains("SentimentTone"), "schema must be embedded");
}

#[tokio::test]
async fn malformed_reply_is_repaired_once() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingProgress::default());
    let config = PortalConfig::builder()
        .data_root(dir.path())
        .progress_callback(recorder.clone() as ProgressCallback)
        .build()
        .unwrap();
    let model = ScriptedModel::new(&["Here you go: {\"Title\": ", METADATA_JSON]);
    let upload = UploadedFile::new("report.pdf", pdf_bytes(&["text"]));

    let output = analyze_upload_with(model.clone(), &upload, &config).await.unwrap();

    assert_eq!(output.metadata.publisher, "ACME Corp");
    assert_eq!(model.request_count(), 2);
    assert!(model.request_text(1).contains("Here you go: {\"Title\": "));
    let events = recorder.events.lock().unwrap();
    assert!(events.contains(&"repair".to_string()));
    assert!(events.contains(&"start:Repair".to_string()));
}

#[tokio::test]
async fn unrepairable_reply_surfaces_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let model = ScriptedModel::new(&["not json", "still not json", METADATA_JSON]);
    let upload = UploadedFile::new("report.pdf", pdf_bytes(&["text"]));

    let err = analyze_upload_with(model.clone(), &upload, &config)
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::OutputParse { .. }), "got {err}");
    assert_eq!(model.request_count(), 2);
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let model = ScriptedModel::new(&[METADATA_JSON]);
    let upload = UploadedFile::new("report.docx", pdf_bytes(&["text"]));

    let err = analyze_upload_with(model.clone(), &upload, &config)
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::InvalidFileType { .. }));
    assert_eq!(model.request_count(), 0);
    assert!(SessionStore::new(config.data.analyzer_root()).list().unwrap().is_empty());
}

// ── Comparison ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn comparison_combines_documents_and_cleans_old_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = PortalConfig::builder()
        .data_root(dir.path())
        .keep_latest(2)
        .build()
        .unwrap();

    let compare_root = config.data.compare_root();
    for name in [
        "session_20200101_000000_aaaaaaaa",
        "session_20200102_000000_bbbbbbbb",
        "session_20200103_000000_cccccccc",
    ] {
        std::fs::create_dir_all(compare_root.join(name)).unwrap();
    }

    let model = ScriptedModel::new(&[
        r#"```json
[{"Page": 1, "Changes": "NO CHANGE"}, {"Page": "2", "Changes": "Price changed from 10 to 12"}]
```"#,
    ]);
    let reference = UploadedFile::new("reference.pdf", pdf_bytes(&["Intro", "Price 10"]));
    let actual = UploadedFile::new("actual.pdf", pdf_bytes(&["Intro", "Price 12"]));

    let output = compare_uploads_with(model.clone(), &reference, &actual, &config)
        .await
        .unwrap();

    assert_eq!(output.report.rows().len(), 2);
    assert_eq!(output.report.rows()[0].page, "1");
    assert_eq!(output.report.changed_pages().count(), 1);
    assert!(output.reference_path.is_file());
    assert!(output.actual_path.is_file());

    let prompt = model.request_text(0);
    let actual_at = prompt.find("Document: actual.pdf").unwrap();
    let reference_at = prompt.find("Document: reference.pdf").unwrap();
    assert!(actual_at < reference_at, "documents are combined in name order");
    assert!(prompt.contains("Document: reference.pdf (reference)"));
    assert!(prompt.contains("Document: actual.pdf (actual)"));
    assert!(prompt.contains(" --- Page 2 --- "));

    assert_eq!(output.removed_sessions.len(), 2);
    let remaining: Vec<String> = SessionStore::new(&compare_root)
        .list()
        .unwrap()
        .into_iter()
        .map(|s| s.id.to_string())
        .collect();
    assert_eq!(
        remaining,
        vec![
            output.session_id.to_string(),
            "session_20200103_000000_cccccccc".to_string()
        ]
    );
}

#[tokio::test]
async fn comparison_keeps_its_own_session_when_outranked() {
    let dir = tempfile::tempdir().unwrap();
    let config = PortalConfig::builder()
        .data_root(dir.path())
        .keep_latest(1)
        .build()
        .unwrap();
    let compare_root = config.data.compare_root();
    let newer = "session_20991231_235959_ffffffff";
    std::fs::create_dir_all(compare_root.join(newer)).unwrap();

    let model = ScriptedModel::new(&[r#"[{"Page": "1", "Changes": "NO CHANGE"}]"#]);
    let output = compare_uploads_with(
        model,
        &UploadedFile::new("a.pdf", pdf_bytes(&["same"])),
        &UploadedFile::new("b.pdf", pdf_bytes(&["same"])),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(output.removed_sessions.len(), 1);
    assert_eq!(output.removed_sessions[0].as_str(), newer);
    assert!(output.reference_path.is_file());
    assert!(output.actual_path.is_file());
}

#[tokio::test]
async fn comparison_with_keep_zero_keeps_current_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = PortalConfig::builder()
        .data_root(dir.path())
        .keep_latest(0)
        .build()
        .unwrap();
    std::fs::create_dir_all(config.data.compare_root().join("session_20200101_000000_aaaaaaaa"))
        .unwrap();

    let model = ScriptedModel::new(&[r#"[{"Page": "1", "Changes": "NO CHANGE"}]"#]);
    let output = compare_uploads_with(
        model,
        &UploadedFile::new("a.pdf", pdf_bytes(&["same"])),
        &UploadedFile::new("b.pdf", pdf_bytes(&["same"])),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(output.removed_sessions.len(), 1);
    assert!(output.reference_path.is_file());
    let remaining = SessionStore::new(config.data.compare_root()).list().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, output.session_id);
}

#[tokio::test]
async fn comparison_rejects_same_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let model = ScriptedModel::new(&[]);
    let doc = UploadedFile::new("same.pdf", pdf_bytes(&["x"]));

    let err = compare_uploads_with(model.clone(), &doc, &doc, &config)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::DuplicateUpload { .. }));
    assert_eq!(model.request_count(), 0);
}

// ── Sessions and keys ────────────────────────────────────────────────────────

#[test]
fn sessions_are_unique_and_cleanup_keeps_latest() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let created: Vec<_> = (0..6).map(|_| store.create().unwrap()).collect();

    let mut ids: Vec<_> = created.iter().map(|s| s.id.to_string()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);

    store.clean_old_sessions(3).unwrap();
    assert_eq!(store.list().unwrap().len(), 3);
}

#[test]
fn missing_keys_fail_before_any_network_call() {
    let env: HashMap<&str, &str> = HashMap::from([("LLM_PROVIDER", "groq")]);
    let err = ModelLoader::with_lookup(PortalConfig::default(), |k| {
        env.get(k).map(|v| v.to_string())
    })
    .unwrap_err();
    match err.kind() {
        ErrorKind::MissingApiKeys { keys } => assert_eq!(keys, &vec!["GROQ_API_KEY".to_string()]),
        other => panic!("unexpected {other:?}"),
    }
}
