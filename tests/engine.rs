//! Broker against the real tiktoken worker thread.

use tokenmeter::engine::{
    spawn_worker, split_into_line_chunks, Encoder, EncodingName, EngineError, EngineOptions,
    TiktokenEncoder, TokenEngine, WorkerOptions, DEFAULT_REQUEST_TIMEOUT,
};
use tokenmeter::types::{HeavyRange, Severity};

fn encoder() -> TiktokenEncoder {
    TiktokenEncoder::new(EncodingName::Cl100kBase).unwrap()
}

fn engine_with(worker: WorkerOptions) -> TokenEngine {
    TokenEngine::start(
        EncodingName::Cl100kBase,
        EngineOptions {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            worker,
        },
    )
    .unwrap()
}

fn sample_document(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("Line {} of the sample document, with some words.\n", i))
        .collect()
}

#[tokio::test]
async fn test_empty_reconcile_is_zero() {
    let engine = engine_with(WorkerOptions::default());
    let result = engine.calculate_tokens("", true).await.unwrap();
    assert_eq!(result.token_count, 0);
    assert!(result.is_reconciled);
    assert!(!result.is_estimate);
    assert_eq!(result.heavy_ranges, Some(vec![]));
}

#[tokio::test]
async fn test_ensure_ready_on_real_worker() {
    let engine = engine_with(WorkerOptions::default());
    engine.ensure_ready().await.unwrap();
    assert!(!engine.is_disposed());
}

#[tokio::test]
async fn test_small_document_is_encoded_whole() {
    let engine = engine_with(WorkerOptions::default());
    let text = "The quick brown fox jumps over the lazy dog.\n".repeat(40);
    assert!(text.chars().count() < 50_000);
    let expected = encoder().count_tokens(&text).unwrap();

    let approximate = engine.calculate_tokens(text.as_str(), false).await.unwrap();
    assert_eq!(approximate.token_count, expected);
    assert!(approximate.is_reconciled);
    assert_eq!(approximate.heavy_ranges, None);

    let reconciled = engine.calculate_tokens(text.as_str(), true).await.unwrap();
    assert_eq!(reconciled.token_count, expected);
    assert!(reconciled.is_reconciled);
}

#[tokio::test]
async fn test_two_thousand_chars_takes_exact_path() {
    let engine = engine_with(WorkerOptions::default());
    let text = "abcd".repeat(500);
    assert_eq!(TokenEngine::estimate_fast(&text), 500);

    let result = engine.calculate_tokens(text.as_str(), false).await.unwrap();
    assert!(result.is_reconciled);
    assert_eq!(result.token_count, encoder().count_tokens(&text).unwrap());
}

#[tokio::test]
async fn test_repeated_requests_agree() {
    let engine = engine_with(WorkerOptions::default());
    let text = sample_document(30);
    let first = engine.calculate_tokens(text.as_str(), false).await.unwrap();
    let second = engine.calculate_tokens(text.as_str(), false).await.unwrap();
    assert_eq!(first.token_count, second.token_count);
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test]
async fn test_large_document_uses_chunk_sums() {
    let options = WorkerOptions {
        full_encode_threshold: 100,
        chunk_lines: 4,
        ..WorkerOptions::default()
    };
    let engine = engine_with(options);
    let text = sample_document(25);
    assert!(text.chars().count() >= 100);

    let encoder = encoder();
    let chunk_sum: usize = split_into_line_chunks(&text, 4)
        .into_iter()
        .map(|chunk| encoder.count_tokens(chunk).unwrap())
        .sum();

    let approximate = engine.calculate_tokens(text.as_str(), false).await.unwrap();
    assert!(!approximate.is_reconciled);
    assert_eq!(approximate.token_count, chunk_sum);

    // Lines start with a letter, so no BPE merge spans a chunk boundary
    let whole = encoder.count_tokens(&text).unwrap();
    assert_eq!(approximate.token_count, whole);

    let edited = text.replacen("Line 3 ", "Line three ", 1);
    let after_edit = engine.calculate_tokens(edited.as_str(), false).await.unwrap();
    assert_eq!(after_edit.token_count, encoder.count_tokens(&edited).unwrap());

    let reconciled = engine.calculate_tokens(text.as_str(), true).await.unwrap();
    assert!(reconciled.is_reconciled);
    assert_eq!(reconciled.token_count, whole);
}

#[tokio::test]
async fn test_reconcile_reports_heavy_lines() {
    let engine = engine_with(WorkerOptions::default());
    let encoder = encoder();

    let heavy_line = "alpha beta gamma delta ".repeat(40);
    let heavy_tokens = encoder.count_tokens(&heavy_line).unwrap();
    assert!((150..400).contains(&heavy_tokens), "{}", heavy_tokens);

    let critical_line = "alpha beta gamma delta ".repeat(120);
    let critical_tokens = encoder.count_tokens(&critical_line).unwrap();
    assert!(critical_tokens >= 400, "{}", critical_tokens);

    let text = format!("short\n\n{}\nshort again\n{}\n", heavy_line, critical_line);
    let result = engine.calculate_tokens(text, true).await.unwrap();
    assert_eq!(
        result.heavy_ranges,
        Some(vec![
            HeavyRange::line(2, heavy_tokens, Severity::Warning),
            HeavyRange::line(4, critical_tokens, Severity::Critical),
        ])
    );
}

#[tokio::test]
async fn test_dispose_stops_engine() {
    let engine = engine_with(WorkerOptions::default());
    engine.calculate_tokens("warm up", false).await.unwrap();
    engine.dispose();
    assert_eq!(
        engine.calculate_tokens("after", false).await.unwrap_err(),
        EngineError::Disposed
    );
}

#[tokio::test]
async fn test_encoder_build_failure_fails_initialization() {
    let transport = spawn_worker(WorkerOptions::default(), || -> anyhow::Result<TiktokenEncoder> {
        anyhow::bail!("vocabulary unavailable")
    })
    .unwrap();
    let engine = TokenEngine::with_transport(transport, DEFAULT_REQUEST_TIMEOUT).unwrap();

    let error = engine.ensure_ready().await.unwrap_err();
    assert!(
        matches!(
            error,
            EngineError::WorkerFault(_) | EngineError::DispatchFailure(_)
        ),
        "Got {:?}",
        error
    );
    assert!(engine.is_disposed());
}
