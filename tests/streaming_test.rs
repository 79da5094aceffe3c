//! Streaming tests: fragments over a channel from a blocking generation.

mod common;

use std::sync::Arc;

use futures::StreamExt;

use llm_bridge::{FinishReason, SessionError, SessionManager};

use common::{ascii_model, config, greedy_request, loaded_manager, tiny_model};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_matches_blocking_generation() {
    let fixture = tiny_model();
    let manager = Arc::new(loaded_manager(&fixture));

    let blocking = manager.generate(&greedy_request("Hello", 10), |_| {}).unwrap();
    manager.reset_session().unwrap();

    let stream = manager.generate_stream(greedy_request("Hello", 10));
    let (text, result) = stream.collect_text().await.unwrap();
    assert_eq!(text, blocking.text());
    assert_eq!(result.tokens, blocking.tokens);
    assert_eq!(result.finish_reason, FinishReason::TokenBudgetExhausted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_next_fragment_yields_in_order() {
    let fixture = ascii_model();
    let manager = Arc::new(loaded_manager(&fixture));

    let mut stream = manager.generate_stream(greedy_request("Hello", 8));
    let mut fragments = Vec::new();
    while let Some(f) = stream.next_fragment().await {
        fragments.push(f);
    }
    let result = stream.result().await.unwrap();
    assert_eq!(fragments, result.fragments);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_trait() {
    let fixture = ascii_model();
    let manager = Arc::new(loaded_manager(&fixture));

    let stream = manager.generate_stream(greedy_request("Hello", 6));
    let fragments: Vec<String> = stream.collect().await;
    assert!(fragments.iter().all(|f| !f.is_empty()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_result_without_reading_fragments() {
    let fixture = tiny_model();
    let manager = Arc::new(loaded_manager(&fixture));

    // More fragments than the channel buffers; result() must keep draining.
    let result = manager
        .generate_stream(greedy_request("Hello", 100))
        .result()
        .await
        .unwrap();
    assert_eq!(result.tokens_generated(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stream() {
    let fixture = ascii_model();
    let manager = Arc::new(loaded_manager(&fixture));

    // Far more fragments than the channel holds, so the run cannot finish
    // before the cancel lands.
    let mut stream = manager.generate_stream(greedy_request("Hello", 500));
    stream.cancel();
    while stream.next_fragment().await.is_some() {}
    let result = stream.result().await.unwrap();
    assert_eq!(result.finish_reason, FinishReason::Cancelled);
    assert!(result.tokens_generated() < 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manager_cancel_reaches_stream() {
    let fixture = ascii_model();
    let manager = Arc::new(loaded_manager(&fixture));

    let mut stream = manager.generate_stream(greedy_request("Hello", 500));
    let mut reads = 0;
    while stream.next_fragment().await.is_some() {
        reads += 1;
        if reads == 1 {
            assert!(manager.cancel());
        }
    }
    let result = stream.result().await.unwrap();
    if reads > 0 {
        assert_eq!(result.finish_reason, FinishReason::Cancelled);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_stream_frees_session() {
    let fixture = tiny_model();
    let manager = Arc::new(loaded_manager(&fixture));

    let mut stream = manager.generate_stream(greedy_request("Hello", 200));
    let _ = stream.next_fragment().await;
    drop(stream);

    // The generation notices the closed channel and stops; the session frees up.
    let mut freed = false;
    for _ in 0..200 {
        if manager.session_position().is_some() {
            freed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(freed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_without_model_reports_error() {
    let manager = Arc::new(SessionManager::new(config(64)));
    let stream = manager.generate_stream(greedy_request("Hello", 4));
    let err = stream.result().await.unwrap_err();
    assert_eq!(err, SessionError::NotLoaded);
}
