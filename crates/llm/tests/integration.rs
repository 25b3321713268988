//! Generators against a scripted HTTP server on localhost.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use llm::{
    ChatPrompt, ChatTemplate, GenerateParams, GenerationOutcome, LocalGenerator, OpenAiGenerator, TextGenerator,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Status and body for the n-th request (0-based) the server receives.
type Script = Arc<dyn Fn(usize, &str) -> (u16, String) + Send + Sync>;

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|l| {
                    let lower = l.to_ascii_lowercase();
                    lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return text[header_end + 4..].to_string();
            }
        }
    }
    String::new()
}

/// Serve `script` until the test ends; returns the base URL and request counter.
async fn serve(script: Script) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let count = counter.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            let script = script.clone();
            let count = count.clone();
            tokio::spawn(async move {
                let body = read_request(&mut stream).await;
                let n = count.fetch_add(1, Ordering::SeqCst);
                let (status, payload) = script(n, &body);
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (format!("http://{addr}"), counter)
}

fn fast_params(max_attempts: usize) -> GenerateParams {
    GenerateParams {
        max_attempts,
        base_backoff_ms: 5,
        request_timeout_secs: 5,
        ..GenerateParams::default()
    }
}

fn prompts(n: usize) -> Vec<ChatPrompt> {
    (0..n).map(|i| ChatPrompt::new("sys", format!("prompt {i}"))).collect()
}

fn chat_reply(text: &str) -> String {
    serde_json::json!({"choices": [{"message": {"role": "assistant", "content": text}}]}).to_string()
}

#[tokio::test]
async fn test_local_batch_in_order() {
    let (url, counter) = serve(Arc::new(|_, body: &str| {
        let req: serde_json::Value = serde_json::from_str(body).unwrap();
        let texts = req["text"].as_array().unwrap();
        let items: Vec<_> = (0..texts.len()).map(|i| serde_json::json!({"text": format!(" answer {i} ")})).collect();
        (200, serde_json::Value::Array(items).to_string())
    }))
    .await;

    let generator = LocalGenerator::new(&url, ChatTemplate::ChatMl, fast_params(3)).unwrap();
    let outcomes = generator.generate(prompts(3)).await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            GenerationOutcome::Completed("answer 0".into()),
            GenerationOutcome::Completed("answer 1".into()),
            GenerationOutcome::Completed("answer 2".into()),
        ]
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_local_retries_server_errors() {
    let (url, counter) = serve(Arc::new(|n, _: &str| {
        if n < 2 {
            (503, "busy".to_string())
        } else {
            (200, r#"[{"text":"ok"}]"#.to_string())
        }
    }))
    .await;

    let generator = LocalGenerator::new(&url, ChatTemplate::Plain, fast_params(4)).unwrap();
    let outcomes = generator.generate(prompts(1)).await.unwrap();
    assert_eq!(outcomes, vec![GenerationOutcome::Completed("ok".into())]);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_local_client_error_fails_whole_batch_without_retry() {
    let (url, counter) = serve(Arc::new(|_, _: &str| (400, "bad".to_string()))).await;

    let generator = LocalGenerator::new(&url, ChatTemplate::ChatMl, fast_params(4)).unwrap();
    let outcomes = generator.generate(prompts(2)).await.unwrap();
    assert!(outcomes.iter().all(GenerationOutcome::is_failed));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remote_persistent_failure_is_bounded() {
    let (url, counter) = serve(Arc::new(|_, _: &str| (500, "down".to_string()))).await;

    let generator = OpenAiGenerator::new(&format!("{url}/v1"), "sk-test", "m", fast_params(3)).unwrap();
    let outcomes = generator.generate(prompts(2)).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        match outcome {
            GenerationOutcome::Failed { reason } => assert!(reason.contains("500"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }
    // 2 prompts x 3 sweeps, one request each.
    assert_eq!(counter.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_remote_recovers_on_later_sweep() {
    // Fail the very first request only; that prompt succeeds on sweep two.
    let (url, counter) = serve(Arc::new(|n, body: &str| {
        let req: serde_json::Value = serde_json::from_str(body).unwrap();
        let user = req["messages"][1]["content"].as_str().unwrap().to_string();
        if n == 0 {
            (502, "flaky".to_string())
        } else {
            (200, chat_reply(&format!("re: {user}")))
        }
    }))
    .await;

    let generator = OpenAiGenerator::new(&url, "sk-test", "m", fast_params(3)).unwrap();
    let outcomes = generator.generate(prompts(2)).await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            GenerationOutcome::Completed("re: prompt 0".into()),
            GenerationOutcome::Completed("re: prompt 1".into()),
        ]
    );
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}
