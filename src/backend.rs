//! response-generation backends and the inbox their results flow through.
//!
//! a backend is an opaque async function. the drivers here run it off the
//! main thread and translate its outcome into `BackendMsg`s tagged with the
//! request token; the plugin drains those once per frame and feeds the
//! controller, which drops anything carrying a stale token.

use crate::controller::RequestToken;
use crate::{ChatMessage, LLMProvider, StreamChoice, StreamDelta, StreamResponse};
use async_trait::async_trait;
use bevy::log::{debug, error, info, warn};
use bevy::prelude::Resource;
use flume::{Receiver, Sender};
use futures_lite::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// results travelling from backend tasks to the main thread.
#[derive(Debug)]
pub enum BackendMsg {
    WarmupDone { token: RequestToken, result: Result<(), BackendError> },
    /// full response text so far (not a delta).
    Partial { token: RequestToken, text: String },
    Done { token: RequestToken, final_text: Option<String> },
    Failed { token: RequestToken, error: String },
}

/// cross-thread inbox; producers send, main thread drains.
/// bounded to avoid unbounded growth when the frame stalls briefly.
#[derive(Resource, Clone)]
pub struct BackendInbox {
    pub(crate) tx: Sender<BackendMsg>,
    pub(crate) rx: Receiver<BackendMsg>,
}

impl Default for BackendInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(2048);
        Self { tx, rx }
    }
}

impl BackendInbox {
    pub fn sender(&self) -> Sender<BackendMsg> {
        self.tx.clone()
    }
}

/// send to inbox (ignore disconnected)
fn push_inbox(tx: &Sender<BackendMsg>, msg: BackendMsg) {
    let _ = tx.send(msg);
}

/// handed to `ChatBackend::chat` for streaming partial text.
#[derive(Clone)]
pub struct ResponseSink {
    token: RequestToken,
    tx: Sender<BackendMsg>,
}

impl ResponseSink {
    pub fn new(token: RequestToken, tx: Sender<BackendMsg>) -> Self {
        Self { token, tx }
    }

    /// `text` is everything received so far.
    pub fn partial(&self, text: impl Into<String>) {
        push_inbox(&self.tx, BackendMsg::Partial { token: self.token, text: text.into() });
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ChatBackend: Send + Sync {
    /// one-shot initialization before the first prompt.
    async fn warmup(&self) -> Result<(), BackendError>;

    /// answers `prompt`, optionally streaming through `sink`. returns the
    /// final text.
    async fn chat(&self, prompt: &str, sink: &ResponseSink) -> Result<String, BackendError>;
}

pub async fn drive_warmup(backend: Arc<dyn ChatBackend>, token: RequestToken, tx: Sender<BackendMsg>) {
    let result = backend.warmup().await;
    if let Err(err) = &result {
        warn!(target: "bevy_chatbot", "backend warm-up error: {}", err);
    }
    push_inbox(&tx, BackendMsg::WarmupDone { token, result });
}

pub async fn drive_chat(
    backend: Arc<dyn ChatBackend>,
    token: RequestToken,
    prompt: String,
    tx: Sender<BackendMsg>,
) {
    let sink = ResponseSink::new(token, tx.clone());
    match backend.chat(&prompt, &sink).await {
        Ok(text) => {
            let final_text = if text.is_empty() { None } else { Some(text) };
            push_inbox(&tx, BackendMsg::Done { token, final_text });
        }
        Err(err) => {
            error!(target: "bevy_chatbot", "chat error (token={}): {}", token.0, err);
            push_inbox(&tx, BackendMsg::Failed { token, error: err.to_string() });
        }
    }
}

/// `ChatBackend` over any `llm` provider. history lives in the provider
/// (configure builder memory if you want multi-turn context).
///
/// the warm-up prompt goes through the same `chat()` call, so a provider
/// built with memory (e.g. `sliding_window_memory`) keeps the warm-up
/// exchange in its history.
#[derive(Clone)]
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    stream: bool,
    warmup_prompt: Option<String>,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider, stream: true, warmup_prompt: None }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// without a warm-up prompt, warm-up completes immediately. with one, the
    /// exchange lands in provider memory like any other turn; keep it short.
    pub fn warmup_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.warmup_prompt = Some(prompt.into());
        self
    }

    async fn one_shot(&self, messages: &[ChatMessage], sink: &ResponseSink) -> Result<String, BackendError> {
        let resp = self
            .provider
            .chat(messages)
            .await
            .map_err(|e| BackendError::Provider(e.to_string()))?;
        let text = resp.text().unwrap_or_default().to_string();
        if !text.is_empty() {
            sink.partial(text.clone());
        }
        info!(target: "bevy_chatbot", "chat completed: final_len={}", text.len());
        Ok(text)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ChatBackend for LlmBackend {
    async fn warmup(&self) -> Result<(), BackendError> {
        let Some(prompt) = &self.warmup_prompt else {
            return Ok(());
        };
        let messages = vec![ChatMessage::user().content(prompt.clone()).build()];
        self.provider
            .chat(&messages)
            .await
            .map(|_| ())
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }

    async fn chat(&self, prompt: &str, sink: &ResponseSink) -> Result<String, BackendError> {
        let messages = vec![ChatMessage::user().content(prompt.to_string()).build()];
        if !self.stream {
            return self.one_shot(&messages, sink).await;
        }

        let mut s = match self.provider.chat_stream_struct(&messages).await {
            Ok(s) => s,
            Err(err) => {
                warn!(target: "bevy_chatbot",
                    "structured streaming failed: {err}. falling back to one-shot chat()"
                );
                return self.one_shot(&messages, sink).await;
            }
        };

        // coalesce tiny deltas to ~60hz or >=64 new chars
        const MIN_CHARS: usize = 64;
        const MAX_LATENCY: Duration = Duration::from_millis(16);
        let mut text = String::new();
        let mut unflushed = 0usize;
        let mut last_flush = Instant::now();
        while let Some(item) = s.next().await {
            let StreamResponse { choices, .. } = item.map_err(|e| {
                if unflushed > 0 {
                    sink.partial(text.clone());
                }
                BackendError::Provider(e.to_string())
            })?;
            for StreamChoice { delta: StreamDelta { content, .. } } in choices {
                if let Some(txt) = content
                    && !txt.is_empty() {
                        text.push_str(&txt);
                        unflushed += txt.len();
                        let now = Instant::now();
                        if unflushed >= MIN_CHARS || now.duration_since(last_flush) >= MAX_LATENCY {
                            sink.partial(text.clone());
                            unflushed = 0;
                            last_flush = now;
                        }
                }
            }
        }
        // flush tail
        if unflushed > 0 {
            sink.partial(text.clone());
        }
        debug!(target: "bevy_chatbot", "stream completed: final_len={}", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Scripted {
        partials: Vec<&'static str>,
        outcome: Result<&'static str, BackendError>,
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn warmup(&self) -> Result<(), BackendError> {
            self.outcome.as_ref().map(|_| ()).map_err(Clone::clone)
        }

        async fn chat(&self, _prompt: &str, sink: &ResponseSink) -> Result<String, BackendError> {
            for p in &self.partials {
                sink.partial(*p);
            }
            self.outcome.clone().map(str::to_string)
        }
    }

    fn run_chat(backend: Scripted) -> Vec<BackendMsg> {
        let inbox = BackendInbox::default();
        pollster::block_on(drive_chat(Arc::new(backend), RequestToken(7), "hi".into(), inbox.sender()));
        inbox.rx.try_iter().collect()
    }

    #[test]
    fn streamed_chat_ends_with_done() {
        let msgs = run_chat(Scripted { partials: vec!["he", "hello"], outcome: Ok("hello") });
        assert_eq!(msgs.len(), 3);
        assert!(matches!(&msgs[0], BackendMsg::Partial { token: RequestToken(7), text } if text == "he"));
        assert!(matches!(&msgs[1], BackendMsg::Partial { text, .. } if text == "hello"));
        match &msgs[2] {
            BackendMsg::Done { token, final_text } => {
                assert_eq!(*token, RequestToken(7));
                assert_eq!(final_text.as_deref(), Some("hello"));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn empty_reply_has_no_final_text() {
        let msgs = run_chat(Scripted { partials: vec![], outcome: Ok("") });
        assert!(matches!(msgs.as_slice(), [BackendMsg::Done { final_text: None, .. }]));
    }

    #[test]
    fn errors_become_failed_messages() {
        let msgs = run_chat(Scripted {
            partials: vec!["par"],
            outcome: Err(BackendError::Provider("429".into())),
        });
        assert_eq!(msgs.len(), 2);
        match &msgs[1] {
            BackendMsg::Failed { token, error } => {
                assert_eq!(*token, RequestToken(7));
                assert_eq!(error, "provider error: 429");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn warmup_reports_outcome() {
        let inbox = BackendInbox::default();
        let backend = Scripted { partials: vec![], outcome: Err(BackendError::Unavailable("offline".into())) };
        pollster::block_on(drive_warmup(Arc::new(backend), RequestToken(1), inbox.sender()));
        let msgs: Vec<_> = inbox.rx.try_iter().collect();
        match msgs.as_slice() {
            [BackendMsg::WarmupDone { token, result }] => {
                assert_eq!(*token, RequestToken(1));
                assert_eq!(result, &Err(BackendError::Unavailable("offline".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
