//! the chat session state machine.
//!
//! `Warming -> Idle -> AwaitingResponse -> Idle ...`, with `Closed` as the
//! terminal state after teardown. every backend round trip carries a
//! `RequestToken`; callbacks holding anything but the active token are
//! dropped, which makes completion idempotent and makes late callbacks after
//! teardown harmless.

use crate::bubble::{Bubble, BubbleId, Role, SceneSurface};
use crate::config::ChatConfig;
use crate::gate::{InputGate, InputRejected};
use crate::transcript::{Transcript, Viewport};
use crate::backend::BackendError;
use bevy::log::{debug, error, info, warn};
use std::sync::Arc;

/// identifies one backend call (warm-up or chat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestToken(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Warming,
    Idle,
    AwaitingResponse,
    Closed,
}

/// downstream consumer of finished responses (text-to-speech, usually).
pub trait SpeechSink: Send + Sync {
    fn speak(&self, text: &str);
}

/// what the host must send to the backend after an accepted submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    pub token: RequestToken,
    pub prompt: String,
    /// assistant bubble receiving partial + final text.
    pub reply: BubbleId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WarmupRequest {
    pub token: RequestToken,
}

/// what a tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evicted: usize,
    /// the host should re-activate the input field this frame.
    pub reassert_focus: bool,
}

#[derive(Clone, Copy, Debug)]
struct ActiveRequest {
    token: RequestToken,
    reply: BubbleId,
}

pub struct ChatController {
    config: ChatConfig,
    state: SessionState,
    gate: InputGate,
    transcript: Transcript,
    warmed_up: bool,
    last_response: String,
    warmup_error: Option<String>,
    warmup_token: Option<RequestToken>,
    active: Option<ActiveRequest>,
    next_token: u64,
    next_bubble: u64,
    speech: Option<Arc<dyn SpeechSink>>,
}

impl ChatController {
    pub fn new(config: ChatConfig) -> Self {
        let transcript = Transcript::new(config.bubble_spacing);
        Self {
            config,
            state: SessionState::Warming,
            gate: InputGate::default(),
            transcript,
            warmed_up: false,
            last_response: String::new(),
            warmup_error: None,
            warmup_token: None,
            active: None,
            next_token: 0,
            next_bubble: 0,
            speech: None,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSink>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn set_speech(&mut self, speech: Option<Arc<dyn SpeechSink>>) {
        self.speech = speech;
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn gate(&self) -> &InputGate {
        &self.gate
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }

    pub fn last_response(&self) -> &str {
        &self.last_response
    }

    pub fn warmup_error(&self) -> Option<&str> {
        self.warmup_error.as_deref()
    }

    /// placeholder shown in the empty input box.
    pub fn input_placeholder(&self) -> &str {
        match (self.state, &self.warmup_error) {
            (SessionState::Warming, _) => &self.config.loading_placeholder,
            (_, Some(_)) => &self.config.degraded_placeholder,
            _ => &self.config.ready_placeholder,
        }
    }

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken(self.next_token)
    }

    fn push_bubble(&mut self, role: Role, text: &str, scene: &mut dyn SceneSurface) -> BubbleId {
        self.next_bubble += 1;
        let id = BubbleId(self.next_bubble);
        let style = self.config.style_for(role);
        let surface = scene.create_bubble(id, role, &style, text);
        self.transcript.append(Bubble::new(id, role, text, surface));
        id
    }

    // ---------------------- warm-up ----------------------

    /// one-shot: returns `None` once warm-up has been issued or finished, and
    /// after a failure (see `retry_warmup`).
    pub fn begin_warmup(&mut self) -> Option<WarmupRequest> {
        if self.state != SessionState::Warming || self.warmup_token.is_some() || self.warmup_error.is_some() {
            return None;
        }
        let token = self.issue_token();
        self.warmup_token = Some(token);
        info!(target: "bevy_chatbot", "warm-up issued (token={})", token.0);
        Some(WarmupRequest { token })
    }

    /// only valid after a failed warm-up that left input blocked.
    pub fn retry_warmup(&mut self) -> Option<WarmupRequest> {
        if self.state != SessionState::Warming || self.warmup_error.is_none() {
            return None;
        }
        self.warmup_error = None;
        self.begin_warmup()
    }

    /// applies the warm-up outcome. returns false for stale or duplicate
    /// callbacks.
    pub fn warmup_finished(
        &mut self,
        token: RequestToken,
        result: Result<(), BackendError>,
        scene: &mut dyn SceneSurface,
    ) -> bool {
        if self.state != SessionState::Warming || self.warmup_token != Some(token) {
            debug!(target: "bevy_chatbot", "ignoring stale warm-up callback (token={})", token.0);
            return false;
        }
        self.warmup_token = None;

        match result {
            Ok(()) => {
                info!(target: "bevy_chatbot", "warm-up done; input enabled");
                self.warmed_up = true;
                self.enter_idle();
            }
            Err(err) => {
                error!(target: "bevy_chatbot", "warm-up failed: {}", err);
                let diagnostic = format!("{}{}", self.config.error_prefix, err);
                self.push_bubble(Role::Assistant, &diagnostic, scene);
                self.warmup_error = Some(err.to_string());
                if self.config.allow_degraded_input {
                    warn!(target: "bevy_chatbot", "continuing in degraded mode; backend may not answer");
                    self.warmed_up = true;
                    self.enter_idle();
                }
            }
        }
        true
    }

    fn enter_idle(&mut self) {
        self.state = SessionState::Idle;
        self.gate.clear_pending_text();
        self.gate.release();
        self.gate.schedule_focus_reassert();
    }

    // ---------------------- input ----------------------

    /// mirrors the input box. a blank box while the submit key is held is
    /// cleared so stray newlines don't pile up.
    pub fn set_pending_text(&mut self, text: impl Into<String>, submit_key_held: bool) {
        let text = text.into();
        if submit_key_held && text.trim().is_empty() {
            self.gate.clear_pending_text();
        } else {
            self.gate.set_pending_text(text);
        }
    }

    /// appends the user + placeholder bubbles and returns the backend call
    /// to make. rejections schedule a focus reassertion and change nothing
    /// else.
    pub fn submit(&mut self, text: &str, scene: &mut dyn SceneSurface) -> Result<ChatRequest, InputRejected> {
        if self.state == SessionState::Closed {
            return Err(InputRejected::AlreadyBlocked);
        }
        let prompt = match self.gate.try_submit(text) {
            Ok(prompt) => prompt,
            Err(reason) => {
                debug!(target: "bevy_chatbot", "submission rejected: {}", reason);
                self.gate.schedule_focus_reassert();
                return Err(reason);
            }
        };

        self.push_bubble(Role::User, &prompt, scene);
        let marker = self.config.working_marker.clone();
        let reply = self.push_bubble(Role::Assistant, &marker, scene);

        let token = self.issue_token();
        self.active = Some(ActiveRequest { token, reply });
        self.state = SessionState::AwaitingResponse;
        self.last_response.clear();
        self.gate.clear_pending_text();

        info!(target: "bevy_chatbot", "submit accepted (token={}, len={})", token.0, prompt.len());
        Ok(ChatRequest { token, prompt, reply })
    }

    /// submits whatever is in the input box.
    pub fn submit_pending(&mut self, scene: &mut dyn SceneSurface) -> Result<ChatRequest, InputRejected> {
        let text = self.gate.pending_text().to_string();
        self.submit(&text, scene)
    }

    /// voice transcripts go through the same path as typed text.
    pub fn submit_voice_command(
        &mut self,
        text: impl Into<String>,
        scene: &mut dyn SceneSurface,
    ) -> Result<ChatRequest, InputRejected> {
        self.gate.set_pending_text(text);
        self.submit_pending(scene)
    }

    // ---------------------- backend callbacks ----------------------

    fn active_for(&self, token: RequestToken) -> Option<ActiveRequest> {
        self.active.filter(|a| a.token == token && self.state == SessionState::AwaitingResponse)
    }

    /// streamed text so far; replaces the reply bubble's text.
    pub fn apply_partial(&mut self, token: RequestToken, text: impl Into<String>) -> bool {
        let Some(active) = self.active_for(token) else {
            return false;
        };
        let text = text.into();
        self.last_response.clone_from(&text);
        self.transcript.set_text(active.reply, text);
        true
    }

    /// finishes the active request. returns the final text on the first call
    /// for `token`, `None` for anything stale or repeated.
    pub fn complete(&mut self, token: RequestToken, final_text: Option<String>) -> Option<String> {
        let Some(active) = self.active_for(token) else {
            debug!(target: "bevy_chatbot", "ignoring stale completion (token={})", token.0);
            return None;
        };
        if let Some(text) = final_text {
            self.last_response = text;
        }
        if !self.transcript.set_text(active.reply, self.last_response.clone()) {
            debug!(target: "bevy_chatbot", "reply bubble {:?} already evicted", active.reply);
        }
        self.active = None;

        if !self.last_response.is_empty() {
            info!(target: "bevy_chatbot", "final response: {}", self.last_response);
            self.forward_to_speech();
        }

        self.state = SessionState::Idle;
        self.gate.release();
        self.gate.schedule_focus_reassert();
        Some(self.last_response.clone())
    }

    /// marks the reply as errored and hands input back to the user.
    pub fn fail(&mut self, token: RequestToken, error: &str) -> bool {
        let Some(active) = self.active_for(token) else {
            debug!(target: "bevy_chatbot", "ignoring stale failure (token={})", token.0);
            return false;
        };
        error!(target: "bevy_chatbot", "response failed (token={}): {}", token.0, error);
        let text = format!("{}{}", self.config.error_prefix, error);
        self.transcript.set_text(active.reply, text);
        self.active = None;
        self.state = SessionState::Idle;
        self.gate.release();
        self.gate.schedule_focus_reassert();
        true
    }

    fn forward_to_speech(&self) {
        match &self.speech {
            Some(sink) => {
                debug!(target: "bevy_chatbot", "speaking response (len={})", self.last_response.len());
                sink.speak(&self.last_response);
            }
            None => error!(target: "bevy_chatbot", "no speech sink configured; skipping speech"),
        }
    }

    // ---------------------- per-tick ----------------------

    /// layout (if anything moved), focus check, then at most one eviction.
    pub fn tick(&mut self, viewport: Viewport, input_focused: bool) -> TickReport {
        if self.state == SessionState::Closed {
            return TickReport::default();
        }
        self.transcript.layout_if_needed(viewport);

        if !input_focused && self.warmed_up {
            self.gate.schedule_focus_reassert();
        }
        let reassert_focus = self.gate.take_focus_reassert();
        let evicted = self.transcript.evict_pending();
        TickReport { evicted, reassert_focus }
    }

    /// tears the session down. any in-flight call may still finish; its
    /// callbacks are ignored.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!(target: "bevy_chatbot", "session closed ({} bubble(s) destroyed)", self.transcript.len());
        self.state = SessionState::Closed;
        self.active = None;
        self.warmup_token = None;
        self.transcript.clear();
        self.gate.block();
        self.gate.clear_pending_text();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bubble::testing::MemScene;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSpeech(Mutex<Vec<String>>);

    impl SpeechSink for RecordingSpeech {
        fn speak(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    impl RecordingSpeech {
        fn spoken(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn texts(c: &ChatController) -> Vec<(Role, String)> {
        c.transcript().entries().iter().map(|b| (b.role(), b.text().to_string())).collect()
    }

    fn warmed(scene: &mut MemScene) -> (ChatController, Arc<RecordingSpeech>) {
        let speech = Arc::new(RecordingSpeech::default());
        let mut c = ChatController::new(ChatConfig::default()).with_speech(speech.clone());
        let w = c.begin_warmup().unwrap();
        assert!(c.warmup_finished(w.token, Ok(()), scene));
        (c, speech)
    }

    const WIDE: Viewport = Viewport { anchor_offset: 0.0, visible_height: 10_000.0 };

    #[test]
    fn hello_round_trip() {
        let mut scene = MemScene::default();
        let speech = Arc::new(RecordingSpeech::default());
        let mut c = ChatController::new(ChatConfig::default()).with_speech(speech.clone());

        assert_eq!(c.state(), SessionState::Warming);
        assert_eq!(c.input_placeholder(), "Loading...");
        let w = c.begin_warmup().unwrap();
        assert_eq!(c.submit("hello", &mut scene), Err(InputRejected::AlreadyBlocked));
        assert!(c.transcript().is_empty());

        c.set_pending_text("typed before warm-up", false);
        assert!(c.warmup_finished(w.token, Ok(()), &mut scene));
        assert_eq!(c.state(), SessionState::Idle);
        assert!(!c.gate().is_blocked());
        assert_eq!(c.gate().pending_text(), "", "stale text cleared on warm-up");
        assert_eq!(c.input_placeholder(), "Message me");

        let req = c.submit("hello", &mut scene).unwrap();
        assert_eq!(req.prompt, "hello");
        assert_eq!(c.state(), SessionState::AwaitingResponse);
        assert_eq!(
            texts(&c),
            vec![(Role::User, "hello".to_string()), (Role::Assistant, "...".to_string())]
        );

        assert!(c.apply_partial(req.token, "hi"));
        assert_eq!(c.complete(req.token, Some("hi there".into())), Some("hi there".to_string()));
        assert_eq!(texts(&c)[1], (Role::Assistant, "hi there".to_string()));
        assert_eq!(c.last_response(), "hi there");
        assert!(!c.gate().is_blocked());
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(speech.spoken(), vec!["hi there".to_string()]);
    }

    #[test]
    fn whitespace_submission_adds_nothing() {
        let mut scene = MemScene::default();
        let (mut c, _) = warmed(&mut scene);
        c.tick(WIDE, true);

        assert_eq!(c.submit("   ", &mut scene), Err(InputRejected::EmptyInput));
        assert!(c.transcript().is_empty());
        assert_eq!(c.state(), SessionState::Idle);
        assert!(c.tick(WIDE, true).reassert_focus, "rejection re-activates the field");
    }

    #[test]
    fn second_submit_while_waiting_is_rejected() {
        let mut scene = MemScene::default();
        let (mut c, _) = warmed(&mut scene);
        c.submit("one", &mut scene).unwrap();
        assert_eq!(c.submit("two", &mut scene), Err(InputRejected::AlreadyBlocked));
        assert_eq!(c.transcript().len(), 2);
    }

    #[test]
    fn duplicate_completion_applies_once() {
        let mut scene = MemScene::default();
        let (mut c, speech) = warmed(&mut scene);
        let req = c.submit("q", &mut scene).unwrap();

        assert!(c.complete(req.token, Some("a".into())).is_some());
        let next = c.submit("q2", &mut scene).unwrap();
        assert_eq!(c.complete(req.token, Some("late".into())), None);
        assert_eq!(c.state(), SessionState::AwaitingResponse, "stale completion must not unblock");
        assert!(c.gate().is_blocked());
        assert!(!c.apply_partial(req.token, "late partial"));
        assert_eq!(texts(&c)[3].1, "...");

        c.complete(next.token, Some("b".into()));
        assert_eq!(speech.spoken(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn partials_apply_in_order_and_feed_completion() {
        let mut scene = MemScene::default();
        let (mut c, speech) = warmed(&mut scene);
        let req = c.submit("q", &mut scene).unwrap();

        c.apply_partial(req.token, "hel");
        c.apply_partial(req.token, "hello wor");
        c.apply_partial(req.token, "hello world");
        assert_eq!(texts(&c)[1].1, "hello world");

        assert_eq!(c.complete(req.token, None), Some("hello world".to_string()));
        assert_eq!(speech.spoken(), vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_response_is_not_spoken() {
        let mut scene = MemScene::default();
        let (mut c, speech) = warmed(&mut scene);
        let req = c.submit("q", &mut scene).unwrap();
        assert_eq!(c.complete(req.token, None), Some(String::new()));
        assert!(speech.spoken().is_empty());
        assert!(!c.gate().is_blocked());
    }

    #[test]
    fn missing_speech_sink_is_not_fatal() {
        let mut scene = MemScene::default();
        let mut c = ChatController::new(ChatConfig::default());
        let w = c.begin_warmup().unwrap();
        c.warmup_finished(w.token, Ok(()), &mut scene);
        let req = c.submit("q", &mut scene).unwrap();
        assert_eq!(c.complete(req.token, Some("a".into())), Some("a".to_string()));
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn backend_failure_shows_error_and_releases() {
        let mut scene = MemScene::default();
        let (mut c, speech) = warmed(&mut scene);
        let req = c.submit("q", &mut scene).unwrap();

        assert!(c.fail(req.token, "timeout"));
        assert_eq!(texts(&c)[1].1, "error: timeout");
        assert_eq!(c.state(), SessionState::Idle);
        assert!(!c.gate().is_blocked());
        assert!(speech.spoken().is_empty());
        assert!(!c.fail(req.token, "again"));
        assert!(c.submit("retry", &mut scene).is_ok());
    }

    #[test]
    fn degraded_warmup_failure_releases_input() {
        let mut scene = MemScene::default();
        let mut c = ChatController::new(ChatConfig::default());
        let w = c.begin_warmup().unwrap();
        assert!(c.warmup_finished(w.token, Err(BackendError::Unavailable("no model".into())), &mut scene));

        assert_eq!(c.state(), SessionState::Idle);
        assert!(!c.gate().is_blocked());
        assert_eq!(c.warmup_error(), Some("backend unavailable: no model"));
        assert_eq!(c.input_placeholder(), "Message me anyway");
        assert_eq!(texts(&c), vec![(Role::Assistant, "error: backend unavailable: no model".to_string())]);
        assert!(c.submit("anyone?", &mut scene).is_ok());
    }

    #[test]
    fn strict_warmup_failure_keeps_input_blocked_until_retry() {
        let mut scene = MemScene::default();
        let cfg = ChatConfig { allow_degraded_input: false, ..Default::default() };
        let mut c = ChatController::new(cfg);
        let w = c.begin_warmup().unwrap();
        c.warmup_finished(w.token, Err(BackendError::Unavailable("down".into())), &mut scene);

        assert_eq!(c.state(), SessionState::Warming);
        assert!(c.gate().is_blocked());
        assert_eq!(c.submit("hi", &mut scene), Err(InputRejected::AlreadyBlocked));
        assert!(c.begin_warmup().is_none(), "retrying is explicit");

        let retry = c.retry_warmup().unwrap();
        assert_ne!(retry.token, w.token);
        assert!(!c.warmup_finished(w.token, Ok(()), &mut scene), "old token is stale");
        assert!(c.warmup_finished(retry.token, Ok(()), &mut scene));
        assert_eq!(c.state(), SessionState::Idle);
        assert!(c.submit("hi", &mut scene).is_ok());
    }

    #[test]
    fn warmup_is_one_shot() {
        let mut scene = MemScene::default();
        let mut c = ChatController::new(ChatConfig::default());
        let w = c.begin_warmup().unwrap();
        assert!(c.begin_warmup().is_none());
        assert!(c.warmup_finished(w.token, Ok(()), &mut scene));
        assert!(!c.warmup_finished(w.token, Ok(()), &mut scene));
        assert!(c.begin_warmup().is_none());
        assert!(c.retry_warmup().is_none());
    }

    #[test]
    fn voice_commands_submit_like_typing() {
        let mut scene = MemScene::default();
        let (mut c, _) = warmed(&mut scene);
        let req = c.submit_voice_command("  what time is it  ", &mut scene).unwrap();
        assert_eq!(req.prompt, "what time is it");
        assert_eq!(c.gate().pending_text(), "");
        assert_eq!(c.transcript().len(), 2);
    }

    #[test]
    fn pending_text_editing() {
        let mut scene = MemScene::default();
        let (mut c, _) = warmed(&mut scene);
        c.set_pending_text("draft", false);
        assert_eq!(c.gate().pending_text(), "draft");
        c.set_pending_text("\n", true);
        assert_eq!(c.gate().pending_text(), "");
        c.set_pending_text("go", false);
        assert_eq!(c.submit_pending(&mut scene).unwrap().prompt, "go");
    }

    #[test]
    fn focus_loss_is_reasserted_only_after_warmup() {
        let mut scene = MemScene::default();
        let mut c = ChatController::new(ChatConfig::default());
        let w = c.begin_warmup().unwrap();
        assert!(!c.tick(WIDE, false).reassert_focus);

        c.warmup_finished(w.token, Ok(()), &mut scene);
        assert!(c.tick(WIDE, true).reassert_focus, "warm-up re-activates the field once");
        assert!(!c.tick(WIDE, true).reassert_focus);
        assert!(c.tick(WIDE, false).reassert_focus);
        assert_eq!(c.state(), SessionState::Idle, "focus handling never changes state");
    }

    #[test]
    fn tick_evicts_scrolled_out_bubbles() {
        let mut scene = MemScene::fixed(10.0);
        let (mut c, _) = warmed(&mut scene);
        for i in 0..10 {
            let req = c.submit(&format!("q{i}"), &mut scene).unwrap();
            c.complete(req.token, Some(format!("a{i}")));
        }
        assert_eq!(c.transcript().len(), 20);

        let report = c.tick(Viewport { anchor_offset: 0.0, visible_height: 290.0 }, true);
        assert_eq!(report.evicted, 5);
        assert_eq!(c.transcript().len(), 15);
        assert_eq!(c.transcript().entries()[0].text(), "a2");
        assert_eq!(scene.destroyed().len(), 5);

        let again = c.tick(Viewport { anchor_offset: 0.0, visible_height: 290.0 }, true);
        assert_eq!(again.evicted, 0);
    }

    #[test]
    fn streamed_text_relays_out_older_bubbles() {
        let mut scene = MemScene::default();
        let (mut c, _) = warmed(&mut scene);
        let req = c.submit("q", &mut scene).unwrap();
        c.tick(WIDE, true);
        let before = c.transcript().entries()[0].anchored_offset();

        assert!(c.apply_partial(req.token, "word ".repeat(300)));
        assert!(c.transcript().needs_layout());
        c.tick(WIDE, true);
        let after = c.transcript().entries()[0].anchored_offset();
        assert!(after > before, "user bubble should rise: {before} -> {after}");
        assert!(!c.transcript().needs_layout());
    }

    #[test]
    fn long_stream_pushes_the_prompt_out_of_view() {
        let mut scene = MemScene::default();
        let (mut c, _) = warmed(&mut scene);
        let view = Viewport { anchor_offset: 0.0, visible_height: 200.0 };
        let req = c.submit("q", &mut scene).unwrap();
        assert_eq!(c.tick(view, true).evicted, 0);

        c.apply_partial(req.token, "x".repeat(1500));
        assert_eq!(c.tick(view, true).evicted, 1);
        assert_eq!(texts(&c), vec![(Role::Assistant, "x".repeat(1500))]);
        assert_eq!(scene.destroyed().len(), 1);
    }

    #[test]
    fn teardown_ignores_late_callbacks() {
        let mut scene = MemScene::default();
        let (mut c, speech) = warmed(&mut scene);
        let req = c.submit("q", &mut scene).unwrap();

        c.shutdown();
        assert_eq!(c.state(), SessionState::Closed);
        assert_eq!(scene.destroyed().len(), 2);

        assert!(!c.apply_partial(req.token, "late"));
        assert_eq!(c.complete(req.token, Some("late".into())), None);
        assert!(!c.fail(req.token, "late"));
        assert!(speech.spoken().is_empty());
        assert_eq!(c.submit("more", &mut scene), Err(InputRejected::AlreadyBlocked));
        assert_eq!(c.tick(WIDE, false), TickReport::default());
    }
}
