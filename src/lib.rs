//! bevy_chatbot: chat bubbles for bevy, driven by a turn-taking controller.
//!
//! - a toolkit-free core (`controller`, `gate`, `transcript`, `bubble`) owns
//!   the submit -> await -> complete cycle and bottom-up bubble layout.
//! - input is gated while a response is in flight; every backend call
//!   carries a token so late/duplicate callbacks are dropped.
//! - bubbles scrolled fully above the view are evicted once per frame.
//! - never blocks the main thread: on native we spawn onto a tiny tokio
//!   runtime (no bevy pool blocking); on wasm we use bevy's async pool,
//!   which yields to the browser/event loop.
//!
//! the response backend is anything implementing `ChatBackend`; `LlmBackend`
//! adapts any `llm` provider (https://docs.rs/llm).

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use flume::TryRecvError;
use std::sync::Arc;

pub mod backend;
pub mod bubble;
pub mod config;
pub mod controller;
pub mod gate;
pub mod surface;
pub mod transcript;

/// re-export the llm types so downstream code can build providers without
/// a direct dependency.
pub use llm::{
    builder::{LLMBackend, LLMBuilder},
    chat::{ChatMessage, ChatProvider, ChatRole, StreamChoice, StreamDelta, StreamResponse},
    error::LLMError,
    LLMProvider,
};

pub use backend::{BackendError, BackendInbox, BackendMsg, ChatBackend, LlmBackend, ResponseSink};
pub use bubble::{BubbleId, BubbleStyle, Role, Side, TextMetrics};
pub use config::{ChatConfig, ConfigError};
pub use controller::{ChatController, ChatRequest, RequestToken, SessionState, SpeechSink, TickReport, WarmupRequest};
pub use gate::{InputGate, InputRejected};
pub use surface::{BubbleEntities, BubbleNode, ChatContainer, ChatViewport, PromptInput, SceneOutbox};
pub use transcript::{Transcript, Viewport};

/// on native we keep a tiny tokio runtime to drive backend futures.
/// we spawn onto this rt from compute tasks so neither the main thread
/// nor bevy's compute pools block.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_chatbot", "ChatBotPlugin: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// per-frame ordering: backend results land, new prompts go out, then the
/// controller ticks (layout, focus, eviction) and the ui catches up.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ChatSet {
    Drain,
    Submit,
    Tick,
    Sync,
}

/// the single chat session.
#[derive(Resource)]
pub struct ChatSession {
    controller: ChatController,
}

impl ChatSession {
    pub fn new(controller: ChatController) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ChatController {
        &mut self.controller
    }
}

/// insert before startup; without it warm-up fails and every prompt errors.
#[derive(Resource, Clone)]
pub struct Backend(pub Arc<dyn ChatBackend>);

/// optional text-to-speech consumer for finished responses.
#[derive(Resource, Clone)]
pub struct Speech(pub Arc<dyn SpeechSink>);

/// the host keeps this in sync with the prompt field's focus.
#[derive(Resource, Debug, Default)]
pub struct PromptFocus {
    pub focused: bool,
}

/// user input entering the controller.
#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub enum SubmitPrompt {
    Text(String),
    Voice(String),
    /// submit whatever `PromptEdited` last reported.
    Pending,
}

/// mirror of the prompt field's contents.
#[derive(Event, Debug, Clone, PartialEq, Eq)]
pub struct PromptEdited {
    pub text: String,
    pub submit_key_held: bool,
}

#[derive(Event, Debug)]
pub struct ResponsePartialEvt {
    /// full text so far.
    pub text: String,
}
#[derive(Event, Debug)]
pub struct ResponseCompletedEvt {
    pub text: String,
}
#[derive(Event, Debug)]
pub struct ResponseErrorEvt {
    pub error: String,
}
/// operator-facing: the backend never came up.
#[derive(Event, Debug)]
pub struct WarmupFailedEvt {
    pub error: String,
}
/// re-issues warm-up after a failure that left input blocked
/// (`ChatConfig::allow_degraded_input == false`).
#[derive(Event, Debug, Default, Clone, Copy)]
pub struct RetryWarmup;

/// the prompt field should be re-activated (disable for a frame, re-enable,
/// caret to end).
#[derive(Event, Debug, Default)]
pub struct ReassertFocusEvt;

/// bevy plugin: wires systems, events, resources.
/// insert a `Backend` (and optionally `Speech` / `ChatConfig`) before startup.
/// on native, also inserts a tiny tokio runtime resource by default.
pub struct ChatBotPlugin;

impl Plugin for ChatBotPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_chatbot", "ChatBotPlugin: build()");
        if app.world().get_resource::<ChatSession>().is_none() {
            let config = app.world().get_resource::<ChatConfig>().cloned().unwrap_or_default();
            app.insert_resource(ChatSession::new(ChatController::new(config)));
        }

        app.init_resource::<BackendInbox>()
            .init_resource::<SceneOutbox>()
            .init_resource::<BubbleEntities>()
            .init_resource::<ChatViewport>()
            .init_resource::<PromptFocus>()
            .add_event::<SubmitPrompt>()
            .add_event::<PromptEdited>()
            .add_event::<ResponsePartialEvt>()
            .add_event::<ResponseCompletedEvt>()
            .add_event::<ResponseErrorEvt>()
            .add_event::<WarmupFailedEvt>()
            .add_event::<ReassertFocusEvt>()
            .add_event::<RetryWarmup>()
            .configure_sets(
                Update,
                (ChatSet::Drain, ChatSet::Submit, ChatSet::Tick, ChatSet::Sync).chain(),
            )
            .add_systems(Startup, start_warmup)
            .add_systems(Update, drain_backend_inbox.in_set(ChatSet::Drain))
            .add_systems(Update, (retry_warmup, handle_prompts).chain().in_set(ChatSet::Submit))
            .add_systems(
                Update,
                (surface::measure_viewport, tick_session).chain().in_set(ChatSet::Tick),
            )
            .add_systems(
                Update,
                (surface::apply_scene_ops, shutdown_on_exit).chain().in_set(ChatSet::Sync),
            );

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

/// runs a backend future off the main thread (compute-tasks-first, then
/// tokio on native).
#[cfg(not(target_arch = "wasm32"))]
fn spawn_backend<F>(rt: &TokioRt, run: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let rt = rt.0.clone();
    AsyncComputeTaskPool::get()
        .spawn(async move {
            // native: hand off to tokio so bevy pools stay free.
            let _ = rt.spawn(run).await;
        })
        .detach();
}

#[cfg(target_arch = "wasm32")]
fn spawn_backend<F>(run: F)
where
    F: std::future::Future<Output = ()> + 'static,
{
    // wasm path: just await directly (no tokio).
    AsyncComputeTaskPool::get().spawn(run).detach();
}

const NO_BACKEND: &str = "no Backend resource installed";

fn start_warmup(
    mut session: ResMut<ChatSession>,
    backend: Option<Res<Backend>>,
    speech: Option<Res<Speech>>,
    inbox: Res<BackendInbox>,
    outbox: Res<SceneOutbox>,
    mut ev_failed: EventWriter<WarmupFailedEvt>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    let controller = session.controller_mut();
    match speech {
        Some(s) => controller.set_speech(Some(s.0.clone())),
        None => error!(target: "bevy_chatbot", "no Speech resource installed; responses will not be spoken"),
    }

    let Some(req) = controller.begin_warmup() else {
        return;
    };
    match backend {
        Some(b) => {
            let run = backend::drive_warmup(b.0.clone(), req.token, inbox.sender());
            #[cfg(not(target_arch = "wasm32"))]
            spawn_backend(&rt, run);
            #[cfg(target_arch = "wasm32")]
            spawn_backend(run);
        }
        None => {
            error!(target: "bevy_chatbot", "start_warmup: {}", NO_BACKEND);
            fail_warmup_without_backend(controller, req, &outbox, &mut ev_failed);
        }
    }
}

fn fail_warmup_without_backend(
    controller: &mut ChatController,
    req: WarmupRequest,
    outbox: &SceneOutbox,
    ev_failed: &mut EventWriter<WarmupFailedEvt>,
) {
    let err = BackendError::Unavailable(NO_BACKEND.into());
    let error = err.to_string();
    if controller.warmup_finished(req.token, Err(err), &mut outbox.surface()) {
        ev_failed.write(WarmupFailedEvt { error });
    }
}

/// answers `RetryWarmup`; a no-op unless a warm-up failed and left the
/// session `Warming`.
fn retry_warmup(
    mut ev_retry: EventReader<RetryWarmup>,
    mut session: ResMut<ChatSession>,
    backend: Option<Res<Backend>>,
    inbox: Res<BackendInbox>,
    outbox: Res<SceneOutbox>,
    mut ev_failed: EventWriter<WarmupFailedEvt>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    if ev_retry.read().last().is_none() {
        return;
    }
    let controller = session.controller_mut();
    let Some(req) = controller.retry_warmup() else {
        debug!(target: "bevy_chatbot", "retry_warmup: nothing to retry ({:?})", controller.state());
        return;
    };
    match backend {
        Some(b) => {
            let run = backend::drive_warmup(b.0.clone(), req.token, inbox.sender());
            #[cfg(not(target_arch = "wasm32"))]
            spawn_backend(&rt, run);
            #[cfg(target_arch = "wasm32")]
            spawn_backend(run);
        }
        None => {
            error!(target: "bevy_chatbot", "retry_warmup: {}", NO_BACKEND);
            fail_warmup_without_backend(controller, req, &outbox, &mut ev_failed);
        }
    }
}

/// drains the inbox in arrival order and feeds the controller.
fn drain_backend_inbox(
    inbox: Res<BackendInbox>,
    outbox: Res<SceneOutbox>,
    mut session: ResMut<ChatSession>,
    mut ev_partial: EventWriter<ResponsePartialEvt>,
    mut ev_done: EventWriter<ResponseCompletedEvt>,
    mut ev_err: EventWriter<ResponseErrorEvt>,
    mut ev_failed: EventWriter<WarmupFailedEvt>,
) {
    // drain up to a cap per frame to avoid long frames on bursty streams
    const MAX_PER_FRAME: usize = 512;
    let controller = session.controller_mut();
    let mut scene = outbox.surface();
    for _ in 0..MAX_PER_FRAME {
        let msg = match inbox.rx.try_recv() {
            Ok(m) => m,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        };
        match msg {
            BackendMsg::WarmupDone { token, result } => {
                let error = result.as_ref().err().map(ToString::to_string);
                if controller.warmup_finished(token, result, &mut scene)
                    && let Some(error) = error {
                        ev_failed.write(WarmupFailedEvt { error });
                }
            }
            BackendMsg::Partial { token, text } => {
                if controller.apply_partial(token, text.clone()) {
                    ev_partial.write(ResponsePartialEvt { text });
                }
            }
            BackendMsg::Done { token, final_text } => {
                if let Some(text) = controller.complete(token, final_text) {
                    ev_done.write(ResponseCompletedEvt { text });
                }
            }
            BackendMsg::Failed { token, error } => {
                if controller.fail(token, &error) {
                    ev_err.write(ResponseErrorEvt { error });
                }
            }
        }
    }
}

/// applies prompt edits, then submissions; accepted prompts go to the
/// backend.
fn handle_prompts(
    mut ev_edit: EventReader<PromptEdited>,
    mut ev_submit: EventReader<SubmitPrompt>,
    mut session: ResMut<ChatSession>,
    backend: Option<Res<Backend>>,
    inbox: Res<BackendInbox>,
    outbox: Res<SceneOutbox>,
    mut ev_err: EventWriter<ResponseErrorEvt>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    let controller = session.controller_mut();
    for PromptEdited { text, submit_key_held } in ev_edit.read() {
        controller.set_pending_text(text.clone(), *submit_key_held);
    }

    let mut scene = outbox.surface();
    for prompt in ev_submit.read() {
        let result = match prompt {
            SubmitPrompt::Text(text) => controller.submit(text, &mut scene),
            SubmitPrompt::Voice(text) => controller.submit_voice_command(text.clone(), &mut scene),
            SubmitPrompt::Pending => controller.submit_pending(&mut scene),
        };
        let req = match result {
            Ok(req) => req,
            Err(reason) => {
                debug!(target: "bevy_chatbot", "handle_prompts: {:?} rejected ({})", prompt, reason);
                continue;
            }
        };

        match &backend {
            Some(b) => {
                let run = backend::drive_chat(b.0.clone(), req.token, req.prompt, inbox.sender());
                #[cfg(not(target_arch = "wasm32"))]
                spawn_backend(&rt, run);
                #[cfg(target_arch = "wasm32")]
                spawn_backend(run);
            }
            None => {
                error!(target: "bevy_chatbot", "handle_prompts: {}", NO_BACKEND);
                if controller.fail(req.token, NO_BACKEND) {
                    ev_err.write(ResponseErrorEvt { error: NO_BACKEND.into() });
                }
            }
        }
    }
}

fn tick_session(
    mut session: ResMut<ChatSession>,
    viewport: Res<ChatViewport>,
    mut focus: ResMut<PromptFocus>,
    mut ev_focus: EventWriter<ReassertFocusEvt>,
) {
    let report = session.controller_mut().tick(viewport.0, focus.focused);
    if report.reassert_focus {
        if !focus.focused {
            focus.focused = true;
        }
        ev_focus.write(ReassertFocusEvt);
    }
    if report.evicted > 0 {
        debug!(target: "bevy_chatbot", "tick: evicted {} bubble(s)", report.evicted);
    }
}

fn shutdown_on_exit(mut ev_exit: EventReader<AppExit>, mut session: ResMut<ChatSession>) {
    if ev_exit.read().last().is_some() {
        session.controller_mut().shutdown();
    }
}
