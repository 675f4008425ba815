//! bubble chat demo against an openai-compatible backend.
//! - transcript bubbles stack up above the prompt box; old ones are evicted.
//! - input is locked while the assistant answers.
//! - tab drops focus from the prompt; the plugin takes it back next frame.
//! - f5 retries a failed warm-up (only with `allow_degraded_input: false`).
//!
//! env: LLM_BASE_URL, OPENAI_API_KEY, LLM_MODEL, CHATBOT_CONFIG (json path).

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy_chatbot::{
    Backend, ChatBotPlugin, ChatConfig, ChatContainer, ChatSession, LLMBackend, LLMBuilder, LLMProvider,
    LlmBackend, PromptEdited, PromptFocus, PromptInput, ReassertFocusEvt, ResponseCompletedEvt,
    ResponseErrorEvt, RetryWarmup, Speech, SpeechSink, SubmitPrompt, WarmupFailedEvt,
};
use std::sync::Arc;

// ---------------------- helpers: openai base url ----------------------

fn normalize_oai_base(base: &str) -> String {
    // provider requires base to include `/v1` (this avoids 404s on chat endpoints).
    let b = base.trim_end_matches('/');
    if b.ends_with("/v1") {
        format!("{}/", b)
    } else {
        format!("{}/v1/", b)
    }
}

const SYSTEM_PROMPT: &str = "you are a friendly assistant living in a chat bubble ui. keep answers short.";

fn build_provider(base_url: &str, api_key: &str, model: &str) -> Arc<dyn LLMProvider> {
    info!(
        target: "chat_demo",
        "build_provider: base_url='{}', model='{}', key_present={}",
        base_url, model, !api_key.is_empty()
    );

    let mut b = LLMBuilder::new()
        .backend(LLMBackend::OpenAI) // openai-compatible
        .base_url(normalize_oai_base(base_url))
        .model(model)
        .system(SYSTEM_PROMPT)
        // a configured warm-up prompt also lands in this window
        .sliding_window_memory(16);
    if !api_key.is_empty() {
        b = b.api_key(api_key);
    }
    b.build().expect("build provider").into()
}

/// stands in for a tts engine.
struct LogSpeech;

impl SpeechSink for LogSpeech {
    fn speak(&self, text: &str) {
        info!(target: "chat_demo", "(tts) {}", text);
    }
}

// ---------------------- ui state ----------------------

#[derive(Resource, Default)]
struct PromptBuf(String);

/// frames the prompt ignores typing after a focus reassert.
#[derive(Resource, Default)]
struct InputLock(u8);

#[derive(Component)]
struct PromptText;

// ---------------------- main ----------------------

fn main() {
    let base_url =
        std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    let config = match std::env::var("CHATBOT_CONFIG") {
        Ok(path) => ChatConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("ignoring {path}: {e}");
            ChatConfig::default()
        }),
        Err(_) => ChatConfig::default(),
    };

    let mut backend = LlmBackend::new(build_provider(&base_url, &api_key, &model)).streaming(config.stream);
    if let Some(p) = &config.warmup_prompt {
        backend = backend.warmup_prompt(p.clone());
    }

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(config)
        .insert_resource(Backend(Arc::new(backend)))
        .insert_resource(Speech(Arc::new(LogSpeech)))
        .init_resource::<PromptBuf>()
        .init_resource::<InputLock>()
        .add_plugins(DefaultPlugins)
        .add_plugins(ChatBotPlugin)
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (handle_text_input, refresh_prompt_text)
                .chain()
                .before(bevy_chatbot::ChatSet::Drain),
        )
        .add_systems(
            Update,
            (on_reassert_focus, on_done, on_error, on_warmup_failed).after(bevy_chatbot::ChatSet::Sync),
        )
        .run();
}

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands, session: Res<ChatSession>) {
    commands.spawn(Camera2d);

    let cfg = session.controller().config().clone();
    let prompt_height = cfg.input_lines as f32 * cfg.font_size * 1.4 + 2.0 * cfg.text_padding;

    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            flex_direction: FlexDirection::Column,
            padding: UiRect::all(Val::Px(12.0)),
            ..default()
        })
        .with_children(|p| {
            // transcript area; bubbles are absolutely positioned inside
            p.spawn((
                ChatContainer,
                Node {
                    width: Val::Percent(100.0),
                    flex_grow: 1.0,
                    overflow: Overflow::clip(),
                    ..default()
                },
                BackgroundColor(Color::NONE),
            ));

            p.spawn((
                PromptInput,
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Px(prompt_height),
                    padding: UiRect::all(Val::Px(cfg.text_padding)),
                    ..default()
                },
                BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
            ))
            .with_children(|b| {
                b.spawn((
                    Text::new(""),
                    TextFont { font_size: cfg.font_size, ..default() },
                    TextColor(Color::WHITE),
                    PromptText,
                ));
            });
        });
}

// ---------------------- input ----------------------

fn handle_text_input(
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    mut prompt: ResMut<PromptBuf>,
    mut focus: ResMut<PromptFocus>,
    mut lock: ResMut<InputLock>,
    mut ev_edit: EventWriter<PromptEdited>,
    mut ev_submit: EventWriter<SubmitPrompt>,
    mut ev_retry: EventWriter<RetryWarmup>,
) {
    if keys.just_pressed(KeyCode::F5) {
        ev_retry.write(RetryWarmup);
    }
    if lock.0 > 0 {
        lock.0 -= 1;
        ev_kbd.clear();
        return;
    }

    // simulate clicking away from the prompt
    if keys.just_pressed(KeyCode::Tab) {
        focus.focused = false;
        info!(target: "chat_demo", "prompt lost focus");
    }
    if !focus.focused {
        ev_kbd.clear();
        return;
    }

    let mut changed = false;
    for ev in ev_kbd.read() {
        if ev.state.is_pressed()
            && let Some(txt) = &ev.text {
                let s = txt.replace(['\r', '\n', '\t'], "");
                if !s.is_empty() {
                    prompt.0.push_str(&s);
                    changed = true;
                }
        }
    }
    if keys.just_pressed(KeyCode::Backspace) {
        changed |= prompt.0.pop().is_some();
    }

    let enter = keys.just_pressed(KeyCode::Enter);
    if changed || enter {
        ev_edit.write(PromptEdited { text: prompt.0.clone(), submit_key_held: keys.pressed(KeyCode::Enter) });
    }
    if enter {
        ev_submit.write(SubmitPrompt::Pending);
    }
}

fn refresh_prompt_text(
    prompt: Res<PromptBuf>,
    session: Res<ChatSession>,
    focus: Res<PromptFocus>,
    mut q_prompt: Query<&mut Text, With<PromptText>>,
) {
    let controller = session.controller();
    let Ok(mut t) = q_prompt.single_mut() else {
        return;
    };
    let caret = if focus.focused { " |" } else { "" };
    let body = if controller.gate().is_blocked() && prompt.0.is_empty() {
        controller.input_placeholder().to_string()
    } else if prompt.0.is_empty() {
        format!("{}{}", controller.input_placeholder(), caret)
    } else {
        format!("{}{}", prompt.0, caret)
    };
    if t.0 != body {
        t.0 = body;
    }
}

// ---------------------- chat events ----------------------

fn on_reassert_focus(mut ev: EventReader<ReassertFocusEvt>, mut lock: ResMut<InputLock>, mut prompt: ResMut<PromptBuf>, session: Res<ChatSession>) {
    if ev.read().last().is_some() {
        // one frame non-interactable, then typing resumes at the end
        lock.0 = 1;
        // the controller clears its pending text on accept/warm-up; follow it
        if session.controller().gate().pending_text().is_empty() && !prompt.0.is_empty() {
            prompt.0.clear();
        }
    }
}

fn on_done(mut ev: EventReader<ResponseCompletedEvt>) {
    for ResponseCompletedEvt { text } in ev.read() {
        info!(target: "chat_demo", "assistant: {}", text);
    }
}

fn on_error(mut ev: EventReader<ResponseErrorEvt>) {
    for ResponseErrorEvt { error } in ev.read() {
        error!(target: "chat_demo", "chat error: {}", error);
    }
}

fn on_warmup_failed(mut ev: EventReader<WarmupFailedEvt>) {
    for WarmupFailedEvt { error } in ev.read() {
        error!(target: "chat_demo", "backend unavailable: {}", error);
    }
}
