//! bevy ui backing for bubbles.
//!
//! `UiSurface` never touches the world directly: bubble handles measure text
//! synchronously and queue `SceneOp`s, which `apply_scene_ops` turns into
//! absolutely positioned `Node + Text` entities under the `ChatContainer`.

use crate::bubble::{BubbleId, BubbleStyle, BubbleSurface, Role, SceneSurface, Side, TextMetrics};
use crate::transcript::Viewport;
use bevy::prelude::*;
use flume::{Receiver, Sender};
use std::collections::HashMap;

/// marks the node bubbles are parented to; its height bounds the view.
#[derive(Component, Debug, Default)]
pub struct ChatContainer;

/// marks the prompt input box. when it is a child of the container,
/// bubbles stack from its top edge; otherwise from the container bottom.
#[derive(Component, Debug, Default)]
pub struct PromptInput;

#[derive(Component, Clone, Copy, Debug)]
pub struct BubbleNode {
    pub id: BubbleId,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub enum SceneOp {
    Spawn { id: BubbleId, role: Role, style: BubbleStyle, text: String },
    SetText { id: BubbleId, text: String },
    Place { id: BubbleId, offset: f32 },
    Despawn { id: BubbleId },
}

/// same-thread queue between bubble handles and the world.
#[derive(Resource, Clone)]
pub struct SceneOutbox {
    tx: Sender<SceneOp>,
    rx: Receiver<SceneOp>,
}

impl Default for SceneOutbox {
    fn default() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }
}

impl SceneOutbox {
    pub fn surface(&self) -> UiSurface {
        UiSurface { tx: self.tx.clone(), metrics: TextMetrics::default() }
    }
}

pub struct UiSurface {
    tx: Sender<SceneOp>,
    metrics: TextMetrics,
}

impl SceneSurface for UiSurface {
    fn create_bubble(
        &mut self,
        id: BubbleId,
        role: Role,
        style: &BubbleStyle,
        text: &str,
    ) -> Box<dyn BubbleSurface> {
        let _ = self.tx.send(SceneOp::Spawn { id, role, style: style.clone(), text: text.to_string() });
        Box::new(UiBubble {
            id,
            size: self.metrics.measure(text, style),
            style: style.clone(),
            metrics: self.metrics,
            tx: self.tx.clone(),
        })
    }
}

struct UiBubble {
    id: BubbleId,
    style: BubbleStyle,
    size: Vec2,
    metrics: TextMetrics,
    tx: Sender<SceneOp>,
}

impl BubbleSurface for UiBubble {
    fn set_text(&mut self, text: &str) {
        self.size = self.metrics.measure(text, &self.style);
        let _ = self.tx.send(SceneOp::SetText { id: self.id, text: text.to_string() });
    }

    fn measured_size(&self) -> Vec2 {
        self.size
    }

    fn place(&mut self, offset: f32) {
        let _ = self.tx.send(SceneOp::Place { id: self.id, offset });
    }

    fn destroy(&mut self) {
        let _ = self.tx.send(SceneOp::Despawn { id: self.id });
    }
}

struct SpawnedBubble {
    entity: Entity,
    style: BubbleStyle,
}

/// bubble id -> live entity.
#[derive(Resource, Default)]
pub struct BubbleEntities(HashMap<BubbleId, SpawnedBubble>);

impl BubbleEntities {
    pub fn entity(&self, id: BubbleId) -> Option<Entity> {
        self.0.get(&id).map(|b| b.entity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn rgba(c: [u8; 4]) -> Color {
    Color::srgba_u8(c[0], c[1], c[2], c[3])
}

/// absolute node for a bubble sitting `offset` px above the container bottom.
pub fn bubble_node(style: &BubbleStyle, offset: f32) -> Node {
    let (left, right) = match style.side {
        Side::Left => (Val::Px(0.0), Val::Auto),
        Side::Right => (Val::Auto, Val::Px(0.0)),
    };
    Node {
        position_type: PositionType::Absolute,
        bottom: Val::Px(offset),
        left,
        right,
        max_width: Val::Px(style.width),
        padding: UiRect::all(Val::Px(style.padding)),
        ..default()
    }
}

/// applies queued bubble ops in order.
pub fn apply_scene_ops(
    mut commands: Commands,
    outbox: Res<SceneOutbox>,
    mut spawned: ResMut<BubbleEntities>,
    q_container: Query<Entity, With<ChatContainer>>,
) {
    let container = q_container.iter().next();
    for op in outbox.rx.try_iter() {
        match op {
            SceneOp::Spawn { id, role, style, text } => {
                let entity = commands
                    .spawn((
                        BubbleNode { id, role },
                        bubble_node(&style, 0.0),
                        BackgroundColor(rgba(style.bubble_color)),
                        Text::new(text),
                        TextFont { font_size: style.font_size, ..default() },
                        TextColor(rgba(style.font_color)),
                    ))
                    .id();
                if let Some(c) = container {
                    commands.entity(c).add_child(entity);
                }
                spawned.0.insert(id, SpawnedBubble { entity, style });
            }
            SceneOp::SetText { id, text } => {
                if let Some(b) = spawned.0.get(&id) {
                    commands.entity(b.entity).try_insert(Text::new(text));
                }
            }
            SceneOp::Place { id, offset } => {
                if let Some(b) = spawned.0.get(&id) {
                    commands.entity(b.entity).try_insert(bubble_node(&b.style, offset));
                }
            }
            SceneOp::Despawn { id } => {
                if let Some(b) = spawned.0.remove(&id) {
                    commands.entity(b.entity).despawn();
                }
            }
        }
    }
}

/// where the transcript is anchored; refreshed from the ui every frame when
/// a `ChatContainer` / `PromptInput` exist, otherwise left as configured.
#[derive(Resource, Clone, Copy, Debug)]
pub struct ChatViewport(pub Viewport);

impl Default for ChatViewport {
    /// unbounded (nothing evicts) until a container reports its height.
    fn default() -> Self {
        Self(Viewport { anchor_offset: 0.0, visible_height: f32::INFINITY })
    }
}

/// `prompt` is the (height, bottom inset) of a prompt box sharing the
/// container's coordinate space.
fn anchor_offset(prompt: Option<(f32, f32)>, spacing: f32) -> f32 {
    prompt.map_or(0.0, |(height, bottom)| height + bottom) + spacing
}

pub fn measure_viewport(
    mut viewport: ResMut<ChatViewport>,
    session: Res<crate::ChatSession>,
    q_container: Query<(Entity, &ComputedNode), With<ChatContainer>>,
    q_input: Query<(&ComputedNode, &Node, Option<&ChildOf>), With<PromptInput>>,
) {
    let mut next = viewport.0;
    let mut container = None;
    if let Ok((entity, c)) = q_container.single() {
        container = Some(entity);
        let h = c.size().y * c.inverse_scale_factor();
        if h > 0.0 {
            next.visible_height = h;
        }
    }

    // a prompt outside the container doesn't push bubbles up
    let prompt = q_input
        .single()
        .ok()
        .filter(|(_, _, parent)| container.is_some() && parent.map(|p| p.parent()) == container)
        .map(|(c, node, _)| {
            let bottom = match node.bottom {
                Val::Px(v) => v,
                _ => 0.0,
            };
            (c.size().y * c.inverse_scale_factor(), bottom)
        });
    let spacing = session.controller().config().bubble_spacing;
    next.anchor_offset = anchor_offset(prompt, spacing);

    if next != viewport.0 {
        viewport.0 = next;
    }
}
