//! transcript store + bottom-up layout and eviction.
//!
//! bubbles stack upward from the input box. anything whose bottom edge sits
//! above the visible height can only be reached by scrolling; those form a
//! contiguous prefix of `entries` and get evicted once per tick.

use crate::bubble::{Bubble, BubbleId};
use bevy::log::{debug, warn};

/// a boundary computed by `recompute_layout`, tagged with the append
/// generation it was computed against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingEviction {
    boundary: usize,
    generation: u64,
}

/// where the transcript is anchored and how much of it is on screen.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Viewport {
    /// y of the newest bubble's bottom edge (top of the input box + spacing).
    pub anchor_offset: f32,
    pub visible_height: f32,
}

#[derive(Debug)]
pub struct Transcript {
    entries: Vec<Bubble>,
    spacing: f32,
    eviction: Option<PendingEviction>,
    generation: u64,
    layout_dirty: bool,
    last_viewport: Option<Viewport>,
}

impl Transcript {
    pub fn new(spacing: f32) -> Self {
        Self {
            entries: Vec::new(),
            spacing,
            eviction: None,
            generation: 0,
            layout_dirty: false,
            last_viewport: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Bubble] {
        &self.entries
    }

    /// boundary from the last recompute, if it is still valid.
    pub fn eviction_boundary(&self) -> Option<usize> {
        self.eviction
            .filter(|p| p.generation == self.generation)
            .map(|p| p.boundary)
    }

    /// true when a size change or append happened since the last recompute.
    pub fn needs_layout(&self) -> bool {
        self.layout_dirty
    }

    /// adds to the end. any pending eviction was computed against the old
    /// indices and is dropped; the next recompute produces a fresh one.
    pub fn append(&mut self, bubble: Bubble) {
        self.entries.push(bubble);
        self.generation += 1;
        if self.eviction.take().is_some() {
            debug!(target: "bevy_chatbot", "append invalidated pending eviction");
        }
        self.layout_dirty = true;
    }

    /// writes text into a bubble. returns false when the bubble is gone
    /// (evicted or never existed).
    pub fn set_text(&mut self, id: BubbleId, text: impl Into<String>) -> bool {
        let Some(bubble) = self.entries.iter_mut().rev().find(|b| b.id() == id) else {
            return false;
        };
        if bubble.set_text(text) {
            self.layout_dirty = true;
        }
        true
    }

    /// recompute only when something moved since the last pass.
    pub fn layout_if_needed(&mut self, viewport: Viewport) -> Option<usize> {
        if self.layout_dirty || self.last_viewport != Some(viewport) {
            self.recompute_layout(viewport)
        } else {
            self.eviction_boundary()
        }
    }

    /// walks newest -> oldest assigning offsets; records the first index whose
    /// offset is above the visible height. everything at or before it is off
    /// screen.
    pub fn recompute_layout(&mut self, viewport: Viewport) -> Option<usize> {
        let mut y = viewport.anchor_offset;
        let mut boundary = None;
        for (i, bubble) in self.entries.iter_mut().enumerate().rev() {
            bubble.place(y);
            if y > viewport.visible_height && boundary.is_none() {
                boundary = Some(i);
            }
            y += bubble.size().y + self.spacing;
        }

        self.layout_dirty = false;
        self.last_viewport = Some(viewport);
        self.eviction = boundary.map(|boundary| PendingEviction { boundary, generation: self.generation });
        boundary
    }

    /// destroys `[0, boundary]`. out of range boundaries are ignored.
    pub fn evict(&mut self, boundary: usize) -> usize {
        if boundary >= self.entries.len() {
            warn!(target: "bevy_chatbot",
                "evict: boundary {} out of range (len={}); skipping", boundary, self.entries.len()
            );
            return 0;
        }
        self.eviction = None;
        let removed: Vec<Bubble> = self.entries.drain(..=boundary).collect();
        let n = removed.len();
        for bubble in removed {
            bubble.destroy();
        }
        debug!(target: "bevy_chatbot", "evicted {} bubble(s), {} remain", n, self.entries.len());
        n
    }

    /// consumes the pending boundary. a boundary computed before the latest
    /// append is discarded and a recompute is requested instead.
    pub fn evict_pending(&mut self) -> usize {
        let Some(pending) = self.eviction.take() else {
            return 0;
        };
        if pending.generation != self.generation {
            self.layout_dirty = true;
            return 0;
        }
        self.evict(pending.boundary)
    }

    /// destroys everything.
    pub fn clear(&mut self) {
        for bubble in self.entries.drain(..) {
            bubble.destroy();
        }
        self.eviction = None;
        self.generation += 1;
        self.layout_dirty = false;
    }
}
