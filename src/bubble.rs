//! transcript bubbles and the capability traits a renderer implements.
//!
//! the core never touches a concrete ui toolkit. a renderer hands out
//! `BubbleSurface` handles through `SceneSurface::create_bubble`; the bubble
//! keeps its own copy of text + measured size so layout never reads a stale
//! measurement.

use bevy::math::Vec2;
use serde::Deserialize;

/// opaque, stable id for a bubble. never reused within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BubbleId(pub u64);

/// who authored a bubble.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// which edge of the container a bubble hugs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Left,
    Right,
}

/// style descriptor handed to the renderer when a bubble is created.
#[derive(Clone, Debug, PartialEq)]
pub struct BubbleStyle {
    pub bubble_color: [u8; 4],
    pub font_color: [u8; 4],
    pub font_size: f32,
    /// max outer width; text wraps inside `width - 2 * padding`.
    pub width: f32,
    pub padding: f32,
    pub spacing: f32,
    pub side: Side,
}

impl Default for BubbleStyle {
    fn default() -> Self {
        Self {
            bubble_color: [81, 164, 81, 255],
            font_color: [255, 255, 255, 255],
            font_size: 16.0,
            width: 600.0,
            padding: 10.0,
            spacing: 10.0,
            side: Side::Left,
        }
    }
}

/// a renderer-side handle for one bubble.
pub trait BubbleSurface: Send + Sync {
    fn set_text(&mut self, text: &str);
    /// size for the text most recently passed to `set_text` (or creation).
    fn measured_size(&self) -> Vec2;
    /// vertical offset from the container bottom.
    fn place(&mut self, offset: f32);
    fn destroy(&mut self);
}

/// factory for bubble handles.
pub trait SceneSurface {
    fn create_bubble(
        &mut self,
        id: BubbleId,
        role: Role,
        style: &BubbleStyle,
        text: &str,
    ) -> Box<dyn BubbleSurface>;
}

/// monospace-ish text measure used by surfaces that can't query real glyph
/// layout synchronously.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMetrics {
    /// glyph advance as a fraction of font size.
    pub char_width: f32,
    /// line height as a fraction of font size.
    pub line_height: f32,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self { char_width: 0.6, line_height: 1.4 }
    }
}

impl TextMetrics {
    /// wrapped size of `text` inside a bubble with `style`, padding included.
    pub fn measure(&self, text: &str, style: &BubbleStyle) -> Vec2 {
        let glyph = (style.font_size * self.char_width).max(1.0);
        let inner = (style.width - 2.0 * style.padding).max(glyph);
        let per_line = ((inner / glyph).floor() as usize).max(1);

        let mut lines = 0usize;
        let mut widest = 0usize;
        for line in text.split('\n') {
            let n = line.chars().count();
            if n == 0 {
                lines += 1;
                continue;
            }
            lines += n.div_ceil(per_line);
            widest = widest.max(n.min(per_line));
        }
        let lines = lines.max(1);

        Vec2::new(
            widest as f32 * glyph + 2.0 * style.padding,
            lines as f32 * style.font_size * self.line_height + 2.0 * style.padding,
        )
    }
}

/// one transcript entry.
pub struct Bubble {
    id: BubbleId,
    role: Role,
    text: String,
    size: Vec2,
    anchored_offset: f32,
    placed: bool,
    surface: Box<dyn BubbleSurface>,
}

impl Bubble {
    pub fn new(id: BubbleId, role: Role, text: impl Into<String>, surface: Box<dyn BubbleSurface>) -> Self {
        let size = surface.measured_size();
        Self { id, role, text: text.into(), size, anchored_offset: 0.0, placed: false, surface }
    }

    pub fn id(&self) -> BubbleId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn anchored_offset(&self) -> f32 {
        self.anchored_offset
    }

    /// replaces the text and re-measures. returns true when the size changed.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text == self.text {
            return false;
        }
        self.surface.set_text(&text);
        self.text = text;
        let size = self.surface.measured_size();
        let changed = size != self.size;
        self.size = size;
        changed
    }

    pub(crate) fn place(&mut self, offset: f32) {
        if !self.placed || offset != self.anchored_offset {
            self.anchored_offset = offset;
            self.placed = true;
            self.surface.place(offset);
        }
    }

    pub(crate) fn destroy(mut self) {
        self.surface.destroy();
    }
}

impl std::fmt::Debug for Bubble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bubble")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("text", &self.text)
            .field("size", &self.size)
            .field("anchored_offset", &self.anchored_offset)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemScene;
    use super::*;
    use pretty_assertions::assert_eq;

    // 10px glyphs, 100px inner width -> 10 chars per line
    const METRICS: TextMetrics = TextMetrics { char_width: 0.5, line_height: 1.5 };

    fn narrow() -> BubbleStyle {
        BubbleStyle { font_size: 20.0, width: 120.0, padding: 10.0, ..Default::default() }
    }

    #[test]
    fn measure_wraps_long_lines() {
        let m = METRICS;
        let style = narrow();
        let one = m.measure("short", &style);
        let three = m.measure("abcdefghijabcdefghijabc", &style);
        let line_h = style.font_size * m.line_height;
        assert!((three.y - one.y - 2.0 * line_h).abs() < 1e-3);
        assert!((three.x - style.width).abs() < 1e-3, "wrapped text fills the bubble");
    }

    #[test]
    fn measure_counts_blank_lines() {
        let m = METRICS;
        let style = narrow();
        let a = m.measure("a", &style);
        let b = m.measure("a\n\nb", &style);
        let line_h = style.font_size * m.line_height;
        assert!((b.y - a.y - 2.0 * line_h).abs() < 1e-3);
    }

    #[test]
    fn set_text_tracks_size() {
        let mut scene = MemScene::default();
        let style = narrow();
        let surface = scene.create_bubble(BubbleId(1), Role::Assistant, &style, "...");
        let mut b = Bubble::new(BubbleId(1), Role::Assistant, "...", surface);
        let before = b.size();

        assert!(!b.set_text("..."), "same text is not a resize");
        assert!(b.set_text("a reply that is long enough to wrap twice"));
        assert!(b.size().y > before.y);
        assert_eq!(b.text(), "a reply that is long enough to wrap twice");
        assert_eq!(b.size(), TextMetrics::default().measure(b.text(), &style));
    }
}
