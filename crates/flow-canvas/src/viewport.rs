//! Viewport transform and its persistence
//!
//! A canvas point `p` is drawn at `p * scale + translate` in screen space.
//! Scale changes from zoom gestures animate; pans apply instantly so the
//! view tracks the pointer without lag. The view is persisted only when a
//! gesture ends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::constants::{defaults, paths};
use crate::error::{CanvasError, Result};
use crate::geometry::{Point, Rect};

/// Stored form of a viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedView {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl PersistedView {
    pub fn is_finite(&self) -> bool {
        self.scale.is_finite() && self.translate_x.is_finite() && self.translate_y.is_finite()
    }
}

/// Client-local storage of viewports, keyed per process group
pub trait ViewportStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<PersistedView>>;
    fn save(&self, key: &str, view: &PersistedView) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryViewportStore {
    views: Mutex<HashMap<String, PersistedView>>,
}

impl MemoryViewportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewportStore for MemoryViewportStore {
    fn load(&self, key: &str) -> Result<Option<PersistedView>> {
        Ok(self.views.lock().get(key).copied())
    }

    fn save(&self, key: &str, view: &PersistedView) -> Result<()> {
        self.views.lock().insert(key.to_string(), *view);
        Ok(())
    }
}

/// Viewports stored as one JSON object on disk
#[derive(Debug, Clone)]
pub struct FileViewportStore {
    path: PathBuf,
}

impl FileViewportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the platform's local data directory
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_local_dir().ok_or_else(|| {
            CanvasError::InvalidState("No local data directory on this platform".to_string())
        })?;
        Ok(Self::new(base.join(paths::DATA_DIR).join(paths::VIEWS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, PersistedView>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

impl ViewportStore for FileViewportStore {
    fn load(&self, key: &str) -> Result<Option<PersistedView>> {
        Ok(self.read_all()?.get(key).copied())
    }

    fn save(&self, key: &str, view: &PersistedView) -> Result<()> {
        let mut views = self.read_all()?;
        views.insert(key.to_string(), *view);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&views)?;
        std::fs::write(&self.path, json)?;
        log::debug!("Saved viewport '{}' to {:?}", key, self.path);
        Ok(())
    }
}

/// How the last change should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    Instant,
    Smooth,
}

/// Scale and translation of the canvas within its container
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    scale: f64,
    translate: Point,
    width: f64,
    height: f64,
    min_scale: f64,
    max_scale: f64,
    zoom_step: f64,
    render_threshold: f64,
    fit_padding: f64,
    transition: Transition,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(&CanvasConfig::default())
    }
}

impl Viewport {
    pub fn new(config: &CanvasConfig) -> Self {
        Self {
            scale: 1.0,
            translate: Point::default(),
            width: defaults::CONTAINER_WIDTH,
            height: defaults::CONTAINER_HEIGHT,
            min_scale: config.min_scale.min(config.max_scale),
            max_scale: config.max_scale.max(config.min_scale),
            zoom_step: config.zoom_step,
            render_threshold: config.render_threshold,
            fit_padding: config.fit_padding,
            transition: Transition::Instant,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translate(&self) -> Point {
        self.translate
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn container(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn set_container(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    /// Canvas coordinates of a screen point
    pub fn to_canvas(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.translate.x) / self.scale,
            (screen.y - self.translate.y) / self.scale,
        )
    }

    pub fn to_screen(&self, canvas: Point) -> Point {
        Point::new(
            canvas.x * self.scale + self.translate.x,
            canvas.y * self.scale + self.translate.y,
        )
    }

    /// Multiply the scale by `factor`, keeping the canvas point under `around` fixed
    pub fn zoom_by(&mut self, factor: f64, around: Point) {
        let anchor = self.to_canvas(around);
        self.scale = self.clamp_scale(self.scale * factor);
        self.translate = Point::new(
            around.x - anchor.x * self.scale,
            around.y - anchor.y * self.scale,
        );
        self.transition = Transition::Smooth;
    }

    pub fn zoom_in(&mut self) {
        self.zoom_by(self.zoom_step, self.screen_center());
    }

    pub fn zoom_out(&mut self) {
        self.zoom_by(1.0 / self.zoom_step, self.screen_center());
    }

    /// Shift by a screen-space delta
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.translate = self.translate.offset(dx, dy);
        self.transition = Transition::Instant;
    }

    /// Scale so `bounds` fits the container, never above 1, and center it
    ///
    /// Without bounds (an empty graph) the view resets to the origin.
    pub fn fit(&mut self, bounds: Option<Rect>) {
        let Some(bounds) = bounds else {
            self.scale = self.clamp_scale(1.0);
            self.translate = Point::default();
            self.transition = Transition::Instant;
            return;
        };

        let available_width = (self.width - 2.0 * self.fit_padding).max(1.0);
        let available_height = (self.height - 2.0 * self.fit_padding).max(1.0);
        let scale = if bounds.width > 0.0 && bounds.height > 0.0 {
            (available_width / bounds.width).min(available_height / bounds.height)
        } else {
            1.0
        };

        self.scale = self.clamp_scale(scale.min(1.0));
        self.center_on(bounds.center());
        self.transition = Transition::Smooth;
    }

    /// Scale 1, centered on `selection` or on the current view center
    pub fn actual_size(&mut self, selection: Option<Rect>) {
        let center = selection
            .map(|b| b.center())
            .unwrap_or_else(|| self.to_canvas(self.screen_center()));
        self.scale = self.clamp_scale(1.0);
        self.center_on(center);
        self.transition = Transition::Smooth;
    }

    /// Canvas region currently on screen
    pub fn visible_region(&self) -> Rect {
        let origin = self.to_canvas(Point::default());
        Rect::at(origin, self.width / self.scale, self.height / self.scale)
    }

    /// Visible region grown by one screen in every direction
    pub fn culling_window(&self) -> Rect {
        let visible = self.visible_region();
        visible.expand(visible.width, visible.height)
    }

    /// Whether entities render at the current scale
    pub fn above_render_threshold(&self) -> bool {
        self.scale >= self.render_threshold
    }

    pub fn persisted(&self) -> PersistedView {
        PersistedView {
            scale: self.scale,
            translate_x: self.translate.x,
            translate_y: self.translate.y,
        }
    }

    /// Apply a stored view; returns false when it is unusable
    pub fn apply(&mut self, view: &PersistedView) -> bool {
        if !view.is_finite() || view.scale <= 0.0 {
            return false;
        }
        self.scale = self.clamp_scale(view.scale);
        self.translate = Point::new(view.translate_x, view.translate_y);
        self.transition = Transition::Instant;
        true
    }

    /// Save the view at the end of a gesture
    pub fn persist(&self, store: &dyn ViewportStore, key: &str) -> Result<()> {
        store.save(key, &self.persisted())
    }

    /// Restore a stored view, falling back to `fit(bounds)`
    ///
    /// Returns true when the stored view was used.
    pub fn restore(&mut self, store: &dyn ViewportStore, key: &str, bounds: Option<Rect>) -> bool {
        let stored = match store.load(key) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Failed to load viewport '{}': {}", key, e);
                None
            }
        };

        if let Some(view) = stored {
            if self.apply(&view) {
                return true;
            }
            log::debug!("Ignoring unusable viewport '{}'", key);
        }
        self.fit(bounds);
        false
    }

    fn screen_center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    fn center_on(&mut self, canvas: Point) {
        let center = self.screen_center();
        self.translate = Point::new(
            center.x - canvas.x * self.scale,
            center.y - canvas.y * self.scale,
        );
    }

    fn clamp_scale(&self, scale: f64) -> f64 {
        scale.max(self.min_scale).min(self.max_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn viewport(width: f64, height: f64) -> Viewport {
        let mut viewport = Viewport::default();
        viewport.set_container(width, height);
        viewport
    }

    #[test]
    fn test_zoom_clamps_and_is_smooth() {
        let mut v = viewport(1000.0, 800.0);
        v.zoom_by(100.0, Point::new(500.0, 400.0));
        assert_eq!(v.scale(), defaults::MAX_SCALE);
        assert_eq!(v.transition(), Transition::Smooth);

        v.zoom_by(0.0001, Point::new(500.0, 400.0));
        assert_eq!(v.scale(), defaults::MIN_SCALE);

        v.pan_by(10.0, 0.0);
        assert_eq!(v.transition(), Transition::Instant);
    }

    #[test]
    fn test_inverted_scale_bounds_are_reordered() {
        let config = CanvasConfig {
            min_scale: 4.0,
            max_scale: 0.5,
            ..CanvasConfig::default()
        };
        let mut v = Viewport::new(&config);
        v.zoom_by(100.0, Point::new(0.0, 0.0));
        assert_eq!(v.scale(), 4.0);
        v.zoom_by(0.0001, Point::new(0.0, 0.0));
        assert_eq!(v.scale(), 0.5);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut v = viewport(1000.0, 800.0);
        v.pan_by(40.0, -20.0);
        let around = Point::new(300.0, 200.0);
        let fixed = v.to_canvas(around);

        v.zoom_by(2.0, around);
        let moved = v.to_canvas(around);
        assert!((fixed.x - moved.x).abs() < EPSILON);
        assert!((fixed.y - moved.y).abs() < EPSILON);
        assert_eq!(v.scale(), 2.0);
    }

    #[test]
    fn test_fit_never_upscales() {
        let mut v = viewport(1000.0, 800.0);
        v.fit(Some(Rect::new(100.0, 100.0, 200.0, 100.0)));
        assert_eq!(v.scale(), 1.0);
        // Bounds center (200, 150) lands on the screen center
        assert_eq!(v.to_screen(Point::new(200.0, 150.0)), Point::new(500.0, 400.0));
    }

    #[test]
    fn test_fit_shrinks_large_graph() {
        let mut v = viewport(1040.0, 840.0);
        v.fit(Some(Rect::new(0.0, 0.0, 2000.0, 1000.0)));
        // (1040 - 40) / 2000 = 0.5 beats (840 - 40) / 1000 = 0.8
        assert!((v.scale() - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_actual_size_centers_selection() {
        let mut v = viewport(1000.0, 800.0);
        v.zoom_by(0.5, Point::new(0.0, 0.0));
        v.actual_size(Some(Rect::new(1000.0, 1000.0, 100.0, 100.0)));
        assert_eq!(v.scale(), 1.0);
        assert_eq!(v.to_screen(Point::new(1050.0, 1050.0)), Point::new(500.0, 400.0));
    }

    #[test]
    fn test_actual_size_keeps_view_center() {
        let mut v = viewport(1000.0, 800.0);
        v.pan_by(-200.0, -100.0);
        v.zoom_by(2.0, Point::new(500.0, 400.0));
        let center = v.to_canvas(Point::new(500.0, 400.0));

        v.actual_size(None);
        let after = v.to_canvas(Point::new(500.0, 400.0));
        assert!((center.x - after.x).abs() < EPSILON);
        assert!((center.y - after.y).abs() < EPSILON);
    }

    #[test]
    fn test_culling_window_has_one_screen_margin() {
        let v = viewport(1000.0, 800.0);
        assert_eq!(v.culling_window(), Rect::new(-1000.0, -800.0, 3000.0, 2400.0));
    }

    #[test]
    fn test_render_threshold() {
        let mut v = viewport(1000.0, 800.0);
        assert!(v.above_render_threshold());
        v.zoom_by(0.5, Point::default());
        assert!(!v.above_render_threshold());
    }

    #[test]
    fn test_restore_falls_back_to_fit() {
        let store = MemoryViewportStore::new();
        let mut v = viewport(1000.0, 800.0);
        let bounds = Some(Rect::new(0.0, 0.0, 100.0, 100.0));

        assert!(!v.restore(&store, "flow-view-root", bounds));
        assert_eq!(v.to_screen(Point::new(50.0, 50.0)), Point::new(500.0, 400.0));

        store
            .save(
                "flow-view-root",
                &PersistedView {
                    scale: f64::NAN,
                    translate_x: 0.0,
                    translate_y: 0.0,
                },
            )
            .unwrap();
        assert!(!v.restore(&store, "flow-view-root", bounds));
    }

    #[test]
    fn test_persist_then_restore() {
        let store = MemoryViewportStore::new();
        let mut v = viewport(1000.0, 800.0);
        v.zoom_by(2.0, Point::new(100.0, 100.0));
        v.persist(&store, "flow-view-root").unwrap();

        let mut restored = viewport(1000.0, 800.0);
        assert!(restored.restore(&store, "flow-view-root", None));
        assert_eq!(restored.persisted(), v.persisted());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileViewportStore::new(dir.path().join("nested").join("views.json"));
        assert!(store.load("flow-view-root").unwrap().is_none());

        let view = PersistedView {
            scale: 0.75,
            translate_x: -12.0,
            translate_y: 40.0,
        };
        store.save("flow-view-root", &view).unwrap();
        store.save("flow-view-child", &view).unwrap();

        let json = std::fs::read_to_string(store.path()).unwrap();
        assert!(json.contains("translateX"));
        assert_eq!(store.load("flow-view-root").unwrap(), Some(view));
    }
}
