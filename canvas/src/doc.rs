//! Document model: board objects, their properties, and the in-memory store.
//!
//! This module defines the data types that describe what is on the canvas
//! (`BoardObject`, `ObjectKind`), a sparse-update type for incremental edits
//! (`PartialBoardObject`), a typed accessor for per-kind properties (`Props`),
//! and the runtime store that owns all live objects (`DocStore`).
//!
//! `DocStore` is the scene the history engine observes. UI-facing mutators
//! (`insert`, `apply_partial`, `select`, `remove`) notify registered
//! listeners; the snapshot-level [`Scene`] mutators used during replay go
//! through the same paths, so a paused recorder simply isn't listening.
//!
//! A serialized object is a flat JSON map: `{id, type, x, y, width, height,
//! rotation, z_index, ...props}`. Per-kind props sit next to the geometry so
//! a modify diff names exactly the keys that changed.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::HashMap;
use std::rc::Rc;

use history::action::ID_KEY;
use history::{ListenerId, Scene, SceneError, SceneEvent, SceneListener, SceneObject, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use history::ObjectId;

/// The kind of a board object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Axis-aligned rectangle.
    Rect,
    /// Ellipse inscribed within the bounding box.
    Ellipse,
    /// Diamond (rhombus) with vertices at bounding-box edge midpoints.
    Diamond,
    /// Straight line segment across the bounding box.
    Line,
    /// Directed arrow across the bounding box.
    Arrow,
    /// Freehand pen stroke; points live in `props.points`.
    Path,
    /// Text box; content lives in `props.text`.
    Text,
    /// Placed image; source lives in `props.src`.
    Image,
}

/// Axis-aligned box enclosing an object after rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// A board object as stored in the document and in history snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardObject {
    /// Stable identity. Absent until the object is first inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Shape type.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Left edge of the bounding box in world coordinates.
    #[serde(default)]
    pub x: f64,
    /// Top edge of the bounding box in world coordinates.
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    /// Clockwise rotation in degrees around the bounding-box center.
    #[serde(default)]
    pub rotation: f64,
    /// Stacking order; lower values are drawn beneath higher values.
    #[serde(default)]
    pub z_index: i64,
    /// Open-ended per-kind properties (fill, stroke, text, points, etc.).
    #[serde(flatten)]
    pub props: Map<String, Value>,
    /// Derived from geometry; refreshed after every write.
    #[serde(skip)]
    bounds: Bounds,
}

impl BoardObject {
    /// A new, id-less object with the given geometry and no props.
    #[must_use]
    pub fn new(kind: ObjectKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut obj = Self {
            id: None,
            kind,
            x,
            y,
            width,
            height,
            rotation: 0.0,
            z_index: 0,
            props: Map::new(),
            bounds: Bounds::default(),
        };
        obj.refresh_bounds();
        obj
    }

    /// Merge a JSON object into `props`. Non-object values are ignored.
    #[must_use]
    pub fn with_props(mut self, props: Value) -> Self {
        if let Value::Object(map) = props {
            self.props.extend(map);
        }
        self
    }

    /// Rebuild an object from its serialized form.
    ///
    /// # Errors
    ///
    /// [`SceneError::InvalidObject`] if the map is not a valid board object.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, SceneError> {
        let mut obj: Self = serde_json::from_value(Value::Object(snapshot.clone()))
            .map_err(|e| SceneError::InvalidObject(e.to_string()))?;
        obj.refresh_bounds();
        Ok(obj)
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Recompute the rotated bounding box from the current geometry.
    pub fn refresh_bounds(&mut self) {
        let cx = self.x + self.width / 2.0;
        let cy = self.y + self.height / 2.0;
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let half_w = (self.width / 2.0 * cos).abs() + (self.height / 2.0 * sin).abs();
        let half_h = (self.width / 2.0 * sin).abs() + (self.height / 2.0 * cos).abs();
        self.bounds = Bounds {
            min_x: cx - half_w,
            min_y: cy - half_h,
            max_x: cx + half_w,
            max_y: cy + half_h,
        };
    }

    /// Typed view of `props`.
    #[must_use]
    pub fn style(&self) -> Props<'_> {
        Props::new(&self.props)
    }
}

impl SceneObject for BoardObject {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }

    fn to_snapshot(&self) -> Snapshot {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Snapshot::new(),
        }
    }
}

/// Sparse update for a board object. Only present fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialBoardObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    /// Props keys to merge or remove (null values delete keys).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
}

/// Typed access to common props fields.
pub struct Props<'a> {
    value: &'a Map<String, Value>,
}

impl<'a> Props<'a> {
    #[must_use]
    pub fn new(value: &'a Map<String, Value>) -> Self {
        Self { value }
    }

    /// Fill color as a CSS color string. Defaults to `"#D94B4B"` when absent.
    #[must_use]
    pub fn fill(&self) -> &str {
        self.value.get("fill").and_then(Value::as_str).unwrap_or("#D94B4B")
    }

    /// Stroke color as a CSS color string. Defaults to `"#1F1A17"` when absent.
    #[must_use]
    pub fn stroke(&self) -> &str {
        self.value.get("stroke").and_then(Value::as_str).unwrap_or("#1F1A17")
    }

    /// Stroke width in world units. Defaults to `1.0` when absent.
    #[must_use]
    pub fn stroke_width(&self) -> f64 {
        self.value
            .get("stroke_width")
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
    }

    /// Text content. Empty string when absent.
    #[must_use]
    pub fn text(&self) -> &str {
        self.value.get("text").and_then(Value::as_str).unwrap_or("")
    }
}

/// In-memory store of board objects; the scene hosted by the editor.
#[derive(Default)]
pub struct DocStore {
    objects: HashMap<ObjectId, BoardObject>,
    listeners: Vec<(ListenerId, Rc<dyn SceneListener>)>,
    next_listener: ListenerId,
    next_local: u64,
    selected: Option<ObjectId>,
    render_requested: bool,
}

impl DocStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, notifying listeners first so they may assign its id.
    ///
    /// An object that is still id-less afterwards gets a local id. An existing
    /// object with the same id is replaced, and listeners see it removed
    /// before the new one is added. `null` props are dropped. Returns the id.
    pub fn insert(&mut self, mut obj: BoardObject) -> ObjectId {
        obj.props.retain(|_, v| !v.is_null());
        if let Some(existing) = obj.id.clone() {
            self.remove(&existing);
        }
        for (_, listener) in &self.listeners {
            listener.on_event(SceneEvent::Added(&mut obj));
        }
        let id = match obj.id.clone() {
            Some(id) => id,
            None => {
                self.next_local += 1;
                let id = format!("local_{}", self.next_local);
                obj.id = Some(id.clone());
                id
            }
        };
        obj.refresh_bounds();
        self.objects.insert(id.clone(), obj);
        self.render_requested = true;
        id
    }

    /// Remove an object by id, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<BoardObject> {
        let obj = self.objects.remove(id)?;
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        for (_, listener) in &self.listeners {
            listener.on_event(SceneEvent::Removed(&obj));
        }
        self.render_requested = true;
        Some(obj)
    }

    /// Return a reference to an object by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BoardObject> {
        self.objects.get(id)
    }

    /// Apply a partial update to an existing object and notify listeners.
    /// Returns false if the object doesn't exist or `props` is not an object.
    pub fn apply_partial(&mut self, id: &str, partial: &PartialBoardObject) -> bool {
        let Some(obj) = self.objects.get_mut(id) else {
            return false;
        };
        if partial.props.as_ref().is_some_and(|p| !p.is_object()) {
            return false;
        }
        if let Some(x) = partial.x {
            obj.x = x;
        }
        if let Some(y) = partial.y {
            obj.y = y;
        }
        if let Some(w) = partial.width {
            obj.width = w;
        }
        if let Some(h) = partial.height {
            obj.height = h;
        }
        if let Some(r) = partial.rotation {
            obj.rotation = r;
        }
        if let Some(z) = partial.z_index {
            obj.z_index = z;
        }
        if let Some(Value::Object(incoming)) = &partial.props {
            merge_props(&mut obj.props, incoming);
        }
        obj.refresh_bounds();

        let obj = &self.objects[id];
        for (_, listener) in &self.listeners {
            listener.on_event(SceneEvent::Modified(obj));
        }
        self.render_requested = true;
        true
    }

    /// Mark an object as selected and notify listeners.
    pub fn select(&mut self, id: &str) -> bool {
        let Some(obj) = self.objects.get(id) else {
            return false;
        };
        self.selected = Some(id.to_string());
        for (_, listener) in &self.listeners {
            listener.on_event(SceneEvent::Selected(obj));
        }
        true
    }

    #[must_use]
    pub fn selection(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Topmost object whose bounds contain the point.
    #[must_use]
    pub fn object_at(&self, x: f64, y: f64) -> Option<&BoardObject> {
        self.sorted_objects()
            .into_iter()
            .rev()
            .find(|obj| obj.bounds().contains(x, y))
    }

    /// Return all objects sorted by `(z_index, id)` for draw-order.
    #[must_use]
    pub fn sorted_objects(&self) -> Vec<&BoardObject> {
        let mut objs: Vec<&BoardObject> = self.objects.values().collect();
        objs.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        objs
    }

    /// Number of objects currently in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the store contains no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns whether a redraw was requested since the last call, and resets it.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_requested)
    }
}

impl Scene for DocStore {
    fn subscribe(&mut self, listener: Rc<dyn SceneListener>) -> ListenerId {
        self.next_listener += 1;
        self.listeners.push((self.next_listener, listener));
        self.next_listener
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn add_snapshot(&mut self, snapshot: &Snapshot) -> Result<ObjectId, SceneError> {
        if history::action::snapshot_id(snapshot).is_none() {
            return Err(SceneError::MissingField("id"));
        }
        let obj = BoardObject::from_snapshot(snapshot)?;
        Ok(self.insert(obj))
    }

    fn remove(&mut self, id: &str) -> bool {
        DocStore::remove(self, id).is_some()
    }

    fn snapshot(&self, id: &str) -> Option<Snapshot> {
        self.objects.get(id).map(SceneObject::to_snapshot)
    }

    fn set_properties(&mut self, id: &str, props: &Snapshot) -> Result<bool, SceneError> {
        let Some(current) = self.objects.get(id) else {
            return Ok(false);
        };
        let mut merged = current.to_snapshot();
        for (key, value) in props {
            if key == ID_KEY {
                continue;
            }
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }

        let mut updated = BoardObject::from_snapshot(&merged)?;
        updated.id = Some(id.to_string());
        self.objects.insert(id.to_string(), updated);
        Ok(true)
    }

    fn snapshots(&self) -> Vec<Snapshot> {
        self.sorted_objects()
            .into_iter()
            .map(SceneObject::to_snapshot)
            .collect()
    }

    fn clear(&mut self) {
        self.objects.clear();
        self.selected = None;
        self.render_requested = true;
    }

    fn render(&mut self) {
        self.render_requested = true;
    }
}

fn merge_props(existing: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (k, v) in incoming {
        if v.is_null() {
            existing.remove(k);
        } else {
            existing.insert(k.clone(), v.clone());
        }
    }
}
