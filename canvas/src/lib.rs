//! Whiteboard document and editor engine.
//!
//! The document (`DocStore`) is the scene the history engine observes: it
//! owns the board objects and tells registered listeners when objects are
//! added, edited, selected, or removed. `EngineCore` is the facade a host UI
//! drives; it routes edits through the document and exposes undo/redo and
//! the debounce clock.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Editor facade [`engine::EngineCore`] over a document and its history |
//! | [`doc`] | Board object types and the notifying in-memory document store |

pub mod doc;
pub mod engine;
