#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::time::Instant;

use history::{
    EditorSession, ErrorCode, HistoryConfig, HistoryError, HistoryState, LogSnapshot, Persister, RestoreError,
    StepOutcome,
};
use tracing::{debug, info};

use crate::doc::{BoardObject, DocStore, ObjectId, PartialBoardObject};

/// Failure of an editor command.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),
    #[error("invalid update for object {0}")]
    InvalidUpdate(ObjectId),
    #[error("object already exists: {0}")]
    DuplicateId(ObjectId),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
}

impl ErrorCode for EngineError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ObjectNotFound(_) => "E_OBJECT_NOT_FOUND",
            Self::InvalidUpdate(_) => "E_INVALID_UPDATE",
            Self::DuplicateId(_) => "E_DUPLICATE_ID",
            Self::History(e) => e.error_code(),
            Self::Restore(e) => e.error_code(),
        }
    }
}

/// Core engine state: the document plus its history session.
///
/// Every edit goes through the document's notifying mutators, so the history
/// recorder sees it exactly as it would see a pointer gesture.
pub struct EngineCore {
    session: EditorSession<DocStore>,
}

impl EngineCore {
    /// An engine over an empty document.
    #[must_use]
    pub fn new(config: HistoryConfig, persister: Persister) -> Self {
        Self::with_doc(config, persister, DocStore::new())
    }

    /// An engine over an existing document. Objects already present become
    /// the baseline and are not recorded.
    #[must_use]
    pub fn with_doc(config: HistoryConfig, persister: Persister, doc: DocStore) -> Self {
        let mut session = EditorSession::new(config, persister);
        session.init(doc);
        Self { session }
    }

    /// Load a persisted log and rebuild the document from it.
    ///
    /// Returns the number of steps that referenced missing objects.
    ///
    /// # Errors
    ///
    /// An inconsistent record or a snapshot the document can't rebuild.
    pub fn restore(&mut self, state: HistoryState) -> Result<usize, EngineError> {
        self.session.restore(state)?;
        let dangling = self.session.rebuild_scene()?;
        info!(objects = self.doc().map_or(0, DocStore::len), dangling, "document rebuilt from history");
        Ok(dangling)
    }

    fn doc_mut(&mut self) -> Result<&mut DocStore, EngineError> {
        self.session
            .scene_mut()
            .ok_or(EngineError::History(HistoryError::NotAttached))
    }

    // --- Edits ---

    /// Add an object to the document. Returns its assigned id.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateId`] if the object carries the id of one
    /// already on the board; [`HistoryError::NotAttached`] after teardown.
    pub fn create(&mut self, obj: BoardObject) -> Result<ObjectId, EngineError> {
        let doc = self.doc_mut()?;
        if let Some(existing) = obj.id.as_deref() {
            if doc.get(existing).is_some() {
                return Err(EngineError::DuplicateId(existing.to_string()));
            }
        }
        let id = doc.insert(obj);
        debug!(object_id = %id, "object created");
        Ok(id)
    }

    /// Apply a sparse update. The history entry is committed once edits to
    /// the object settle (see [`tick`](Self::tick)).
    ///
    /// # Errors
    ///
    /// [`EngineError::ObjectNotFound`] or [`EngineError::InvalidUpdate`].
    pub fn update(&mut self, id: &str, fields: &PartialBoardObject) -> Result<(), EngineError> {
        let doc = self.doc_mut()?;
        if doc.get(id).is_none() {
            return Err(EngineError::ObjectNotFound(id.to_string()));
        }
        if !doc.apply_partial(id, fields) {
            return Err(EngineError::InvalidUpdate(id.to_string()));
        }
        Ok(())
    }

    /// [`update`](Self::update) with the edit stamped at `now` instead of the
    /// system clock. Use with [`tick_at`](Self::tick_at) on the same clock.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub fn update_at(&mut self, id: &str, fields: &PartialBoardObject, now: Instant) -> Result<(), EngineError> {
        self.session.set_clock(Some(now));
        let result = self.update(id, fields);
        self.session.set_clock(None);
        result
    }

    /// Select an object, fixing the "before" state of its next edit.
    ///
    /// # Errors
    ///
    /// [`EngineError::ObjectNotFound`].
    pub fn select(&mut self, id: &str) -> Result<(), EngineError> {
        if self.doc_mut()?.select(id) {
            Ok(())
        } else {
            Err(EngineError::ObjectNotFound(id.to_string()))
        }
    }

    /// Select the topmost object under a world point, if any.
    ///
    /// # Errors
    ///
    /// [`HistoryError::NotAttached`] after teardown.
    pub fn select_at(&mut self, x: f64, y: f64) -> Result<Option<ObjectId>, EngineError> {
        let doc = self.doc_mut()?;
        let Some(id) = doc.object_at(x, y).and_then(|o| o.id.clone()) else {
            return Ok(None);
        };
        doc.select(&id);
        Ok(Some(id))
    }

    /// Remove an object.
    ///
    /// # Errors
    ///
    /// [`EngineError::ObjectNotFound`].
    pub fn delete(&mut self, id: &str) -> Result<BoardObject, EngineError> {
        self.doc_mut()?
            .remove(id)
            .ok_or_else(|| EngineError::ObjectNotFound(id.to_string()))
    }

    // --- History ---

    /// # Errors
    ///
    /// See [`EditorSession::undo`].
    pub fn undo(&mut self) -> Result<StepOutcome, EngineError> {
        Ok(self.session.undo()?)
    }

    /// # Errors
    ///
    /// See [`EditorSession::redo`].
    pub fn redo(&mut self) -> Result<StepOutcome, EngineError> {
        Ok(self.session.redo()?)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.session.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.session.can_redo()
    }

    /// Counters for the toolbar's undo/redo buttons.
    #[must_use]
    pub fn history(&self) -> LogSnapshot {
        self.session.log_snapshot()
    }

    #[must_use]
    pub fn history_state(&self) -> HistoryState {
        self.session.history_state()
    }

    /// Wipe the document and its history, including the persisted record.
    pub fn clear(&mut self) {
        self.session.clear_history();
    }

    // --- Clock ---

    /// Commit settled edits. Call from the host's frame or timer loop.
    pub fn tick(&mut self) -> Option<String> {
        self.session.tick()
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<String> {
        self.session.tick_at(now)
    }

    /// Commit any unsettled edit immediately.
    pub fn flush(&mut self) -> Option<String> {
        self.session.flush()
    }

    // --- Queries ---

    /// The document; `None` after [`teardown`](Self::teardown).
    #[must_use]
    pub fn doc(&self) -> Option<&DocStore> {
        self.session.scene()
    }

    /// Look up an object by ID.
    #[must_use]
    pub fn object(&self, id: &str) -> Option<&BoardObject> {
        self.session.scene().and_then(|doc| doc.get(id))
    }

    /// All objects in draw order.
    #[must_use]
    pub fn objects(&self) -> Vec<&BoardObject> {
        self.session
            .scene()
            .map(DocStore::sorted_objects)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn selection(&self) -> Option<&str> {
        self.session.scene().and_then(DocStore::selection)
    }

    /// Returns whether the document needs a redraw, and resets the flag.
    pub fn take_render_request(&mut self) -> bool {
        self.session
            .scene_mut()
            .is_some_and(DocStore::take_render_request)
    }

    /// Commit pending edits, stop recording, and hand back the document.
    pub fn teardown(&mut self) -> Option<DocStore> {
        self.session.teardown()
    }
}
