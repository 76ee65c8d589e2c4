//! Board storage — the file-backed persistence port.
//!
//! DESIGN
//! ======
//! One JSON document per saved board under the data directory, plus a
//! `registry.json` metadata index that is loaded once at startup and
//! rewritten after every mutation. All I/O goes through `tokio::fs`;
//! nothing here ever touches the room registry or connection locks, so
//! a slow disk cannot stall live sessions.
//!
//! ERROR HANDLING
//! ==============
//! Deletes are idempotent on file existence: a missing board file is not
//! an error once the registry entry is gone. Ownership is enforced here
//! rather than in the HTTP layer so every caller gets the same rule.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::envelope::{now_ms, ShapeData};

const REGISTRY_FILE: &str = "registry.json";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Board not found: {0}")]
    NotFound(String),
    #[error("You are not authorized to delete this board. Only the creator ({owner}) can delete it.")]
    NotOwner { owner: String },
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("board data is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Registry row for one saved board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMetadata {
    pub board_id: String,
    pub name: String,
    pub saved_by: String,
    pub saved_at: String,
    pub shape_count: usize,
    pub filename: String,
}

/// Full persisted snapshot of a board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardData {
    pub board_id: String,
    pub board_name: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub shapes: Vec<ShapeData>,
    /// Freehand polylines, kept opaque so a save → load round trip
    /// returns exactly what the client sent.
    #[serde(default)]
    pub strokes: Vec<serde_json::Value>,
    #[serde(default)]
    pub eraser_strokes: Vec<serde_json::Value>,
    pub saved_by: String,
    pub saved_at: String,
    #[serde(default)]
    pub shape_count: usize,
}

fn generate_board_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("board-{}-{}", now_ms(), &suffix[..8])
}

fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// =============================================================================
// STORE
// =============================================================================

pub struct BoardStore {
    base_dir: PathBuf,
    registry: RwLock<HashMap<String, BoardMetadata>>,
}

impl BoardStore {
    /// Create a store rooted at `base_dir`. No I/O happens until
    /// [`init`](Self::init) runs.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), registry: RwLock::new(HashMap::new()) }
    }

    /// Create the directory layout and hydrate the registry index.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created. A corrupt
    /// registry file is logged and treated as empty.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        tokio::fs::create_dir_all(self.base_dir.join("images")).await?;
        tokio::fs::create_dir_all(self.base_dir.join("timelapses")).await?;

        let registry_path = self.base_dir.join(REGISTRY_FILE);
        match tokio::fs::read_to_string(&registry_path).await {
            Ok(json) => match serde_json::from_str::<Vec<BoardMetadata>>(&json) {
                Ok(entries) => {
                    let mut registry = self.registry.write().await;
                    for meta in entries {
                        registry.insert(meta.board_id.clone(), meta);
                    }
                    info!(boards = registry.len(), "board registry loaded");
                }
                Err(e) => warn!(error = %e, "board registry unreadable; starting empty"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Snapshot a board to disk and index it.
    ///
    /// # Errors
    ///
    /// Returns an error if the board file or registry cannot be written.
    pub async fn save(
        &self,
        board_name: &str,
        room_id: &str,
        shapes: Vec<ShapeData>,
        strokes: Vec<serde_json::Value>,
        eraser_strokes: Vec<serde_json::Value>,
        saved_by: &str,
    ) -> Result<BoardMetadata, StorageError> {
        let board_id = generate_board_id();
        let saved_at = timestamp_now();
        let filename = format!("{board_id}.json");
        let shape_count = shapes.len();

        let data = BoardData {
            board_id: board_id.clone(),
            board_name: board_name.to_owned(),
            room_id: room_id.to_owned(),
            shapes,
            strokes,
            eraser_strokes,
            saved_by: saved_by.to_owned(),
            saved_at: saved_at.clone(),
            shape_count,
        };

        let json = serde_json::to_string_pretty(&data)?;
        tokio::fs::write(self.base_dir.join(&filename), json).await?;

        let meta = BoardMetadata {
            board_id: board_id.clone(),
            name: board_name.to_owned(),
            saved_by: saved_by.to_owned(),
            saved_at,
            shape_count,
            filename,
        };

        {
            let mut registry = self.registry.write().await;
            registry.insert(board_id, meta.clone());
        }
        self.persist_registry().await?;

        info!(board_id = %meta.board_id, shapes = shape_count, "board saved");
        Ok(meta)
    }

    /// All saved board metadata, newest first.
    pub async fn list(&self) -> Vec<BoardMetadata> {
        let registry = self.registry.read().await;
        let mut boards: Vec<BoardMetadata> = registry.values().cloned().collect();
        boards.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        boards
    }

    /// Load a full board snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id or a missing file.
    pub async fn load(&self, board_id: &str) -> Result<BoardData, StorageError> {
        let filename = {
            let registry = self.registry.read().await;
            registry
                .get(board_id)
                .map(|meta| meta.filename.clone())
                .ok_or_else(|| StorageError::NotFound(board_id.to_owned()))?
        };

        let json = match tokio::fs::read_to_string(self.base_dir.join(&filename)).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(board_id.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    /// Delete a board. Only the user who saved it may delete it.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `NotOwner` when `requestor` did not
    /// save the board.
    pub async fn delete(&self, board_id: &str, requestor: &str) -> Result<(), StorageError> {
        let meta = {
            let registry = self.registry.read().await;
            registry
                .get(board_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(board_id.to_owned()))?
        };

        if meta.saved_by != requestor {
            return Err(StorageError::NotOwner { owner: meta.saved_by });
        }

        match tokio::fs::remove_file(self.base_dir.join(&meta.filename)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        {
            let mut registry = self.registry.write().await;
            registry.remove(board_id);
        }
        self.persist_registry().await?;

        info!(%board_id, "board deleted");
        Ok(())
    }

    /// Export a board as a standalone JSON document.
    ///
    /// # Errors
    ///
    /// Propagates [`load`](Self::load) failures.
    pub async fn export(&self, board_id: &str) -> Result<String, StorageError> {
        let data = self.load(board_id).await?;
        Ok(serde_json::to_string_pretty(&data)?)
    }

    /// Import a previously exported document under a new id and owner.
    ///
    /// # Errors
    ///
    /// `Serde` when the document does not parse as board data; otherwise
    /// the same failures as [`save`](Self::save).
    pub async fn import(
        &self,
        board_name: &str,
        json_data: &str,
        saved_by: &str,
    ) -> Result<BoardMetadata, StorageError> {
        let data: BoardData = serde_json::from_str(json_data)?;
        self.save(board_name, &data.room_id, data.shapes, data.strokes, data.eraser_strokes, saved_by)
            .await
    }

    /// Absolute path for a timelapse video file.
    #[must_use]
    pub fn timelapse_path(&self, job_id: &str) -> PathBuf {
        self.base_dir.join("timelapses").join(format!("{job_id}.mp4"))
    }

    /// Directory holding uploaded images.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.base_dir.join("images")
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    async fn persist_registry(&self) -> Result<(), StorageError> {
        let entries: Vec<BoardMetadata> = {
            let registry = self.registry.read().await;
            registry.values().cloned().collect()
        };
        let json = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(self.base_dir.join(REGISTRY_FILE), json).await?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
