//! FFI use-case API for the Flutter family-tree screens.
//!
//! # Responsibility
//! - Expose tree lifecycle, `mutate`, views and statistics to Dart via FRB.
//! - Carry domain payloads as JSON so every field and enum tag of the core
//!   model crosses the boundary unchanged.
//!
//! # Invariants
//! - Exported functions never panic across the FFI boundary.
//! - Failures carry `error_kind` (`validation|conflict|not_found|store`) so
//!   the UI can attach per-field feedback.

use kinship_core::db::open_db;
use kinship_core::model::tree::TreeDraft;
use kinship_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, EngineConfig,
    GenealogyError, GenealogyService, SqliteTreeStore, TreeOperation, ValidationError, ViewMode,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;

const ENGINE_DB_FILE_NAME: &str = "kinship_engine.sqlite3";
static ENGINE: OnceLock<Result<GenealogyService<SqliteTreeStore>, String>> = OnceLock::new();

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Returns an empty string on success and an error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Opens the engine on `db_path` with a JSON `EngineConfig` (`""` for
/// defaults).
///
/// Must run before any other tree call; later calls are rejected. Returns an
/// empty string on success and an error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_engine(db_path: String, config_json: String) -> String {
    let mut opened = false;
    let engine = ENGINE.get_or_init(|| {
        opened = true;
        open_engine(PathBuf::from(db_path.trim()), config_json.as_str())
    });
    match engine {
        Ok(_) if opened => String::new(),
        Ok(_) => "engine already configured".to_string(),
        Err(err) => err.clone(),
    }
}

/// Outcome of a write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeActionResponse {
    pub ok: bool,
    /// Created or touched entity id.
    pub entity_id: Option<String>,
    pub error_kind: Option<String>,
    pub message: String,
}

impl TreeActionResponse {
    fn success(message: impl Into<String>, entity_id: String) -> Self {
        Self {
            ok: true,
            entity_id: Some(entity_id),
            error_kind: None,
            message: message.into(),
        }
    }

    fn failure(failure: CallFailure) -> Self {
        Self {
            ok: false,
            entity_id: None,
            error_kind: Some(failure.kind.to_string()),
            message: failure.message,
        }
    }
}

/// Outcome of a read call. `payload_json` holds the serialized result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeQueryResponse {
    pub ok: bool,
    pub payload_json: Option<String>,
    pub error_kind: Option<String>,
    pub message: String,
}

impl TreeQueryResponse {
    fn from_result<T: Serialize>(result: Result<T, CallFailure>) -> Self {
        let encoded = result.and_then(|value| {
            serde_json::to_string(&value).map_err(|err| CallFailure {
                kind: "store",
                message: format!("cannot encode response: {err}"),
            })
        });
        match encoded {
            Ok(payload) => Self {
                ok: true,
                payload_json: Some(payload),
                error_kind: None,
                message: "ok".to_string(),
            },
            Err(failure) => Self {
                ok: false,
                payload_json: None,
                error_kind: Some(failure.kind.to_string()),
                message: failure.message,
            },
        }
    }
}

/// Creates a tree. `draft_json` is a `TreeDraft` document.
#[flutter_rust_bridge::frb(sync)]
pub fn create_tree(owner_id: String, draft_json: String) -> TreeActionResponse {
    let result = with_engine(|engine| {
        let owner_id = parse_id(&owner_id, "owner_id")?;
        let draft: TreeDraft = parse_json(&draft_json, "tree draft")?;
        Ok(engine.create_tree(owner_id, draft)?.id)
    });
    match result {
        Ok(tree_id) => TreeActionResponse::success("Tree created.", tree_id.to_string()),
        Err(failure) => TreeActionResponse::failure(failure),
    }
}

/// Deletes a tree with all persons, edges and attachments.
#[flutter_rust_bridge::frb(sync)]
pub fn delete_tree(tree_id: String) -> TreeActionResponse {
    let result = with_engine(|engine| {
        let tree_id = parse_id(&tree_id, "tree_id")?;
        engine.delete_tree(tree_id)?;
        Ok(tree_id)
    });
    match result {
        Ok(tree_id) => TreeActionResponse::success("Tree deleted.", tree_id.to_string()),
        Err(failure) => TreeActionResponse::failure(failure),
    }
}

/// Applies one `TreeOperation` (JSON, tagged by `op`).
#[flutter_rust_bridge::frb(sync)]
pub fn mutate_tree(tree_id: String, operation_json: String) -> TreeActionResponse {
    let result = with_engine(|engine| {
        let tree_id = parse_id(&tree_id, "tree_id")?;
        let operation: TreeOperation = parse_json(&operation_json, "operation")?;
        Ok(engine.mutate(tree_id, &operation)?)
    });
    match result {
        Ok(entity_id) => TreeActionResponse::success("Applied.", entity_id.to_string()),
        Err(failure) => TreeActionResponse::failure(failure),
    }
}

/// Builds a `descendant|ascendant|hourglass` view as JSON.
#[flutter_rust_bridge::frb(sync)]
pub fn get_view_json(
    tree_id: String,
    root_person_id: String,
    mode: String,
    max_generations: u32,
) -> TreeQueryResponse {
    TreeQueryResponse::from_result(with_engine(|engine| {
        let tree_id = parse_id(&tree_id, "tree_id")?;
        let root = parse_id(&root_person_id, "root_person_id")?;
        let mode = ViewMode::parse(mode.trim()).ok_or_else(|| {
            CallFailure::from(GenealogyError::from(ValidationError::MalformedInput(
                format!("unknown view mode `{}`", mode.trim()),
            )))
        })?;
        Ok(engine.get_view(tree_id, root, mode, max_generations)?)
    }))
}

/// Tree statistics as JSON.
#[flutter_rust_bridge::frb(sync)]
pub fn get_statistics_json(tree_id: String) -> TreeQueryResponse {
    TreeQueryResponse::from_result(with_engine(|engine| {
        let tree_id = parse_id(&tree_id, "tree_id")?;
        Ok(engine.get_statistics(tree_id)?)
    }))
}

/// Generation levels as a JSON object `person_id -> generation`.
#[flutter_rust_bridge::frb(sync)]
pub fn get_generations_json(tree_id: String, root_person_id: Option<String>) -> TreeQueryResponse {
    TreeQueryResponse::from_result(with_engine(|engine| {
        let tree_id = parse_id(&tree_id, "tree_id")?;
        let root = root_person_id
            .as_deref()
            .map(|value| parse_id(value, "root_person_id"))
            .transpose()?;
        let generations = engine.get_generations(tree_id, root)?;
        Ok(generations
            .iter()
            .map(|(person_id, level)| (person_id.to_string(), level))
            .collect::<std::collections::BTreeMap<_, _>>())
    }))
}

/// Persons of a tree, oldest first, as JSON.
#[flutter_rust_bridge::frb(sync)]
pub fn list_persons_json(tree_id: String) -> TreeQueryResponse {
    TreeQueryResponse::from_result(with_engine(|engine| {
        let tree_id = parse_id(&tree_id, "tree_id")?;
        Ok(engine.list_persons(tree_id)?)
    }))
}

struct CallFailure {
    kind: &'static str,
    message: String,
}

impl From<GenealogyError> for CallFailure {
    fn from(value: GenealogyError) -> Self {
        Self {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}

fn with_engine<T>(
    f: impl FnOnce(&GenealogyService<SqliteTreeStore>) -> Result<T, CallFailure>,
) -> Result<T, CallFailure> {
    let engine = ENGINE
        .get_or_init(|| open_engine(resolve_default_db_path(), ""))
        .as_ref()
        .map_err(|err| CallFailure {
            kind: "store",
            message: format!("engine unavailable: {err}"),
        })?;
    f(engine)
}

fn open_engine(
    db_path: PathBuf,
    config_json: &str,
) -> Result<GenealogyService<SqliteTreeStore>, String> {
    let config = if config_json.trim().is_empty() {
        EngineConfig::default()
    } else {
        EngineConfig::from_json(config_json).map_err(|err| err.to_string())?
    };
    let conn = open_db(&db_path).map_err(|err| format!("engine DB open failed: {err}"))?;
    let store =
        SqliteTreeStore::try_new(conn).map_err(|err| format!("engine store init failed: {err}"))?;
    log::info!(
        "event=engine_open module=ffi status=ok max_view_generations={}",
        config.max_view_generations
    );
    Ok(GenealogyService::new(store, config))
}

fn resolve_default_db_path() -> PathBuf {
    if let Ok(raw) = std::env::var("KINSHIP_DB_PATH") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(ENGINE_DB_FILE_NAME)
}

fn parse_id(value: &str, field: &str) -> Result<Uuid, CallFailure> {
    Uuid::parse_str(value.trim()).map_err(|_| {
        GenealogyError::from(ValidationError::MalformedInput(format!(
            "{field} is not a uuid: `{value}`"
        )))
        .into()
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &str, what: &str) -> Result<T, CallFailure> {
    serde_json::from_str(value).map_err(|err| {
        GenealogyError::from(ValidationError::MalformedInput(format!(
            "invalid {what}: {err}"
        )))
        .into()
    })
}
