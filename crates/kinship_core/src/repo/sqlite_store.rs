//! SQLite implementation of `TreeStore`.
//!
//! # Responsibility
//! - Map trees, persons, edges and attachments to the version-1 schema.
//! - Apply a `MutationBatch` inside one immediate transaction.
//!
//! # Invariants
//! - Dates are stored as `YYYY-MM-DD` plus a precision tag.
//! - Places, residences and tree settings are stored as JSON documents.
//! - Upserts use `ON CONFLICT DO UPDATE`; `INSERT OR REPLACE` would fire the
//!   cascading deletes of the replaced row.

use crate::db::migrations::latest_version;
use crate::engine::mutation::{MutationBatch, StoreChange};
use crate::model::attachment::{AttachmentKind, PersonAttachment};
use crate::model::person::{DatePrecision, GenealogyDate, Gender, Person, PersonId, Place};
use crate::model::relationship::{
    EndReason, FamilyUnion, ParentChildRelationship, RelationshipType, UnionType,
};
use crate::model::tree::{Tree, TreeId, UserId, Visibility};
use crate::repo::tree_store::{StoreError, StoreResult, TreeStore};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";
const REQUIRED_TABLES: [&str; 5] = [
    "trees",
    "persons",
    "family_unions",
    "parent_child_relationships",
    "person_attachments",
];

/// SQLite-backed tree store. Owns its connection; calls are serialized.
pub struct SqliteTreeStore {
    conn: Mutex<Connection>,
}

impl SqliteTreeStore {
    /// Wraps a connection returned by `db::open_db*`.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TreeStore for SqliteTreeStore {
    fn insert_tree(&self, tree: &Tree) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO trees (
                tree_uuid,
                owner_uuid,
                name,
                description,
                root_person_uuid,
                visibility,
                settings_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                tree.id.to_string(),
                tree.owner_id.to_string(),
                tree.name,
                tree.description,
                tree.root_person_id.map(|id| id.to_string()),
                tree.visibility.as_str(),
                to_json(&tree.settings, "trees.settings_json")?,
            ],
        )?;
        Ok(())
    }

    fn delete_tree(&self, tree_id: TreeId) -> StoreResult<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM trees WHERE tree_uuid = ?1;",
            [tree_id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::TreeNotFound(tree_id));
        }
        Ok(())
    }

    fn list_trees(&self, owner_id: UserId) -> StoreResult<Vec<Tree>> {
        let conn = self.lock();
        query_all(
            &conn,
            "SELECT
                tree_uuid,
                owner_uuid,
                name,
                description,
                root_person_uuid,
                visibility,
                settings_json
             FROM trees
             WHERE owner_uuid = ?1
             ORDER BY name ASC, tree_uuid ASC;",
            owner_id,
            parse_tree_row,
        )
    }

    fn load_tree(&self, tree_id: TreeId) -> StoreResult<Tree> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT
                tree_uuid,
                owner_uuid,
                name,
                description,
                root_person_uuid,
                visibility,
                settings_json
             FROM trees
             WHERE tree_uuid = ?1;",
        )?;
        let mut rows = stmt.query([tree_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return parse_tree_row(row);
        }
        Err(StoreError::TreeNotFound(tree_id))
    }

    fn load_persons(&self, tree_id: TreeId) -> StoreResult<Vec<Person>> {
        let conn = self.lock();
        query_all(
            &conn,
            "SELECT
                person_uuid,
                tree_uuid,
                first_names,
                last_name,
                maiden_name,
                gender,
                birth_date,
                birth_precision,
                death_date,
                death_precision,
                birth_place_json,
                death_place_json,
                is_alive,
                profile_photo,
                occupation,
                residences_json,
                nationality,
                biography,
                privacy
             FROM persons
             WHERE tree_uuid = ?1
             ORDER BY person_uuid ASC;",
            tree_id,
            parse_person_row,
        )
    }

    fn load_relationships(&self, tree_id: TreeId) -> StoreResult<Vec<ParentChildRelationship>> {
        let conn = self.lock();
        query_all(
            &conn,
            "SELECT
                relationship_uuid,
                tree_uuid,
                parent_uuid,
                child_uuid,
                union_uuid,
                relationship_type,
                birth_order
             FROM parent_child_relationships
             WHERE tree_uuid = ?1
             ORDER BY relationship_uuid ASC;",
            tree_id,
            parse_relationship_row,
        )
    }

    fn load_unions(&self, tree_id: TreeId) -> StoreResult<Vec<FamilyUnion>> {
        let conn = self.lock();
        query_all(
            &conn,
            "SELECT
                union_uuid,
                tree_uuid,
                person1_uuid,
                person2_uuid,
                union_type,
                start_date,
                start_precision,
                end_date,
                end_precision,
                start_place_json,
                end_place_json,
                end_reason,
                is_current
             FROM family_unions
             WHERE tree_uuid = ?1
             ORDER BY union_uuid ASC;",
            tree_id,
            parse_union_row,
        )
    }

    fn load_attachments(&self, tree_id: TreeId) -> StoreResult<Vec<PersonAttachment>> {
        let conn = self.lock();
        query_all(
            &conn,
            "SELECT
                attachment_uuid,
                tree_uuid,
                person_uuid,
                kind,
                target_ref
             FROM person_attachments
             WHERE tree_uuid = ?1
             ORDER BY attachment_uuid ASC;",
            tree_id,
            parse_attachment_row,
        )
    }

    fn locate_person(&self, person_id: PersonId) -> StoreResult<Option<TreeId>> {
        let conn = self.lock();
        let tree_uuid: Option<String> = conn
            .query_row(
                "SELECT tree_uuid FROM persons WHERE person_uuid = ?1;",
                [person_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        tree_uuid
            .map(|value| parse_uuid(&value, "persons.tree_uuid"))
            .transpose()
    }

    fn insert_attachment(&self, attachment: &PersonAttachment) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO person_attachments (
                attachment_uuid,
                tree_uuid,
                person_uuid,
                kind,
                target_ref
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                attachment.id.to_string(),
                attachment.tree_id.to_string(),
                attachment.person_id.to_string(),
                attachment.kind.as_str(),
                attachment.target_ref,
            ],
        )?;
        Ok(())
    }

    fn commit(&self, tree_id: TreeId, batch: &MutationBatch) -> StoreResult<()> {
        let conn = self.lock();
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let touched = tx.execute(
            "UPDATE trees
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE tree_uuid = ?1;",
            [tree_id.to_string()],
        )?;
        if touched == 0 {
            return Err(StoreError::TreeNotFound(tree_id));
        }
        for change in batch.changes() {
            apply_change(&tx, tree_id, change)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn apply_change(conn: &Connection, tree_id: TreeId, change: &StoreChange) -> StoreResult<()> {
    let tree_key = tree_id.to_string();
    match change {
        StoreChange::UpsertPerson(person) => upsert_person(conn, person)?,
        StoreChange::DeletePerson(id) => {
            conn.execute(
                "DELETE FROM persons WHERE person_uuid = ?1 AND tree_uuid = ?2;",
                params![id.to_string(), tree_key],
            )?;
        }
        StoreChange::UpsertRelationship(relationship) => {
            conn.execute(
                "INSERT INTO parent_child_relationships (
                    relationship_uuid,
                    tree_uuid,
                    parent_uuid,
                    child_uuid,
                    union_uuid,
                    relationship_type,
                    birth_order
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(relationship_uuid) DO UPDATE SET
                    union_uuid = excluded.union_uuid,
                    relationship_type = excluded.relationship_type,
                    birth_order = excluded.birth_order,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![
                    relationship.id.to_string(),
                    tree_key,
                    relationship.parent_id.to_string(),
                    relationship.child_id.to_string(),
                    relationship.union_id.map(|id| id.to_string()),
                    relationship.relationship_type.as_str(),
                    relationship.birth_order,
                ],
            )?;
        }
        StoreChange::DeleteRelationship(id) => {
            conn.execute(
                "DELETE FROM parent_child_relationships
                 WHERE relationship_uuid = ?1 AND tree_uuid = ?2;",
                params![id.to_string(), tree_key],
            )?;
        }
        StoreChange::UpsertUnion(union) => upsert_union(conn, union)?,
        StoreChange::DeleteUnion(id) => {
            conn.execute(
                "DELETE FROM family_unions WHERE union_uuid = ?1 AND tree_uuid = ?2;",
                params![id.to_string(), tree_key],
            )?;
        }
        StoreChange::DeleteAttachmentsOf(person_id) => {
            conn.execute(
                "DELETE FROM person_attachments WHERE person_uuid = ?1 AND tree_uuid = ?2;",
                params![person_id.to_string(), tree_key],
            )?;
        }
        StoreChange::UpdateTree(tree) => {
            conn.execute(
                "UPDATE trees
                 SET name = ?2,
                     description = ?3,
                     root_person_uuid = ?4,
                     visibility = ?5,
                     settings_json = ?6,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE tree_uuid = ?1;",
                params![
                    tree_key,
                    tree.name,
                    tree.description,
                    tree.root_person_id.map(|id| id.to_string()),
                    tree.visibility.as_str(),
                    to_json(&tree.settings, "trees.settings_json")?,
                ],
            )?;
        }
    }
    Ok(())
}

fn upsert_person(conn: &Connection, person: &Person) -> StoreResult<()> {
    let (birth_date, birth_precision) = date_columns(person.birth_date.as_ref());
    let (death_date, death_precision) = date_columns(person.death_date.as_ref());
    conn.execute(
        "INSERT INTO persons (
            person_uuid,
            tree_uuid,
            first_names,
            last_name,
            maiden_name,
            gender,
            birth_date,
            birth_precision,
            death_date,
            death_precision,
            birth_place_json,
            death_place_json,
            is_alive,
            profile_photo,
            occupation,
            residences_json,
            nationality,
            biography,
            privacy
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        ON CONFLICT(person_uuid) DO UPDATE SET
            first_names = excluded.first_names,
            last_name = excluded.last_name,
            maiden_name = excluded.maiden_name,
            gender = excluded.gender,
            birth_date = excluded.birth_date,
            birth_precision = excluded.birth_precision,
            death_date = excluded.death_date,
            death_precision = excluded.death_precision,
            birth_place_json = excluded.birth_place_json,
            death_place_json = excluded.death_place_json,
            is_alive = excluded.is_alive,
            profile_photo = excluded.profile_photo,
            occupation = excluded.occupation,
            residences_json = excluded.residences_json,
            nationality = excluded.nationality,
            biography = excluded.biography,
            privacy = excluded.privacy,
            updated_at = (strftime('%s', 'now') * 1000);",
        params![
            person.id.to_string(),
            person.tree_id.to_string(),
            person.first_names,
            person.last_name,
            person.maiden_name,
            person.gender.map(Gender::as_str),
            birth_date,
            birth_precision,
            death_date,
            death_precision,
            place_json(person.birth_place.as_ref(), "persons.birth_place_json")?,
            place_json(person.death_place.as_ref(), "persons.death_place_json")?,
            person.is_alive,
            person.profile_photo,
            person.occupation,
            to_json(&person.residences, "persons.residences_json")?,
            person.nationality,
            person.biography,
            person.privacy.as_str(),
        ],
    )?;
    Ok(())
}

fn upsert_union(conn: &Connection, union: &FamilyUnion) -> StoreResult<()> {
    let (start_date, start_precision) = date_columns(union.start_date.as_ref());
    let (end_date, end_precision) = date_columns(union.end_date.as_ref());
    conn.execute(
        "INSERT INTO family_unions (
            union_uuid,
            tree_uuid,
            person1_uuid,
            person2_uuid,
            union_type,
            start_date,
            start_precision,
            end_date,
            end_precision,
            start_place_json,
            end_place_json,
            end_reason,
            is_current
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(union_uuid) DO UPDATE SET
            union_type = excluded.union_type,
            start_date = excluded.start_date,
            start_precision = excluded.start_precision,
            end_date = excluded.end_date,
            end_precision = excluded.end_precision,
            start_place_json = excluded.start_place_json,
            end_place_json = excluded.end_place_json,
            end_reason = excluded.end_reason,
            is_current = excluded.is_current,
            updated_at = (strftime('%s', 'now') * 1000);",
        params![
            union.id.to_string(),
            union.tree_id.to_string(),
            union.person1_id.to_string(),
            union.person2_id.to_string(),
            union.union_type.as_str(),
            start_date,
            start_precision,
            end_date,
            end_precision,
            place_json(union.start_place.as_ref(), "family_unions.start_place_json")?,
            place_json(union.end_place.as_ref(), "family_unions.end_place_json")?,
            union.end_reason.map(EndReason::as_str),
            union.is_current,
        ],
    )?;
    Ok(())
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    key: Uuid,
    parse: fn(&Row<'_>) -> StoreResult<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([key.to_string()])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse(row)?);
    }
    Ok(items)
}

fn parse_tree_row(row: &Row<'_>) -> StoreResult<Tree> {
    let visibility_text: String = row.get("visibility")?;
    let settings_text: String = row.get("settings_json")?;
    Ok(Tree {
        id: parse_uuid_column(row, "tree_uuid")?,
        owner_id: parse_uuid_column(row, "owner_uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        root_person_id: parse_optional_uuid_column(row, "root_person_uuid")?,
        visibility: parse_enum(&visibility_text, "trees.visibility", Visibility::parse)?,
        settings: from_json(&settings_text, "trees.settings_json")?,
    })
}

fn parse_person_row(row: &Row<'_>) -> StoreResult<Person> {
    let gender = row
        .get::<_, Option<String>>("gender")?
        .map(|value| parse_enum(&value, "persons.gender", Gender::parse))
        .transpose()?;
    let privacy_text: String = row.get("privacy")?;
    let residences_text: String = row.get("residences_json")?;
    Ok(Person {
        id: parse_uuid_column(row, "person_uuid")?,
        tree_id: parse_uuid_column(row, "tree_uuid")?,
        first_names: row.get("first_names")?,
        last_name: row.get("last_name")?,
        maiden_name: row.get("maiden_name")?,
        gender,
        birth_date: parse_date(row, "birth_date", "birth_precision")?,
        death_date: parse_date(row, "death_date", "death_precision")?,
        birth_place: parse_place(row, "birth_place_json")?,
        death_place: parse_place(row, "death_place_json")?,
        is_alive: parse_flag(row, "is_alive")?,
        profile_photo: row.get("profile_photo")?,
        occupation: row.get("occupation")?,
        residences: from_json(&residences_text, "persons.residences_json")?,
        nationality: row.get("nationality")?,
        biography: row.get("biography")?,
        privacy: parse_enum(&privacy_text, "persons.privacy", Visibility::parse)?,
    })
}

fn parse_relationship_row(row: &Row<'_>) -> StoreResult<ParentChildRelationship> {
    let type_text: String = row.get("relationship_type")?;
    Ok(ParentChildRelationship {
        id: parse_uuid_column(row, "relationship_uuid")?,
        tree_id: parse_uuid_column(row, "tree_uuid")?,
        parent_id: parse_uuid_column(row, "parent_uuid")?,
        child_id: parse_uuid_column(row, "child_uuid")?,
        union_id: parse_optional_uuid_column(row, "union_uuid")?,
        relationship_type: parse_enum(
            &type_text,
            "parent_child_relationships.relationship_type",
            RelationshipType::parse,
        )?,
        birth_order: row.get("birth_order")?,
    })
}

fn parse_union_row(row: &Row<'_>) -> StoreResult<FamilyUnion> {
    let type_text: String = row.get("union_type")?;
    let end_reason = row
        .get::<_, Option<String>>("end_reason")?
        .map(|value| parse_enum(&value, "family_unions.end_reason", EndReason::parse))
        .transpose()?;
    Ok(FamilyUnion {
        id: parse_uuid_column(row, "union_uuid")?,
        tree_id: parse_uuid_column(row, "tree_uuid")?,
        person1_id: parse_uuid_column(row, "person1_uuid")?,
        person2_id: parse_uuid_column(row, "person2_uuid")?,
        union_type: parse_enum(&type_text, "family_unions.union_type", UnionType::parse)?,
        start_date: parse_date(row, "start_date", "start_precision")?,
        end_date: parse_date(row, "end_date", "end_precision")?,
        start_place: parse_place(row, "start_place_json")?,
        end_place: parse_place(row, "end_place_json")?,
        end_reason,
        is_current: parse_flag(row, "is_current")?,
    })
}

fn parse_attachment_row(row: &Row<'_>) -> StoreResult<PersonAttachment> {
    let kind_text: String = row.get("kind")?;
    Ok(PersonAttachment {
        id: parse_uuid_column(row, "attachment_uuid")?,
        tree_id: parse_uuid_column(row, "tree_uuid")?,
        person_id: parse_uuid_column(row, "person_uuid")?,
        kind: parse_enum(&kind_text, "person_attachments.kind", AttachmentKind::parse)?,
        target_ref: row.get("target_ref")?,
    })
}

fn date_columns(date: Option<&GenealogyDate>) -> (Option<String>, Option<&'static str>) {
    match date {
        Some(date) => (
            Some(date.date.format(DATE_FORMAT).to_string()),
            Some(date.precision.as_str()),
        ),
        None => (None, None),
    }
}

fn parse_date(
    row: &Row<'_>,
    date_column: &'static str,
    precision_column: &'static str,
) -> StoreResult<Option<GenealogyDate>> {
    let Some(text) = row.get::<_, Option<String>>(date_column)? else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|_| StoreError::InvalidData(format!("invalid date `{text}` in {date_column}")))?;
    let precision = match row.get::<_, Option<String>>(precision_column)? {
        Some(value) => parse_enum(&value, precision_column, DatePrecision::parse)?,
        None => DatePrecision::Exact,
    };
    Ok(Some(GenealogyDate::new(date, precision)))
}

fn place_json(place: Option<&Place>, column: &'static str) -> StoreResult<Option<String>> {
    place.map(|place| to_json(place, column)).transpose()
}

fn parse_place(row: &Row<'_>, column: &'static str) -> StoreResult<Option<Place>> {
    row.get::<_, Option<String>>(column)?
        .map(|text| from_json(&text, column))
        .transpose()
}

fn parse_flag(row: &Row<'_>, column: &'static str) -> StoreResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn parse_enum<T>(
    value: &str,
    column: &'static str,
    parse: fn(&str) -> Option<T>,
) -> StoreResult<T> {
    parse(value)
        .ok_or_else(|| StoreError::InvalidData(format!("invalid value `{value}` in {column}")))
}

fn parse_uuid_column(row: &Row<'_>, column: &'static str) -> StoreResult<Uuid> {
    let value: String = row.get(column)?;
    parse_uuid(&value, column)
}

fn parse_optional_uuid_column(row: &Row<'_>, column: &'static str) -> StoreResult<Option<Uuid>> {
    row.get::<_, Option<String>>(column)?
        .map(|value| parse_uuid(&value, column))
        .transpose()
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn to_json<T: Serialize + ?Sized>(value: &T, column: &'static str) -> StoreResult<String> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode {column}: {err}")))
}

fn from_json<T: DeserializeOwned>(text: &str, column: &'static str) -> StoreResult<T> {
    serde_json::from_str(text)
        .map_err(|err| StoreError::InvalidData(format!("cannot decode {column}: {err}")))
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    for table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }
    Ok(())
}
