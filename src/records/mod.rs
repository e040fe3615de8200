//! Validated CRUD over the census tables
//!
//! Every entity implements [`Record`]: how to validate its payload, which
//! rows it references, what must be unique, and what happens to dependent
//! rows when it is deleted. The five operations below are written once
//! against that trait. Each takes the caller's connection (its session) and
//! runs in a single transaction.

use crate::error::{RecordError, Result};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) use crate::db::fold_case;

/// Generates the row-level storage functions of [`Record`] for one table.
macro_rules! table_storage {
    ($table:ident, $pk:ident) => {
        fn insert(conn: &mut SqliteConnection, values: &Self::Values) -> QueryResult<i32> {
            diesel::insert_into(crate::schema::$table::table)
                .values(values)
                .execute(conn)?;
            diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
                .first(conn)
        }

        fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>> {
            crate::schema::$table::table
                .find(id)
                .select(Self::as_select())
                .first(conn)
                .optional()
        }

        fn page(conn: &mut SqliteConnection, offset: i64, limit: i64) -> QueryResult<Vec<Self>> {
            crate::schema::$table::table
                .order(crate::schema::$table::$pk.asc())
                .offset(offset)
                .limit(limit)
                .select(Self::as_select())
                .load(conn)
        }

        fn replace(conn: &mut SqliteConnection, id: i32, values: &Self::Values) -> QueryResult<usize> {
            diesel::update(crate::schema::$table::table.find(id))
                .set(values)
                .execute(conn)
        }

        fn delete_row(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize> {
            diesel::delete(crate::schema::$table::table.find(id)).execute(conn)
        }
    };
}

/// Fails with `MissingReference` unless `$table` has a row with primary key `$id`.
macro_rules! require_row {
    ($conn:expr, $table:ident, $field:literal, $id:expr) => {{
        let id: i32 = $id;
        let found: bool = diesel::select(diesel::dsl::exists(crate::schema::$table::table.find(id)))
            .get_result($conn)?;
        if !found {
            return Err(crate::error::RecordError::MissingReference {
                field: $field,
                entity: stringify!($table),
                id,
            });
        }
    }};
}

/// `require_row!` for nullable foreign keys.
macro_rules! require_optional_row {
    ($conn:expr, $table:ident, $field:literal, $id:expr) => {{
        if let Some(id) = $id {
            require_row!($conn, $table, $field, id);
        }
    }};
}

pub mod arbol;
pub mod especie;
pub mod lookups;
pub mod medicion;
pub mod territorio;
pub mod usuarios;

pub use arbol::{Arbol, ArbolPayload, Entorno, EntornoPayload, Interferencia, InterferenciaPayload};
pub use especie::{Especie, EspeciePayload};
pub use lookups::{
    seed_lookups, Altura, AlturaPayload, CondicionesCrecimiento, CondicionesCrecimientoPayload,
    DiametroTronco, DiametroTroncoPayload, EstadoFitosanitario, EstadoFitosanitarioPayload,
    TipoInterferencia, TipoInterferenciaPayload,
};
pub use medicion::{Foto, FotoPayload, Medicion, MedicionPayload};
pub use territorio::{Municipio, MunicipioPayload, Provincia, ProvinciaPayload};
pub use usuarios::{Role, RolePayload, Usuario, UsuarioPayload};

/// A census entity with validated create/read/update/delete.
pub trait Record: Serialize + Sized {
    /// Request body, as deserialized from JSON
    type Payload: DeserializeOwned;
    /// Normalized column values, written on insert and on full update
    type Values;

    /// Table-level name used in messages and logs
    const ENTITY: &'static str;
    /// Path segment of the HTTP collection
    const COLLECTION: &'static str;

    /// Normalize the payload or name the field that is wrong
    fn validate(payload: Self::Payload, today: NaiveDate) -> Result<Self::Values>;

    /// Check that every foreign key resolves. `id` is set on update.
    fn check_references(_conn: &mut SqliteConnection, _values: &Self::Values, _id: Option<i32>) -> Result<()> {
        Ok(())
    }

    /// Check the uniqueness key, ignoring the row `exclude`
    fn check_unique(_conn: &mut SqliteConnection, _values: &Self::Values, _exclude: Option<i32>) -> Result<()> {
        Ok(())
    }

    /// Apply the delete policy to rows that reference `id`
    fn release_dependents(_conn: &mut SqliteConnection, _id: i32) -> Result<()> {
        Ok(())
    }

    fn insert(conn: &mut SqliteConnection, values: &Self::Values) -> QueryResult<i32>;
    fn find(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Self>>;
    fn page(conn: &mut SqliteConnection, offset: i64, limit: i64) -> QueryResult<Vec<Self>>;
    fn replace(conn: &mut SqliteConnection, id: i32, values: &Self::Values) -> QueryResult<usize>;
    fn delete_row(conn: &mut SqliteConnection, id: i32) -> QueryResult<usize>;
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn not_found<R: Record>(id: i32) -> RecordError {
    RecordError::NotFound {
        entity: R::ENTITY,
        id,
    }
}

/// Fail with `Duplicate` if any of `matches` is a row other than `exclude`
pub(crate) fn ensure_unique(
    entity: &'static str,
    matches: Vec<i32>,
    exclude: Option<i32>,
    describe: impl FnOnce() -> String,
) -> Result<()> {
    if matches.into_iter().any(|id| Some(id) != exclude) {
        return Err(RecordError::Duplicate {
            entity,
            message: describe(),
        });
    }
    Ok(())
}

/// Restrict policy: fail while dependent rows exist
pub(crate) fn restrict(entity: &'static str, id: i32, dependent: &'static str, count: i64) -> Result<()> {
    if count > 0 {
        return Err(RecordError::Integrity(format!(
            "{} {} is still referenced by {} {} row(s)",
            entity, id, count, dependent
        )));
    }
    Ok(())
}

/// Validate and insert, returning the stored row
pub fn create<R: Record>(conn: &mut SqliteConnection, payload: R::Payload) -> Result<R> {
    let values = R::validate(payload, today())?;
    conn.transaction::<_, RecordError, _>(|conn| {
        R::check_references(conn, &values, None)?;
        R::check_unique(conn, &values, None)?;
        let id = R::insert(conn, &values)?;
        let created = R::find(conn, id)?.ok_or_else(|| not_found::<R>(id))?;
        tracing::info!(entity = R::ENTITY, id, "created");
        Ok(created)
    })
}

pub fn read<R: Record>(conn: &mut SqliteConnection, id: i32) -> Result<R> {
    R::find(conn, id)?.ok_or_else(|| not_found::<R>(id))
}

/// A page of rows in insertion order
pub fn list<R: Record>(conn: &mut SqliteConnection, offset: i64, limit: i64) -> Result<Vec<R>> {
    Ok(R::page(conn, offset.max(0), limit.max(0))?)
}

/// Re-validate and overwrite every field of an existing row
pub fn update<R: Record>(conn: &mut SqliteConnection, id: i32, payload: R::Payload) -> Result<R> {
    let values = R::validate(payload, today())?;
    conn.transaction::<_, RecordError, _>(|conn| {
        if R::find(conn, id)?.is_none() {
            return Err(not_found::<R>(id));
        }
        R::check_references(conn, &values, Some(id))?;
        R::check_unique(conn, &values, Some(id))?;
        R::replace(conn, id, &values)?;
        tracing::info!(entity = R::ENTITY, id, "updated");
        read::<R>(conn, id)
    })
}

pub fn delete<R: Record>(conn: &mut SqliteConnection, id: i32) -> Result<()> {
    conn.transaction::<_, RecordError, _>(|conn| {
        if R::find(conn, id)?.is_none() {
            return Err(not_found::<R>(id));
        }
        R::release_dependents(conn, id)?;
        R::delete_row(conn, id)?;
        tracing::info!(entity = R::ENTITY, id, "deleted");
        Ok(())
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::db::{Database, DbConn};
    use tempfile::TempDir;

    /// A fresh database in a temporary directory. Keep the `TempDir` alive
    /// for as long as the connection is used.
    pub fn session() -> (TempDir, Database, DbConn) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("census.db")).unwrap();
        let conn = db.session().unwrap();
        (dir, db, conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_unique_excludes_self() {
        assert!(ensure_unique("provincia", vec![], None, || "x".into()).is_ok());
        assert!(ensure_unique("provincia", vec![3], Some(3), || "x".into()).is_ok());
        let err = ensure_unique("provincia", vec![3], Some(4), || "nombre 'La Pampa'".into()).unwrap_err();
        assert_eq!(err.to_string(), "provincia already exists: nombre 'La Pampa'");
        assert!(ensure_unique("provincia", vec![3], None, || "x".into()).is_err());
    }

    #[test]
    fn test_restrict_counts() {
        assert!(restrict("provincia", 1, "municipio", 0).is_ok());
        let err = restrict("provincia", 1, "municipio", 2).unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("2 municipio row(s)"));
    }
}
