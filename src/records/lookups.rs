//! Single-column lookup tables
//!
//! Height and diameter ranges are catalogued from the fixed enumerations;
//! phytosanitary states, growth conditions and interference types are
//! free-form names (title-cased, unique case-insensitively).

use super::{ensure_unique, fold_case, restrict, Record};
use crate::catalog;
use crate::error::{RecordError, Result};
use crate::schema::{arbol, interferencia, medicion};
use crate::validation;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

/// Declares a lookup row type, its payload and insertable values, and the
/// [`Record`] impl keyed on its single text column.
macro_rules! lookup_record {
    (
        $(#[$meta:meta])*
        $name:ident, $payload:ident, $values:ident,
        table = $table:ident,
        key = $pk:ident,
        field = $field:ident,
        collection = $collection:literal,
        normalize = $normalize:expr,
        release = $release:expr
    ) => {
        $(#[$meta])*
        #[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
        #[diesel(table_name = crate::schema::$table)]
        #[diesel(check_for_backend(diesel::sqlite::Sqlite))]
        pub struct $name {
            pub $pk: i32,
            pub $field: String,
        }

        #[derive(Debug, Clone, Deserialize)]
        pub struct $payload {
            pub $field: String,
        }

        #[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
        #[diesel(table_name = crate::schema::$table)]
        pub struct $values {
            pub $field: String,
        }

        impl Record for $name {
            type Payload = $payload;
            type Values = $values;

            const ENTITY: &'static str = stringify!($table);
            const COLLECTION: &'static str = $collection;

            fn validate(payload: $payload, _today: NaiveDate) -> Result<$values> {
                let normalize: fn(&'static str, &str) -> Result<String> = $normalize;
                Ok($values {
                    $field: normalize(stringify!($field), &payload.$field)?,
                })
            }

            fn check_unique(conn: &mut SqliteConnection, values: &$values, exclude: Option<i32>) -> Result<()> {
                let matches: Vec<i32> = crate::schema::$table::table
                    .filter(fold_case(crate::schema::$table::$field).eq(values.$field.to_lowercase()))
                    .select(crate::schema::$table::$pk)
                    .load(conn)?;
                ensure_unique(Self::ENTITY, matches, exclude, || {
                    format!("{} '{}'", stringify!($field), values.$field)
                })
            }

            fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
                let release: fn(&mut SqliteConnection, i32) -> Result<()> = $release;
                release(conn, id)
            }

            table_storage!($table, $pk);
        }
    };
}

fn height_range(field: &'static str, value: &str) -> Result<String> {
    Ok(validation::one_of(field, value, catalog::ALTURAS)?.to_string())
}

fn diameter_range(field: &'static str, value: &str) -> Result<String> {
    Ok(validation::one_of(field, value, catalog::DIAMETROS_TRONCO)?.to_string())
}

fn titled_name(field: &'static str, value: &str) -> Result<String> {
    Ok(validation::title_case(&validation::required(field, value)?))
}

/// Ranges are stored on trees and measurements by value, not by id.
fn nothing_references(_conn: &mut SqliteConnection, _id: i32) -> Result<()> {
    Ok(())
}

fn release_estado(conn: &mut SqliteConnection, id: i32) -> Result<()> {
    let arboles: i64 = arbol::table
        .filter(
            arbol::id_estado_copa
                .eq(id)
                .or(arbol::id_estado_tronco.eq(id))
                .or(arbol::id_estado_base.eq(id)),
        )
        .count()
        .get_result(conn)?;
    restrict("estadofitosanitario", id, "arbol", arboles)?;

    let mediciones: i64 = medicion::table
        .filter(
            medicion::id_estado_copa
                .eq(id)
                .or(medicion::id_estado_tronco.eq(id))
                .or(medicion::id_estado_base.eq(id)),
        )
        .count()
        .get_result(conn)?;
    restrict("estadofitosanitario", id, "medicion", mediciones)
}

fn release_condicion(conn: &mut SqliteConnection, id: i32) -> Result<()> {
    let arboles: i64 = arbol::table
        .filter(arbol::id_condicion.eq(id))
        .count()
        .get_result(conn)?;
    restrict("condicionescrecimiento", id, "arbol", arboles)?;

    let mediciones: i64 = medicion::table
        .filter(medicion::id_condicion.eq(id))
        .count()
        .get_result(conn)?;
    restrict("condicionescrecimiento", id, "medicion", mediciones)
}

fn release_tipo_interferencia(conn: &mut SqliteConnection, id: i32) -> Result<()> {
    let interferencias: i64 = interferencia::table
        .filter(interferencia::id_tipo_interferencia.eq(id))
        .count()
        .get_result(conn)?;
    restrict("tipointerferencia", id, "interferencia", interferencias)
}

lookup_record! {
    /// A catalogued height range
    Altura, AlturaPayload, NewAltura,
    table = altura,
    key = id_altura,
    field = rango_altura,
    collection = "alturas",
    normalize = height_range,
    release = nothing_references
}

lookup_record! {
    /// A catalogued trunk diameter range
    DiametroTronco, DiametroTroncoPayload, NewDiametroTronco,
    table = diametrotronco,
    key = id_diametro,
    field = rango_diametro,
    collection = "diametros",
    normalize = diameter_range,
    release = nothing_references
}

lookup_record! {
    /// Phytosanitary state of crown, trunk or base ("Bueno", "Malo", ...)
    EstadoFitosanitario, EstadoFitosanitarioPayload, NewEstadoFitosanitario,
    table = estadofitosanitario,
    key = id_estado,
    field = nombre_estado,
    collection = "estados",
    normalize = titled_name,
    release = release_estado
}

lookup_record! {
    CondicionesCrecimiento, CondicionesCrecimientoPayload, NewCondicionesCrecimiento,
    table = condicionescrecimiento,
    key = id_condicion,
    field = nombre_condicion,
    collection = "condiciones",
    normalize = titled_name,
    release = release_condicion
}

lookup_record! {
    /// Kind of interference a tree has with its surroundings ("Cableado", ...)
    TipoInterferencia, TipoInterferenciaPayload, NewTipoInterferencia,
    table = tipointerferencia,
    key = id_tipo_interferencia,
    field = nombre_tipo,
    collection = "tipos_interferencia",
    normalize = titled_name,
    release = release_tipo_interferencia
}

/// Insert `value` unless an equal row already exists. Returns whether a row
/// was added.
fn seed_one<R: Record>(conn: &mut SqliteConnection, payload: R::Payload) -> Result<bool> {
    match super::create::<R>(conn, payload) {
        Ok(_) => Ok(true),
        Err(RecordError::Duplicate { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Fill the lookup tables with the catalog defaults. Safe to run repeatedly.
pub fn seed_lookups(conn: &mut SqliteConnection) -> Result<usize> {
    let mut added = 0;
    for value in catalog::ALTURAS {
        added += usize::from(seed_one::<Altura>(conn, AlturaPayload { rango_altura: value.to_string() })?);
    }
    for value in catalog::DIAMETROS_TRONCO {
        added += usize::from(seed_one::<DiametroTronco>(
            conn,
            DiametroTroncoPayload { rango_diametro: value.to_string() },
        )?);
    }
    for value in catalog::ESTADOS_FITOSANITARIOS {
        added += usize::from(seed_one::<EstadoFitosanitario>(
            conn,
            EstadoFitosanitarioPayload { nombre_estado: value.to_string() },
        )?);
    }
    for value in catalog::CONDICIONES_CRECIMIENTO {
        added += usize::from(seed_one::<CondicionesCrecimiento>(
            conn,
            CondicionesCrecimientoPayload { nombre_condicion: value.to_string() },
        )?);
    }
    for value in catalog::TIPOS_INTERFERENCIA {
        added += usize::from(seed_one::<TipoInterferencia>(
            conn,
            TipoInterferenciaPayload { nombre_tipo: value.to_string() },
        )?);
    }
    tracing::info!(added, "lookup tables seeded");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{self, testing};

    #[test]
    fn test_altura_must_be_catalogued() {
        let (_dir, _db, mut conn) = testing::session();
        let err = records::create::<Altura>(&mut conn, AlturaPayload { rango_altura: "10 m".into() }).unwrap_err();
        assert_eq!(err.field(), Some("rango_altura"));

        let a: Altura = records::create(&mut conn, AlturaPayload { rango_altura: " 3-5 M ".into() }).unwrap();
        assert_eq!(a.rango_altura, "3-5 m");
    }

    #[test]
    fn test_estado_names_unique() {
        let (_dir, _db, mut conn) = testing::session();
        let e: EstadoFitosanitario = records::create(
            &mut conn,
            EstadoFitosanitarioPayload { nombre_estado: "muy bueno".into() },
        )
        .unwrap();
        assert_eq!(e.nombre_estado, "Muy Bueno");
        let err = records::create::<EstadoFitosanitario>(
            &mut conn,
            EstadoFitosanitarioPayload { nombre_estado: "MUY BUENO".into() },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "duplicate");
    }

    #[test]
    fn test_seed_is_idempotent() {
        let (_dir, _db, mut conn) = testing::session();
        let expected = catalog::ALTURAS.len()
            + catalog::DIAMETROS_TRONCO.len()
            + catalog::ESTADOS_FITOSANITARIOS.len()
            + catalog::CONDICIONES_CRECIMIENTO.len()
            + catalog::TIPOS_INTERFERENCIA.len();
        assert_eq!(seed_lookups(&mut conn).unwrap(), expected);
        assert_eq!(seed_lookups(&mut conn).unwrap(), 0);

        let tipos: Vec<TipoInterferencia> = records::list(&mut conn, 0, 100).unwrap();
        assert_eq!(tipos.len(), catalog::TIPOS_INTERFERENCIA.len());
        assert_eq!(tipos[0].nombre_tipo, "Cableado");
    }
}
