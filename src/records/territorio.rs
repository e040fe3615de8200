//! Provinces and municipalities

use super::{ensure_unique, fold_case, restrict, Record};
use crate::error::Result;
use crate::schema::{arbol, municipio, provincia, usuario};
use crate::validation;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provincia
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = provincia)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Provincia {
    pub id_provincia: i32,
    pub nombre: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvinciaPayload {
    pub nombre: String,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = provincia)]
pub struct NewProvincia {
    pub nombre: String,
}

impl Record for Provincia {
    type Payload = ProvinciaPayload;
    type Values = NewProvincia;

    const ENTITY: &'static str = "provincia";
    const COLLECTION: &'static str = "provincias";

    fn validate(payload: ProvinciaPayload, _today: NaiveDate) -> Result<NewProvincia> {
        let nombre = validation::title_case(&validation::required("nombre", &payload.nombre)?);
        Ok(NewProvincia { nombre })
    }

    fn check_unique(conn: &mut SqliteConnection, values: &NewProvincia, exclude: Option<i32>) -> Result<()> {
        let matches: Vec<i32> = provincia::table
            .filter(fold_case(provincia::nombre).eq(values.nombre.to_lowercase()))
            .select(provincia::id_provincia)
            .load(conn)?;
        ensure_unique(Self::ENTITY, matches, exclude, || format!("nombre '{}'", values.nombre))
    }

    fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
        let municipios: i64 = municipio::table
            .filter(municipio::id_provincia.eq(id))
            .count()
            .get_result(conn)?;
        restrict(Self::ENTITY, id, "municipio", municipios)
    }

    table_storage!(provincia, id_provincia);
}

// ============================================================================
// Municipio
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = municipio)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Municipio {
    pub id_municipio: i32,
    pub id_provincia: i32,
    pub nombre: String,
    pub latitud: Option<f64>,
    pub longitud: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MunicipioPayload {
    pub id_provincia: i32,
    pub nombre: String,
    #[serde(default)]
    pub latitud: Option<f64>,
    #[serde(default)]
    pub longitud: Option<f64>,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = municipio)]
#[diesel(treat_none_as_null = true)]
pub struct NewMunicipio {
    pub id_provincia: i32,
    pub nombre: String,
    pub latitud: Option<f64>,
    pub longitud: Option<f64>,
}

impl Record for Municipio {
    type Payload = MunicipioPayload;
    type Values = NewMunicipio;

    const ENTITY: &'static str = "municipio";
    const COLLECTION: &'static str = "municipios";

    fn validate(payload: MunicipioPayload, _today: NaiveDate) -> Result<NewMunicipio> {
        Ok(NewMunicipio {
            id_provincia: payload.id_provincia,
            nombre: validation::title_case(&validation::required("nombre", &payload.nombre)?),
            latitud: validation::latitude("latitud", payload.latitud)?,
            longitud: validation::longitude("longitud", payload.longitud)?,
        })
    }

    fn check_references(conn: &mut SqliteConnection, values: &NewMunicipio, _id: Option<i32>) -> Result<()> {
        require_row!(conn, provincia, "id_provincia", values.id_provincia);
        Ok(())
    }

    fn check_unique(conn: &mut SqliteConnection, values: &NewMunicipio, exclude: Option<i32>) -> Result<()> {
        let matches: Vec<i32> = municipio::table
            .filter(municipio::id_provincia.eq(values.id_provincia))
            .filter(fold_case(municipio::nombre).eq(values.nombre.to_lowercase()))
            .select(municipio::id_municipio)
            .load(conn)?;
        ensure_unique(Self::ENTITY, matches, exclude, || {
            format!("nombre '{}' in provincia {}", values.nombre, values.id_provincia)
        })
    }

    fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
        let usuarios: i64 = usuario::table
            .filter(usuario::id_municipio.eq(id))
            .count()
            .get_result(conn)?;
        restrict(Self::ENTITY, id, "usuario", usuarios)?;

        let arboles: i64 = arbol::table
            .filter(arbol::id_municipio.eq(id))
            .count()
            .get_result(conn)?;
        restrict(Self::ENTITY, id, "arbol", arboles)
    }

    table_storage!(municipio, id_municipio);
}
