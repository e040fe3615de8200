//! Tree species

use super::{ensure_unique, fold_case, restrict, Record};
use crate::catalog::ORIGENES;
use crate::error::Result;
use crate::schema::{arbol, especie};
use crate::validation;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = especie)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Especie {
    pub id_especie: i32,
    pub nombre_cientifico: String,
    pub nombre_comun: String,
    pub origen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeciePayload {
    pub nombre_cientifico: String,
    pub nombre_comun: String,
    pub origen: String,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = especie)]
pub struct NewEspecie {
    pub nombre_cientifico: String,
    pub nombre_comun: String,
    pub origen: String,
}

impl Record for Especie {
    type Payload = EspeciePayload;
    type Values = NewEspecie;

    const ENTITY: &'static str = "especie";
    const COLLECTION: &'static str = "especies";

    fn validate(payload: EspeciePayload, _today: NaiveDate) -> Result<NewEspecie> {
        let nombre_cientifico = validation::required("nombre_cientifico", &payload.nombre_cientifico)?;
        let nombre_comun = validation::required("nombre_comun", &payload.nombre_comun)?;
        Ok(NewEspecie {
            nombre_cientifico: validation::capitalize(&nombre_cientifico),
            nombre_comun: validation::title_case(&nombre_comun),
            origen: validation::one_of("origen", &payload.origen, ORIGENES)?.to_string(),
        })
    }

    fn check_unique(conn: &mut SqliteConnection, values: &NewEspecie, exclude: Option<i32>) -> Result<()> {
        let matches: Vec<i32> = especie::table
            .filter(fold_case(especie::nombre_cientifico).eq(values.nombre_cientifico.to_lowercase()))
            .select(especie::id_especie)
            .load(conn)?;
        ensure_unique(Self::ENTITY, matches, exclude, || {
            format!("nombre_cientifico '{}'", values.nombre_cientifico)
        })
    }

    fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
        let arboles: i64 = arbol::table
            .filter(arbol::id_especie.eq(id))
            .count()
            .get_result(conn)?;
        restrict(Self::ENTITY, id, "arbol", arboles)
    }

    table_storage!(especie, id_especie);
}
