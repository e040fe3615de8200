//! Follow-up measurements of a tree and their photos

use super::{ensure_unique, Record};
use crate::catalog::TIPOS_FOTO;
use crate::error::Result;
use crate::records::EntornoPayload;
use crate::schema::{foto, medicion};
use crate::validation;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

// ============================================================================
// Medicion
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = medicion)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Medicion {
    pub id_medicion: i32,
    pub id_arbol: i32,
    pub fecha_medicion: Option<NaiveDate>,
    pub ubicacion: Option<String>,
    pub calle: Option<String>,
    pub numero_aprox: Option<i32>,
    pub barrio: Option<String>,
    pub altura: Option<String>,
    pub diametro_tronco: Option<String>,
    pub id_estado_copa: Option<i32>,
    pub id_estado_tronco: Option<i32>,
    pub id_estado_base: Option<i32>,
    pub id_condicion: Option<i32>,
    pub ambito: Option<String>,
    pub ancho_vereda: Option<f64>,
    pub distancia_otros_ejemplares: Option<f64>,
    pub distancia_cordon: Option<f64>,
    pub interferencia_aerea: Option<String>,
    pub especificacion_interferencia: Option<String>,
    pub tipo_cableado: Option<String>,
    pub requiere_intervencion: bool,
    pub tipo_intervencion: Option<String>,
    pub tratamiento_previo: Option<String>,
    pub cazuela: Option<String>,
    pub protegido: bool,
    pub detalles_arbol: Option<String>,
    pub absorcion_co2: Option<f64>,
    pub edad: Option<i32>,
    pub id_usuario: Option<i32>,
    pub tipo_dano: Option<String>,
    pub intervencion_programada: bool,
    /// Stored path of the damage picture
    pub imagen_dano: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedicionPayload {
    pub id_arbol: i32,
    #[serde(default)]
    pub fecha_medicion: Option<NaiveDate>,
    #[serde(default)]
    pub ubicacion: Option<String>,
    #[serde(default)]
    pub calle: Option<String>,
    #[serde(default)]
    pub numero_aprox: Option<i32>,
    #[serde(default)]
    pub barrio: Option<String>,
    #[serde(default)]
    pub id_usuario: Option<i32>,
    #[serde(default)]
    pub tipo_dano: Option<String>,
    #[serde(default)]
    pub intervencion_programada: bool,
    #[serde(default)]
    pub imagen_dano: Option<String>,
    #[serde(flatten)]
    pub entorno: EntornoPayload,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = medicion)]
#[diesel(treat_none_as_null = true)]
pub struct NewMedicion {
    pub id_arbol: i32,
    pub fecha_medicion: Option<NaiveDate>,
    pub ubicacion: Option<String>,
    pub calle: Option<String>,
    pub numero_aprox: Option<i32>,
    pub barrio: Option<String>,
    pub altura: Option<String>,
    pub diametro_tronco: Option<String>,
    pub id_estado_copa: Option<i32>,
    pub id_estado_tronco: Option<i32>,
    pub id_estado_base: Option<i32>,
    pub id_condicion: Option<i32>,
    pub ambito: Option<String>,
    pub ancho_vereda: Option<f64>,
    pub distancia_otros_ejemplares: Option<f64>,
    pub distancia_cordon: Option<f64>,
    pub interferencia_aerea: Option<String>,
    pub especificacion_interferencia: Option<String>,
    pub tipo_cableado: Option<String>,
    pub requiere_intervencion: bool,
    pub tipo_intervencion: Option<String>,
    pub tratamiento_previo: Option<String>,
    pub cazuela: Option<String>,
    pub protegido: bool,
    pub detalles_arbol: Option<String>,
    pub absorcion_co2: Option<f64>,
    pub edad: Option<i32>,
    pub id_usuario: Option<i32>,
    pub tipo_dano: Option<String>,
    pub intervencion_programada: bool,
    /// Stored path of the damage picture
    pub imagen_dano: Option<String>,
}

impl Record for Medicion {
    type Payload = MedicionPayload;
    type Values = NewMedicion;

    const ENTITY: &'static str = "medicion";
    const COLLECTION: &'static str = "mediciones";

    fn validate(payload: MedicionPayload, today: NaiveDate) -> Result<NewMedicion> {
        let entorno = payload.entorno.validate()?;
        Ok(NewMedicion {
            id_arbol: payload.id_arbol,
            fecha_medicion: validation::optional_not_in_future("fecha_medicion", payload.fecha_medicion, today)?,
            ubicacion: validation::coordinates("ubicacion", payload.ubicacion)?,
            calle: validation::optional(payload.calle).map(|c| validation::title_case(&c)),
            numero_aprox: validation::non_negative_int("numero_aprox", payload.numero_aprox)?,
            barrio: validation::optional(payload.barrio).map(|b| validation::title_case(&b)),
            altura: entorno.altura,
            diametro_tronco: entorno.diametro_tronco,
            id_estado_copa: entorno.id_estado_copa,
            id_estado_tronco: entorno.id_estado_tronco,
            id_estado_base: entorno.id_estado_base,
            id_condicion: entorno.id_condicion,
            ambito: entorno.ambito,
            ancho_vereda: entorno.ancho_vereda,
            distancia_otros_ejemplares: entorno.distancia_otros_ejemplares,
            distancia_cordon: entorno.distancia_cordon,
            interferencia_aerea: entorno.interferencia_aerea,
            especificacion_interferencia: entorno.especificacion_interferencia,
            tipo_cableado: entorno.tipo_cableado,
            requiere_intervencion: entorno.requiere_intervencion,
            tipo_intervencion: entorno.tipo_intervencion,
            tratamiento_previo: entorno.tratamiento_previo,
            cazuela: entorno.cazuela,
            protegido: entorno.protegido,
            detalles_arbol: entorno.detalles_arbol,
            absorcion_co2: entorno.absorcion_co2,
            edad: entorno.edad,
            id_usuario: payload.id_usuario,
            tipo_dano: validation::optional(payload.tipo_dano),
            intervencion_programada: payload.intervencion_programada,
            imagen_dano: validation::optional(payload.imagen_dano),
        })
    }

    fn check_references(conn: &mut SqliteConnection, values: &NewMedicion, _id: Option<i32>) -> Result<()> {
        require_row!(conn, arbol, "id_arbol", values.id_arbol);
        require_optional_row!(conn, usuario, "id_usuario", values.id_usuario);
        require_optional_row!(conn, estadofitosanitario, "id_estado_copa", values.id_estado_copa);
        require_optional_row!(conn, estadofitosanitario, "id_estado_tronco", values.id_estado_tronco);
        require_optional_row!(conn, estadofitosanitario, "id_estado_base", values.id_estado_base);
        require_optional_row!(conn, condicionescrecimiento, "id_condicion", values.id_condicion);
        Ok(())
    }

    fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
        let fotos = diesel::delete(foto::table.filter(foto::id_medicion.eq(id))).execute(conn)?;
        tracing::debug!(id, fotos, "cascaded medicion delete");
        Ok(())
    }

    table_storage!(medicion, id_medicion);
}

// ============================================================================
// Foto
// ============================================================================

/// A photo attached to a measurement. Only the stored path is kept; the
/// file itself lives wherever the client uploaded it.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = foto)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Foto {
    pub id_foto: i32,
    pub id_medicion: i32,
    pub tipo_foto: String,
    pub ruta_foto: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FotoPayload {
    pub id_medicion: i32,
    pub tipo_foto: String,
    pub ruta_foto: String,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = foto)]
pub struct NewFoto {
    pub id_medicion: i32,
    pub tipo_foto: String,
    pub ruta_foto: String,
}

impl Record for Foto {
    type Payload = FotoPayload;
    type Values = NewFoto;

    const ENTITY: &'static str = "foto";
    const COLLECTION: &'static str = "fotos";

    fn validate(payload: FotoPayload, _today: NaiveDate) -> Result<NewFoto> {
        Ok(NewFoto {
            id_medicion: payload.id_medicion,
            tipo_foto: validation::one_of("tipo_foto", &payload.tipo_foto, TIPOS_FOTO)?.to_string(),
            ruta_foto: validation::required("ruta_foto", &payload.ruta_foto)?,
        })
    }

    fn check_references(conn: &mut SqliteConnection, values: &NewFoto, _id: Option<i32>) -> Result<()> {
        require_row!(conn, medicion, "id_medicion", values.id_medicion);
        Ok(())
    }

    /// One photo of each kind per measurement
    fn check_unique(conn: &mut SqliteConnection, values: &NewFoto, exclude: Option<i32>) -> Result<()> {
        let matches: Vec<i32> = foto::table
            .filter(foto::id_medicion.eq(values.id_medicion))
            .filter(foto::tipo_foto.eq(&values.tipo_foto))
            .select(foto::id_foto)
            .load(conn)?;
        ensure_unique(Self::ENTITY, matches, exclude, || {
            format!("tipo_foto '{}' for medicion {}", values.tipo_foto, values.id_medicion)
        })
    }

    table_storage!(foto, id_foto);
}
