//! Trees, their interference records, and the environmental fields shared
//! with measurements

use super::Record;
use crate::catalog::{AMBITOS, ALTURAS, DIAMETROS_TRONCO, TIPOS_CABLEADO, TIPOS_INTERVENCION};
use crate::error::Result;
use crate::schema::{arbol, foto, interferencia, medicion};
use crate::validation;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

// ============================================================================
// Environmental fields
// ============================================================================

/// Condition of a tree and its surroundings, recorded at census time and
/// again on every measurement
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntornoPayload {
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
}

/// Validated [`EntornoPayload`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entorno {
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
}

impl EntornoPayload {
    pub fn validate(self) -> Result<Entorno> {
        let (interferencia_aerea, especificacion_interferencia) =
            validation::aerial_interference(self.interferencia_aerea, self.especificacion_interferencia)?;

        Ok(Entorno {
            altura: validation::optional_one_of("altura", self.altura, ALTURAS)?,
            diametro_tronco: validation::optional_one_of("diametro_tronco", self.diametro_tronco, DIAMETROS_TRONCO)?,
            id_estado_copa: self.id_estado_copa,
            id_estado_tronco: self.id_estado_tronco,
            id_estado_base: self.id_estado_base,
            id_condicion: self.id_condicion,
            ambito: validation::optional_one_of("ambito", self.ambito, AMBITOS)?,
            ancho_vereda: validation::non_negative("ancho_vereda", self.ancho_vereda)?,
            distancia_otros_ejemplares: validation::non_negative(
                "distancia_otros_ejemplares",
                self.distancia_otros_ejemplares,
            )?,
            distancia_cordon: validation::non_negative("distancia_cordon", self.distancia_cordon)?,
            interferencia_aerea,
            especificacion_interferencia,
            tipo_cableado: validation::optional_one_of("tipo_cableado", self.tipo_cableado, TIPOS_CABLEADO)?,
            requiere_intervencion: self.requiere_intervencion,
            tipo_intervencion: validation::optional_one_of(
                "tipo_intervencion",
                self.tipo_intervencion,
                TIPOS_INTERVENCION,
            )?,
            tratamiento_previo: validation::optional(self.tratamiento_previo),
            cazuela: validation::optional(self.cazuela),
            protegido: self.protegido,
            detalles_arbol: validation::optional(self.detalles_arbol),
            absorcion_co2: validation::non_negative("absorcion_co2", self.absorcion_co2)?,
            edad: validation::non_negative_int("edad", self.edad)?,
        })
    }
}

impl Entorno {
    /// Phytosanitary states and growth condition must exist when given
    pub fn check_references(&self, conn: &mut SqliteConnection) -> Result<()> {
        require_optional_row!(conn, estadofitosanitario, "id_estado_copa", self.id_estado_copa);
        require_optional_row!(conn, estadofitosanitario, "id_estado_tronco", self.id_estado_tronco);
        require_optional_row!(conn, estadofitosanitario, "id_estado_base", self.id_estado_base);
        require_optional_row!(conn, condicionescrecimiento, "id_condicion", self.id_condicion);
        Ok(())
    }
}

// ============================================================================
// Arbol
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = arbol)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Arbol {
    pub id_arbol: i32,
    pub id_especie: i32,
    pub id_municipio: i32,
    pub ubicacion: Option<String>,
    pub calle: Option<String>,
    pub numero_aprox: Option<i32>,
    pub identificacion: Option<String>,
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
    pub fecha_censo: Option<NaiveDate>,
    /// Surveyor who recorded the census
    pub id_usuario: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArbolPayload {
    pub id_especie: i32,
    pub id_municipio: i32,
    #[serde(default)]
    pub ubicacion: Option<String>,
    #[serde(default)]
    pub calle: Option<String>,
    #[serde(default)]
    pub numero_aprox: Option<i32>,
    #[serde(default)]
    pub identificacion: Option<String>,
    #[serde(default)]
    pub barrio: Option<String>,
    #[serde(default)]
    pub fecha_censo: Option<NaiveDate>,
    #[serde(default)]
    pub id_usuario: Option<i32>,
    #[serde(flatten)]
    pub entorno: EntornoPayload,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = arbol)]
#[diesel(treat_none_as_null = true)]
pub struct NewArbol {
    pub id_especie: i32,
    pub id_municipio: i32,
    pub ubicacion: Option<String>,
    pub calle: Option<String>,
    pub numero_aprox: Option<i32>,
    pub identificacion: Option<String>,
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
    pub fecha_censo: Option<NaiveDate>,
    pub id_usuario: Option<i32>,
}

impl NewArbol {
    fn entorno(&self) -> Entorno {
        Entorno {
            altura: self.altura.clone(),
            diametro_tronco: self.diametro_tronco.clone(),
            id_estado_copa: self.id_estado_copa,
            id_estado_tronco: self.id_estado_tronco,
            id_estado_base: self.id_estado_base,
            id_condicion: self.id_condicion,
            ambito: self.ambito.clone(),
            ancho_vereda: self.ancho_vereda,
            distancia_otros_ejemplares: self.distancia_otros_ejemplares,
            distancia_cordon: self.distancia_cordon,
            interferencia_aerea: self.interferencia_aerea.clone(),
            especificacion_interferencia: self.especificacion_interferencia.clone(),
            tipo_cableado: self.tipo_cableado.clone(),
            requiere_intervencion: self.requiere_intervencion,
            tipo_intervencion: self.tipo_intervencion.clone(),
            tratamiento_previo: self.tratamiento_previo.clone(),
            cazuela: self.cazuela.clone(),
            protegido: self.protegido,
            detalles_arbol: self.detalles_arbol.clone(),
            absorcion_co2: self.absorcion_co2,
            edad: self.edad,
        }
    }
}

impl Record for Arbol {
    type Payload = ArbolPayload;
    type Values = NewArbol;

    const ENTITY: &'static str = "arbol";
    const COLLECTION: &'static str = "arboles";

    fn validate(payload: ArbolPayload, today: NaiveDate) -> Result<NewArbol> {
        let entorno = payload.entorno.validate()?;
        Ok(NewArbol {
            id_especie: payload.id_especie,
            id_municipio: payload.id_municipio,
            ubicacion: validation::coordinates("ubicacion", payload.ubicacion)?,
            calle: validation::optional(payload.calle).map(|c| validation::title_case(&c)),
            numero_aprox: validation::non_negative_int("numero_aprox", payload.numero_aprox)?,
            identificacion: validation::optional(payload.identificacion),
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
            fecha_censo: validation::optional_not_in_future("fecha_censo", payload.fecha_censo, today)?,
            id_usuario: payload.id_usuario,
        })
    }

    fn check_references(conn: &mut SqliteConnection, values: &NewArbol, _id: Option<i32>) -> Result<()> {
        require_row!(conn, especie, "id_especie", values.id_especie);
        require_row!(conn, municipio, "id_municipio", values.id_municipio);
        require_optional_row!(conn, usuario, "id_usuario", values.id_usuario);
        values.entorno().check_references(conn)
    }

    /// Measurements (with their photos) and interference records belong to
    /// the tree and go with it.
    fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
        let mediciones: Vec<i32> = medicion::table
            .filter(medicion::id_arbol.eq(id))
            .select(medicion::id_medicion)
            .load(conn)?;
        let fotos = diesel::delete(foto::table.filter(foto::id_medicion.eq_any(mediciones))).execute(conn)?;
        let mediciones = diesel::delete(medicion::table.filter(medicion::id_arbol.eq(id))).execute(conn)?;
        let interferencias =
            diesel::delete(interferencia::table.filter(interferencia::id_arbol.eq(id))).execute(conn)?;
        tracing::debug!(id, fotos, mediciones, interferencias, "cascaded arbol delete");
        Ok(())
    }

    table_storage!(arbol, id_arbol);
}

// ============================================================================
// Interferencia
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = interferencia)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Interferencia {
    pub id_interferencia: i32,
    pub id_arbol: i32,
    pub id_tipo_interferencia: i32,
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterferenciaPayload {
    pub id_arbol: i32,
    pub id_tipo_interferencia: i32,
    #[serde(default)]
    pub descripcion: Option<String>,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = interferencia)]
#[diesel(treat_none_as_null = true)]
pub struct NewInterferencia {
    pub id_arbol: i32,
    pub id_tipo_interferencia: i32,
    pub descripcion: Option<String>,
}

impl Record for Interferencia {
    type Payload = InterferenciaPayload;
    type Values = NewInterferencia;

    const ENTITY: &'static str = "interferencia";
    const COLLECTION: &'static str = "interferencias";

    fn validate(payload: InterferenciaPayload, _today: NaiveDate) -> Result<NewInterferencia> {
        Ok(NewInterferencia {
            id_arbol: payload.id_arbol,
            id_tipo_interferencia: payload.id_tipo_interferencia,
            descripcion: validation::optional(payload.descripcion),
        })
    }

    fn check_references(conn: &mut SqliteConnection, values: &NewInterferencia, _id: Option<i32>) -> Result<()> {
        require_row!(conn, arbol, "id_arbol", values.id_arbol);
        require_row!(conn, tipointerferencia, "id_tipo_interferencia", values.id_tipo_interferencia);
        Ok(())
    }

    table_storage!(interferencia, id_interferencia);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::RecordError;
    use crate::records::{
        self, testing, Especie, EspeciePayload, Municipio, MunicipioPayload, Provincia, ProvinciaPayload,
        TipoInterferencia, TipoInterferenciaPayload,
    };
    use crate::catalog::{INTERFERENCIAS_AEREAS, SIN_INTERFERENCIA};
    use serde_json::json;

    /// (especie id, municipio id)
    pub(crate) fn fixtures(conn: &mut SqliteConnection) -> (i32, i32) {
        let p: Provincia = records::create(conn, ProvinciaPayload { nombre: "La Pampa".into() }).unwrap();
        let m: Municipio = records::create(
            conn,
            MunicipioPayload {
                id_provincia: p.id_provincia,
                nombre: "Santa Rosa".into(),
                latitud: None,
                longitud: None,
            },
        )
        .unwrap();
        let e: Especie = records::create(
            conn,
            EspeciePayload {
                nombre_cientifico: "Melia azedarach".into(),
                nombre_comun: "Paraiso".into(),
                origen: "exotico".into(),
            },
        )
        .unwrap();
        (e.id_especie, m.id_municipio)
    }

    pub(crate) fn arbol_payload(id_especie: i32, id_municipio: i32) -> ArbolPayload {
        ArbolPayload {
            id_especie,
            id_municipio,
            ubicacion: Some("-36.6167, -64.2833".into()),
            calle: Some("avenida san martin".into()),
            numero_aprox: Some(250),
            identificacion: None,
            barrio: Some(" centro ".into()),
            fecha_censo: NaiveDate::from_ymd_opt(2023, 11, 3),
            id_usuario: None,
            entorno: EntornoPayload {
                altura: Some("3-5 m".into()),
                diametro_tronco: Some("10-30 cm".into()),
                ambito: Some("urbano".into()),
                ancho_vereda: Some(2.5),
                ..EntornoPayload::default()
            },
        }
    }

    #[test]
    fn test_arbol_round_trip() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);
        let created: Arbol = records::create(&mut conn, arbol_payload(e, m)).unwrap();
        assert_eq!(created.calle.as_deref(), Some("Avenida San Martin"));
        assert_eq!(created.barrio.as_deref(), Some("Centro"));
        assert_eq!(created.altura.as_deref(), Some("3-5 m"));
        assert_eq!(created.fecha_censo, NaiveDate::from_ymd_opt(2023, 11, 3));

        let read: Arbol = records::read(&mut conn, created.id_arbol).unwrap();
        assert_eq!(read, created);
    }

    #[test]
    fn test_arbol_height_outside_set_names_field() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);
        let mut payload = arbol_payload(e, m);
        payload.entorno.altura = Some("10 m".into());
        let err = records::create::<Arbol>(&mut conn, payload).unwrap_err();
        assert!(matches!(err, RecordError::Validation { field: "altura", .. }));
    }

    #[test]
    fn test_arbol_every_enumerated_value_is_accepted() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);
        for value in crate::catalog::TIPOS_CABLEADO {
            let mut payload = arbol_payload(e, m);
            payload.entorno.tipo_cableado = Some(value.to_uppercase());
            let a: Arbol = records::create(&mut conn, payload).unwrap();
            assert_eq!(a.tipo_cableado.as_deref(), Some(*value));
        }
        let mut payload = arbol_payload(e, m);
        payload.entorno.tipo_intervencion = Some("tala".into());
        let err = records::create::<Arbol>(&mut conn, payload).unwrap_err();
        assert_eq!(err.field(), Some("tipo_intervencion"));
    }

    #[test]
    fn test_arbol_enumerated_sets_accept_every_member() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);
        let sets: [(&str, &[&str], &str); 4] = [
            ("diametro_tronco", DIAMETROS_TRONCO, "> 100 cm"),
            ("ambito", AMBITOS, "periurbano"),
            ("interferencia_aerea", INTERFERENCIAS_AEREAS, "total"),
            ("tipo_intervencion", TIPOS_INTERVENCION, "tala"),
        ];

        for (field, members, outsider) in sets {
            for member in members {
                let mut body = json!({"id_especie": e, "id_municipio": m});
                body[field] = json!(member.to_uppercase());
                if field == "interferencia_aerea" && *member != SIN_INTERFERENCIA {
                    body["especificacion_interferencia"] = json!("ramas sobre el cableado");
                }
                let payload: ArbolPayload = serde_json::from_value(body).unwrap();
                let a: Arbol = records::create(&mut conn, payload).unwrap();
                assert_eq!(serde_json::to_value(&a).unwrap()[field], *member, "{}", field);
            }

            let mut body = json!({"id_especie": e, "id_municipio": m});
            body[field] = json!(outsider);
            let payload: ArbolPayload = serde_json::from_value(body).unwrap();
            let err = records::create::<Arbol>(&mut conn, payload).unwrap_err();
            assert_eq!(err.field(), Some(field));
        }
    }

    #[test]
    fn test_arbol_interference_rule() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);

        let mut payload = arbol_payload(e, m);
        payload.entorno.interferencia_aerea = Some("alta".into());
        let err = records::create::<Arbol>(&mut conn, payload).unwrap_err();
        assert_eq!(err.field(), Some("especificacion_interferencia"));

        let mut payload = arbol_payload(e, m);
        payload.entorno.especificacion_interferencia = Some("cableado".into());
        assert!(records::create::<Arbol>(&mut conn, payload).is_err());

        let mut payload = arbol_payload(e, m);
        payload.entorno.interferencia_aerea = Some("alta".into());
        payload.entorno.especificacion_interferencia = Some("cableado de media tension".into());
        let a: Arbol = records::create(&mut conn, payload).unwrap();
        assert_eq!(a.interferencia_aerea.as_deref(), Some("alta"));
    }

    #[test]
    fn test_arbol_missing_references() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);

        let err = records::create::<Arbol>(&mut conn, arbol_payload(e + 100, m)).unwrap_err();
        assert!(matches!(err, RecordError::MissingReference { field: "id_especie", .. }));

        let mut payload = arbol_payload(e, m);
        payload.entorno.id_estado_copa = Some(42);
        let err = records::create::<Arbol>(&mut conn, payload).unwrap_err();
        assert!(matches!(err, RecordError::MissingReference { field: "id_estado_copa", id: 42, .. }));
    }

    #[test]
    fn test_arbol_census_date_not_in_future() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);
        let mut payload = arbol_payload(e, m);
        payload.fecha_censo = chrono::Local::now().date_naive().succ_opt();
        let err = records::create::<Arbol>(&mut conn, payload).unwrap_err();
        assert_eq!(err.field(), Some("fecha_censo"));
    }

    #[test]
    fn test_interferencia_lifecycle() {
        let (_dir, _db, mut conn) = testing::session();
        let (e, m) = fixtures(&mut conn);
        let a: Arbol = records::create(&mut conn, arbol_payload(e, m)).unwrap();
        let t: TipoInterferencia =
            records::create(&mut conn, TipoInterferenciaPayload { nombre_tipo: "cableado".into() }).unwrap();

        let i: Interferencia = records::create(
            &mut conn,
            InterferenciaPayload {
                id_arbol: a.id_arbol,
                id_tipo_interferencia: t.id_tipo_interferencia,
                descripcion: Some("  cables de baja tension ".into()),
            },
        )
        .unwrap();
        assert_eq!(i.descripcion.as_deref(), Some("cables de baja tension"));

        // the type is in use
        let err = records::delete::<TipoInterferencia>(&mut conn, t.id_tipo_interferencia).unwrap_err();
        assert_eq!(err.kind(), "integrity_failure");

        // the tree takes its interference records with it
        records::delete::<Arbol>(&mut conn, a.id_arbol).unwrap();
        assert!(records::read::<Interferencia>(&mut conn, i.id_interferencia).is_err());
        records::delete::<TipoInterferencia>(&mut conn, t.id_tipo_interferencia).unwrap();
    }
}
