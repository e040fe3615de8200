//! Enumerated value sets accepted by census fields
//!
//! Each set lists the canonical spelling stored in the database. Input is
//! matched case-insensitively against these.

use serde::Serialize;

/// Tree height ranges
pub const ALTURAS: &[&str] = &["1-2 m", ">3 m", "3-5 m", "> 5m"];

/// Trunk diameter ranges
pub const DIAMETROS_TRONCO: &[&str] = &["0-10 cm", "10-30 cm", "30-60 cm", "> 60 cm"];

/// Setting the tree grows in
pub const AMBITOS: &[&str] = &["urbano", "rural"];

/// Aerial interference level. `no` means no interference.
pub const INTERFERENCIAS_AEREAS: &[&str] = &["no", "baja", "media", "alta"];

/// The level that counts as "no aerial interference"
pub const SIN_INTERFERENCIA: &str = "no";

pub const TIPOS_CABLEADO: &[&str] = &[
    "baja tension",
    "media tension",
    "alta tension",
    "telefonia",
    "fibra optica",
    "alumbrado",
];

pub const TIPOS_INTERVENCION: &[&str] = &[
    "poda",
    "extraccion",
    "tratamiento fitosanitario",
    "reemplazo",
    "control de plagas",
];

pub const TIPOS_FOTO: &[&str] = &["censo", "estado_fitosanitario", "dano"];

/// Species origin
pub const ORIGENES: &[&str] = &["nativo", "exotico"];

// Default rows for the free-form lookup tables, created by `arbolado init`
pub const ESTADOS_FITOSANITARIOS: &[&str] = &["Bueno", "Regular", "Malo", "Seco"];
pub const CONDICIONES_CRECIMIENTO: &[&str] = &["Buena", "Regular", "Mala"];
pub const TIPOS_INTERFERENCIA: &[&str] = &["Cableado", "Luminaria", "Edificacion", "Señalizacion"];

/// All enumerated sets, keyed by the field they constrain
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub altura: &'static [&'static str],
    pub diametro_tronco: &'static [&'static str],
    pub ambito: &'static [&'static str],
    pub interferencia_aerea: &'static [&'static str],
    pub tipo_cableado: &'static [&'static str],
    pub tipo_intervencion: &'static [&'static str],
    pub tipo_foto: &'static [&'static str],
    pub origen: &'static [&'static str],
}

impl Catalog {
    pub fn current() -> Self {
        Self {
            altura: ALTURAS,
            diametro_tronco: DIAMETROS_TRONCO,
            ambito: AMBITOS,
            interferencia_aerea: INTERFERENCIAS_AEREAS,
            tipo_cableado: TIPOS_CABLEADO,
            tipo_intervencion: TIPOS_INTERVENCION,
            tipo_foto: TIPOS_FOTO,
            origen: ORIGENES,
        }
    }

    /// (field, values) pairs in display order
    pub fn entries(&self) -> Vec<(&'static str, &'static [&'static str])> {
        vec![
            ("altura", self.altura),
            ("diametro_tronco", self.diametro_tronco),
            ("ambito", self.ambito),
            ("interferencia_aerea", self.interferencia_aerea),
            ("tipo_cableado", self.tipo_cableado),
            ("tipo_intervencion", self.tipo_intervencion),
            ("tipo_foto", self.tipo_foto),
            ("origen", self.origen),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_have_no_case_insensitive_duplicates() {
        for (field, values) in Catalog::current().entries() {
            let mut lowered: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
            lowered.sort();
            lowered.dedup();
            assert_eq!(lowered.len(), values.len(), "duplicate value in {}", field);
        }
    }

    #[test]
    fn test_falsy_interference_level_is_listed() {
        assert!(INTERFERENCIAS_AEREAS.contains(&SIN_INTERFERENCIA));
    }

    #[test]
    fn test_catalog_serializes_by_field() {
        let json = serde_json::to_value(Catalog::current()).unwrap();
        assert_eq!(json["altura"][0], "1-2 m");
        assert_eq!(json["origen"], serde_json::json!(["nativo", "exotico"]));
    }
}
