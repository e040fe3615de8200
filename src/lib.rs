//! Arbolado - urban tree census record service
//!
//! Keeps the census of a municipality's street trees: where each tree
//! stands, its species, and the condition recorded at census time and at
//! every later measurement.
//!
//! # Overview
//!
//! Every entity is exposed as a JSON collection with create, read, list,
//! update and delete. Payloads are normalized and validated before they
//! reach the database, and references between entities are checked in
//! application code so that errors name the offending field.
//!
//! | Collection | Holds |
//! |------------|-------|
//! | `provincias`, `municipios` | Territory |
//! | `especies` | Tree species |
//! | `roles`, `usuarios` | Surveyors and their permissions |
//! | `alturas`, `diametros`, `estados`, `condiciones`, `tipos_interferencia` | Lookup tables |
//! | `arboles` | Census records |
//! | `mediciones`, `fotos` | Follow-up measurements and their photos |
//! | `interferencias` | Interferences recorded for a tree |
//!
//! # Quick Start
//!
//! ```no_run
//! use arbolado::records::{self, Provincia, ProvinciaPayload};
//! use arbolado::Database;
//!
//! let db = Database::open_at("arbolado.db").unwrap();
//! let mut conn = db.session().unwrap();
//!
//! let created: Provincia = records::create(&mut conn, ProvinciaPayload { nombre: "la pampa".into() }).unwrap();
//! assert_eq!(created.nombre, "La Pampa");
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod records;
pub mod schema;
pub mod serve;
pub mod validation;

pub use api::ApiReply;
pub use config::Config;
pub use db::{Database, DbConn, DbError, CURRENT_SCHEMA};
pub use error::RecordError;
pub use records::Record;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        let _ = CURRENT_SCHEMA;
        assert_eq!(<records::Arbol as Record>::COLLECTION, "arboles");
    }
}
