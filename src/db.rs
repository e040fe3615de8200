//! SQLite database with Diesel ORM
//!
//! Holds the census tables (territory, species, users, trees, measurements,
//! photos and their lookup tables). The schema is bootstrapped with raw SQL
//! on open, so a fresh file is usable immediately.

use crate::config::DatabaseConfig;
use crate::schema::schema_versions;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PoolError, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current schema version for arbolado
pub const CURRENT_SCHEMA: CensusSchema = CensusSchema {
    major: 1,
    minor: 0,
    patch: 0,
    name: "arbolado-census",
    features: &[
        "territorio",
        "especies",
        "usuarios",
        "catalogos",
        "arboles",
        "mediciones",
        "fotos",
    ],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct CensusSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl CensusSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for CensusSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

/// Insertable schema version
#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
struct NewSchemaVersion<'a> {
    version: &'a str,
    name: &'a str,
    features: &'a str,
    introduced_at: &'a str,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// A pooled connection. One is checked out per request and acts as that
/// request's session.
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}

pub type Result<T> = std::result::Result<T, DbError>;

diesel::define_sql_function! {
    /// Unicode lower-casing, matching `str::to_lowercase`. Registered on
    /// every pooled connection.
    fn fold_case(x: diesel::sql_types::Text) -> diesel::sql_types::Text;
}

/// Per-connection SQLite settings, applied whenever the pool opens a connection
#[derive(Debug)]
struct SqlitePragmas {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        diesel::sql_query("PRAGMA foreign_keys = ON")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        fold_case_utils::register_impl(conn, |value: String| value.to_lowercase())
            .map_err(diesel::r2d2::Error::QueryError)?;
        Ok(())
    }
}

/// Database connection wrapper with connection pool
pub struct Database {
    pool: DbPool,
    path: PathBuf,
}

/// Turn a connection string into a filesystem path.
///
/// Accepts plain paths as well as `sqlite://path` and `sqlite:path`.
pub fn database_path(url: &str) -> PathBuf {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    PathBuf::from(path)
}

impl Database {
    /// Open the database described by the configuration
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = database_path(&config.url);
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| DbError::Connection(e.to_string()))?;
            }
        }
        Self::open_with(&path, config.pool_size, config.busy_timeout_ms)
    }

    /// Open database at specified path with default pool settings
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = DatabaseConfig::default();
        Self::open_with(path.as_ref(), defaults.pool_size, defaults.busy_timeout_ms)
    }

    fn open_with(path: &Path, pool_size: u32, busy_timeout_ms: u32) -> Result<Self> {
        let path_str = path.to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(SqlitePragmas { busy_timeout_ms }))
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self {
            pool,
            path: path.to_path_buf(),
        };
        db.init_schema()?;
        tracing::debug!(path = %db.path.display(), "database ready");
        Ok(db)
    }

    /// Path of the underlying SQLite file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check out a connection for the duration of one unit of work
    pub fn session(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.session()?;

        // Run raw SQL to create tables if they don't exist
        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS provincia (
                id_provincia INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                nombre TEXT NOT NULL COLLATE NOCASE UNIQUE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS municipio (
                id_municipio INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                id_provincia INTEGER NOT NULL REFERENCES provincia(id_provincia),
                nombre TEXT NOT NULL COLLATE NOCASE,
                latitud REAL,
                longitud REAL,
                UNIQUE (id_provincia, nombre)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS especie (
                id_especie INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                nombre_cientifico TEXT NOT NULL COLLATE NOCASE UNIQUE,
                nombre_comun TEXT NOT NULL,
                origen TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS role (
                id_role INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                role_name TEXT NOT NULL COLLATE NOCASE UNIQUE,
                can_manage_users INTEGER NOT NULL DEFAULT 0,
                can_manage_all_relevamientos INTEGER NOT NULL DEFAULT 0,
                can_create_relevamientos INTEGER NOT NULL DEFAULT 0,
                can_modify_own_relevamientos INTEGER NOT NULL DEFAULT 0,
                can_generate_reports INTEGER NOT NULL DEFAULT 0,
                can_manage_municipio_data INTEGER NOT NULL DEFAULT 0
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS usuario (
                id_usuario INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                id_municipio INTEGER NOT NULL REFERENCES municipio(id_municipio),
                id_role INTEGER NOT NULL REFERENCES role(id_role),
                nombre TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_superuser INTEGER NOT NULL DEFAULT 0,
                date_joined TEXT NOT NULL,
                created_by INTEGER REFERENCES usuario(id_usuario)
            )
        "#).execute(&mut conn)?;

        // Lookup tables
        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS altura (
                id_altura INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                rango_altura TEXT NOT NULL UNIQUE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS diametrotronco (
                id_diametro INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                rango_diametro TEXT NOT NULL UNIQUE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS estadofitosanitario (
                id_estado INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                nombre_estado TEXT NOT NULL COLLATE NOCASE UNIQUE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS condicionescrecimiento (
                id_condicion INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                nombre_condicion TEXT NOT NULL COLLATE NOCASE UNIQUE
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS tipointerferencia (
                id_tipo_interferencia INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                nombre_tipo TEXT NOT NULL COLLATE NOCASE UNIQUE
            )
        "#).execute(&mut conn)?;

        // Census tables
        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS arbol (
                id_arbol INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                id_especie INTEGER NOT NULL REFERENCES especie(id_especie),
                id_municipio INTEGER NOT NULL REFERENCES municipio(id_municipio),
                ubicacion TEXT,
                calle TEXT,
                numero_aprox INTEGER,
                identificacion TEXT,
                barrio TEXT,
                altura TEXT,
                diametro_tronco TEXT,
                id_estado_copa INTEGER REFERENCES estadofitosanitario(id_estado),
                id_estado_tronco INTEGER REFERENCES estadofitosanitario(id_estado),
                id_estado_base INTEGER REFERENCES estadofitosanitario(id_estado),
                id_condicion INTEGER REFERENCES condicionescrecimiento(id_condicion),
                ambito TEXT,
                ancho_vereda REAL,
                distancia_otros_ejemplares REAL,
                distancia_cordon REAL,
                interferencia_aerea TEXT,
                especificacion_interferencia TEXT,
                tipo_cableado TEXT,
                requiere_intervencion INTEGER NOT NULL DEFAULT 0,
                tipo_intervencion TEXT,
                tratamiento_previo TEXT,
                cazuela TEXT,
                protegido INTEGER NOT NULL DEFAULT 0,
                detalles_arbol TEXT,
                absorcion_co2 REAL,
                edad INTEGER,
                fecha_censo TEXT,
                id_usuario INTEGER REFERENCES usuario(id_usuario)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS interferencia (
                id_interferencia INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                id_arbol INTEGER NOT NULL REFERENCES arbol(id_arbol),
                id_tipo_interferencia INTEGER NOT NULL REFERENCES tipointerferencia(id_tipo_interferencia),
                descripcion TEXT
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS medicion (
                id_medicion INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                id_arbol INTEGER NOT NULL REFERENCES arbol(id_arbol),
                fecha_medicion TEXT,
                ubicacion TEXT,
                calle TEXT,
                numero_aprox INTEGER,
                barrio TEXT,
                altura TEXT,
                diametro_tronco TEXT,
                id_estado_copa INTEGER REFERENCES estadofitosanitario(id_estado),
                id_estado_tronco INTEGER REFERENCES estadofitosanitario(id_estado),
                id_estado_base INTEGER REFERENCES estadofitosanitario(id_estado),
                id_condicion INTEGER REFERENCES condicionescrecimiento(id_condicion),
                ambito TEXT,
                ancho_vereda REAL,
                distancia_otros_ejemplares REAL,
                distancia_cordon REAL,
                interferencia_aerea TEXT,
                especificacion_interferencia TEXT,
                tipo_cableado TEXT,
                requiere_intervencion INTEGER NOT NULL DEFAULT 0,
                tipo_intervencion TEXT,
                tratamiento_previo TEXT,
                cazuela TEXT,
                protegido INTEGER NOT NULL DEFAULT 0,
                detalles_arbol TEXT,
                absorcion_co2 REAL,
                edad INTEGER,
                id_usuario INTEGER REFERENCES usuario(id_usuario),
                tipo_dano TEXT,
                intervencion_programada INTEGER NOT NULL DEFAULT 0,
                imagen_dano TEXT
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS foto (
                id_foto INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                id_medicion INTEGER NOT NULL REFERENCES medicion(id_medicion),
                tipo_foto TEXT NOT NULL,
                ruta_foto TEXT NOT NULL,
                UNIQUE (id_medicion, tipo_foto)
            )
        "#).execute(&mut conn)?;

        // Create indexes on foreign keys
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_municipio_provincia ON municipio(id_provincia)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_usuario_municipio ON usuario(id_municipio)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_usuario_role ON usuario(id_role)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_arbol_especie ON arbol(id_especie)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_arbol_municipio ON arbol(id_municipio)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_interferencia_arbol ON interferencia(id_arbol)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_medicion_arbol ON medicion(id_arbol)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_foto_medicion ON foto(id_medicion)").execute(&mut conn)?;

        // Register current schema
        self.register_schema(&mut conn, &CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(&self, conn: &mut SqliteConnection, schema: &CensusSchema) -> Result<()> {
        let now = chrono::Local::now().to_rfc3339();
        let features_json = serde_json::to_string(&schema.features).unwrap_or_default();

        let new_schema = NewSchemaVersion {
            version: &schema.version_string(),
            name: schema.name,
            features: &features_json,
            introduced_at: &now,
        };

        diesel::insert_or_ignore_into(schema_versions::table)
            .values(&new_schema)
            .execute(conn)?;

        Ok(())
    }

    /// Latest schema version recorded in this database file
    pub fn stored_schema_version(&self) -> Result<Option<String>> {
        let mut conn = self.session()?;
        let version = schema_versions::table
            .order(schema_versions::id.desc())
            .select(schema_versions::version)
            .first::<String>(&mut conn)
            .optional()?;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_database_path_strips_scheme() {
        assert_eq!(database_path("sqlite://data/census.db"), PathBuf::from("data/census.db"));
        assert_eq!(database_path("sqlite:census.db"), PathBuf::from("census.db"));
        assert_eq!(database_path("  census.db "), PathBuf::from("census.db"));
    }

    #[test]
    fn test_schema_version_string() {
        assert_eq!(CURRENT_SCHEMA.version_string(), "1.0.0");
        assert_eq!(CURRENT_SCHEMA.to_string(), "v1.0.0 (arbolado-census)");
    }

    #[test]
    fn test_open_registers_schema_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("census.db");

        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.stored_schema_version().unwrap().as_deref(), Some("1.0.0"));
        drop(db);

        // Re-opening is idempotent
        let db = Database::open_at(&path).unwrap();
        let mut conn = db.session().unwrap();
        let count: i64 = schema_versions::table.count().get_result(&mut conn).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("nested/census.db").display()),
            ..DatabaseConfig::default()
        };
        let db = Database::open(&config).unwrap();
        assert!(db.path().exists());
    }
}
