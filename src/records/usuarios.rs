//! Roles and users

use super::{ensure_unique, fold_case, restrict, Record};
use crate::error::{RecordError, Result};
use crate::schema::{arbol, medicion, role, usuario};
use crate::validation;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};

// ============================================================================
// Role
// ============================================================================

/// A named set of survey permissions
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = role)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Role {
    pub id_role: i32,
    pub role_name: String,
    pub can_manage_users: bool,
    pub can_manage_all_relevamientos: bool,
    pub can_create_relevamientos: bool,
    pub can_modify_own_relevamientos: bool,
    pub can_generate_reports: bool,
    pub can_manage_municipio_data: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolePayload {
    pub role_name: String,
    #[serde(default)]
    pub can_manage_users: bool,
    #[serde(default)]
    pub can_manage_all_relevamientos: bool,
    #[serde(default)]
    pub can_create_relevamientos: bool,
    #[serde(default)]
    pub can_modify_own_relevamientos: bool,
    #[serde(default)]
    pub can_generate_reports: bool,
    #[serde(default)]
    pub can_manage_municipio_data: bool,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = role)]
pub struct NewRole {
    pub role_name: String,
    pub can_manage_users: bool,
    pub can_manage_all_relevamientos: bool,
    pub can_create_relevamientos: bool,
    pub can_modify_own_relevamientos: bool,
    pub can_generate_reports: bool,
    pub can_manage_municipio_data: bool,
}

impl Record for Role {
    type Payload = RolePayload;
    type Values = NewRole;

    const ENTITY: &'static str = "role";
    const COLLECTION: &'static str = "roles";

    fn validate(payload: RolePayload, _today: NaiveDate) -> Result<NewRole> {
        Ok(NewRole {
            role_name: validation::required("role_name", &payload.role_name)?,
            can_manage_users: payload.can_manage_users,
            can_manage_all_relevamientos: payload.can_manage_all_relevamientos,
            can_create_relevamientos: payload.can_create_relevamientos,
            can_modify_own_relevamientos: payload.can_modify_own_relevamientos,
            can_generate_reports: payload.can_generate_reports,
            can_manage_municipio_data: payload.can_manage_municipio_data,
        })
    }

    fn check_unique(conn: &mut SqliteConnection, values: &NewRole, exclude: Option<i32>) -> Result<()> {
        let matches: Vec<i32> = role::table
            .filter(fold_case(role::role_name).eq(values.role_name.to_lowercase()))
            .select(role::id_role)
            .load(conn)?;
        ensure_unique(Self::ENTITY, matches, exclude, || format!("role_name '{}'", values.role_name))
    }

    fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
        let usuarios: i64 = usuario::table
            .filter(usuario::id_role.eq(id))
            .count()
            .get_result(conn)?;
        restrict(Self::ENTITY, id, "usuario", usuarios)
    }

    table_storage!(role, id_role);
}

// ============================================================================
// Usuario
// ============================================================================

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = usuario)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Usuario {
    pub id_usuario: i32,
    pub id_municipio: i32,
    pub id_role: i32,
    pub nombre: String,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: NaiveDate,
    /// Id of the user that registered this one, if still present
    pub created_by: Option<i32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsuarioPayload {
    pub id_municipio: i32,
    pub id_role: i32,
    pub nombre: String,
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    /// Defaults to today
    #[serde(default)]
    pub date_joined: Option<NaiveDate>,
    #[serde(default)]
    pub created_by: Option<i32>,
}

#[derive(Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = usuario)]
#[diesel(treat_none_as_null = true)]
pub struct NewUsuario {
    pub id_municipio: i32,
    pub id_role: i32,
    pub nombre: String,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: NaiveDate,
    pub created_by: Option<i32>,
}

impl Record for Usuario {
    type Payload = UsuarioPayload;
    type Values = NewUsuario;

    const ENTITY: &'static str = "usuario";
    const COLLECTION: &'static str = "usuarios";

    fn validate(payload: UsuarioPayload, today: NaiveDate) -> Result<NewUsuario> {
        let date_joined = payload.date_joined.unwrap_or(today);
        Ok(NewUsuario {
            id_municipio: payload.id_municipio,
            id_role: payload.id_role,
            nombre: validation::title_case(&validation::required("nombre", &payload.nombre)?),
            email: validation::email("email", &payload.email)?,
            is_active: payload.is_active,
            is_superuser: payload.is_superuser,
            date_joined: validation::not_in_future("date_joined", date_joined, today)?,
            created_by: payload.created_by,
        })
    }

    fn check_references(conn: &mut SqliteConnection, values: &NewUsuario, id: Option<i32>) -> Result<()> {
        require_row!(conn, municipio, "id_municipio", values.id_municipio);
        require_row!(conn, role, "id_role", values.id_role);
        if values.created_by.is_some() && values.created_by == id {
            return Err(RecordError::validation("created_by", "a user cannot be their own creator"));
        }
        require_optional_row!(conn, usuario, "created_by", values.created_by);
        Ok(())
    }

    fn check_unique(conn: &mut SqliteConnection, values: &NewUsuario, exclude: Option<i32>) -> Result<()> {
        let matches: Vec<i32> = usuario::table
            .filter(fold_case(usuario::email).eq(&values.email))
            .select(usuario::id_usuario)
            .load(conn)?;
        ensure_unique(Self::ENTITY, matches, exclude, || format!("email '{}'", values.email))
    }

    /// Users are only ever referenced by id: clear the references.
    fn release_dependents(conn: &mut SqliteConnection, id: i32) -> Result<()> {
        diesel::update(usuario::table.filter(usuario::created_by.eq(id)))
            .set(usuario::created_by.eq(None::<i32>))
            .execute(conn)?;
        diesel::update(arbol::table.filter(arbol::id_usuario.eq(id)))
            .set(arbol::id_usuario.eq(None::<i32>))
            .execute(conn)?;
        diesel::update(medicion::table.filter(medicion::id_usuario.eq(id)))
            .set(medicion::id_usuario.eq(None::<i32>))
            .execute(conn)?;
        Ok(())
    }

    table_storage!(usuario, id_usuario);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{self, testing, Municipio, MunicipioPayload, Provincia, ProvinciaPayload};

    fn role_payload(name: &str) -> RolePayload {
        RolePayload {
            role_name: name.to_string(),
            can_manage_users: true,
            can_manage_all_relevamientos: false,
            can_create_relevamientos: true,
            can_modify_own_relevamientos: true,
            can_generate_reports: false,
            can_manage_municipio_data: false,
        }
    }

    /// (municipio id, role id)
    fn fixtures(conn: &mut SqliteConnection) -> (i32, i32) {
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
        let r: Role = records::create(conn, role_payload("Relevador")).unwrap();
        (m.id_municipio, r.id_role)
    }

    fn usuario_payload(id_municipio: i32, id_role: i32, email: &str) -> UsuarioPayload {
        UsuarioPayload {
            id_municipio,
            id_role,
            nombre: "ana  pérez".into(),
            email: email.into(),
            is_active: true,
            is_superuser: false,
            date_joined: None,
            created_by: None,
        }
    }

    #[test]
    fn test_role_name_unique_case_insensitive() {
        let (_dir, _db, mut conn) = testing::session();
        let r: Role = records::create(&mut conn, role_payload("  AdminMunicipio ")).unwrap();
        assert_eq!(r.role_name, "AdminMunicipio");
        assert!(r.can_manage_users);
        let err = records::create::<Role>(&mut conn, role_payload("adminmunicipio")).unwrap_err();
        assert_eq!(err.kind(), "duplicate");
    }

    #[test]
    fn test_role_name_uniqueness_folds_accented_capitals() {
        let (_dir, _db, mut conn) = testing::session();
        records::create::<Role>(&mut conn, role_payload("ADMINISTRACIÓN")).unwrap();
        let err = records::create::<Role>(&mut conn, role_payload("administración")).unwrap_err();
        assert_eq!(err.kind(), "duplicate");
        assert_eq!(err.status_code(), 400);
        let all: Vec<Role> = records::list(&mut conn, 0, 10).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_usuario_normalization_and_defaults() {
        let (_dir, _db, mut conn) = testing::session();
        let (m, r) = fixtures(&mut conn);
        let u: Usuario = records::create(&mut conn, usuario_payload(m, r, " Ana.Perez@Example.ORG ")).unwrap();
        assert_eq!(u.nombre, "Ana Pérez");
        assert_eq!(u.email, "ana.perez@example.org");
        assert!(u.is_active);
        assert_eq!(u.date_joined, chrono::Local::now().date_naive());
        assert_eq!(u.created_by, None);
    }

    #[test]
    fn test_usuario_email_unique() {
        let (_dir, _db, mut conn) = testing::session();
        let (m, r) = fixtures(&mut conn);
        records::create::<Usuario>(&mut conn, usuario_payload(m, r, "ana@example.org")).unwrap();
        let err = records::create::<Usuario>(&mut conn, usuario_payload(m, r, "ANA@example.org")).unwrap_err();
        assert!(matches!(err, RecordError::Duplicate { entity: "usuario", .. }));
    }

    #[test]
    fn test_usuario_join_date_not_in_future() {
        let (_dir, _db, mut conn) = testing::session();
        let (m, r) = fixtures(&mut conn);
        let mut payload = usuario_payload(m, r, "ana@example.org");
        payload.date_joined = chrono::Local::now().date_naive().succ_opt();
        let err = records::create::<Usuario>(&mut conn, payload).unwrap_err();
        assert_eq!(err.field(), Some("date_joined"));
    }

    #[test]
    fn test_usuario_references() {
        let (_dir, _db, mut conn) = testing::session();
        let (m, r) = fixtures(&mut conn);

        let err = records::create::<Usuario>(&mut conn, usuario_payload(m, r + 50, "a@example.org")).unwrap_err();
        assert!(matches!(err, RecordError::MissingReference { field: "id_role", .. }));

        let mut payload = usuario_payload(m, r, "a@example.org");
        payload.created_by = Some(999);
        let err = records::create::<Usuario>(&mut conn, payload).unwrap_err();
        assert!(matches!(err, RecordError::MissingReference { field: "created_by", id: 999, .. }));
    }

    #[test]
    fn test_usuario_cannot_create_itself() {
        let (_dir, _db, mut conn) = testing::session();
        let (m, r) = fixtures(&mut conn);
        let u: Usuario = records::create(&mut conn, usuario_payload(m, r, "a@example.org")).unwrap();
        let mut payload = usuario_payload(m, r, "a@example.org");
        payload.created_by = Some(u.id_usuario);
        let err = records::update::<Usuario>(&mut conn, u.id_usuario, payload).unwrap_err();
        assert_eq!(err.field(), Some("created_by"));
    }

    #[test]
    fn test_deleting_creator_clears_back_reference() {
        let (_dir, _db, mut conn) = testing::session();
        let (m, r) = fixtures(&mut conn);
        let admin: Usuario = records::create(&mut conn, usuario_payload(m, r, "admin@example.org")).unwrap();
        let mut payload = usuario_payload(m, r, "relevador@example.org");
        payload.created_by = Some(admin.id_usuario);
        let relevador: Usuario = records::create(&mut conn, payload).unwrap();
        assert_eq!(relevador.created_by, Some(admin.id_usuario));

        records::delete::<Usuario>(&mut conn, admin.id_usuario).unwrap();
        let relevador: Usuario = records::read(&mut conn, relevador.id_usuario).unwrap();
        assert_eq!(relevador.created_by, None);
    }

    #[test]
    fn test_role_delete_restricted_by_users() {
        let (_dir, _db, mut conn) = testing::session();
        let (m, r) = fixtures(&mut conn);
        records::create::<Usuario>(&mut conn, usuario_payload(m, r, "a@example.org")).unwrap();
        let err = records::delete::<Role>(&mut conn, r).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }
}
