//! Request routing and status mapping
//!
//! Independent of the socket layer: [`handle`] takes the method, URL and body
//! of a request plus the session it should run on, and returns the status and
//! JSON body to send back. `serve` feeds it from tiny_http; tests call it
//! directly.

use crate::catalog::Catalog;
use crate::config::PaginationConfig;
use crate::db::CURRENT_SCHEMA;
use crate::error::RecordError;
use crate::records::{
    self, Altura, Arbol, CondicionesCrecimiento, DiametroTronco, Especie, EstadoFitosanitario, Foto,
    Interferencia, Medicion, Municipio, Provincia, Record, Role, TipoInterferencia, Usuario,
};
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use tiny_http::Method;

/// Status and serialized JSON body of a response. `body` is `None` for 204.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: String,
    field: Option<&'a str>,
}

#[derive(Serialize)]
struct Health {
    ok: bool,
    schema: String,
}

impl ApiReply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status,
                body: Some(body),
            },
            Err(e) => Self::error(500, "storage_error", format!("failed to encode response: {}", e), None),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    /// An error reply with the standard `{error, detail, field}` body
    pub fn error(status: u16, kind: &str, detail: String, field: Option<&str>) -> Self {
        let body = ErrorBody {
            error: kind,
            detail,
            field,
        };
        Self {
            status,
            // An ErrorBody of plain strings always serializes
            body: serde_json::to_string(&body).ok(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::error(400, "bad_request", detail.into(), None)
    }

    fn not_found(path: &str) -> Self {
        Self::error(404, "not_found", format!("no route for {}", path), None)
    }

    fn method_not_allowed(method: &Method, path: &str) -> Self {
        Self::error(405, "method_not_allowed", format!("{} is not allowed on {}", method, path), None)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<RecordError> for ApiReply {
    fn from(err: RecordError) -> Self {
        if let RecordError::Storage(ref cause) = err {
            tracing::error!(error = %cause, "storage failure");
        }
        Self::error(err.status_code(), err.kind(), err.to_string(), err.field())
    }
}

/// One request, already split into route parts
struct ApiRequest<'a> {
    method: &'a Method,
    path: &'a str,
    id: Option<&'a str>,
    query: Option<&'a str>,
    body: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default, alias = "offset")]
    skip: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

type Handler = fn(&mut SqliteConnection, &PaginationConfig, &ApiRequest<'_>) -> Result<ApiReply, ApiReply>;

/// Collection path segment → CRUD handler for its entity
const ROUTES: &[(&str, Handler)] = &[
    (Provincia::COLLECTION, dispatch::<Provincia>),
    (Municipio::COLLECTION, dispatch::<Municipio>),
    (Especie::COLLECTION, dispatch::<Especie>),
    (Role::COLLECTION, dispatch::<Role>),
    (Usuario::COLLECTION, dispatch::<Usuario>),
    (Altura::COLLECTION, dispatch::<Altura>),
    (DiametroTronco::COLLECTION, dispatch::<DiametroTronco>),
    (EstadoFitosanitario::COLLECTION, dispatch::<EstadoFitosanitario>),
    (CondicionesCrecimiento::COLLECTION, dispatch::<CondicionesCrecimiento>),
    (TipoInterferencia::COLLECTION, dispatch::<TipoInterferencia>),
    (Interferencia::COLLECTION, dispatch::<Interferencia>),
    (Arbol::COLLECTION, dispatch::<Arbol>),
    (Medicion::COLLECTION, dispatch::<Medicion>),
    (Foto::COLLECTION, dispatch::<Foto>),
];

/// Names of every CRUD collection, in routing order
pub fn collections() -> impl Iterator<Item = &'static str> {
    ROUTES.iter().map(|(name, _)| *name)
}

/// Route one request and run it on `conn`
pub fn handle(
    conn: &mut SqliteConnection,
    pagination: &PaginationConfig,
    method: &Method,
    url: &str,
    body: &str,
) -> ApiReply {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["health"] => match method {
            Method::Get => ApiReply::json(
                200,
                &Health {
                    ok: true,
                    schema: CURRENT_SCHEMA.version_string(),
                },
            ),
            _ => ApiReply::method_not_allowed(method, path),
        },
        ["catalogo"] => match method {
            Method::Get => ApiReply::json(200, &Catalog::current()),
            _ => ApiReply::method_not_allowed(method, path),
        },
        [collection] | [collection, _] => {
            let Some((_, handler)) = ROUTES.iter().find(|(name, _)| name == collection) else {
                return ApiReply::not_found(path);
            };
            let request = ApiRequest {
                method,
                path,
                id: segments.get(1).copied(),
                query,
                body,
            };
            handler(conn, pagination, &request).unwrap_or_else(|reply| reply)
        }
        _ => ApiReply::not_found(path),
    }
}

fn parse_id(raw: &str) -> Result<i32, ApiReply> {
    raw.parse()
        .map_err(|_| ApiReply::bad_request(format!("id '{}' is not an integer", raw)))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ApiReply> {
    serde_json::from_str(body).map_err(|e| ApiReply::bad_request(format!("invalid JSON body: {}", e)))
}

fn parse_query(query: Option<&str>) -> Result<ListQuery, ApiReply> {
    match query {
        Some(q) if !q.is_empty() => {
            serde_urlencoded::from_str(q).map_err(|e| ApiReply::bad_request(format!("invalid query: {}", e)))
        }
        _ => Ok(ListQuery::default()),
    }
}

fn dispatch<R: Record>(
    conn: &mut SqliteConnection,
    pagination: &PaginationConfig,
    request: &ApiRequest<'_>,
) -> Result<ApiReply, ApiReply> {
    match (request.method, request.id) {
        (Method::Get, None) => {
            let query = parse_query(request.query)?;
            let rows: Vec<R> = records::list(
                conn,
                query.skip.unwrap_or(0).max(0),
                pagination.clamp_limit(query.limit),
            )?;
            Ok(ApiReply::json(200, &rows))
        }
        (Method::Post, None) => {
            let payload: R::Payload = parse_body(request.body)?;
            let created: R = records::create(conn, payload)?;
            Ok(ApiReply::json(201, &created))
        }
        (Method::Get, Some(raw)) => {
            let row: R = records::read(conn, parse_id(raw)?)?;
            Ok(ApiReply::json(200, &row))
        }
        (Method::Put, Some(raw)) => {
            let id = parse_id(raw)?;
            let payload: R::Payload = parse_body(request.body)?;
            let updated: R = records::update(conn, id, payload)?;
            Ok(ApiReply::json(200, &updated))
        }
        (Method::Delete, Some(raw)) => {
            records::delete::<R>(conn, parse_id(raw)?)?;
            Ok(ApiReply::no_content())
        }
        _ => Err(ApiReply::method_not_allowed(request.method, request.path)),
    }
}
