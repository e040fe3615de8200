//! HTTP server for the census API
//!
//! `arbolado serve` → binds the configured address and answers requests on
//! a fixed set of worker threads sharing one listener.

use crate::api::{self, ApiReply};
use crate::config::{Config, PaginationConfig};
use crate::db::Database;
use colored::Colorize;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tiny_http::{Header, Request, Response, Server};

/// Start the API server and block until every worker exits
pub fn start_server(db: Database, config: &Config) -> io::Result<()> {
    let addr = config.bind_address();
    let server = Server::http(&addr).map_err(|e| io::Error::other(e.to_string()))?;
    let server = Arc::new(server);
    let db = Arc::new(db);
    let workers = config.server.workers.max(1);

    eprintln!("\n{}", "🌳 Arbolado".green().bold());
    eprintln!("   API:      http://{}", addr);
    eprintln!("   Database: {}", db.path().display());
    eprintln!("   Press Ctrl+C to stop\n");
    tracing::info!(%addr, workers, "listening");

    let handles = (0..workers)
        .map(|n| {
            let server = Arc::clone(&server);
            let db = Arc::clone(&db);
            let pagination = config.pagination.clone();
            thread::Builder::new()
                .name(format!("arbolado-worker-{}", n))
                .spawn(move || worker_loop(&server, &db, &pagination))
        })
        .collect::<io::Result<Vec<_>>>()?;

    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
    Ok(())
}

fn worker_loop(server: &Server, db: &Database, pagination: &PaginationConfig) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, db, pagination) {
            tracing::warn!(error = %e, "failed to send response");
        }
    }
}

fn handle_request(mut request: Request, db: &Database, pagination: &PaginationConfig) -> io::Result<()> {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_string();

    let mut body = String::new();
    let reply = match request.as_reader().read_to_string(&mut body) {
        Err(e) => ApiReply::error(400, "bad_request", format!("failed to read body: {}", e), None),
        Ok(_) => match db.session() {
            Ok(mut conn) => api::handle(&mut conn, pagination, &method, &url, &body),
            Err(e) => {
                tracing::error!(error = %e, "no database connection available");
                ApiReply::error(500, "storage_error", e.to_string(), None)
            }
        },
    };

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if reply.status >= 500 {
        tracing::error!(%method, path = %url, status = reply.status, elapsed_ms, "request");
    } else if reply.is_success() {
        tracing::info!(%method, path = %url, status = reply.status, elapsed_ms, "request");
    } else {
        tracing::info!(%method, path = %url, status = reply.status, elapsed_ms, "request rejected");
    }

    request.respond(into_response(reply))
}

fn into_response(reply: ApiReply) -> Response<io::Cursor<Vec<u8>>> {
    let response = Response::from_string(reply.body.unwrap_or_default()).with_status_code(reply.status);
    match Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
