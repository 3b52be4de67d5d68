use crate::core::{Context, Resource, TEMPLATES};
use crate::watch::{Event, Watch};
use anyhow::{Context as _, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response, sse},
    routing::get,
};
use axum_extra::body::AsyncReadBody;
use std::convert::Infallible;
use std::path;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::fs;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct AppState {
    ctx: Arc<RwLock<Context>>,
    watch: Arc<Watch>,
}

/// Serve a live preview of the document until interrupted.
#[tokio::main]
pub async fn serve(ctx: Context, port: u16) -> Result<()> {
    let watch = Arc::new(
        Watch::new(&ctx.src_path)
            .with_context(|| format!("could not watch {}", ctx.src_path.display()))?,
    );
    let state = AppState {
        ctx: Arc::new(RwLock::new(ctx)),
        watch: Arc::clone(&watch),
    };

    let app = Router::new()
        .route("/", get(page))
        .route("/_notify", get(notify))
        .route("/{*path}", get(resource))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("could not listen on port {port}"))?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(watch))
        .await?;
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then end the live-reload streams so that open
/// connections can drain.
async fn shutdown_signal(watch: Arc<Watch>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("could not listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => (),
        () = terminate => (),
    }
    info!("shutting down");
    watch.shutdown();
}

/// Respond with the contents of a file on the filesystem.
async fn send_file(path: &path::Path) -> Result<Response, (StatusCode, String)> {
    let mime = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(mime_guess::mime::OCTET_STREAM.as_str());

    let file = fs::File::open(path)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, format!("not found: {e}")))?;

    let headers = [(header::CONTENT_TYPE, mime)];
    let body = AsyncReadBody::new(file);
    Ok((headers, body).into_response())
}

/// Render the document, fresh on every request.
async fn page(State(state): State<AppState>) -> Response {
    // In debug mode, reload templates before rendering.
    #[cfg(debug_assertions)]
    if let Err(e) = state
        .ctx
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .reload_templates()
    {
        error!("could not reload templates: {e:#}");
    }

    let mut buf: Vec<u8> = vec![];
    let rendered = state
        .ctx
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .render_preview(&mut buf);
    match rendered {
        Ok(()) => Html(buf).into_response(),
        Err(e) => {
            error!("page rendering failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("page rendering failed: {e:#}"),
            )
                .into_response()
        }
    }
}

/// Serve anything else: the stylesheet or a file next to the document.
async fn resource(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    debug!("GET {path}");

    let rsrc = state
        .ctx
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .resolve_resource(&path);
    match rsrc {
        Some(Resource::Page) => Ok(page(State(state)).await),
        Some(Resource::Stylesheet) => match TEMPLATES.load("style.css") {
            Ok(css) => Ok(([(header::CONTENT_TYPE, "text/css")], css.into_owned()).into_response()),
            Err(e) => Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not load stylesheet: {e}"),
            )),
        },
        Some(Resource::Static(src_path)) => send_file(&src_path).await,
        None => Err((StatusCode::NOT_FOUND, "not found".into())),
    }
}

/// Server-Sent Events endpoint for getting change notifications.
async fn notify(
    State(state): State<AppState>,
) -> sse::Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    let stream = state
        .watch
        .stream()
        .take_while(|event| *event != Event::Shutdown)
        .map(|_| {
            debug!("sending reload event");
            Ok(sse::Event::default().event("reload").data("_"))
        });
    sse::Sse::new(stream).keep_alive(sse::KeepAlive::default())
}
