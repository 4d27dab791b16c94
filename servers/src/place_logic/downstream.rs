use crate::place_logic::config::{self, Config};
use crate::place_logic::engine::Engine;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

pub async fn run(config: Config, engine: Engine, mut shutdown: broadcast::Receiver<()>) {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(engine);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port.unwrap_or(config::DEFAULT_PORT)));
    log::info!("Canvas server listening on {}", addr);

    // TLS only when both files are actually present; the config defaults
    // point at ~/.letsencrypt whether or not certificates were issued.
    let tls_paths = match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) if cert.exists() && key.exists() => {
            Some((cert.clone(), key.clone()))
        }
        _ => None,
    };

    if let Some((cert_path, key_path)) = tls_paths {
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .expect("Failed to load TLS configuration");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.recv().await.ok();
            log::info!("Canvas server shutting down.");
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .unwrap();
    } else {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind listen address");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await.ok();
                log::info!("Canvas server shutting down.");
            })
            .await
            .unwrap();
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(engine): State<Engine>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}

async fn health_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "OK")
}

async fn handle_socket(mut socket: WebSocket, engine: Engine) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);

    // Register before reading the snapshot: a placement racing the snapshot
    // is queued on the outbound channel rather than lost. A pixel present in
    // both is delivered twice, which is a harmless overwrite.
    let mut outbound = engine.state().add_client(client_id).await;
    log::info!("Client {} connected", client_id);

    let init = engine.init_message().await;
    let init_sent = match serde_json::to_string(&init) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    };
    if !init_sent {
        engine.state().remove_client(client_id).await;
        log::info!("Client {} disconnected before init", client_id);
        return;
    }

    loop {
        tokio::select! {
            // Inbound frames from the client
            inbound = socket.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        engine.handle_frame(client_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong: nothing to do
                    Some(Err(e)) => {
                        log::debug!("Client {} transport error: {}", client_id, e);
                        break;
                    }
                }
            }
            // Outbound frames queued by broadcasts (and per-connection FIFO:
            // this task is the socket's only writer)
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if socket.send(Message::Text(frame.as_ref().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    engine.state().remove_client(client_id).await;
    log::info!("Client {} disconnected", client_id);
}
