//! Demo server browsing a remote Windows file system over PowerShell remoting.
//!
//! Run with: cargo run -p web-explorer -- [path/to/endpoint.json]
//!
//! The password is read from the variable named by `password_env`
//! (default `PSREMOTE_PASSWORD`). Then open http://localhost:3000 in your browser.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::{Router, response::Html, routing::get};
use psremote_core::{EndpointConfig, ProgressHandler};
use psremote_host::{HostConfig, PwshRunspaceFactory};
use psremote_session::SessionManager;
use psremote_transport::websocket::{ExplorerState, ProgressRelay, create_ws_router};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => EndpointConfig::default_path()?,
    };
    let endpoint = EndpointConfig::load(&config_path)
        .with_context(|| format!("loading endpoint config from {}", config_path.display()))?
        .into_endpoint()?;
    tracing::info!(
        host = %endpoint.host(),
        port = endpoint.port(),
        username = %endpoint.username(),
        "Endpoint configured"
    );

    let relay = Arc::new(ProgressRelay::new());
    let factory = PwshRunspaceFactory::new(HostConfig::from_env());
    let manager = Arc::new(
        SessionManager::new(endpoint, factory)
            .with_progress(Arc::clone(&relay) as Arc<dyn ProgressHandler>),
    );
    let state = ExplorerState::new(Arc::clone(&manager), relay);

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_ws_router(state))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.close().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>PowerShell Remote Explorer</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            color: #d4d4d4;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
        #panes { display: flex; gap: 20px; }
        ul { list-style: none; padding: 0; min-width: 300px; }
        li { cursor: pointer; padding: 2px 4px; }
        li:hover { background: #333; }
        progress { width: 300px; }
    </style>
</head>
<body>
    <h1>PowerShell Remote Explorer</h1>
    <div class="status" id="status">Connecting...</div>
    <button id="connect">Connect</button>
    <button id="disconnect">Disconnect</button>
    <progress id="progress" max="100" value="0"></progress>
    <div id="panes">
        <ul id="directories"></ul>
        <ul id="files"></ul>
    </div>

    <script>
        const status = document.getElementById('status');
        const progress = document.getElementById('progress');
        const directories = document.getElementById('directories');
        const files = document.getElementById('files');
        let ws;

        function send(msg) {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify(msg));
            }
        }

        function open(path) {
            send({ type: 'list_directories', path });
            send({ type: 'list_files', path });
        }

        function fill(list, items, onClick) {
            list.innerHTML = '';
            for (const item of items) {
                const li = document.createElement('li');
                li.textContent = item;
                if (onClick) li.onclick = () => onClick(item);
                list.appendChild(li);
            }
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);

            ws.onopen = () => {
                status.textContent = 'Server reachable';
                status.className = 'status connected';
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                status.className = 'status disconnected';
                setTimeout(connect, 2000);
            };

            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                switch (msg.type) {
                    case 'connected':
                        status.textContent = `Session open at ${msg.root}`;
                        fill(directories, msg.directories, open);
                        send({ type: 'list_files', path: msg.root });
                        break;
                    case 'disconnected':
                        status.textContent = 'Session closed';
                        fill(directories, []);
                        fill(files, []);
                        break;
                    case 'directories':
                        fill(directories, msg.items, open);
                        break;
                    case 'files':
                        fill(files, msg.items);
                        break;
                    case 'progress':
                        progress.value = msg.percent;
                        break;
                    case 'error':
                        status.textContent = `Error: ${msg.message}`;
                        break;
                }
            };
        }

        document.getElementById('connect').onclick = () => send({ type: 'connect' });
        document.getElementById('disconnect').onclick = () => send({ type: 'disconnect' });

        connect();
    </script>
</body>
</html>
"#;
