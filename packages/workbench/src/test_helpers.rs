use std::net::SocketAddr;
use std::time::Duration;
use workspace_fs::WorkspaceWatcher;

use crate::AppState;
use crate::config::{FileConfig, ServerConfig};

/// Build an `AppState` over a scratch workspace holding `a.txt` and
/// `src/main.js`. Shells are `/bin/sh` with a short restart delay.
///
/// Returns `(AppState, TempDir)`; callers **must** hold the `TempDir` for the
/// lifetime of the test.
pub fn test_app_state() -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("a.txt"), "hello").expect("a.txt");
    std::fs::create_dir(tmp.path().join("src")).expect("src");
    std::fs::write(tmp.path().join("src/main.js"), "console.log(1)").expect("main.js");

    let mut file_config = FileConfig::default();
    file_config.workspace.root = tmp.path().to_path_buf();
    file_config.terminal.shell = Some("/bin/sh".into());
    file_config.terminal.restart_delay_ms = 50;
    file_config.terminal.kill_grace_ms = 500;
    let config = ServerConfig::from_file(&file_config).expect("config");

    (AppState::new(config).expect("state"), tmp)
}

/// Like `test_app_state`, with a live watcher feeding the change hub.
/// Dropping the watcher stops the notifications.
pub fn test_app_state_with_watcher() -> (AppState, WorkspaceWatcher, tempfile::TempDir) {
    let (state, tmp) = test_app_state();
    let (watcher, changes) = WorkspaceWatcher::start(state.store.root()).expect("watcher");
    state.hub.spawn_pump(changes, state.metrics.clone());
    (state, watcher, tmp)
}

/// Serve the full router on an ephemeral localhost port.
pub async fn spawn_test_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = crate::build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

/// Poll `check` until it holds or the timeout passes.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}
