use bridge_config::BridgeConfig;
use bridge_runtime::context::DaemonContext;
use bridge_runtime::server::Listener;
use std::sync::Arc;

/// Exit codes (§6): 0 clean shutdown, 1 unrecoverable init error, 2 socket bind conflict,
/// 3 state-dir unwritable. `execute` never returns `Ok` in normal operation — the connection
/// loop runs until the process is killed — so every path out of this function other than a
/// signal-driven shutdown ends in `std::process::exit`.
pub async fn execute() -> anyhow::Result<()> {
    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid BRIDGE_* environment");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.ensure_state_dir() {
        tracing::error!(error = %e, state_dir = %config.state_dir.display(), "state directory is not writable");
        std::process::exit(3);
    }

    tracing::info!(
        socket = %config.socket_path.display(),
        state_dir = %config.state_dir.display(),
        "starting bridged"
    );

    let ctx = Arc::new(DaemonContext::new(
        config,
        bridge_runtime::default_manifest(),
        bridge_runtime::default_modules,
    ));

    bridge_runtime::monitor::spawn(ctx.clone());

    let listener = match Listener::bind(ctx) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind daemon socket");
            std::process::exit(2);
        }
    };

    if let Err(e) = listener.run().await {
        tracing::error!(error = %e, "connection loop exited");
        std::process::exit(1);
    }

    Ok(())
}
