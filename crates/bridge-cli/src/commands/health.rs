use anyhow::{Context, Result};
use bridge_config::BridgeConfig;
use bridge_runtime::envelope::{self, Request, Response};
use bridge_runtime::fallback::FallbackExecutor;
use tokio::net::UnixStream;

pub async fn execute() -> Result<()> {
    let config = BridgeConfig::from_env().context("invalid BRIDGE_* environment")?;
    config
        .ensure_state_dir()
        .context("state directory is not writable")?;

    let request = Request {
        module: "system".to_string(),
        function: "health".to_string(),
        params: serde_json::Map::new(),
        request_id: Some(uuid::Uuid::new_v4().to_string()),
    };

    let response = match try_daemon(&config, request.clone()).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!("daemon unreachable, reporting fallback-mode liveness");
            let (manifest, modules) = super::wiring(&config);
            FallbackExecutor::new(config, manifest, modules)
                .execute(request)
                .await
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    let healthy = response.success
        && response
            .result
            .as_ref()
            .and_then(|r| r.get("status"))
            .and_then(|s| s.as_str())
            .map(|s| s == "Healthy")
            .unwrap_or(false);

    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

async fn try_daemon(config: &BridgeConfig, request: Request) -> Result<Response> {
    let mut stream = UnixStream::connect(&config.socket_path)
        .await
        .context("connect failed")?;
    let payload = serde_json::to_value(&request)?;
    let framed = envelope::encode(&payload)?;
    tokio::io::AsyncWriteExt::write_all(&mut stream, &framed).await?;
    let value = envelope::read_message(&mut stream).await?;
    Ok(serde_json::from_value(value)?)
}
