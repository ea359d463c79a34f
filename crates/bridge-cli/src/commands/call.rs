use anyhow::{Context, Result};
use bridge_config::BridgeConfig;
use bridge_runtime::envelope::{self, Request, Response};
use bridge_runtime::fallback::FallbackExecutor;
use tokio::net::UnixStream;

pub async fn execute(module: &str, function: &str, params: &[String]) -> Result<()> {
    let config = BridgeConfig::from_env().context("invalid BRIDGE_* environment")?;
    config
        .ensure_state_dir()
        .context("state directory is not writable")?;

    let mut fields = serde_json::Map::new();
    for raw in params {
        let (key, value) = super::parse_param(raw)?;
        fields.insert(key, value);
    }

    let request = Request {
        module: module.to_string(),
        function: function.to_string(),
        params: fields,
        request_id: Some(uuid::Uuid::new_v4().to_string()),
    };

    let response = match try_daemon(&config, request.clone()).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!("daemon unreachable, executing in fallback mode");
            let (manifest, modules) = super::wiring(&config);
            FallbackExecutor::new(config, manifest, modules)
                .execute(request)
                .await
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.success {
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
