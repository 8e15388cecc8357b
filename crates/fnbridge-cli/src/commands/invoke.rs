use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use bytes::Bytes;
use clap::Args;
use fnbridge_core::{BindingValue, BridgeConfig, FunctionMetadata};
use fnbridge_invoker::trigger::parse_schedule_timestamp;
use fnbridge_invoker::{Binder, RpcFunctionDescriptorProvider, TimerInfo, TriggerInput};
use fnbridge_rpc::RpcTransport;
use tracing::{debug, info};

use crate::bindings::{CliBindingFactory, OutputLog};

/// Trigger input for a single invocation. Exactly one of `--url`,
/// `--timer`, `--stream-file` or `--value` selects the trigger shape.
#[derive(Args, Debug, Default)]
pub struct TriggerArgs {
    /// HTTP trigger: request URL
    #[arg(long, group = "trigger")]
    pub url: Option<String>,
    /// HTTP trigger: request method [default: GET]
    #[arg(long, requires = "url")]
    pub http_method: Option<String>,
    /// HTTP trigger: request header as `name:value` (repeatable)
    #[arg(long, requires = "url")]
    pub header: Vec<String>,
    /// HTTP trigger: request body
    #[arg(long, requires = "url")]
    pub body: Option<String>,

    /// Timer trigger
    #[arg(long, group = "trigger")]
    pub timer: bool,
    /// Timer trigger: the tick is past due
    #[arg(long, requires = "timer")]
    pub past_due: bool,
    /// Timer trigger: last occurrence (2024-01-01T00:00:00)
    #[arg(long, requires = "timer", requires = "next")]
    pub last: Option<String>,
    /// Timer trigger: next occurrence (2024-01-02T00:00:00)
    #[arg(long, requires = "timer", requires = "last")]
    pub next: Option<String>,

    /// Stream trigger: file whose bytes are the trigger payload
    #[arg(long, group = "trigger")]
    pub stream_file: Option<PathBuf>,

    /// Any other trigger: a JSON document or plain text
    #[arg(long, group = "trigger")]
    pub value: Option<String>,
}

impl TriggerArgs {
    pub fn into_input(self) -> anyhow::Result<TriggerInput> {
        if let Some(url) = self.url {
            let mut builder = http::Request::builder()
                .method(self.http_method.as_deref().unwrap_or("GET"))
                .uri(url.as_str());
            for header in &self.header {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| anyhow!("header '{header}' is not in name:value form"))?;
                builder = builder.header(name.trim(), value.trim());
            }
            let body = self.body.map(Bytes::from).unwrap_or_default();
            let request = builder
                .body(body)
                .with_context(|| format!("invalid HTTP request for {url}"))?;
            return Ok(TriggerInput::Http(request));
        }

        if self.timer {
            let mut timer = TimerInfo::new(self.past_due);
            if let (Some(last), Some(next)) = (&self.last, &self.next) {
                let last = parse_schedule_timestamp(last)
                    .ok_or_else(|| anyhow!("invalid --last timestamp '{last}'"))?;
                let next = parse_schedule_timestamp(next)
                    .ok_or_else(|| anyhow!("invalid --next timestamp '{next}'"))?;
                timer = timer.with_schedule(last, next);
            }
            return Ok(TriggerInput::Timer(timer));
        }

        if let Some(path) = self.stream_file {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            return Ok(TriggerInput::Stream(Bytes::from(bytes)));
        }

        if let Some(value) = self.value {
            return Ok(TriggerInput::Value(BindingValue::String(value)));
        }

        bail!("no trigger input: pass one of --url, --timer, --stream-file or --value")
    }
}

pub async fn run(function: &Path, config: &BridgeConfig, trigger: TriggerArgs) -> anyhow::Result<()> {
    let metadata = FunctionMetadata::from_file(function)
        .with_context(|| format!("loading {}", function.display()))?;
    let input = trigger.into_input()?;

    let transport = Arc::new(RpcTransport::connect(&config.rpc).await?);
    let outputs = Arc::new(OutputLog::default());
    let provider = RpcFunctionDescriptorProvider::new(
        Arc::new(CliBindingFactory::new(outputs.clone())),
        transport.clone(),
    )
    .with_return_key(&config.rpc.return_key);

    let invoker = provider
        .try_create(&metadata)?
        .ok_or_else(|| anyhow!("function '{}' is not an rpc function", metadata.name))?;

    let result = invoker.invoke(input, &Binder::new()).await;
    if let Ok(context) = &result {
        let linger = config.rpc.sink_linger()?;
        drain_logs(&transport, &context.invocation_id.to_string(), linger).await;
    }
    transport.shutdown().await;
    let context = result?;

    for (name, value) in outputs.take() {
        println!("{name} = {value}");
    }
    info!(invocation_id = %context.invocation_id, "invocation complete");
    Ok(())
}

/// Give the worker's trailing log lines a chance to arrive before the
/// transport is torn down.
async fn drain_logs(transport: &RpcTransport, invocation_id: &str, linger: Duration) {
    let drained = tokio::time::timeout(linger, async {
        while transport.registry().contains(invocation_id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if drained.is_err() {
        debug!(%invocation_id, "no end-of-log marker from worker");
    }
}
