//! Server runner
//!
//! Sets up logging, builds the engine, and serves newline-delimited JSON
//! requests on stdin/stdout until EOF or a shutdown signal.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use super::protocol::{Response, handle_line};
use crate::cli::{Cli, LogFormat};
use crate::engine::CodeExecutionEngine;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::EngineConfig;

// OpenTelemetry imports (only when feature is enabled)
#[cfg(feature = "otel")]
use opentelemetry::global;
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace::SdkTracerProvider;

// Global storage for OpenTelemetry provider (for proper shutdown)
#[cfg(feature = "otel")]
static OTEL_PROVIDER: std::sync::OnceLock<SdkTracerProvider> = std::sync::OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Shutdown OpenTelemetry provider (flush all pending spans)
#[cfg(feature = "otel")]
pub fn shutdown_otel() {
    if let Some(provider) = OTEL_PROVIDER.get() {
        tracing::info!("Shutting down OpenTelemetry provider...");
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to shutdown OpenTelemetry provider: {e:?}");
        } else {
            tracing::info!("OpenTelemetry provider shutdown complete");
        }
    }
}

/// Shutdown OpenTelemetry provider (no-op when feature is disabled)
#[cfg(not(feature = "otel"))]
pub fn shutdown_otel() {}

/// Initialize OpenTelemetry tracer provider with a batch OTLP exporter
#[cfg(feature = "otel")]
fn init_otel(endpoint: &str, service_name: &str) -> anyhow::Result<SdkTracerProvider> {
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .build();

    global::set_tracer_provider(provider.clone());

    Ok(provider)
}

/// OpenTelemetry layer, if an endpoint was given
#[cfg(feature = "otel")]
fn otel_layer(cli: &Cli) -> anyhow::Result<Option<BoxedLayer>> {
    let Some(endpoint) = cli.otel_endpoint.as_deref().filter(|_| cli.is_otel_enabled()) else {
        return Ok(None);
    };
    let service_name = &cli.otel_service_name;

    eprintln!("OpenTelemetry enabled: endpoint={endpoint}, service={service_name}");

    let provider = init_otel(endpoint, service_name)?;
    let tracer = provider.tracer("code-exec-rs");
    drop(OTEL_PROVIDER.set(provider));

    Ok(Some(
        tracing_opentelemetry::layer().with_tracer(tracer).boxed(),
    ))
}

#[cfg(not(feature = "otel"))]
fn otel_layer(cli: &Cli) -> anyhow::Result<Option<BoxedLayer>> {
    if cli.otel_endpoint.is_some() {
        eprintln!("--otel-endpoint specified but otel feature is not enabled, ignoring");
    }
    Ok(None)
}

/// Build an EnvFilter based on CLI args and RUST_LOG environment variable
///
/// Priority: RUST_LOG environment variable > CLI arguments (-v, -vv, -q)
fn build_env_filter(cli: &Cli) -> tracing_subscriber::EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            return tracing_subscriber::EnvFilter::new(rust_log);
        }
    }

    let level = cli.log_level();
    tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into())
}

/// Formatting layer writing to `writer`
fn fmt_layer<W>(format: LogFormat, writer: W) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Initialize logging based on CLI arguments
///
/// stdout carries protocol traffic, so logs go to stderr or, in diagnostic
/// mode, to a file.
fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let output_layer = if cli.is_diagnostic() {
        let log_path = cli.log_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&log_path)?;

        // Output log file location to stderr (user needs to know)
        eprintln!("Diagnostic mode: logging to {}", log_path.display());

        fmt_layer(cli.log_format, std::sync::Mutex::new(file))
    } else {
        fmt_layer(cli.log_format, std::io::stderr)
    };

    let mut layers = vec![output_layer];
    if let Some(layer) = otel_layer(cli)? {
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_env_filter(cli))
        .try_init()?;
    Ok(())
}

/// Run the server with CLI arguments until EOF or `shutdown` resolves
///
/// Configuration errors are reported before anything is served.
pub async fn run_with_cli(cli: &Cli, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let startup_time = std::time::Instant::now();

    // Initialize logging first (must happen before any tracing)
    init_logging(cli)?;

    tracing::info!(
        version = %env!("CARGO_PKG_VERSION"),
        pid = %std::process::id(),
        start_time = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        diagnostic = cli.is_diagnostic(),
        otel_enabled = cli.otel_endpoint.is_some(),
        "code-exec-rs starting"
    );

    let config = EngineConfig::from_env()?;
    tracing::info!(
        executable = %config.executable,
        interpreter = %config.interpreter,
        init_commands = config.init_commands.len(),
        first_output_secs = config.timeouts.first_output.as_secs_f64(),
        between_output_secs = config.timeouts.between_output.as_secs_f64(),
        dialog_secs = config.timeouts.dialog.as_secs_f64(),
        max_exec_secs = config.timeouts.max_exec.as_secs_f64(),
        "Engine configuration loaded"
    );

    if cli.check_config {
        let summary = serde_json::json!({
            "executable": config.executable,
            "interpreter": config.interpreter,
            "init_commands": config.init_commands,
            "timeouts": {
                "first_output": config.timeouts.first_output.as_secs_f64(),
                "between_output": config.timeouts.between_output.as_secs_f64(),
                "dialog": config.timeouts.dialog.as_secs_f64(),
                "max_exec": config.timeouts.max_exec.as_secs_f64(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let engine = Arc::new(CodeExecutionEngine::new(config));
    tracing::info!(
        engine = %engine.name(),
        init_elapsed_ms = startup_time.elapsed().as_millis(),
        "Waiting for requests on stdin"
    );

    let result = tokio::select! {
        result = serve(tokio::io::stdin(), tokio::io::stdout(), engine.clone()) => result,
        () = shutdown => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    engine.shutdown().await;

    let uptime = startup_time.elapsed();
    match &result {
        Ok(()) => tracing::info!(
            uptime_secs = uptime.as_secs(),
            "========== Shutdown Complete =========="
        ),
        Err(e) => tracing::error!(error = %e, uptime_ms = uptime.as_millis(), "Server error"),
    }
    result
}

/// Serve newline-delimited JSON requests from `reader`, answering on `writer`
///
/// Every request runs on its own task so a slow command in one session never
/// holds up another; responses are written by a single writer task as they
/// complete. Returns after EOF once every in-flight request was answered.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    engine: Arc<CodeExecutionEngine>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let registry = Arc::new(ToolRegistry::with_default_tools());
    let context = ToolContext::new(engine);

    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = JoinSet::new();
    let mut request_seq: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        request_seq += 1;

        let tx = tx.clone();
        let registry = registry.clone();
        let context = context.clone();
        let span = tracing::info_span!("handle_request", seq = request_seq);
        in_flight.spawn(
            async move {
                let response = handle_line(&line, &registry, &context).await;
                if tx.send(response).is_err() {
                    tracing::warn!("Response writer closed, dropping response");
                }
            }
            .instrument(span),
        );

        // Reap finished handlers so the set does not grow unbounded
        while in_flight.try_join_next().is_some() {}
    }

    tracing::info!(pending = in_flight.len(), "Input closed, finishing in-flight requests");
    while in_flight.join_next().await.is_some() {}

    drop(tx);
    writer_task.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::Timeouts;
    use serde_json::{Value, json};
    use tokio::io::AsyncReadExt;

    fn test_engine() -> Arc<CodeExecutionEngine> {
        let config = EngineConfig {
            executable: "/bin/bash".to_string(),
            ..EngineConfig::default()
        }
        .with_timeouts(Timeouts {
            first_output: Duration::from_secs(1),
            between_output: Duration::from_millis(500),
            dialog: Duration::from_millis(200),
            max_exec: Duration::from_secs(5),
        });
        Arc::new(CodeExecutionEngine::new(config))
    }

    async fn run(input: &str) -> Vec<Value> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let engine = test_engine();

        let server = tokio::spawn(serve(server_read, server_write, engine.clone()));
        client.write_all(input.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        server.await.unwrap().unwrap();
        engine.shutdown().await;

        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_serve_list_and_call() {
        let input = concat!(
            r#"{"id":1,"method":"tools/list"}"#,
            "\n\n",
            r#"{"id":2,"method":"tools/call","name":"execute_terminal","arguments":{"command":"echo hi"}}"#,
            "\n",
        );
        let mut responses = run(input).await;
        responses.sort_by_key(|r| r["id"].as_i64());

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["tools"].as_array().unwrap().len(), 4);
        assert_eq!(
            responses[1]["result"],
            json!({"content": [{"type": "text", "text": "hi"}], "isError": false})
        );
    }

    #[tokio::test]
    async fn test_slow_request_does_not_block_others() {
        let input = concat!(
            r#"{"id":"slow","method":"tools/call","name":"execute_terminal","arguments":{"command":"sleep 2; echo slow","session":0}}"#,
            "\n",
            r#"{"id":"fast","method":"tools/call","name":"execute_terminal","arguments":{"command":"echo fast","session":1}}"#,
            "\n",
        );
        let responses = run(input).await;

        let order: Vec<&str> = responses.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(order, vec!["fast", "slow"]);
    }
}
