use std::time::{Duration, Instant};

use pipereq_rpc::{Client, ClientConfig, RequestBody};
use pipereq_transport::UnixDomainSocket;
use tracing::debug;

use crate::cmd::{parse_duration, runtime, RequestArgs};
use crate::exit::{io_error, rpc_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_response, OutputFormat};

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let body = resolve_body(&args)?;
    runtime()?.block_on(send(args, body, timeout, format))
}

async fn send(
    args: RequestArgs,
    body: RequestBody,
    timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let pipe = UnixDomainSocket::connect(&args.path)
        .await
        .map_err(|err| transport_error("connect failed", err))?;

    let config = ClientConfig {
        request_timeout: Some(timeout),
        ..ClientConfig::default()
    };
    let client = Client::with_config(pipe, config);

    let started = Instant::now();
    let response = client
        .fetch(&args.method, &args.url, body)
        .await
        .map_err(|err| rpc_error("request failed", err))?;
    let elapsed = started.elapsed();
    debug!(id = %response.id, status = response.status, ?elapsed, "response received");
    client.close();

    print_response(&response, elapsed.as_millis(), format);

    if args.fail && response.status >= 400 {
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

fn resolve_body(args: &RequestArgs) -> CliResult<RequestBody> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("invalid --json payload: {err}")))?;
        return Ok(RequestBody::from(json.clone()));
    }
    if let Some(data) = &args.data {
        return Ok(RequestBody::from(data.clone()));
    }
    if let Some(path) = &args.file {
        let bytes = std::fs::read(path)
            .map_err(|err| io_error(&format!("failed to read {}", path.display()), err))?;
        return Ok(RequestBody::from(bytes));
    }
    Ok(RequestBody::Empty)
}
