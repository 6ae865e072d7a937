use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
    process::ExitCode,
    sync::Arc,
};

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, span, Level};
use tracing_subscriber::EnvFilter;

mod adapters;
mod api;
mod bucket;
mod config;
mod error;
mod gateway;
mod model;
mod resolver;
mod util;

use crate::{
    config::{Cli, Command, PolicyArgs, StoreArgs},
    error::{GatewayError, Result},
};

const STDIN_SOURCE: &str = "-";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();
    info!("called");

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error_message=%err, error_group="command", error_code=err.kind.code());
            let (status, body) = err.to_response();
            if let Err(err) = print_json(&body) {
                error!(error_message=%err, error_group="print");
            }
            ExitCode::from(exit_code(status))
        }
    }
}

/// The store client is only built for commands that talk to the store.
fn run(cli: Cli) -> Result<()> {
    let Cli {
        store,
        policy,
        command,
    } = cli;
    let connect = || build_gateway(&store, &policy);

    match command {
        Command::Health => print_json(&api::health()),
        Command::Exists { location } => {
            let gateway = connect()?;
            print_json(&api::check_exists(&gateway, &location.bucket, &location.key)?)
        }
        Command::Info { location } => {
            let gateway = connect()?;
            print_json(&api::get_file_info(&gateway, &location.bucket, &location.key)?)
        }
        Command::Upload {
            source,
            location,
            content_type,
        } => {
            let (mut reader, size_hint, file_name) = open_source(&source, &location.key)?;
            let gateway = connect()?;
            let res = api::upload(
                &gateway,
                api::UploadRequest {
                    bucket: &location.bucket,
                    key: &location.key,
                    source: reader.as_mut(),
                    size_hint,
                    content_type: content_type.as_deref(),
                    file_name,
                },
            )?;
            print_json(&res)
        }
        Command::Download {
            location,
            destination,
        } => {
            let gateway = connect()?;
            print_json(&api::download_to_local(
                &gateway,
                &location.bucket,
                &location.key,
                &destination,
            )?)
        }
        Command::Cat { location } => {
            let gateway = connect()?;
            let mut res = api::download_as_stream(&gateway, &location.bucket, &location.key)?;
            info!(
                content_type = %res.content_type,
                content_length = res.content_length,
                content_disposition = %res.content_disposition(),
                "streaming"
            );

            let mut stdout = io::stdout().lock();
            io::copy(&mut res.stream, &mut stdout)
                .and_then(|_| stdout.flush())
                .map_err(|err| GatewayError::download_failed(&location.key, err))?;
            Ok(())
        }
    }
}

fn build_gateway(store: &StoreArgs, policy: &PolicyArgs) -> Result<gateway::ObjectGateway> {
    let blocking = util::runtime::Blocking::new()
        .map_err(|err| GatewayError::unknown("start runtime", err))?;
    let config = blocking.block_on(store.load());
    let client = aws_sdk_s3::Client::from_conf(config);

    Ok(gateway::ObjectGateway::new(
        Arc::new(adapters::s3::S3Store::new(client, blocking)),
        policy.to_policy(),
    ))
}

/// Opens the upload source. Stdin has no known length.
fn open_source(
    source: &Path,
    key: &str,
) -> Result<(Box<dyn Read>, Option<i64>, Option<String>)> {
    if source.as_os_str() == STDIN_SOURCE {
        return Ok((Box::new(io::stdin().lock()), None, None));
    }

    let file = File::open(source).map_err(|err| GatewayError::upload_failed(key, err))?;
    let size_hint = file
        .metadata()
        .ok()
        .map(|m| i64::try_from(m.len()).unwrap_or(-1));
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    Ok((Box::new(file), size_hint, file_name))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)
        .map_err(|err| GatewayError::unknown("write output", err))?;
    writeln!(stdout).map_err(|err| GatewayError::unknown("write output", err))
}

fn exit_code(status: u16) -> u8 {
    match status {
        400..=499 => 2,
        _ => 1,
    }
}
