use clap::{Arg, Command};
use lsp_core::Params;
use tracing::{error, info, warn};

fn validate_positive(value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| "must be a positive integer".to_owned())
        .and_then(|v| if v == 0 { Err("must be nonzero".to_owned()) } else { Ok(v) })
}

fn validate_port(value: &str) -> Result<u16, String> {
    value.parse::<u16>().map_err(|_| "invalid port number".to_owned())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "lsp-server starting");

    let matches = Command::new("LSP Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Accepts many LSP connections on one socket and echoes what each peer writes")
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_parser(validate_port)
                .default_value("10000"),
        )
        .arg(
            Arg::new("epoch_millis")
                .long("epoch-millis")
                .value_parser(validate_positive)
                .default_value("100"),
        )
        .arg(
            Arg::new("epoch_limit")
                .long("epoch-limit")
                .value_parser(validate_positive)
                .default_value("5"),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .value_parser(validate_positive)
                .default_value("1"),
        )
        .get_matches();

    let port = *matches.get_one::<u16>("port").expect("has default");
    let params = Params::new(
        *matches.get_one::<u64>("epoch_millis").expect("has default"),
        u32::try_from(*matches.get_one::<u64>("epoch_limit").expect("has default")).unwrap_or(u32::MAX),
        u32::try_from(*matches.get_one::<u64>("window").expect("has default")).unwrap_or(u32::MAX),
    )
    .expect("CLI validators already enforce positivity");

    let server = match lsp_server::Server::listen(port, params).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(port, "listening");

    loop {
        match server.read().await {
            Ok((conn_id, payload)) => {
                info!(conn_id, bytes = payload.len(), "received");
                if let Err(e) = server.write(conn_id, payload).await {
                    warn!(conn_id, error = %e, "echo write failed");
                }
            }
            Err((conn_id, e)) => {
                warn!(conn_id, error = %e, "connection lost");
            }
        }
    }
}
