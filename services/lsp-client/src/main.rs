use clap::{Arg, Command};
use lsp_core::Params;
use tracing::{error, info};

fn validate_positive(value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| "must be a positive integer".to_owned())
        .and_then(|v| if v == 0 { Err("must be nonzero".to_owned()) } else { Ok(v) })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "lsp-client starting");

    let matches = Command::new("LSP Client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Opens a reliable ordered connection to an lsp-server and echoes lines from stdin")
        .arg(
            Arg::new("hostport")
                .help("Server address, e.g. 127.0.0.1:10000")
                .required(true),
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

    let hostport = matches.get_one::<String>("hostport").expect("required").clone();
    let params = Params::new(
        *matches.get_one::<u64>("epoch_millis").expect("has default"),
        u32::try_from(*matches.get_one::<u64>("epoch_limit").expect("has default")).unwrap_or(u32::MAX),
        u32::try_from(*matches.get_one::<u64>("window").expect("has default")).unwrap_or(u32::MAX),
    )
    .expect("CLI validators already enforce positivity");

    let client = match lsp_client::Client::open(&hostport, params).await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to open connection");
            std::process::exit(1);
        }
    };
    info!(conn_id = client.conn_id().await, "connection established");

    use tokio::io::{AsyncBufReadExt, BufReader};
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Err(e) = client.write(line.into_bytes()).await {
            error!(error = %e, "write failed");
            break;
        }
    }

    if let Err(e) = client.close().await {
        error!(error = %e, "close failed");
    }
}
