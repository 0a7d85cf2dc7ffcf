use std::{net::IpAddr, time::Duration};

use camino::Utf8PathBuf;
use clap::arg;
use hickory_server::ServerFuture;
use sqldns::{ResolverConfig, Unhandled};
use tracing_subscriber::EnvFilter;

const TCP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), ()> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cmd = clap::Command::new("sqldns")
        .about("Serve DNS records from a SQL database")
        .arg(
            arg!(--config <CONFIG> "Path to the resolver configuration (TOML)")
                .required(true)
                .value_parser(clap::value_parser!(Utf8PathBuf)),
        )
        .arg(
            arg!(--port <PORT> "Port to listen on")
                .value_parser(clap::value_parser!(u16))
                .default_value("8053"),
        )
        .arg(
            arg!(--address <ADDRESS> "Address to listen on")
                .value_parser(clap::value_parser!(IpAddr))
                .default_value("127.0.0.1"),
        );

    let args = cmd.get_matches();
    let (Some(config), Some(address), Some(port)) = (
        args.get_one::<Utf8PathBuf>("config"),
        args.get_one::<IpAddr>("address"),
        args.get_one::<u16>("port"),
    ) else {
        eprintln!("missing required arguments");
        return Err(());
    };

    if let Err(error) = server(*address, *port, config).await {
        eprintln!("{error}");
        Err(())
    } else {
        Ok(())
    }
}

async fn server(
    address: IpAddr,
    port: u16,
    config: &Utf8PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ResolverConfig::load(config)?;
    let resolver = config.build(Unhandled::refused())?;

    let mut server = ServerFuture::new(resolver);
    server.register_socket(tokio::net::UdpSocket::bind((address, port)).await?);
    server.register_listener(
        tokio::net::TcpListener::bind((address, port)).await?,
        TCP_TIMEOUT,
    );

    tracing::info!("Server started on {address}:{port}");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown_gracefully().await?;
    println!("...end");
    Ok(())
}
