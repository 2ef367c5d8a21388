use std::time::Duration;

use anyhow::Result;
use tokio_dbus_daemon::DaemonBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut builder = DaemonBuilder::new();
    builder.idle_timeout(Duration::from_secs(10));

    if let Some(address) = std::env::args().nth(1) {
        builder.address(address);
    }

    let daemon = builder.build()?;
    println!("DBUS_SESSION_BUS_ADDRESS={}", daemon.client_address());

    let mut handle = daemon.start();

    tokio::select! {
        _ = handle.idle_timeout() => {
            println!("No clients left, exiting");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
        }
    }

    handle.shutdown().await?;
    Ok(())
}
