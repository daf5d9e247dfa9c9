use anyhow::{bail, Result};
use clap::Parser;
use cmdfleet_shared::Platform;
use cmdfleet_simulator::{spawn, Behavior, SimDevice};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Run a fleet of simulated network devices on consecutive ports
#[derive(Parser, Debug)]
#[command(name = "cmdfleet-sim", version)]
struct Args {
    /// Address to bind every device on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the first device; the others follow
    #[arg(long, default_value_t = 2201)]
    base_port: u16,

    /// Number of devices
    #[arg(long, default_value_t = 3)]
    count: u16,

    /// Hostname prefix (devices are named <prefix>1, <prefix>2, ...)
    #[arg(long, default_value = "sw")]
    prefix: String,

    #[arg(long, default_value = "admin")]
    username: String,

    #[arg(long, default_value = "admin")]
    password: String,

    /// Enable secret
    #[arg(long)]
    secret: Option<String>,

    #[arg(long, default_value = "cisco_ios")]
    platform: Platform,

    /// Hostnames that accept connections but never answer
    #[arg(long)]
    unresponsive: Vec<String>,
}

/// Port of the device at `index`, counting up from `base`
fn device_port(base: u16, index: u16) -> Result<u16> {
    match base.checked_add(index) {
        Some(port) => Ok(port),
        None => bail!(
            "device {} does not fit: ports from {} run past 65535",
            index + 1,
            base
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let mut running = Vec::with_capacity(args.count as usize);

    for index in 0..args.count {
        let hostname = format!("{}{}", args.prefix, index + 1);
        let behavior = if args.unresponsive.contains(&hostname) {
            Behavior::Unresponsive
        } else {
            Behavior::Normal
        };

        let mut device = SimDevice::new(hostname, &args.username, &args.password)
            .with_platform(args.platform)
            .with_behavior(behavior);
        if let Some(secret) = &args.secret {
            device = device.with_secret(secret);
        }

        let addr = format!("{}:{}", args.host, device_port(args.base_port, index)?);
        running.push(spawn(device, &addr).await?);
    }

    info!("[SIM] {} devices up, press Ctrl-C to stop", running.len());
    tokio::signal::ctrl_c().await?;
    info!("[SIM] shutting down");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_port() {
        assert_eq!(device_port(2201, 2).unwrap(), 2203);
        assert_eq!(device_port(65530, 5).unwrap(), 65535);
        assert!(device_port(65530, 6).is_err());
    }
}
