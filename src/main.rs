use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::sync::mpsc;

use sensortag::sensortag_client::{BleTransport, SensorTagClient, SensorTagClientConfig};
use sensortag::session::{Channel, SensorTag};
use sensortag::types::ChannelReading;

/// Stream readings from a TI CC2650 SensorTag
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// BLE scan timeout in seconds
    #[arg(long, default_value_t = 15)]
    scan_timeout: u64,

    /// Comma-separated channels to stream (ir-temperature, humidity,
    /// pressure, luxometer, accelerometer, gyroscope, magnetometer, button)
    #[arg(long, value_delimiter = ',', default_value = "ir-temperature")]
    sensors: Vec<Channel>,

    /// Seconds to stream for; 0 streams until disconnect or Ctrl-C
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Print one JSON object per reading instead of text
    #[arg(long)]
    json: bool,

    /// List SensorTags in range and exit
    #[arg(long)]
    scan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG=sensortag=debug shows every physical subscribe and write.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let client = SensorTagClient::new(SensorTagClientConfig {
        scan_timeout_secs: args.scan_timeout,
        ..SensorTagClientConfig::default()
    });

    if args.scan {
        for device in client.scan_all().await? {
            println!("{}  {}", device.name, device.id);
        }
        return Ok(());
    }

    // ── Connect ───────────────────────────────────────────────────────────────
    info!("Connecting to SensorTag …");
    let tag = client.connect().await?;
    info!("✅  Connected to: {}", tag.transport().name());

    let outcome = stream(&tag, &args).await;
    if let Err(e) = tag.disconnect().await {
        warn!("Disconnect error: {e}");
    }
    outcome
}

/// Enable and subscribe every requested channel, then print readings until
/// the duration elapses, Ctrl-C is pressed or the link drops.
async fn stream(tag: &SensorTag<BleTransport>, args: &Args) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChannelReading>();

    for &channel in &args.sensors {
        tag.enable(channel)
            .await
            .with_context(|| format!("enabling {channel}"))?;
        let tx = tx.clone();
        tag.subscribe(channel, move |reading| {
            let _ = tx.send(reading);
        })
        .await
        .with_context(|| format!("subscribing to {channel}"))?;
        info!("Streaming {channel}");
    }
    drop(tx);

    let deadline = async {
        match args.duration {
            0 => std::future::pending::<()>().await,
            secs => tokio::time::sleep(Duration::from_secs(secs)).await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            Some(reading) = rx.recv() => print_reading(&reading, args.json)?,
            _ = &mut deadline => {
                info!("{} s elapsed, stopping.", args.duration);
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping.");
                break;
            }
            _ = tag.transport().wait_disconnected() => {
                info!("❌  Disconnected from device.");
                break;
            }
        }
    }
    Ok(())
}

fn print_reading(reading: &ChannelReading, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(reading)?);
        return Ok(());
    }

    match reading {
        ChannelReading::IrTemperature(t) => {
            println!(
                "[IR]    object={:+7.2} °C  ambient={:+7.2} °C",
                t.object, t.ambient
            );
        }
        ChannelReading::Humidity(h) => {
            println!(
                "[HUM]   rh={:6.2} %  temp={:+7.2} °C",
                h.relative_humidity_pct, h.temperature_c
            );
        }
        ChannelReading::Pressure(p) => {
            println!(
                "[BARO]  pressure={:8.2} hPa  temp={:+7.2} °C",
                p.pressure_hpa, p.temperature_c
            );
        }
        ChannelReading::Luxometer(l) => {
            println!("[LUX]   lux={:9.3}  ambient={:9.3}", l.lux, l.ambient);
        }
        ChannelReading::Gyroscope(s) => {
            println!(
                "[GYRO]  x={:+9.3}°/s  y={:+9.3}°/s  z={:+9.3}°/s",
                s.x, s.y, s.z
            );
        }
        ChannelReading::Accelerometer(s) => {
            println!("[ACCEL] x={:+.5}g  y={:+.5}g  z={:+.5}g", s.x, s.y, s.z);
        }
        ChannelReading::Magnetometer(s) => {
            println!("[MAG]   x={:+9.2}µT  y={:+9.2}µT  z={:+9.2}µT", s.x, s.y, s.z);
        }
        ChannelReading::Button(b) => {
            println!("[KEY]   {}", if b.pressed { "pressed" } else { "released" });
        }
    }
    Ok(())
}
