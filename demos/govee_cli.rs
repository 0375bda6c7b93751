//! CLI application for controlling Govee lights on the local network.
//!
//! Run with: cargo run --example govee_cli -- --help

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use govee_lan_rs::{
    Brightness, Color, CommandRequest, Controller, ControllerConfig, Event, Kelvin, Outcome,
    PowerState,
};

#[derive(Parser)]
#[command(name = "govee-cli")]
#[command(about = "Control Govee smart lights from the command line", long_about = None)]
struct Cli {
    /// Seconds to wait for discovery responses before acting
    #[arg(short, long, default_value = "3", global = true)]
    wait: u64,

    /// Address of a device that does not answer the multicast scan
    #[arg(short, long, global = true)]
    address: Option<Ipv4Addr>,

    /// Send RGB commands as blocked (temperature-only policy)
    #[arg(long, global = true)]
    temperature_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover all Govee lights on the network and list them
    Discover,

    /// Turn a light on
    On {
        /// Device id as printed by discover
        id: String,
    },

    /// Turn a light off
    Off {
        id: String,
    },

    /// Set brightness (0-100)
    Brightness {
        id: String,
        value: u8,
    },

    /// Set RGB color as "r,g,b" (0-255 each)
    Color {
        id: String,
        color: String,
    },

    /// Set color temperature in kelvin
    Temperature {
        id: String,
        kelvin: u16,
    },

    /// Watch discovery and state-change events until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ControllerConfig {
        temperature_only: cli.temperature_only,
        ..ControllerConfig::default()
    };
    let controller = Controller::start(config).await?;

    if let Some(address) = cli.address {
        controller.add_device_address(address).await;
    }
    controller.discover_once().await;
    tokio::time::sleep(Duration::from_secs(cli.wait)).await;

    match cli.command {
        Commands::Discover => {
            let devices = controller.list_devices().await;
            println!("Found {} device(s)", devices.len());
            for device in devices {
                println!(
                    "  {} - {} at {} [{}]",
                    device.id,
                    device.model,
                    device.address,
                    device.capabilities.join(", ")
                );
            }
        }
        Commands::On { id } => {
            run(&controller, &id, CommandRequest::Power(PowerState::On)).await?;
        }
        Commands::Off { id } => {
            run(&controller, &id, CommandRequest::Power(PowerState::Off)).await?;
        }
        Commands::Brightness { id, value } => {
            let brightness = Brightness::create(value)?;
            run(&controller, &id, CommandRequest::Brightness(brightness)).await?;
        }
        Commands::Color { id, color } => {
            let color = Color::from_str(&color)?;
            run(&controller, &id, CommandRequest::Rgb(color)).await?;
        }
        Commands::Temperature { id, kelvin } => {
            let kelvin = Kelvin::create(kelvin)?;
            run(&controller, &id, CommandRequest::Temperature(kelvin)).await?;
        }
        Commands::Watch => {
            controller.set_event_callback(|event| match event {
                Event::DeviceDiscovered(device) => {
                    println!("discovered {} ({}) at {}", device.id, device.model, device.address);
                }
                Event::DeviceLost(device) => println!("lost {}", device.id),
                Event::DeviceStateChanged(device) => {
                    println!(
                        "{}: power={:?} brightness={:?} rgb={:?} kelvin={:?}",
                        device.id, device.power, device.brightness, device.rgb, device.kelvin
                    );
                }
            });
            println!("Watching for events, press Ctrl-C to stop...");
            tokio::signal::ctrl_c().await?;
        }
    }

    controller.shutdown().await;
    Ok(())
}

async fn run(
    controller: &Controller,
    id: &str,
    request: CommandRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    match controller.send_command(id, request).await? {
        Outcome::Confirmed { attempts, .. } => {
            println!("confirmed after {attempts} attempt(s)");
        }
        Outcome::Failed {
            attempts,
            last_observed,
            ..
        } => {
            println!("FAILED after {attempts} attempt(s), last observed: {last_observed:?}");
        }
    }
    Ok(())
}
