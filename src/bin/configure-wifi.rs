//! Store the WiFi credentials a node reports through.
//!
//! The node only reads credentials from flash on a cold boot, so run this
//! once per device (or per network change) and then flash `node`.
//!
//! - **ESP32**: there is no console input, so the credentials are baked into
//!   the image and written to NVS on first run:
//!   `WIFI_SSID=Lab WIFI_PASSWORD=secret123 cargo espflash flash --bin configure-wifi --features esp32 --monitor`
//! - **Host**: `cargo run --bin configure-wifi -- <ssid> [password]` writes
//!   the simulated node's store under `~/.thermonode/`.
//!
//! Leave the password empty for an open network.

use log::{error, info};
use thermonode_esp32::flash::KeyValueFlash;
use thermonode_esp32::wifi::{provision_credentials, ProvisionError};

/// Provision and log the outcome. Returns whether the credentials are stored.
fn store(flash: &mut dyn KeyValueFlash, ssid: &str, password: &str) -> bool {
    match provision_credentials(flash, ssid, password) {
        Ok(stored) => {
            info!(
                "Stored credentials for '{}' ({}); used from the next cold boot",
                stored.ssid,
                if stored.is_open() { "open" } else { "WPA2" }
            );
            true
        }
        Err(e) => {
            error!("{}", e);
            if let ProvisionError::Invalid(_) = e {
                error!("SSID must be 1-32 bytes, password empty or 8-64 bytes");
            }
            false
        }
    }
}

#[cfg(feature = "esp32")]
fn main() {
    use std::time::Duration;
    use thermonode_esp32::flash::NvsFlash;
    use thermonode_esp32::wifi::CREDENTIALS_NAMESPACE;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    match option_env!("WIFI_SSID") {
        None => error!("Image built without WIFI_SSID, nothing to store"),
        Some(ssid) => {
            let password = option_env!("WIFI_PASSWORD").unwrap_or("");
            match NvsFlash::open(CREDENTIALS_NAMESPACE) {
                Ok(mut flash) => {
                    store(&mut flash, ssid, password);
                }
                Err(e) => error!("Cannot open NVS namespace '{}': {:?}", CREDENTIALS_NAMESPACE, e),
            }
        }
    }

    // Give the serial monitor time to drain before the task exits
    std::thread::sleep(Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use thermonode_esp32::flash::{default_root, FileFlash};
    use thermonode_esp32::wifi::CREDENTIALS_NAMESPACE;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let (Some(ssid), password, None) = (args.next(), args.next(), args.next()) else {
        eprintln!("Usage: configure-wifi <ssid> [password]");
        std::process::exit(2);
    };

    let root = match default_root() {
        Ok(root) => root,
        Err(e) => {
            error!("Cannot locate state directory: {}", e);
            std::process::exit(1);
        }
    };

    let mut flash = FileFlash::new(root.join(CREDENTIALS_NAMESPACE));
    if !store(&mut flash, &ssid, password.as_deref().unwrap_or("")) {
        std::process::exit(1);
    }
}
