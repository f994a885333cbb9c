//! Thermonode measurement cycle.
//!
//! Runs one wake/measure/report cycle and suspends:
//! - **ESP32**: `cargo espflash flash --bin node --features esp32 --release`
//! - **Host**: `cargo run --bin node` simulates the node. Each run is one
//!   boot; the "deep sleep" between runs is emulated with files under
//!   `~/.thermonode/`, so running it again resumes the cycle.
//!
//! Host options:
//! - `--calibrate` - press the calibrate button on a cold boot (the simulated
//!   sensor then sits at the calibration temperature)
//! - `--celsius <t>` - temperature the simulated sensor reads (default 21)

use log::info;
use thermonode_esp32::controller::{CycleController, NodeIo};
use thermonode_esp32::NodeConfig;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Retained across deep sleep, cleared on power loss.
#[cfg(feature = "esp32")]
#[link_section = ".rtc.data"]
static mut RETAINED: thermonode_esp32::RetainedState = thermonode_esp32::RetainedState::ZEROED;

#[cfg(feature = "esp32")]
fn main() {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use log::warn;
    use thermonode_esp32::flash::NvsFlash;
    use thermonode_esp32::network::WifiNetwork;
    use thermonode_esp32::platform::{
        DeepSleep, EspClock, FreeRtosDelay, GpioButtons, PowerControl,
    };
    use thermonode_esp32::sensor::OneshotAdc;
    use thermonode_esp32::store::BACKUP_NAMESPACE;
    use thermonode_esp32::watchdog::TaskWatchdog;
    use thermonode_esp32::wifi::CREDENTIALS_NAMESPACE;

    platform_init();
    info!("=== Thermonode starting ===");

    let config = NodeConfig::default();
    let mut power = DeepSleep;
    let cause = power.restart_cause();
    info!("Restart cause: {:?}", cause);

    let peripherals = Peripherals::take().expect("Failed to take peripherals");
    let sysloop = EspSystemEventLoop::take().expect("Failed to take system event loop");

    let mut backup_flash = NvsFlash::open(BACKUP_NAMESPACE).expect("Failed to open NVS");
    let credentials_flash = NvsFlash::open(CREDENTIALS_NAMESPACE).expect("Failed to open NVS");

    let mut network = WifiNetwork::new(
        peripherals.modem,
        sysloop,
        config.hostname,
        config.collector_addr,
        config.socket_timeout,
    )
    .expect("Failed to initialize WiFi");

    let mut clock = EspClock::new();
    if let Err(e) = clock.start_sync() {
        warn!("SNTP unavailable, reports will be skipped: {:?}", e);
    }

    let mut adc = OneshotAdc::new(peripherals.adc1, peripherals.pins.gpio36)
        .expect("Failed to initialize ADC");
    let mut buttons = GpioButtons::new(
        peripherals.pins.gpio23.into(),
        peripherals.pins.gpio19.into(),
    )
    .expect("Failed to initialize buttons");
    let mut delay = FreeRtosDelay;
    let mut watchdog = TaskWatchdog::new();

    // SAFETY: single-threaded, and this is the only reference ever taken.
    let retained = unsafe { &mut *core::ptr::addr_of_mut!(RETAINED) };

    let plan = CycleController::new(
        &config,
        retained,
        NodeIo {
            adc: &mut adc,
            network: &mut network,
            clock: &clock,
            buttons: &mut buttons,
            delay: &mut delay,
            watchdog: &mut watchdog,
            backup_flash: &mut backup_flash,
            credentials_flash: &credentials_flash,
        },
    )
    .run(cause);

    power.suspend_for(plan.duration);
}

/// Command line of the host simulation.
#[cfg(not(feature = "esp32"))]
struct HostArgs {
    calibrate: bool,
    celsius: Option<f64>,
}

#[cfg(not(feature = "esp32"))]
impl HostArgs {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Self {
            calibrate: false,
            celsius: None,
        };
        let mut args = args.skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--calibrate" => parsed.calibrate = true,
                "--celsius" => {
                    let value = args.next().ok_or("--celsius needs a value")?;
                    let celsius = value
                        .parse()
                        .map_err(|_| format!("invalid temperature '{}'", value))?;
                    parsed.celsius = Some(celsius);
                }
                other => return Err(format!("unknown argument '{}'", other)),
            }
        }
        Ok(parsed)
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use log::{error, warn};
    use thermonode_esp32::flash::{default_root, FileFlash};
    use thermonode_esp32::network::HostNetwork;
    use thermonode_esp32::platform::{
        HostButtons, HostPower, PowerControl, RetainedImage, StdDelay, SystemClock,
    };
    use thermonode_esp32::sensor::{SimulatedAdc, ThermistorModel};
    use thermonode_esp32::store::BACKUP_NAMESPACE;
    use thermonode_esp32::watchdog::ThreadWatchdog;
    use thermonode_esp32::wifi::{load_credentials, save_credentials, CREDENTIALS_NAMESPACE};
    use thermonode_esp32::WifiCredentials;

    platform_init();

    let args = match HostArgs::parse(std::env::args()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: node [--calibrate] [--celsius <t>]");
            std::process::exit(2);
        }
    };

    info!("=== Thermonode starting (host simulation) ===");

    let config = NodeConfig::default();
    let root = match default_root() {
        Ok(root) => root,
        Err(e) => {
            error!("Cannot locate state directory: {}", e);
            std::process::exit(1);
        }
    };

    let mut power = HostPower::new(root.join("resume"));
    let cause = power.restart_cause();
    info!("Restart cause: {:?}", cause);

    let image = RetainedImage::new(root.join("rtc.bin"));
    let mut retained = image.load();

    let mut backup_flash = FileFlash::new(root.join(BACKUP_NAMESPACE));
    let mut credentials_flash = FileFlash::new(root.join(CREDENTIALS_NAMESPACE));
    if load_credentials(&credentials_flash).is_none() {
        let host_creds = WifiCredentials::open("host").expect("static SSID is valid");
        if let Err(e) = save_credentials(&mut credentials_flash, &host_creds) {
            warn!("Failed to store host credentials: {}", e);
        }
    }

    let model = ThermistorModel::new(config.thermistor);
    let celsius = args.celsius.unwrap_or(if args.calibrate {
        config.thermistor.calibration_celsius
    } else {
        21.0
    });
    // The simulated divider uses the nominal part, whatever the node believes
    let mut adc = SimulatedAdc::at_temperature(&model, celsius, config.thermistor.default_reference);

    let mut network = HostNetwork::new(config.collector_addr, config.socket_timeout);
    let clock = SystemClock;
    let mut buttons = HostButtons::new(args.calibrate, true);
    let mut delay = StdDelay;
    let mut watchdog = ThreadWatchdog::new();

    let plan = CycleController::new(
        &config,
        &mut retained,
        NodeIo {
            adc: &mut adc,
            network: &mut network,
            clock: &clock,
            buttons: &mut buttons,
            delay: &mut delay,
            watchdog: &mut watchdog,
            backup_flash: &mut backup_flash,
            credentials_flash: &credentials_flash,
        },
    )
    .run(cause);

    if let Err(e) = image.save(&retained) {
        error!("Failed to save retained image: {}", e);
    }
    power.suspend_for(plan.duration);
}
