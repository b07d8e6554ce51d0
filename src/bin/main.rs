#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::fmt::Debug;

use embassy_executor::Spawner;
use embassy_time::Timer;
use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    i2c::master::I2c,
    peripherals::GPIO12,
    rtc_cntl::{Rtc, reset_reason, wakeup_cause},
    spi::master::Spi,
    system::Cpu,
    time::Rate,
    timer::timg::TimerGroup,
    uart::Uart,
};
use log::{LevelFilter, info, warn};
use tagwatch_core::{
    clock::{ClockSource, DateTime},
    config::{
        CONFIG_FILE_MAX_BYTES, DEFAULT_LOGGER_ID, DEFAULT_PAUSE_MS, DEFAULT_WINDOW_MS, FieldConfig,
        WindowConfig,
    },
    io::{StatusIndicator, StatusPattern},
    machine::{FieldLogger, Peripherals},
    session::{LogFileName, SessionIdentity},
};
use tagwatch_hal_esp32s3::{
    clock::ds3231::{BoardClock, Ds3231},
    power::{sleep::LightSleepWake, supply::SupplyLine},
    serial::uart::UartByteSource,
    status::led::StatusLed,
    storage::sd_log::{SdEventLog, probe_and_create_log, probe_and_read_config},
};

const READER_BAUD: u32 = 9_600;
const RTC_I2C_KHZ: u32 = 100;
const SD_SPI_HZ: u32 = 400_000;
const STARTUP_RETRY_MS: u64 = 2_000;
const PRESENCE_ACTIVE_LOW: bool = true;
const SUPPLY_ACTIVE_HIGH: bool = true;
const LED_ACTIVE_HIGH: bool = true;

const LOGGER_ID: &str = match option_env!("TAGWATCH_LOGGER_ID") {
    Some(id) => id,
    None => DEFAULT_LOGGER_ID,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StartupError {
    Clock,
    Card,
    Config,
    Identity,
    LogFile,
}

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

fn startup<E: Debug>(kind: StartupError) -> impl FnOnce(E) -> StartupError {
    move |err| {
        warn!("startup: {:?}: {:?}", kind, err);
        kind
    }
}

/// Card, configuration, clock and log file, in that order. Returns the
/// session identity and the date the file was opened under.
fn bring_up<CLK, BUS, CS, DELAY>(
    clock: &mut CLK,
    sd_spi: &mut BUS,
    sd_cs: &mut CS,
    sd_delay: &mut DELAY,
) -> Result<(SessionIdentity, DateTime), StartupError>
where
    CLK: ClockSource,
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: Debug,
    CS::Error: Debug,
{
    let today = clock.now().map_err(startup(StartupError::Clock))?;
    info!(
        "startup: clock {} {}",
        today.date_string(),
        today.time_string()
    );

    let mut raw = [0u8; CONFIG_FILE_MAX_BYTES];
    let read = probe_and_read_config(sd_spi, sd_cs, sd_delay, today, &mut raw)
        .map_err(startup(StartupError::Card))?;
    let field = FieldConfig::parse(&raw[..read]).map_err(startup(StartupError::Config))?;

    let file_name: LogFileName = probe_and_create_log(sd_spi, sd_cs, sd_delay, today)
        .map_err(startup(StartupError::LogFile))?;

    let Some(identity) = SessionIdentity::new(field, LOGGER_ID, file_name) else {
        warn!("startup: logger id {:?} does not fit", LOGGER_ID);
        return Err(StartupError::Identity);
    };
    Ok((identity, today))
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: tagwatch starting logger_id={}", LOGGER_ID);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    info!(
        "boot reset_reason={:?} wakeup_cause={:?}",
        reset_reason(Cpu::ProCpu),
        wakeup_cause()
    );

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Status LED on GPIO21. It is the only output the field unit has.
    let led_pin = Output::new(peripherals.GPIO21, Level::Low, OutputConfig::default());
    let mut status = StatusLed::new(led_pin, Delay::new(), LED_ACTIVE_HIGH);

    let window = match WindowConfig::default()
        .with_window_ms(DEFAULT_WINDOW_MS)
        .with_pause_ms(DEFAULT_PAUSE_MS)
        .validated()
    {
        Ok(window) => window,
        Err(err) => {
            warn!("startup: window config rejected: {:?}", err);
            loop {
                status.show(StatusPattern::Error);
                Timer::after_secs(1).await;
            }
        }
    };

    // Reader supply switch on GPIO5, off until a window opens.
    let supply_pin = Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default());
    let Ok(power) = SupplyLine::new(supply_pin, SUPPLY_ACTIVE_HIGH);

    // Presence switch on GPIO12 (RTC IO capable, so it can wake light sleep).
    let presence_pull = if PRESENCE_ACTIVE_LOW {
        Pull::Up
    } else {
        Pull::Down
    };
    let presence = Input::new(
        peripherals.GPIO12,
        InputConfig::default().with_pull(presence_pull),
    );
    let wake_pin = unsafe { GPIO12::steal() };
    let rtc = Rtc::new(peripherals.LPWR);
    let wake = LightSleepWake::new(presence, wake_pin, rtc, PRESENCE_ACTIVE_LOW);

    // Reader serial output into UART1 RX on GPIO18.
    let uart_config = esp_hal::uart::Config::default().with_baudrate(READER_BAUD);
    let uart = Uart::new(peripherals.UART1, uart_config)
        .unwrap()
        .with_rx(peripherals.GPIO18);
    let reader = UartByteSource::new(uart);

    // DS3231 on I2C0: SDA=GPIO1, SCL=GPIO2.
    let i2c_config =
        esp_hal::i2c::master::Config::default().with_frequency(Rate::from_khz(RTC_I2C_KHZ));
    let i2c = I2c::new(peripherals.I2C0, i2c_config)
        .unwrap()
        .with_sda(peripherals.GPIO1)
        .with_scl(peripherals.GPIO2);
    let mut clock = BoardClock::new(Ds3231::new(i2c));

    // SD SPI wiring: CS=GPIO8, SCK=GPIO4, MOSI=GPIO40, MISO=GPIO41
    let mut sd_cs = Output::new(peripherals.GPIO8, Level::High, OutputConfig::default());
    let sd_spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(SD_SPI_HZ))
        // SD cards in SPI mode use CPOL=0, CPHA=0.
        .with_mode(esp_hal::spi::Mode::_0);
    let mut sd_spi = Spi::new(peripherals.SPI3, sd_spi_config)
        .unwrap()
        .with_sck(peripherals.GPIO4)
        .with_mosi(peripherals.GPIO40)
        .with_miso(peripherals.GPIO41);
    let mut sd_delay = Delay::new();

    let mut attempts = 0u32;
    let (identity, opened_on) = loop {
        attempts = attempts.saturating_add(1);
        match bring_up(&mut clock, &mut sd_spi, &mut sd_cs, &mut sd_delay) {
            Ok(session) => break session,
            Err(err) => {
                warn!("startup: attempt {} failed at {:?}, retrying", attempts, err);
                status.show(StatusPattern::Error);
                Timer::after_millis(STARTUP_RETRY_MS).await;
            }
        }
    };
    info!(
        "startup: site={} operator={} logger={} file={} after {} attempt(s)",
        identity.site_id(),
        identity.operator_id(),
        identity.logger_id(),
        identity.file_name().as_str(),
        attempts
    );

    let log = SdEventLog::new(
        sd_spi,
        sd_cs,
        sd_delay,
        identity.file_name().clone(),
        opened_on,
    );
    let mut logger = FieldLogger::new(
        Peripherals {
            reader,
            wake,
            power,
            clock,
            log,
            status,
        },
        identity,
        window,
    );

    if let Err(fault) = logger.log_session_start() {
        warn!("startup: session record lost: {:?}", fault);
    }

    logger.run()
}
