#![no_std]
#![no_main]

extern crate alloc;

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_hal::usb_serial_jtag::{UsbSerialJtag, UsbSerialJtagRx, UsbSerialJtagTx};
use esp_hal::Async;
use static_cell::StaticCell;

use trailcam_uplink_firmware::config::{cellular, pins};
use trailcam_uplink_firmware::dispatcher::COMMAND_CHANNEL;
use trailcam_uplink_firmware::modem::UartModemPort;
use trailcam_uplink_firmware::satellite::{SatelliteConfig, SatelliteEngine};
use trailcam_uplink_firmware::selector::{NetworkSelector, SelectorConfig};
use trailcam_uplink_firmware::tasks::{self, CommandReceiver, CommandSender, RetainedStateStore};
use trailcam_uplink_firmware::time::EmbassyTimebase;
use trailcam_uplink_firmware::transport::{
    CellularConfig, CellularModem, NoTransport, SatelliteModem,
};

type ModemPort = UartModemPort<Uart<'static, Async>, Output<'static>>;
type Satellite = SatelliteModem<ModemPort, EmbassyTimebase>;
type Cellular = CellularModem<ModemPort, EmbassyTimebase>;
type Selector = NetworkSelector<EmbassyTimebase, NoTransport, NoTransport, Cellular, Satellite>;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

#[esp_hal::main]
fn main() -> ! {
    // Heap for the LZ4 encoder's scratch tables
    esp_alloc::heap_allocator!(size: 32 * 1024);
    esp_println::logger::init_logger(log::LevelFilter::Info);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let sat_uart = Uart::new(
        peripherals.UART1,
        UartConfig::default().with_baudrate(pins::MODEM_BAUD_RATE),
    )
    .expect("satellite UART config")
    .with_tx(peripherals.GPIO17)
    .with_rx(peripherals.GPIO18)
    .into_async();
    let sat_enable = Output::new(peripherals.GPIO16, Level::High, OutputConfig::default());

    let cell_uart = Uart::new(
        peripherals.UART2,
        UartConfig::default().with_baudrate(pins::CELL_BAUD_RATE),
    )
    .expect("cellular UART config")
    .with_tx(peripherals.GPIO43)
    .with_rx(peripherals.GPIO44)
    .into_async();
    let cell_pwrkey = Output::new(peripherals.GPIO15, Level::High, OutputConfig::default());

    let sat_config = SatelliteConfig::default();
    let satellite = SatelliteModem::new(
        UartModemPort::new(sat_uart, sat_enable),
        EmbassyTimebase,
        sat_config.module,
    );
    let engine = SatelliteEngine::new(satellite, EmbassyTimebase, sat_config)
        .expect("satellite config");

    let cell_config = CellularConfig::new(cellular::APN, cellular::SERVER_HOST, cellular::SERVER_PORT)
        .expect("cellular config");
    let cell = CellularModem::new(
        UartModemPort::new(cell_uart, cell_pwrkey),
        EmbassyTimebase,
        cell_config,
    );

    let selector = NetworkSelector::new(SelectorConfig::default(), EmbassyTimebase)
        .with_cellular(cell)
        .with_satellite(engine);

    // Host control link
    let usb_serial = UsbSerialJtag::new(peripherals.USB_DEVICE).into_async();
    let (usb_rx, usb_tx) = usb_serial.split();

    // Sole instance
    let store = unsafe { RetainedStateStore::new() };

    log::info!(
        "trailcam uplink {} starting (satellite + cellular)",
        env!("CARGO_PKG_VERSION")
    );

    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, usb_rx, usb_tx, selector, store));
    })
}

#[embassy_executor::task]
async fn async_main(
    spawner: Spawner,
    usb_rx: UsbSerialJtagRx<'static, Async>,
    usb_tx: UsbSerialJtagTx<'static, Async>,
    selector: Selector,
    store: RetainedStateStore,
) {
    let command_sender = COMMAND_CHANNEL.sender();
    let command_receiver = COMMAND_CHANNEL.receiver();

    spawner.must_spawn(serial_reader_task(usb_rx, command_sender));
    spawner.must_spawn(serial_writer_task(usb_tx));
    spawner.must_spawn(uplink_task(selector, store, command_receiver));
}

#[embassy_executor::task]
async fn serial_reader_task(usb_rx: UsbSerialJtagRx<'static, Async>, sender: CommandSender) {
    tasks::serial_reader_task(usb_rx, sender).await;
}

#[embassy_executor::task]
async fn serial_writer_task(usb_tx: UsbSerialJtagTx<'static, Async>) {
    tasks::serial_writer_task(usb_tx).await;
}

#[embassy_executor::task]
async fn uplink_task(selector: Selector, store: RetainedStateStore, receiver: CommandReceiver) {
    tasks::uplink_task(selector, store, receiver).await;
}
