//! Gate Controller - ESP32 firmware for an RFID gate endpoint.
//!
//! Architecture:
//! - `reader` / `outputs`: MFRC522 over SPI, the gate relay and the RGB status light
//! - `wifi` / `net`: esp-radio station + soft-AP, smoltcp stacks, the portal page
//! - `clock`: monotonic time whose sleeps keep the network and watchdog
//!   serviced, and SNTP wall time
//!
//! All behavior lives in `gate-core`; this crate only binds it to hardware and
//! runs the single cooperative loop.

#![no_std]
#![no_main]

use esp_bootloader_esp_idf::esp_app_desc;
esp_app_desc!();

mod clock;
mod heap_debug;
mod net;
mod outputs;
mod reader;
mod wifi;

extern crate alloc;

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::mem::MaybeUninit;
use critical_section::Mutex;
use esp_alloc as _;
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Level, Output, OutputConfig},
    main,
    spi::{
        master::{Config as SpiConfig, Spi},
        Mode,
    },
    time::{Duration, Rate},
    timer::timg::{MwdtStage, TimerGroup, Wdt},
};
use esp_println::logger::init_logger;
use esp_radio::wifi::Config as WifiConfig;
use esp_storage::FlashStorage;
use embedded_hal_bus::spi::ExclusiveDevice;
use mfrc522::comm::blocking::spi::SpiInterface;
use mfrc522::Mfrc522;

use gate_core::arbiter::{ArbiterConfig, ArbiterError};
use gate_core::identity::DeviceId;
use gate_core::link::LinkInbox;
use gate_core::store::{SlotLayout, SlotStore};
use gate_core::{Config, Endpoint, Parts};

use crate::clock::{EspClock, NetTime};
use crate::net::{Net, NetHttp};
use crate::outputs::{RelayOutput, RgbLed};
use crate::reader::CardReader;
use crate::wifi::EspWifi;

/// Driver link events, pushed from the radio task and drained by the loop.
static LINK_INBOX: LinkInbox = LinkInbox::new();

// Watchdog timer
pub(crate) static WATCHDOG: Mutex<RefCell<Option<Wdt<esp_hal::peripherals::TIMG1<'static>>>>> =
    Mutex::new(RefCell::new(None));

const STATUS_INTERVAL_MS: u64 = 30_000;

/// Feed the watchdog timer.
/// This should be called during long-running operations to prevent watchdog reset.
pub fn feed_watchdog() {
    critical_section::with(|cs| {
        if let Some(ref mut wdt) = *WATCHDOG.borrow_ref_mut(cs) {
            wdt.feed();
        }
    });
}

/// Bring-up failed in a way the loop cannot recover from. Log and let the
/// watchdog reset the chip.
fn fatal(what: &str) -> ! {
    log::error!("FATAL: {}", what);
    loop {
        core::hint::spin_loop();
    }
}

fn restart(err: ArbiterError) -> ! {
    log::error!("arbiter: {}, restarting", err);
    heap_debug::log_heap_stats("restart");
    esp_hal::system::software_reset()
}

#[main]
fn main() -> ! {
    // Initialize logging
    init_logger(log::LevelFilter::Info);
    log::info!("Gate Controller starting...");

    // Initialize heap
    const HEAP_SIZE: usize = 72 * 1024;
    static mut HEAP: MaybeUninit<[u8; HEAP_SIZE]> = MaybeUninit::uninit();
    unsafe {
        esp_alloc::HEAP.add_region(esp_alloc::HeapRegion::new(
            core::ptr::addr_of_mut!(HEAP) as *mut u8,
            HEAP_SIZE,
            esp_alloc::MemoryCapability::Internal.into(),
        ));
    }
    heap_debug::log_heap_stats("init");

    // Hardware init
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Start the esp-rtos scheduler (required before esp_radio::init)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // The radio controller lives for the whole program.
    let radio: &'static esp_radio::Controller<'static> =
        Box::leak(Box::new(esp_radio::init().unwrap()));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, WifiConfig::default()).unwrap();

    // Initialize watchdog timer on TIMG1 (TIMG0 is used by the scheduler)
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    let mut wdt = timg1.wdt;
    wdt.enable();
    wdt.set_timeout(MwdtStage::Stage0, Duration::from_secs(30));
    critical_section::with(|cs| {
        WATCHDOG.borrow_ref_mut(cs).replace(wdt);
    });

    // Gate relay (GPIO2), driven low until a session opens
    let relay = RelayOutput::new(Output::new(
        peripherals.GPIO2,
        Level::Low,
        OutputConfig::default(),
    ));

    // Common-anode RGB LED (GPIO0=R, GPIO4=G, GPIO16=B), all channels dark
    let indicator = RgbLed::new(
        Output::new(peripherals.GPIO0, Level::High, OutputConfig::default()),
        Output::new(peripherals.GPIO4, Level::High, OutputConfig::default()),
        Output::new(peripherals.GPIO16, Level::High, OutputConfig::default()),
    );

    // MFRC522 on SPI2 (SCK=18, MOSI=23, MISO=19, SS=5). RST (GPIO17) is held
    // high for the whole run.
    let _rc_reset = Output::new(peripherals.GPIO17, Level::High, OutputConfig::default());
    let spi = match Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(1))
            .with_mode(Mode::_0),
    ) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO18)
            .with_mosi(peripherals.GPIO23)
            .with_miso(peripherals.GPIO19),
        Err(e) => {
            log::error!("reader: spi config rejected: {:?}", e);
            fatal("spi");
        }
    };
    let cs = Output::new(peripherals.GPIO5, Level::High, OutputConfig::default());
    let Ok(device) = ExclusiveDevice::new(spi, cs, Delay::new()) else {
        fatal("spi device");
    };
    let mut rc = match Mfrc522::new(SpiInterface::new(device)).init() {
        Ok(rc) => rc,
        Err(e) => {
            log::error!("reader: init failed: {:?}", e);
            fatal("mfrc522");
        }
    };
    match rc.version() {
        Ok(v) => log::info!("reader: MFRC522 version 0x{:02x}", v),
        Err(_) => log::warn!("reader: could not read version"),
    }
    let reader = CardReader::new(rc);

    let device_id = DeviceId::from_mac(esp_radio::wifi::sta_mac());
    log::info!("Device: {}", device_id);

    let config = Config::from_build_env();
    log::info!(
        "Server: {}:{}, portal: {}, ntp: {}",
        config.server_host,
        config.server_port,
        config.portal_name,
        config.ntp_server
    );

    let net = Rc::new(RefCell::new(Net::new(interfaces.sta, interfaces.ap)));
    wifi::route_link_events(&LINK_INBOX);

    let parts = Parts {
        reader,
        relay,
        indicator,
        wifi: EspWifi::new(wifi_controller, net.clone(), device_id.clone()),
        store: SlotStore::new(FlashStorage::new(), SlotLayout::DEFAULT),
        http: NetHttp::new(net.clone(), &config),
        clock: EspClock::new(net.clone()),
        time: NetTime::new(net, &config),
    };
    let mut endpoint = Endpoint::new(
        parts,
        &config,
        ArbiterConfig::new(config.portal_name),
        device_id,
        &LINK_INBOX,
    );

    if let Err(e) = endpoint.boot() {
        restart(e);
    }
    heap_debug::log_heap_stats("connected");

    let mut last_status = net::now_ms();
    loop {
        if let Err(e) = endpoint.tick() {
            restart(e);
        }
        feed_watchdog();

        let now = net::now_ms();
        if now.saturating_sub(last_status) >= STATUS_INTERVAL_MS {
            last_status = now;
            log::info!(
                "status: link={:?} locked={} sent={} dropped={}",
                endpoint.link_state(),
                endpoint.session().is_locked(),
                endpoint.reporter().sent(),
                endpoint.reporter().dropped()
            );
            heap_debug::warn_if_low(16, "loop");
        }
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    critical_section::with(|_| {
        log::error!("PANIC: {}", info);
    });

    // Spin without feeding watchdog. The 30s timeout will trigger a full system reset.
    loop {
        core::hint::spin_loop();
    }
}
