use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use picc_reader::spi::SpiBus;
use picc_reader::{Mfrc522, SysClock};

fn main() {
    env_logger::init();

    let bus = match SpiBus::open("/dev/spidev0.0") {
        Ok(bus) => bus,
        Err(e) => {
            error!("could not open spidev: {}", e);
            std::process::exit(1);
        }
    };
    let mut reader = Mfrc522::new(bus, SysClock::new());

    if let Err(e) = reader.init() {
        error!("reader init failed: {:?}", e);
        std::process::exit(1);
    }
    match reader.version() {
        Ok(v) => info!("reader version 0x{:02x}", v),
        Err(e) => warn!("could not read version: {:?}", e),
    }
    let _ = reader.dump_registers();

    loop {
        if reader.detect_presence().is_ok() {
            match reader.resolve_uid() {
                Ok(uid) => info!("card {:02x?} ({:?})", uid.as_bytes(), uid.card_type()),
                Err(e) => info!("card present but not resolved: {:?}", e),
            }
        }
        thread::sleep(Duration::from_millis(200));
    }
}
