//! SD card access: configuration read, daily log creation, per-record append.
//!
//! Every operation brings the card up, opens what it needs and closes it again
//! before returning. No handle outlives a call, so pulling power between two
//! records never leaves an open file behind.

use embedded_hal::{
    delay::DelayNs,
    digital::OutputPin,
    spi::{Error as SpiErrorTrait, ErrorKind, ErrorType, Operation, SpiBus, SpiDevice},
};
use embedded_sdmmc::{Mode, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::info;
use tagwatch_core::{
    clock::DateTime,
    config::CONFIG_FILE_NAME,
    record::{EventLog, LINE_ENDING, LOG_HEADER, LogRecord},
    session::{FileNameError, LogFileName},
};

/// Card access error details.
#[derive(Debug)]
pub enum SdLogError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    ChipSelect(CsErr),
    Spi(BusErr),
    Card(SdCardError),
    Filesystem(embedded_sdmmc::Error<SdCardError>),
    SequenceExhausted,
}

/// File timestamps for everything written in this power cycle.
#[derive(Clone, Copy, Debug)]
pub struct SessionTimeSource(pub DateTime);

impl TimeSource for SessionTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        let at = self.0;
        Timestamp {
            year_since_1970: at.year.saturating_sub(1970).min(255) as u8,
            zero_indexed_month: at.month.saturating_sub(1),
            zero_indexed_day: at.day.saturating_sub(1),
            hours: at.hour,
            minutes: at.minute,
            seconds: at.second,
        }
    }
}

#[derive(Debug)]
enum ExclusiveSpiError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    Bus(BusErr),
    Cs(CsErr),
    DelayNotSupported,
}

impl<BusErr, CsErr> SpiErrorTrait for ExclusiveSpiError<BusErr, CsErr>
where
    BusErr: core::fmt::Debug,
    CsErr: core::fmt::Debug,
{
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Borrowed bus plus chip select, handed to the card driver for one operation.
struct ExclusiveSpiDevice<'a, BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
{
    bus: &'a mut BUS,
    cs: &'a mut CS,
}

impl<'a, BUS, CS> ExclusiveSpiDevice<'a, BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
{
    fn new(bus: &'a mut BUS, cs: &'a mut CS) -> Self {
        Self { bus, cs }
    }
}

impl<BUS, CS> ErrorType for ExclusiveSpiDevice<'_, BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    type Error = ExclusiveSpiError<BUS::Error, CS::Error>;
}

impl<BUS, CS> SpiDevice<u8> for ExclusiveSpiDevice<'_, BUS, CS>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        if operations
            .iter()
            .any(|op| matches!(op, Operation::DelayNs(_)))
        {
            return Err(ExclusiveSpiError::DelayNotSupported);
        }

        self.cs.set_low().map_err(ExclusiveSpiError::Cs)?;

        let op_result = (|| {
            for operation in operations {
                match operation {
                    Operation::Read(buf) => self.bus.read(buf).map_err(ExclusiveSpiError::Bus)?,
                    Operation::Write(buf) => self.bus.write(buf).map_err(ExclusiveSpiError::Bus)?,
                    Operation::Transfer(read, write) => self
                        .bus
                        .transfer(read, write)
                        .map_err(ExclusiveSpiError::Bus)?,
                    Operation::TransferInPlace(buf) => self
                        .bus
                        .transfer_in_place(buf)
                        .map_err(ExclusiveSpiError::Bus)?,
                    Operation::DelayNs(_) => return Err(ExclusiveSpiError::DelayNotSupported),
                }
            }
            self.bus.flush().map_err(ExclusiveSpiError::Bus)?;
            Ok(())
        })();

        let cs_result = self.cs.set_high().map_err(ExclusiveSpiError::Cs);
        match (op_result, cs_result) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(_), Ok(_)) => Ok(()),
        }
    }
}

struct DelayRef<'a, D>(&'a mut D);

impl<D> DelayNs for DelayRef<'_, D>
where
    D: DelayNs,
{
    fn delay_ns(&mut self, ns: u32) {
        self.0.delay_ns(ns);
    }
}

fn preclock<BUS, CS>(bus: &mut BUS, cs: &mut CS) -> Result<(), SdLogError<BUS::Error, CS::Error>>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    cs.set_high().map_err(SdLogError::ChipSelect)?;
    // SD SPI init requires >=74 clock cycles with CS deasserted.
    let preclock = [0xFFu8; 10];
    bus.write(&preclock).map_err(SdLogError::Spi)
}

/// Reads up to `out.len()` bytes of the configuration file.
pub fn probe_and_read_config<BUS, CS, DELAY>(
    bus: &mut BUS,
    cs: &mut CS,
    delay: &mut DELAY,
    stamp: DateTime,
    out: &mut [u8],
) -> Result<usize, SdLogError<BUS::Error, CS::Error>>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    preclock(bus, cs)?;

    let spi_device = ExclusiveSpiDevice::new(bus, cs);
    let mut delay_ref = DelayRef(delay);
    let sd_card = SdCard::new(spi_device, &mut delay_ref);
    let card_size_bytes = sd_card.num_bytes().map_err(SdLogError::Card)?;

    let mut volume_mgr = VolumeManager::new(sd_card, SessionTimeSource(stamp));
    let mut volume = volume_mgr
        .open_volume(VolumeIdx(0))
        .map_err(SdLogError::Filesystem)?;
    let mut root_dir = volume.open_root_dir().map_err(SdLogError::Filesystem)?;
    let mut file = root_dir
        .open_file_in_dir(CONFIG_FILE_NAME, Mode::ReadOnly)
        .map_err(SdLogError::Filesystem)?;

    let mut read_total = 0usize;
    while read_total < out.len() {
        let read_now = file
            .read(&mut out[read_total..])
            .map_err(SdLogError::Filesystem)?;
        read_total = read_total.saturating_add(read_now);
        if read_now == 0 || file.is_eof() {
            break;
        }
    }

    file.close().map_err(SdLogError::Filesystem)?;
    root_dir.close().map_err(SdLogError::Filesystem)?;
    volume.close().map_err(SdLogError::Filesystem)?;

    info!(
        "sd: config read bytes={} card_bytes={}",
        read_total, card_size_bytes
    );
    Ok(read_total)
}

/// Creates today's next free log file and writes the header line into it.
pub fn probe_and_create_log<BUS, CS, DELAY>(
    bus: &mut BUS,
    cs: &mut CS,
    delay: &mut DELAY,
    today: DateTime,
) -> Result<LogFileName, SdLogError<BUS::Error, CS::Error>>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    preclock(bus, cs)?;

    let spi_device = ExclusiveSpiDevice::new(bus, cs);
    let mut delay_ref = DelayRef(delay);
    let sd_card = SdCard::new(spi_device, &mut delay_ref);
    let _ = sd_card.num_bytes().map_err(SdLogError::Card)?;

    let mut volume_mgr = VolumeManager::new(sd_card, SessionTimeSource(today));
    let mut volume = volume_mgr
        .open_volume(VolumeIdx(0))
        .map_err(SdLogError::Filesystem)?;
    let mut root_dir = volume.open_root_dir().map_err(SdLogError::Filesystem)?;

    let file_name = LogFileName::first_free(&today, |candidate| {
        match root_dir.find_directory_entry(candidate) {
            Ok(_) => Ok(true),
            Err(embedded_sdmmc::Error::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    })
    .map_err(|err| match err {
        FileNameError::SequenceExhausted => SdLogError::SequenceExhausted,
        FileNameError::Probe(err) => SdLogError::Filesystem(err),
    })?;

    let mut file = root_dir
        .open_file_in_dir(file_name.as_str(), Mode::ReadWriteCreate)
        .map_err(SdLogError::Filesystem)?;
    file.write(LOG_HEADER.as_bytes())
        .map_err(SdLogError::Filesystem)?;
    file.write(LINE_ENDING.as_bytes())
        .map_err(SdLogError::Filesystem)?;

    file.close().map_err(SdLogError::Filesystem)?;
    root_dir.close().map_err(SdLogError::Filesystem)?;
    volume.close().map_err(SdLogError::Filesystem)?;

    info!("sd: created log file {}", file_name.as_str());
    Ok(file_name)
}

/// Append-only record sink on the card. Owns the SD bus for the session.
pub struct SdEventLog<BUS, CS, DELAY> {
    bus: BUS,
    cs: CS,
    delay: DELAY,
    file_name: LogFileName,
    stamp: DateTime,
}

impl<BUS, CS, DELAY> SdEventLog<BUS, CS, DELAY>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    pub fn new(bus: BUS, cs: CS, delay: DELAY, file_name: LogFileName, stamp: DateTime) -> Self {
        Self {
            bus,
            cs,
            delay,
            file_name,
            stamp,
        }
    }

    fn append_bytes(&mut self, bytes: &[u8]) -> Result<(), SdLogError<BUS::Error, CS::Error>> {
        preclock(&mut self.bus, &mut self.cs)?;

        let spi_device = ExclusiveSpiDevice::new(&mut self.bus, &mut self.cs);
        let mut delay_ref = DelayRef(&mut self.delay);
        let sd_card = SdCard::new(spi_device, &mut delay_ref);
        let _ = sd_card.num_bytes().map_err(SdLogError::Card)?;

        let mut volume_mgr = VolumeManager::new(sd_card, SessionTimeSource(self.stamp));
        let mut volume = volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(SdLogError::Filesystem)?;
        let mut root_dir = volume.open_root_dir().map_err(SdLogError::Filesystem)?;
        let mut file = root_dir
            .open_file_in_dir(self.file_name.as_str(), Mode::ReadWriteAppend)
            .map_err(SdLogError::Filesystem)?;

        file.write(bytes).map_err(SdLogError::Filesystem)?;

        // Closing flushes the directory entry; the record is durable after this.
        file.close().map_err(SdLogError::Filesystem)?;
        root_dir.close().map_err(SdLogError::Filesystem)?;
        volume.close().map_err(SdLogError::Filesystem)?;
        Ok(())
    }
}

impl<BUS, CS, DELAY> EventLog for SdEventLog<BUS, CS, DELAY>
where
    BUS: SpiBus<u8>,
    CS: OutputPin,
    DELAY: DelayNs,
    BUS::Error: core::fmt::Debug,
    CS::Error: core::fmt::Debug,
{
    type Error = SdLogError<BUS::Error, CS::Error>;

    fn append(&mut self, record: &LogRecord) -> Result<(), Self::Error> {
        let line = record.to_line();
        self.append_bytes(line.as_bytes())
    }
}
