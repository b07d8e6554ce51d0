//! DS3231 real-time clock over I2C, plus the board's monotonic uptime.

use embedded_hal::i2c::I2c;
use esp_hal::time::Instant;

use tagwatch_core::clock::{ClockError, ClockSource, DateTime, RTC_REGISTER_COUNT, decode_registers};

pub const DS3231_ADDRESS: u8 = 0x68;
const SECONDS_REGISTER: u8 = 0x00;

#[derive(Debug)]
pub enum Ds3231Error<E> {
    Bus(E),
    Decode(ClockError),
}

#[derive(Debug)]
pub struct Ds3231<I2C> {
    i2c: I2C,
}

impl<I2C> Ds3231<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Burst-reads seconds through year in one transaction so the fields
    /// cannot roll over between reads.
    pub fn read_registers(&mut self) -> Result<[u8; RTC_REGISTER_COUNT], I2C::Error> {
        let mut raw = [0u8; RTC_REGISTER_COUNT];
        self.i2c
            .write_read(DS3231_ADDRESS, &[SECONDS_REGISTER], &mut raw)?;
        Ok(raw)
    }

    pub fn now(&mut self) -> Result<DateTime, Ds3231Error<I2C::Error>> {
        let raw = self.read_registers().map_err(Ds3231Error::Bus)?;
        decode_registers(raw).map_err(Ds3231Error::Decode)
    }
}

/// Calendar from the DS3231, window timing from the system timer.
pub struct BoardClock<I2C> {
    rtc: Ds3231<I2C>,
    boot: Instant,
}

impl<I2C> BoardClock<I2C>
where
    I2C: I2c,
{
    pub fn new(rtc: Ds3231<I2C>) -> Self {
        Self {
            rtc,
            boot: Instant::now(),
        }
    }
}

impl<I2C> ClockSource for BoardClock<I2C>
where
    I2C: I2c,
{
    type Error = Ds3231Error<I2C::Error>;

    fn now(&mut self) -> Result<DateTime, Self::Error> {
        self.rtc.now()
    }

    fn uptime_ms(&self) -> u64 {
        self.boot.elapsed().as_millis()
    }
}
