use embedded_io::{Read, ReadReady};

use tagwatch_core::io::ByteSource;

/// Polls a UART receiver one byte at a time without blocking.
#[derive(Debug)]
pub struct UartByteSource<U> {
    rx: U,
}

impl<U> UartByteSource<U>
where
    U: Read + ReadReady,
{
    pub fn new(rx: U) -> Self {
        Self { rx }
    }
}

impl<U> ByteSource for UartByteSource<U>
where
    U: Read + ReadReady,
{
    type Error = U::Error;

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        if !self.rx.read_ready()? {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.rx.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}
