//! Per-power-cycle identity: who is logging, where, and into which file.

use core::fmt::Write;

use heapless::String;

use crate::{
    clock::DateTime,
    config::{FieldConfig, LOGGER_ID_MAX_BYTES, OPERATOR_ID_LEN, SITE_ID_LEN},
};

pub const LOG_FILE_EXTENSION: &str = "CSV";
pub const LOG_FILE_NAME_BYTES: usize = 12;
pub const MAX_DAILY_SEQUENCE: u8 = 99;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileNameError<E> {
    SequenceExhausted,
    Probe(E),
}

/// `YYMMDDNN.CSV`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogFileName(String<LOG_FILE_NAME_BYTES>);

impl LogFileName {
    pub fn for_day(date: &DateTime, sequence: u8) -> Option<Self> {
        if sequence > MAX_DAILY_SEQUENCE {
            return None;
        }

        let mut name = String::new();
        write!(
            name,
            "{:02}{:02}{:02}{:02}.{}",
            date.year_in_century(),
            date.month,
            date.day,
            sequence,
            LOG_FILE_EXTENSION
        )
        .ok()?;
        Some(Self(name))
    }

    /// Picks the lowest daily sequence number whose file does not exist yet.
    pub fn first_free<E, F>(date: &DateTime, mut exists: F) -> Result<Self, FileNameError<E>>
    where
        F: FnMut(&str) -> Result<bool, E>,
    {
        for sequence in 0..=MAX_DAILY_SEQUENCE {
            let Some(candidate) = Self::for_day(date, sequence) else {
                break;
            };
            if !exists(candidate.as_str()).map_err(FileNameError::Probe)? {
                return Ok(candidate);
            }
        }
        Err(FileNameError::SequenceExhausted)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Immutable identity stamped onto every record of one power cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionIdentity {
    site_id: String<SITE_ID_LEN>,
    operator_id: String<OPERATOR_ID_LEN>,
    logger_id: String<LOGGER_ID_MAX_BYTES>,
    file_name: LogFileName,
}

impl SessionIdentity {
    /// Returns `None` if `logger_id` does not fit.
    pub fn new(config: FieldConfig, logger_id: &str, file_name: LogFileName) -> Option<Self> {
        let mut logger = String::new();
        logger.push_str(logger_id).ok()?;

        Some(Self {
            site_id: config.site_id,
            operator_id: config.operator_id,
            logger_id: logger,
            file_name,
        })
    }

    pub fn site_id(&self) -> &str {
        self.site_id.as_str()
    }

    pub fn operator_id(&self) -> &str {
        self.operator_id.as_str()
    }

    pub fn logger_id(&self) -> &str {
        self.logger_id.as_str()
    }

    pub fn file_name(&self) -> &LogFileName {
        &self.file_name
    }
}
