//! Tunables and the on-card configuration file.

use core::str;

use heapless::String;

pub const DEFAULT_WINDOW_MS: u32 = 60_000;
pub const MIN_WINDOW_MS: u32 = 500;
pub const DEFAULT_PAUSE_MS: u32 = 10_000;
pub const DEFAULT_LOGGER_ID: &str = "TW01";

pub const SITE_ID_LEN: usize = 6;
pub const OPERATOR_ID_LEN: usize = 3;
pub const LOGGER_ID_MAX_BYTES: usize = 16;

/// Name of the configuration resource in the card root.
pub const CONFIG_FILE_NAME: &str = "CONFIG.TXT";
/// Upper bound on how much of the configuration file is read.
pub const CONFIG_FILE_MAX_BYTES: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WindowConfig {
    window_ms: u32,
    pause_ms: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WindowConfigError {
    WindowTooShort { window_ms: u32 },
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            pause_ms: DEFAULT_PAUSE_MS,
        }
    }
}

impl WindowConfig {
    pub const fn with_window_ms(mut self, window_ms: u32) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub const fn with_pause_ms(mut self, pause_ms: u32) -> Self {
        self.pause_ms = pause_ms;
        self
    }

    pub fn validated(self) -> Result<Self, WindowConfigError> {
        if self.window_ms < MIN_WINDOW_MS {
            return Err(WindowConfigError::WindowTooShort {
                window_ms: self.window_ms,
            });
        }
        Ok(self)
    }

    pub const fn window_ms(&self) -> u32 {
        self.window_ms
    }

    pub const fn pause_ms(&self) -> u32 {
        self.pause_ms
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigError {
    NotUtf8,
    MissingSiteId,
    MissingOperatorId,
    BadSiteId,
    BadOperatorId,
    TrailingData,
}

/// The two identifiers read from `CONFIG.TXT`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldConfig {
    pub site_id: String<SITE_ID_LEN>,
    pub operator_id: String<OPERATOR_ID_LEN>,
}

impl FieldConfig {
    /// Parses `<site>` and `<operator>` separated by a line break or a comma.
    ///
    /// Blank lines and surrounding whitespace are ignored. Both fields must be
    /// exactly the expected length of printable ASCII. The operator ID is
    /// written bare into each record, so it may not contain a quote.
    pub fn parse(raw: &[u8]) -> Result<Self, ConfigError> {
        let text = str::from_utf8(raw).map_err(|_| ConfigError::NotUtf8)?;
        let mut fields = text
            .split(['\n', '\r', ','])
            .map(str::trim)
            .filter(|field| !field.is_empty());

        let site = fields.next().ok_or(ConfigError::MissingSiteId)?;
        let operator = fields.next().ok_or(ConfigError::MissingOperatorId)?;
        if fields.next().is_some() {
            return Err(ConfigError::TrailingData);
        }

        Ok(Self {
            site_id: exact_ascii(site).ok_or(ConfigError::BadSiteId)?,
            operator_id: exact_ascii(operator)
                .filter(|id: &String<OPERATOR_ID_LEN>| !id.contains('"'))
                .ok_or(ConfigError::BadOperatorId)?,
        })
    }
}

fn exact_ascii<const N: usize>(field: &str) -> Option<String<N>> {
    if field.len() != N || !field.bytes().all(|b| b.is_ascii_graphic()) {
        return None;
    }
    let mut out = String::new();
    out.push_str(field).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_config_enforces_minimum() {
        assert!(WindowConfig::default().validated().is_ok());
        assert!(
            WindowConfig::default()
                .with_window_ms(MIN_WINDOW_MS)
                .validated()
                .is_ok()
        );
        assert_eq!(
            WindowConfig::default().with_window_ms(499).validated(),
            Err(WindowConfigError::WindowTooShort { window_ms: 499 })
        );
    }

    #[test]
    fn parses_line_and_comma_separated_config() {
        let lines = FieldConfig::parse(b"NEST07\r\nJDL\r\n").unwrap();
        assert_eq!(lines.site_id.as_str(), "NEST07");
        assert_eq!(lines.operator_id.as_str(), "JDL");

        let comma = FieldConfig::parse(b" NEST07 , JDL").unwrap();
        assert_eq!(comma, lines);
    }

    #[test]
    fn rejects_malformed_config() {
        assert_eq!(FieldConfig::parse(b""), Err(ConfigError::MissingSiteId));
        assert_eq!(
            FieldConfig::parse(b"NEST07\n"),
            Err(ConfigError::MissingOperatorId)
        );
        assert_eq!(
            FieldConfig::parse(b"NEST7\nJDL"),
            Err(ConfigError::BadSiteId)
        );
        assert_eq!(
            FieldConfig::parse(b"NEST07\nJDL\nXYZ"),
            Err(ConfigError::TrailingData)
        );
        assert_eq!(
            FieldConfig::parse(b"NEST07\nJ L"),
            Err(ConfigError::BadOperatorId)
        );
        assert_eq!(
            FieldConfig::parse(b"NEST07\nJDLX"),
            Err(ConfigError::BadOperatorId)
        );
        assert_eq!(FieldConfig::parse(&[0xFF, 0xFE]), Err(ConfigError::NotUtf8));
    }

    #[test]
    fn rejects_quote_in_bare_operator_field() {
        assert_eq!(
            FieldConfig::parse(b"NEST07\n\"AB"),
            Err(ConfigError::BadOperatorId)
        );
        assert_eq!(
            FieldConfig::parse(b"NEST07\nA\"B"),
            Err(ConfigError::BadOperatorId)
        );
        // Quoted on output, so a quote in the site ID is fine.
        assert!(FieldConfig::parse(b"NE\"T07\nJDL").is_ok());
    }
}
