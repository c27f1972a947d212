//! Call entities

use crate::domain::call::dtmf::DtmfDigit;
use crate::domain::shared::error::DomainError;
use serde::{Deserialize, Serialize};

/// Number being composed on the dial pad while no call is in progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialBuffer {
    digits: String,
}

impl DialBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a keypad digit
    pub fn push(&mut self, digit: DtmfDigit) {
        self.digits.push(digit.to_char());
    }

    /// Append a raw character typed by the agent. A leading `+` is accepted
    /// for E.164 numbers; everything else must be a DTMF digit.
    pub fn push_char(&mut self, c: char) -> Result<(), DomainError> {
        if c == '+' && self.digits.is_empty() {
            self.digits.push(c);
            return Ok(());
        }
        let digit = DtmfDigit::from_char(c).ok_or_else(|| {
            DomainError::ValidationError(format!("'{}' is not a dial pad key", c))
        })?;
        self.push(digit);
        Ok(())
    }

    /// Remove the last character
    pub fn backspace(&mut self) -> Option<char> {
        self.digits.pop()
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.digits
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_buffer_editing() {
        let mut buffer = DialBuffer::new();
        buffer.push_char('+').unwrap();
        buffer.push_char('1').unwrap();
        buffer.push(DtmfDigit::Five);
        assert_eq!(buffer.as_str(), "+15");

        assert_eq!(buffer.backspace(), Some('5'));
        assert_eq!(buffer.as_str(), "+1");

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.backspace(), None);
    }

    #[test]
    fn test_plus_only_allowed_first() {
        let mut buffer = DialBuffer::new();
        buffer.push_char('1').unwrap();
        assert!(buffer.push_char('+').is_err());
        assert!(buffer.push_char('x').is_err());
        assert_eq!(buffer.as_str(), "1");
    }
}
