//! Call domain service

use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::PhoneNumber;

/// Domain service for call-related operations
///
/// Domain services contain business logic that doesn't naturally
/// fit within a single aggregate.
pub struct CallDomainService;

impl CallDomainService {
    /// Validate the inputs of an outbound dial.
    ///
    /// Both a destination and a selected originating number are required.
    pub fn validate_dial(
        destination: &str,
        from: Option<&str>,
    ) -> Result<(PhoneNumber, PhoneNumber)> {
        let destination = PhoneNumber::parse(destination).map_err(|_| {
            DomainError::ValidationError("destination number is required".to_string())
        })?;

        let from = from
            .map(PhoneNumber::parse)
            .transpose()
            .ok()
            .flatten()
            .ok_or_else(|| {
                DomainError::ValidationError("an originating number must be selected".to_string())
            })?;

        Ok((destination, from))
    }
}
