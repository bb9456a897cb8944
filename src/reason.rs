//! Revocation reason codes.

use std::{fmt, str::FromStr};

/// Enumeration of reasons for revocation.
///
/// The reason codes are taken from [RFC 5280 §5.3.1].
///
/// [RFC 5280 §5.3.1]: https://tools.ietf.org/html/rfc5280#section-5.3.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CACompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    // value 7 is not used
    RemoveFromCRL = 8,
    PrivilegeWithdrawn = 9,
    AACompromise = 10,
}

/// Normalized reason names, as accepted by [`resolve_reason_code`].
static REASON_CODES: [(&str, RevocationReason); 10] = [
    ("unspecified", RevocationReason::Unspecified),
    ("keycompromise", RevocationReason::KeyCompromise),
    ("cacompromise", RevocationReason::CACompromise),
    ("affiliationchanged", RevocationReason::AffiliationChanged),
    ("superseded", RevocationReason::Superseded),
    ("cessationofoperation", RevocationReason::CessationOfOperation),
    ("certificatehold", RevocationReason::CertificateHold),
    ("removefromcrl", RevocationReason::RemoveFromCRL),
    ("privilegewithdrawn", RevocationReason::PrivilegeWithdrawn),
    ("aacompromise", RevocationReason::AACompromise),
];

impl RevocationReason {
    pub const MIN_CODE: u8 = RevocationReason::Unspecified as u8;
    pub const MAX_CODE: u8 = RevocationReason::AACompromise as u8;

    /// Numeric reason code.
    pub fn code(self) -> u8 {
        self as u8
    }

    fn from_name(name: &str) -> Option<Self> {
        let normalized = name.replace(' ', "").to_lowercase();

        REASON_CODES
            .iter()
            .find(|(key, _)| *key == normalized)
            .map(|(_, reason)| *reason)
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for RevocationReason {
    type Err = ReasonCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ReasonCodeError::Unrecognized(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasonCodeError {
    #[error(
        "reasonCode out of bounds. Got {0}, but want value between {min} and {max}",
        min = RevocationReason::MIN_CODE,
        max = RevocationReason::MAX_CODE
    )]
    OutOfBounds(i64),

    #[error("unrecognized revocation reason code '{0}'")]
    Unrecognized(String),
}

/// Converts a reason code given as a number or a name to its numeric code.
///
/// - `""` -> 0
/// - `"4"` -> 4
/// - `"key compromise"` -> 1
/// - `"keYComPromIse"` -> 1
///
/// Numeric input keeps any value in `0..=10`; names are matched case-insensitively with spaces
/// removed.
pub fn resolve_reason_code(input: &str) -> Result<u8, ReasonCodeError> {
    if input.is_empty() {
        return Ok(RevocationReason::Unspecified.code());
    }

    if let Ok(code) = input.parse::<i64>() {
        let range = i64::from(RevocationReason::MIN_CODE)..=i64::from(RevocationReason::MAX_CODE);
        if !range.contains(&code) {
            return Err(ReasonCodeError::OutOfBounds(code));
        }

        return u8::try_from(code).map_err(|_| ReasonCodeError::OutOfBounds(code));
    }

    input.parse::<RevocationReason>().map(RevocationReason::code)
}
