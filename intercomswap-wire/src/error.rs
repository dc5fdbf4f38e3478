use std::fmt;

/// Error raised by envelope construction, signing, verification or
/// structural validation.
///
/// The variant identifies the error condition for code that handles errors
/// by type; the contained message is a human-readable description and must
/// not be parsed programmatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
	/// The envelope is not structurally usable at all: wrong version,
	/// unknown kind, bad trade id, or a body that is not a JSON object.
	MalformedEnvelope(String),

	/// The envelope parsed, but a kind-specific field is missing, has the
	/// wrong type, is out of range, or an unknown key is present.
	SchemaViolation(String),

	/// The signature or signer key failed to decode or verify.
	SignatureInvalid(String),

	/// A value could not be canonically encoded (e.g. a non-integer JSON
	/// number, or an integer outside the interoperable 2^53 range).
	CanonicalEncoding(String),
}

impl fmt::Display for WireError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WireError::MalformedEnvelope(msg) => write!(f, "malformed envelope: {}", msg),
			WireError::SchemaViolation(msg) => write!(f, "schema violation: {}", msg),
			WireError::SignatureInvalid(msg) => write!(f, "signature invalid: {}", msg),
			WireError::CanonicalEncoding(msg) => write!(f, "canonical encoding: {}", msg),
		}
	}
}

impl std::error::Error for WireError {}
