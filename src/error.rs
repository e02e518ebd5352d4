use std::fmt;

use thiserror::Error;

use crate::channel_binding::BindType;
use crate::server::Step;

/// The SCRAM mechanism error cases.
///
/// Every error is terminal: the exchange that produced it must be discarded and a new one
/// started with a fresh server nonce.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A message wasn't formatted as required. `Kind` contains further information.
    ///
    /// RFC5802 section 7 describes the format of the exchanged messages.
    #[error("malformed message: {0}")]
    MalformedMessage(Kind),
    /// The hash algorithm or mechanism name isn't supported.
    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),
    /// The peer required a mandatory extension to be present that isn't supported.
    #[error("unsupported extension")]
    UnsupportedExtension,
    /// The requested channel binding type is unknown or not accepted by the mechanism.
    #[error("unsupported channel binding `{0}`")]
    UnsupportedChannelBinding(String),
    /// The client claims the server doesn't support channel binding although it was offered.
    #[error("client downgraded channel binding")]
    ChannelBindingDowngrade,
    /// The transport couldn't supply binding data for the requested type.
    #[error("channel binding data for {0} is unavailable")]
    ChannelBindingUnavailable(BindType),
    /// The `c=` attribute of the client final message doesn't match the expected value.
    #[error("channel binding mismatch")]
    ChannelBindingMismatch,
    /// The user doesn't exist or has no usable credentials.
    #[error("unknown user")]
    UnknownUser,
    /// The stored credentials use fewer iterations than the configured minimum.
    #[error("iteration count {actual} is below the minimum of {minimum}")]
    InsufficientIterations {
        /// Iteration count of the stored credentials.
        actual: u32,
        /// Configured minimum.
        minimum: u32,
    },
    /// The nonce echoed by the client differs from the combined nonce.
    #[error("nonce mismatch")]
    NonceMismatch,
    /// The client proof is wrong.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The authenticated user may not act as the requested authorization identity.
    #[error("`{authcid}` is not authorized to act as `{authzid}`")]
    NotAuthorized {
        /// Authenticated identity.
        authcid: String,
        /// Requested authorization identity.
        authzid: String,
    },
    /// A message arrived while the exchange was in a state that doesn't accept it.
    #[error("message received in illegal state {0:?}")]
    IllegalState(Step),
    /// The server signature couldn't be validated. This usually means that the server didn't
    /// possess a stored key to verify the credentials.
    #[error("server failed validation")]
    InvalidServer,
    /// The server rejected the authentication request. `String` contains the `server-error-value`.
    #[error("authentication error {0}")]
    ServerRejected(String),
}

/// The kinds of protocol errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// The server responded with a nonce that doesn't start with our nonce.
    InvalidNonce,
    /// The content of the field `Field` is invalid.
    InvalidField(Field),
    /// The field `Field` was expected but not found.
    ExpectedField(Field),
}

/// The fields used in the exchanged messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// Whole message, not valid UTF-8
    Encoding,
    /// GS2 channel binding flag
    ChannelBindingFlag,
    /// Authorization ID
    Authzid,
    /// Reserved mandatory extension
    Extension,
    /// Username
    Authcid,
    /// Nonce
    Nonce,
    /// Salt
    Salt,
    /// Iterations
    Iterations,
    /// Channel binding
    ChannelBinding,
    /// Client proof
    Proof,
    /// Verify or error
    VerifyOrError,
}

/// Coarse classification used to pick a log level or a metric label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// The peer violated the message grammar.
    Protocol,
    /// Negotiation or verification of channel binding failed.
    ChannelBinding,
    /// The credentials or the authorization were rejected.
    Authentication,
    /// The exchange was driven out of sequence.
    State,
    /// Server side misconfiguration.
    Configuration,
}

/// The `server-error-value`s of RFC5802 section 7 this crate emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerError {
    /// `invalid-encoding`
    InvalidEncoding,
    /// `extensions-not-supported`
    ExtensionsNotSupported,
    /// `unsupported-channel-binding-type`
    UnsupportedChannelBindingType,
    /// `other-error`
    OtherError,
}

impl ServerError {
    /// The value as it appears after `e=`.
    pub fn as_str(self) -> &'static str {
        match self {
            ServerError::InvalidEncoding => "invalid-encoding",
            ServerError::ExtensionsNotSupported => "extensions-not-supported",
            ServerError::UnsupportedChannelBindingType => "unsupported-channel-binding-type",
            ServerError::OtherError => "other-error",
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Kind::InvalidNonce => write!(fmt, "invalid nonce"),
            Kind::InvalidField(field) => write!(fmt, "invalid field {:?}", field),
            Kind::ExpectedField(field) => write!(fmt, "expected field {:?}", field),
        }
    }
}

impl Error {
    pub(crate) fn expected(field: Field) -> Self {
        Error::MalformedMessage(Kind::ExpectedField(field))
    }

    pub(crate) fn invalid(field: Field) -> Self {
        Error::MalformedMessage(Kind::InvalidField(field))
    }

    /// Classifies the error for logging.
    pub fn category(&self) -> Category {
        use self::Error::*;
        match *self {
            MalformedMessage(_) | UnsupportedExtension => Category::Protocol,
            UnsupportedChannelBinding(_)
            | ChannelBindingDowngrade
            | ChannelBindingUnavailable(_)
            | ChannelBindingMismatch => Category::ChannelBinding,
            UnknownUser | NonceMismatch | InvalidCredentials | NotAuthorized { .. } => {
                Category::Authentication
            }
            InvalidServer | ServerRejected(_) => Category::Authentication,
            IllegalState(_) => Category::State,
            UnsupportedAlgorithm(_) | InsufficientIterations { .. } => Category::Configuration,
        }
    }

    /// Whether the error may indicate an attempt to strip channel binding from the exchange.
    pub fn is_possible_downgrade(&self) -> bool {
        matches!(
            *self,
            Error::ChannelBindingMismatch | Error::ChannelBindingDowngrade
        )
    }

    /// The value to report to the client in an `e=` server final message.
    ///
    /// Authentication failures all map to `other-error` so the client can't tell which check
    /// failed.
    pub fn server_error(&self) -> ServerError {
        use self::Error::*;
        match *self {
            MalformedMessage(_) | IllegalState(_) => ServerError::InvalidEncoding,
            UnsupportedExtension => ServerError::ExtensionsNotSupported,
            UnsupportedChannelBinding(_) => ServerError::UnsupportedChannelBindingType,
            _ => ServerError::OtherError,
        }
    }
}
