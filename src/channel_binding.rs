//! Channel binding (RFC5802 section 6, RFC5929).
//!
//! The GS2 header of the client first message tells the server which binding the client wants.
//! For the TLS bound types the server asks a [`ChannelBindingProvider`] for the binding bytes of
//! its own end of the connection and expects the client's `c=` attribute to carry exactly
//! `gs2-header || binding-data`.

use std::fmt;

use crate::crypto::constant_time_eq;
use crate::error::Error;

/// The channel binding flag of a GS2 header, as it appeared on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gs2Flag<'a> {
    /// `n`: the client doesn't support channel binding.
    NotSupported,
    /// `y`: the client supports channel binding but thinks the server doesn't.
    SupportedButUnused,
    /// `p=<cb-name>`: the client requires channel binding of the named type.
    Required(&'a str),
}

impl<'a> Gs2Flag<'a> {
    /// The flag as it is written into a GS2 header.
    pub fn to_header_part(&self) -> String {
        match *self {
            Gs2Flag::NotSupported => "n".to_string(),
            Gs2Flag::SupportedButUnused => "y".to_string(),
            Gs2Flag::Required(name) => format!("p={}", name),
        }
    }
}

/// The channel binding requested by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindType {
    /// Client doesn't support channel binding.
    None,
    /// Client does support channel binding but thinks the server does not.
    SupportedButUnused,
    /// Client requires channel binding: `tls-unique`.
    TlsUnique,
    /// Client requires channel binding: `tls-server-end-point`.
    TlsServerEndPoint,
}

impl BindType {
    /// Maps a GS2 channel binding flag to the bind type it requests.
    pub fn resolve(flag: Gs2Flag) -> Result<Self, Error> {
        match flag {
            Gs2Flag::NotSupported => Ok(BindType::None),
            Gs2Flag::SupportedButUnused => Ok(BindType::SupportedButUnused),
            Gs2Flag::Required("tls-unique") => Ok(BindType::TlsUnique),
            Gs2Flag::Required("tls-server-end-point") => Ok(BindType::TlsServerEndPoint),
            Gs2Flag::Required(name) => Err(Error::UnsupportedChannelBinding(name.to_string())),
        }
    }

    /// Whether the binding type ties the exchange to transport data.
    pub fn requires_data(self) -> bool {
        matches!(self, BindType::TlsUnique | BindType::TlsServerEndPoint)
    }

    /// The GS2 flag a client sends to request this binding type.
    pub fn gs2_flag(self) -> Gs2Flag<'static> {
        match self {
            BindType::None => Gs2Flag::NotSupported,
            BindType::SupportedButUnused => Gs2Flag::SupportedButUnused,
            BindType::TlsUnique => Gs2Flag::Required("tls-unique"),
            BindType::TlsServerEndPoint => Gs2Flag::Required("tls-server-end-point"),
        }
    }
}

impl fmt::Display for BindType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(match *self {
            BindType::None => "n",
            BindType::SupportedButUnused => "y",
            BindType::TlsUnique => "tls-unique",
            BindType::TlsServerEndPoint => "tls-server-end-point",
        })
    }
}

/// Supplies channel binding data of the transport the exchange runs over.
pub trait ChannelBindingProvider {
    /// Returns the binding bytes for `bind_type`, or `None` if the transport can't provide them.
    /// Only called for bind types that [require data](enum.BindType.html#method.requires_data).
    fn binding_data(&self, bind_type: BindType) -> Option<Vec<u8>>;
}

impl<'a, B: ChannelBindingProvider + ?Sized> ChannelBindingProvider for &'a B {
    fn binding_data(&self, bind_type: BindType) -> Option<Vec<u8>> {
        (**self).binding_data(bind_type)
    }
}

/// A transport without channel binding, e.g. a plaintext connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoChannelBinding;

impl ChannelBindingProvider for NoChannelBinding {
    fn binding_data(&self, _bind_type: BindType) -> Option<Vec<u8>> {
        None
    }
}

/// Binding data captured from an established TLS session.
#[derive(Clone, Debug, Default)]
pub struct TlsChannelBinding {
    tls_unique: Option<Vec<u8>>,
    tls_server_end_point: Option<Vec<u8>>,
}

impl TlsChannelBinding {
    /// Creates a provider without any binding data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `tls-unique` data, i.e. the first Finished message of the handshake.
    pub fn with_tls_unique(mut self, data: Vec<u8>) -> Self {
        self.tls_unique = Some(data);
        self
    }

    /// Sets the `tls-server-end-point` data, i.e. the hash of the server certificate.
    pub fn with_tls_server_end_point(mut self, data: Vec<u8>) -> Self {
        self.tls_server_end_point = Some(data);
        self
    }
}

impl ChannelBindingProvider for TlsChannelBinding {
    fn binding_data(&self, bind_type: BindType) -> Option<Vec<u8>> {
        match bind_type {
            BindType::TlsUnique => self.tls_unique.clone(),
            BindType::TlsServerEndPoint => self.tls_server_end_point.clone(),
            BindType::None | BindType::SupportedButUnused => None,
        }
    }
}

/// Asks `provider` for the binding data `bind_type` needs.
///
/// Returns `Ok(None)` for bind types that don't carry data.
pub fn resolve_data<B: ChannelBindingProvider + ?Sized>(
    provider: &B,
    bind_type: BindType,
) -> Result<Option<Vec<u8>>, Error> {
    if !bind_type.requires_data() {
        return Ok(None);
    }
    match provider.binding_data(bind_type) {
        Some(data) => Ok(Some(data)),
        None => Err(Error::ChannelBindingUnavailable(bind_type)),
    }
}

/// The unencoded `c=` value: the GS2 header, followed by the binding data for TLS bound types.
pub fn expected_value(gs2_header: &str, bind_type: BindType, data: Option<&[u8]>) -> Vec<u8> {
    let mut value = gs2_header.as_bytes().to_vec();
    if bind_type.requires_data() {
        if let Some(data) = data {
            value.extend_from_slice(data);
        }
    }
    value
}

/// Checks the base64 `c=` attribute sent by the client against the expected value.
pub fn verify(declared: &[u8], expected: &[u8]) -> Result<(), Error> {
    let declared = base64::decode(declared).map_err(|_| Error::ChannelBindingMismatch)?;
    if constant_time_eq(&declared, expected) {
        Ok(())
    } else {
        Err(Error::ChannelBindingMismatch)
    }
}
