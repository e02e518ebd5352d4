use std::fmt;

use crate::channel_binding::BindType;
use crate::crypto::Algorithm;
use crate::error::Error;

/// A SCRAM mechanism as advertised in SASL, e.g. `SCRAM-SHA-256-PLUS`.
///
/// The `-PLUS` variants require channel binding; the others refuse it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mechanism {
    algorithm: Algorithm,
    plus: bool,
}

impl Mechanism {
    /// `SCRAM-SHA-1`
    pub const SCRAM_SHA_1: Mechanism = Mechanism::new(Algorithm::Sha1, false);
    /// `SCRAM-SHA-1-PLUS`
    pub const SCRAM_SHA_1_PLUS: Mechanism = Mechanism::new(Algorithm::Sha1, true);
    /// `SCRAM-SHA-256`
    pub const SCRAM_SHA_256: Mechanism = Mechanism::new(Algorithm::Sha256, false);
    /// `SCRAM-SHA-256-PLUS`
    pub const SCRAM_SHA_256_PLUS: Mechanism = Mechanism::new(Algorithm::Sha256, true);
    /// `SCRAM-SHA-512`
    pub const SCRAM_SHA_512: Mechanism = Mechanism::new(Algorithm::Sha512, false);
    /// `SCRAM-SHA-512-PLUS`
    pub const SCRAM_SHA_512_PLUS: Mechanism = Mechanism::new(Algorithm::Sha512, true);

    /// Creates a mechanism for `algorithm`, with channel binding if `plus` is set.
    pub const fn new(algorithm: Algorithm, plus: bool) -> Self {
        Mechanism { algorithm, plus }
    }

    /// Parses a SASL mechanism name.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let unsupported = || Error::UnsupportedAlgorithm(name.to_string());
        let rest = name.strip_prefix("SCRAM-").ok_or_else(unsupported)?;
        let (hash, plus) = match rest.strip_suffix("-PLUS") {
            Some(hash) => (hash, true),
            None => (rest, false),
        };
        let algorithm = Algorithm::from_name(hash).map_err(|_| unsupported())?;
        // Only the canonical spelling is a valid mechanism name.
        if algorithm.name() != hash {
            return Err(unsupported());
        }
        Ok(Mechanism::new(algorithm, plus))
    }

    /// The hash algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Whether this is a `-PLUS` variant.
    pub fn is_plus(&self) -> bool {
        self.plus
    }

    /// The SASL mechanism name.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Checks whether an exchange of this mechanism may use `bind_type`.
    ///
    /// `advertise_plus` tells whether the server offered a `-PLUS` mechanism on this connection;
    /// if so a client claiming that the server doesn't support channel binding is downgrading.
    pub fn check_bind_type(&self, bind_type: BindType, advertise_plus: bool) -> Result<(), Error> {
        match (self.plus, bind_type) {
            (true, BindType::TlsUnique) | (true, BindType::TlsServerEndPoint) => Ok(()),
            (true, other) => Err(Error::UnsupportedChannelBinding(other.to_string())),
            (false, BindType::None) => Ok(()),
            (false, BindType::SupportedButUnused) if advertise_plus => {
                Err(Error::ChannelBindingDowngrade)
            }
            (false, BindType::SupportedButUnused) => Ok(()),
            (false, other) => Err(Error::UnsupportedChannelBinding(other.to_string())),
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "SCRAM-{}", self.algorithm)?;
        if self.plus {
            fmt.write_str("-PLUS")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(Mechanism::SCRAM_SHA_1.name(), "SCRAM-SHA-1");
        assert_eq!(Mechanism::SCRAM_SHA_256_PLUS.name(), "SCRAM-SHA-256-PLUS");
        assert_eq!(
            Mechanism::from_name("SCRAM-SHA-512-PLUS"),
            Ok(Mechanism::SCRAM_SHA_512_PLUS)
        );
        assert_eq!(Mechanism::from_name("SCRAM-SHA-1"), Ok(Mechanism::SCRAM_SHA_1));
        for name in &["SCRAM-MD5", "SCRAM-SHA256", "DIGEST-MD5", "SCRAM-SHA-1-plus"] {
            assert_eq!(
                Mechanism::from_name(name),
                Err(Error::UnsupportedAlgorithm(name.to_string()))
            );
        }
    }

    #[test]
    fn plain_mechanism_refuses_binding() {
        let mechanism = Mechanism::SCRAM_SHA_1;
        assert_eq!(mechanism.check_bind_type(BindType::None, true), Ok(()));
        assert_eq!(
            mechanism.check_bind_type(BindType::SupportedButUnused, false),
            Ok(())
        );
        assert_eq!(
            mechanism.check_bind_type(BindType::SupportedButUnused, true),
            Err(Error::ChannelBindingDowngrade)
        );
        assert_eq!(
            mechanism.check_bind_type(BindType::TlsUnique, false),
            Err(Error::UnsupportedChannelBinding("tls-unique".to_string()))
        );
    }

    #[test]
    fn plus_mechanism_requires_binding() {
        let mechanism = Mechanism::SCRAM_SHA_256_PLUS;
        assert_eq!(mechanism.check_bind_type(BindType::TlsUnique, true), Ok(()));
        assert_eq!(
            mechanism.check_bind_type(BindType::TlsServerEndPoint, true),
            Ok(())
        );
        assert_eq!(
            mechanism.check_bind_type(BindType::None, true),
            Err(Error::UnsupportedChannelBinding("n".to_string()))
        );
        assert_eq!(
            mechanism.check_bind_type(BindType::SupportedButUnused, true),
            Err(Error::UnsupportedChannelBinding("y".to_string()))
        );
    }
}
