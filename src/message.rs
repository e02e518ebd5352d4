//! Parsers and builders for the four SCRAM messages (RFC5802 section 7).
//!
//! Parsers keep borrowed slices of the input where the transcript needs the exact bytes the
//! peer sent: the GS2 header, `client-first-message-bare` and `client-final-message-without-proof`
//! are never rebuilt from their fields.

use std::num::NonZeroU32;

use crate::channel_binding::Gs2Flag;
use crate::error::{Error, Field};

/// A parsed `client-first-message`.
#[derive(Debug, PartialEq)]
pub struct ClientFirst<'a> {
    /// The GS2 header including its trailing comma, e.g. `n,a=admin,`.
    pub gs2_header: &'a str,
    /// The channel binding flag of the GS2 header.
    pub cbind_flag: Gs2Flag<'a>,
    /// The decoded authorization identity, if one was requested.
    pub authzid: Option<String>,
    /// `client-first-message-bare`, verbatim.
    pub bare: &'a str,
    /// The reserved mandatory extension attribute value, if present.
    pub mext: Option<&'a str>,
    /// The decoded username.
    pub username: String,
    /// The client nonce.
    pub nonce: &'a str,
    /// Optional extensions after the nonce, verbatim.
    pub extensions: Option<&'a str>,
}

impl<'a> ClientFirst<'a> {
    /// Parses a client's first message. Gives an error if the data was malformed in any way.
    pub fn parse(input: &'a str) -> Result<Self, Error> {
        let (flag, rest) = input
            .split_once(',')
            .ok_or_else(|| Error::expected(Field::ChannelBindingFlag))?;
        let cbind_flag = match flag {
            "" => return Err(Error::expected(Field::ChannelBindingFlag)),
            "n" => Gs2Flag::NotSupported,
            "y" => Gs2Flag::SupportedButUnused,
            _ => match flag.strip_prefix("p=") {
                Some(name) if is_cb_name(name) => Gs2Flag::Required(name),
                _ => return Err(Error::invalid(Field::ChannelBindingFlag)),
            },
        };

        let (authzid, bare) = rest
            .split_once(',')
            .ok_or_else(|| Error::expected(Field::Authzid))?;
        let authzid = if authzid.is_empty() {
            None
        } else {
            let raw = authzid
                .strip_prefix("a=")
                .ok_or_else(|| Error::expected(Field::Authzid))?;
            Some(decode_saslname(raw).ok_or_else(|| Error::invalid(Field::Authzid))?)
        };
        let gs2_header = &input[..input.len() - bare.len()];

        let (mext, rest) = match bare.strip_prefix("m=") {
            Some(rest) => {
                let (mext, rest) = rest
                    .split_once(',')
                    .ok_or_else(|| Error::expected(Field::Authcid))?;
                if mext.is_empty() || mext.contains('\0') {
                    return Err(Error::invalid(Field::Extension));
                }
                (Some(mext), rest)
            }
            None => (None, bare),
        };

        let (username, rest) = rest
            .split_once(',')
            .ok_or_else(|| Error::expected(Field::Nonce))?;
        let username = username
            .strip_prefix("n=")
            .ok_or_else(|| Error::expected(Field::Authcid))?;
        let username = decode_saslname(username).ok_or_else(|| Error::invalid(Field::Authcid))?;

        let rest = rest
            .strip_prefix("r=")
            .ok_or_else(|| Error::expected(Field::Nonce))?;
        let (nonce, extensions) = match rest.split_once(',') {
            Some((nonce, extensions)) => (nonce, Some(extensions)),
            None => (rest, None),
        };
        if !is_printable(nonce.as_bytes()) {
            return Err(Error::invalid(Field::Nonce));
        }

        Ok(ClientFirst {
            gs2_header,
            cbind_flag,
            authzid,
            bare,
            mext,
            username,
            nonce,
            extensions,
        })
    }
}

/// A parsed `client-final-message`.
///
/// The message is parsed as bytes: decoding of `c=` and `p=` is left to the verifier so that a
/// tampered value is reported as a failed check rather than as a grammar error.
#[derive(Debug, PartialEq)]
pub struct ClientFinal<'a> {
    /// `client-final-message-without-proof`, verbatim.
    pub without_proof: &'a [u8],
    /// The base64 channel binding attribute value.
    pub channel_binding: &'a [u8],
    /// The combined nonce echoed by the client.
    pub nonce: &'a [u8],
    /// The base64 client proof.
    pub proof: &'a [u8],
}

impl<'a> ClientFinal<'a> {
    /// Parses the client's final message. Gives an error if the data was malformed.
    pub fn parse(input: &'a [u8]) -> Result<Self, Error> {
        let rest = input
            .strip_prefix(b"c=")
            .ok_or_else(|| Error::expected(Field::ChannelBinding))?;
        let (channel_binding, rest) =
            split_once(rest, b',').ok_or_else(|| Error::expected(Field::Nonce))?;
        if channel_binding.is_empty() {
            return Err(Error::invalid(Field::ChannelBinding));
        }
        let rest = rest
            .strip_prefix(b"r=")
            .ok_or_else(|| Error::expected(Field::Nonce))?;
        let (nonce, _) = split_once(rest, b',').ok_or_else(|| Error::expected(Field::Proof))?;
        if !is_printable(nonce) {
            return Err(Error::invalid(Field::Nonce));
        }

        let proof_start = rfind(input, b",p=").ok_or_else(|| Error::expected(Field::Proof))?;
        let without_proof = &input[..proof_start];
        let proof = &input[proof_start + 3..];
        if proof.is_empty() || proof.contains(&b',') {
            return Err(Error::invalid(Field::Proof));
        }

        Ok(ClientFinal {
            without_proof,
            channel_binding,
            nonce,
            proof,
        })
    }
}

/// A parsed `server-first-message`.
#[derive(Debug, PartialEq)]
pub struct ServerFirst<'a> {
    /// The combined nonce.
    pub nonce: &'a str,
    /// The decoded salt.
    pub salt: Vec<u8>,
    /// The iteration count.
    pub iterations: NonZeroU32,
}

impl<'a> ServerFirst<'a> {
    /// Parses a `server-first-message`.
    pub fn parse(data: &'a str) -> Result<Self, Error> {
        if data.starts_with("m=") {
            return Err(Error::UnsupportedExtension);
        }
        let mut parts = data.split(',');
        let nonce = attribute(parts.next(), "r=", Field::Nonce)?;
        if !is_printable(nonce.as_bytes()) {
            return Err(Error::invalid(Field::Nonce));
        }
        let salt = attribute(parts.next(), "s=", Field::Salt)?;
        let salt = base64::decode(salt).map_err(|_| Error::invalid(Field::Salt))?;
        let iterations = attribute(parts.next(), "i=", Field::Iterations)?;
        let iterations = iterations
            .parse::<NonZeroU32>()
            .map_err(|_| Error::invalid(Field::Iterations))?;
        Ok(ServerFirst {
            nonce,
            salt,
            iterations,
        })
    }
}

/// A parsed `server-final-message`.
#[derive(Debug, PartialEq)]
pub enum ServerFinal<'a> {
    /// `v=`: the decoded server signature.
    Verifier(Vec<u8>),
    /// `e=`: the `server-error-value`.
    Error(&'a str),
}

impl<'a> ServerFinal<'a> {
    /// Parses a `server-final-message`.
    pub fn parse(data: &'a str) -> Result<Self, Error> {
        if let Some(verifier) = data.strip_prefix("v=") {
            let verifier = verifier.split(',').next().unwrap_or_default();
            base64::decode(verifier)
                .map(ServerFinal::Verifier)
                .map_err(|_| Error::invalid(Field::VerifyOrError))
        } else if let Some(error) = data.strip_prefix("e=") {
            Ok(ServerFinal::Error(error.split(',').next().unwrap_or_default()))
        } else {
            Err(Error::expected(Field::VerifyOrError))
        }
    }
}

/// Builds the GS2 header for the given flag and authorization identity.
pub fn gs2_header(flag: Gs2Flag, authzid: Option<&str>) -> String {
    match authzid {
        Some(authzid) => format!("{},a={},", flag.to_header_part(), encode_saslname(authzid)),
        None => format!("{},,", flag.to_header_part()),
    }
}

/// Builds `client-first-message-bare`.
pub fn client_first_bare(username: &str, nonce: &str) -> String {
    format!("n={},r={}", encode_saslname(username), nonce)
}

/// Builds `client-final-message-without-proof`.
pub fn client_final_without_proof(channel_binding: &[u8], nonce: &str) -> String {
    format!("c={},r={}", base64::encode(channel_binding), nonce)
}

/// Builds the `server-first-message`.
pub fn server_first(nonce: &str, salt: &[u8], iterations: NonZeroU32) -> String {
    format!("r={},s={},i={}", nonce, base64::encode(salt), iterations)
}

/// Builds the successful `server-final-message`.
pub fn server_final(server_signature: &[u8]) -> String {
    format!("v={}", base64::encode(server_signature))
}

/// Builds a failed `server-final-message` from an error.
pub fn server_error(error: &Error) -> String {
    format!("e={}", error.server_error())
}

/// Escapes `,` and `=` in a username or authorization identity.
pub fn encode_saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

/// Reverses [`encode_saslname`]. Returns `None` for empty names, unescaped commas and unknown
/// escape sequences.
pub fn decode_saslname(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let mut decoded = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(pos) = rest.find(|c: char| c == '=' || c == ',' || c == '\0') {
        decoded.push_str(&rest[..pos]);
        let escape = rest[pos..].get(..3)?;
        match escape {
            "=2C" => decoded.push(','),
            "=3D" => decoded.push('='),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    decoded.push_str(rest);
    Some(decoded)
}

fn is_cb_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}

/// `printable` of RFC5802: `%x21-2B / %x2D-7E`, at least one character.
fn is_printable(value: &[u8]) -> bool {
    !value.is_empty() && value.iter().all(|&b| (0x21..=0x7e).contains(&b) && b != b',')
}

fn attribute<'a>(part: Option<&'a str>, key: &str, field: Field) -> Result<&'a str, Error> {
    part.and_then(|part| part.strip_prefix(key))
        .ok_or_else(|| Error::expected(field))
}

fn split_once(input: &[u8], delimiter: u8) -> Option<(&[u8], &[u8])> {
    let pos = input.iter().position(|&b| b == delimiter)?;
    Some((&input[..pos], &input[pos + 1..]))
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|window| window == needle)
}
