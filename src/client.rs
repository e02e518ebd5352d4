use rand::distributions::{Distribution, Uniform};
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::channel_binding::{self, BindType};
use crate::crypto::{constant_time_eq, find_proofs, hash_password, Algorithm};
use crate::error::{Error, Kind};
use crate::message::{self, ServerFinal as ServerFinalMessage, ServerFirst as ServerFirstMessage};
use crate::CLIENT_NONCE_LENGTH;

/// The initial state of the SCRAM mechanism. It's the entry point for a SCRAM handshake.
#[derive(Debug)]
pub struct ScramClient<'a> {
    algorithm: Algorithm,
    password: &'a str,
    nonce: String,
    authcid: &'a str,
    authzid: Option<&'a str>,
    bind_type: BindType,
    binding_data: Vec<u8>,
}

impl<'a> ScramClient<'a> {
    /// Constructs an initial state for the SCRAM mechanism using the provided credentials.
    ///
    /// # Arguments
    ///
    /// * algorithm - The hash algorithm of the mechanism the server selected.
    /// * authcid - An username used for authentication.
    /// * password - A password used to prove that the user is authentic.
    /// * authzid - An username used for authorization. This can be used to impersonate as `authzid`
    /// using the credentials of `authcid`. If `authzid` is `None` the authorized username will be
    /// the same as the authenticated username.
    pub fn new(
        algorithm: Algorithm,
        authcid: &'a str,
        password: &'a str,
        authzid: Option<&'a str>,
    ) -> Self {
        Self::with_rng(algorithm, authcid, password, authzid, &mut OsRng)
    }

    /// Constructs an initial state for the SCRAM mechanism using the provided credentials and a
    /// custom random number generator.
    ///
    /// * rng: A random number generator used to generate random nonces. Please only use a
    /// cryptographically secure random number generator!
    pub fn with_rng<R: Rng + CryptoRng>(
        algorithm: Algorithm,
        authcid: &'a str,
        password: &'a str,
        authzid: Option<&'a str>,
        rng: &mut R,
    ) -> Self {
        // printable, without ','
        let range = Uniform::new_inclusive(0x21u8, 0x7d);
        let nonce: String = (0..CLIENT_NONCE_LENGTH)
            .map(|_| {
                let x = range.sample(&mut *rng);
                if x >= b',' {
                    (x + 1) as char
                } else {
                    x as char
                }
            })
            .collect();

        ScramClient {
            algorithm,
            password,
            nonce,
            authcid,
            authzid,
            bind_type: BindType::None,
            binding_data: Vec::new(),
        }
    }

    /// Selects the channel binding to request. `data` is only sent for the TLS bound types.
    pub fn with_channel_binding(mut self, bind_type: BindType, data: Vec<u8>) -> Self {
        self.bind_type = bind_type;
        self.binding_data = data;
        self
    }

    /// Returns the next state and the first client message.
    ///
    /// Call the
    /// [`ServerFirst::handle_server_first`](struct.ServerFirst.html#method.handle_server_first)
    /// method to continue the SCRAM handshake.
    pub fn client_first(self) -> (ServerFirst<'a>, String) {
        let gs2_header = message::gs2_header(self.bind_type.gs2_flag(), self.authzid);
        let client_first_bare = message::client_first_bare(self.authcid, &self.nonce);
        let client_first = format!("{}{}", gs2_header, client_first_bare);
        let channel_binding = channel_binding::expected_value(
            &gs2_header,
            self.bind_type,
            Some(self.binding_data.as_slice()),
        );
        let server_first = ServerFirst {
            algorithm: self.algorithm,
            channel_binding,
            password: self.password,
            client_nonce: self.nonce,
            client_first_bare,
        };
        (server_first, client_first)
    }
}

/// The second state of the SCRAM mechanism after the first client message was computed.
#[derive(Debug)]
pub struct ServerFirst<'a> {
    algorithm: Algorithm,
    channel_binding: Vec<u8>,
    password: &'a str,
    client_nonce: String,
    client_first_bare: String,
}

impl<'a> ServerFirst<'a> {
    /// Processes the first answer from the server and returns the next state or an error. If an
    /// error is returned the SCRAM handshake is aborted.
    ///
    /// Call the [`ClientFinal::client_final`](struct.ClientFinal.html#method.client_final) method
    /// to continue the handshake.
    ///
    /// # Return value
    ///
    /// This method returns only a subset of the errors defined in [`Error`](../enum.Error.html):
    ///
    /// * Error::MalformedMessage
    /// * Error::UnsupportedExtension
    pub fn handle_server_first(self, server_first: &str) -> Result<ClientFinal, Error> {
        let ServerFirstMessage {
            nonce,
            salt,
            iterations,
        } = ServerFirstMessage::parse(server_first)?;
        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(Error::MalformedMessage(Kind::InvalidNonce));
        }

        let salted_password = Zeroizing::new(hash_password(
            self.algorithm,
            self.password,
            iterations,
            &salt,
        ));
        let without_proof = message::client_final_without_proof(&self.channel_binding, nonce);
        let auth_message: [&[u8]; 5] = [
            self.client_first_bare.as_bytes(),
            b",",
            server_first.as_bytes(),
            b",",
            without_proof.as_bytes(),
        ];
        let (client_proof, server_signature) =
            find_proofs(self.algorithm, &salted_password, &auth_message);

        let client_final = format!("{},p={}", without_proof, base64::encode(&client_proof));
        Ok(ClientFinal {
            server_signature,
            client_final,
        })
    }
}

/// The third state of the SCRAM mechanism after the first server message was successfully
/// processed.
#[derive(Debug)]
pub struct ClientFinal {
    server_signature: Vec<u8>,
    client_final: String,
}

impl ClientFinal {
    /// Returns the next state and the final client message.
    ///
    /// Call the
    /// [`ServerFinal::handle_server_final`](struct.ServerFinal.html#method.handle_server_final)
    /// method to continue the SCRAM handshake.
    #[inline]
    pub fn client_final(self) -> (ServerFinal, String) {
        let server_final = ServerFinal {
            server_signature: self.server_signature,
        };
        (server_final, self.client_final)
    }
}

/// The final state of the SCRAM mechanism after the final client message was computed.
#[derive(Debug)]
pub struct ServerFinal {
    server_signature: Vec<u8>,
}

impl ServerFinal {
    /// Processes the final answer from the server and returns the authentication result.
    ///
    /// # Return value
    ///
    /// * A value of `Ok(())` signals a successful authentication attempt.
    /// * A value of `Err(Error::MalformedMessage(_))` means that the authentication request
    /// failed.
    /// * A value of `Err(Error::InvalidServer)` or `Err(Error::ServerRejected(_))` means that the
    /// authentication request was rejected.
    ///
    /// Detailed semantics are documented in the [`Error`](../enum.Error.html) type.
    pub fn handle_server_final(self, server_final: &str) -> Result<(), Error> {
        match ServerFinalMessage::parse(server_final)? {
            ServerFinalMessage::Verifier(verifier) => {
                if constant_time_eq(&self.server_signature, &verifier) {
                    Ok(())
                } else {
                    Err(Error::InvalidServer)
                }
            }
            ServerFinalMessage::Error(error) => Err(Error::ServerRejected(error.to_string())),
        }
    }
}
