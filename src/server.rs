//! The server side of a SCRAM exchange.
//!
//! A [`ScramServer`] drives exactly one authentication attempt. Feed every client message to
//! [`evaluate_response`](struct.ScramServer.html#method.evaluate_response) and send back what it
//! returns; once [`is_complete`](struct.ScramServer.html#method.is_complete) reports `true` the
//! client is authenticated as
//! [`authorized_identity`](struct.ScramServer.html#method.authorized_identity).
//!
//! Any error ends the attempt. Map it to a client response with
//! [`message::server_error`](../message/fn.server_error.html) and drop the server.

use std::mem;
use std::num::NonZeroU32;
use std::str;

use log::{debug, warn};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::channel_binding::{self, BindType, ChannelBindingProvider, NoChannelBinding};
use crate::config::ScramConfig;
use crate::crypto::{constant_time_eq, hash_password, xor, Algorithm, CLIENT_KEY, SERVER_KEY};
use crate::error::{Error, Field};
use crate::mechanism::Mechanism;
use crate::message::{self, ClientFinal, ClientFirst};
use crate::SERVER_NONCE_LENGTH;

/// Contains information about stored passwords. In particular, it stores the password that
/// has been salted and hashed, the salt that was used, and the number of iterations of the hashing
/// algorithm.
pub struct PasswordInfo {
    salted_password: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    iterations: NonZeroU32,
}

impl PasswordInfo {
    /// Create a new `PasswordInfo` from the given information. The password is assumed to have
    /// already been hashed using the given salt and iterations.
    pub fn new(salted_password: Vec<u8>, iterations: NonZeroU32, salt: Vec<u8>) -> Self {
        PasswordInfo {
            salted_password: Zeroizing::new(salted_password),
            salt,
            iterations,
        }
    }

    /// Hashes a cleartext password. Meant for provisioning and tests; production lookups should
    /// return stored salted passwords.
    pub fn from_password(
        algorithm: Algorithm,
        password: &str,
        iterations: NonZeroU32,
        salt: Vec<u8>,
    ) -> Self {
        let salted_password = hash_password(algorithm, password, iterations, &salt);
        Self::new(salted_password, iterations, salt)
    }

    /// The salt.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// The iteration count.
    pub fn iterations(&self) -> NonZeroU32 {
        self.iterations
    }
}

/// Looks up the stored credentials of a user.
///
/// To ensure the password is hashed correctly, cleartext passwords can be hashed using
/// [`hash_password`](../crypto/fn.hash_password.html).
pub trait CredentialProvider {
    /// Gets the [`PasswordInfo`](struct.PasswordInfo.html) for the given user, or `None` if the
    /// user doesn't exist.
    fn get_password_for(&self, username: &str) -> Option<PasswordInfo>;
}

impl<'a, P: CredentialProvider + ?Sized> CredentialProvider for &'a P {
    fn get_password_for(&self, username: &str) -> Option<PasswordInfo> {
        (**self).get_password_for(username)
    }
}

/// Decides whether an authenticated user may act as another identity.
pub trait Authorizer {
    /// Checks to see if the user given by `authcid` is authorized to act as the user given by
    /// `authzid`. Returns the canonical authorized identity, or `None` to refuse.
    fn authorize(&self, authcid: &str, authzid: &str) -> Option<String>;
}

impl<'a, A: Authorizer + ?Sized> Authorizer for &'a A {
    fn authorize(&self, authcid: &str, authzid: &str) -> Option<String> {
        (**self).authorize(authcid, authzid)
    }
}

/// Allows users to act on their own behalf, and no one else's.
#[derive(Clone, Copy, Debug, Default)]
pub struct SameIdentity;

impl Authorizer for SameIdentity {
    fn authorize(&self, authcid: &str, authzid: &str) -> Option<String> {
        if authcid == authzid {
            Some(authzid.to_string())
        } else {
            None
        }
    }
}

/// The progress of an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Waiting for the client first message.
    ClientFirst,
    /// Waiting for the client final message.
    ClientFinal,
    /// The client has been authenticated.
    Finished,
    /// A previous message failed; the exchange accepts no more input.
    Aborted,
}

enum State {
    ClientFirst,
    ClientFinal(Box<Exchange>),
    Finished,
    Aborted,
}

impl State {
    fn step(&self) -> Step {
        match *self {
            State::ClientFirst => Step::ClientFirst,
            State::ClientFinal(_) => Step::ClientFinal,
            State::Finished => Step::Finished,
            State::Aborted => Step::Aborted,
        }
    }

    /// Policy changes only apply to exchanges that haven't started; an exchange in flight is
    /// aborted.
    fn reconfigured(self) -> State {
        match self {
            State::ClientFinal(_) => State::Aborted,
            state => state,
        }
    }
}

/// What the server remembers between the two client messages.
struct Exchange {
    gs2_header: String,
    bind_type: BindType,
    binding_data: Option<Vec<u8>>,
    username: String,
    authzid: String,
    client_first_bare: String,
    combined_nonce: String,
    server_first: String,
    salted_password: Zeroizing<Vec<u8>>,
    client_key: Zeroizing<Vec<u8>>,
    stored_key: Zeroizing<Vec<u8>>,
}

/// Responds to client authentication challenges.
/// The entrypoint for the SCRAM server side implementation.
pub struct ScramServer<P, A = SameIdentity, B = NoChannelBinding> {
    mechanism: Mechanism,
    config: ScramConfig,
    /// The [credential provider](trait.CredentialProvider.html) that will find passwords
    provider: P,
    authorizer: A,
    channel_binding: B,
    server_nonce: String,
    state: State,
    authorized_identity: Option<String>,
}

impl<P: CredentialProvider> ScramServer<P> {
    /// Create a new `ScramServer` for one exchange of `mechanism`.
    ///
    /// The server nonce is drawn from [`OsRng`](https://docs.rs/rand/0.8/rand/rngs/struct.OsRng.html).
    /// Users may only act as themselves and no channel binding data is available until
    /// [`with_authorizer`](#method.with_authorizer) and
    /// [`with_channel_binding`](#method.with_channel_binding) say otherwise.
    pub fn new(mechanism: Mechanism, provider: P) -> Self {
        Self::with_rng(mechanism, provider, &mut OsRng)
    }

    /// Like [`new`](#method.new), with the given source of randomness for the server nonce.
    /// Please only use a cryptographically secure random number generator!
    pub fn with_rng<R: Rng + CryptoRng>(mechanism: Mechanism, provider: P, rng: &mut R) -> Self {
        let server_nonce: String = rng
            .sample_iter(&Alphanumeric)
            .take(SERVER_NONCE_LENGTH)
            .map(char::from)
            .collect();
        Self::with_server_nonce(mechanism, provider, server_nonce)
    }

    /// Like [`new`](#method.new), with a fixed server nonce. A nonce must never be used for two
    /// exchanges; this exists to replay recorded exchanges.
    pub fn with_server_nonce<S: Into<String>>(mechanism: Mechanism, provider: P, nonce: S) -> Self {
        ScramServer {
            mechanism,
            config: ScramConfig::default(),
            provider,
            authorizer: SameIdentity,
            channel_binding: NoChannelBinding,
            server_nonce: nonce.into(),
            state: State::ClientFirst,
            authorized_identity: None,
        }
    }
}

impl<P, A, B> ScramServer<P, A, B>
where
    P: CredentialProvider,
    A: Authorizer,
    B: ChannelBindingProvider,
{
    /// Replaces the configuration.
    ///
    /// The builders are meant to be called before the first message. Called while an exchange
    /// waits for the client final message, they abort it.
    pub fn with_config(mut self, config: ScramConfig) -> Self {
        self.config = config;
        self.state = self.state.reconfigured();
        self
    }

    /// Replaces the authorization policy. Aborts an exchange in flight.
    pub fn with_authorizer<A2: Authorizer>(self, authorizer: A2) -> ScramServer<P, A2, B> {
        ScramServer {
            mechanism: self.mechanism,
            config: self.config,
            provider: self.provider,
            authorizer,
            channel_binding: self.channel_binding,
            server_nonce: self.server_nonce,
            state: self.state.reconfigured(),
            authorized_identity: self.authorized_identity,
        }
    }

    /// Sets the source of channel binding data of the underlying transport. Aborts an exchange in
    /// flight.
    pub fn with_channel_binding<B2: ChannelBindingProvider>(
        self,
        channel_binding: B2,
    ) -> ScramServer<P, A, B2> {
        ScramServer {
            mechanism: self.mechanism,
            config: self.config,
            provider: self.provider,
            authorizer: self.authorizer,
            channel_binding,
            server_nonce: self.server_nonce,
            state: self.state.reconfigured(),
            authorized_identity: self.authorized_identity,
        }
    }

    /// The mechanism of this exchange.
    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// The current step of the exchange.
    pub fn step(&self) -> Step {
        self.state.step()
    }

    /// Whether the client has been authenticated and authorized.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// The identity the client is authorized as. Only available once the exchange is complete.
    pub fn authorized_identity(&self) -> Option<&str> {
        self.authorized_identity.as_deref()
    }

    /// Handles a message sent by the client and returns the message to send back.
    ///
    /// The first call expects the client first message and returns the server first message,
    /// the second expects the client final message and returns the server final message. Any
    /// other call fails with `Error::IllegalState`. After an error the exchange is aborted and
    /// rejects all further input.
    pub fn evaluate_response(&mut self, response: &[u8]) -> Result<Vec<u8>, Error> {
        let result = match mem::replace(&mut self.state, State::Aborted) {
            State::ClientFirst => self.handle_client_first(response).map(|(exchange, reply)| {
                self.state = State::ClientFinal(Box::new(exchange));
                reply
            }),
            State::ClientFinal(exchange) => {
                self.handle_client_final(&exchange, response)
                    .map(|(identity, reply)| {
                        debug!("{}: authenticated as {}", self.mechanism, identity);
                        self.authorized_identity = Some(identity);
                        self.state = State::Finished;
                        reply
                    })
            }
            State::Finished => {
                self.state = State::Finished;
                Err(Error::IllegalState(Step::Finished))
            }
            State::Aborted => Err(Error::IllegalState(Step::Aborted)),
        };
        if let Err(ref error) = result {
            if error.is_possible_downgrade() {
                warn!("{}: {}, possible downgrade attack", self.mechanism, error);
            } else {
                debug!("{}: exchange failed: {}", self.mechanism, error);
            }
        }
        result.map(String::into_bytes)
    }

    fn handle_client_first(&self, response: &[u8]) -> Result<(Exchange, String), Error> {
        let response = str::from_utf8(response).map_err(|_| Error::invalid(Field::Encoding))?;
        let client_first = ClientFirst::parse(response)?;
        let bind_type = BindType::resolve(client_first.cbind_flag)?;
        self.mechanism
            .check_bind_type(bind_type, self.config.advertise_plus())?;

        // Resolved before the credential lookup so a stripped binding can't probe for users.
        let binding_data = channel_binding::resolve_data(&self.channel_binding, bind_type)?;

        let ClientFirst {
            gs2_header,
            authzid,
            bare,
            username,
            nonce,
            ..
        } = client_first;
        let authzid = authzid.unwrap_or_else(|| username.clone());

        let password_info = match self.provider.get_password_for(&username) {
            Some(info) if info.salted_password.is_empty() => {
                warn!("user {} exists, but the password is empty", username);
                return Err(Error::UnknownUser);
            }
            Some(info) => info,
            None => return Err(Error::UnknownUser),
        };
        if password_info.iterations < self.config.min_iterations() {
            warn!(
                "credentials of {} use {} iterations, below the minimum of {}",
                username,
                password_info.iterations,
                self.config.min_iterations()
            );
            return Err(Error::InsufficientIterations {
                actual: password_info.iterations.get(),
                minimum: self.config.min_iterations().get(),
            });
        }

        let mut combined_nonce = nonce.to_string();
        combined_nonce.push_str(&self.server_nonce);

        let algorithm = self.mechanism.algorithm();
        let client_key = Zeroizing::new(algorithm.hmac(&password_info.salted_password, CLIENT_KEY));
        let stored_key = Zeroizing::new(algorithm.hash(&client_key));

        let server_first = message::server_first(
            &combined_nonce,
            &password_info.salt,
            password_info.iterations,
        );
        debug!(
            "{}: client first from {} with channel binding {}",
            self.mechanism, username, bind_type
        );

        let exchange = Exchange {
            gs2_header: gs2_header.to_string(),
            bind_type,
            binding_data,
            username,
            authzid,
            client_first_bare: bare.to_string(),
            combined_nonce,
            server_first: server_first.clone(),
            salted_password: password_info.salted_password,
            client_key,
            stored_key,
        };
        Ok((exchange, server_first))
    }

    fn handle_client_final(
        &self,
        exchange: &Exchange,
        response: &[u8],
    ) -> Result<(String, String), Error> {
        if !response.starts_with(b"c=") {
            let resent_first = str::from_utf8(response)
                .map(|first| ClientFirst::parse(first).is_ok())
                .unwrap_or(false);
            if resent_first {
                return Err(Error::IllegalState(Step::ClientFinal));
            }
        }
        let client_final = ClientFinal::parse(response)?;

        let expected = channel_binding::expected_value(
            &exchange.gs2_header,
            exchange.bind_type,
            exchange.binding_data.as_deref(),
        );
        channel_binding::verify(client_final.channel_binding, &expected)?;

        if !constant_time_eq(client_final.nonce, exchange.combined_nonce.as_bytes()) {
            return Err(Error::NonceMismatch);
        }

        let algorithm = self.mechanism.algorithm();
        let auth_message: [&[u8]; 5] = [
            exchange.client_first_bare.as_bytes(),
            b",",
            exchange.server_first.as_bytes(),
            b",",
            client_final.without_proof,
        ];
        let client_signature = Zeroizing::new(algorithm.hmac_parts(&exchange.stored_key, &auth_message));
        let client_proof = Zeroizing::new(xor(&exchange.client_key, &client_signature));
        let proof = base64::decode(client_final.proof).map_err(|_| Error::InvalidCredentials)?;
        if !constant_time_eq(&proof, &client_proof) {
            return Err(Error::InvalidCredentials);
        }

        let identity = self
            .authorizer
            .authorize(&exchange.username, &exchange.authzid)
            .ok_or_else(|| Error::NotAuthorized {
                authcid: exchange.username.clone(),
                authzid: exchange.authzid.clone(),
            })?;

        let server_key = Zeroizing::new(algorithm.hmac(&exchange.salted_password, SERVER_KEY));
        let server_signature = algorithm.hmac_parts(&server_key, &auth_message);
        Ok((identity, message::server_final(&server_signature)))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::num::NonZeroU32;

    use super::*;
    use crate::channel_binding::TlsChannelBinding;
    use crate::crypto::find_proofs;
    use crate::error::Kind;

    const CLIENT_FIRST: &[u8] = b"n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL";
    const SERVER_FIRST: &[u8] =
        b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096";
    const CLIENT_FINAL: &[u8] =
        b"c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=";
    const SERVER_FINAL: &[u8] = b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=";
    const SERVER_NONCE: &str = "3rfcNHYJY1ZVvWVs7j";

    fn iterations(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    /// Knows `user` with a password, `empty` with an empty salted password, and counts lookups.
    struct TestProvider {
        algorithm: Algorithm,
        password: &'static str,
        salt: &'static str,
        iterations: u32,
        lookups: Cell<u32>,
    }

    impl TestProvider {
        fn new(password: &'static str, salt: &'static str) -> Self {
            TestProvider {
                algorithm: Algorithm::Sha1,
                password,
                salt,
                iterations: 4096,
                lookups: Cell::new(0),
            }
        }
    }

    impl CredentialProvider for TestProvider {
        fn get_password_for(&self, username: &str) -> Option<PasswordInfo> {
            self.lookups.set(self.lookups.get() + 1);
            let salt = base64::decode(self.salt).unwrap();
            match username {
                "user" | "jenkins" => Some(PasswordInfo::from_password(
                    self.algorithm,
                    self.password,
                    iterations(self.iterations),
                    salt,
                )),
                "empty" => Some(PasswordInfo::new(Vec::new(), iterations(4096), salt)),
                _ => None,
            }
        }
    }

    struct DomainAuthorizer;

    impl Authorizer for DomainAuthorizer {
        fn authorize(&self, authcid: &str, authzid: &str) -> Option<String> {
            if authcid == authzid {
                Some(format!("{}@domain.com", authcid))
            } else {
                None
            }
        }
    }

    fn rfc_server(provider: &TestProvider) -> ScramServer<&TestProvider, DomainAuthorizer> {
        ScramServer::with_server_nonce(Mechanism::SCRAM_SHA_1, provider, SERVER_NONCE)
            .with_authorizer(DomainAuthorizer)
    }

    #[test]
    fn rfc5802_exchange() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        assert_eq!(server.step(), Step::ClientFirst);

        assert_eq!(server.evaluate_response(CLIENT_FIRST).unwrap(), SERVER_FIRST);
        assert_eq!(server.step(), Step::ClientFinal);
        assert!(!server.is_complete());
        assert!(server.authorized_identity().is_none());

        assert_eq!(server.evaluate_response(CLIENT_FINAL).unwrap(), SERVER_FINAL);
        assert!(server.is_complete());
        assert_eq!(server.authorized_identity(), Some("user@domain.com"));
    }

    #[test]
    fn rfc7677_exchange() {
        let mut provider = TestProvider::new("pencil", "W22ZaJ0SNY7soEsUEjb6gQ==");
        provider.algorithm = Algorithm::Sha256;
        let mut server = ScramServer::with_server_nonce(
            Mechanism::SCRAM_SHA_256,
            &provider,
            "%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0",
        );

        let server_first = server
            .evaluate_response(b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO")
            .unwrap();
        assert_eq!(
            server_first,
            &b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096"[..]
        );
        let server_final = server
            .evaluate_response(
                b"c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                  p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=",
            )
            .unwrap();
        assert_eq!(
            server_final,
            &b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4="[..]
        );
        assert_eq!(server.authorized_identity(), Some("user"));
    }

    #[test]
    fn recorded_sha1_exchange() {
        let provider = TestProvider::new("test", "FRzY+hc9N+LsAg==");
        let mut server =
            ScramServer::with_server_nonce(Mechanism::SCRAM_SHA_1, &provider, "eYv8DHH2O5ttq6TmWzgs");
        let server_first = server
            .evaluate_response(b"n,,n=jenkins,r=bgHwLQHBd4S++qvTB3f+4A==")
            .unwrap();
        assert_eq!(
            server_first,
            &b"r=bgHwLQHBd4S++qvTB3f+4A==eYv8DHH2O5ttq6TmWzgs,s=FRzY+hc9N+LsAg==,i=4096"[..]
        );
        let server_final = server
            .evaluate_response(
                b"c=biws,r=bgHwLQHBd4S++qvTB3f+4A==eYv8DHH2O5ttq6TmWzgs,p=INZJh9cND2xRec6AC+RbPhEWUjI=",
            )
            .unwrap();
        assert_eq!(server_final, &b"v=dSUa291HCHgLRYwPITQFz4G9EC4="[..]);
        assert_eq!(server.authorized_identity(), Some("jenkins"));
    }

    #[test]
    fn generated_server_nonce() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = ScramServer::new(Mechanism::SCRAM_SHA_1, &provider);
        assert_eq!(server.server_nonce.len(), SERVER_NONCE_LENGTH);
        assert!(server.server_nonce.bytes().all(|b| b.is_ascii_alphanumeric()));

        let other = ScramServer::new(Mechanism::SCRAM_SHA_1, &provider);
        assert_ne!(server.server_nonce, other.server_nonce);

        let server_first = String::from_utf8(server.evaluate_response(CLIENT_FIRST).unwrap()).unwrap();
        let expected_prefix = format!("r=fyko+d2lbbFgONRv9qkxdawL{},", server.server_nonce);
        assert!(server_first.starts_with(&expected_prefix));
    }

    #[test]
    fn combined_nonce_extends_client_nonce() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        for nonce in &["a", "fyko+d2lbbFgONRv9qkxdawL", "=3D~!", "0123456789abcdef0123456789"] {
            let mut server = rfc_server(&provider);
            let client_first = format!("n,,n=user,r={}", nonce);
            let server_first =
                String::from_utf8(server.evaluate_response(client_first.as_bytes()).unwrap())
                    .unwrap();
            assert!(server_first.starts_with(&format!("r={}{},", nonce, SERVER_NONCE)));
        }
    }

    #[test]
    fn finished_exchange_rejects_input() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        server.evaluate_response(CLIENT_FINAL).unwrap();

        assert_eq!(
            server.evaluate_response(CLIENT_FINAL),
            Err(Error::IllegalState(Step::Finished))
        );
        assert_eq!(
            server.evaluate_response(CLIENT_FIRST),
            Err(Error::IllegalState(Step::Finished))
        );
        assert!(server.is_complete());
        assert_eq!(server.authorized_identity(), Some("user@domain.com"));
    }

    #[test]
    fn client_first_twice_is_illegal() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        assert_eq!(
            server.evaluate_response(CLIENT_FIRST),
            Err(Error::IllegalState(Step::ClientFinal))
        );
        assert_eq!(server.step(), Step::Aborted);
        assert_eq!(
            server.evaluate_response(CLIENT_FINAL),
            Err(Error::IllegalState(Step::Aborted))
        );
        assert!(!server.is_complete());
    }

    #[test]
    fn garbage_instead_of_client_final_is_malformed() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        assert_eq!(
            server.evaluate_response(b"r=abc,p=abc"),
            Err(Error::MalformedMessage(Kind::ExpectedField(Field::ChannelBinding)))
        );
        assert_eq!(server.step(), Step::Aborted);
    }

    #[test]
    fn reconfiguring_aborts_exchange_in_flight() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        let mut server = server.with_config(ScramConfig::new().with_advertise_plus(true));
        assert_eq!(server.step(), Step::Aborted);
        assert_eq!(
            server.evaluate_response(CLIENT_FINAL),
            Err(Error::IllegalState(Step::Aborted))
        );

        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        let mut server = server.with_authorizer(SameIdentity);
        assert_eq!(
            server.evaluate_response(CLIENT_FINAL),
            Err(Error::IllegalState(Step::Aborted))
        );

        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        let server = server.with_channel_binding(TlsChannelBinding::new());
        assert_eq!(server.step(), Step::Aborted);

        // Before the first message the builders only change policy.
        let mut server = rfc_server(&provider)
            .with_config(ScramConfig::default())
            .with_channel_binding(NoChannelBinding);
        assert_eq!(server.step(), Step::ClientFirst);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        assert_eq!(server.evaluate_response(CLIENT_FINAL).unwrap(), SERVER_FINAL);
    }

    #[test]
    fn failed_proof_is_final() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        let forged = b"c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=AAAAAAAAAAAAAAAAAAAAAAAAAAA=";
        assert_eq!(server.evaluate_response(forged), Err(Error::InvalidCredentials));
        assert_eq!(
            server.evaluate_response(CLIENT_FINAL),
            Err(Error::IllegalState(Step::Aborted))
        );
        assert!(server.authorized_identity().is_none());
    }

    #[test]
    fn every_proof_bit_matters() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let proof = base64::decode("v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=").unwrap();
        for bit in 0..proof.len() * 8 {
            let mut tampered = proof.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            let client_final = format!(
                "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p={}",
                base64::encode(&tampered)
            );
            let mut server = rfc_server(&provider);
            server.evaluate_response(CLIENT_FIRST).unwrap();
            assert_eq!(
                server.evaluate_response(client_final.as_bytes()),
                Err(Error::InvalidCredentials),
                "bit {}",
                bit
            );
        }
    }

    #[test]
    fn truncated_or_undecodable_proof() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        for proof in &["v0X8v3Bz2T0CJGbJQyF0X+HI", "not base64!", "v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=AAAA"] {
            let mut server = rfc_server(&provider);
            server.evaluate_response(CLIENT_FIRST).unwrap();
            let client_final = format!(
                "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p={}",
                proof
            );
            assert_eq!(
                server.evaluate_response(client_final.as_bytes()),
                Err(Error::InvalidCredentials)
            );
        }
    }

    #[test]
    fn nonce_mismatch() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        assert_eq!(
            server.evaluate_response(
                b"c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7k,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
            ),
            Err(Error::NonceMismatch)
        );

        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        assert_eq!(
            server.evaluate_response(
                b"c=biws,r=fyko+d2lbbFgONRv9qkxdawL,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
            ),
            Err(Error::NonceMismatch)
        );
    }

    #[test]
    fn gs2_header_must_match() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        // "eSws" is "y,,"
        assert_eq!(
            server.evaluate_response(
                b"c=eSws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
            ),
            Err(Error::ChannelBindingMismatch)
        );
    }

    #[test]
    fn unknown_and_empty_users_look_alike() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        let unknown = server.evaluate_response(b"n,,n=nobody,r=abc");
        let mut server = rfc_server(&provider);
        let empty = server.evaluate_response(b"n,,n=empty,r=abc");
        assert_eq!(unknown, Err(Error::UnknownUser));
        assert_eq!(empty, Err(Error::UnknownUser));
    }

    #[test]
    fn weak_iteration_count_refused() {
        let mut provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        provider.iterations = 1;
        let mut server = rfc_server(&provider);
        assert_eq!(
            server.evaluate_response(CLIENT_FIRST),
            Err(Error::InsufficientIterations {
                actual: 1,
                minimum: 4096
            })
        );

        let mut server = rfc_server(&provider)
            .with_config(ScramConfig::new().with_min_iterations(iterations(1)));
        let server_first = server.evaluate_response(CLIENT_FIRST).unwrap();
        assert!(server_first.ends_with(b",i=1"));
    }

    #[test]
    fn authorization_refused() {
        struct Nobody;
        impl Authorizer for Nobody {
            fn authorize(&self, _authcid: &str, _authzid: &str) -> Option<String> {
                None
            }
        }
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider).with_authorizer(Nobody);
        server.evaluate_response(CLIENT_FIRST).unwrap();
        assert_eq!(
            server.evaluate_response(CLIENT_FINAL),
            Err(Error::NotAuthorized {
                authcid: "user".to_string(),
                authzid: "user".to_string(),
            })
        );
        assert!(server.authorized_identity().is_none());
    }

    #[test]
    fn authzid_is_passed_to_authorizer() {
        struct Recorder(Cell<Option<(String, String)>>);
        impl Authorizer for Recorder {
            fn authorize(&self, authcid: &str, authzid: &str) -> Option<String> {
                self.0.set(Some((authcid.to_string(), authzid.to_string())));
                None
            }
        }
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let recorder = Recorder(Cell::new(None));
        let mut server = rfc_server(&provider).with_authorizer(&recorder);
        server
            .evaluate_response(b"n,a=admin,n=user,r=fyko+d2lbbFgONRv9qkxdawL")
            .unwrap();
        let without_proof = format!(
            "c={},r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j",
            base64::encode("n,a=admin,")
        );
        let salt = base64::decode("QSXCR+Q6sek8bf92").unwrap();
        let salted_password = hash_password(Algorithm::Sha1, "pencil", iterations(4096), &salt);
        let auth_message: [&[u8]; 5] = [
            b"n=user,r=fyko+d2lbbFgONRv9qkxdawL",
            b",",
            SERVER_FIRST,
            b",",
            without_proof.as_bytes(),
        ];
        let (proof, _) = find_proofs(Algorithm::Sha1, &salted_password, &auth_message);
        let client_final = format!("{},p={}", without_proof, base64::encode(&proof));
        let result = server.evaluate_response(client_final.as_bytes());
        assert_eq!(
            recorder.0.take(),
            Some(("user".to_string(), "admin".to_string()))
        );
        assert!(matches!(result, Err(Error::NotAuthorized { .. })));
    }

    #[test]
    fn plain_mechanism_refuses_channel_binding() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        assert_eq!(
            server.evaluate_response(b"p=tls-unique,,n=bmalkow,r=SpiXKmhi57DBp5sdE5G3H3ms"),
            Err(Error::UnsupportedChannelBinding("tls-unique".to_string()))
        );
        assert_eq!(provider.lookups.get(), 0);
    }

    #[test]
    fn downgrade_to_y_detected() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server =
            rfc_server(&provider).with_config(ScramConfig::new().with_advertise_plus(true));
        assert_eq!(
            server.evaluate_response(b"y,,n=user,r=fyko+d2lbbFgONRv9qkxdawL"),
            Err(Error::ChannelBindingDowngrade)
        );

        let mut server = rfc_server(&provider);
        assert!(server
            .evaluate_response(b"y,,n=user,r=fyko+d2lbbFgONRv9qkxdawL")
            .is_ok());
    }

    #[test]
    fn unknown_binding_type() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = ScramServer::new(Mechanism::SCRAM_SHA_1_PLUS, &provider);
        assert_eq!(
            server.evaluate_response(b"p=tls-exporter,,n=user,r=abc"),
            Err(Error::UnsupportedChannelBinding("tls-exporter".to_string()))
        );
    }

    #[test]
    fn missing_binding_data_fails_before_lookup() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        for (message, bind_type) in &[
            (&b"p=tls-unique,,n=user,r=abc"[..], BindType::TlsUnique),
            (&b"p=tls-server-end-point,,n=user,r=abc"[..], BindType::TlsServerEndPoint),
        ] {
            let mut server = ScramServer::new(Mechanism::SCRAM_SHA_1_PLUS, &provider)
                .with_channel_binding(TlsChannelBinding::new());
            assert_eq!(
                server.evaluate_response(message),
                Err(Error::ChannelBindingUnavailable(*bind_type))
            );
        }
        assert_eq!(provider.lookups.get(), 0);
    }

    #[test]
    fn every_binding_bit_matters() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let binding = TlsChannelBinding::new().with_tls_unique(vec![0xde, 0xad, 0xbe, 0xef]);
        let expected = b"p=tls-unique,,\xde\xad\xbe\xef".to_vec();
        for bit in 0..expected.len() * 8 {
            let mut tampered = expected.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            let mut server =
                ScramServer::with_server_nonce(Mechanism::SCRAM_SHA_1_PLUS, &provider, SERVER_NONCE)
                    .with_channel_binding(&binding);
            server
                .evaluate_response(b"p=tls-unique,,n=user,r=fyko+d2lbbFgONRv9qkxdawL")
                .unwrap();
            let client_final = format!(
                "c={},r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=",
                base64::encode(&tampered)
            );
            assert_eq!(
                server.evaluate_response(client_final.as_bytes()),
                Err(Error::ChannelBindingMismatch),
                "bit {}",
                bit
            );
        }
    }

    #[test]
    fn malformed_messages() {
        let provider = TestProvider::new("pencil", "QSXCR+Q6sek8bf92");
        let mut server = rfc_server(&provider);
        assert_eq!(
            server.evaluate_response(b"n,,n=user,r=\xff"),
            Err(Error::MalformedMessage(Kind::InvalidField(Field::Encoding)))
        );
        let mut server = rfc_server(&provider);
        assert_eq!(
            server.evaluate_response(b"n,,n=user"),
            Err(Error::MalformedMessage(Kind::ExpectedField(Field::Nonce)))
        );
        assert_eq!(provider.lookups.get(), 0);
    }
}
