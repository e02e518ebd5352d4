//! # Salted Challenge Response Authentication Mechanism (SCRAM)
//!
//! This crate implements the SCRAM family of SASL mechanisms according to RFC5802 and RFC7677:
//! `SCRAM-SHA-1`, `SCRAM-SHA-256` and `SCRAM-SHA-512`, each also in its `-PLUS` variant with
//! `tls-unique` or `tls-server-end-point` channel binding.
//!
//! The focus is the server side. A [`ScramServer`](server/struct.ScramServer.html) checks a
//! client against a salted, iterated password hash without ever seeing the password. It talks
//! to the rest of the application through three narrow traits:
//!
//! * [`CredentialProvider`](server/trait.CredentialProvider.html) looks up the stored
//! credentials of a user,
//! * [`Authorizer`](server/trait.Authorizer.html) decides whether the authenticated user may act
//! as the requested identity,
//! * [`ChannelBindingProvider`](channel_binding/trait.ChannelBindingProvider.html) supplies the
//! binding data of the TLS session.
//!
//! A matching [`ScramClient`](client/struct.ScramClient.html) is provided as well.
//!
//! # Usage
//!
//! ``` rust
//! use std::num::NonZeroU32;
//! use sasl_scram::{Algorithm, CredentialProvider, Mechanism, PasswordInfo, ScramClient, ScramServer};
//!
//! struct Users;
//!
//! impl CredentialProvider for Users {
//!     fn get_password_for(&self, username: &str) -> Option<PasswordInfo> {
//!         // A real provider returns stored credentials instead of hashing on every lookup.
//!         match username {
//!             "user" => Some(PasswordInfo::from_password(
//!                 Algorithm::Sha256,
//!                 "pencil",
//!                 NonZeroU32::new(4096).unwrap(),
//!                 b"salt".to_vec(),
//!             )),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let mut server = ScramServer::new(Mechanism::SCRAM_SHA_256, Users);
//! let client = ScramClient::new(Algorithm::Sha256, "user", "pencil", None);
//!
//! let (client, client_first) = client.client_first();
//! let server_first = server.evaluate_response(client_first.as_bytes()).unwrap();
//!
//! let client = client
//!     .handle_server_first(std::str::from_utf8(&server_first).unwrap())
//!     .unwrap();
//! let (client, client_final) = client.client_final();
//! let server_final = server.evaluate_response(client_final.as_bytes()).unwrap();
//!
//! client
//!     .handle_server_final(std::str::from_utf8(&server_final).unwrap())
//!     .unwrap();
//! assert!(server.is_complete());
//! assert_eq!(server.authorized_identity(), Some("user"));
//! ```

pub mod channel_binding;
pub mod client;
pub mod config;
pub mod crypto;
mod error;
pub mod mechanism;
pub mod message;
pub mod server;

pub use crate::channel_binding::{BindType, ChannelBindingProvider, NoChannelBinding, TlsChannelBinding};
pub use crate::client::ScramClient;
pub use crate::config::ScramConfig;
pub use crate::crypto::{hash_password, Algorithm};
pub use crate::error::{Category, Error, Field, Kind, ServerError};
pub use crate::mechanism::Mechanism;
pub use crate::server::{
    Authorizer, CredentialProvider, PasswordInfo, SameIdentity, ScramServer, Step,
};

/// Length of the nonce part contributed by the server.
pub const SERVER_NONCE_LENGTH: usize = 20;

/// Length of the nonce part contributed by the client.
pub const CLIENT_NONCE_LENGTH: usize = 24;
