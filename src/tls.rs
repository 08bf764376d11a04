//! Opaque TLS configuration pass-through.
//!
//! The engine does not interpret certificate material; it hands everything to
//! `native-tls` when dialing a `wss://` target.

use crate::error::{FrameSockError, Result};

/// TLS settings forwarded to the transport when connecting over `wss://`.
///
/// All fields are optional; an empty config uses the platform trust store.
/// Certificates and keys are PEM bytes, except that a client certificate
/// paired with a password (and no separate key) is treated as a PKCS#12
/// archive.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Additional trusted CA certificate (PEM).
    pub ca_certificate: Option<Vec<u8>>,
    /// Client certificate (PEM), or PKCS#12 archive when `client_key` is
    /// absent and `key_password` is set.
    pub client_certificate: Option<Vec<u8>>,
    /// Client private key (PEM).
    pub client_key: Option<Vec<u8>>,
    /// Password for a PKCS#12 client archive.
    pub key_password: Option<String>,
    /// When true, hostname verification failures are tolerated instead of
    /// aborting the connection.
    pub accept_invalid_hostnames: bool,
}

impl TlsConfig {
    /// Build a `native_tls` connector from this configuration.
    pub(crate) fn connector(&self) -> Result<native_tls::TlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();

        if let Some(ca) = &self.ca_certificate {
            let cert = native_tls::Certificate::from_pem(ca)
                .map_err(|e| FrameSockError::Tls(format!("bad CA certificate: {e}")))?;
            builder.add_root_certificate(cert);
        }

        match (&self.client_certificate, &self.client_key) {
            (Some(cert), Some(key)) => {
                let identity = native_tls::Identity::from_pkcs8(cert, key)
                    .map_err(|e| FrameSockError::Tls(format!("bad client identity: {e}")))?;
                builder.identity(identity);
            }
            (Some(archive), None) => {
                let password = self.key_password.as_deref().unwrap_or("");
                let identity = native_tls::Identity::from_pkcs12(archive, password)
                    .map_err(|e| FrameSockError::Tls(format!("bad PKCS#12 archive: {e}")))?;
                builder.identity(identity);
            }
            _ => {}
        }

        if self.accept_invalid_hostnames {
            builder.danger_accept_invalid_hostnames(true);
        }

        builder
            .build()
            .map_err(|e| FrameSockError::Tls(e.to_string()))
    }
}
