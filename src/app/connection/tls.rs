// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The TLS configuration surface and its realization over rustls. The
//! handshake itself happens in the connection, before the protocol STARTUP
//! exchange.

use crate::cql::types::codec::ArgumentError;
use rustls::{
    client::{
        ServerCertVerified,
        ServerCertVerifier,
    },
    Certificate,
    ClientConfig,
    PrivateKey,
    RootCertStore,
    ServerName,
};
use std::{
    fs::File,
    io::BufReader,
    sync::Arc,
    time::SystemTime,
};
use tokio_rustls::TlsConnector;

/// Supported TLS protocol versions. Versions below 1.2 are part of the
/// configuration surface but cannot be negotiated by the rustls backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls1,
    Tls1_1,
    Tls1_2,
    Tls1_3,
}

/// TLS options of a session. When present, every connection performs a TLS
/// handshake before STARTUP.
#[derive(Clone, Debug, Default)]
pub struct SslOptions {
    /// Path to a PEM file with trusted CA certificates. When absent, the
    /// connection only succeeds with `reject_unauthorized = false`.
    pub ca_path: Option<String>,
    /// Path to a PEM file with the client certificate chain.
    pub cert_path: Option<String>,
    /// Path to a PEM file with the client private key.
    pub key_path: Option<String>,
    /// Verify the server certificate and hostname. Defaults to true.
    pub reject_unauthorized: Option<bool>,
    /// Lowest acceptable protocol version.
    pub min_version: Option<TlsVersion>,
    /// Highest acceptable protocol version.
    pub max_version: Option<TlsVersion>,
    /// The name presented for SNI and certificate verification. Required
    /// when connecting by ip address, since the rustls backend verifies DNS
    /// names only.
    pub server_name: Option<String>,
}

impl SslOptions {
    fn versions(&self) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, ArgumentError> {
        let min = self.min_version.unwrap_or(TlsVersion::Tls1_2);
        let max = self.max_version.unwrap_or(TlsVersion::Tls1_3);
        if min > max {
            return Err(ArgumentError(format!(
                "TLS min version {:?} is above max version {:?}",
                min, max
            )));
        }
        let mut versions = Vec::new();
        if min <= TlsVersion::Tls1_2 && max >= TlsVersion::Tls1_2 {
            versions.push(&rustls::version::TLS12);
        }
        if max >= TlsVersion::Tls1_3 {
            versions.push(&rustls::version::TLS13);
        }
        if versions.is_empty() {
            return Err(ArgumentError(format!(
                "No negotiable TLS version in [{:?}, {:?}]; the backend supports 1.2 and 1.3",
                min, max
            )));
        }
        Ok(versions)
    }

    /// Build the rustls connector realizing these options.
    pub fn connector(&self) -> Result<TlsConnector, ArgumentError> {
        let builder = ClientConfig::builder()
            .with_safe_default_cipher_suites()
            .with_safe_default_kx_groups()
            .with_protocol_versions(&self.versions()?)
            .map_err(|e| ArgumentError(format!("Unsupported TLS version selection: {}", e)))?;

        let mut roots = RootCertStore::empty();
        if let Some(ca_path) = &self.ca_path {
            for cert in load_certs(ca_path)? {
                roots
                    .add(&cert)
                    .map_err(|e| ArgumentError(format!("Invalid CA certificate in {}: {}", ca_path, e)))?;
            }
        }

        let builder = builder.with_root_certificates(roots);
        let mut config = match (&self.cert_path, &self.key_path) {
            (Some(cert_path), Some(key_path)) => builder
                .with_single_cert(load_certs(cert_path)?, load_private_key(key_path)?)
                .map_err(|e| ArgumentError(format!("Invalid client certificate: {}", e)))?,
            (None, None) => builder.with_no_client_auth(),
            _ => {
                return Err(ArgumentError(
                    "Client cert_path and key_path must be provided together".to_owned(),
                ))
            }
        };

        if !self.reject_unauthorized.unwrap_or(true) {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(AcceptAnyCertificate));
        }
        Ok(TlsConnector::from(Arc::new(config)))
    }

    /// The SNI name for a host: the configured override, or the host string
    /// itself when it is a DNS name.
    pub fn server_name(&self, host: &str) -> Result<ServerName, ArgumentError> {
        let name = self.server_name.as_deref().unwrap_or(host);
        ServerName::try_from(name).map_err(|e| {
            ArgumentError(format!(
                "Invalid TLS server name {:?} (set ssl_options.server_name when connecting by ip): {}",
                name, e
            ))
        })
    }
}

fn load_certs(path: &str) -> Result<Vec<Certificate>, ArgumentError> {
    let mut reader = BufReader::new(
        File::open(path).map_err(|e| ArgumentError(format!("Cannot open PEM file {}: {}", path, e)))?,
    );
    Ok(rustls_pemfile::certs(&mut reader)
        .map_err(|e| ArgumentError(format!("Cannot parse PEM file {}: {}", path, e)))?
        .into_iter()
        .map(Certificate)
        .collect())
}

fn load_private_key(path: &str) -> Result<PrivateKey, ArgumentError> {
    let mut reader = BufReader::new(
        File::open(path).map_err(|e| ArgumentError(format!("Cannot open PEM file {}: {}", path, e)))?,
    );
    rustls_pemfile::read_all(&mut reader)
        .map_err(|e| ArgumentError(format!("Cannot parse PEM file {}: {}", path, e)))?
        .into_iter()
        .find_map(|item| match item {
            rustls_pemfile::Item::RSAKey(key)
            | rustls_pemfile::Item::PKCS8Key(key)
            | rustls_pemfile::Item::ECKey(key) => Some(PrivateKey(key)),
            _ => None,
        })
        .ok_or_else(|| ArgumentError(format!("No private key found in {}", path)))
}

/// Disables certificate verification when `reject_unauthorized` is false.
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_window_is_validated() {
        let options = SslOptions {
            min_version: Some(TlsVersion::Tls1_3),
            max_version: Some(TlsVersion::Tls1_2),
            ..Default::default()
        };
        assert!(options.versions().is_err());
    }

    #[test]
    fn legacy_versions_cannot_be_negotiated() {
        let options = SslOptions {
            min_version: Some(TlsVersion::Tls1),
            max_version: Some(TlsVersion::Tls1_1),
            ..Default::default()
        };
        assert!(options.versions().is_err());
    }

    #[test]
    fn default_window_covers_both_backends() {
        let options = SslOptions::default();
        assert_eq!(options.versions().unwrap().len(), 2);
    }
}
