//! TLS adaptation layer.
//!
//! Wraps a rustls session around a raw descriptor and translates session
//! state into the readiness flags the socket state machine works with:
//! a handshake (initial or post-handshake traffic) that needs to flush
//! records maps to write interest, everything else to read interest. Record
//! I/O returns `WouldBlock` whenever the session needs another readiness
//! cycle, and the state machine keeps re-entering the adapter until the
//! condition clears.
//!
//! Without the `tls` cargo feature this module is the null backend: the
//! types are uninhabited and every entry point fails at creation time, so
//! plain sockets carry no TLS overhead at all.

use std::io;

/// One driver-level handshake step outcome.
#[derive(Debug)]
pub(crate) enum HsStatus {
    Done,
    WantRead,
    WantWrite,
    Failed(io::Error),
}

#[cfg(feature = "tls")]
pub use self::enabled::TlsClientOptions;
#[cfg(feature = "tls")]
pub(crate) use self::enabled::{
    client_session, load_server_config, server_session, ClientSetup, ServerCreds, TlsIo,
};

#[cfg(not(feature = "tls"))]
pub use self::disabled::TlsClientOptions;
#[cfg(not(feature = "tls"))]
pub(crate) use self::disabled::{
    client_session, load_server_config, server_session, ClientSetup, ServerCreds, TlsIo,
};

#[cfg(feature = "tls")]
mod enabled {
    use std::fs::File;
    use std::io::{self, BufReader, Read, Write};
    use std::path::Path;
    use std::sync::Arc;

    use log::debug;
    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{
        ClientConfig, ClientConnection, Connection, DigitallySignedStruct, RootCertStore,
        ServerConfig, ServerConnection, SignatureScheme,
    };

    use super::HsStatus;
    use crate::sys::{Fd, FdIo};

    /// Client-side trust settings for a TLS connect.
    ///
    /// By default the handshake verifies the server against the roots added
    /// here; with none added, verification fails (add roots or opt into
    /// [`danger_accept_invalid_certs`]).
    ///
    /// [`danger_accept_invalid_certs`]: TlsClientOptions::danger_accept_invalid_certs
    pub struct TlsClientOptions {
        roots: RootCertStore,
        insecure: bool,
        server_name: Option<String>,
        error: Option<String>,
    }

    impl Default for TlsClientOptions {
        fn default() -> TlsClientOptions {
            TlsClientOptions::new()
        }
    }

    impl TlsClientOptions {
        pub fn new() -> TlsClientOptions {
            TlsClientOptions {
                roots: RootCertStore::empty(),
                insecure: false,
                server_name: None,
                error: None,
            }
        }

        /// Adds every certificate in a PEM file as a trust anchor.
        pub fn add_root_pem_file(mut self, path: impl AsRef<Path>) -> TlsClientOptions {
            let path = path.as_ref();
            let file = match File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    self.error = Some(format!("could not open {} ({})", path.display(), err));
                    return self;
                }
            };
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                match cert.and_then(|cert| {
                    self.roots
                        .add(cert)
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
                }) {
                    Ok(()) => {}
                    Err(err) => {
                        self.error =
                            Some(format!("bad certificate in {} ({})", path.display(), err));
                        return self;
                    }
                }
            }
            self
        }

        /// Skips server certificate verification entirely.
        pub fn danger_accept_invalid_certs(mut self, accept: bool) -> TlsClientOptions {
            self.insecure = accept;
            self
        }

        /// Overrides the name presented for SNI and verification; defaults
        /// to the host the connect was made to.
        pub fn server_name(mut self, name: impl Into<String>) -> TlsClientOptions {
            self.server_name = Some(name.into());
            self
        }

        pub(crate) fn build(self, default_host: &str) -> io::Result<ClientSetup> {
            if let Some(error) = self.error {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, error));
            }
            let name = self
                .server_name
                .unwrap_or_else(|| default_host.to_string());
            let server_name = ServerName::try_from(name)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
            let config = if self.insecure {
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth()
            } else {
                ClientConfig::builder()
                    .with_root_certificates(self.roots)
                    .with_no_client_auth()
            };
            Ok(ClientSetup {
                config: Arc::new(config),
                server_name,
            })
        }
    }

    /// Prepared client configuration, built at connect time so config
    /// errors surface synchronously.
    pub(crate) struct ClientSetup {
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    }

    /// Listener-side credentials, shared across accepted children.
    pub(crate) type ServerCreds = Arc<ServerConfig>;

    /// Loads a PEM certificate chain and private key for a TLS listener.
    pub(crate) fn load_server_config(certfile: &Path, keyfile: &Path) -> io::Result<ServerCreds> {
        let mut reader = BufReader::new(File::open(certfile)?);
        let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no certificates in {}", certfile.display()),
            ));
        }
        let mut reader = BufReader::new(File::open(keyfile)?);
        let key = rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no private key in {}", keyfile.display()),
            )
        })?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(Arc::new(config))
    }

    pub(crate) fn client_session(setup: &ClientSetup) -> io::Result<TlsIo> {
        let conn = ClientConnection::new(Arc::clone(&setup.config), setup.server_name.clone())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(TlsIo {
            conn: Connection::Client(conn),
        })
    }

    pub(crate) fn server_session(creds: &ServerCreds) -> io::Result<TlsIo> {
        let conn = ServerConnection::new(Arc::clone(creds))
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(TlsIo {
            conn: Connection::Server(conn),
        })
    }

    pub(crate) struct TlsIo {
        conn: Connection,
    }

    impl TlsIo {
        /// Records waiting to go out; maps to write interest in the poll
        /// mask.
        pub(crate) fn wants_write(&self) -> bool {
            self.conn.wants_write()
        }

        /// Initial handshake or post-handshake traffic in flight.
        pub(crate) fn mid_handshake(&self) -> bool {
            self.conn.is_handshaking()
        }

        /// Drives the handshake one readiness cycle further.
        pub(crate) fn handshake_step(&mut self, fd: Fd) -> HsStatus {
            let mut io = FdIo(fd);
            loop {
                while self.conn.wants_write() {
                    match self.conn.write_tls(&mut io) {
                        Ok(_) => {}
                        Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                            return HsStatus::WantWrite;
                        }
                        Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => return HsStatus::Failed(err),
                    }
                }
                if !self.conn.is_handshaking() {
                    return HsStatus::Done;
                }
                match self.conn.read_tls(&mut io) {
                    Ok(0) => {
                        return HsStatus::Failed(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed during handshake",
                        ));
                    }
                    Ok(_) => {
                        if let Err(err) = self.conn.process_new_packets() {
                            // Best effort to get the alert out before
                            // reporting.
                            let _ = self.conn.write_tls(&mut io);
                            return HsStatus::Failed(io::Error::new(
                                io::ErrorKind::InvalidData,
                                err,
                            ));
                        }
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                        return HsStatus::WantRead;
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => return HsStatus::Failed(err),
                }
            }
        }

        /// Reads plaintext. `Ok(0)` is end-of-stream, `WouldBlock` means no
        /// plaintext is available yet (possibly because the session needs a
        /// write first, which the poll mask now reflects).
        pub(crate) fn read(&mut self, fd: Fd, buf: &mut [u8]) -> io::Result<usize> {
            let mut io = FdIo(fd);
            let mut eof = false;
            loop {
                match self.conn.read_tls(&mut io) {
                    Ok(0) => eof = true,
                    Ok(_) => {
                        if let Err(err) = self.conn.process_new_packets() {
                            let _ = self.conn.write_tls(&mut io);
                            return Err(io::Error::new(io::ErrorKind::InvalidData, err));
                        }
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
                break;
            }
            // Opportunistically push out whatever the record layer queued
            // (key updates, alerts); failures resurface on the write path.
            let _ = self.flush(fd);
            match self.conn.reader().read(buf) {
                Ok(n) => Ok(n),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock && eof => Ok(0),
                Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
                Err(err) => Err(err),
            }
        }

        /// Queues plaintext and flushes as much of the record stream as the
        /// kernel accepts.
        pub(crate) fn write(&mut self, fd: Fd, buf: &[u8]) -> io::Result<usize> {
            let n = self.conn.writer().write(buf)?;
            self.flush(fd)?;
            Ok(n)
        }

        /// Flushes pending records; `Ok` with `wants_write` still set means
        /// the kernel pushed back and the poll mask keeps write interest.
        pub(crate) fn flush(&mut self, fd: Fd) -> io::Result<()> {
            let mut io = FdIo(fd);
            while self.conn.wants_write() {
                match self.conn.write_tls(&mut io) {
                    Ok(_) => {}
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        }

        /// Queues a close-notify alert and tries to get it out.
        pub(crate) fn disconnect(&mut self, fd: Fd) {
            self.conn.send_close_notify();
            if let Err(err) = self.flush(fd) {
                debug!("close notify not delivered: {}", err);
            }
        }
    }

    /// Verifier for `danger_accept_invalid_certs`: accepts anything.
    #[derive(Debug)]
    struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(not(feature = "tls"))]
mod disabled {
    use std::io;
    use std::path::Path;

    use super::HsStatus;
    use crate::sys::Fd;

    fn unavailable() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "tls support not compiled in")
    }

    /// Stub of the client trust settings; building it always fails.
    #[derive(Default)]
    pub struct TlsClientOptions;

    impl TlsClientOptions {
        pub fn new() -> TlsClientOptions {
            TlsClientOptions
        }

        pub fn add_root_pem_file(self, _path: impl AsRef<Path>) -> TlsClientOptions {
            self
        }

        pub fn danger_accept_invalid_certs(self, _accept: bool) -> TlsClientOptions {
            self
        }

        pub fn server_name(self, _name: impl Into<String>) -> TlsClientOptions {
            self
        }

        pub(crate) fn build(self, _default_host: &str) -> io::Result<ClientSetup> {
            Err(unavailable())
        }
    }

    pub(crate) enum ClientSetup {}

    pub(crate) enum ServerCreds {}

    pub(crate) fn load_server_config(
        _certfile: &Path,
        _keyfile: &Path,
    ) -> io::Result<ServerCreds> {
        Err(unavailable())
    }

    pub(crate) fn client_session(setup: &ClientSetup) -> io::Result<TlsIo> {
        match *setup {}
    }

    pub(crate) fn server_session(creds: &ServerCreds) -> io::Result<TlsIo> {
        match *creds {}
    }

    pub(crate) enum TlsIo {}

    impl TlsIo {
        pub(crate) fn wants_write(&self) -> bool {
            match *self {}
        }

        pub(crate) fn mid_handshake(&self) -> bool {
            match *self {}
        }

        pub(crate) fn handshake_step(&mut self, _fd: Fd) -> HsStatus {
            match *self {}
        }

        pub(crate) fn read(&mut self, _fd: Fd, _buf: &mut [u8]) -> io::Result<usize> {
            match *self {}
        }

        pub(crate) fn write(&mut self, _fd: Fd, _buf: &[u8]) -> io::Result<usize> {
            match *self {}
        }

        pub(crate) fn flush(&mut self, _fd: Fd) -> io::Result<()> {
            match *self {}
        }

        pub(crate) fn disconnect(&mut self, _fd: Fd) {
            match *self {}
        }
    }
}
