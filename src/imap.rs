//! IMAP transport and session operations
//!
//! Provides timeout-bounded wrappers around `async-imap` operations. Every
//! connection is TLS; certificate verification can only be skipped through
//! the account's explicit `ignore_cert_validation` flag.

use std::sync::Arc;
use std::time::Duration;

use async_imap::error::Error as ImapError;
use async_imap::{Client, Session};
use futures::{Stream, TryStreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::{AccountConfig, ServerConfig};
use crate::errors::{AppError, AppResult};
use crate::message::{BodySection, RawMessage};

/// Authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Live, authenticated mailbox session
///
/// Owned by the caller, who must close it with [`MailSession::logout`].
/// Selects and fetches take the session lock for their whole duration, so at
/// most one fetch is in flight per session.
pub struct MailSession {
    inner: Arc<Mutex<ImapSession>>,
}

impl MailSession {
    fn new(session: ImapSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Exclusive, owned access to the underlying session
    ///
    /// The guard can be moved into a spawned task.
    pub async fn lock(&self) -> OwnedMutexGuard<ImapSession> {
        Arc::clone(&self.inner).lock_owned().await
    }

    /// Send LOGOUT and close the connection
    ///
    /// Waits for any in-flight fetch to release the session first.
    pub async fn logout(self, server: &ServerConfig) -> AppResult<()> {
        let mut session = self.inner.lock().await;
        timeout(server.socket_timeout(), session.logout())
            .await
            .map_err(|_| AppError::Timeout("LOGOUT timed out".to_owned()))
            .and_then(|r| r.map_err(|e| AppError::Connection(format!("LOGOUT failed: {e}"))))
    }
}

/// Connect to IMAP server and authenticate
///
/// Performs full connection sequence with timeouts:
/// 1. TCP connect
/// 2. TLS handshake (webpki roots, or no verification when the account opts in)
/// 3. Read IMAP greeting
/// 4. LOGIN authentication
///
/// No retries are attempted.
///
/// # Errors
///
/// - `Connection` for TCP, TLS, or greeting failures
/// - `Timeout` if any connection phase times out
/// - `AuthFailed` if the server rejects LOGIN
pub async fn login(server: &ServerConfig, account: &AccountConfig) -> AppResult<MailSession> {
    let tcp = timeout(
        server.connect_timeout(),
        TcpStream::connect((account.host.as_str(), account.port)),
    )
    .await
    .map_err(|_| AppError::Timeout("tcp connect timeout".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Connection(format!("tcp connect failed: {e}"))))?;

    let connector = TlsConnector::from(Arc::new(tls_config(account.ignore_cert_validation)?));
    let server_name = ServerName::try_from(account.host.clone())
        .map_err(|_| AppError::InvalidInput("invalid IMAP host for TLS SNI".to_owned()))?;
    let tls_stream = timeout(server.greeting_timeout(), connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Timeout("TLS handshake timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Connection(format!("TLS handshake failed: {e}"))))?;

    let mut client = Client::new(tls_stream);
    let greeting = timeout(server.greeting_timeout(), client.read_response())
        .await
        .map_err(|_| AppError::Timeout("IMAP greeting timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Connection(format!("IMAP greeting failed: {e}"))))?;

    if greeting.is_none() {
        return Err(AppError::Connection(
            "IMAP server closed connection before greeting".to_owned(),
        ));
    }

    let pass = account.pass.expose_secret();
    let session = timeout(
        server.greeting_timeout(),
        client.login(account.user.as_str(), pass),
    )
    .await
    .map_err(|_| AppError::Timeout("IMAP login timeout".to_owned()))
    .and_then(|r| r.map_err(|(e, _)| classify_login_error(e)))?;

    info!(account = %account.account_id, host = %account.host, "IMAP session established");
    Ok(MailSession::new(session))
}

/// Map a LOGIN failure: tagged `NO`/`BAD` replies are credential rejections
fn classify_login_error(err: ImapError) -> AppError {
    match err {
        ImapError::No(msg) | ImapError::Bad(msg) => AppError::AuthFailed(msg),
        other => AppError::Connection(format!("IMAP login failed: {other}")),
    }
}

/// Build the rustls client config for one connection
fn tls_config(ignore_cert_validation: bool) -> AppResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| AppError::Internal(format!("TLS configuration failed: {e}")))?;

    if ignore_cert_validation {
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate::new(&provider)))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

/// Certificate verifier used when an account disables validation
///
/// Any certificate chain is accepted; handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCertificate {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyCertificate {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyCertificate {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Select mailbox in read-only mode
///
/// Uses `EXAMINE` so nothing in the mailbox changes. Returns the message
/// count (`EXISTS`).
pub async fn examine(
    server: &ServerConfig,
    session: &mut ImapSession,
    mailbox: &str,
) -> AppResult<u32> {
    let encoded = utf7_imap::encode_utf7_imap(mailbox.to_owned());
    let selected = timeout(server.socket_timeout(), session.examine(encoded.as_str()))
        .await
        .map_err(|_| AppError::Timeout(format!("EXAMINE timed out for mailbox '{mailbox}'")))
        .and_then(|r| {
            r.map_err(|e| AppError::MailboxSelect(format!("cannot examine mailbox '{mailbox}': {e}")))
        })?;
    debug!(mailbox, exists = selected.exists, "mailbox examined");
    Ok(selected.exists)
}

/// Start a `LIST "" *` over every mailbox
///
/// Yields decoded mailbox names in server order.
pub async fn list_names(
    io_timeout: Duration,
    session: &mut ImapSession,
) -> AppResult<impl Stream<Item = AppResult<String>> + Send + '_> {
    let stream = timeout(io_timeout, session.list(None, Some("*")))
        .await
        .map_err(|_| AppError::Timeout("LIST timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::List(format!("LIST failed: {e}"))))?;

    Ok(stream
        .map_ok(|name| utf7_imap::decode_utf7_imap(name.name().to_owned()))
        .map_err(|e| AppError::List(format!("LIST stream failed: {e}"))))
}

/// Start a sequence-number `FETCH`
///
/// Yields one [`RawMessage`] per response, in server order.
pub async fn fetch_messages<'a>(
    io_timeout: Duration,
    session: &'a mut ImapSession,
    sequence_set: &str,
    section: BodySection,
) -> AppResult<impl Stream<Item = AppResult<RawMessage>> + Send + 'a> {
    let stream = timeout(
        io_timeout,
        session.fetch(sequence_set, section.fetch_query()),
    )
    .await
    .map_err(|_| AppError::Timeout("FETCH timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Fetch(format!("FETCH failed: {e}"))))?;

    Ok(stream
        .map_ok(move |fetch| RawMessage::from_fetch(&fetch, section))
        .map_err(|e| AppError::Fetch(format!("FETCH stream failed: {e}"))))
}
