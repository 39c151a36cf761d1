use autotls::{
    tls::{ClientCertificateMode, TlsAdapter, TlsAdapterOptions, TlsListener},
    AcmeConfig, CertificateFetcher, DirCache, DirectoryUrl,
};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

const PRIMARY_NAME: &str = "example.org";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Use `DirectoryUrl::LetsEncrypt` for production uses.
    let config = AcmeConfig::new(PRIMARY_NAME)
        .with_contact("foo@bar.com")
        .with_directory(DirectoryUrl::LetsEncryptStaging);

    // Issued certificates end up in `./certs/example.org.pem` and are reused across restarts.
    //
    // The first run binds port 80 to answer the HTTP-01 challenge, so the domain must resolve
    // to this machine.
    let fetcher = CertificateFetcher::initialize_acme(config, DirCache::new("certs")).await?;
    log::info!(
        "serving certificate for {}, valid until {}",
        fetcher.domain(),
        fetcher.current().not_after()
    );

    // Ask browsers for a client certificate, but don't insist.
    let options = TlsAdapterOptions::default().with_mode(ClientCertificateMode::AllowCertificate);
    let adapter = TlsAdapter::new(fetcher.resolver(), options)?;

    let listener = TlsListener::bind(([0, 0, 0, 0], 443).into(), adapter).await?;

    listener
        .serve(|mut conn, peer| async move {
            let mut buf = [0; 1024];
            if conn.read(&mut buf).await.is_err() {
                return;
            }

            let identified = conn
                .tls_feature()
                .is_some_and(|tls| tls.peer_certificate.is_some());
            let body = format!("hello {peer}, client certificate presented: {identified}\n");

            let res = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );

            if let Err(err) = conn.write_all(res.as_bytes()).await {
                log::debug!("failed to respond to {peer}: {err}");
            }
            let _ = conn.shutdown().await;
        })
        .await;

    Ok(())
}
