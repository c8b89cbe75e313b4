//! Downloads whose body is cut off mid-stream. wiremock always sends complete
//! bodies, so these run against a bare TCP server that lies about Content-Length.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use paper_scout::apis::arxiv::{ArxivClient, ArxivEntry, PdfDownload};
use paper_scout::references::{MainPdf, ReferenceFollower};
use paper_scout::Config;

const ONE_ENTRY_FEED: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/broken1</id>
    <title>Cut Off</title>
    <summary>Never arrives whole.</summary>
    <link href="http://arxiv.org/abs/broken1" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

fn response(content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_type,
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    raw
}

/// Promises 1000 bytes, sends 12, then closes.
fn truncated_pdf() -> Vec<u8> {
    let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n".to_vec();
    raw.extend_from_slice(b"%PDF-1.4 abc");
    raw
}

/// Serve canned raw responses, picked by request-target prefix.
async fn serve(routes: Vec<(&'static str, Vec<u8>)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request).to_string();
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let reply = routes
                    .iter()
                    .find(|(prefix, _)| target.starts_with(prefix))
                    .map(|(_, raw)| raw.clone())
                    .unwrap_or_else(|| {
                        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec()
                    });
                let _ = socket.write_all(&reply).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

fn entry(arxiv_id: &str) -> ArxivEntry {
    ArxivEntry {
        id: format!("http://arxiv.org/abs/{}", arxiv_id),
        arxiv_id: arxiv_id.to_string(),
        ..ArxivEntry::default()
    }
}

#[tokio::test]
async fn test_truncated_pdf_does_not_stop_batch() {
    let base = serve(vec![
        ("/pdf/broken1.pdf", truncated_pdf()),
        ("/pdf/good2.pdf", response("application/pdf", b"%PDF-1.4 complete")),
    ])
    .await;
    let config = Config::with_base_url(&base);
    let client = ArxivClient::new(config.http_client().unwrap(), &config);

    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("arxiv_pdfs");
    let report = client
        .download_pdfs(&[entry("broken1"), entry("good2")], &out_dir)
        .await
        .unwrap();

    assert_eq!(
        report.results,
        vec![
            PdfDownload::Failed("broken1".to_string()),
            PdfDownload::Saved(out_dir.join("good2.pdf")),
        ]
    );
    assert!(!out_dir.join("broken1.pdf").exists());
    assert_eq!(std::fs::read(out_dir.join("good2.pdf")).unwrap(), b"%PDF-1.4 complete");
}

#[tokio::test]
async fn test_truncated_main_pdf_leaves_no_file() {
    let base = serve(vec![
        ("/doi/10.1234/main", truncated_pdf()),
        ("/api/query", response("application/atom+xml", ONE_ENTRY_FEED.as_bytes())),
        ("/pdf/broken1.pdf", truncated_pdf()),
    ])
    .await;
    let follower = ReferenceFollower::new(&Config::with_base_url(&base)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let main_dir = dir.path().join("main_paper");
    let mut out = Vec::new();
    let got = follower
        .download_main_pdf("10.1234/main", "Cut Off", &main_dir, &mut out)
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(got, MainPdf::NotFound);
    assert!(text.contains("Could not download from DOI. Trying ArXiv..."));
    assert!(text.contains("Could not download PDF for broken1"));
    assert_eq!(std::fs::read_dir(&main_dir).unwrap().count(), 0);
}
