//! End-to-end retrieval: item page resolution and idempotent download.

use std::time::Duration;

use litscout_harvester::{
    CandidateArticle, Downloader, Fetcher, HarvesterError, Retriever, RetrievalStatus,
};
use tempfile::tempdir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

fn fetcher() -> Fetcher {
    Fetcher::new(Duration::from_secs(5)).unwrap()
}

fn pdf() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(PDF_BYTES.to_vec(), "application/pdf")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

fn candidate(link: String) -> CandidateArticle {
    CandidateArticle {
        repo_id: "R1".to_string(),
        repo_name: "RepoA".to_string(),
        query: "term1".to_string(),
        title: "Study of X".to_string(),
        link,
        collected_at: String::new(),
    }
}

#[tokio::test]
async fn test_citation_meta_scenario() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/handle/1/1"))
        .respond_with(html(
            r#"<html><head><meta name="citation_pdf_url" content="/files/x.pdf"></head><body></body></html>"#,
        ))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/x.pdf"))
        .respond_with(pdf())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let retriever = Retriever::from_fetcher(fetcher(), dir.path());
    let c = candidate(format!("{}/handle/1/1", server.uri()));

    let target = retriever.resolve(&c).await;
    assert_eq!(
        target.resolution,
        litscout_harvester::Resolution::Resolved(
            Url::parse(&format!("{}/files/x.pdf", server.uri())).unwrap()
        )
    );

    let outcome = retriever.retrieve(&c).await;
    assert_eq!(outcome.status, RetrievalStatus::Success);
    assert_eq!(outcome.filename, "R1_Study_of_X.pdf");
    assert_eq!(outcome.error, "");
    assert_eq!(
        std::fs::read(dir.path().join("R1_Study_of_X.pdf")).unwrap(),
        PDF_BYTES
    );
}

#[tokio::test]
async fn test_rerun_makes_no_network_calls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bitstream/1/1/x.pdf"))
        .respond_with(pdf())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("sub").join("R1_Study_of_X.pdf");
    let url = Url::parse(&format!("{}/bitstream/1/1/x.pdf", server.uri())).unwrap();
    let downloader = Downloader::new(fetcher());

    let first = downloader.fetch(&url, &dest).await.unwrap();
    let content_after_first = std::fs::read(&dest).unwrap();
    let second = downloader.fetch(&url, &dest).await.unwrap();
    let content_after_second = std::fs::read(&dest).unwrap();

    assert_eq!(first, "R1_Study_of_X.pdf");
    assert_eq!(first, second);
    assert_eq!(content_after_first, content_after_second);
    // expect(1) on the mock is verified when the server drops
}

#[tokio::test]
async fn test_bitstream_anchor_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jspui/handle/1/7"))
        .respond_with(html(
            r#"<table><tr><td><a href="/jspui/bitstream/1/7/Dissertacao.pdf">View/Open</a></td></tr></table>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jspui/bitstream/1/7/Dissertacao.pdf"))
        .respond_with(pdf())
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let retriever = Retriever::from_fetcher(fetcher(), dir.path());
    let outcome = retriever
        .retrieve(&candidate(format!("{}/jspui/handle/1/7", server.uri())))
        .await;

    assert!(outcome.is_success(), "{outcome:?}");
}

#[tokio::test]
async fn test_item_page_without_pdf_is_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/handle/1/2"))
        .respond_with(html("<html><body>Restricted access</body></html>"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let retriever = Retriever::from_fetcher(fetcher(), dir.path());
    let outcome = retriever
        .retrieve(&candidate(format!("{}/handle/1/2", server.uri())))
        .await;

    assert_eq!(outcome.status, RetrievalStatus::Failed);
    assert_eq!(outcome.filename, "");
    assert!(outcome.error.contains("no PDF link found"), "{}", outcome.error);
}

#[tokio::test]
async fn test_pdf_status_error_leaves_no_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/gone.pdf"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("R1_gone.pdf");
    let url = Url::parse(&format!("{}/files/gone.pdf", server.uri())).unwrap();
    let err = Downloader::new(fetcher()).fetch(&url, &dest).await.unwrap_err();

    assert!(matches!(err, HarvesterError::Status { status: 403, .. }));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_html_answer_is_reresolved_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bitstream/1/3/landing.pdf"))
        .respond_with(html(
            r#"<meta name="citation_pdf_url" content="real.pdf">"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bitstream/1/3/real.pdf"))
        .respond_with(pdf())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("R1_landing.pdf");
    let url = Url::parse(&format!("{}/bitstream/1/3/landing.pdf", server.uri())).unwrap();
    Downloader::new(fetcher()).fetch(&url, &dest).await.unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), PDF_BYTES);
}

#[tokio::test]
async fn test_html_twice_is_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/a.pdf"))
        .respond_with(html(r#"<meta name="citation_pdf_url" content="/files/b.pdf">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/b.pdf"))
        .respond_with(html("<html>login required</html>"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("R1_a.pdf");
    let url = Url::parse(&format!("{}/files/a.pdf", server.uri())).unwrap();
    let err = Downloader::new(fetcher()).fetch(&url, &dest).await.unwrap_err();

    assert!(matches!(err, HarvesterError::UnexpectedContentType { .. }));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_oversized_download_is_discarded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files/big.pdf"))
        .respond_with(pdf())
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("R1_big.pdf");
    let url = Url::parse(&format!("{}/files/big.pdf", server.uri())).unwrap();
    let err = Downloader::new(fetcher())
        .with_max_bytes(8)
        .fetch(&url, &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, HarvesterError::ResponseTooLarge { .. }));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
