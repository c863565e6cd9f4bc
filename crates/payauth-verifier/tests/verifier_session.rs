//! Integration tests for VerificationSession.
//!
//! Drives sessions through the public API with counting collaborators.
//! Tests cover manifest download and parse failures, fail-fast ordering
//! across several web app manifests, certificate matching against a static
//! inventory, and cache reuse between sessions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use payauth_verifier::{
    AuthorizationEntry, CandidateApp, ChannelSink, Collaborators, Fingerprint, InstalledPackage,
    ManifestDownloader, ManifestParser, MemoryManifestCache, PaymentMethodId, RecordingSink,
    SessionOutcome, StaticPackageInspector, VerificationEvent, VerificationSession, VerifyError,
    VerifyResult,
};
use url::Url;

const METHOD: &str = "https://bobpay.com/pay";
const BOBPAY_MANIFEST: &str = "https://bobpay.com/app.json";
const ALICEPAY_MANIFEST: &str = "https://alicepay.com/app.json";

/// SHA-256 of the certificate bytes 01 02 03 04 05 06 07 08 09 00.
const BOBPAY_FINGERPRINT: &str =
    "9A:89:C6:8C:4C:5E:28:B8:C4:A5:56:76:73:D4:62:FF:F5:15:DB:46:11:6F:99:00:62:4D:09:C4:74:F5:93:FB";

#[derive(Default)]
struct Counters {
    method_downloads: usize,
    app_downloads: Vec<String>,
    method_parses: usize,
    app_parses: Vec<String>,
}

/// Downloader and parser that record every call.
///
/// App manifest content is its URL so the parser knows what it parses.
#[derive(Clone, Default)]
struct CountingManifests {
    app_manifests: Vec<String>,
    entries: HashMap<String, Vec<AuthorizationEntry>>,
    fail_method_download: bool,
    fail_method_parse: bool,
    fail_downloads: HashSet<String>,
    fail_parses: HashSet<String>,
    counters: Arc<Mutex<Counters>>,
}

impl CountingManifests {
    fn new(app_manifests: &[&str]) -> Self {
        Self {
            app_manifests: app_manifests.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn with_entries(mut self, url: &str, entries: Vec<AuthorizationEntry>) -> Self {
        self.entries.insert(url.to_string(), entries);
        self
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap()
    }
}

#[async_trait]
impl ManifestDownloader for CountingManifests {
    async fn download_method_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>> {
        self.counters().method_downloads += 1;
        if self.fail_method_download {
            return Err(VerifyError::NotFound {
                url: url.to_string(),
            });
        }
        Ok(b"method manifest".to_vec())
    }

    async fn download_app_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>> {
        self.counters().app_downloads.push(url.to_string());
        if self.fail_downloads.contains(url.as_str()) {
            return Err(VerifyError::NotFound {
                url: url.to_string(),
            });
        }
        Ok(url.as_str().as_bytes().to_vec())
    }
}

#[async_trait]
impl ManifestParser for CountingManifests {
    async fn parse_method_manifest(&self, _content: &[u8]) -> VerifyResult<Vec<Url>> {
        self.counters().method_parses += 1;
        if self.fail_method_parse {
            return Err(VerifyError::MalformedManifest {
                message: "not json".into(),
            });
        }
        Ok(self
            .app_manifests
            .iter()
            .map(|u| Url::parse(u).unwrap())
            .collect())
    }

    async fn parse_app_manifest(&self, content: &[u8]) -> VerifyResult<Vec<AuthorizationEntry>> {
        let url = String::from_utf8(content.to_vec()).unwrap();
        self.counters().app_parses.push(url.clone());
        if self.fail_parses.contains(&url) {
            return Err(VerifyError::MalformedManifest {
                message: "not json".into(),
            });
        }
        Ok(self.entries.get(&url).cloned().unwrap_or_default())
    }
}

fn bobpay_entry(min_version: i64) -> AuthorizationEntry {
    AuthorizationEntry {
        package_id: "com.bobpay.app".into(),
        min_version,
        fingerprints: vec![BOBPAY_FINGERPRINT.parse::<Fingerprint>().unwrap()],
    }
}

fn inventory(bobpay_version: i64) -> StaticPackageInspector {
    StaticPackageInspector::from_packages(&[
        InstalledPackage {
            package_id: "com.alicepay.app".into(),
            version_code: 10,
            certificates: vec!["ABCDEFABCDEFABCDEFAB".into()],
        },
        InstalledPackage {
            package_id: "com.bobpay.app".into(),
            version_code: bobpay_version,
            certificates: vec!["01020304050607080900".into()],
        },
    ])
    .unwrap()
}

fn candidates() -> Vec<CandidateApp> {
    vec![
        CandidateApp::new("com.alicepay.app").with_metadata("activity", "AliceActivity"),
        CandidateApp::new("com.bobpay.app").with_metadata("activity", "BobActivity"),
    ]
}

fn method() -> PaymentMethodId {
    PaymentMethodId::parse(METHOD).unwrap()
}

fn collaborators(
    manifests: &CountingManifests,
    inspector: StaticPackageInspector,
) -> Collaborators {
    Collaborators::new(
        Arc::new(manifests.clone()),
        Arc::new(manifests.clone()),
        Arc::new(MemoryManifestCache::new()),
        Arc::new(inspector),
    )
}

async fn run(manifests: &CountingManifests) -> (SessionOutcome, Vec<VerificationEvent>) {
    let sink = Arc::new(RecordingSink::new());
    let session = VerificationSession::new(
        method(),
        candidates(),
        collaborators(manifests, inventory(10)),
        sink.clone(),
    );
    let outcome = session.start().await.expect("session already started");
    (outcome, sink.events())
}

fn invalid_manifest_events(events: &[VerificationEvent]) {
    assert_eq!(events.len(), 2, "unexpected events: {:?}", events);
    assert_eq!(events[0], VerificationEvent::InvalidManifest(method()));
    assert!(events[1].is_finished());
}

#[tokio::test]
async fn test_unable_to_download_method_manifest() {
    let mut manifests = CountingManifests::new(&[BOBPAY_MANIFEST]);
    manifests.fail_method_download = true;

    let (outcome, events) = run(&manifests).await;

    assert!(matches!(
        outcome,
        SessionOutcome::InvalidManifest(VerifyError::NotFound { .. })
    ));
    invalid_manifest_events(&events);
    assert_eq!(manifests.counters().method_parses, 0);
    assert!(manifests.counters().app_downloads.is_empty());
}

#[tokio::test]
async fn test_unable_to_parse_method_manifest() {
    let mut manifests = CountingManifests::new(&[BOBPAY_MANIFEST]);
    manifests.fail_method_parse = true;

    let (_, events) = run(&manifests).await;

    invalid_manifest_events(&events);
    assert!(manifests.counters().app_downloads.is_empty());
}

#[tokio::test]
async fn test_unable_to_download_web_app_manifest() {
    let mut manifests = CountingManifests::new(&[BOBPAY_MANIFEST]);
    manifests.fail_downloads.insert(BOBPAY_MANIFEST.into());

    let (_, events) = run(&manifests).await;

    invalid_manifest_events(&events);
    assert!(manifests.counters().app_parses.is_empty());
}

#[tokio::test]
async fn test_unable_to_parse_web_app_manifest() {
    let mut manifests = CountingManifests::new(&[BOBPAY_MANIFEST]);
    manifests.fail_parses.insert(BOBPAY_MANIFEST.into());

    let (_, events) = run(&manifests).await;

    invalid_manifest_events(&events);
}

#[tokio::test]
async fn test_bobpay_allowed() {
    let manifests = CountingManifests::new(&[BOBPAY_MANIFEST])
        .with_entries(BOBPAY_MANIFEST, vec![bobpay_entry(10)]);

    let (outcome, events) = run(&manifests).await;

    let candidates = candidates();
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        VerificationEvent::InvalidApp(method(), candidates[0].clone())
    );
    assert_eq!(
        events[1],
        VerificationEvent::ValidApp(method(), candidates[1].clone())
    );
    assert!(events[2].is_finished());

    let valid: Vec<&str> = outcome
        .valid_apps()
        .into_iter()
        .map(|c| c.metadata["activity"].as_str())
        .collect();
    assert_eq!(valid, vec!["BobActivity"]);
}

#[tokio::test]
async fn test_bobpay_version_too_old() {
    let manifests = CountingManifests::new(&[BOBPAY_MANIFEST])
        .with_entries(BOBPAY_MANIFEST, vec![bobpay_entry(11)]);

    let (outcome, events) = run(&manifests).await;

    assert!(outcome.valid_apps().is_empty());
    assert_eq!(
        events[1],
        VerificationEvent::InvalidApp(method(), candidates()[1].clone())
    );
}

#[tokio::test]
async fn test_first_of_two_web_app_manifests_fails_to_download() {
    let mut manifests = CountingManifests::new(&[ALICEPAY_MANIFEST, BOBPAY_MANIFEST])
        .with_entries(BOBPAY_MANIFEST, vec![bobpay_entry(10)]);
    manifests.fail_downloads.insert(ALICEPAY_MANIFEST.into());

    let (_, events) = run(&manifests).await;

    invalid_manifest_events(&events);
    assert_eq!(manifests.counters().app_downloads, vec![ALICEPAY_MANIFEST]);
    assert!(manifests.counters().app_parses.is_empty());
}

#[tokio::test]
async fn test_first_of_two_web_app_manifests_fails_to_parse() {
    let mut manifests = CountingManifests::new(&[ALICEPAY_MANIFEST, BOBPAY_MANIFEST])
        .with_entries(BOBPAY_MANIFEST, vec![bobpay_entry(10)]);
    manifests.fail_parses.insert(ALICEPAY_MANIFEST.into());

    let (_, events) = run(&manifests).await;

    invalid_manifest_events(&events);
    assert_eq!(manifests.counters().app_downloads, vec![ALICEPAY_MANIFEST]);
    assert_eq!(manifests.counters().app_parses, vec![ALICEPAY_MANIFEST]);
}

#[tokio::test]
async fn test_failure_at_each_position_stops_downloads() {
    let urls = [
        "https://a.example/app.json",
        "https://b.example/app.json",
        "https://c.example/app.json",
    ];

    for (i, failing) in urls.iter().enumerate() {
        let mut manifests = CountingManifests::new(&urls);
        manifests.fail_downloads.insert(failing.to_string());

        let (_, events) = run(&manifests).await;

        invalid_manifest_events(&events);
        assert_eq!(manifests.counters().app_downloads.len(), i + 1);
        assert_eq!(manifests.counters().app_parses.len(), i);
    }
}

#[tokio::test]
async fn test_parse_failure_at_each_position_stops_downloads() {
    let urls = [
        "https://a.example/app.json",
        "https://b.example/app.json",
        "https://c.example/app.json",
    ];

    for (i, failing) in urls.iter().enumerate() {
        let mut manifests = CountingManifests::new(&urls);
        manifests.fail_parses.insert(failing.to_string());

        let (_, events) = run(&manifests).await;

        invalid_manifest_events(&events);
        assert_eq!(manifests.counters().app_downloads.len(), i + 1);
        assert_eq!(manifests.counters().app_parses.len(), i + 1);
        assert_eq!(manifests.counters().app_parses.last().map(String::as_str), Some(*failing));
    }
}

#[tokio::test]
async fn test_shared_cache_skips_method_manifest() {
    let manifests = CountingManifests::new(&[BOBPAY_MANIFEST])
        .with_entries(BOBPAY_MANIFEST, vec![bobpay_entry(10)]);
    let cache = Arc::new(MemoryManifestCache::new());

    for _ in 0..2 {
        let collaborators = Collaborators::new(
            Arc::new(manifests.clone()),
            Arc::new(manifests.clone()),
            cache.clone(),
            Arc::new(inventory(10)),
        );
        let (sink, mut events) = ChannelSink::new();
        let session =
            VerificationSession::new(method(), candidates(), collaborators, Arc::new(sink));

        let outcome = session.start().await.unwrap();
        assert_eq!(outcome.valid_apps().len(), 1);

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            let done = event.is_finished();
            received.push(event);
            if done {
                break;
            }
        }
        assert_eq!(received.len(), 3);
    }

    assert_eq!(manifests.counters().method_downloads, 1);
    assert_eq!(manifests.counters().app_downloads.len(), 2);
}
