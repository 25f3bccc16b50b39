use flate2::write::GzEncoder;
use flate2::Compression;
use kelda_fetch::config::Config;
use kelda_fetch::{FetchError, Installer, Outcome, Stage};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tiny_http::{Response, Server};

const BINARY: &[u8] = b"\x7fELF kelda deployment engine";

/// Static HTTP server standing in for the release index
struct MockIndex {
    base_url: String,
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    requests: Arc<Mutex<Vec<String>>>,
    hits: Arc<AtomicUsize>,
}

impl MockIndex {
    fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("Failed to start mock server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("Mock server not on TCP")
            .port();

        let routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>> = Arc::default();
        let requests: Arc<Mutex<Vec<String>>> = Arc::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let (thread_routes, thread_requests, thread_hits) =
            (routes.clone(), requests.clone(), hits.clone());
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                thread_hits.fetch_add(1, Ordering::SeqCst);
                let path = request.url().to_string();
                thread_requests.lock().unwrap().push(path.clone());

                let (status, body) = thread_routes
                    .lock()
                    .unwrap()
                    .get(&path)
                    .cloned()
                    .unwrap_or((404, b"not found".to_vec()));

                let response = Response::from_data(body).with_status_code(status);
                request.respond(response).ok();
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            routes,
            requests,
            hits,
        }
    }

    fn serve(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.into()));
    }

    fn serve_listing(&self, path: &str, links: &[&str]) {
        let anchors: String = links
            .iter()
            .map(|l| format!("<a href=\"{l}\">{l}</a><br>\n"))
            .collect();
        self.serve(
            path,
            200,
            format!("<html><body><h1>Index of {path}</h1><pre>{anchors}</pre></body></html>"),
        );
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn release_tarball(binary: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    {
        let mut builder = tar::Builder::new(&mut encoder);
        for (name, data) in [
            ("kelda/README.md", &b"Kelda release"[..]),
            ("kelda/kelda_linux", binary),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        builder.finish().unwrap();
    }
    encoder.finish().unwrap()
}

fn write_manifest(dir: &Path, json: &str) {
    fs::write(dir.join("package.json"), json).unwrap();
}

fn installer(index: &MockIndex, root_path: &str, dir: &Path) -> Installer {
    let mut config = Config::default();
    config.release.index_url = index.url(root_path);
    Installer::new(config, dir).expect("Failed to create installer")
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_installs_best_matching_release() {
    let index = MockIndex::start();
    index.serve_listing(
        "/",
        &["dev.tar.gz", "0.6.0.tar.gz", "0.7.0.tar.gz", "0.7.2.tar.gz", "1.0.0.tar.gz"],
    );
    index.serve("/0.7.2.tar.gz", 200, release_tarball(BINARY));

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "^0.7.0"}}"#);

    let outcome = installer(&index, "/", work.path()).run().await.unwrap();

    match outcome {
        Outcome::Installed { release, path } => {
            assert_eq!(release.version.to_string(), "0.7.2");
            assert_eq!(release.url.as_str(), index.url("/0.7.2.tar.gz"));
            assert_eq!(path, work.path().join("kelda"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(fs::read(work.path().join("kelda")).unwrap(), BINARY);
    assert!(!work.path().join("kelda_linux").exists());
    assert_eq!(dir_names(work.path()), vec!["kelda", "package.json"]);
    assert_eq!(index.requested(), vec!["/", "/0.7.2.tar.gz"]);
}

#[tokio::test]
async fn test_relative_links_resolve_under_index_path() {
    let index = MockIndex::start();
    index.serve_listing("/releases/", &["0.6.0.tar.gz", "dev.tar.gz"]);
    index.serve("/releases/0.6.0.tar.gz", 200, release_tarball(BINARY));

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "0.6.0"}}"#);

    let outcome = installer(&index, "/releases/", work.path()).run().await.unwrap();
    assert!(matches!(outcome, Outcome::Installed { .. }));
    assert_eq!(index.requested(), vec!["/releases/", "/releases/0.6.0.tar.gz"]);
}

#[tokio::test]
async fn test_manifest_without_dependency_makes_no_requests() {
    let index = MockIndex::start();
    index.serve_listing("/", &["1.0.0.tar.gz"]);

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"express": "^4.0.0"}}"#);

    let outcome = installer(&index, "/", work.path()).run().await.unwrap();

    assert_eq!(
        outcome,
        Outcome::NothingToDo("package.json does not require kelda. Nothing to do.".to_string())
    );
    assert_eq!(index.hits(), 0);
    assert_eq!(dir_names(work.path()), vec!["package.json"]);
}

#[tokio::test]
async fn test_no_satisfying_version() {
    let index = MockIndex::start();
    index.serve_listing("/", &["1.0.0.tar.gz"]);

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "^2.0.0"}}"#);

    let err = installer(&index, "/", work.path()).run().await.unwrap_err();

    assert_eq!(err.stage, Stage::SelectVersion);
    match err.source {
        FetchError::NoSatisfyingVersion {
            constraint,
            available,
        } => {
            assert_eq!(constraint, "^2.0.0");
            assert_eq!(available, vec!["1.0.0"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(index.hits(), 1);
}

#[tokio::test]
async fn test_invalid_version_in_index_aborts() {
    let index = MockIndex::start();
    index.serve_listing(
        "/",
        &["dev.tar.gz", "1.0.0.tar.gz", "1.2.0.tar.gz", "not-a-version.tar.gz"],
    );

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "^1.0.0"}}"#);

    let err = installer(&index, "/", work.path()).run().await.unwrap_err();

    assert_eq!(err.stage, Stage::FetchIndex);
    assert!(
        matches!(err.source, FetchError::InvalidVersion { ref version, .. } if version == "not-a-version")
    );
    assert_eq!(index.hits(), 1);
}

#[tokio::test]
async fn test_index_server_error() {
    let index = MockIndex::start();
    index.serve("/", 500, "internal error");

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "*"}}"#);

    let err = installer(&index, "/", work.path()).run().await.unwrap_err();
    assert_eq!(err.stage, Stage::FetchIndex);
    assert!(matches!(err.source, FetchError::Network(_)));
}

#[tokio::test]
async fn test_missing_archive_is_network_error() {
    let index = MockIndex::start();
    index.serve_listing("/", &["1.0.0.tar.gz"]);

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "^1.0.0"}}"#);

    let err = installer(&index, "/", work.path()).run().await.unwrap_err();

    assert_eq!(err.stage, Stage::Install);
    assert!(matches!(err.source, FetchError::Network(_)));
    assert_eq!(dir_names(work.path()), vec!["package.json"]);
}

#[tokio::test]
async fn test_corrupt_archive_keeps_previous_install() {
    let index = MockIndex::start();
    index.serve_listing("/", &["1.0.0.tar.gz"]);
    index.serve("/1.0.0.tar.gz", 200, "<html>definitely not a tarball</html>");

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "^1.0.0"}}"#);
    fs::write(work.path().join("kelda"), "previous install").unwrap();

    let err = installer(&index, "/", work.path()).run().await.unwrap_err();

    assert_eq!(err.stage, Stage::Install);
    assert!(matches!(err.source, FetchError::Extract(_)));
    assert_eq!(
        fs::read_to_string(work.path().join("kelda")).unwrap(),
        "previous install"
    );
    assert_eq!(dir_names(work.path()), vec!["kelda", "package.json"]);
}

#[tokio::test]
async fn test_resolve_does_not_download() {
    let index = MockIndex::start();
    index.serve_listing("/", &["1.0.0.tar.gz", "1.2.0.tar.gz", "2.0.0.tar.gz"]);

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"kelda": "^1.0.0"}}"#);

    let outcome = installer(&index, "/", work.path()).resolve().await.unwrap();

    match outcome {
        Outcome::Resolved(release) => {
            assert_eq!(release.version.to_string(), "1.2.0");
            assert_eq!(release.url.as_str(), index.url("/1.2.0.tar.gz"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(index.requested(), vec!["/"]);
}

#[tokio::test]
async fn test_available_lists_index() {
    let index = MockIndex::start();
    index.serve_listing("/", &["dev.tar.gz", "0.1.0.tar.gz", "0.2.0.tar.gz"]);

    let work = TempDir::new().unwrap();
    let releases = installer(&index, "/", work.path()).available().await.unwrap();

    let versions: Vec<String> = releases.versions().map(ToString::to_string).collect();
    assert_eq!(versions, vec!["0.1.0", "0.2.0"]);
}

#[tokio::test]
async fn test_custom_install_name_and_member() {
    let index = MockIndex::start();
    index.serve_listing("/", &["1.0.0.tar.gz"]);
    index.serve("/1.0.0.tar.gz", 200, release_tarball(BINARY));

    let work = TempDir::new().unwrap();
    write_manifest(work.path(), r#"{"dependencies": {"@kelda/engine": "1.x"}}"#);

    let mut config = Config::default();
    config.release.index_url = index.url("/");
    config.release.archive_member = "release/README.md".to_string();
    config.release.install_name = "README".to_string();
    config.manifest.dependency = "@kelda/engine".to_string();

    let outcome = Installer::new(config, work.path()).unwrap().run().await.unwrap();

    assert!(matches!(outcome, Outcome::Installed { .. }));
    assert_eq!(
        fs::read_to_string(work.path().join("README")).unwrap(),
        "Kelda release"
    );
    assert_eq!(dir_names(work.path()), vec!["README", "package.json"]);
}
