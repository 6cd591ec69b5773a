// Registry client tests against a minimal in-process HTTP stub.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use start_core::AssetKind;
use start_registry::{assets_add, assets_update, RegistryClient, UpdateResult};

/// Serve fixed routes over HTTP/1.1 on a background thread. Unknown paths
/// get a 404. Returns the base URL.
fn serve(routes: HashMap<String, Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let routes = Arc::new(routes);

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let routes = Arc::clone(&routes);
            std::thread::spawn(move || {
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) => return,
                        Ok(n) => {
                            request.extend_from_slice(&buf[..n]);
                            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let path = head
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();

                let response = match routes.get(&path) {
                    Some(body) => {
                        let mut r = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        r.extend_from_slice(body);
                        r
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec(),
                };
                let _ = stream.write_all(&response);
            });
        }
    });

    base
}

/// Build a gzipped tarball in memory.
fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

const ROLE_MODULE: &str = "example.com/roles/golang/code-review";

fn role_routes() -> HashMap<String, Vec<u8>> {
    let mut routes = HashMap::new();
    routes.insert(
        format!("/{ROLE_MODULE}/@v/list"),
        b"v0.1.0\nv0.2.1\nv0.2.0\nv1.0.0\n".to_vec(),
    );
    routes.insert(
        format!("/{ROLE_MODULE}/@v/v0.2.1.tar.gz"),
        tarball(&[
            (
                "role.toml",
                "[role]\ndescription = \"Go code review\"\nfile = \"@module/role.md\"\ntags = [\"golang\"]\n",
            ),
            ("role.md", "You review Go code with care."),
        ]),
    );
    routes
}

#[tokio::test]
async fn resolve_latest_picks_highest_in_major_line() {
    let base = serve(role_routes());
    let client = RegistryClient::new(base);

    let version = client
        .resolve_latest(&format!("{ROLE_MODULE}@v0"))
        .await
        .unwrap();
    assert_eq!(version, "v0.2.1");

    let version = client
        .resolve_latest(&format!("{ROLE_MODULE}@v1"))
        .await
        .unwrap();
    assert_eq!(version, "v1.0.0");
}

#[tokio::test]
async fn unknown_module_is_not_found_not_retried_forever() {
    let base = serve(HashMap::new());
    let client = RegistryClient::new(base);

    let err = client
        .resolve_latest("example.com/roles/ghost@v0")
        .await
        .unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("not found"), "{text}");
}

#[tokio::test]
async fn fetch_module_extracts_and_caches() {
    let base = serve(role_routes());
    let client = RegistryClient::new(base);
    let cache = tempfile::tempdir().unwrap();

    let dir = client
        .fetch_module(ROLE_MODULE, "v0.2.1", cache.path())
        .await
        .unwrap();
    assert!(dir.ends_with("golang/code-review@v0.2.1"));
    assert_eq!(
        std::fs::read_to_string(dir.join("role.md")).unwrap(),
        "You review Go code with care."
    );

    // Second fetch is a cache hit even if the server forgot the file.
    let client = RegistryClient::new(serve(HashMap::new()));
    let again = client
        .fetch_module(ROLE_MODULE, "v0.2.1", cache.path())
        .await
        .unwrap();
    assert_eq!(again, dir);
}

#[tokio::test]
async fn fetch_index_reads_index_toml() {
    let mut routes = HashMap::new();
    routes.insert(
        "/example.com/index/@v/list".to_string(),
        b"v0.1.0\n".to_vec(),
    );
    routes.insert(
        "/example.com/index/@v/v0.1.0.tar.gz".to_string(),
        tarball(&[(
            "index.toml",
            r#"
[[roles]]
module = "example.com/roles/golang/code-review@v0"
description = "Go code review"
tags = ["golang"]
"#,
        )]),
    );
    let client = RegistryClient::new(serve(routes));
    let cache = tempfile::tempdir().unwrap();

    let index = client
        .fetch_index("example.com/index@v0", cache.path())
        .await
        .unwrap();
    assert_eq!(index.roles.len(), 1);
    assert_eq!(index.roles[0].key(), "golang/code-review");
}

#[tokio::test]
async fn assets_add_installs_with_origin() {
    let client = RegistryClient::new(serve(role_routes()));
    let cache = tempfile::tempdir().unwrap();
    let scope = tempfile::tempdir().unwrap();

    let added = assets_add(
        &client,
        &format!("{ROLE_MODULE}@v0"),
        AssetKind::Role,
        scope.path(),
        cache.path(),
    )
    .await
    .unwrap();

    assert_eq!(added.key, "golang/code-review");
    assert_eq!(added.origin, ROLE_MODULE);
    assert_eq!(added.version, "v0.2.1");

    let items = start_config::read_scope_file(scope.path(), "roles").unwrap();
    let entry = items["golang/code-review"].as_table().unwrap();
    assert_eq!(entry["origin"].as_str().unwrap(), ROLE_MODULE);
    assert_eq!(entry["file"].as_str().unwrap(), "@module/role.md");
}

#[tokio::test]
async fn assets_update_reports_current_then_updated() {
    let client = RegistryClient::new(serve(role_routes()));
    let cache = tempfile::tempdir().unwrap();
    let scope = tempfile::tempdir().unwrap();

    // Install, then reload the scope into a typed config.
    assets_add(
        &client,
        &format!("{ROLE_MODULE}@v0"),
        AssetKind::Role,
        scope.path(),
        cache.path(),
    )
    .await
    .unwrap();
    let (raw, _) = start_config::load_dirs(&[scope.path().to_path_buf()]).unwrap();
    let config = start_core::Config::from_value(raw).unwrap();

    // Already at v0.2.1: current.
    let outcomes = assets_update(&client, &config, scope.path(), cache.path()).await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        &outcomes[0].result,
        UpdateResult::Current { version } if version == "v0.2.1"
    ));

    // The registry moves on to v0.3.0: updated.
    let mut routes = role_routes();
    routes.insert(
        format!("/{ROLE_MODULE}/@v/list"),
        b"v0.2.1\nv0.3.0\n".to_vec(),
    );
    routes.insert(
        format!("/{ROLE_MODULE}/@v/v0.3.0.tar.gz"),
        tarball(&[("role.toml", "[role]\nprompt = \"newer\"\n")]),
    );
    let client = RegistryClient::new(serve(routes));

    let outcomes = assets_update(&client, &config, scope.path(), cache.path()).await;
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].result {
        UpdateResult::Updated { from, to } => {
            assert_eq!(from.as_deref(), Some("v0.2.1"));
            assert_eq!(to, "v0.3.0");
        }
        other => panic!("expected Updated, got {other:?}"),
    }
}
