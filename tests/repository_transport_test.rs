//! Pull-merge-push behavior of the repository transport.

mod common;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{key, tactics_doc};
use fedsync::domain::ports::{PublishOutcome, RepositoryBackend};
use fedsync::infrastructure::transport::repository::{
    RepositoryMetadata, BEHAVIORS_FILE, METADATA_FILE, TACTICS_FILE,
};
use fedsync::infrastructure::transport::{GitCliBackend, RepositoryTransport, RetryPolicy};
use fedsync::{AggregateDocument, StatFamily, SyncTransport, TransportError};

type Files = HashMap<String, Vec<u8>>;

#[derive(Default)]
struct Remote {
    revision: u64,
    files: Files,
}

struct Checkout {
    base_revision: u64,
    files: Files,
}

/// Shared remote plus one local checkout, with git's reject-on-conflict push.
struct MemoryBackend {
    remote: Arc<Mutex<Remote>>,
    local: Mutex<Checkout>,
    publishes: AtomicUsize,
    /// Pushed by another writer right before our first publish.
    interloper: tokio::sync::Mutex<Option<(Arc<RepositoryTransport>, AggregateDocument)>>,
}

impl MemoryBackend {
    fn new(remote: Arc<Mutex<Remote>>) -> Self {
        Self {
            remote,
            local: Mutex::new(Checkout {
                base_revision: 0,
                files: Files::new(),
            }),
            publishes: AtomicUsize::new(0),
            interloper: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl RepositoryBackend for MemoryBackend {
    async fn ensure_checkout(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn sync_to_remote(&self) -> Result<(), TransportError> {
        let remote = self.remote.lock().unwrap();
        let mut local = self.local.lock().unwrap();
        local.files = remote.files.clone();
        local.base_revision = remote.revision;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.local.lock().unwrap().files.get(name).cloned())
    }

    async fn write_files(&self, files: &[(String, Vec<u8>)]) -> Result<(), TransportError> {
        let mut local = self.local.lock().unwrap();
        for (name, bytes) in files {
            local.files.insert(name.clone(), bytes.clone());
        }
        Ok(())
    }

    async fn publish(&self, _message: &str) -> Result<PublishOutcome, TransportError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        let interloper = self.interloper.lock().await.take();
        if let Some((transport, doc)) = interloper {
            transport.push("other", &doc).await?;
        }

        let mut remote = self.remote.lock().unwrap();
        let local = self.local.lock().unwrap();
        if local.base_revision != remote.revision {
            return Err(TransportError::Conflict("remote moved".into()));
        }
        if local.files == remote.files {
            return Ok(PublishOutcome::NothingToCommit);
        }
        remote.files = local.files.clone();
        remote.revision += 1;
        Ok(PublishOutcome::Pushed)
    }
}

fn transport(backend: Arc<MemoryBackend>) -> Arc<RepositoryTransport> {
    Arc::new(RepositoryTransport::new(backend, RetryPolicy::new(3, 1, 5)))
}

fn remote_metadata(remote: &Mutex<Remote>) -> RepositoryMetadata {
    let remote = remote.lock().unwrap();
    serde_json::from_slice(&remote.files[METADATA_FILE]).unwrap()
}

#[tokio::test]
async fn test_fetch_from_empty_repository() {
    let remote = Arc::new(Mutex::new(Remote::default()));
    let transport = transport(Arc::new(MemoryBackend::new(remote)));
    assert!(transport.fetch().await.unwrap().is_none());
}

#[tokio::test]
async fn test_push_writes_all_three_files() {
    let remote = Arc::new(Mutex::new(Remote::default()));
    let transport = transport(Arc::new(MemoryBackend::new(remote.clone())));

    let receipt = transport
        .push("me", &tactics_doc(&[("flank", "melee", 10, 7)]))
        .await
        .unwrap();
    assert_eq!(receipt.round_number, 1);
    let merged = receipt.merged.expect("repository push returns the merged document");
    assert_eq!(merged.document.total_attempts(), 10);

    {
        let remote = remote.lock().unwrap();
        for file in [TACTICS_FILE, BEHAVIORS_FILE, METADATA_FILE] {
            assert!(remote.files.contains_key(file), "missing {file}");
        }
        let tactics: serde_json::Value = serde_json::from_slice(&remote.files[TACTICS_FILE]).unwrap();
        assert!(tactics.is_array());
    }
    let metadata = remote_metadata(&remote);
    assert_eq!(metadata.revision, 1);
    assert_eq!(metadata.data_points, 10);
    assert_eq!(metadata.tactics_count, 1);

    let fetched = transport.fetch().await.unwrap().unwrap();
    assert_eq!(fetched.summary.round_number, 1);
    assert_eq!(fetched.document.tactics, merged.document.tactics);
}

#[tokio::test]
async fn test_concurrent_writer_between_pull_and_push() {
    common::setup_test_logging();
    let remote = Arc::new(Mutex::new(Remote::default()));
    let other = transport(Arc::new(MemoryBackend::new(remote.clone())));
    let backend = Arc::new(MemoryBackend::new(remote.clone()));
    *backend.interloper.lock().await = Some((other, tactics_doc(&[("flank", "melee", 5, 5)])));
    let transport = transport(backend.clone());

    let receipt = transport
        .push("me", &tactics_doc(&[("flank", "melee", 10, 2), ("kite", "ranged", 4, 4)]))
        .await
        .unwrap();

    // First publish lost the race; the whole cycle reran on fresh data
    assert_eq!(backend.publishes.load(Ordering::SeqCst), 2);
    assert_eq!(receipt.round_number, 2);

    let fetched = transport.fetch().await.unwrap().unwrap();
    let flank = &fetched.document.family(StatFamily::Tactics)[&key("flank", "melee")];
    assert_eq!(flank.total_attempts(), 15);
    assert_eq!(flank.successful_attempts(), 7);
    assert_eq!(fetched.document.total_attempts(), 19);
    assert_eq!(remote_metadata(&remote).revision, 2);
}

#[tokio::test]
async fn test_malformed_remote_is_reported() {
    let remote = Arc::new(Mutex::new(Remote::default()));
    remote
        .lock()
        .unwrap()
        .files
        .insert(TACTICS_FILE.to_string(), b"[]".to_vec());
    let transport = transport(Arc::new(MemoryBackend::new(remote.clone())));

    assert!(matches!(
        transport.fetch().await,
        Err(TransportError::Malformed(_))
    ));

    remote
        .lock()
        .unwrap()
        .files
        .insert(METADATA_FILE.to_string(), b"{not json".to_vec());
    let err = transport
        .push("me", &tactics_doc(&[("flank", "melee", 1, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Malformed(_)));
    assert!(!err.is_transient());
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_two_git_checkouts_share_one_remote() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bare = dir.path().join("shared.git");
    let status = std::process::Command::new("git")
        .args(["init", "--quiet", "--bare"])
        .arg(&bare)
        .status()
        .unwrap();
    assert!(status.success());
    let url = bare.to_string_lossy().to_string();

    let checkout = |name: &str| {
        let backend = GitCliBackend::new(url.clone(), dir.path().join(name), "main").unwrap();
        RepositoryTransport::new(Arc::new(backend), RetryPolicy::new(3, 1, 5))
    };
    let first = checkout("first");
    let second = checkout("second");

    assert!(first.fetch().await.unwrap().is_none());
    first
        .push("a", &tactics_doc(&[("flank", "melee", 8, 6)]))
        .await
        .unwrap();
    let receipt = second
        .push("b", &tactics_doc(&[("flank", "melee", 2, 2)]))
        .await
        .unwrap();
    assert_eq!(receipt.round_number, 2);

    let fetched = first.fetch().await.unwrap().unwrap();
    assert_eq!(fetched.summary.round_number, 2);
    let flank = &fetched.document.family(StatFamily::Tactics)[&key("flank", "melee")];
    assert_eq!(flank.total_attempts(), 10);
    assert_eq!(flank.successful_attempts(), 8);
}

fn init_bare_remote(dir: &std::path::Path) -> std::path::PathBuf {
    let bare = dir.join("shared.git");
    let status = std::process::Command::new("git")
        .args(["init", "--quiet", "--bare"])
        .arg(&bare)
        .status()
        .unwrap();
    assert!(status.success());
    bare
}

/// Install a pre-receive hook that refuses exactly one push.
#[cfg(unix)]
fn decline_next_push(bare: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    let hook = bare.join("hooks").join("pre-receive");
    std::fs::write(
        &hook,
        "#!/bin/sh\n\
         if [ ! -f declined-once ]; then\n\
         \ttouch declined-once\n\
         \techo 'declined for maintenance' >&2\n\
         \texit 1\n\
         fi\n\
         exit 0\n",
    )
    .unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn git_transport(url: &std::path::Path, checkout: std::path::PathBuf) -> RepositoryTransport {
    let backend = GitCliBackend::new(url.to_string_lossy().to_string(), checkout, "main").unwrap();
    RepositoryTransport::new(Arc::new(backend), RetryPolicy::new(3, 1, 5))
}

/// Read the remote through a fresh checkout so no local state leaks in.
async fn remote_flank(url: &std::path::Path, dir: &std::path::Path, name: &str) -> (u64, u64, u64) {
    let snapshot = git_transport(url, dir.join(name)).fetch().await.unwrap().unwrap();
    let flank = &snapshot.document.family(StatFamily::Tactics)[&key("flank", "melee")];
    (
        flank.total_attempts(),
        flank.successful_attempts(),
        snapshot.summary.round_number,
    )
}

#[cfg(unix)]
#[tokio::test]
async fn test_declined_first_push_to_empty_remote_counts_once() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bare = init_bare_remote(dir.path());
    decline_next_push(&bare);

    let transport = git_transport(&bare, dir.path().join("local"));
    let receipt = transport
        .push("a", &tactics_doc(&[("flank", "melee", 10, 7)]))
        .await
        .unwrap();
    assert_eq!(receipt.round_number, 1);

    assert_eq!(remote_flank(&bare, dir.path(), "reader").await, (10, 7, 1));

    let local = transport.fetch().await.unwrap().unwrap();
    assert_eq!(local.summary.round_number, 1);
    assert_eq!(local.document.total_attempts(), 10);
}

#[cfg(unix)]
#[tokio::test]
async fn test_declined_push_to_existing_branch_counts_once() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bare = init_bare_remote(dir.path());

    let first = git_transport(&bare, dir.path().join("first"));
    first
        .push("a", &tactics_doc(&[("flank", "melee", 8, 6)]))
        .await
        .unwrap();

    decline_next_push(&bare);
    let second = git_transport(&bare, dir.path().join("second"));
    let receipt = second
        .push("b", &tactics_doc(&[("flank", "melee", 5, 1)]))
        .await
        .unwrap();
    assert_eq!(receipt.round_number, 2);

    assert_eq!(remote_flank(&bare, dir.path(), "reader").await, (13, 7, 2));
}

#[cfg(unix)]
#[tokio::test]
async fn test_fetch_after_failed_first_push_sees_empty_remote() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let bare = init_bare_remote(dir.path());
    decline_next_push(&bare);

    let backend = GitCliBackend::new(
        bare.to_string_lossy().to_string(),
        dir.path().join("local"),
        "main",
    )
    .unwrap();
    let transport = RepositoryTransport::new(Arc::new(backend), RetryPolicy::none());
    let err = transport
        .push("a", &tactics_doc(&[("flank", "melee", 4, 4)]))
        .await
        .unwrap_err();
    assert!(err.is_transient());

    assert!(transport.fetch().await.unwrap().is_none());
}
