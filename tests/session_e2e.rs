use anyhow::Result;
use patchsync::error::LineFault;
use patchsync::log::{UpdateJournal, UpdateStatus};
use patchsync::{
    commit_local_version, load_local_version, DirectoryArchive, PatchError, UpdateOutcome,
    UpdateSession, UpdaterConfig,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the scripted server does on its single connection.
#[derive(Clone, Default)]
struct Script {
    challenges: usize,
    final_code: i32,
    versions: String,
    /// requested local version -> (incoming version, manifest text)
    manifests: HashMap<u32, (i32, String)>,
    /// download key -> body
    files: HashMap<String, Vec<u8>>,
    /// download key whose body is cut short before the server hangs up
    truncate: Option<String>,
}

#[derive(Debug, Default)]
struct Seen {
    credentials: Vec<String>,
    requests: Vec<String>,
}

async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut hdr = [0u8; 4];
    stream.read_exact(&mut hdr).await.ok()?;
    let len = i32::from_le_bytes(hdr) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.ok()?;
    Some(payload)
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> Result<()> {
    stream.write_all(&(payload.len() as i32).to_le_bytes()).await?;
    stream.write_all(payload).await?;
    Ok(())
}

async fn serve_one(listener: TcpListener, script: Script) -> Result<Seen> {
    let (mut stream, _) = listener.accept().await?;
    let mut seen = Seen::default();

    for _ in 0..script.challenges {
        write_frame(&mut stream, &511i32.to_le_bytes()).await?;
        let cred = read_frame(&mut stream).await.expect("credential frame");
        seen.credentials.push(String::from_utf8(cred)?);
    }
    write_frame(&mut stream, &script.final_code.to_le_bytes()).await?;
    if script.final_code != 202 {
        return Ok(seen);
    }

    while let Some(req) = read_frame(&mut stream).await {
        let req = String::from_utf8(req)?;
        seen.requests.push(req.clone());
        if req == "update-seek" {
            write_frame(&mut stream, script.versions.as_bytes()).await?;
        } else if let Some(rest) = req.strip_prefix("update-get:") {
            let parts: Vec<&str> = rest.split(':').collect();
            let local: u32 = parts[1].parse()?;
            let (incoming, text) = script.manifests.get(&local).expect("scripted manifest");
            stream.write_all(&incoming.to_le_bytes()).await?;
            write_frame(&mut stream, text.as_bytes()).await?;
        } else if let Some(key) = req.strip_prefix("update-download:") {
            let body = script.files.get(key).expect("scripted file");
            stream.write_all(&(body.len() as i64).to_le_bytes()).await?;
            if script.truncate.as_deref() == Some(key) {
                stream.write_all(&body[..body.len() / 2]).await?;
                return Ok(seen);
            }
            stream.write_all(body).await?;
        } else {
            anyhow::bail!("unexpected request {req}");
        }
    }
    Ok(seen)
}

async fn start(script: Script) -> Result<(String, JoinHandle<Result<Seen>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    let handle = tokio::spawn(serve_one(listener, script));
    Ok((addr, handle))
}

fn config(addr: &str, client_dir: &Path, locale: &str) -> UpdaterConfig {
    UpdaterConfig {
        server: addr.to_string(),
        locale: locale.to_string(),
        client_dir: client_dir.to_path_buf(),
        fingerprint: "fp-test".to_string(),
        buffer_size: 100,
        ..Default::default()
    }
}

fn body(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

fn accepted(versions: &str) -> Script {
    Script {
        challenges: 2,
        final_code: 202,
        versions: versions.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn segmented_update_walks_each_version() -> Result<()> {
    let client = tempfile::tempdir()?;
    commit_local_version(client.path(), 5)?;

    let mut script = accepted("us:7:eu:3");
    script.manifests.insert(
        5,
        (
            6,
            "data:us:1:aaa111:1:0:0:0:v6/\ndata:us:2:bbb222:1:0:0:0:v6/\n".to_string(),
        ),
    );
    script
        .manifests
        .insert(6, (7, "data:us:1:ccc333:1:0:0:0:v7/\n".to_string()));
    script.files.insert("usv6/aaa111".into(), body(1, 1000));
    script.files.insert("usv6/bbb222".into(), body(2, 250));
    script.files.insert("usv7/ccc333".into(), body(3, 4096));
    let (addr, server) = start(script).await?;

    let mut session = UpdateSession::new(
        config(&addr, client.path(), "us"),
        Box::new(DirectoryArchive::new()),
    )?;
    let versions = Arc::new(Mutex::new(Vec::new()));
    let max_seen = Arc::new(Mutex::new(Vec::new()));
    {
        let versions = versions.clone();
        session
            .notifier()
            .subscribe_version(move |v| versions.lock().unwrap().push(v));
        let max_seen = max_seen.clone();
        session
            .notifier()
            .subscribe_progress(move |p| max_seen.lock().unwrap().push((p.received, p.total)));
    }

    let outcome = session.run().await?;
    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            from: 5,
            to: 7,
            files: 3,
            bytes: 1000 + 250 + 4096
        }
    );
    assert_eq!(*versions.lock().unwrap(), vec![6, 7]);
    assert_eq!(load_local_version(client.path())?, 7);
    assert!(max_seen
        .lock()
        .unwrap()
        .iter()
        .all(|&(received, total)| received <= total));

    let seen = server.await??;
    assert_eq!(seen.credentials, vec!["fp-test", "fp-test"]);
    assert_eq!(
        seen.requests,
        vec![
            "update-seek",
            "update-get:True:5:us",
            "update-download:usv6/aaa111",
            "update-download:usv6/bbb222",
            "update-get:True:6:us",
            "update-download:usv7/ccc333",
        ]
    );

    // Manifests persisted, files imported, raw downloads removed
    assert!(client.path().join(".manifests/US6.tpf").exists());
    assert!(client.path().join(".manifests/US7.tpf").exists());
    assert_eq!(std::fs::read(client.path().join("content/aaa111"))?, body(1, 1000));
    assert_eq!(std::fs::read(client.path().join("content/ccc333"))?, body(3, 4096));
    assert!(!client.path().join(".patches/6/aaa111").exists());

    let journal = UpdateJournal::new(client.path()).read_log()?;
    let completed: Vec<u32> = journal
        .iter()
        .filter(|e| e.status == UpdateStatus::Completed)
        .map(|e| e.to_version)
        .collect();
    assert_eq!(completed, vec![6, 7]);
    Ok(())
}

#[tokio::test]
async fn locale_behind_local_version_is_up_to_date() -> Result<()> {
    let client = tempfile::tempdir()?;
    commit_local_version(client.path(), 5)?;
    let (addr, server) = start(accepted("us:7:eu:3")).await?;

    let mut session = UpdateSession::new(
        config(&addr, client.path(), "eu"),
        Box::new(DirectoryArchive::new()),
    )?;
    let outcome = session.run().await?;
    assert_eq!(outcome, UpdateOutcome::UpToDate { version: 5 });
    assert_eq!(load_local_version(client.path())?, 5);

    let seen = server.await??;
    assert_eq!(seen.requests, vec!["update-seek"]);
    assert!(!client.path().join(".patches").exists());
    Ok(())
}

#[tokio::test]
async fn full_mode_takes_single_jump() -> Result<()> {
    let client = tempfile::tempdir()?;
    commit_local_version(client.path(), 5)?;
    let mut script = accepted("us:9");
    script
        .manifests
        .insert(5, (9, "data:us:1:zzz:1:0:0:0:all/\n".to_string()));
    script.files.insert("usall/zzz".into(), body(9, 10));
    let (addr, server) = start(script).await?;

    let mut cfg = config(&addr, client.path(), "us");
    cfg.segmented = false;
    cfg.keep_update_files = true;
    let mut session = UpdateSession::new(cfg, Box::new(DirectoryArchive::new()))?;
    let outcome = session.run().await?;
    assert!(matches!(outcome, UpdateOutcome::Updated { from: 5, to: 9, .. }));
    assert_eq!(load_local_version(client.path())?, 9);
    assert!(client.path().join(".patches/9/zzz").exists());

    let seen = server.await??;
    assert_eq!(seen.requests[1], "update-get:False:5:us");
    Ok(())
}

#[tokio::test]
async fn interrupted_last_file_keeps_local_version() -> Result<()> {
    let client = tempfile::tempdir()?;
    commit_local_version(client.path(), 5)?;
    let mut script = accepted("us:6");
    script.manifests.insert(
        5,
        (
            6,
            "data:us:1:first:1:0:0:0:p/\ndata:us:2:last:1:0:0:0:p/\n".to_string(),
        ),
    );
    script.files.insert("usp/first".into(), body(1, 300));
    script.files.insert("usp/last".into(), body(2, 300));
    script.truncate = Some("usp/last".into());
    let (addr, server) = start(script).await?;

    let mut session = UpdateSession::new(
        config(&addr, client.path(), "us"),
        Box::new(DirectoryArchive::new()),
    )?;
    let failures = Arc::new(Mutex::new(0));
    {
        let failures = failures.clone();
        session.notifier().subscribe_status(move |s| {
            if matches!(s, patchsync::Status::Failed(_)) {
                *failures.lock().unwrap() += 1;
            }
        });
    }
    let err = session.run().await.unwrap_err();
    assert!(matches!(err, PatchError::ConnectionLost { .. }));
    assert_eq!(*failures.lock().unwrap(), 1);
    assert_eq!(load_local_version(client.path())?, 5);
    // Nothing from the failed version reached the archive
    assert!(!client.path().join("content/first").exists());
    // The partial file is left behind, shorter than declared
    let partial = std::fs::metadata(client.path().join(".patches/6/last"))?;
    assert_eq!(partial.len(), 150);

    let journal = UpdateJournal::new(client.path()).read_log()?;
    assert_eq!(journal.last().map(|e| e.status), Some(UpdateStatus::Failed));
    server.await??;
    Ok(())
}

#[tokio::test]
async fn corrupt_manifest_fails_version() -> Result<()> {
    let client = tempfile::tempdir()?;
    let mut script = accepted("us:1");
    script
        .manifests
        .insert(0, (1, "data:us:1:short:1\n".to_string()));
    let (addr, server) = start(script).await?;

    let mut session = UpdateSession::new(
        config(&addr, client.path(), "us"),
        Box::new(DirectoryArchive::new()),
    )?;
    let err = session.run().await.unwrap_err();
    assert!(matches!(
        err,
        PatchError::ManifestCorrupt {
            line: 1,
            fault: LineFault::FieldCount(5)
        }
    ));
    assert_eq!(load_local_version(client.path())?, 0);
    // Manifest was persisted before parsing
    assert!(client.path().join(".manifests/US1.tpf").exists());
    server.await??;
    Ok(())
}

#[tokio::test]
async fn denied_authentication_ends_session() -> Result<()> {
    let client = tempfile::tempdir()?;
    let script = Script {
        final_code: 403,
        ..Default::default()
    };
    let (addr, server) = start(script).await?;

    let mut session = UpdateSession::new(
        config(&addr, client.path(), "us"),
        Box::new(DirectoryArchive::new()),
    )?;
    let err = session.run().await.unwrap_err();
    assert!(matches!(err, PatchError::AuthenticationDenied { code: 403 }));
    let seen = server.await??;
    assert!(seen.credentials.is_empty());
    assert!(seen.requests.is_empty());
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_connect_failure() -> Result<()> {
    let client = tempfile::tempdir()?;
    let addr = {
        let sock = std::net::TcpListener::bind("127.0.0.1:0")?;
        let a = sock.local_addr()?.to_string();
        drop(sock);
        a
    };
    let mut session = UpdateSession::new(
        config(&addr, client.path(), "us"),
        Box::new(DirectoryArchive::new()),
    )?;
    let err = session.run().await.unwrap_err();
    assert!(matches!(err, PatchError::ConnectFailure { .. }));
    assert!(!client.path().join("patch.ver").exists());
    Ok(())
}

#[tokio::test]
async fn non_advancing_incoming_version_is_rejected() -> Result<()> {
    let client = tempfile::tempdir()?;
    commit_local_version(client.path(), 5)?;
    let mut script = accepted("us:7");
    // Server claims the next version is the one already installed
    script
        .manifests
        .insert(5, (5, "data:us:1:again:1:0:0:0:v5/\n".to_string()));
    script.files.insert("usv5/again".into(), body(5, 10));
    let (addr, server) = start(script).await?;

    let mut session = UpdateSession::new(
        config(&addr, client.path(), "us"),
        Box::new(DirectoryArchive::new()),
    )?;
    let err = session.run().await.unwrap_err();
    assert!(matches!(err, PatchError::Protocol(_)));
    assert_eq!(load_local_version(client.path())?, 5);

    let seen = server.await??;
    assert_eq!(seen.requests, vec!["update-seek", "update-get:True:5:us"]);
    assert!(!seen
        .requests
        .iter()
        .any(|r| r.starts_with("update-download:")));
    Ok(())
}
