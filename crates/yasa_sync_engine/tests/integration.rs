//! Integration tests: the real engine against a scripted server over TCP.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use yasa_store::{LocalStore, NewFile};
use yasa_sync_engine::{DirectoryLibrary, SyncConfig, SyncEngine, SyncError, SyncState};
use yasa_sync_protocol::{
    ChangeRecord, ContentHash, Request, Response, ServerId, Timestamp, TransferHeader, HEADER_LEN,
};

/// One step of the server's side of the conversation.
enum Step {
    /// Read one request frame.
    Recv,
    /// Send one reply frame.
    Reply(Response),
    /// Send arbitrary bytes.
    Raw(Vec<u8>),
    /// Read one raw file transfer.
    RecvFile,
    /// Stop reading for a while.
    Stall(Duration),
}

#[derive(Debug, Default)]
struct ServerLog {
    requests: Vec<Request>,
    files: Vec<(ContentHash, Vec<u8>)>,
}

fn spawn_server(script: Vec<Step>) -> (String, JoinHandle<ServerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut log = ServerLog::default();

        for step in script {
            match step {
                Step::Recv => {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    log.requests
                        .push(Request::decode(line.trim_end()).unwrap());
                }
                Step::Reply(response) => {
                    writeln!(writer, "{}", response.encode().unwrap()).unwrap();
                }
                Step::Raw(bytes) => writer.write_all(&bytes).unwrap(),
                Step::RecvFile => {
                    let mut header = [0u8; HEADER_LEN];
                    reader.read_exact(&mut header).unwrap();
                    let header = TransferHeader::decode(&header).unwrap();
                    let mut payload = vec![0u8; header.len as usize];
                    reader.read_exact(&mut payload).unwrap();
                    log.files.push((header.hash, payload));
                }
                Step::Stall(pause) => thread::sleep(pause),
            }
        }

        // Hold the connection until the client hangs up.
        let mut rest = Vec::new();
        let _ = reader.read_to_end(&mut rest);
        log
    });

    (addr, handle)
}

fn transfer(payload: &[u8]) -> Vec<u8> {
    transfer_claiming(payload, ContentHash::of_bytes(payload))
}

fn transfer_claiming(payload: &[u8], claimed: ContentHash) -> Vec<u8> {
    let mut bytes = TransferHeader::new(claimed, payload.len() as u64)
        .encode()
        .to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

struct Fixture {
    dir: TempDir,
    store: Arc<LocalStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
            store: Arc::new(LocalStore::in_memory()),
        }
    }

    fn library_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    fn engine(&self, config: SyncConfig) -> SyncEngine {
        let library = DirectoryLibrary::open(self.library_dir()).unwrap();
        let config = config.with_temp_dir(self.dir.path().join("tmp"));
        SyncEngine::new(config, Arc::clone(&self.store), Box::new(library))
    }

    fn engine_for(&self, addr: &str) -> SyncEngine {
        self.engine(SyncConfig::new(addr).with_timeout(Duration::from_secs(10)))
    }

    /// Places a file in the library as if it had been pulled earlier.
    fn held_file(&self, server_id: u64, contents: &[u8]) -> u64 {
        std::fs::create_dir_all(self.library_dir()).unwrap();
        let path = self.library_dir().join(format!("held-{server_id}.mp3"));
        std::fs::write(&path, contents).unwrap();
        self.store
            .transaction(|txn| {
                txn.insert_file(NewFile {
                    path,
                    hash: ContentHash::of_bytes(contents),
                    size: contents.len() as u64,
                    server_id: Some(ServerId(server_id)),
                })
            })
            .unwrap()
    }

    /// A file added to the library locally and not yet announced.
    fn local_file(&self, name: &str, contents: &[u8]) -> u64 {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        self.store.register_file(&path).unwrap()
    }
}

fn changes(records: Vec<ChangeRecord>) -> Step {
    Step::Reply(Response::Changes(records))
}

#[test]
fn pull_one_new_file() {
    let fixture = Fixture::new();
    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![ChangeRecord::new_file(1)]),
        Step::Recv,
        Step::Raw(transfer(b"first track")),
    ]);

    let mut engine = fixture.engine_for(&addr);
    let result = engine.sync().unwrap();
    let log = server.join().unwrap();

    assert_eq!(result.pull.pulled, 1);
    assert_eq!(engine.state(), SyncState::Synced);
    assert_eq!(
        log.requests,
        vec![
            Request::Pull {
                since: Timestamp::ZERO
            },
            Request::PullFile { id: ServerId(1) },
        ]
    );

    let record = fixture.store.file_by_server_id(ServerId(1)).unwrap();
    assert!(record.path.starts_with(fixture.library_dir()));
    assert_eq!(std::fs::read(&record.path).unwrap(), b"first track");
    assert_eq!(record.hash, ContentHash::of_bytes(b"first track"));
    assert_eq!(fixture.store.last_update(), result.last_update);

    let leftovers: Vec<_> = std::fs::read_dir(fixture.dir.path().join("tmp"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn second_sync_sends_checkpoint() {
    let fixture = Fixture::new();
    fixture.store.set_last_update(Timestamp(1_234_567)).unwrap();

    let (addr, server) = spawn_server(vec![Step::Recv, changes(vec![])]);
    fixture.engine_for(&addr).sync().unwrap();

    let log = server.join().unwrap();
    assert_eq!(
        log.requests,
        vec![Request::Pull {
            since: Timestamp(1_234_567)
        }]
    );
}

#[test]
fn duplicate_new_in_one_pull_is_skipped() {
    let fixture = Fixture::new();
    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![ChangeRecord::new_file(1), ChangeRecord::new_file(1)]),
        Step::Recv,
        Step::Raw(transfer(b"once")),
    ]);

    let result = fixture.engine_for(&addr).sync().unwrap();
    let log = server.join().unwrap();

    assert_eq!(result.pull.pulled, 1);
    assert_eq!(result.pull.skipped, 1);
    assert_eq!(log.requests.len(), 2);
    assert_eq!(fixture.store.files().len(), 1);
}

#[test]
fn delete_for_unknown_file_is_skipped() {
    let fixture = Fixture::new();
    fixture.held_file(3, b"kept");

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![ChangeRecord::deleted(9)]),
    ]);

    let result = fixture.engine_for(&addr).sync().unwrap();
    server.join().unwrap();

    assert_eq!(result.pull.skipped, 1);
    assert_eq!(result.pull.deleted, 0);
    let files = fixture.store.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].server_id, Some(ServerId(3)));
    assert!(files[0].path.exists());
}

#[test]
fn delete_then_new_for_same_id_repulls() {
    let fixture = Fixture::new();
    fixture.held_file(5, b"old version");
    let old_path = fixture.store.file_by_server_id(ServerId(5)).unwrap().path;

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![ChangeRecord::deleted(5), ChangeRecord::new_file(5)]),
        Step::Recv,
        Step::Raw(transfer(b"new version")),
    ]);

    let result = fixture.engine_for(&addr).sync().unwrap();
    let log = server.join().unwrap();

    assert_eq!(result.pull.deleted, 1);
    assert_eq!(result.pull.pulled, 1);
    assert_eq!(log.requests[1], Request::PullFile { id: ServerId(5) });
    assert!(!old_path.exists());

    let record = fixture.store.file_by_server_id(ServerId(5)).unwrap();
    assert_eq!(std::fs::read(&record.path).unwrap(), b"new version");
    assert_eq!(fixture.store.files().len(), 1);
}

#[test]
fn corrupted_transfer_is_rejected() {
    let fixture = Fixture::new();
    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![ChangeRecord::new_file(1)]),
        Step::Recv,
        Step::Raw(transfer_claiming(
            b"bytes mangled in transit",
            ContentHash::of_bytes(b"bytes as sent by server"),
        )),
    ]);

    let mut engine = fixture.engine_for(&addr);
    let err = engine.sync().unwrap_err();
    server.join().unwrap();

    match err {
        SyncError::Integrity {
            server_id,
            expected,
            actual,
        } => {
            assert_eq!(server_id, ServerId(1));
            assert_eq!(expected, ContentHash::of_bytes(b"bytes as sent by server"));
            assert_eq!(actual, ContentHash::of_bytes(b"bytes mangled in transit"));
        }
        other => panic!("expected integrity error, got {other:?}"),
    }

    assert_eq!(engine.state(), SyncState::Error);
    assert!(fixture.store.files().is_empty());
    assert_eq!(fixture.store.last_update(), Timestamp::ZERO);
    assert!(!fixture.dir.path().join("tmp").join("yasa-1.mp3").exists());
}

#[test]
fn earlier_commits_survive_a_later_failure() {
    let fixture = Fixture::new();
    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![ChangeRecord::new_file(1), ChangeRecord::new_file(2)]),
        Step::Recv,
        Step::Raw(transfer(b"good")),
        Step::Recv,
        Step::Raw(transfer_claiming(b"bad!", ContentHash::of_bytes(b"good"))),
    ]);

    let err = fixture.engine_for(&addr).sync().unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, SyncError::Integrity { .. }));
    assert!(fixture.store.file_by_server_id(ServerId(1)).is_some());
    assert!(fixture.store.file_by_server_id(ServerId(2)).is_none());
    assert_eq!(fixture.store.last_update(), Timestamp::ZERO);
}

#[test]
fn push_one_unannounced_file() {
    let fixture = Fixture::new();
    let local_id = fixture.local_file("mine.mp3", b"recorded locally");

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![]),
        Step::Recv,
        Step::Reply(Response::Assigned { id: ServerId(42) }),
        Step::RecvFile,
        Step::Reply(Response::Ack),
    ]);

    let result = fixture.engine_for(&addr).sync().unwrap();
    let log = server.join().unwrap();

    assert_eq!(result.push.pushed, 1);
    assert_eq!(log.requests[1], Request::PushNew);
    assert_eq!(
        log.files,
        vec![(
            ContentHash::of_bytes(b"recorded locally"),
            b"recorded locally".to_vec()
        )]
    );

    let record = fixture.store.file(local_id).unwrap();
    assert_eq!(record.server_id, Some(ServerId(42)));
    assert!(fixture.store.unannounced_files().is_empty());
}

#[test]
fn push_without_ack_leaves_file_unannounced() {
    let fixture = Fixture::new();
    let local_id = fixture.local_file("mine.mp3", b"recorded locally");

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![]),
        Step::Recv,
        Step::Reply(Response::Assigned { id: ServerId(42) }),
        Step::RecvFile,
        Step::Raw(b"{\"ERROR\":\"disk full\"}\n".to_vec()),
    ]);

    let err = fixture.engine_for(&addr).sync().unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, SyncError::ServerError(ref m) if m == "disk full"));
    assert!(fixture.store.file(local_id).unwrap().server_id.is_none());
}

#[test]
fn tombstone_is_purged_after_acknowledgement() {
    let fixture = Fixture::new();
    let local_id = fixture.held_file(7, b"doomed");
    fixture
        .store
        .transaction(|txn| txn.remove_local_file(local_id, Timestamp::now()))
        .unwrap();
    assert_eq!(fixture.store.deletions().len(), 1);

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![]),
        Step::Recv,
        Step::Reply(Response::Ack),
    ]);

    let result = fixture.engine_for(&addr).sync().unwrap();
    let log = server.join().unwrap();

    assert_eq!(result.push.deletions, 1);
    assert_eq!(log.requests[1], Request::PushDelete { id: ServerId(7) });
    assert!(fixture.store.deletions().is_empty());
}

#[test]
fn rejected_deletion_keeps_tombstone() {
    let fixture = Fixture::new();
    let local_id = fixture.held_file(7, b"doomed");
    fixture
        .store
        .transaction(|txn| txn.remove_local_file(local_id, Timestamp::now()))
        .unwrap();

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![]),
        Step::Recv,
        Step::Raw(b"{\"ERROR\":\"unknown file\"}\n".to_vec()),
    ]);

    let err = fixture.engine_for(&addr).sync().unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, SyncError::ServerError(_)));
    assert_eq!(fixture.store.deletions().len(), 1);
    assert_eq!(fixture.store.last_update(), Timestamp::ZERO);
}

#[test]
fn cancellation_aborts_stalled_read() {
    let fixture = Fixture::new();
    let (addr, server) = spawn_server(vec![Step::Recv]);

    let mut engine = fixture.engine(
        SyncConfig::new(addr).with_poll_interval(Duration::from_millis(20)),
    );
    let token = engine.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        token.cancel();
    });

    let err = engine.sync().unwrap_err();
    canceller.join().unwrap();
    server.join().unwrap();

    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(engine.state(), SyncState::Error);
    assert_eq!(fixture.store.last_update(), Timestamp::ZERO);
}

#[test]
fn deadline_aborts_stalled_read() {
    let fixture = Fixture::new();
    let (addr, server) = spawn_server(vec![Step::Recv]);

    let mut engine = fixture.engine(SyncConfig::new(addr).with_timeout(Duration::from_millis(200)));
    let err = engine.sync().unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, SyncError::Timeout));
    assert_eq!(fixture.store.last_update(), Timestamp::ZERO);
}

#[test]
fn deadline_aborts_stalled_upload() {
    let fixture = Fixture::new();
    // Larger than the loopback socket buffers, so the upload must block.
    let local_id = fixture.local_file("big.mp3", &vec![0x5a; 64 * 1024 * 1024]);

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![]),
        Step::Recv,
        Step::Reply(Response::Assigned { id: ServerId(1) }),
        Step::Stall(Duration::from_secs(5)),
    ]);

    let mut engine =
        fixture.engine(SyncConfig::new(addr).with_timeout(Duration::from_millis(300)));
    let started = std::time::Instant::now();
    let err = engine.sync().unwrap_err();
    let elapsed = started.elapsed();
    server.join().unwrap();

    assert!(matches!(err, SyncError::Timeout), "got {err:?}");
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
    assert!(fixture.store.file(local_id).unwrap().server_id.is_none());
}

#[test]
fn unreachable_server_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let fixture = Fixture::new();
    let mut engine = fixture.engine(
        SyncConfig::new(addr).with_connect_timeout(Duration::from_secs(1)),
    );

    let err = engine.sync().unwrap_err();
    assert!(matches!(err, SyncError::Connection(_)));
    assert_eq!(engine.state(), SyncState::Error);
}

#[test]
fn full_cycle_pulls_then_pushes() {
    let fixture = Fixture::new();
    let local_id = fixture.local_file("local.mp3", b"from this device");

    let (addr, server) = spawn_server(vec![
        Step::Recv,
        changes(vec![ChangeRecord::new_file(10)]),
        Step::Recv,
        Step::Raw(transfer(b"from the server")),
        Step::Recv,
        Step::Reply(Response::Assigned { id: ServerId(11) }),
        Step::RecvFile,
        Step::Reply(Response::Ack),
    ]);

    let mut engine = fixture.engine_for(&addr);
    let result = engine.sync().unwrap();
    let log = server.join().unwrap();

    assert_eq!(result.pull.pulled, 1);
    assert_eq!(result.push.pushed, 1);
    assert_eq!(
        log.requests,
        vec![
            Request::Pull {
                since: Timestamp::ZERO
            },
            Request::PullFile { id: ServerId(10) },
            Request::PushNew,
        ]
    );
    assert_eq!(
        fixture.store.file(local_id).unwrap().server_id,
        Some(ServerId(11))
    );
    assert_eq!(engine.stats().cycles_completed, 1);
    assert_eq!(engine.stats().files_pulled, 1);
    assert_eq!(engine.stats().files_pushed, 1);
}
