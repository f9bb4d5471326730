//! End-to-end loopback tests: a real `Acceptor` on a real TCP socket,
//! driven against the hex scenarios and testable properties.
//!
//! Mirrors the teacher workspace's `tcp_roundtrip.rs` shape (spawn a
//! listener, connect a plain client, drive the poll loop, assert on what
//! comes back over the wire) rather than exercising `Connection` directly.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kvnode_core::{RequestHandler, Store, StoreError, StoreRepository};
use kvnode_net::Acceptor;
use kvnode_proto::{Key, VectorClock, VersionedValue, WireReader, WireWriter};

#[derive(Default)]
struct MemStore {
    data: Mutex<HashMap<Vec<u8>, Vec<VersionedValue>>>,
    fail_put: bool,
}

impl Store for MemStore {
    fn get(&self, key: &Key) -> Result<Vec<VersionedValue>, StoreError> {
        Ok(self.data.lock().unwrap().get(&key.0).cloned().unwrap_or_default())
    }

    fn get_all(&self, keys: &[Key]) -> Result<Vec<(Key, Vec<VersionedValue>)>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(keys.iter().filter_map(|k| data.get(&k.0).map(|v| (k.clone(), v.clone()))).collect())
    }

    fn put(&self, key: Key, value: VersionedValue) -> Result<(), StoreError> {
        if self.fail_put {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.data.lock().unwrap().entry(key.0).or_default().push(value);
        Ok(())
    }

    fn delete(&self, key: &Key, _version: &VectorClock) -> Result<bool, StoreError> {
        Ok(self.data.lock().unwrap().remove(&key.0).is_some())
    }
}

struct OneStoreRepo(Arc<dyn Store>);

impl StoreRepository for OneStoreRepo {
    fn get(&self, name: &str, _is_routed: bool) -> Option<Arc<dyn Store>> {
        (name == "s").then(|| Arc::clone(&self.0))
    }
}

fn get_request(store: &str, key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut w = WireWriter::new(&mut buf);
    w.write_u8(0x01);
    w.write_utf(store);
    w.write_u8(0);
    w.write_key(&Key(key.to_vec()));
    buf
}

fn put_request(store: &str, key: &[u8], clock: &VectorClock, value: &[u8]) -> Vec<u8> {
    let mut clock_bytes = Vec::new();
    WireWriter::new(&mut clock_bytes).write_vector_clock(clock);
    let mut data = clock_bytes;
    data.extend_from_slice(value);

    let mut buf = Vec::new();
    let mut w = WireWriter::new(&mut buf);
    w.write_u8(0x03);
    w.write_utf(store);
    w.write_u8(0);
    w.write_key(&Key(key.to_vec()));
    w.write_blob(&data);
    buf
}

fn delete_request(store: &str, key: &[u8], clock: &VectorClock) -> Vec<u8> {
    let mut clock_bytes = Vec::new();
    WireWriter::new(&mut clock_bytes).write_vector_clock(clock);

    let mut buf = Vec::new();
    let mut w = WireWriter::new(&mut buf);
    w.write_u8(0x04);
    w.write_utf(store);
    w.write_u8(0);
    w.write_key(&Key(key.to_vec()));
    w.write_i16(clock_bytes.len() as i16);
    w.write_raw(&clock_bytes);
    buf
}

struct Harness {
    acceptor: Acceptor<OneStoreRepo>,
    client: TcpStream,
}

impl Harness {
    fn new(store: Arc<dyn Store>) -> Self {
        let handler = Arc::new(RequestHandler::new(OneStoreRepo(store)));
        let mut acceptor = Acceptor::bind("127.0.0.1:0".parse().unwrap(), handler).unwrap();
        let addr = acceptor.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while acceptor.connection_count() == 0 && Instant::now() < deadline {
            acceptor.poll_once(Some(Duration::from_millis(20))).unwrap();
        }
        assert_eq!(acceptor.connection_count(), 1, "client never got accepted");

        Self { acceptor, client }
    }

    fn send(&mut self, bytes: &[u8]) {
        self.client.write_all(bytes).unwrap();
    }

    /// Polls until at least `n` bytes have been read back from the server,
    /// or the deadline passes.
    fn recv_at_least(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while out.len() < n && Instant::now() < deadline {
            self.acceptor.poll_once(Some(Duration::from_millis(20))).unwrap();
            let mut buf = [0u8; 512];
            match self.client.read(&mut buf) {
                Ok(read) if read > 0 => out.extend_from_slice(&buf[..read]),
                _ => {}
            }
        }
        assert!(out.len() >= n, "timed out waiting for {n} bytes, got {}", out.len());
        out
    }
}

// Scenario 1: GET against an empty store returns status 0 and an empty
// versioned-value list.
#[test]
fn scenario_1_get_on_empty_store() {
    let mut h = Harness::new(Arc::new(MemStore::default()));
    h.send(&get_request("s", b"key"));
    let resp = h.recv_at_least(6);
    assert_eq!(resp, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

// Scenario 2: GET against a store name the repository doesn't recognize
// yields a nonzero status and a UTF-8 message, connection stays open.
#[test]
fn scenario_2_get_against_absent_store() {
    let mut h = Harness::new(Arc::new(MemStore::default()));
    h.send(&get_request("does-not-exist", b"key"));
    let resp = h.recv_error_response();
    let mut reader = WireReader::new(&resp);
    let status = reader.read_i16().unwrap();
    assert_ne!(status, 0);
    let message = reader.read_utf().unwrap();
    assert!(message.contains("does-not-exist"));

    // Connection must still be usable after an error response.
    h.send(&get_request("s", b"key"));
    let ok = h.recv_at_least(6);
    assert_eq!(ok, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

// Scenario 3: PUT succeeds and returns just the status word.
#[test]
fn scenario_3_put_succeeds() {
    let mut h = Harness::new(Arc::new(MemStore::default()));
    h.send(&put_request("s", b"key", &VectorClock::new(), b"ABC"));
    let resp = h.recv_at_least(2);
    assert_eq!(resp, vec![0x00, 0x00]);
}

// Scenario 4: DELETE on a key that exists returns status 0 and succeeded=1.
#[test]
fn scenario_4_delete_reports_success() {
    let store = Arc::new(MemStore::default());
    let mut h = Harness::new(Arc::clone(&store) as Arc<dyn Store>);
    h.send(&put_request("s", b"key", &VectorClock::new(), b"ABC"));
    h.recv_at_least(2);

    h.send(&delete_request("s", b"key", &VectorClock::new()));
    let resp = h.recv_at_least(3);
    assert_eq!(resp, vec![0x00, 0x00, 0x01]);
}

// Scenario 5: two GETs concatenated in one write land in one TCP segment;
// the server must frame and answer both, in order.
#[test]
fn scenario_5_two_gets_concatenated_in_one_segment() {
    let mut h = Harness::new(Arc::new(MemStore::default()));
    let mut both = get_request("s", b"one");
    both.extend_from_slice(&get_request("s", b"two"));
    h.send(&both);

    let resp = h.recv_at_least(12);
    assert_eq!(resp, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

// Scenario 6: a GET request arrives split across two writes with a gap
// between them; framing must report Incomplete then Complete without
// producing a spurious early response.
#[test]
fn scenario_6_split_read_two_readiness_events() {
    let mut h = Harness::new(Arc::new(MemStore::default()));
    let req = get_request("s", b"key");
    let (first, second) = req.split_at(req.len() - 3);

    h.send(first);
    // Give the server a couple of poll rounds; nothing should come back yet.
    for _ in 0..3 {
        h.acceptor.poll_once(Some(Duration::from_millis(20))).unwrap();
    }
    let mut probe = [0u8; 1];
    h.client.set_nonblocking(true).unwrap();
    assert!(matches!(h.client.read(&mut probe), Err(e) if e.kind() == std::io::ErrorKind::WouldBlock));

    h.send(second);
    let resp = h.recv_at_least(6);
    assert_eq!(resp, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

// Testable property 6: a store failure produces exactly one error response
// and the connection stays open for the next request.
#[test]
fn store_error_is_isolated_to_one_response() {
    let mut h = Harness::new(Arc::new(MemStore { fail_put: true, ..MemStore::default() }));
    h.send(&put_request("s", b"key", &VectorClock::new(), b"ABC"));
    let resp = h.recv_at_least(2);
    let status = i16::from_be_bytes([resp[0], resp[1]]);
    assert_ne!(status, 0);

    h.send(&get_request("s", b"other"));
    let ok = h.recv_at_least(6);
    assert_eq!(ok, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
}

impl Harness {
    /// Reads an `i16 status | i16 message_len | message` error response
    /// whose total length isn't known up front, polling until the full
    /// message has arrived.
    fn recv_error_response(&mut self) -> Vec<u8> {
        let mut have = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if have.len() >= 4 {
                let msg_len = i16::from_be_bytes([have[2], have[3]]) as usize;
                if have.len() >= 4 + msg_len {
                    return have;
                }
            }
            assert!(Instant::now() < deadline, "timed out waiting for error response");
            self.acceptor.poll_once(Some(Duration::from_millis(20))).unwrap();
            let mut buf = [0u8; 512];
            if let Ok(n) = self.client.read(&mut buf) {
                if n > 0 {
                    have.extend_from_slice(&buf[..n]);
                }
            }
        }
    }
}
