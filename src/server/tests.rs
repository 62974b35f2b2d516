//! Tests for the connection driver and server setup.

#[cfg(test)]
mod server_tests {
    use std::collections::VecDeque;
    use std::fs::{self, Permissions};
    use std::io::{self, IoSlice, Read, Write};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use mio::Token;
    use tempfile::TempDir;

    use crate::parser::ParseState;
    use crate::server::{
        Connection, CredentialStore, Disposition, HttpServer, Interest, MemoryCredentialStore,
        Poller, RegisterOutcome, RequestHandler, Resolver, ServerConfig, StatusCode, TriggerMode,
        VerifyOutcome, EMPTY_FILE_BODY,
    };

    const INDEX: &str = "<html><body>index</body></html>";
    const WELCOME: &str = "<html><body>welcome</body></html>";
    const ERROR: &str = "<html><body>error</body></html>";
    const REGISTER_ERROR: &str = "<html><body>try again later</body></html>";

    enum ReadStep {
        Data(Vec<u8>),
        WouldBlock,
        Eof,
    }

    enum WriteStep {
        Accept(usize),
        WouldBlock,
        Fail,
    }

    // Non-blocking socket stand-in driven by scripted steps
    struct MockStream {
        reads: VecDeque<ReadStep>,
        writes: VecDeque<WriteStep>,
        written: Vec<u8>,
    }

    impl MockStream {
        fn new() -> Self {
            Self {
                reads: VecDeque::new(),
                writes: VecDeque::new(),
                written: Vec::new(),
            }
        }

        fn with_request(request: &[u8]) -> Self {
            let mut stream = Self::new();
            stream.push_data(request);
            stream
        }

        fn push_data(&mut self, data: &[u8]) {
            self.reads.push_back(ReadStep::Data(data.to_vec()));
        }

        fn written_str(&self) -> String {
            String::from_utf8_lossy(&self.written).into_owned()
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(ReadStep::Data(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.reads.push_front(ReadStep::Data(data.split_off(n)));
                    }
                    Ok(n)
                }
                Some(ReadStep::Eof) => Ok(0),
                Some(ReadStep::WouldBlock) | None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.write_vectored(&[IoSlice::new(buf)])
        }

        fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
            let mut limit = match self.writes.pop_front() {
                Some(WriteStep::Accept(limit)) => limit,
                Some(WriteStep::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
                Some(WriteStep::Fail) => return Err(io::ErrorKind::BrokenPipe.into()),
                None => usize::MAX,
            };
            let mut total = 0;
            for buf in bufs {
                let n = buf.len().min(limit);
                self.written.extend_from_slice(&buf[..n]);
                total += n;
                limit -= n;
            }
            Ok(total)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum PollerCall {
        Rearm(Interest),
        Deregister,
    }

    #[derive(Default)]
    struct RecordingPoller {
        calls: Mutex<Vec<PollerCall>>,
    }

    impl RecordingPoller {
        fn calls(&self) -> Vec<PollerCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl<S> Poller<S> for RecordingPoller {
        fn rearm(&self, _stream: &mut S, _token: Token, interest: Interest) -> io::Result<()> {
            self.calls.lock().unwrap().push(PollerCall::Rearm(interest));
            Ok(())
        }

        fn deregister(&self, _stream: &mut S) -> io::Result<()> {
            self.calls.lock().unwrap().push(PollerCall::Deregister);
            Ok(())
        }
    }

    fn write_page(root: &Path, name: &str, contents: &[u8], mode: u32) {
        let path = root.join(name);
        fs::write(&path, contents).unwrap();
        fs::set_permissions(&path, Permissions::from_mode(mode)).unwrap();
    }

    fn doc_root() -> TempDir {
        let root = tempfile::tempdir().unwrap();
        write_page(root.path(), "index.html", INDEX.as_bytes(), 0o644);
        write_page(root.path(), "welcome.html", WELCOME.as_bytes(), 0o644);
        write_page(root.path(), "error.html", ERROR.as_bytes(), 0o644);
        write_page(root.path(), "registerError.html", REGISTER_ERROR.as_bytes(), 0o644);
        write_page(root.path(), "big.txt", &vec![b'x'; 3000], 0o644);
        write_page(root.path(), "empty.html", b"", 0o644);
        write_page(root.path(), "secret.txt", b"secret", 0o600);
        fs::create_dir(root.path().join("images")).unwrap();
        root
    }

    // Store whose backend is unreachable
    struct UnavailableStore;

    impl CredentialStore for UnavailableStore {
        fn verify(&self, _username: &str, _password: &str) -> VerifyOutcome {
            VerifyOutcome::StorageError
        }

        fn register(&self, _username: &str, _password: &str) -> RegisterOutcome {
            RegisterOutcome::StorageError
        }
    }

    fn connection(
        root: &Path,
        stream: MockStream,
        mode: TriggerMode,
    ) -> (Connection<MockStream, RecordingPoller>, Arc<RecordingPoller>) {
        let store = MemoryCredentialStore::with_users([("alice", "p@ss")]);
        connection_with_store(root, stream, mode, Arc::new(store))
    }

    fn connection_with_store(
        root: &Path,
        stream: MockStream,
        mode: TriggerMode,
        store: Arc<dyn CredentialStore>,
    ) -> (Connection<MockStream, RecordingPoller>, Arc<RecordingPoller>) {
        let handler = RequestHandler::new(Resolver::new(root), store);
        let poller = Arc::new(RecordingPoller::default());
        let conn = Connection::new(stream, Token(1), Arc::clone(&poller), Arc::new(handler), mode);
        (conn, poller)
    }

    fn ok_response(body: &str, content_type: &str, connection: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: {content_type}\r\nConnection: {connection}\r\n\r\n{body}",
            body.len()
        )
    }

    fn form_post(path: &str, body: &str) -> Vec<u8> {
        format!(
            "POST {path} HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    #[test]
    fn test_keep_alive_response_resets_connection() {
        let root = doc_root();
        let stream = MockStream::with_request(b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(conn.stream().written_str(), ok_response(INDEX, "text/html", "keep-alive"));
        assert_eq!(poller.calls(), vec![PollerCall::Rearm(Interest::Read)]);
        assert_eq!(conn.parse_state(), ParseState::RequestLine);
        assert!(!conn.has_mapping());
        assert!(!conn.is_writing());
        assert_eq!(conn.bytes_to_send(), 0);
        assert_eq!(conn.read_buffer().read_idx(), 0);

        // The same socket serves a second request
        conn.stream_mut().written.clear();
        conn.stream_mut().push_data(b"GET /index HTTP/1.1\r\n\r\n");
        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.stream().written_str(), ok_response(INDEX, "text/html", "close"));
        assert_eq!(poller.calls().last(), Some(&PollerCall::Deregister));
    }

    #[test]
    fn test_response_without_keep_alive_closes() {
        let root = doc_root();
        let stream = MockStream::with_request(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert!(conn.is_closed());
        assert!(!conn.has_mapping());
        assert_eq!(poller.calls(), vec![PollerCall::Deregister]);
        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(poller.calls().len(), 1);
    }

    #[test]
    fn test_would_block_write_keeps_counters_and_arms_write() {
        let root = doc_root();
        let mut stream = MockStream::with_request(b"GET /big.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
        stream.writes.push_back(WriteStep::WouldBlock);
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(poller.calls(), vec![PollerCall::Rearm(Interest::Write)]);
        assert!(conn.is_writing());
        assert!(conn.has_mapping());
        assert_eq!(conn.bytes_have_send(), 0);
        let pending = conn.bytes_to_send();
        assert!(pending > 3000);
        assert!(conn.stream().written.is_empty());

        conn.stream_mut().writes.push_back(WriteStep::WouldBlock);
        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(conn.bytes_to_send(), pending);
        assert_eq!(conn.bytes_have_send(), 0);

        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(conn.stream().written.len(), pending);
        assert!(!conn.has_mapping());
        assert_eq!(conn.bytes_to_send(), 0);
        assert_eq!(
            poller.calls(),
            vec![
                PollerCall::Rearm(Interest::Write),
                PollerCall::Rearm(Interest::Write),
                PollerCall::Rearm(Interest::Read),
            ]
        );
    }

    #[test]
    fn test_partial_writes_resume_across_ranges() {
        let root = doc_root();
        let mut stream = MockStream::with_request(b"GET /big.txt HTTP/1.1\r\n\r\n");
        stream.writes.extend([WriteStep::Accept(10), WriteStep::Accept(100), WriteStep::WouldBlock]);
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(conn.bytes_have_send(), 110);
        assert_eq!(conn.stream().written.len(), 110);

        conn.stream_mut().writes.extend([WriteStep::Accept(1500), WriteStep::Accept(7)]);
        assert_eq!(conn.run(), Disposition::Close);

        let body = "x".repeat(3000);
        assert_eq!(conn.stream().written_str(), ok_response(&body, "text/plain", "close"));
        assert_eq!(
            poller.calls(),
            vec![PollerCall::Rearm(Interest::Write), PollerCall::Deregister]
        );
    }

    #[test]
    fn test_write_failure_releases_mapping() {
        let root = doc_root();
        let mut stream = MockStream::with_request(b"GET /big.txt HTTP/1.1\r\n\r\n");
        stream.writes.extend([WriteStep::Accept(5), WriteStep::Fail]);
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert!(!conn.has_mapping());
        assert_eq!(poller.calls(), vec![PollerCall::Deregister]);
    }

    #[test]
    fn test_edge_triggered_partial_request() {
        let root = doc_root();
        let mut stream = MockStream::with_request(b"GET /ind");
        stream.reads.push_back(ReadStep::WouldBlock);
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(poller.calls(), vec![PollerCall::Rearm(Interest::Read)]);
        assert_eq!(conn.parse_state(), ParseState::RequestLine);
        assert_eq!(conn.read_buffer().checked_idx(), 8);
        assert!(conn.stream().written.is_empty());

        conn.stream_mut().push_data(b"ex.html HTTP/1.1\r\nConnection: keep-");
        conn.stream_mut().push_data(b"alive\r\n\r\n");
        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(conn.stream().written_str(), ok_response(INDEX, "text/html", "keep-alive"));
    }

    #[test]
    fn test_level_triggered_reads_once_per_pass() {
        let root = doc_root();
        let mut stream = MockStream::with_request(b"GET / HTTP/1.1\r\n");
        stream.push_data(b"\r\n");
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Level);

        assert_eq!(conn.run(), Disposition::KeepOpen);
        assert_eq!(conn.parse_state(), ParseState::Headers);
        assert!(conn.stream().written.is_empty());

        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.stream().written_str(), ok_response(INDEX, "text/html", "close"));
        assert_eq!(
            poller.calls(),
            vec![PollerCall::Rearm(Interest::Read), PollerCall::Deregister]
        );
    }

    #[test]
    fn test_level_triggered_would_block_closes() {
        let root = doc_root();
        let (mut conn, poller) = connection(root.path(), MockStream::new(), TriggerMode::Level);
        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(poller.calls(), vec![PollerCall::Deregister]);
    }

    #[test]
    fn test_peer_close_tears_down_silently() {
        let root = doc_root();
        let mut stream = MockStream::with_request(b"GET / HTTP/1.1\r\n");
        stream.reads.push_back(ReadStep::Eof);
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert!(conn.stream().written.is_empty());
        assert_eq!(poller.calls(), vec![PollerCall::Deregister]);
    }

    #[test]
    fn test_oversized_request_closes() {
        let root = doc_root();
        let mut request = b"GET /".to_vec();
        request.extend(std::iter::repeat(b'a').take(3000));
        let stream = MockStream::with_request(&request);
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert!(conn.stream().written.is_empty());
    }

    #[test]
    fn test_bad_request_answers_400_and_closes() {
        let root = doc_root();
        let stream = MockStream::with_request(b"GET /foo HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        let response = conn.stream().written_str();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        assert!(response.ends_with(StatusCode::BadRequest.error_body()));
        assert_eq!(poller.calls(), vec![PollerCall::Deregister]);
    }

    #[test]
    fn test_missing_file_answers_404_and_keeps_alive() {
        let root = doc_root();
        let stream = MockStream::with_request(b"GET /missing.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
        let (mut conn, poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::KeepOpen);
        let response = conn.stream().written_str();
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.contains("Connection: keep-alive\r\n"));
        assert!(response.ends_with(StatusCode::NotFound.error_body()));
        assert_eq!(poller.calls(), vec![PollerCall::Rearm(Interest::Read)]);
    }

    #[test]
    fn test_unreadable_file_answers_403() {
        let root = doc_root();
        let stream = MockStream::with_request(b"GET /secret.txt HTTP/1.1\r\n\r\n");
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert!(conn.stream().written_str().starts_with("HTTP/1.1 403 Forbidden\r\n"));
    }

    #[test]
    fn test_directory_answers_400() {
        let root = doc_root();
        let stream = MockStream::with_request(b"GET /images HTTP/1.1\r\n\r\n");
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert!(conn.stream().written_str().starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_empty_file_gets_placeholder() {
        let root = doc_root();
        let stream = MockStream::with_request(b"GET /empty.html HTTP/1.1\r\n\r\n");
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(
            conn.stream().written_str(),
            ok_response(EMPTY_FILE_BODY, "text/html", "close")
        );
    }

    #[test]
    fn test_login_success_serves_welcome() {
        let root = doc_root();
        let stream = MockStream::with_request(&form_post("/login", "user=alice&password=p%40ss"));
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.request().path, "/welcome.html");
        assert_eq!(conn.stream().written_str(), ok_response(WELCOME, "text/html", "close"));
    }

    #[test]
    fn test_login_failure_serves_error_page() {
        let root = doc_root();
        let stream = MockStream::with_request(&form_post("/login", "user=alice&password=wrong"));
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.stream().written_str(), ok_response(ERROR, "text/html", "close"));
    }

    #[test]
    fn test_register_flow() {
        let root = doc_root();
        let stream = MockStream::with_request(&form_post("/register", "user=bob&password=hunter2"));
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);
        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.stream().written_str(), ok_response(WELCOME, "text/html", "close"));

        let stream = MockStream::with_request(&form_post("/register", "user=alice&password=x"));
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);
        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.stream().written_str(), ok_response(ERROR, "text/html", "close"));
    }

    #[test]
    fn test_register_storage_failure_serves_register_error_page() {
        let root = doc_root();
        let stream = MockStream::with_request(&form_post("/register", "user=bob&password=hunter2"));
        let (mut conn, _poller) =
            connection_with_store(root.path(), stream, TriggerMode::Edge, Arc::new(UnavailableStore));

        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.request().path, "/registerError.html");
        assert_eq!(
            conn.stream().written_str(),
            ok_response(REGISTER_ERROR, "text/html", "close")
        );
    }

    #[test]
    fn test_login_storage_failure_serves_error_page() {
        let root = doc_root();
        let stream = MockStream::with_request(&form_post("/login", "user=alice&password=p%40ss"));
        let (mut conn, _poller) =
            connection_with_store(root.path(), stream, TriggerMode::Edge, Arc::new(UnavailableStore));

        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.request().path, "/error.html");
        assert_eq!(conn.stream().written_str(), ok_response(ERROR, "text/html", "close"));
    }

    #[test]
    fn test_form_with_missing_fields_serves_error_page() {
        let root = doc_root();
        let stream = MockStream::with_request(&form_post("/login", "user=alice"));
        let (mut conn, _poller) = connection(root.path(), stream, TriggerMode::Edge);

        assert_eq!(conn.run(), Disposition::Close);
        assert_eq!(conn.request().path, "/error.html");
    }

    #[test]
    fn test_config_from_json() {
        let config = ServerConfig::from_json_str(
            r#"{"addr": "0.0.0.0:8080", "doc_root": "/srv/www", "trigger_mode": "level", "workers": 2}"#,
        )
        .unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.doc_root, Path::new("/srv/www"));
        assert_eq!(config.trigger_mode, TriggerMode::Level);
        assert_eq!(config.workers, 2);
        assert_eq!(config.idle_timeout_secs, 15);
        assert!(config.users_file.is_none());

        assert!(ServerConfig::from_json_str(r#"{"trigger_mode": "sideways"}"#).is_err());
    }

    #[test]
    fn test_server_creation_seeds_users() {
        let dir = tempfile::tempdir().unwrap();
        let users = dir.path().join("users.json");
        fs::write(&users, r#"{"alice": "p@ss"}"#).unwrap();

        let config = ServerConfig {
            doc_root: dir.path().to_path_buf(),
            users_file: Some(users),
            ..ServerConfig::default()
        };
        let server = HttpServer::new(config).unwrap();
        assert_eq!(server.active_connections(), 0);
        assert_eq!(server.handler().resolver().doc_root(), dir.path());

        let missing = ServerConfig {
            users_file: Some(dir.path().join("nope.json")),
            ..ServerConfig::default()
        };
        assert!(HttpServer::new(missing).is_err());
    }
}
