//! HTTP streaming surface.
//!
//! `FramePublisher` is a latest-frame slot connecting the capture loop to
//! stream clients: the loop publishes each encoded frame, clients wait on a
//! sequence-numbered condvar. Slow clients observe frame drops; they never
//! backpressure the loop.
//!
//! `StreamServer` is a minimal HTTP/1.1 server over `TcpListener`:
//!
//! - `GET /`       static index page embedding the stream
//! - `GET /video`  `multipart/x-mixed-replace` MJPEG stream
//! - `GET /health` liveness JSON

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

const MAX_REQUEST_BYTES: usize = 8192;
const MULTIPART_BOUNDARY: &str = "frame";
const SUBSCRIBER_POLL: Duration = Duration::from_millis(500);

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>parkwatch</title></head>
<body style="background:#111;color:#eee;font-family:sans-serif;text-align:center">
<h1>parkwatch</h1>
<img src="/video" alt="live stream" style="max-width:100%">
</body>
</html>
"#;

// ----------------------------------------------------------------------------
// Latest-frame slot
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SlotState {
    seq: u64,
    frame: Option<Arc<Vec<u8>>>,
}

struct Shared {
    state: Mutex<SlotState>,
    changed: Condvar,
}

/// Producer half of the latest-frame slot.
#[derive(Clone)]
pub struct FramePublisher {
    shared: Arc<Shared>,
}

impl FramePublisher {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SlotState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Replace the current frame and wake all waiting subscribers.
    pub fn publish(&self, jpeg: Vec<u8>) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.seq += 1;
            state.frame = Some(Arc::new(jpeg));
            self.shared.changed.notify_all();
        }
    }

    /// Subscribe starting from the current frame; the first `next_frame`
    /// call waits for the next publish.
    pub fn subscribe(&self) -> FrameSubscriber {
        let last_seq = self
            .shared
            .state
            .lock()
            .map(|state| state.seq)
            .unwrap_or(0);
        FrameSubscriber {
            shared: self.shared.clone(),
            last_seq,
        }
    }
}

impl Default for FramePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer half of the latest-frame slot.
pub struct FrameSubscriber {
    shared: Arc<Shared>,
    last_seq: u64,
}

impl FrameSubscriber {
    /// Wait up to `timeout` for a frame newer than the last one seen.
    /// Intermediate frames published in the meantime are skipped, not queued.
    pub fn next_frame(&mut self, timeout: Duration) -> Option<Arc<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().ok()?;
        loop {
            if state.seq != self.last_seq {
                if let Some(frame) = state.frame.clone() {
                    self.last_seq = state.seq;
                    return Some(frame);
                }
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, wait) = self.shared.changed.wait_timeout(state, remaining).ok()?;
            state = guard;
            if wait.timed_out() && state.seq == self.last_seq {
                return None;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// HTTP server
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub addr: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
        }
    }
}

pub struct StreamServer {
    cfg: StreamConfig,
    publisher: FramePublisher,
}

#[derive(Debug)]
pub struct StreamHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream server thread panicked"))?;
        }
        Ok(())
    }
}

impl StreamServer {
    pub fn new(cfg: StreamConfig, publisher: FramePublisher) -> Self {
        Self { cfg, publisher }
    }

    pub fn spawn(self) -> Result<StreamHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let publisher = self.publisher.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, publisher, shutdown_thread) {
                log::error!("stream server stopped: {}", err);
            }
        });

        Ok(StreamHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(
    listener: TcpListener,
    publisher: FramePublisher,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let publisher = publisher.clone();
                let shutdown = shutdown.clone();
                // Stream connections outlive a request/response exchange, so
                // each one gets its own handler thread.
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &publisher, &shutdown) {
                        log::debug!("stream client {} dropped: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    publisher: &FramePublisher,
    shutdown: &AtomicBool,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        return write_response(
            &mut stream,
            405,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        );
    }

    match request.path.as_str() {
        "/" => write_response(&mut stream, 200, "text/html", INDEX_PAGE.as_bytes()),
        "/health" => write_response(
            &mut stream,
            200,
            "application/json",
            br#"{"status":"ok"}"#,
        ),
        "/video" => stream_video(&mut stream, publisher, shutdown),
        _ => write_response(
            &mut stream,
            404,
            "application/json",
            br#"{"error":"not_found"}"#,
        ),
    }
}

/// Serve the multipart MJPEG stream until the client disconnects or the
/// server shuts down.
fn stream_video(
    stream: &mut TcpStream,
    publisher: &FramePublisher,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={boundary}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        boundary = MULTIPART_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;

    let mut subscriber = publisher.subscribe();
    while !shutdown.load(Ordering::SeqCst) {
        let Some(jpeg) = subscriber.next_frame(SUBSCRIBER_POLL) else {
            continue;
        };
        let part_header = format!(
            "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n",
            boundary = MULTIPART_BOUNDARY,
            len = jpeg.len()
        );
        stream.write_all(part_header.as_bytes())?;
        stream.write_all(&jpeg)?;
        stream.write_all(b"\r\n")?;
    }
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_sees_published_frames() {
        let publisher = FramePublisher::new();
        let mut subscriber = publisher.subscribe();

        publisher.publish(vec![1, 2, 3]);
        let frame = subscriber.next_frame(Duration::from_millis(100)).unwrap();
        assert_eq!(*frame, vec![1, 2, 3]);
    }

    #[test]
    fn subscriber_times_out_without_frames() {
        let publisher = FramePublisher::new();
        let mut subscriber = publisher.subscribe();
        assert!(subscriber.next_frame(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn slow_subscriber_skips_to_latest_frame() {
        let publisher = FramePublisher::new();
        let mut subscriber = publisher.subscribe();

        publisher.publish(vec![1]);
        publisher.publish(vec![2]);
        publisher.publish(vec![3]);

        let frame = subscriber.next_frame(Duration::from_millis(100)).unwrap();
        assert_eq!(*frame, vec![3]);
        // Nothing newer yet.
        assert!(subscriber.next_frame(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn subscribers_wake_from_other_threads() {
        let publisher = FramePublisher::new();
        let mut subscriber = publisher.subscribe();

        let producer = publisher.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer.publish(vec![9]);
        });

        let frame = subscriber.next_frame(Duration::from_secs(2)).unwrap();
        assert_eq!(*frame, vec![9]);
        handle.join().unwrap();
    }
}
