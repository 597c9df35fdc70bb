//! HTTP surface tests against a live listener on an ephemeral port.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use parkwatch::{FramePublisher, StreamConfig, StreamServer};

fn spawn_server() -> (parkwatch::stream::StreamHandle, FramePublisher) {
    let publisher = FramePublisher::new();
    let server = StreamServer::new(
        StreamConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        publisher.clone(),
    );
    let handle = server.spawn().expect("spawn stream server");
    (handle, publisher)
}

fn get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    write!(stream, "GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path).unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&response).into_owned()
}

#[test]
fn health_endpoint_reports_ok() {
    let (handle, _publisher) = spawn_server();

    let response = get(handle.addr, "/health");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains(r#"{"status":"ok"}"#));

    handle.stop().expect("stop server");
}

#[test]
fn index_page_embeds_the_stream() {
    let (handle, _publisher) = spawn_server();

    let response = get(handle.addr, "/");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("text/html"));
    assert!(response.contains(r#"<img src="/video""#));

    handle.stop().expect("stop server");
}

#[test]
fn unknown_paths_are_404() {
    let (handle, _publisher) = spawn_server();

    let response = get(handle.addr, "/missing");
    assert!(response.starts_with("HTTP/1.1 404"));

    handle.stop().expect("stop server");
}

#[test]
fn video_endpoint_streams_multipart_jpeg_frames() {
    let (handle, publisher) = spawn_server();

    let mut stream = TcpStream::connect(handle.addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    write!(stream, "GET /video HTTP/1.1\r\nHost: test\r\n\r\n").unwrap();

    // Feed frames while the client reads.
    let fake_jpeg = vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];
    let feeder = {
        let publisher = publisher.clone();
        let jpeg = fake_jpeg.clone();
        std::thread::spawn(move || {
            for _ in 0..20 {
                publisher.publish(jpeg.clone());
                std::thread::sleep(Duration::from_millis(50));
            }
        })
    };

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            Err(_) => continue,
        }
        let text = String::from_utf8_lossy(&response);
        if text.contains("--frame") && response.windows(2).any(|w| w == [0xFF, 0xD8]) {
            break;
        }
    }

    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(text.contains("--frame"));
    assert!(text.contains("Content-Type: image/jpeg"));
    assert!(
        response.windows(2).any(|w| w == [0xFF, 0xD8]),
        "no jpeg payload seen in stream"
    );

    drop(stream);
    feeder.join().unwrap();
    handle.stop().expect("stop server");
}
