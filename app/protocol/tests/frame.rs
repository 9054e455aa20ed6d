//! Framing codec tests.

use tasker_protocol::frame::{DEFAULT_MAX_FRAME_SIZE, FrameError, read_frame, write_frame};

#[tokio::test]
async fn frame_roundtrip() {
    let payload = b"\x82\xa7task_id\x01".to_vec();

    let mut buf = Vec::new();
    write_frame(&mut buf, &payload, DEFAULT_MAX_FRAME_SIZE)
        .await
        .unwrap();
    assert_eq!(&buf[..4], &(payload.len() as u32).to_be_bytes());

    let mut cursor = std::io::Cursor::new(buf);
    let decoded = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE)
        .await
        .unwrap();
    assert_eq!(decoded, payload);
}

#[tokio::test]
async fn frame_empty_payload() {
    let mut buf = Vec::new();
    write_frame(&mut buf, &[], DEFAULT_MAX_FRAME_SIZE)
        .await
        .unwrap();

    let mut cursor = std::io::Cursor::new(buf);
    let decoded = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE)
        .await
        .unwrap();
    assert!(decoded.is_empty());
}

#[tokio::test]
async fn frames_are_read_in_order() {
    let mut buf = Vec::new();
    for payload in [&b"first"[..], b"second", b"third"] {
        write_frame(&mut buf, payload, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
    }

    let mut cursor = std::io::Cursor::new(buf);
    for expected in [&b"first"[..], b"second", b"third"] {
        let frame = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        assert_eq!(frame, expected);
    }
    let result = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await;
    assert!(matches!(result, Err(FrameError::ConnectionClosed)));
}

#[tokio::test]
async fn frame_too_large_on_read() {
    // Craft a frame header claiming a payload over the limit.
    let len: u32 = 17 * 1024;
    let mut buf = Vec::new();
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(b"{}"); // dummy payload (won't be read)

    let mut cursor = std::io::Cursor::new(buf);
    let result = read_frame(&mut cursor, 16 * 1024).await;
    assert!(matches!(result, Err(FrameError::TooLarge { size, max }) if size == 17 * 1024 && max == 16 * 1024));
}

#[tokio::test]
async fn frame_too_large_on_write() {
    let mut buf = Vec::new();
    let result = write_frame(&mut buf, &[0u8; 32], 16).await;
    assert!(matches!(result, Err(FrameError::TooLarge { .. })));
    assert!(buf.is_empty());
}

#[tokio::test]
async fn frame_connection_closed() {
    let buf: Vec<u8> = Vec::new();
    let mut cursor = std::io::Cursor::new(buf);
    let result = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await;
    assert!(matches!(result, Err(FrameError::ConnectionClosed)));
}

#[tokio::test]
async fn truncated_payload_is_an_io_error() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&10u32.to_be_bytes());
    buf.extend_from_slice(b"short");

    let mut cursor = std::io::Cursor::new(buf);
    let result = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await;
    assert!(matches!(result, Err(FrameError::Io(_))));
}
