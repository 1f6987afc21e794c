// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Frame and message tests for fontshell-protocol.

use fontshell_protocol::frame::{
    Frame, FrameError, HEADER_SIZE, MAX_FRAME_SIZE, MessageType, read_frame, write_frame,
};
use fontshell_protocol::{CompileJob, CompiledFont, JobEnvelope, RequestId, WorkerMessage};

#[test]
fn test_message_type_conversions() {
    assert_eq!(MessageType::try_from(1u16).unwrap(), MessageType::Job);
    assert_eq!(MessageType::try_from(2u16).unwrap(), MessageType::Message);
    assert_eq!(MessageType::try_from(3u16).unwrap(), MessageType::Shutdown);

    assert!(MessageType::try_from(0u16).is_err());
    assert!(MessageType::try_from(100u16).is_err());
}

#[test]
fn test_frame_header_format() {
    let job = JobEnvelope::new(RequestId::new(1), CompileJob::new("{}", "A.babelfont"));
    let frame = Frame::json(MessageType::Job, &job).unwrap();
    let encoded = frame.encode();

    // First 4 bytes are length (big-endian)
    let length = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
    assert_eq!(length, frame.payload.len());

    // Next 2 bytes are message type (big-endian)
    let msg_type = u16::from_be_bytes([encoded[4], encoded[5]]);
    assert_eq!(msg_type, MessageType::Job as u16);

    assert_eq!(encoded.len(), HEADER_SIZE + frame.payload.len());
}

#[tokio::test]
async fn test_read_frame_truncated_header_is_connection_closed() {
    let mut reader: &[u8] = &[0, 0, 0, 10, 0];
    assert!(matches!(
        read_frame(&mut reader).await,
        Err(FrameError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_read_frame_truncated_payload_is_io_error() {
    let mut reader: &[u8] = &[0, 0, 0, 100, 0, 1, b'{'];
    assert!(matches!(read_frame(&mut reader).await, Err(FrameError::Io(_))));
}

#[tokio::test]
async fn test_read_frame_invalid_message_type() {
    let mut reader: &[u8] = &[0, 0, 0, 0, 0, 99];
    assert!(matches!(
        read_frame(&mut reader).await,
        Err(FrameError::InvalidMessageType(99))
    ));
}

#[tokio::test]
async fn test_read_frame_rejects_oversized_length() {
    let mut header = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes().to_vec();
    header.extend_from_slice(&[0, 1]);
    let mut reader = header.as_slice();

    match read_frame(&mut reader).await {
        Err(FrameError::FrameTooLarge(size)) => assert_eq!(size, MAX_FRAME_SIZE + 1),
        other => panic!("Expected FrameTooLarge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_read_frame_empty_payload() {
    let mut reader: &[u8] = &[0, 0, 0, 0, 0, 3];
    let frame = read_frame(&mut reader).await.unwrap();
    assert_eq!(frame.message_type, MessageType::Shutdown);
    assert!(frame.payload.is_empty());
}

#[test]
fn test_max_frame_size_constant() {
    assert_eq!(MAX_FRAME_SIZE, 64 * 1024 * 1024);
}

#[tokio::test]
async fn test_read_write_frame_through_buffer() {
    let message: WorkerMessage<CompiledFont> = WorkerMessage::Success {
        id: RequestId::new(8),
        result: CompiledFont::new(b"\0\x01\0\0glyf".to_vec()),
        time_taken_ms: 250,
    };
    let original = Frame::new(MessageType::Message, message.encode().unwrap()).unwrap();

    let mut buffer = Vec::new();
    write_frame(&mut buffer, &original).await.unwrap();

    let mut reader = buffer.as_slice();
    let read_back = read_frame(&mut reader).await.unwrap();

    assert_eq!(original.message_type, read_back.message_type);
    assert_eq!(
        WorkerMessage::<CompiledFont>::decode(&read_back.payload).unwrap(),
        message
    );
}

#[test]
fn test_job_frame_payload_matches_wire_schema() {
    let job = JobEnvelope::new(RequestId::new(5), CompileJob::new("{}", "Sans.glyphs"));
    let frame = Frame::json(MessageType::Job, &job).unwrap();

    let value: serde_json::Value = frame.decode_json().unwrap();
    assert_eq!(value["id"], 5);
    assert_eq!(value["payload"]["filename"], "Sans.glyphs");
    assert_eq!(value["payload"]["babelfontJson"], "{}");
}
