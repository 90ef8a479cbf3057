use std::time::Duration;

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use voice_dialog::audiosocket::{
    encode_frame, hangup_frame, FrameWriter, Kind, Message, MessageReader, HEADER_LEN,
    SLIN_CHUNK_SIZE,
};
use voice_dialog::TransportError;

#[tokio::test]
async fn test_reads_call_id_then_audio() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = MessageReader::new(server);
    let id = Uuid::new_v4();

    client.write_all(&Message::Id(id).encode()).await.unwrap();
    client
        .write_all(&encode_frame(Kind::Slin, &[1, 2, 3, 4]))
        .await
        .unwrap();
    client.write_all(&hangup_frame()).await.unwrap();

    assert_eq!(reader.next_message().await.unwrap(), Message::Id(id));
    assert_eq!(
        reader.next_message().await.unwrap(),
        Message::Audio(vec![1, 2, 3, 4])
    );
    assert_eq!(reader.next_message().await.unwrap(), Message::Hangup);
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = MessageReader::new(server);
    let frame = encode_frame(Kind::Slin, &[9u8; 100]);

    let writer = tokio::spawn(async move {
        for piece in frame.chunks(7) {
            client.write_all(piece).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        client
    });

    assert_eq!(
        reader.next_message().await.unwrap(),
        Message::Audio(vec![9u8; 100])
    );
    drop(writer.await.unwrap());
}

#[tokio::test]
async fn test_dropped_read_loses_no_bytes() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = MessageReader::new(server);
    let frame = encode_frame(Kind::Slin, &[5u8; 32]);

    client.write_all(&frame[..HEADER_LEN + 10]).await.unwrap();
    let pending =
        tokio::time::timeout(Duration::from_millis(50), reader.next_message()).await;
    assert!(pending.is_err());

    client.write_all(&frame[HEADER_LEN + 10..]).await.unwrap();
    assert_eq!(
        reader.next_message().await.unwrap(),
        Message::Audio(vec![5u8; 32])
    );
}

#[tokio::test]
async fn test_unknown_kind_keeps_stream_aligned() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = MessageReader::new(server);

    client.write_all(&[0x42, 0x00, 0x02, 0xaa, 0xbb]).await.unwrap();
    client.write_all(&hangup_frame()).await.unwrap();

    let err = reader.next_message().await.unwrap_err();
    assert!(matches!(err, TransportError::UnknownKind(0x42)));
    assert!(err.is_recoverable());
    assert_eq!(reader.next_message().await.unwrap(), Message::Hangup);
}

#[tokio::test]
async fn test_bad_id_length_is_malformed() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = MessageReader::new(server);

    client.write_all(&encode_frame(Kind::Id, &[0u8; 8])).await.unwrap();

    let err = reader.next_message().await.unwrap_err();
    assert!(matches!(err, TransportError::Malformed { kind: Kind::Id, .. }));
}

#[tokio::test]
async fn test_close_mid_frame_is_truncated() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = MessageReader::new(server);

    client.write_all(&[0x10, 0x00, 0x10, 1, 2]).await.unwrap();
    drop(client);

    let err = reader.next_message().await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::Truncated {
            expected: 19,
            actual: 5
        }
    ));
    assert!(matches!(
        reader.next_message().await,
        Err(TransportError::EndOfStream)
    ));
}

#[tokio::test]
async fn test_close_on_boundary_is_end_of_stream() {
    let (mut client, server) = tokio::io::duplex(4096);
    let mut reader = MessageReader::new(server);

    client.write_all(&hangup_frame()).await.unwrap();
    drop(client);

    assert_eq!(reader.next_message().await.unwrap(), Message::Hangup);
    assert!(matches!(
        reader.next_message().await,
        Err(TransportError::EndOfStream)
    ));
}

#[tokio::test]
async fn test_write_audio_frames_pcm() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let pcm: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();

    let mut writer = FrameWriter::new(client);
    let frames = writer.write_audio(&pcm, SLIN_CHUNK_SIZE).await.unwrap();
    drop(writer);
    assert_eq!(frames, 4);

    let mut reader = MessageReader::new(server);
    let mut received = Vec::new();
    while let Ok(message) = reader.next_message().await {
        match message {
            Message::Audio(payload) => {
                assert!(payload.len() <= SLIN_CHUNK_SIZE);
                received.extend(payload);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(received, pcm);
}
