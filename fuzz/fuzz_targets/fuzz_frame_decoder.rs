#![no_main]
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = chatrelay::protocol::codec::FrameCodec::new(4096);
    let mut buf = BytesMut::from(data);
    let before = buf.len();
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        assert!(frame.len() <= 4096 * 3);
    }
    assert!(buf.len() <= before);
});
