use tokio::io::{AsyncRead, AsyncReadExt};

/// bytes captured from one stream, cut off at the byte budget
#[derive(Debug, Default, Clone)]
pub struct Capture {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// drain a stream into memory, stopping at `limit` bytes
///
/// reading exactly `limit` bytes is not enough to tell a stream that ended
/// at the budget from one that blew past it, so probe for one more byte
pub async fn capture<I: AsyncRead + Unpin>(limit: u64, stream: I) -> std::io::Result<Capture> {
    let mut buffer = Vec::with_capacity((limit as usize).min(64 * 1024));
    let mut taken = stream.take(limit);
    taken.read_to_end(&mut buffer).await?;

    let mut stream = taken.into_inner();
    let truncated = stream.read_u8().await.is_ok();
    Ok(Capture {
        bytes: buffer,
        truncated,
    })
}
