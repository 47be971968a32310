use futures_util::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use tokio::time::Sleep;

/// Await the next item from a stream or the deadline.
///
/// - Returns `Ok(Some(item))` when the stream yields
/// - Returns `Ok(None)` when the stream ends
/// - Returns `Err(())` once the deadline has passed
pub async fn select_stream_or_deadline<T>(
    mut stream: Pin<&mut (dyn Stream<Item = T> + Send)>,
    deadline: Pin<&mut Sleep>,
) -> Result<Option<T>, ()> {
    tokio::select! {
        item = stream.next() => Ok(item),
        _ = deadline => Err(()),
    }
}
