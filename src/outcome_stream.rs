use async_stream::stream;
use futures_util::Stream;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::trace;

/// Yield completed items in arrival order until every sender is gone.
pub fn outcome_stream<T: Send + 'static>(mut receiver: UnboundedReceiver<T>) -> impl Stream<Item = T> {
    stream! {
        let mut received = 0usize;
        while let Some(item) = receiver.recv().await {
            received += 1;
            trace!("outcome {} received", received);
            yield item;
        }
        trace!("outcome queue closed after {} items", received);
    }
}
