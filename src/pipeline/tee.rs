//! Fan-out of one frame stream to several consumers.
//!
//! Both modes block on each sink in turn: a frame is delivered to sink *k*
//! before sink *k+1*, and to every sink before the next frame is pulled. A
//! slow consumer therefore delays the sinks after it and, through the source,
//! everything upstream. Callers that need isolation should put a larger queue
//! in front of the slow consumer.

use crate::frame::Frame;
use crate::pipeline::error::StageError;
use crate::pipeline::sink::FrameSink;
use crate::pipeline::stage::FrameStream;
use async_stream::stream;
use futures_util::stream::{Stream, StreamExt};

/// Mirrors every frame of `input` into `sink` and yields it onward.
///
/// The frame is accepted by the sink before it is yielded. A closed sink is a
/// fatal error and ends the stream.
pub fn tee<'a, S, K>(input: S, sink: &'a mut K) -> FrameStream<'a>
where
    S: Stream<Item = Result<Frame, StageError>> + Send + 'a,
    K: FrameSink + ?Sized,
{
    Box::pin(stream! {
        let mut input = std::pin::pin!(input);
        while let Some(item) = input.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            if let Err(error) = sink.accept(frame.clone()).await {
                tracing::error!(sink = sink.name(), %error, "tee sink rejected frame");
                yield Err(StageError::from(error));
                return;
            }
            yield Ok(frame);
        }
    })
}

/// Delivers every frame of `input` to each sink in `sinks`, in order.
///
/// Terminal: nothing is yielded. Returns the number of frames read from
/// `input`. Stops at the first upstream failure or closed sink.
pub async fn broadcast<S, K>(input: S, sinks: &mut [K]) -> Result<usize, StageError>
where
    S: Stream<Item = Result<Frame, StageError>> + Send,
    K: FrameSink,
{
    let mut input = std::pin::pin!(input);
    let mut count = 0;

    while let Some(item) = input.next().await {
        let frame = item?;
        count += 1;
        if let Some((last, rest)) = sinks.split_last_mut() {
            for sink in rest {
                sink.accept(frame.clone()).await?;
            }
            last.accept(frame).await?;
        }
    }

    tracing::debug!(frames = count, sinks = sinks.len(), "broadcast finished");
    Ok(count)
}
