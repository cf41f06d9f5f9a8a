use std::{
    future::Future,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use futures::channel::oneshot;

use crate::{
    error::TaskError,
    pool::schedule::TaskId,
};


pub(crate) type Settlement<O, E> = Result<O, TaskError<E>>;

/// Resolves once the pool reports the task's result. A task discarded by
/// shutdown resolves to `TaskError::Cancelled`.
#[derive(Debug)]
pub struct TaskHandle<O, E: std::error::Error + 'static> {
    id: TaskId,
    receiver: oneshot::Receiver<Settlement<O, E>>,
}

impl<O, E: std::error::Error + 'static> TaskHandle<O, E> {
    pub(crate) fn new(id: TaskId, receiver: oneshot::Receiver<Settlement<O, E>>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Blocks the calling thread until the task settles.
    pub fn wait(self) -> Settlement<O, E> {
        futures::executor::block_on(self)
    }
}

impl<O, E: std::error::Error + 'static> Future for TaskHandle<O, E> {
    type Output = Settlement<O, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(settlement)) => Poll::Ready(settlement),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TaskError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
