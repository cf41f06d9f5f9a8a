/// A unit of work owned by one pool thread.
///
/// Workers that need one-time setup return `true` from `requires_init`;
/// the pool then runs `init` on the worker's own thread and keeps every task
/// queued until all workers have finished (or failed) their setup.
pub trait Worker: Send + 'static {
    type Task: Send + 'static;
    type Output: Send + 'static;
    type Error: std::error::Error + Send + 'static;

    fn requires_init(&self) -> bool {
        false
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn run(&mut self, task: Self::Task) -> Result<Self::Output, Self::Error>;
}
