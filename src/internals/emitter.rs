use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Produces [`Send`]-able objects from a background task, and sends them via a [`mpsc::channel`].
///
/// The receiving end is likely a [`crate::internals::Register`].
pub trait Emitter {
    type Emitted: Send;

    /// Spawn a new async task to run the business logic of this [`Emitter`].
    ///
    /// Returns the [`mpsc::Receiver`] of what gets emitted, and the [`JoinHandle`] of the spawned task.
    /// The task terminates once the `shutdown_token` is cancelled.
    fn spawn(&self, shutdown_token: CancellationToken) -> (mpsc::Receiver<Self::Emitted>, JoinHandle<()>);
}
