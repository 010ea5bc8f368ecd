use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
///
/// Every long-running worker holds a [`ShutdownRx`] obtained from [`ShutdownTx::subscribe`] and
/// races its blocking operations against it. Once triggered, shutdown cannot be undone.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Wraps a watch sender into a [`ShutdownTx`].
    pub fn new(tx: watch::Sender<bool>) -> Self {
        Self(tx)
    }

    /// Signals shutdown to every subscribed receiver.
    pub fn shutdown(&self) {
        // Infallible so that shutdown can be requested before any worker subscribed.
        self.0.send_replace(true);
    }

    /// Returns `true` if shutdown was already requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new shutdown receiver subscription.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` if shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once shutdown is requested.
    ///
    /// If every [`ShutdownTx`] was dropped without signalling, the future never completes, so a
    /// finished pipeline does not look like a cancelled one.
    pub async fn wait_for_shutdown(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx::new(tx), ShutdownRx(rx))
}
