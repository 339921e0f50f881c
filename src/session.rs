//! Device sessions: one grabbed input, one virtual output, one dispatcher
//! loop plus its background tasks

use crate::config::DeviceConfig;
use crate::device;
use crate::dispatcher::Dispatcher;
use crate::error::{RemapError, Result};
use crate::event::RawEvent;
use crate::jitter::{self, IdleClock};
use crate::mapping::DeviceRemaps;
use crate::sink::{OutputHandle, UinputSink};
use evdev::EventStream;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Where a session reads physical events from
pub trait EventSource {
    fn next_raw(&mut self) -> impl Future<Output = io::Result<RawEvent>> + Send;
}

impl EventSource for EventStream {
    fn next_raw(&mut self) -> impl Future<Output = io::Result<RawEvent>> + Send {
        async move { self.next_event().await.map(RawEvent::from) }
    }
}

pub struct SessionHandle {
    label: String,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<()>>,
}

impl SessionHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the session to stop and wait up to `grace` for it to tear down
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Session task for {} failed: {e}", self.label),
            Err(_) => {
                warn!("Session for {} did not stop within {:?}", self.label, grace);
                self.join.abort();
            }
        }
    }

    /// Wait for the session to end on its own
    pub async fn wait(self) -> Result<()> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Session task for {} failed: {e}", self.label);
                Ok(())
            }
        }
    }
}

/// Open and grab the configured input, create its virtual output and spawn
/// the session task. Returns as soon as the task is running.
pub fn start(config: &DeviceConfig) -> Result<SessionHandle> {
    let (path, mut input) = device::find_input(&config.selector)?;
    input
        .grab()
        .map_err(|source| RemapError::ExclusiveAccessDenied {
            path: path.clone(),
            source,
        })?;

    let sink = UinputSink::create(&config.output_name, &input, &config.remaps)?;
    let output = OutputHandle::new(sink);
    let stream = input.into_event_stream().map_err(|source| RemapError::OpenDevice {
        path: path.clone(),
        source,
    })?;

    let label = format!("{} ({})", path.display(), config.output_name);
    info!("Remapping {}", label);
    Ok(spawn_session(label, stream, Arc::new(config.remaps.clone()), output))
}

/// Spawn the dispatcher loop over any event source
pub fn spawn_session<S>(label: String, source: S, remaps: Arc<DeviceRemaps>, output: OutputHandle) -> SessionHandle
where
    S: EventSource + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let join = tokio::spawn(run_session(label.clone(), source, remaps, output, rx));
    SessionHandle {
        label,
        shutdown: Some(tx),
        join,
    }
}

async fn run_session<S: EventSource>(
    label: String,
    mut source: S,
    remaps: Arc<DeviceRemaps>,
    output: OutputHandle,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    let idle = IdleClock::new();
    let jitter = jitter::spawn(output.clone(), idle.clone());
    let mut dispatcher = Dispatcher::new(remaps, output, idle);

    let result = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break Ok(()),
            event = source.next_raw() => {
                let handled = event
                    .map_err(RemapError::InputRead)
                    .and_then(|event| dispatcher.handle(event));
                if let Err(e) = handled {
                    break Err(e);
                }
            }
        }
    };

    dispatcher.shutdown().await;
    jitter.cancel();
    jitter.join().await;
    // Dropping the source releases the grab
    drop(source);

    match &result {
        Ok(()) => info!("Session for {} stopped", label),
        Err(e) => error!("Session for {} ended: {e}", label),
    }
    result
}
