use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;

use super::Pipeline;
use crate::config::Settings;
use crate::error::Result;
use crate::geo::GeoPoint;

enum Command {
    Run,
    Shutdown,
}

/// Runs pipeline cycles on a dedicated background thread.
///
/// Location updates are applied to the pipeline on the caller's thread so
/// that a cycle already in flight is superseded immediately; the worker
/// only gets woken up to start the next cycle.
pub struct PipelineWorker {
    pipeline: Arc<Pipeline>,
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn spawn(pipeline: Arc<Pipeline>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker_pipeline = pipeline.clone();
        let handle = thread::Builder::new()
            .name("poi-pipeline".to_string())
            .spawn(move || run(worker_pipeline, rx))?;
        Ok(Self {
            pipeline,
            tx,
            handle: Some(handle),
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Returns true when the move was large enough to schedule a cycle.
    pub fn update_location(&self, location: GeoPoint) -> bool {
        let moved = self.pipeline.update_location(location);
        if moved {
            self.wake();
        }
        moved
    }

    /// Applies `change` and wakes the worker when the new settings need a
    /// fresh cycle. Returns whether one was scheduled.
    pub fn update_settings(&self, change: impl FnOnce(&mut Settings)) -> Result<bool> {
        let scheduled = self.pipeline.update_settings(change)?;
        if scheduled {
            self.wake();
        }
        Ok(scheduled)
    }

    pub fn refresh(&self) {
        self.pipeline.refresh();
        self.wake();
    }

    fn wake(&self) {
        // The worker only goes away on shutdown.
        let _ = self.tx.send(Command::Run);
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(Command::Shutdown);
            if handle.join().is_err() {
                log::error!("pipeline worker panicked");
            }
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(pipeline: Arc<Pipeline>, rx: Receiver<Command>) {
    while let Ok(command) = rx.recv() {
        // Collapse queued wake-ups into a single cycle.
        let mut shutdown = matches!(command, Command::Shutdown);
        for queued in rx.try_iter() {
            shutdown |= matches!(queued, Command::Shutdown);
        }
        if shutdown {
            break;
        }
        if pipeline.run_cycle().is_none() {
            debug!("cycle superseded; waiting for the next wake-up");
        }
    }
    debug!("pipeline worker stopped");
}
