//! The control loop: store changes in, generated configuration and reloads out.
//!
//! ```text
//! source task ──> FragmentStore ──> ChangeSignal ──> debouncer task
//!                       ^                                  │ settle
//!                       │ list()                           v
//!                       └────────────── generate ──> reload (sequential)
//! ```
//!
//! Generation and reload never overlap. Changes that arrive while a cycle is
//! running land in the debouncer and cause exactly one more cycle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::Settings;
use crate::document::Document;
use crate::generate::{ConfigGenerator, GenerateError, GenerateReport};
use crate::reload::{ReloadNotifier, ReloadOutcome};
use crate::store::FragmentStore;
use crate::watcher::{ChangeDebouncer, FragmentSource, WatchError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Debouncer stopped unexpectedly")]
    DebouncerStopped,
}

pub struct Orchestrator {
    store: Arc<FragmentStore>,
    generator: ConfigGenerator,
    notifier: ReloadNotifier,
    base: Document,
    annotation: String,
    debounce: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<FragmentStore>,
        generator: ConfigGenerator,
        notifier: ReloadNotifier,
        base: Document,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            generator,
            notifier,
            base,
            annotation: settings.source.annotation.clone(),
            debounce: settings.debounce(),
        }
    }

    /// Run until something fatal happens.
    ///
    /// The first cycle runs one quiet period after start even when no
    /// eligible fragment ever shows up, so the target file always exists.
    pub async fn run(mut self, source: Box<dyn FragmentSource>) -> Result<(), SyncError> {
        let (debouncer, signal, mut settled) = ChangeDebouncer::new(self.debounce);

        let annotation = self.annotation.clone();
        let on_change = signal.clone();
        self.store.subscribe(move |event| {
            if event.affects_output(&annotation) {
                crate::log_event!("watch", event.kind, "{}", event.fragment.id);
                on_change.notify();
            }
        });
        signal.notify();
        drop(signal);

        let debounce_task = tokio::spawn(debouncer.run());
        let source_name = source.name().to_string();
        crate::log_event!("watch", "starting", "{source_name}");
        let mut source_task = tokio::spawn(source.run(Arc::clone(&self.store)));

        let result = loop {
            tokio::select! {
                settle = settled.recv() => match settle {
                    Some(()) => {
                        if let Err(e) = self.cycle().await {
                            break Err(e);
                        }
                    }
                    None => break Err(SyncError::DebouncerStopped),
                },

                finished = &mut source_task => {
                    let error = match finished {
                        Ok(Ok(())) => WatchError::StreamEnded {
                            source_name: source_name.clone(),
                        },
                        Ok(Err(e)) => e,
                        Err(e) => WatchError::TaskAborted {
                            source_name: source_name.clone(),
                            reason: e.to_string(),
                        },
                    };
                    break Err(error.into());
                }
            }
        };

        source_task.abort();
        debounce_task.abort();
        result
    }

    /// One generate + reload cycle on a fresh store snapshot.
    pub async fn cycle(&mut self) -> Result<(GenerateReport, ReloadOutcome), SyncError> {
        let fragments = self.store.list();
        let report = self.generator.generate(&mut self.base, &fragments)?;
        let outcome = self.notifier.notify().await;
        Ok((report, outcome))
    }
}
