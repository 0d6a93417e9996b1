//! Debounced search input
//!
//! Keystrokes are forwarded to a background task which only commits the
//! `search` filter once typing has paused for the configured quiet period.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::filters::ViewStore;

enum Input {
    Text(String),
    Clear,
}

pub struct SearchDebouncer {
    tx: mpsc::UnboundedSender<Input>,
    store: Arc<ViewStore>,
    searching: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SearchDebouncer {
    /// Start the debounce task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<ViewStore>, quiet: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let searching = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run(rx, Arc::clone(&store), Arc::clone(&searching), quiet));

        Self {
            tx,
            store,
            searching,
            task,
        }
    }

    /// Feed the raw contents of the search box
    pub fn input(&self, text: impl Into<String>) {
        self.searching.store(true, Ordering::SeqCst);
        if self.tx.send(Input::Text(text.into())).is_err() {
            tracing::warn!("Search debouncer stopped; input dropped");
            self.searching.store(false, Ordering::SeqCst);
        }
    }

    /// Clear the search right away, dropping any pending input
    pub fn clear(&self) {
        self.store.set_search(None);
        self.searching.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Input::Clear);
    }

    /// True while typed text has not been committed yet
    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::SeqCst)
    }

    /// Stop the task; uncommitted input is discarded
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "Search debouncer task failed");
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Input>,
    store: Arc<ViewStore>,
    searching: Arc<AtomicBool>,
    quiet: Duration,
) {
    let mut pending: Option<String> = None;

    loop {
        let input = if pending.is_some() {
            tokio::select! {
                input = rx.recv() => input,
                _ = tokio::time::sleep(quiet) => {
                    if let Some(text) = pending.take() {
                        commit(&store, &text);
                    }
                    searching.store(false, Ordering::SeqCst);
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match input {
            // Each keystroke restarts the quiet period
            Some(Input::Text(text)) => pending = Some(text),
            Some(Input::Clear) => pending = None,
            None => break,
        }
    }
}

fn commit(store: &ViewStore, text: &str) {
    let trimmed = text.trim();
    let search = (!trimmed.is_empty()).then(|| trimmed.to_string());
    tracing::debug!(search = ?search, "Committing search");
    store.set_search(search);
}
