use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    process::ExitCode,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::anyhow;
use futures::{
    FutureExt,
    future::{BoxFuture, join_all},
};
use rlog_core::{Config, Level, Value};
use thiserror::Error;
use tokio::sync::watch;

use crate::file::{FileSink, SinkState};

/// Shutdown progress of an [`ExitCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    ExitRequested,
    Draining,
    Terminated,
}

/// Returned by [`Logger::exit`](crate::Logger::exit). Propagate it as an error
/// to unwind to the top level, where the coordinator drains and terminates.
#[derive(Debug, Clone, Error)]
#[error("exit requested: {payload}")]
pub struct ExitSignal {
    pub payload: Value,
    pub timestamp: String,
}

/// How the scoped future ended.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    ExitRequested,
    Failure(anyhow::Error),
}

impl From<anyhow::Result<()>> for Outcome {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Outcome::Completed,
            Err(err) if err.downcast_ref::<ExitSignal>().is_some() => Outcome::ExitRequested,
            Err(err) => Outcome::Failure(err),
        }
    }
}

/// Process status after [`ExitCoordinator::conclude`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Clean,
    Crashed,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Crashed => 1,
        }
    }

    pub fn terminate(self) -> ! {
        std::process::exit(self.code())
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Clean => ExitCode::SUCCESS,
            ExitStatus::Crashed => ExitCode::FAILURE,
        }
    }
}

type ExitCallback = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct ExitContext {
    file: Arc<FileSink>,
    config: Arc<Config>,
    signal: ExitSignal,
}

/// Turns an exit request into an ordered shutdown: final file line, file
/// close, callbacks.
///
/// Requests are observable through a watch channel, so one raised away from
/// the caller's control flow (a failing log file) still reaches [`run`](Self::run).
pub struct ExitCoordinator {
    state: watch::Sender<ExitState>,
    context: Mutex<Option<ExitContext>>,
    callbacks: Mutex<Vec<ExitCallback>>,
    attached: Mutex<Vec<Arc<FileSink>>>,
}

impl Default for ExitCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

impl ExitCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ExitState::Running);
        Self {
            state,
            context: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ExitState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExitState> {
        self.state.subscribe()
    }

    /// Registers a file sink to be closed at shutdown.
    pub fn attach(&self, file: &Arc<FileSink>) {
        let mut attached = lock(&self.attached);
        if !attached.iter().any(|known| Arc::ptr_eq(known, file)) {
            attached.push(Arc::clone(file));
        }
    }

    /// Records the exit context. Only the first request is kept.
    pub fn request_exit(
        &self,
        file: Arc<FileSink>,
        config: Arc<Config>,
        signal: ExitSignal,
    ) -> ExitSignal {
        let mut context = lock(&self.context);
        if context.is_none() && self.state() == ExitState::Running {
            self.attach(&file);
            *context = Some(ExitContext {
                file,
                config,
                signal: signal.clone(),
            });
            self.state.send_replace(ExitState::ExitRequested);
        }
        signal
    }

    pub fn on_exit<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        lock(&self.callbacks).push(Box::new(move || {
            async move {
                callback();
                Ok(())
            }
            .boxed()
        }));
    }

    pub fn on_exit_async<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        lock(&self.callbacks).push(Box::new(move || async move { callback().await }.boxed()));
    }

    /// Resolves once an exit has been requested.
    pub async fn exit_requested(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver
            .wait_for(|state| *state != ExitState::Running)
            .await;
    }

    /// Runs `fut` to completion or until an exit is requested, then concludes.
    pub async fn run<F>(&self, fut: F) -> ExitStatus
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let outcome = tokio::select! {
            biased;
            result = AssertUnwindSafe(fut).catch_unwind() => match result {
                Ok(result) => Outcome::from(result),
                Err(panic) => Outcome::Failure(anyhow!(panic_message(&*panic))),
            },
            () = self.exit_requested() => Outcome::ExitRequested,
        };
        self.conclude(outcome).await
    }

    pub async fn conclude(&self, outcome: Outcome) -> ExitStatus {
        match outcome {
            Outcome::Failure(err) => {
                eprintln!("Uncaught exception: {err:?}");
                self.close_attached().await;
                ExitStatus::Crashed
            }
            Outcome::Completed if self.state() == ExitState::Running => {
                self.close_attached().await;
                ExitStatus::Clean
            }
            Outcome::Completed | Outcome::ExitRequested => {
                self.drain().await;
                ExitStatus::Clean
            }
        }
    }

    async fn drain(&self) {
        self.state.send_replace(ExitState::Draining);
        let context = lock(&self.context).take();
        if let Some(ExitContext {
            file,
            config,
            signal,
        }) = context
        {
            if file.state() == SinkState::Open {
                let line = file.format(&config, Level::Exit, &signal.payload, &signal.timestamp);
                if let Ok(pending) = file.write(line) {
                    let _ = pending.await;
                }
            }
        }
        self.close_attached().await;

        let callbacks = std::mem::take(&mut *lock(&self.callbacks));
        join_all(
            callbacks
                .into_iter()
                .map(|callback| AssertUnwindSafe(async move { callback().await }).catch_unwind()),
        )
        .await;
        self.state.send_replace(ExitState::Terminated);
    }

    async fn close_attached(&self) {
        let files = std::mem::take(&mut *lock(&self.attached));
        for file in files {
            let _ = file.close().await;
        }
    }
}
