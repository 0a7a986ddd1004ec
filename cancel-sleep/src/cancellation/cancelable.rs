//! Settle-once awaitable with cancellation hooks.

use super::handle::{CancelHandle, Resolver};
use super::observers::ObserverList;
use crate::context::{Context, Registration};
use crate::errors::{CancelReason, Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll, Waker};
use tracing::{debug, warn};

/// Creator-supplied cleanup run when the awaitable is canceled.
///
/// It receives the cancellation error and returns the error the awaitable
/// settles with, so a handler can never turn a cancellation into success.
pub type CancelHandler = Box<dyn FnOnce(Error) -> Error + Send>;

/// Construction options for a [`Cancelable`].
#[derive(Default)]
pub struct CancelableOptions {
    on_cancel: Option<CancelHandler>,
    context: Option<Context>,
}

impl CancelableOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancel handler.
    #[must_use]
    pub fn with_cancel_handler<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Error) -> Error + Send + 'static,
    {
        self.on_cancel = Some(Box::new(handler));
        self
    }

    /// Attaches a context at construction.
    #[must_use]
    pub fn with_context(mut self, context: &Context) -> Self {
        self.context = Some(context.clone());
        self
    }
}

impl std::fmt::Debug for CancelableOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelableOptions")
            .field("has_cancel_handler", &self.on_cancel.is_some())
            .field("context", &self.context)
            .finish()
    }
}

struct ContextLink {
    context: Context,
    registration: Option<Registration>,
}

impl ContextLink {
    fn detach(self) {
        if let Some(registration) = self.registration {
            self.context.off(registration);
        }
    }
}

struct Pending<T> {
    task: Option<BoxFuture<'static, Result<T>>>,
    handler: Option<CancelHandler>,
    observers: ObserverList,
    context: Option<ContextLink>,
    waker: Option<Waker>,
}

/// Settlement latch. `Pending -> Settling -> Settled`, each step once.
enum State<T> {
    Pending(Pending<T>),
    /// Latch taken; handlers and observers are running.
    Settling(Option<Waker>),
    Settled(Option<Result<T>>),
}

impl<T> State<T> {
    /// Takes the latch. Only the first caller gets the pending parts.
    fn begin_settle(&mut self) -> Option<Pending<T>> {
        match std::mem::replace(self, Self::Settled(None)) {
            Self::Pending(mut pending) => {
                *self = Self::Settling(pending.waker.take());
                Some(pending)
            }
            other => {
                *self = other;
                None
            }
        }
    }
}

pub(super) struct Shared<T> {
    state: Mutex<State<T>>,
}

impl<T: Send + 'static> Shared<T> {
    pub(super) fn resolve(&self, result: Result<T>) -> bool {
        let pending = self.state.lock().begin_settle();
        let Some(Pending { task, context, .. }) = pending else {
            return false;
        };
        drop(task);
        if let Some(link) = context {
            link.detach();
        }
        self.finish(result);
        true
    }

    pub(super) fn cancel(&self, reason: CancelReason) -> bool {
        let pending = self.state.lock().begin_settle();
        let Some(Pending {
            task,
            handler,
            observers,
            context,
            ..
        }) = pending
        else {
            return false;
        };

        // Dropping the task releases what it owns, timers included.
        drop(task);
        if let Some(link) = context {
            link.detach();
        }
        debug!(%reason, "awaitable canceled");

        let mut error = Error::Canceled(reason);
        if let Some(handler) = handler {
            error = run_handler(handler, error);
        }
        observers.notify(reason);

        self.finish(Err(error));
        true
    }

    pub(super) fn is_settled(&self) -> bool {
        !matches!(*self.state.lock(), State::Pending(_))
    }

    fn finish(&self, result: Result<T>) {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Settled(Some(result)));
        if let State::Settling(Some(waker)) = previous {
            waker.wake();
        }
    }

    fn poll_output(&self, cx: &mut TaskContext<'_>) -> Poll<Result<T>> {
        match &mut *self.state.lock() {
            State::Pending(pending) => {
                store_waker(&mut pending.waker, cx);
                Poll::Pending
            }
            State::Settling(waker) => {
                store_waker(waker, cx);
                Poll::Pending
            }
            State::Settled(output) => Poll::Ready(take_output(output)),
        }
    }
}

fn run_handler(handler: CancelHandler, error: Error) -> Error {
    let fallback = error.clone();
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || handler(error))).unwrap_or_else(
        |panic| {
            warn!("Cancel handler panicked: {:?}", panic);
            fallback
        },
    )
}

fn store_waker(slot: &mut Option<Waker>, cx: &TaskContext<'_>) {
    match slot {
        Some(waker) if waker.will_wake(cx.waker()) => {}
        _ => *slot = Some(cx.waker().clone()),
    }
}

fn take_output<T>(output: &mut Option<Result<T>>) -> Result<T> {
    output
        .take()
        .unwrap_or_else(|| panic!("`Cancelable` polled after completion"))
}

/// An awaitable that settles exactly once, either with its value or with a
/// cancellation error.
///
/// Cancellation can come from an attached [`Context`], from
/// [`Cancelable::cancel`] or a [`CancelHandle`], or from dropping the
/// awaitable while it is pending. On cancellation the wrapped future is
/// dropped first, then the cancel handler runs, then observers run in
/// registration order, and only then is the awaiting task woken.
#[must_use = "dropping a pending Cancelable cancels it"]
pub struct Cancelable<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Cancelable<T> {
    /// Creates an awaitable settled through a [`Resolver`].
    ///
    /// The executor runs synchronously before this returns.
    pub fn new<E>(executor: E) -> Self
    where
        E: FnOnce(Resolver<T>),
    {
        Self::new_with_options(executor, CancelableOptions::new())
    }

    /// Creates an executor-style awaitable with options.
    pub fn new_with_options<E>(executor: E, options: CancelableOptions) -> Self
    where
        E: FnOnce(Resolver<T>),
    {
        let cancelable = Self::build(None, options);
        executor(Resolver::new(&cancelable.shared));
        cancelable
    }

    /// Wraps an existing future.
    ///
    /// The future is polled inline and dropped on cancellation.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::from_future_with_options(future, CancelableOptions::new())
    }

    /// Wraps an existing future with options.
    pub fn from_future_with_options<F>(future: F, options: CancelableOptions) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::build(Some(future.boxed()), options)
    }

    fn build(task: Option<BoxFuture<'static, Result<T>>>, options: CancelableOptions) -> Self {
        let CancelableOptions { on_cancel, context } = options;
        let cancelable = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending(Pending {
                    task,
                    handler: on_cancel,
                    observers: ObserverList::new(),
                    context: context.as_ref().map(|context| ContextLink {
                        context: context.clone(),
                        registration: None,
                    }),
                    waker: None,
                })),
            }),
        };
        if let Some(context) = context {
            cancelable.subscribe(&context);
        }
        cancelable
    }

    /// Attaches a cancellation context.
    ///
    /// A no-op once settled. Fails with [`Error::ContextAlreadyAttached`] if
    /// a context is already attached; the awaitable is left untouched.
    pub fn attach(&self, context: &Context) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            let State::Pending(pending) = &mut *state else {
                return Ok(());
            };
            if pending.context.is_some() {
                return Err(Error::ContextAlreadyAttached);
            }
            pending.context = Some(ContextLink {
                context: context.clone(),
                registration: None,
            });
        }
        self.subscribe(context);
        Ok(())
    }

    /// Builder form of [`Cancelable::attach`].
    ///
    /// On error the awaitable is dropped, which cancels it.
    pub fn set_context(self, context: &Context) -> Result<Self> {
        self.attach(context)?;
        Ok(self)
    }

    fn subscribe(&self, context: &Context) {
        let shared = Arc::downgrade(&self.shared);
        let registration = context.on_done(move |reason| {
            if let Some(shared) = shared.upgrade() {
                shared.cancel(reason);
            }
        });

        let mut state = self.shared.state.lock();
        if let State::Pending(pending) = &mut *state {
            if let Some(link) = pending.context.as_mut() {
                link.registration = Some(registration);
                return;
            }
        }
        drop(state);
        // Settled while subscribing.
        context.off(registration);
    }

    /// Registers a cancellation observer.
    ///
    /// Observers run once, in registration order, only if the awaitable is
    /// canceled. Registering after settlement is a no-op.
    pub fn on_cancel<F>(self, observer: F) -> Self
    where
        F: FnOnce(CancelReason) + Send + 'static,
    {
        if let State::Pending(pending) = &mut *self.shared.state.lock() {
            pending.observers.push(Box::new(observer));
        }
        self
    }

    /// Cancels the awaitable.
    ///
    /// Returns true if this call settled it; later calls are no-ops.
    pub fn cancel(&self) -> bool {
        self.shared.cancel(CancelReason::Canceled)
    }

    /// Returns a handle that can cancel the awaitable while it is awaited.
    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        CancelHandle::new(&self.shared)
    }

    /// Returns true once the settlement latch is taken.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }
}

impl<T: Send + 'static> Future for Cancelable<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let shared = &self.shared;
        let mut task = {
            let mut state = shared.state.lock();
            match &mut *state {
                State::Pending(pending) => {
                    store_waker(&mut pending.waker, cx);
                    match pending.task.take() {
                        Some(task) => task,
                        None => return Poll::Pending,
                    }
                }
                State::Settling(waker) => {
                    store_waker(waker, cx);
                    return Poll::Pending;
                }
                State::Settled(output) => return Poll::Ready(take_output(output)),
            }
        };

        // Polled without the lock so the task may cancel other awaitables.
        let polled = task.as_mut().poll(cx);
        match polled {
            Poll::Ready(result) => {
                drop(task);
                shared.resolve(result);
            }
            Poll::Pending => {
                let mut state = shared.state.lock();
                if let State::Pending(pending) = &mut *state {
                    pending.task = Some(task);
                    return Poll::Pending;
                }
                drop(state);
                // Canceled while we were polling.
                drop(task);
            }
        }
        shared.poll_output(cx)
    }
}

impl<T: Send + 'static> Drop for Cancelable<T> {
    fn drop(&mut self) {
        self.shared.cancel(CancelReason::Dropped);
    }
}

impl<T: Send + 'static> std::fmt::Debug for Cancelable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancelable")
            .field("settled", &self.is_settled())
            .finish()
    }
}
