//! Request hooks and the one-shot finalizer.
//!
//! A [`Hook`] is an ordered list of handlers. Each handler receives the
//! event and a [`Next`] continuation; calling `next.run(event)` proceeds to
//! the following handler and finally to the default action supplied by the
//! caller of [`Hook::trigger`]. A handler that returns without calling
//! `next` stops the chain.

use crate::error::{ApiResponse, ApiResult};
use parking_lot::RwLock;
use rulebase_core::catalog::Collection;
use rulebase_core::query::ListResult;
use rulebase_core::record::{random_string, Record};
use rulebase_core::security::RequestInfo;
use std::sync::Arc;

/// Hook handler function.
pub type HandlerFn<E> = Arc<dyn Fn(&mut E, Next<'_, E>) -> ApiResult<()> + Send + Sync>;

struct Handler<E> {
    id: String,
    priority: i32,
    func: HandlerFn<E>,
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            priority: self.priority,
            func: self.func.clone(),
        }
    }
}

/// Continuation passed to a handler.
pub struct Next<'a, E> {
    handlers: &'a [Handler<E>],
    action: &'a mut dyn FnMut(&mut E) -> ApiResult<()>,
}

impl<E> Next<'_, E> {
    /// Continue with the remaining handlers and the default action.
    pub fn run(self, event: &mut E) -> ApiResult<()> {
        match self.handlers.split_first() {
            Some((handler, rest)) => (handler.func)(
                event,
                Next {
                    handlers: rest,
                    action: self.action,
                },
            ),
            None => (self.action)(event),
        }
    }
}

/// An ordered list of handlers for one event type.
pub struct Hook<E> {
    handlers: RwLock<Vec<Handler<E>>>,
}

impl<E> Default for Hook<E> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }
}

impl<E> std::fmt::Debug for Hook<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

impl<E> Hook<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler with priority 0 and return its generated id.
    pub fn bind_fn<F>(&self, func: F) -> String
    where
        F: Fn(&mut E, Next<'_, E>) -> ApiResult<()> + Send + Sync + 'static,
    {
        let id = format!("__h_{}", random_string(12));
        self.bind(id.clone(), 0, func);
        id
    }

    /// Register a handler. Lower priorities run first; handlers with equal
    /// priority run in registration order. An existing handler with the
    /// same id is replaced.
    pub fn bind<F>(&self, id: impl Into<String>, priority: i32, func: F)
    where
        F: Fn(&mut E, Next<'_, E>) -> ApiResult<()> + Send + Sync + 'static,
    {
        let id = id.into();
        let mut handlers = self.handlers.write();
        handlers.retain(|h| h.id != id);
        handlers.push(Handler {
            id,
            priority,
            func: Arc::new(func),
        });
        handlers.sort_by_key(|h| h.priority);
    }

    /// Remove the handler with the given id.
    pub fn unbind(&self, id: &str) {
        self.handlers.write().retain(|h| h.id != id);
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Run the handler chain, ending with `action`.
    ///
    /// `action` runs at most once, and not at all when a handler stops the
    /// chain. Handlers bound while the chain runs take effect on the next
    /// trigger.
    pub fn trigger<F>(&self, event: &mut E, action: F) -> ApiResult<()>
    where
        F: FnOnce(&mut E) -> ApiResult<()>,
    {
        let handlers = self.handlers.read().clone();
        let mut action = Some(action);
        let mut once = |event: &mut E| match action.take() {
            Some(action) => action(event),
            None => Ok(()),
        };
        Next {
            handlers: &handlers,
            action: &mut once,
        }
        .run(event)
    }
}

/// Event of the view, create, update and delete requests.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub collection: Arc<Collection>,
    /// Record being served or written; handlers may replace it.
    pub record: Record,
    pub request: Arc<RequestInfo>,
    /// Response written by the default action.
    pub response: Option<ApiResponse>,
}

impl RecordEvent {
    pub fn new(collection: Arc<Collection>, record: Record, request: Arc<RequestInfo>) -> Self {
        Self {
            collection,
            record,
            request,
            response: None,
        }
    }
}

impl Hook<RecordEvent> {
    /// Trigger the chain and run `callback` exactly once if it succeeds.
    ///
    /// The callback runs inline as the last step of the default action, or
    /// after the chain returns when a handler stopped it before the action.
    /// It does not run when the chain or the action fails.
    pub fn trigger_finalized<F>(
        &self,
        event: &mut RecordEvent,
        callback: Option<FinalizerFn>,
        action: F,
    ) -> ApiResult<()>
    where
        F: FnOnce(&mut RecordEvent) -> ApiResult<()>,
    {
        let mut finalizer = Finalizer::new(callback);
        self.trigger(event, |e| {
            action(e)?;
            finalizer.run(&e.record)
        })?;
        finalizer.run(&event.record)
    }
}

/// Event of the list request.
#[derive(Debug, Clone)]
pub struct RecordsListEvent {
    pub collection: Arc<Collection>,
    /// Page of matched records; handlers may replace it.
    pub result: ListResult<Record>,
    pub request: Arc<RequestInfo>,
    pub response: Option<ApiResponse>,
}

/// Hook registry of the record API.
#[derive(Debug, Default)]
pub struct Hooks {
    pub on_records_list_request: Hook<RecordsListEvent>,
    pub on_record_view_request: Hook<RecordEvent>,
    pub on_record_create_request: Hook<RecordEvent>,
    pub on_record_update_request: Hook<RecordEvent>,
    pub on_record_delete_request: Hook<RecordEvent>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Callback run after a successful write.
pub type FinalizerFn = Box<dyn FnOnce(&Record) -> ApiResult<()> + Send>;

/// A finalizer that runs at most once.
///
/// Driven by [`Hook::trigger_finalized`]; see there for when it runs.
#[derive(Default)]
pub struct Finalizer {
    callback: Option<FinalizerFn>,
}

impl Finalizer {
    pub fn new(callback: Option<FinalizerFn>) -> Self {
        Self { callback }
    }

    /// Run the callback unless it already ran.
    pub fn run(&mut self, record: &Record) -> ApiResult<()> {
        match self.callback.take() {
            Some(callback) => callback(record),
            None => Ok(()),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.callback.is_some()
    }
}

impl std::fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finalizer")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_handlers_run_in_priority_order() {
        let hook: Hook<Vec<&'static str>> = Hook::new();
        hook.bind("b", 10, |e: &mut Vec<&'static str>, next: Next<'_, _>| {
            e.push("b");
            next.run(e)
        });
        hook.bind("a", -5, |e: &mut Vec<&'static str>, next: Next<'_, _>| {
            e.push("a");
            next.run(e)
        });

        let mut event = Vec::new();
        hook.trigger(&mut event, |e| {
            e.push("action");
            Ok(())
        })
        .unwrap();
        assert_eq!(event, vec!["a", "b", "action"]);
    }

    #[test]
    fn test_handler_can_stop_the_chain() {
        let hook: Hook<Vec<&'static str>> = Hook::new();
        hook.bind_fn(|e: &mut Vec<&'static str>, _next: Next<'_, _>| {
            e.push("stop");
            Ok(())
        });

        let mut event = Vec::new();
        hook.trigger(&mut event, |e| {
            e.push("action");
            Ok(())
        })
        .unwrap();
        assert_eq!(event, vec!["stop"]);
    }

    #[test]
    fn test_action_runs_once_through_a_handler() {
        let hook: Hook<usize> = Hook::new();
        hook.bind_fn(|e: &mut usize, next: Next<'_, usize>| next.run(e));

        let calls = AtomicUsize::new(0);
        let mut event = 0;
        hook.trigger(&mut event, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_propagate() {
        let hook: Hook<()> = Hook::new();
        hook.bind_fn(|_: &mut (), _: Next<'_, ()>| Err(ApiError::bad_request("nope")));
        let err = hook.trigger(&mut (), |_| Ok(())).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_unbind_and_replace() {
        let hook: Hook<()> = Hook::new();
        let id = hook.bind_fn(|_: &mut (), next: Next<'_, ()>| next.run(&mut ()));
        hook.bind("fixed", 0, |_: &mut (), next: Next<'_, ()>| next.run(&mut ()));
        hook.bind("fixed", 1, |_: &mut (), next: Next<'_, ()>| next.run(&mut ()));
        assert_eq!(hook.len(), 2);
        hook.unbind(&id);
        assert_eq!(hook.len(), 1);
    }

    #[test]
    fn test_finalizer_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut finalizer = Finalizer::new(Some(Box::new(move |_: &Record| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));

        let record = Record::new(Arc::new(Collection::new("posts")));
        assert!(finalizer.is_pending());
        finalizer.run(&record).unwrap();
        finalizer.run(&record).unwrap();
        assert!(!finalizer.is_pending());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn counting_finalizer(calls: &Arc<AtomicUsize>) -> Option<FinalizerFn> {
        let counter = calls.clone();
        Some(Box::new(move |_: &Record| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    fn record_event() -> RecordEvent {
        let collection = Arc::new(Collection::new("posts"));
        RecordEvent::new(
            collection.clone(),
            Record::new(collection),
            Arc::new(RequestInfo::anonymous()),
        )
    }

    #[test]
    fn test_trigger_finalized_completed_chain() {
        let hook: Hook<RecordEvent> = Hook::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        hook.bind_fn(move |e: &mut RecordEvent, next: Next<'_, _>| {
            next.run(e)?;
            // inline run already happened by the time the chain unwinds
            assert_eq!(seen.load(Ordering::SeqCst), 1);
            Ok(())
        });

        let mut event = record_event();
        hook.trigger_finalized(&mut event, counting_finalizer(&calls), |_| Ok(()))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trigger_finalized_stopped_chain() {
        let hook: Hook<RecordEvent> = Hook::new();
        hook.bind_fn(|_: &mut RecordEvent, _: Next<'_, _>| Ok(()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut event = record_event();
        let mut action_ran = false;
        hook.trigger_finalized(&mut event, counting_finalizer(&calls), |_| {
            action_ran = true;
            Ok(())
        })
        .unwrap();
        assert!(!action_ran);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trigger_finalized_skips_on_error() {
        let hook: Hook<RecordEvent> = Hook::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut event = record_event();
        let result = hook.trigger_finalized(&mut event, counting_finalizer(&calls), |_| {
            Err(ApiError::bad_request("write failed"))
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = hook.trigger_finalized(&mut record_event(), None, |_| Ok(()));
        assert!(result.is_ok());
    }
}
