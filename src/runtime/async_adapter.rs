//! Start/finish pairs as one awaitable operation.
//!
//! ```text
//! call_async(args) ──► start(instance, args.., ready, token)
//!                                   │
//!                  native completion│ ready(source, result, token)
//!                                   ▼
//!                          oneshot::Sender<Value> (first delivery only)
//!                                   │
//! awaited result  ◄── finish(instance, result) ◄──┘
//! ```
//!
//! The ready callback is synthesized from a one-shot channel and never comes
//! from the caller. The native side owns it until it fires; if it is dropped
//! without firing, the operation fails with [`AsyncError::CompletionDropped`].

use std::sync::{Arc, Mutex, PoisonError};

use log::{trace, warn};
use nativebind_compiler::AsyncPlan;
use nativebind_core::{AsyncError, BindResult, MarshalError};
use tokio::sync::oneshot;

use super::{CallResult, Runtime};
use crate::dispatcher::NativeDispatcher;
use crate::value::{Callback, Value};

/// Position of the result token in a ready callback's arguments.
const RESULT_TOKEN_ARG: usize = 1;

impl<D: NativeDispatcher + 'static> Runtime<D> {
    /// Run an async pair: issue the start call, wait for native completion,
    /// then finish with the same instance and the completion token.
    pub async fn call_async(
        &self,
        plan: &AsyncPlan,
        instance: Option<&Value>,
        args: &[Value],
    ) -> BindResult<CallResult> {
        if args.len() > plan.arity() {
            return Err(MarshalError::TooManyArguments {
                callable: plan.name.clone(),
                expected: plan.arity(),
                actual: args.len(),
            }
            .into());
        }
        if let Some(missing) = plan.params.iter().skip(args.len()).find(|p| !p.optional) {
            return Err(MarshalError::MissingArgument(missing.name.clone()).into());
        }

        let (ready, completion) = ready_callback(&plan.name);
        {
            // Only the native side may keep the ready callback past this call.
            let mut start_args: Vec<Value> = args.to_vec();
            if start_args.len() < plan.callback_param {
                start_args.resize(plan.callback_param, Value::Null);
            }
            start_args.insert(plan.callback_param, Value::Callback(ready));
            self.invoke(&plan.start, instance, &start_args)?;
        }

        let token = completion
            .await
            .map_err(|_| AsyncError::CompletionDropped(plan.name.clone()))?;
        if token.is_null() {
            return Err(AsyncError::MissingResultToken(plan.name.clone()).into());
        }
        trace!("{} completed", plan.name);

        self.invoke(&plan.finish, instance, &[token])
    }

    /// Run async method `name` of class `owner`.
    pub async fn call_async_method(
        &self,
        owner: &str,
        name: &str,
        instance: Option<&Value>,
        args: &[Value],
    ) -> BindResult<CallResult> {
        let compiled = self.namespace_of(owner)?;
        let plan = compiled
            .class(owner)
            .and_then(|class| class.async_method(name))
            .cloned()
            .ok_or_else(|| MarshalError::UnknownCallable(format!("{owner}.{name}")))?;
        self.call_async(&plan, instance, args).await
    }
}

/// Ready callback forwarding the first result token it receives.
fn ready_callback(operation: &str) -> (Callback, oneshot::Receiver<Value>) {
    let (tx, rx) = oneshot::channel();
    let sender = Arc::new(Mutex::new(Some(tx)));
    let operation = operation.to_string();

    let callback = Callback::new(move |args| {
        let token = args.get(RESULT_TOKEN_ARG).cloned().unwrap_or_default();
        let pending = sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(tx) => {
                if tx.send(token).is_err() {
                    warn!("{operation} completed after its caller went away");
                }
            }
            None => warn!("ignoring repeated completion of {operation}"),
        }
        Value::Null
    });
    (callback, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativebind_core::NativeHandle;

    #[test]
    fn ready_callback_delivers_once() {
        let (ready, mut rx) = ready_callback("demo");
        let first = Value::Pointer(NativeHandle::from_addr(0x40));
        let second = Value::Pointer(NativeHandle::from_addr(0x80));

        ready.invoke(&[Value::Null, first.clone(), Value::Null]);
        ready.invoke(&[Value::Null, second, Value::Null]);

        assert_eq!(rx.try_recv().ok(), Some(first));
    }

    #[test]
    fn dropped_ready_callback_closes_channel() {
        let (ready, mut rx) = ready_callback("demo");
        drop(ready);
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
