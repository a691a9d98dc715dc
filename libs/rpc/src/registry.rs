use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{kind, Fault};
use crate::key::FunctionKey;

/// A registered handler: positional arguments in, value or fault out.
pub type Handler = dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Fault>> + Send + Sync;

/// Maps function keys to locally invocable handlers.
///
/// Read concurrently by every connection task. Registration should finish
/// before the server starts listening; registering later is allowed but
/// races early connections, which may observe `NotRegistered` for keys
/// still being added.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<FunctionKey, Arc<Handler>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to an async handler. The last registration for a key
    /// wins; duplicates are not an error.
    pub fn register<F, Fut>(&self, key: FunctionKey, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
    {
        let boxed = move |args: Vec<Value>| -> BoxFuture<'static, Result<Value, Fault>> {
            Box::pin(handler(args))
        };
        self.entries
            .write()
            .expect("registry lock poisoned")
            .insert(key, Arc::new(boxed));
    }

    /// Bind `key` to a synchronous closure.
    pub fn register_fn<F>(&self, key: FunctionKey, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.register(key, move |args| {
            let f = Arc::clone(&f);
            async move { (*f)(args) }
        });
    }

    /// Look up the handler registered under `key`.
    pub fn lookup(&self, key: &FunctionKey) -> Option<Arc<Handler>> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deserialize the positional argument at `index`.
///
/// Missing arguments fault with `BadArity`; present-but-wrong-shape
/// arguments fault with `InvalidArgument`. Handlers use this to turn the
/// untyped argument list into typed values.
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, Fault> {
    let value = args.get(index).ok_or_else(|| {
        Fault::new(
            kind::BAD_ARITY,
            format!("missing argument {index}: got {} arguments", args.len()),
        )
    })?;
    serde_json::from_value(value.clone())
        .map_err(|e| Fault::new(kind::INVALID_ARGUMENT, format!("argument {index}: {e}")))
}
