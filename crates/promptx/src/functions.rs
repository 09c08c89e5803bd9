use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use tokio::runtime::{self, Handle, RuntimeFlavor};
use tokio::task;
use tracing::{debug, error};

use crate::errors::{PromptError, PromptResult};
use crate::models::function::FunctionDef;

/// Boxed future returned by a [`FunctionHandler`]
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Type-erased handler stored in the registry
pub type FunctionHandler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// A callable function: its advertised definition plus the handler that runs it
#[derive(Clone)]
pub struct Function {
    def: FunctionDef,
    handler: FunctionHandler,
}

impl Function {
    pub fn new<F, Fut, T>(def: FunctionDef, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + 'static,
    {
        let handler: FunctionHandler = Arc::new(move |args| {
            handler(args)
                .map(|res| res.and_then(|v| Ok(serde_json::to_value(v)?)))
                .boxed()
        });
        Self { def, handler }
    }

    pub fn def(&self) -> &FunctionDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Run the handler. A failing handler never aborts the caller: the error
    /// is logged and the result becomes `null` so the model can react to it.
    pub async fn invoke(&self, args: Value) -> Value {
        debug!(function = %self.def.name, %args, "invoking function");
        match (self.handler)(args).await {
            Ok(value) => value,
            Err(err) => {
                error!(function = %self.def.name, error = %format!("{err:#}"), "function handler failed");
                Value::Null
            }
        }
    }

    /// Run the handler from synchronous code such as a template function.
    ///
    /// On a multi-thread runtime the worker is handed off with
    /// `block_in_place` and the handler is driven by that runtime. Anywhere
    /// else (a current-thread runtime, or none) the handler runs on a scoped
    /// helper thread with its own current-thread runtime, so awaiting tokio
    /// timers or IO never stalls the caller's executor.
    pub fn invoke_blocking(&self, args: Value) -> Value {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                task::block_in_place(|| handle.block_on(self.invoke(args)))
            }
            _ => thread::scope(|scope| {
                let helper = scope.spawn(|| {
                    match runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(rt) => rt.block_on(self.invoke(args)),
                        Err(err) => {
                            error!(function = %self.def.name, error = %err, "could not start a runtime for the handler");
                            Value::Null
                        }
                    }
                });
                helper.join().unwrap_or_else(|_| {
                    error!(function = %self.def.name, "function handler panicked");
                    Value::Null
                })
            }),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("def", &self.def).finish()
    }
}

/// Ordered set of functions keyed by name. Registering a name twice replaces
/// the earlier function in place.
#[derive(Clone, Default, Debug)]
pub struct FunctionRegistry {
    functions: Vec<Arc<Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. `None` parameters mean an empty schema.
    pub fn register<N, D, F, Fut, T>(
        &mut self,
        name: N,
        description: D,
        parameters: Option<Value>,
        handler: F,
    ) where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + 'static,
    {
        let def = FunctionDef::new(name, description, parameters);
        self.insert(Function::new(def, handler));
    }

    pub fn insert(&mut self, function: Function) {
        let function = Arc::new(function);
        match self
            .functions
            .iter_mut()
            .find(|f| f.name() == function.name())
        {
            Some(existing) => *existing = function,
            None => self.functions.push(function),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Function>> {
        self.functions.iter().find(|f| f.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Execute the named function with `args`
    pub async fn call(&self, name: &str, args: Value) -> PromptResult<Value> {
        let function = self
            .get(name)
            .ok_or_else(|| PromptError::FunctionNotFound(name.to_string()))?;
        Ok(function.invoke(args).await)
    }

    /// Add every function of `other` whose name is not registered here yet
    pub fn inherit(&mut self, other: &FunctionRegistry) {
        for function in &other.functions {
            if !self.contains(function.name()) {
                self.functions.push(function.clone());
            }
        }
    }

    pub fn definitions(&self) -> Vec<FunctionDef> {
        self.functions.iter().map(|f| f.def().clone()).collect()
    }

    /// The catalogue text injected into instructions, one entry per function
    pub fn catalogue(&self) -> String {
        self.functions
            .iter()
            .map(|f| f.def().catalogue_entry())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Function>> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
