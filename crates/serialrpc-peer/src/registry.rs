use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serialrpc_frame::{Args, Shape, Value};
use tracing::debug;

use crate::error::{BoxError, PeerError, Result};

/// An action the peer may call.
pub type Handler = Arc<dyn Fn(&Args) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Actions callable by the peer, keyed by exact name and argument shape.
///
/// Cloning is cheap and clones share the same table, so the application can
/// keep registering while the receive thread looks actions up.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<RwLock<HashMap<(String, Shape), Handler>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for calls to `name` with arguments of `shape`.
    ///
    /// Registering the same name and shape again replaces the handler.
    pub fn register<F>(&self, name: impl Into<String>, shape: Shape, handler: F)
    where
        F: Fn(&Args) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(action = %name, %shape, "registering action");
        let mut actions = self.actions.write().unwrap_or_else(|p| p.into_inner());
        actions.insert((name, shape), Arc::new(handler));
    }

    /// `void name()`.
    pub fn register_void<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn() -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register(name, Shape::Void, move |_| handler().map(|()| Value::Void));
    }

    /// `int name(int, int)`.
    pub fn register_int_pair<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(i32, i32) -> std::result::Result<i32, BoxError> + Send + Sync + 'static,
    {
        self.register(name, Shape::IntPair, move |args| match args {
            Args::IntPair(a, b) => handler(*a, *b).map(Value::Int),
            other => Err(shape_mismatch(Shape::IntPair, other)),
        });
    }

    /// `String name(String)`.
    pub fn register_str<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&str) -> std::result::Result<String, BoxError> + Send + Sync + 'static,
    {
        self.register(name, Shape::Str, move |args| match args {
            Args::Str(s) => handler(s).map(Value::Str),
            other => Err(shape_mismatch(Shape::Str, other)),
        });
    }

    /// `float name(float)`.
    pub fn register_float<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(f32) -> std::result::Result<f32, BoxError> + Send + Sync + 'static,
    {
        self.register(name, Shape::Float, move |args| match args {
            Args::Float(v) => handler(*v).map(Value::Float),
            other => Err(shape_mismatch(Shape::Float, other)),
        });
    }

    /// Whether an action is registered under exactly this name and shape.
    pub fn contains(&self, name: &str, shape: Shape) -> bool {
        self.read().contains_key(&(name.to_string(), shape))
    }

    /// Registered (name, shape) pairs, sorted.
    pub fn actions(&self) -> Vec<(String, Shape)> {
        let mut keys: Vec<_> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Run the action registered for `name` and the shape of `args`.
    ///
    /// There is no coercion between shapes. Handler errors and panics both
    /// come back as [`PeerError::ActionExecution`].
    pub fn invoke(&self, name: &str, args: &Args) -> Result<Value> {
        let shape = args.shape();
        let handler = self
            .read()
            .get(&(name.to_string(), shape))
            .cloned()
            .ok_or_else(|| PeerError::ActionNotFound {
                action: name.to_string(),
                shape,
            })?;

        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(PeerError::ActionExecution {
                action: name.to_string(),
                source,
            }),
            Err(panic) => Err(PeerError::ActionExecution {
                action: name.to_string(),
                source: format!("handler panicked: {}", panic_message(panic.as_ref())).into(),
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<(String, Shape), Handler>> {
        self.actions.read().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}

fn shape_mismatch(expected: Shape, got: &Args) -> BoxError {
    format!("expected {expected} arguments, got {}", got.shape()).into()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
