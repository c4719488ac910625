use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use runq_core::job::{JobArgs, JobContext, Task};
use runq_core::{Result, RunqError};
use serde::Serialize;
use serde_json::Value;

/// Type alias for boxed job handler function.
pub type BoxedJobHandler =
    Arc<dyn Fn(JobContext, JobArgs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Entry in the handler registry.
pub struct HandlerEntry {
    /// Function name jobs refer to.
    pub name: String,
    /// Default timeout for jobs calling this function.
    pub timeout: Option<Duration>,
    /// Job handler function.
    pub handler: BoxedJobHandler,
}

/// Registry of the functions jobs may invoke, keyed by name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<HandlerEntry>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed task.
    pub fn register<T: Task>(&mut self) {
        let info = T::info();

        let handler: BoxedJobHandler = Arc::new(
            |ctx: JobContext, args: JobArgs| -> BoxFuture<'static, Result<Value>> {
                Box::pin(async move {
                    let parsed: T::Args = args.decode()?;
                    let output = T::execute(&ctx, parsed).await?;
                    serde_json::to_value(output)
                        .map_err(|e| RunqError::Serialization(e.to_string()))
                })
            },
        );

        self.insert(HandlerEntry {
            name: info.name.to_string(),
            timeout: info.timeout,
            handler,
        });
    }

    /// Register an async closure under `name`.
    pub fn register_fn<F, Fut, O>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(JobContext, JobArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Serialize,
    {
        let f = Arc::new(f);
        let handler: BoxedJobHandler = Arc::new(
            move |ctx: JobContext, args: JobArgs| -> BoxFuture<'static, Result<Value>> {
                let f = f.clone();
                // The closure runs on first poll so the executor's unwind guard covers it.
                Box::pin(async move {
                    let output = f(ctx, args).await?;
                    serde_json::to_value(output)
                        .map_err(|e| RunqError::Serialization(e.to_string()))
                })
            },
        );

        self.insert(HandlerEntry {
            name: name.into(),
            timeout: None,
            handler,
        });
    }

    fn insert(&mut self, entry: HandlerEntry) {
        if self.handlers.contains_key(&entry.name) {
            tracing::warn!(function = %entry.name, "Replacing registered job handler");
        }
        self.handlers.insert(entry.name.clone(), Arc::new(entry));
    }

    /// Get a handler entry by name.
    pub fn get(&self, name: &str) -> Option<Arc<HandlerEntry>> {
        self.handlers.get(name).cloned()
    }

    /// Check if a function is registered.
    pub fn exists(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Get all registered function names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }

    /// Get the number of registered functions.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use runq_core::job::{Job, TaskInfo};
    use serde_json::json;
    use std::pin::Pin;

    struct Multiply;

    impl Task for Multiply {
        type Args = (i64, i64);
        type Output = i64;

        fn info() -> TaskInfo {
            TaskInfo::new("multiply").with_timeout(Duration::from_secs(5))
        }

        fn execute(
            _ctx: &JobContext,
            (a, b): Self::Args,
        ) -> Pin<Box<dyn Future<Output = Result<Self::Output>> + Send + '_>> {
            Box::pin(async move { Ok(a * b) })
        }
    }

    fn ctx_for(job: &Job) -> JobContext {
        JobContext::new(job, "test-worker", Utc::now())
    }

    #[test]
    fn test_empty_registry() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn test_register_task() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Multiply>();

        let entry = registry.get("multiply").unwrap();
        assert_eq!(entry.timeout, Some(Duration::from_secs(5)));

        let job = Job::new("q", "multiply", JobArgs::positional([6, 7]));
        let out = (entry.handler)(ctx_for(&job), job.args.clone())
            .await
            .unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn test_task_argument_mismatch() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Multiply>();

        let entry = registry.get("multiply").unwrap();
        let job = Job::new("q", "multiply", JobArgs::positional(["six"]));
        let err = (entry.handler)(ctx_for(&job), job.args.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RunqError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_register_fn() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("greet", |ctx: JobContext, args: JobArgs| async move {
            let name: String = args.get(0)?;
            Ok::<_, RunqError>(format!("hello {} from {}", name, ctx.queue))
        });

        assert!(registry.exists("greet"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["greet"]);

        let entry = registry.get("greet").unwrap();
        let job = Job::new("inbox", "greet", JobArgs::positional(["ada"]));
        let out = (entry.handler)(ctx_for(&job), job.args.clone())
            .await
            .unwrap();
        assert_eq!(out, json!("hello ada from inbox"));
    }
}
