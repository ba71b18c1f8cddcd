//! Query console engine.
//!
//! [`QueryConsole`] owns a store backend and turns one console line
//! into one [`Response`]. Every failure anywhere in the pipeline is
//! caught and reported as a `success: false` payload with the error
//! message; nothing here panics on user input.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ast::ShellCommand;
use crate::dispatch;
use crate::error::{ShellError, ShellResult};
use crate::parser;
use crate::store::{DocumentStore, StoreError};

/// Outcome of executing one console line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_query: Option<ExecutedQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Echo of what actually ran, for display alongside the result.
#[derive(Debug, Serialize)]
pub struct ExecutedQuery {
    pub collection: String,
    pub method: String,
    pub args: serde_json::Value,
}

impl Response {
    fn ok(result: serde_json::Value, cmd: &ShellCommand) -> Self {
        Self {
            success: true,
            result: Some(result),
            executed_query: Some(ExecutedQuery {
                collection: cmd.collection.clone(),
                method: cmd.method.clone(),
                args: serde_json::Value::Array(cmd.args.iter().map(|a| a.to_json()).collect()),
            }),
            error: None,
        }
    }

    fn err(err: &ShellError) -> Self {
        Self {
            success: false,
            result: None,
            executed_query: None,
            error: Some(err.to_string()),
        }
    }
}

/// The console: parses lines, plans operations, runs them against the
/// configured store.
pub struct QueryConsole<S> {
    store: S,
}

impl<S: DocumentStore> QueryConsole<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Execute one console line. Never returns Err: failures become
    /// `success: false` responses.
    pub async fn execute(&self, line: &str) -> Response {
        self.execute_at(line, Utc::now()).await
    }

    /// Execute with an injected clock for `new Date()` resolution.
    pub async fn execute_at(&self, line: &str, now: DateTime<Utc>) -> Response {
        match self.run(line, now).await {
            Ok(response) => response,
            Err(err) => Response::err(&err),
        }
    }

    async fn run(&self, line: &str, now: DateTime<Utc>) -> ShellResult<Response> {
        let cmd = parser::parse_at(line, now)?;
        let op = dispatch::plan(&cmd)?;
        let result = self
            .store
            .execute(&cmd.collection, op)
            .await
            .map_err(|e| match e {
                // Store-enforced schema rejections read like the
                // pre-dispatch validator's.
                StoreError::Schema(msg) => ShellError::Validation(msg),
                StoreError::Backend(msg) => ShellError::Store(msg),
            })?;
        Ok(Response::ok(result, &cmd))
    }
}
