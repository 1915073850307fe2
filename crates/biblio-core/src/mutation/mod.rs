//! Named, scripted record mutations
//!
//! A `MutationEngine` is a closed table of mutators built once per record
//! type. Applying a script runs each step in order against an in-memory
//! record; the first failing step aborts the script and nothing is saved.

pub mod batch;
pub mod dataset;
pub mod publication;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One step of a mutation script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(alias = "op")]
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Source line of the step, when it came from a batch input
    #[serde(skip)]
    pub line: Option<usize>,
}

impl Mutation {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// A mutation step that could not be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render(.message, .line))]
pub struct ArgumentError {
    pub message: String,
    pub line: Option<usize>,
}

fn render(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("line {}: {}", line, message),
        None => message.to_string(),
    }
}

impl ArgumentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn unknown(name: &str) -> Self {
        Self::new(format!("unknown mutation \"{}\"", name))
    }

    pub fn arity(name: &str, expected: usize, got: usize) -> Self {
        Self::new(format!(
            "{} expects {} argument{}, got {}",
            name,
            expected,
            if expected == 1 { "" } else { "s" },
            got
        ))
    }

    pub fn at_line(mut self, line: Option<usize>) -> Self {
        if self.line.is_none() {
            self.line = line;
        }
        self
    }
}

/// A mutator: edits a record in place from string arguments
pub type Mutator<R> = Arc<dyn Fn(&mut R, &[String]) -> Result<(), ArgumentError> + Send + Sync>;

/// Check an exact argument count
///
/// # Errors
///
/// `ArgumentError` naming the mutation when the count differs.
pub fn expect_args(name: &str, args: &[String], n: usize) -> Result<(), ArgumentError> {
    if args.len() != n {
        return Err(ArgumentError::arity(name, n, args.len()));
    }
    Ok(())
}

/// Check that at least one argument was given
///
/// # Errors
///
/// `ArgumentError` naming the mutation when `args` is empty.
pub fn expect_some_args(name: &str, args: &[String]) -> Result<(), ArgumentError> {
    if args.is_empty() {
        return Err(ArgumentError::new(format!(
            "{} expects at least 1 argument, got 0",
            name
        )));
    }
    Ok(())
}

/// The single argument of a one-argument mutation
///
/// # Errors
///
/// `ArgumentError` when there is not exactly one argument.
pub fn single_arg<'a>(name: &str, args: &'a [String]) -> Result<&'a str, ArgumentError> {
    expect_args(name, args, 1)?;
    Ok(args[0].as_str())
}

/// Closed name → mutator table for one record type
pub struct MutationEngine<R> {
    table: HashMap<String, Mutator<R>>,
}

impl<R> Clone for MutationEngine<R> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
        }
    }
}

impl<R> fmt::Debug for MutationEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationEngine")
            .field("mutations", &self.names())
            .finish()
    }
}

impl<R> MutationEngine<R> {
    pub fn builder() -> MutationEngineBuilder<R> {
        MutationEngineBuilder {
            table: HashMap::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// Registered mutation names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Apply `mutations` in order, stopping at the first failure.
    ///
    /// The record may be partially modified on error; callers discard it.
    ///
    /// # Errors
    ///
    /// `ArgumentError` for an unknown name or a rejected argument list,
    /// carrying the step's line when known.
    pub fn apply(&self, record: &mut R, mutations: &[Mutation]) -> Result<(), ArgumentError> {
        for m in mutations {
            let mutator = self
                .table
                .get(&m.name)
                .ok_or_else(|| ArgumentError::unknown(&m.name).at_line(m.line))?;
            mutator(record, &m.args).map_err(|e| e.at_line(m.line))?;
        }
        Ok(())
    }
}

pub struct MutationEngineBuilder<R> {
    table: HashMap<String, Mutator<R>>,
}

impl<R> MutationEngineBuilder<R> {
    /// Register a mutator; a later registration under the same name wins
    pub fn register<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut R, &[String]) -> Result<(), ArgumentError> + Send + Sync + 'static,
    {
        self.table.insert(name.into(), Arc::new(f));
        self
    }

    pub fn build(self) -> MutationEngine<R> {
        MutationEngine { table: self.table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_engine() -> MutationEngine<Vec<String>> {
        MutationEngine::builder()
            .register("push", |v: &mut Vec<String>, args: &[String]| {
                v.push(single_arg("push", args)?.to_string());
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_apply_in_order() {
        let engine = counter_engine();
        let mut v = Vec::new();
        engine
            .apply(
                &mut v,
                &[Mutation::new("push", ["a"]), Mutation::new("push", ["b"])],
            )
            .unwrap();
        assert_eq!(v, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unknown_mutation_carries_line() {
        let engine = counter_engine();
        let err = engine
            .apply(
                &mut Vec::new(),
                &[Mutation::new("bogus", Vec::<String>::new()).at_line(7)],
            )
            .unwrap_err();
        assert_eq!(err.message, "unknown mutation \"bogus\"");
        assert_eq!(err.line, Some(7));
        assert_eq!(err.to_string(), "line 7: unknown mutation \"bogus\"");
    }

    #[test]
    fn test_arity_error() {
        let engine = counter_engine();
        let err = engine
            .apply(&mut Vec::new(), &[Mutation::new("push", ["a", "b"])])
            .unwrap_err();
        assert_eq!(err.message, "push expects 1 argument, got 2");
        assert_eq!(err.line, None);
    }
}
