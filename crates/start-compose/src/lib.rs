//! Prompt composition: role + ordered contexts + task.

mod composer;

pub use composer::{compose, Composed, ComposedContext, ComposeOptions, ContextSelection};
