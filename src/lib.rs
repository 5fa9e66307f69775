//! `retrodrive` - retrospective form automation with an LLM generation proxy
//!
//! A timer-driven phase engine walks a retrospective form through its
//! screens, injecting generated text on the writing screen. The text comes
//! from a small HTTP proxy (or an in-process backend) that talks to Claude,
//! Gemini or Ollama and falls back to a fixed template when they fail.

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod observability;
pub mod page;
pub mod phase;
pub mod proxy;
