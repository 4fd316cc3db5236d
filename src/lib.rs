//! This crate contains a pure untyped lambda calculus interpreter: a
//! tokenizer, a recursive descent parser and a reduction engine that drives
//! expressions to normal form against a table of named definitions.

pub mod box_tree_impl;
pub mod diagnostics;
pub mod end_to_end;
pub mod environment;
pub mod lexical_analysis;
pub mod module_loader;
pub mod session;
