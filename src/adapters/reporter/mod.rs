//! Operator channel reporters.

pub mod console;

pub use console::ConsoleReporter;
