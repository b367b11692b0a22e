/// Defines the data structures for log records.
pub mod logrecord;
/// Implements an injected local logger with TTY, file and in-memory output.
pub mod loggerlocal;
