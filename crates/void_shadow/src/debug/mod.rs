//! Debug and diagnostics utilities
//!
//! Crash-time diagnostics for the shadow renderer:
//!
//! - **Stack traces**: bounded backtraces written to the diagnostic log
//! - **Crash hook**: panic hook that logs the panic and its backtrace

pub mod stack_trace;

pub use stack_trace::{
    format_stack_trace, install_crash_hook, install_crash_hook_with, print_stack_trace,
    print_stack_trace_to, DiagnosticSink, LogSink, CRASH_LOG_TARGET, DEFAULT_MAX_FRAMES,
};
