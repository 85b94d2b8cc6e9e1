//! Bounded stack traces
//!
//! Captures the current backtrace and writes at most `max_frames` frames to a
//! [`DiagnosticSink`]. Nothing here panics or returns an error.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic;

/// Frames printed when the caller does not ask for a specific depth
pub const DEFAULT_MAX_FRAMES: usize = 10;

/// Log target for crash diagnostics
pub const CRASH_LOG_TARGET: &str = "void_shadow::crash";

/// Destination for diagnostic lines
pub trait DiagnosticSink {
    fn write_line(&mut self, line: &str);
}

/// Writes to the `log` facade at error level under [`CRASH_LOG_TARGET`]
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn write_line(&mut self, line: &str) {
        log::error!(target: CRASH_LOG_TARGET, "{}", line);
    }
}

impl DiagnosticSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_owned());
    }
}

/// Format the current backtrace as at most `max_frames` lines.
///
/// Each frame is `#<index> <symbol>` followed by ` at <file:line>` when the
/// location is known.
pub fn format_stack_trace(max_frames: usize) -> Vec<String> {
    let backtrace = Backtrace::force_capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_frames(&backtrace.to_string(), max_frames)
}

fn parse_frames(rendered: &str, max_frames: usize) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();

    for line in rendered.lines() {
        let trimmed = line.trim();

        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.push_str(" at ");
                last.push_str(location);
            }
            continue;
        }

        let Some((index, symbol)) = trimmed.split_once(": ") else {
            continue;
        };
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if frames.len() == max_frames {
            break;
        }
        frames.push(format!("#{} {}", index, symbol));
    }

    frames
}

/// Write at most `max_frames` frames of the current stack to the log
pub fn print_stack_trace(max_frames: usize) {
    print_stack_trace_to(max_frames, &mut LogSink);
}

/// Write at most `max_frames` frames of the current stack to `sink`
pub fn print_stack_trace_to(max_frames: usize, sink: &mut dyn DiagnosticSink) {
    let frames = format_stack_trace(max_frames);
    if frames.is_empty() {
        sink.write_line("stack trace unavailable");
        return;
    }

    sink.write_line(&format!("stack trace ({} frame(s)):", frames.len()));
    for frame in &frames {
        sink.write_line(frame);
    }
}

/// Install a panic hook that logs the panic followed by a bounded backtrace.
///
/// The previous hook still runs afterwards.
pub fn install_crash_hook(max_frames: usize) {
    install_crash_hook_with(max_frames, || LogSink);
}

/// Like [`install_crash_hook`], writing to a sink created per panic
pub fn install_crash_hook_with<F, S>(max_frames: usize, make_sink: F)
where
    F: Fn() -> S + Send + Sync + 'static,
    S: DiagnosticSink,
{
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let mut sink = make_sink();
        sink.write_line(&format!("panic: {}", info));
        print_stack_trace_to(max_frames, &mut sink);
        previous(info);
    }));
}
