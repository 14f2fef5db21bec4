use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use log::{debug, log_enabled, trace, Level};

use identify::mimetype_map::mimetype_map;

/// Log target of the step by step trace of transforms.
pub const LOG_TARGET: &str = "transformer_debug";

/// Log target of the one line summary of each transform.
pub const INFO_LOG_TARGET: &str = "transformer_info";

const FINISHED_IN: &str = "Finished in ";
const SIZE_UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

struct Frame {
    id: u32,
    child_count: u32,
    transformer_name: String,
    source_mimetype: String,
    target_mimetype: String,
    source_size: i64,
    start: Instant,
    failure_reason: Option<String>,
}

#[derive(Default)]
struct State {
    stack: Vec<Frame>,
    capture: Option<String>,
}

/// Traces a transform request and the transforms nested inside it.
///
/// Each transform is a frame with a reference such as `12.1.2`: the request number followed by the position of
/// each nested transform within its parent. Lines are logged at debug level under [`LOG_TARGET`] for the request
/// and at trace level for nested detail. Popping a frame logs a summary line under [`INFO_LOG_TARGET`] with the
/// elapsed time and, if the transform failed, the root cause.
///
/// The debug lines can also be captured into a buffer with [`TransformerDebug::capture`], in which case the
/// request is always numbered `1`.
///
#[derive(Default)]
pub struct TransformerDebug {
    state: Mutex<State>,
}

impl TransformerDebug {
    /// Create a tracer for one request.
    ///
    pub fn new() -> Self {
        Self::default()
    }

    /// Start capturing debug lines.
    ///
    pub fn capture(&self) {
        self.lock().capture.get_or_insert_with(String::new);
    }

    /// The lines captured so far, if capturing.
    ///
    pub fn captured(&self) -> Option<String> {
        self.lock().capture.clone()
    }

    /// Whether a transform is in progress.
    ///
    pub fn is_active(&self) -> bool {
        !self.lock().stack.is_empty()
    }

    /// Start tracing a transform.
    ///
    /// # Arguments
    ///
    /// * `transformer_name` - The transformer about to run.
    /// * `source_mimetype` - The source mimetype.
    /// * `target_mimetype` - The target mimetype.
    /// * `source_size` - The source size in bytes, or -1 if unknown.
    /// * `rendition` - The rendition the transform is for, if any.
    ///
    pub fn push_transform(
        &self,
        transformer_name: &str,
        source_mimetype: &str,
        target_mimetype: &str,
        source_size: i64,
        rendition: Option<&str>,
    ) {
        let mut state = self.lock();
        let id = match state.stack.last_mut() {
            Some(parent) => {
                parent.child_count += 1;
                parent.child_count
            }
            None => NEXT_ID.fetch_add(1, Ordering::Relaxed),
        };
        state.stack.push(Frame {
            id,
            child_count: 0,
            transformer_name: transformer_name.to_string(),
            source_mimetype: source_mimetype.to_string(),
            target_mimetype: target_mimetype.to_string(),
            source_size,
            start: Instant::now(),
            failure_reason: None,
        });

        let first_level = state.stack.len() == 1;
        let mut details = format!("{}{}", extension(source_mimetype), extension(target_mimetype));
        if source_size >= 0 {
            details.push_str(&file_size(source_size));
            details.push(' ');
        }
        if let (true, Some(rendition)) = (first_level, rendition) {
            details.push_str(&format!("-- {} -- ", rendition));
        }
        details.push_str(transformer_name);

        log(&mut state, &format!("{} {}", source_mimetype, target_mimetype), false);
        log(&mut state, &details, true);
    }

    /// Finish tracing the current transform, logging its summary.
    ///
    pub fn pop_transform(&self) {
        let mut state = self.lock();
        let Some(frame) = state.stack.last() else {
            return;
        };

        let first_level = state.stack.len() == 1;
        let ms = ms(frame.start.elapsed().as_millis() as u64);
        let level = if frame.failure_reason.is_some() { "ERROR" } else { "INFO" };
        let mut summary = format!(
            "{}{}{}{} ",
            reference(&state.stack, first_level, false),
            extension(&frame.source_mimetype),
            extension(&frame.target_mimetype),
            level
        );
        if frame.source_size >= 0 {
            summary.push(' ');
            summary.push_str(&file_size(frame.source_size));
        }
        summary.push(' ');
        summary.push_str(&ms);
        summary.push(' ');
        summary.push_str(&frame.transformer_name);
        if let Some(reason) = &frame.failure_reason {
            summary.push(' ');
            summary.push_str(reason.trim());
        }

        if first_level {
            debug!(target: INFO_LOG_TARGET, "{}", summary);
        } else {
            trace!(target: INFO_LOG_TARGET, "{}", summary);
        }
        if first_level || log_enabled!(target: LOG_TARGET, Level::Trace) {
            log(&mut state, &format!("{}{}", FINISHED_IN, ms), first_level);
        }
        state.stack.pop();
    }

    /// Log a message against the current transform.
    ///
    pub fn debug(&self, message: &str) {
        log(&mut self.lock(), message, true);
    }

    /// Log a message and an error against the current transform, and record the root cause of the error as the
    /// reason it failed.
    ///
    /// Only the first line of an error message of the form `"Failed... : \n details"` is logged.
    ///
    pub fn debug_error(&self, message: &str, error: &(dyn Error + 'static)) {
        let error_message = error.to_string();
        let error_message = match error_message.find(": \n") {
            Some(end) => &error_message[..end],
            None => error_message.as_str(),
        };

        let mut state = self.lock();
        log(&mut state, &format!("{} {}", message, error_message), true);
        if let Some(frame) = state.stack.last_mut() {
            frame.failure_reason = Some(format!("{} {}", message, root_cause_message(error)));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn log(state: &mut State, message: &str, debug: bool) {
    if debug {
        debug!(target: LOG_TARGET, "{}{}", reference(&state.stack, false, false), message);
        if let Some(capture) = state.capture.as_mut() {
            capture.push_str(&reference(&state.stack, false, true));
            capture.push_str(message);
            capture.push('\n');
        }
    } else {
        trace!(target: LOG_TARGET, "{}{}", reference(&state.stack, false, false), message);
    }
}

/// The `N.N.N` reference of the current frame, padded to a fixed width.
///
/// With `first_level_only` just the request number and a space. With `override_first_level` the request is
/// numbered `1`.
///
fn reference(stack: &[Frame], first_level_only: bool, override_first_level: bool) -> String {
    let Some(first) = stack.first() else {
        return String::new();
    };

    let mut reference = if override_first_level { "1".to_string() } else { first.id.to_string() };
    if first_level_only {
        reference.push(' ');
        return reference;
    }

    let first_length = reference.len();
    for frame in &stack[1..] {
        reference.push('.');
        reference.push_str(&frame.id.to_string());
    }
    let padding = (13 + first_length).saturating_sub(reference.len());
    reference.push_str(&" ".repeat(padding));
    reference
}

fn root_cause_message(error: &(dyn Error + 'static)) -> String {
    let mut cause = error;
    while let Some(source) = cause.source() {
        cause = source;
    }
    let message = cause.to_string();
    if message.is_empty() {
        "unknown error".to_string()
    } else {
        message
    }
}

/// The preferred extension of a mimetype, padded to 4 characters and followed by a space.
///
fn extension(mimetype: &str) -> String {
    format!("{:<4} ", mimetype_map().extension(mimetype))
}

/// Format a duration in milliseconds with thousands separators, such as `1,234 ms`.
///
pub fn ms(millis: u64) -> String {
    let digits = millis.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{} ms", grouped)
}

/// Format a size in bytes, such as `1 byte`, `1.5 KB` or `2 MB`. Negative sizes are `unlimited`.
///
pub fn file_size(size: i64) -> String {
    if size < 0 {
        return "unlimited".to_string();
    }
    if size == 1 {
        return "1 byte".to_string();
    }

    let mut divider: i64 = 1;
    let mut unit = SIZE_UNITS[SIZE_UNITS.len() - 1];
    for (i, candidate) in SIZE_UNITS.iter().enumerate() {
        if i == SIZE_UNITS.len() - 1 || size < divider * 1024 {
            unit = candidate;
            break;
        }
        divider *= 1024;
    }

    let tenths = (size as i128 * 10 / divider as i128) as i64;
    match tenths % 10 {
        0 => format!("{} {}", tenths / 10, unit),
        decimal => format!("{}.{} {}", tenths / 10, decimal, unit),
    }
}
