/// In debug builds, panics like `panic!`. In release builds, logs via
/// `tracing::error!` and lets the caller degrade instead of aborting the
/// whole reactor over a single misbehaving connection.
///
/// Used at the spec's "Fatal" error class (§7): invariant violations such
/// as a protocol reporting a message size larger than the available bytes.
#[macro_export]
macro_rules! safe_panic {
    ($($arg:tt)*) => (if cfg!(debug_assertions) { panic!($($arg)*); } else { tracing::error!($($arg)*) })
}
