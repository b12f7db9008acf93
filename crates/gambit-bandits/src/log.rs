// Warnings go through `tracing` with the `telemetry` feature and fall back to
// stderr without it. Debug events are dropped when `telemetry` is off.

macro_rules! warn_event {
    ($($arg:tt)+) => {{
        #[cfg(feature = "telemetry")]
        {
            tracing::warn!($($arg)+);
        }
        #[cfg(not(feature = "telemetry"))]
        {
            eprintln!($($arg)+);
        }
    }};
}

macro_rules! debug_event {
    ($($arg:tt)+) => {{
        #[cfg(feature = "telemetry")]
        {
            tracing::debug!($($arg)+);
        }
        #[cfg(not(feature = "telemetry"))]
        {
            if false {
                eprintln!($($arg)+);
            }
        }
    }};
}
