mod signal_sink;
mod ws_signaling;

pub use signal_sink::*;
pub use ws_signaling::*;
