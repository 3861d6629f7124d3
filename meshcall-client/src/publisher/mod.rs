mod local_tracks;
mod surface_registry;
mod track_publisher;

pub use local_tracks::*;
pub use surface_registry::*;
pub use track_publisher::*;
