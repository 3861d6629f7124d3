use crate::model::IceServerConfig;

pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_3: &str = "stun:stun2.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_4: &str = "stun:stun3.l.google.com:19302";

/// Public STUN servers used when nothing else is configured.
pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig::stun(vec![
        DEFAULT_STUN_ADDR.to_owned(),
        DEFAULT_STUN_ADDR_2.to_owned(),
        DEFAULT_STUN_ADDR_3.to_owned(),
        DEFAULT_STUN_ADDR_4.to_owned(),
    ])]
}

/// Milliseconds since the Unix epoch, as stamped on chat messages.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
