use std::time::Duration;

pub const S     : Duration = Duration::from_secs(1);
pub const MS    : Duration = Duration::from_millis(1);
pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR  : Duration = Duration::from_secs(60 * 60);
