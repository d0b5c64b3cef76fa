use time::OffsetDateTime;

pub trait TimeSource {
    fn current_time(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
pub use manual::ManualTime;
