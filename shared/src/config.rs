use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

pub const WIDTH_RANGE: RangeInclusive<i32> = 10..=100;
pub const HEIGHT_RANGE: RangeInclusive<i32> = 10..=100;
pub const FOOD_STATIC_RANGE: RangeInclusive<u32> = 0..=100;
pub const STATE_DELAY_RANGE_MS: RangeInclusive<u64> = 100..=3000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Rules of one game, chosen by whoever creates it and advertised to joiners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub width: i32,
    pub height: i32,
    pub food_static: u32,
    pub state_delay_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 40,
            height: 30,
            food_static: 1,
            state_delay_ms: 1000,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("width", self.width as i64, &to_i64(&WIDTH_RANGE))?;
        check("height", self.height as i64, &to_i64(&HEIGHT_RANGE))?;
        check(
            "food_static",
            self.food_static as i64,
            &(*FOOD_STATIC_RANGE.start() as i64..=*FOOD_STATIC_RANGE.end() as i64),
        )?;
        check(
            "state_delay_ms",
            self.state_delay_ms as i64,
            &(*STATE_DELAY_RANGE_MS.start() as i64..=*STATE_DELAY_RANGE_MS.end() as i64),
        )
    }

    pub fn state_delay(&self) -> Duration {
        Duration::from_millis(self.state_delay_ms)
    }

    /// Silence longer than this triggers a Ping.
    pub fn ping_after(&self) -> Duration {
        Duration::from_millis(self.state_delay_ms / 10)
    }

    /// Silence longer than this marks a peer as gone.
    pub fn disconnect_after(&self) -> Duration {
        Duration::from_millis(self.state_delay_ms * 4 / 5)
    }

    /// Unacknowledged messages older than this are sent again.
    pub fn resend_after(&self) -> Duration {
        Duration::from_millis(self.state_delay_ms / 5)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_millis((self.state_delay_ms / 10).max(1))
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis((self.state_delay_ms / 10).max(1))
    }
}

fn to_i64(range: &RangeInclusive<i32>) -> RangeInclusive<i64> {
    *range.start() as i64..=*range.end() as i64
}

fn check(field: &'static str, value: i64, range: &RangeInclusive<i64>) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}
