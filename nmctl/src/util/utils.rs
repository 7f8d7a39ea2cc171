//! Conversions for values published in network lists.

use std::borrow::Cow;

use log::warn;

use crate::types::constants::{frequency, signal_strength, wifi_mode};

/// Channel number for a centre frequency in MHz, `0` outside the 2.4, 5 and
/// 6 GHz bands.
pub(crate) fn channel(mhz: u32) -> u32 {
    use frequency::*;
    match mhz {
        BAND_2_4_START..=BAND_2_4_END => (mhz - BAND_2_4_START) / CHANNEL_SPACING + 1,
        BAND_2_4_CH14 => 14,
        // 5 GHz channels count from 5000 MHz.
        BAND_5_START..=BAND_5_END => (mhz - 5000) / CHANNEL_SPACING,
        BAND_6_START..=BAND_6_END => (mhz - BAND_6_START) / CHANNEL_SPACING + 1,
        _ => 0,
    }
}

/// Four-cell signal meter, one filled cell per quarter.
pub(crate) fn signal_bars(strength: u8) -> &'static str {
    use signal_strength::*;
    match strength {
        0..=BAR_1_MAX => "▂___",
        BAR_2_MIN..=BAR_2_MAX => "▂▄__",
        BAR_3_MIN..=BAR_3_MAX => "▂▄▆_",
        _ => "▂▄▆█",
    }
}

pub(crate) fn mode_name(mode: u32) -> &'static str {
    match mode {
        wifi_mode::ADHOC => "adhoc",
        wifi_mode::INFRA => "infrastructure",
        wifi_mode::AP => "ap",
        _ => "unknown",
    }
}

/// SSID bytes as text. Hidden networks and SSIDs that are not UTF-8 come
/// back empty and are left out of network lists.
pub(crate) fn ssid_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(e) => {
            warn!("Skipping SSID that is not UTF-8: {e}");
            Cow::Borrowed("")
        }
    }
}

/// Unwraps a `Result` inside a function returning `Option`, logging the
/// error with `context` and returning `None` on failure.
#[macro_export]
macro_rules! try_log {
    ($result:expr, $context:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{}: {:?}", $context, e);
                return None;
            }
        }
    };
}
