// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Archive record and its channel table

/// Value stored in an archive channel that has no measurement.
pub const ARCHIVE_VALUE_NULL: f32 = -100000.0;

/// Unit system marker for US customary units (the only one produced).
pub const US_UNITS: i32 = 1;

/// Number of value channels in an archive record.
pub const CHANNEL_COUNT: usize = 49;

/// Returns `true` when an archive value carries the "no data" sentinel.
pub fn is_null(value: f32) -> bool {
    value <= ARCHIVE_VALUE_NULL
}

/// Archive channels in wire order.
///
/// The discriminant is the index of the channel inside
/// [`ArchiveRecord::values`] and inside the encoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Channel {
    Barometer = 0,
    Pressure,
    Altimeter,
    InTemp,
    OutTemp,
    InHumidity,
    OutHumidity,
    WindSpeed,
    WindDir,
    WindGust,
    WindGustDir,
    RainRate,
    Rain,
    Dewpoint,
    Windchill,
    Heatindex,
    RxCheckPercent,
    Et,
    Radiation,
    Uv,
    ExtraTemp1,
    ExtraTemp2,
    ExtraTemp3,
    SoilTemp1,
    SoilTemp2,
    SoilTemp3,
    SoilTemp4,
    LeafTemp1,
    LeafTemp2,
    ExtraHumid1,
    ExtraHumid2,
    SoilMoist1,
    SoilMoist2,
    SoilMoist3,
    SoilMoist4,
    LeafWet1,
    LeafWet2,
    TxBatteryStatus,
    ConsBatteryVoltage,
    Hail,
    HailRate,
    HeatingTemp,
    HeatingVoltage,
    SupplyVoltage,
    ReferenceVoltage,
    WindBatteryStatus,
    RainBatteryStatus,
    OutTempBatteryStatus,
    InTempBatteryStatus,
}

impl Channel {
    /// All channels, in wire order.
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Barometer,
        Channel::Pressure,
        Channel::Altimeter,
        Channel::InTemp,
        Channel::OutTemp,
        Channel::InHumidity,
        Channel::OutHumidity,
        Channel::WindSpeed,
        Channel::WindDir,
        Channel::WindGust,
        Channel::WindGustDir,
        Channel::RainRate,
        Channel::Rain,
        Channel::Dewpoint,
        Channel::Windchill,
        Channel::Heatindex,
        Channel::RxCheckPercent,
        Channel::Et,
        Channel::Radiation,
        Channel::Uv,
        Channel::ExtraTemp1,
        Channel::ExtraTemp2,
        Channel::ExtraTemp3,
        Channel::SoilTemp1,
        Channel::SoilTemp2,
        Channel::SoilTemp3,
        Channel::SoilTemp4,
        Channel::LeafTemp1,
        Channel::LeafTemp2,
        Channel::ExtraHumid1,
        Channel::ExtraHumid2,
        Channel::SoilMoist1,
        Channel::SoilMoist2,
        Channel::SoilMoist3,
        Channel::SoilMoist4,
        Channel::LeafWet1,
        Channel::LeafWet2,
        Channel::TxBatteryStatus,
        Channel::ConsBatteryVoltage,
        Channel::Hail,
        Channel::HailRate,
        Channel::HeatingTemp,
        Channel::HeatingVoltage,
        Channel::SupplyVoltage,
        Channel::ReferenceVoltage,
        Channel::WindBatteryStatus,
        Channel::RainBatteryStatus,
        Channel::OutTempBatteryStatus,
        Channel::InTempBatteryStatus,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One fixed-interval archive record.
///
/// Records of a dataset share the same `interval` and are appended in
/// strictly increasing `date_time` order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    /// Unix time of the end of the archive interval
    pub date_time: i32,
    /// Unit system, [`US_UNITS`] for everything this crate produces
    pub us_units: i32,
    /// Archive interval in minutes
    pub interval: i32,
    /// Channel values indexed by [`Channel`]
    pub values: [f32; CHANNEL_COUNT],
}

impl ArchiveRecord {
    /// Create a record with every channel set to [`ARCHIVE_VALUE_NULL`].
    pub fn new(date_time: i32, interval: i32) -> Self {
        Self {
            date_time,
            us_units: US_UNITS,
            interval,
            values: [ARCHIVE_VALUE_NULL; CHANNEL_COUNT],
        }
    }

    /// The all-zero record, used on the datafeed to say "no record".
    pub fn zeroed() -> Self {
        Self {
            date_time: 0,
            us_units: 0,
            interval: 0,
            values: [0.0; CHANNEL_COUNT],
        }
    }

    pub fn get(&self, channel: Channel) -> f32 {
        self.values[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: f32) {
        self.values[channel.index()] = value;
    }

    /// Value of a channel, or `None` when it holds the null sentinel.
    pub fn value(&self, channel: Channel) -> Option<f32> {
        let value = self.get(channel);
        if is_null(value) {
            None
        } else {
            Some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_table_matches_wire_order() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
        assert_eq!(Channel::InTempBatteryStatus.index(), CHANNEL_COUNT - 1);
    }

    #[test]
    fn test_new_record_is_all_null() {
        let mut record = ArchiveRecord::new(1_700_000_000, 5);
        assert_eq!(record.us_units, US_UNITS);
        assert!(record.values.iter().all(|v| is_null(*v)));
        assert_eq!(record.value(Channel::OutTemp), None);

        record.set(Channel::OutTemp, 72.5);
        assert_eq!(record.value(Channel::OutTemp), Some(72.5));
    }
}
