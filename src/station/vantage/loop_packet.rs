// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! LOOP packet layout
//!
//! 99 bytes, little-endian, starting with `LOO` and ending with LF CR and
//! the CRC. Raw console units: temperatures in tenths of °F (extra sensors
//! offset by 90), barometer in thousandths of inHg, rain in collector ticks.

use crate::codec::{ByteReader, ByteWriter, CodecError};

use super::protocol::{with_crc, CR, LF};

pub const LOOP_PACKET_SIZE: usize = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopPacket {
    pub bar_trend: u8,
    pub next_record: u16,
    pub barometer: u16,
    pub in_temp: i16,
    pub in_humidity: u8,
    pub out_temp: i16,
    pub wind_speed: u8,
    pub ten_minute_avg_wind_speed: u8,
    pub wind_dir: u16,
    pub extra_temps: [u8; 7],
    pub soil_temps: [u8; 4],
    pub leaf_temps: [u8; 4],
    pub out_humidity: u8,
    pub extra_humidities: [u8; 7],
    pub rain_rate: u16,
    pub uv: u8,
    pub radiation: u16,
    pub storm_rain: u16,
    pub storm_start_date: u16,
    pub day_rain: u16,
    pub month_rain: u16,
    pub year_rain: u16,
    pub day_et: u16,
    pub month_et: u16,
    pub year_et: u16,
    pub soil_moistures: [u8; 4],
    pub leaf_wetnesses: [u8; 4],
    pub alarms: [u8; 16],
    pub tx_battery_status: u8,
    pub cons_battery_voltage: u16,
    pub forecast_icon: u8,
    pub forecast_rule: u8,
    pub sunrise: u16,
    pub sunset: u16,
}

fn take_array<const N: usize>(reader: &mut ByteReader<'_>) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    out.copy_from_slice(reader.take(N)?);
    Ok(out)
}

impl LoopPacket {
    /// Decode a complete packet; the CRC is checked by the link layer.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != LOOP_PACKET_SIZE {
            return Err(CodecError::BadLength {
                expected: LOOP_PACKET_SIZE,
                actual: bytes.len(),
            });
        }

        let mut r = ByteReader::new(bytes);
        r.skip(3)?; // "LOO"
        let bar_trend = r.u8()?;
        r.skip(1)?; // packet type
        Ok(Self {
            bar_trend,
            next_record: r.u16_le()?,
            barometer: r.u16_le()?,
            in_temp: r.i16_le()?,
            in_humidity: r.u8()?,
            out_temp: r.i16_le()?,
            wind_speed: r.u8()?,
            ten_minute_avg_wind_speed: r.u8()?,
            wind_dir: r.u16_le()?,
            extra_temps: take_array(&mut r)?,
            soil_temps: take_array(&mut r)?,
            leaf_temps: take_array(&mut r)?,
            out_humidity: r.u8()?,
            extra_humidities: take_array(&mut r)?,
            rain_rate: r.u16_le()?,
            uv: r.u8()?,
            radiation: r.u16_le()?,
            storm_rain: r.u16_le()?,
            storm_start_date: r.u16_le()?,
            day_rain: r.u16_le()?,
            month_rain: r.u16_le()?,
            year_rain: r.u16_le()?,
            day_et: r.u16_le()?,
            month_et: r.u16_le()?,
            year_et: r.u16_le()?,
            soil_moistures: take_array(&mut r)?,
            leaf_wetnesses: take_array(&mut r)?,
            alarms: take_array(&mut r)?,
            tx_battery_status: r.u8()?,
            cons_battery_voltage: r.u16_le()?,
            forecast_icon: r.u8()?,
            forecast_rule: r.u8()?,
            sunrise: r.u16_le()?,
            sunset: r.u16_le()?,
        })
    }

    /// Encode as the console sends it, CRC included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(LOOP_PACKET_SIZE);
        w.put_bytes(b"LOO")
            .put_u8(self.bar_trend)
            .put_u8(0)
            .put_u16_le(self.next_record)
            .put_u16_le(self.barometer)
            .put_i16_le(self.in_temp)
            .put_u8(self.in_humidity)
            .put_i16_le(self.out_temp)
            .put_u8(self.wind_speed)
            .put_u8(self.ten_minute_avg_wind_speed)
            .put_u16_le(self.wind_dir)
            .put_bytes(&self.extra_temps)
            .put_bytes(&self.soil_temps)
            .put_bytes(&self.leaf_temps)
            .put_u8(self.out_humidity)
            .put_bytes(&self.extra_humidities)
            .put_u16_le(self.rain_rate)
            .put_u8(self.uv)
            .put_u16_le(self.radiation)
            .put_u16_le(self.storm_rain)
            .put_u16_le(self.storm_start_date)
            .put_u16_le(self.day_rain)
            .put_u16_le(self.month_rain)
            .put_u16_le(self.year_rain)
            .put_u16_le(self.day_et)
            .put_u16_le(self.month_et)
            .put_u16_le(self.year_et)
            .put_bytes(&self.soil_moistures)
            .put_bytes(&self.leaf_wetnesses)
            .put_bytes(&self.alarms)
            .put_u8(self.tx_battery_status)
            .put_u16_le(self.cons_battery_voltage)
            .put_u8(self.forecast_icon)
            .put_u8(self.forecast_rule)
            .put_u16_le(self.sunrise)
            .put_u16_le(self.sunset)
            .put_u8(LF)
            .put_u8(CR);
        with_crc(w.as_slice())
    }
}

impl Default for LoopPacket {
    /// A console with only the integrated sensor suite: every optional
    /// sensor reads as "not present".
    fn default() -> Self {
        Self {
            bar_trend: 0,
            next_record: 0,
            barometer: 0,
            in_temp: 0x7FFF,
            in_humidity: 0xFF,
            out_temp: 0x7FFF,
            wind_speed: 0xFF,
            ten_minute_avg_wind_speed: 0xFF,
            wind_dir: 0x7FFF,
            extra_temps: [0xFF; 7],
            soil_temps: [0xFF; 4],
            leaf_temps: [0xFF; 4],
            out_humidity: 0xFF,
            extra_humidities: [0xFF; 7],
            rain_rate: 0xFFFF,
            uv: 0xFF,
            radiation: 0x7FFF,
            storm_rain: 0,
            storm_start_date: 0xFFFF,
            day_rain: 0,
            month_rain: 0,
            year_rain: 0,
            day_et: 0,
            month_et: 0,
            year_et: 0,
            soil_moistures: [0xFF; 4],
            leaf_wetnesses: [0xFF; 4],
            alarms: [0; 16],
            tx_battery_status: 0,
            cons_battery_voltage: 0,
            forecast_icon: 0,
            forecast_rule: 0,
            sunrise: 0,
            sunset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::vantage::protocol::crc_valid;

    #[test]
    fn test_field_offsets() {
        let packet = LoopPacket {
            barometer: 29_921,
            out_temp: 725,
            day_rain: 0x0102,
            forecast_rule: 44,
            ..LoopPacket::default()
        };
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), LOOP_PACKET_SIZE);
        assert!(crc_valid(&bytes));
        assert_eq!(&bytes[..3], b"LOO");
        assert_eq!(u16::from_le_bytes([bytes[7], bytes[8]]), 29_921);
        assert_eq!(i16::from_le_bytes([bytes[12], bytes[13]]), 725);
        assert_eq!(&bytes[50..52], &[0x02, 0x01]);
        assert_eq!(bytes[90], 44);
        assert_eq!(&bytes[95..97], &[LF, CR]);

        assert_eq!(LoopPacket::parse(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_short_packet_rejected() {
        assert!(matches!(
            LoopPacket::parse(&[0u8; 40]),
            Err(CodecError::BadLength { expected: 99, actual: 40 })
        ));
    }
}
