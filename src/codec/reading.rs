// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Reading wire layout
//!
//! The layout reproduces the naturally aligned canonical record field by
//! field, pad bytes included, so that peers built against that record keep
//! reading the stream unchanged. Rules:
//!
//! - `f32` fields are packed floats, nulls travel as the wire sentinel;
//!   `u16`/`i32` are big-endian
//! - single `u8` fields are copied as is
//! - adjacent `u8` pairs travel as one byte-swapped 16-bit unit, i.e. the
//!   second field of the pair comes first on the wire
//! - pad bytes are written as zero and ignored on decode

use super::cursor::{ByteReader, ByteWriter};
use super::CodecError;
use crate::records::reading::EXTRA_SENSOR_SLOTS;
use crate::records::Reading;

/// Encoded size of one reading.
pub const READING_WIRE_SIZE: usize = 340;

fn put_pair(writer: &mut ByteWriter, first: u8, second: u8) {
    writer.put_u8(second).put_u8(first);
}

fn take_pair(reader: &mut ByteReader<'_>) -> Result<(u8, u8), CodecError> {
    let second = reader.u8()?;
    let first = reader.u8()?;
    Ok((first, second))
}

pub fn encode_reading(r: &Reading) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(READING_WIRE_SIZE);

    for value in [r.barometer, r.station_pressure, r.altimeter, r.in_temp, r.out_temp] {
        w.put_nullable_f32(value);
    }
    for value in [
        r.in_humidity,
        r.out_humidity,
        r.wind_speed,
        r.wind_dir,
        r.wind_gust,
        r.wind_gust_dir,
    ] {
        w.put_u16_be(value);
    }
    for value in [r.rain_rate, r.sample_rain, r.sample_et] {
        w.put_nullable_f32(value);
    }
    w.put_u16_be(r.radiation).put_zeros(2);
    for value in [r.uv, r.dewpoint, r.windchill, r.heatindex, r.storm_rain] {
        w.put_nullable_f32(value);
    }
    w.put_i32_be(r.storm_start);
    for value in [
        r.day_rain,
        r.month_rain,
        r.year_rain,
        r.day_et,
        r.month_et,
        r.year_et,
        r.interval_avg_wchill,
    ] {
        w.put_nullable_f32(value);
    }
    for value in [
        r.interval_avg_wspeed,
        r.year_rain_month,
        r.rx_check_percent,
        r.ten_minute_avg_wind_speed,
        r.forecast_icon,
        r.forecast_rule,
        r.tx_battery_status,
        r.cons_battery_voltage,
    ] {
        w.put_u16_be(value);
    }
    for value in [
        r.extra_temp1,
        r.extra_temp2,
        r.extra_temp3,
        r.soil_temp1,
        r.soil_temp2,
        r.soil_temp3,
        r.soil_temp4,
        r.leaf_temp1,
        r.leaf_temp2,
    ] {
        w.put_nullable_f32(value);
    }
    put_pair(&mut w, r.extra_humid1, r.extra_humid2);
    put_pair(&mut w, r.soil_moist1, r.soil_moist2);
    put_pair(&mut w, r.leaf_wet1, r.leaf_wet2);
    w.put_zeros(2);

    for value in [
        r.hail,
        r.hail_rate,
        r.heating_temp,
        r.heating_voltage,
        r.supply_voltage,
        r.reference_voltage,
        r.rain_duration,
        r.rain_peak_rate,
        r.hail_duration,
        r.hail_peak_rate,
        r.wxt_rain,
        r.pool_temp,
    ] {
        w.put_nullable_f32(value);
    }
    put_pair(&mut w, r.humid3, r.tendency);
    put_pair(&mut w, r.wind_battery, r.rain_battery);
    put_pair(&mut w, r.out_temp_battery, r.in_temp_battery);
    put_pair(&mut w, r.pool_battery, r.extra1_battery);
    put_pair(&mut w, r.extra2_battery, r.extra3_battery);
    w.put_zeros(2);

    for value in r.extra_temp {
        w.put_nullable_f32(value);
    }
    for value in r.extra_humidity {
        w.put_u16_be(value);
    }
    w.put_bytes(&[
        r.wind_battery_status,
        r.rain_battery_status,
        r.out_temp_battery_status,
        r.console_battery_status,
        r.uv_battery_status,
        r.solar_battery_status,
    ]);
    w.put_bytes(&r.extra_temp_battery_status);
    w.put_zeros(2);

    w.into_inner()
}

pub fn decode_reading(bytes: &[u8]) -> Result<Reading, CodecError> {
    if bytes.len() != READING_WIRE_SIZE {
        return Err(CodecError::BadLength {
            expected: READING_WIRE_SIZE,
            actual: bytes.len(),
        });
    }

    let mut rd = ByteReader::new(bytes);
    let mut r = Reading::default();

    r.barometer = rd.nullable_f32()?;
    r.station_pressure = rd.nullable_f32()?;
    r.altimeter = rd.nullable_f32()?;
    r.in_temp = rd.nullable_f32()?;
    r.out_temp = rd.nullable_f32()?;
    r.in_humidity = rd.u16_be()?;
    r.out_humidity = rd.u16_be()?;
    r.wind_speed = rd.u16_be()?;
    r.wind_dir = rd.u16_be()?;
    r.wind_gust = rd.u16_be()?;
    r.wind_gust_dir = rd.u16_be()?;
    r.rain_rate = rd.nullable_f32()?;
    r.sample_rain = rd.nullable_f32()?;
    r.sample_et = rd.nullable_f32()?;
    r.radiation = rd.u16_be()?;
    rd.skip(2)?;
    r.uv = rd.nullable_f32()?;
    r.dewpoint = rd.nullable_f32()?;
    r.windchill = rd.nullable_f32()?;
    r.heatindex = rd.nullable_f32()?;
    r.storm_rain = rd.nullable_f32()?;
    r.storm_start = rd.i32_be()?;
    r.day_rain = rd.nullable_f32()?;
    r.month_rain = rd.nullable_f32()?;
    r.year_rain = rd.nullable_f32()?;
    r.day_et = rd.nullable_f32()?;
    r.month_et = rd.nullable_f32()?;
    r.year_et = rd.nullable_f32()?;
    r.interval_avg_wchill = rd.nullable_f32()?;
    r.interval_avg_wspeed = rd.u16_be()?;
    r.year_rain_month = rd.u16_be()?;
    r.rx_check_percent = rd.u16_be()?;
    r.ten_minute_avg_wind_speed = rd.u16_be()?;
    r.forecast_icon = rd.u16_be()?;
    r.forecast_rule = rd.u16_be()?;
    r.tx_battery_status = rd.u16_be()?;
    r.cons_battery_voltage = rd.u16_be()?;
    r.extra_temp1 = rd.nullable_f32()?;
    r.extra_temp2 = rd.nullable_f32()?;
    r.extra_temp3 = rd.nullable_f32()?;
    r.soil_temp1 = rd.nullable_f32()?;
    r.soil_temp2 = rd.nullable_f32()?;
    r.soil_temp3 = rd.nullable_f32()?;
    r.soil_temp4 = rd.nullable_f32()?;
    r.leaf_temp1 = rd.nullable_f32()?;
    r.leaf_temp2 = rd.nullable_f32()?;
    (r.extra_humid1, r.extra_humid2) = take_pair(&mut rd)?;
    (r.soil_moist1, r.soil_moist2) = take_pair(&mut rd)?;
    (r.leaf_wet1, r.leaf_wet2) = take_pair(&mut rd)?;
    rd.skip(2)?;

    r.hail = rd.nullable_f32()?;
    r.hail_rate = rd.nullable_f32()?;
    r.heating_temp = rd.nullable_f32()?;
    r.heating_voltage = rd.nullable_f32()?;
    r.supply_voltage = rd.nullable_f32()?;
    r.reference_voltage = rd.nullable_f32()?;
    r.rain_duration = rd.nullable_f32()?;
    r.rain_peak_rate = rd.nullable_f32()?;
    r.hail_duration = rd.nullable_f32()?;
    r.hail_peak_rate = rd.nullable_f32()?;
    r.wxt_rain = rd.nullable_f32()?;
    r.pool_temp = rd.nullable_f32()?;
    (r.humid3, r.tendency) = take_pair(&mut rd)?;
    (r.wind_battery, r.rain_battery) = take_pair(&mut rd)?;
    (r.out_temp_battery, r.in_temp_battery) = take_pair(&mut rd)?;
    (r.pool_battery, r.extra1_battery) = take_pair(&mut rd)?;
    (r.extra2_battery, r.extra3_battery) = take_pair(&mut rd)?;
    rd.skip(2)?;

    for slot in r.extra_temp.iter_mut() {
        *slot = rd.nullable_f32()?;
    }
    for slot in r.extra_humidity.iter_mut() {
        *slot = rd.u16_be()?;
    }
    r.wind_battery_status = rd.u8()?;
    r.rain_battery_status = rd.u8()?;
    r.out_temp_battery_status = rd.u8()?;
    r.console_battery_status = rd.u8()?;
    r.uv_battery_status = rd.u8()?;
    r.solar_battery_status = rd.u8()?;
    r.extra_temp_battery_status
        .copy_from_slice(rd.take(EXTRA_SENSOR_SLOTS)?);
    rd.skip(2)?;

    Ok(r)
}
