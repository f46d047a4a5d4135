//! Binary decoders for SensorTag notification payloads.
//!
//! All public functions in this module are pure (no I/O, no logging, no
//! retained state) and can be called from any async or sync context.
//!
//! | Function | Sensor | Format |
//! |---|---|---|
//! | [`decode_ir_temperature`] | TMP007 | 2 × i16 LE, 1/128 °C/LSB |
//! | [`decode_humidity`] | HDC1000 | 2 × i16 LE, closed-form conversion |
//! | [`decode_pressure`] | BMP280 | 2 × 24-bit LE (fw ≥ 1.01) or 2 × 4/12-bit float (fw 0.89) |
//! | [`decode_luxometer`] | OPT3001 | 2 × i16 LE, 1/128 per LSB |
//! | [`decode_movement`] | MPU9250 | 9 × i16 LE, gyro / accel / mag groups |
//! | [`decode_simple_key`] | Buttons | 1 byte |
//!
//! Short payloads are rejected with [`DecodeError::BufferTooShort`]; nothing
//! is ever zero-padded.

use crate::error::DecodeError;
use crate::protocol::{
    ACCELEROMETER_SCALE, GYROSCOPE_SCALE, HUMIDITY_LEN, IR_TEMPERATURE_LEN, LUXOMETER_LEN,
    MAGNETOMETER_SCALE, MOVEMENT_LEN, PRESSURE_LEGACY_LEN, PRESSURE_LEN, SIMPLE_KEY_LEN,
    TEMPERATURE_SCALE,
};
use crate::types::{
    ButtonState, Humidity, Illuminance, ImuSample, IrTemperature, PhysicalReading, Pressure,
    Sensor, XyzSample,
};

// ── Primitives ────────────────────────────────────────────────────────────────

/// Read a little-endian signed 16-bit value at `offset` and multiply it by `scale`.
///
/// Returns `None` if fewer than two bytes remain at `offset`.
pub fn read_fixed_point(data: &[u8], offset: usize, scale: f64) -> Option<f64> {
    let end = offset.checked_add(2)?;
    let raw: [u8; 2] = data.get(offset..end)?.try_into().ok()?;
    Some(f64::from(i16::from_le_bytes(raw)) * scale)
}

/// Expand a 16-bit legacy float: 4-bit exponent in the high nibble, 12-bit
/// mantissa below it, in units of 1/100.
///
/// `value = mantissa × 2^exponent / 100`
pub fn legacy_float(raw: u16) -> f64 {
    let exponent = (raw & 0xf000) >> 12;
    let mantissa = raw & 0x0fff;
    f64::from(mantissa) * f64::from(1u32 << exponent) / 100.0
}

/// Read a little-endian legacy float at `offset`, see [`legacy_float`].
pub fn read_legacy_float(data: &[u8], offset: usize) -> Option<f64> {
    let end = offset.checked_add(2)?;
    let raw: [u8; 2] = data.get(offset..end)?.try_into().ok()?;
    Some(legacy_float(u16::from_le_bytes(raw)))
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let raw: [u8; 4] = data.get(offset..end)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// Fail with [`DecodeError::BufferTooShort`] unless `data` holds `needed` bytes.
fn require(sensor: Sensor, data: &[u8], needed: usize) -> Result<(), DecodeError> {
    if data.len() < needed {
        return Err(DecodeError::BufferTooShort {
            sensor,
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

/// A fixed-point field at an offset already covered by [`require`].
fn field(sensor: Sensor, data: &[u8], offset: usize, scale: f64) -> Result<f64, DecodeError> {
    read_fixed_point(data, offset, scale).ok_or(DecodeError::BufferTooShort {
        sensor,
        needed: offset + 2,
        actual: data.len(),
    })
}

// ── IR temperature / luxometer ────────────────────────────────────────────────

fn decode_object_ambient(sensor: Sensor, data: &[u8], len: usize) -> Result<(f64, f64), DecodeError> {
    require(sensor, data, len)?;
    let object = field(sensor, data, 0, TEMPERATURE_SCALE)?;
    let ambient = field(sensor, data, 2, TEMPERATURE_SCALE)?;
    Ok((object, ambient))
}

/// Decode a TMP007 notification.
///
/// ```
/// # use sensortag::parse::decode_ir_temperature;
/// let t = decode_ir_temperature(&[0x00, 0x02, 0x64, 0x00]).unwrap();
/// assert_eq!((t.object, t.ambient), (4.0, 0.78125));
/// ```
pub fn decode_ir_temperature(data: &[u8]) -> Result<IrTemperature, DecodeError> {
    let (object, ambient) = decode_object_ambient(Sensor::IrTemperature, data, IR_TEMPERATURE_LEN)?;
    Ok(IrTemperature { object, ambient })
}

/// Decode an OPT3001 notification with the two-field IR temperature routine.
pub fn decode_luxometer(data: &[u8]) -> Result<Illuminance, DecodeError> {
    let (lux, ambient) = decode_object_ambient(Sensor::Luxometer, data, LUXOMETER_LEN)?;
    Ok(Illuminance { lux, ambient })
}

// ── Humidity ──────────────────────────────────────────────────────────────────

/// Decode an HDC1000 notification.
///
/// Bytes 0–1 hold the raw temperature `t`, bytes 2–3 the raw humidity `h`,
/// both read as signed 16-bit:
///
/// * `temperature_c = -40 + 165 × t / 65536`
/// * `relative_humidity_pct = 100 × h / 65536`
pub fn decode_humidity(data: &[u8]) -> Result<Humidity, DecodeError> {
    let sensor = Sensor::Humidity;
    require(sensor, data, HUMIDITY_LEN)?;
    let t = field(sensor, data, 0, 1.0)?;
    let h = field(sensor, data, 2, 1.0)?;
    Ok(Humidity {
        relative_humidity_pct: h * 100.0 / 65536.0,
        temperature_c: -40.0 + (165.0 * t) / 65536.0,
    })
}

// ── Barometric pressure ───────────────────────────────────────────────────────

/// Barometer payload encodings, told apart only by payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLayout {
    /// Firmware 0.89: two 16-bit legacy floats (4 bytes).
    Legacy,
    /// Firmware 1.01 and later: two 24-bit integers in 1/100 units (6 bytes).
    Extended,
}

impl PressureLayout {
    /// Resolve the layout for a payload of `len` bytes.
    ///
    /// Up to four bytes is the legacy layout; anything longer is the
    /// extended one. A 5-byte payload is long enough to be extended but too
    /// short to hold the second 24-bit field, so it is rejected.
    pub fn from_len(len: usize) -> Result<Self, DecodeError> {
        match len {
            l if l < PRESSURE_LEGACY_LEN => Err(DecodeError::BufferTooShort {
                sensor: Sensor::Pressure,
                needed: PRESSURE_LEGACY_LEN,
                actual: l,
            }),
            PRESSURE_LEGACY_LEN => Ok(PressureLayout::Legacy),
            l if l < PRESSURE_LEN => Err(DecodeError::UnsupportedFirmwareLayout { len: l }),
            _ => Ok(PressureLayout::Extended),
        }
    }
}

/// Decode a BMP280 notification, dispatching on [`PressureLayout::from_len`].
pub fn decode_pressure(data: &[u8]) -> Result<Pressure, DecodeError> {
    let layout = PressureLayout::from_len(data.len())?;
    decode_pressure_as(layout, data)
}

/// Decode a BMP280 notification with an explicit layout.
pub fn decode_pressure_as(layout: PressureLayout, data: &[u8]) -> Result<Pressure, DecodeError> {
    let sensor = Sensor::Pressure;
    let too_short = |needed| DecodeError::BufferTooShort {
        sensor,
        needed,
        actual: data.len(),
    };

    match layout {
        PressureLayout::Extended => {
            // Temperature in bytes 0..3, pressure in bytes 3..6. The second
            // word starts at byte 2 so its low byte is shifted out.
            let temp = read_u32_le(data, 0).ok_or(too_short(PRESSURE_LEN))?;
            let press = read_u32_le(data, 2).ok_or(too_short(PRESSURE_LEN))?;
            Ok(Pressure {
                temperature_c: f64::from(temp & 0x00ff_ffff) / 100.0,
                pressure_hpa: f64::from((press >> 8) & 0x00ff_ffff) / 100.0,
            })
        }
        PressureLayout::Legacy => {
            let temperature_c =
                read_legacy_float(data, 0).ok_or(too_short(PRESSURE_LEGACY_LEN))?;
            let pressure_hpa = read_legacy_float(data, 2).ok_or(too_short(PRESSURE_LEGACY_LEN))?;
            Ok(Pressure {
                temperature_c,
                pressure_hpa,
            })
        }
    }
}

// ── Movement ──────────────────────────────────────────────────────────────────

/// Decode an MPU9250 notification into its gyro, accel and mag triplets.
///
/// Layout: three 6-byte groups (gyro, accel, mag), each three LE `i16` for
/// X, Y and Z. Gyro is scaled to °/s at ±250 °/s, accel to G at the 8 G
/// range, mag to µT.
pub fn decode_movement(data: &[u8]) -> Result<ImuSample, DecodeError> {
    let sensor = Sensor::Movement;
    require(sensor, data, MOVEMENT_LEN)?;

    let group = |base: usize, scale: f64| -> Result<XyzSample, DecodeError> {
        Ok(XyzSample {
            x: field(sensor, data, base, scale)?,
            y: field(sensor, data, base + 2, scale)?,
            z: field(sensor, data, base + 4, scale)?,
        })
    };

    Ok(ImuSample {
        gyro: group(0, GYROSCOPE_SCALE)?,
        accel: group(6, ACCELEROMETER_SCALE)?,
        mag: group(12, MAGNETOMETER_SCALE)?,
    })
}

// ── Simple key ────────────────────────────────────────────────────────────────

/// Decode the simple key byte. Only `0x01` means pressed; every other value,
/// including the side-button bit `0x02`, reads as released.
pub fn decode_simple_key(data: &[u8]) -> Result<ButtonState, DecodeError> {
    require(Sensor::SimpleKey, data, SIMPLE_KEY_LEN)?;
    Ok(ButtonState {
        pressed: data.first() == Some(&0x01),
    })
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Decode `data` as a payload of `sensor`.
pub fn decode(sensor: Sensor, data: &[u8]) -> Result<PhysicalReading, DecodeError> {
    Ok(match sensor {
        Sensor::IrTemperature => PhysicalReading::IrTemperature(decode_ir_temperature(data)?),
        Sensor::Humidity => PhysicalReading::Humidity(decode_humidity(data)?),
        Sensor::Pressure => PhysicalReading::Pressure(decode_pressure(data)?),
        Sensor::Luxometer => PhysicalReading::Illuminance(decode_luxometer(data)?),
        Sensor::Movement => PhysicalReading::Imu(decode_movement(data)?),
        Sensor::SimpleKey => PhysicalReading::Button(decode_simple_key(data)?),
    })
}
