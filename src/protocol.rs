//! GATT UUIDs, configuration bytes, and wire-format constants for the
//! TI CC2650 SensorTag.
//!
//! Every TI sensor service lives in the vendor namespace
//! `f000XXXX-0451-4000-b000-000000000000`. Each sensor exposes a *data*
//! characteristic (notify), a *configuration* characteristic (write) and a
//! *period* characteristic, which this crate never touches.

use uuid::Uuid;

use crate::types::Sensor;

const fn ti_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0xf000_0000_0451_4000_b000_000000000000 | ((short as u128) << 96))
}

const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb | ((short as u128) << 96))
}

// ── Advertisement ─────────────────────────────────────────────────────────────

/// Local names advertised by CC2650 SensorTags.
///
/// Older firmware advertises `"SensorTag 2.0"`, newer releases the full board name.
pub const ADVERTISED_NAMES: [&str; 2] = ["CC2650 SensorTag", "SensorTag 2.0"];

// ── IR temperature (TMP007) ───────────────────────────────────────────────────

pub const IR_TEMPERATURE_SERVICE: Uuid = ti_uuid(0xaa00);
/// 4 bytes: object temperature, ambient temperature.
pub const IR_TEMPERATURE_DATA: Uuid = ti_uuid(0xaa01);
pub const IR_TEMPERATURE_CONFIG: Uuid = ti_uuid(0xaa02);

// ── Humidity (HDC1000) ────────────────────────────────────────────────────────

pub const HUMIDITY_SERVICE: Uuid = ti_uuid(0xaa20);
/// 4 bytes: raw temperature, raw relative humidity.
pub const HUMIDITY_DATA: Uuid = ti_uuid(0xaa21);
pub const HUMIDITY_CONFIG: Uuid = ti_uuid(0xaa22);

// ── Barometric pressure (BMP280) ──────────────────────────────────────────────

pub const BAROMETRIC_PRESSURE_SERVICE: Uuid = ti_uuid(0xaa40);
/// 4 bytes on firmware 0.89, 6 bytes on firmware 1.01 and later.
pub const BAROMETRIC_PRESSURE_DATA: Uuid = ti_uuid(0xaa41);
pub const BAROMETRIC_PRESSURE_CONFIG: Uuid = ti_uuid(0xaa42);

// ── Luxometer (OPT3001) ───────────────────────────────────────────────────────

pub const LUXOMETER_SERVICE: Uuid = ti_uuid(0xaa70);
pub const LUXOMETER_DATA: Uuid = ti_uuid(0xaa71);
pub const LUXOMETER_CONFIG: Uuid = ti_uuid(0xaa72);

// ── Movement (MPU9250) ────────────────────────────────────────────────────────

pub const MOVEMENT_SERVICE: Uuid = ti_uuid(0xaa80);
/// 18 bytes: gyroscope XYZ, accelerometer XYZ, magnetometer XYZ.
///
/// A single physical stream shared by all three logical IMU channels, see
/// [`crate::imu::ImuMultiplexer`].
pub const MOVEMENT_DATA: Uuid = ti_uuid(0xaa81);
pub const MOVEMENT_CONFIG: Uuid = ti_uuid(0xaa82);

// ── Simple key service ────────────────────────────────────────────────────────

pub const SIMPLE_KEY_SERVICE: Uuid = sig_uuid(0xffe0);
/// 1 byte: `0x01` while the user button is held.
pub const SIMPLE_KEY_DATA: Uuid = sig_uuid(0xffe1);

// ── Configuration bytes ───────────────────────────────────────────────────────

/// Written to a simple sensor's configuration characteristic to start sampling.
pub const SENSOR_ENABLE: u8 = 0x01;

/// Written to a configuration characteristic to power the sensor down.
pub const SENSOR_DISABLE: u8 = 0x00;

/// Movement configuration byte that turns on every gyro, accelerometer and
/// magnetometer axis.
///
/// Always written in full: the magnetometer stops notifying if only its own
/// mask bits are set, so logical channel selection happens host-side.
pub const MOVEMENT_ENABLE_ALL: u8 = 0x7f;

// ── Movement channel masks ────────────────────────────────────────────────────

/// Gyroscope X, Y and Z enable bits.
pub const GYROSCOPE_MASK: u16 = 0x0007;
/// Accelerometer X, Y, Z enable bits plus the 8 G range selection.
pub const ACCELEROMETER_MASK: u16 = 0x0238;
pub const MAGNETOMETER_MASK: u16 = 0x0040;

// ── Scale factors ─────────────────────────────────────────────────────────────

/// °C per LSB of the TMP007 registers, also used for the luxometer payload.
pub const TEMPERATURE_SCALE: f64 = 1.0 / 128.0;

/// °/s per LSB at the ±250 °/s gyroscope range.
pub const GYROSCOPE_SCALE: f64 = 1.0 / 128.0;

/// G per LSB at the 8 G accelerometer range configured by [`ACCELEROMETER_MASK`].
pub const ACCELEROMETER_SCALE: f64 = 1.0 / 4096.0;

/// µT per LSB of the AK8963 magnetometer (4912 µT full scale over 15 bits).
pub const MAGNETOMETER_SCALE: f64 = 4912.0 / 32768.0;

// ── Payload lengths ───────────────────────────────────────────────────────────

pub const IR_TEMPERATURE_LEN: usize = 4;
pub const HUMIDITY_LEN: usize = 4;
pub const LUXOMETER_LEN: usize = 4;
pub const PRESSURE_LEGACY_LEN: usize = 4;
pub const PRESSURE_LEN: usize = 6;
pub const MOVEMENT_LEN: usize = 18;
pub const SIMPLE_KEY_LEN: usize = 1;

// ── Lookup ────────────────────────────────────────────────────────────────────

impl Sensor {
    /// Notify characteristic carrying this sensor's payloads.
    pub fn data_characteristic(self) -> Uuid {
        match self {
            Sensor::IrTemperature => IR_TEMPERATURE_DATA,
            Sensor::Humidity => HUMIDITY_DATA,
            Sensor::Pressure => BAROMETRIC_PRESSURE_DATA,
            Sensor::Luxometer => LUXOMETER_DATA,
            Sensor::Movement => MOVEMENT_DATA,
            Sensor::SimpleKey => SIMPLE_KEY_DATA,
        }
    }

    /// Configuration characteristic, `None` for the simple key service.
    pub fn config_characteristic(self) -> Option<Uuid> {
        match self {
            Sensor::IrTemperature => Some(IR_TEMPERATURE_CONFIG),
            Sensor::Humidity => Some(HUMIDITY_CONFIG),
            Sensor::Pressure => Some(BAROMETRIC_PRESSURE_CONFIG),
            Sensor::Luxometer => Some(LUXOMETER_CONFIG),
            Sensor::Movement => Some(MOVEMENT_CONFIG),
            Sensor::SimpleKey => None,
        }
    }
}
