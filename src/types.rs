use std::fmt;

use serde::Serialize;

/// A sensor modality on the SensorTag.
///
/// Each modality has its own data characteristic and payload layout; the
/// three IMU channels share [`Sensor::Movement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    IrTemperature,
    Humidity,
    Pressure,
    Luxometer,
    Movement,
    SimpleKey,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::IrTemperature => "IR temperature",
            Sensor::Humidity => "humidity",
            Sensor::Pressure => "barometer",
            Sensor::Luxometer => "luxometer",
            Sensor::Movement => "movement",
            Sensor::SimpleKey => "simple key",
        };
        f.write_str(name)
    }
}

/// Object and die temperature from the TMP007 thermopile, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IrTemperature {
    /// Temperature of the object in the sensor's field of view.
    pub object: f64,
    /// Temperature of the sensor die.
    pub ambient: f64,
}

/// HDC1000 reading.
///
/// Humidity comes first, matching the order callers have always received the
/// two values in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Humidity {
    /// Relative humidity in percent.
    pub relative_humidity_pct: f64,
    pub temperature_c: f64,
}

/// BMP280 reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pressure {
    pub temperature_c: f64,
    /// Barometric pressure in hectopascal.
    pub pressure_hpa: f64,
}

/// OPT3001 reading.
///
/// The luxometer payload is decoded with the same two-field routine as the
/// IR thermometer: `lux` is the first word scaled by 1/128 and `ambient` the
/// second. Captures from real hardware may show that the second word carries
/// no information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Illuminance {
    pub lux: f64,
    pub ambient: f64,
}

/// A single 3-axis inertial measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct XyzSample {
    /// X-axis value in sensor units (°/s for gyro, G for accel, µT for mag).
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl XyzSample {
    pub fn as_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }
}

impl From<(f64, f64, f64)> for XyzSample {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self { x, y, z }
    }
}

/// One MPU9250 notification, split into its three sensors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ImuSample {
    /// Angular rate in °/s.
    pub gyro: XyzSample,
    /// Acceleration in G.
    pub accel: XyzSample,
    /// Magnetic flux density in µT.
    pub mag: XyzSample,
}

/// State of the user button on the simple key service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonState {
    pub pressed: bool,
}

/// A decoded notification from any modality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "sensor", rename_all = "snake_case")]
pub enum PhysicalReading {
    IrTemperature(IrTemperature),
    Humidity(Humidity),
    Pressure(Pressure),
    Illuminance(Illuminance),
    Imu(ImuSample),
    Button(ButtonState),
}

impl PhysicalReading {
    /// The modality this reading was decoded from.
    pub fn sensor(&self) -> Sensor {
        match self {
            PhysicalReading::IrTemperature(_) => Sensor::IrTemperature,
            PhysicalReading::Humidity(_) => Sensor::Humidity,
            PhysicalReading::Pressure(_) => Sensor::Pressure,
            PhysicalReading::Illuminance(_) => Sensor::Luxometer,
            PhysicalReading::Imu(_) => Sensor::Movement,
            PhysicalReading::Button(_) => Sensor::SimpleKey,
        }
    }
}

/// A reading delivered on one logical channel of a session.
///
/// Unlike [`PhysicalReading`], the movement stream is split per channel here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelReading {
    IrTemperature(IrTemperature),
    Humidity(Humidity),
    Pressure(Pressure),
    Luxometer(Illuminance),
    Gyroscope(XyzSample),
    Accelerometer(XyzSample),
    Magnetometer(XyzSample),
    Button(ButtonState),
}
