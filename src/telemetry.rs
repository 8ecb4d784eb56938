use chrono::Utc;
use rand::Rng;
use serde::Serialize;

/// One sampled observation from a simulated container tracker, in the string
/// wire format the device firmware emits. Field precision is fixed per field
/// because downstream payload size depends on it.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub msisdn: String,
    pub iso6346: String,
    pub time: String,
    pub rssi: String,
    pub cgi: String,
    #[serde(rename = "ble-m")]
    pub ble_m: String,
    #[serde(rename = "bat-soc")]
    pub bat_soc: String,
    pub acc: String,
    pub temperature: String,
    pub humidity: String,
    pub pressure: String,
    pub door: String,
    pub gnss: String,
    pub latitude: String,
    pub longitude: String,
    pub altitude: String,
    pub speed: String,
    pub heading: String,
    pub nsat: String,
    pub hdop: String,
}

impl TelemetryRecord {
    /// Raw field lookup by wire name, used by the frame encoder so the field
    /// table stays data-driven instead of per-field match arms at every call
    /// site.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "msisdn" => &self.msisdn,
            "iso6346" => &self.iso6346,
            "time" => &self.time,
            "rssi" => &self.rssi,
            "cgi" => &self.cgi,
            "ble-m" => &self.ble_m,
            "bat-soc" => &self.bat_soc,
            "acc" => &self.acc,
            "temperature" => &self.temperature,
            "humidity" => &self.humidity,
            "pressure" => &self.pressure,
            "door" => &self.door,
            "gnss" => &self.gnss,
            "latitude" => &self.latitude,
            "longitude" => &self.longitude,
            "altitude" => &self.altitude,
            "speed" => &self.speed,
            "heading" => &self.heading,
            "nsat" => &self.nsat,
            "hdop" => &self.hdop,
            _ => return None,
        };
        Some(value.as_str())
    }
}

const DOOR_STATES: [&str; 3] = ["O", "C", "D"];

/// Default sampling region (eastern Mediterranean shipping lane).
const LAT_RANGE: (f64, f64) = (30.0, 32.0);
const LON_RANGE: (f64, f64) = (27.0, 29.0);

/// One simulated device. Identity (msisdn / ISO 6346 id) is stable for the
/// lifetime of the simulator; the record index advances monotonically.
#[derive(Debug)]
pub struct DeviceSimulator {
    device_id: String,
    msisdn: String,
    iso6346: String,
    record_index: u64,
    lat_range: (f64, f64),
    lon_range: (f64, f64),
}

impl DeviceSimulator {
    pub fn new(seed: u32) -> Self {
        let msisdn = format!("393315537{:03}", 800 + seed % 200);
        let iso6346 = format!("LMCU{:07}", 1_000_000 + u64::from(seed));
        let device_id = format!("ESP32_{iso6346}");
        Self {
            device_id,
            msisdn,
            iso6346,
            record_index: 0,
            lat_range: LAT_RANGE,
            lon_range: LON_RANGE,
        }
    }

    pub fn with_region(mut self, lat_range: (f64, f64), lon_range: (f64, f64)) -> Self {
        self.lat_range = lat_range;
        self.lon_range = lon_range;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn iso6346(&self) -> &str {
        &self.iso6346
    }

    pub fn record_index(&self) -> u64 {
        self.record_index
    }

    /// Produces one fully populated record. Every numeric field stays inside
    /// its plausible range; values are random, not reproducible.
    pub fn next_record<R: Rng>(&mut self, rng: &mut R) -> TelemetryRecord {
        self.record_index += 1;

        let cgi = format!(
            "{}-{}-{}-{}",
            rng.gen_range(100..=999),
            rng.gen_range(1..=99),
            rng.gen_range(1..=99),
            rng.gen_range(1000..=9999)
        );
        let acc = format!(
            "{:.4} {:.4} {:.4}",
            rng.gen_range(-500.0..=500.0),
            rng.gen_range(-5.0..=5.0),
            rng.gen_range(-10.0..=10.0)
        );

        TelemetryRecord {
            msisdn: self.msisdn.clone(),
            iso6346: self.iso6346.clone(),
            time: Utc::now().format("%y%m%d %H%M%S.0").to_string(),
            rssi: rng.gen_range(-80..=-40).to_string(),
            cgi,
            ble_m: rng.gen_range(0..=1).to_string(),
            bat_soc: rng.gen_range(20..=95).to_string(),
            acc,
            temperature: format!("{:.2}", rng.gen_range(10.0..=40.0)),
            humidity: format!("{:.2}", rng.gen_range(20.0..=80.0)),
            pressure: format!("{:.4}", rng.gen_range(950.0..=1050.0)),
            door: DOOR_STATES[rng.gen_range(0..DOOR_STATES.len())].to_string(),
            gnss: rng.gen_range(0..=1).to_string(),
            latitude: format!("{:.4}", rng.gen_range(self.lat_range.0..=self.lat_range.1)),
            longitude: format!("{:.4}", rng.gen_range(self.lon_range.0..=self.lon_range.1)),
            altitude: format!("{:.2}", rng.gen_range(0.0..=100.0)),
            speed: format!("{:.1}", rng.gen_range(0.0..=50.0)),
            heading: format!("{:.2}", rng.gen_range(0.0..=360.0)),
            nsat: format!("{:02}", rng.gen_range(4..=12)),
            hdop: format!("{:.1}", rng.gen_range(0.5..=3.0)),
        }
    }
}
